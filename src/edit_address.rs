use std::net::Ipv4Addr;

use anyhow::{anyhow, bail, Context};
use ipnet::Ipv4Net;
use log::{info, warn};

use crate::client::PrismApi;
use crate::types::{IpEndpoint, Nic, Subnet, Vm, VmIntent, ADDRESS_KIND_ASSIGNED};

/// Validated address arguments. Built before any remote call is made so that
/// bad input never reaches the API.
#[derive(Debug)]
pub(crate) struct AddressEdit {
    add: Option<Ipv4Addr>,
    remove: Option<Ipv4Addr>,
}

impl AddressEdit {
    pub(crate) fn new(
        add: Option<&String>,
        remove: Option<&String>,
    ) -> Result<Self, anyhow::Error> {
        if add.is_some() && remove.is_some() {
            bail!("Provide either --add-address or --remove-address, not both");
        }

        Ok(Self {
            add: parse_address("--add-address", add)?,
            remove: parse_address("--remove-address", remove)?,
        })
    }

    /// The requested address, or none for a read-only report.
    fn requested(&self) -> Option<Ipv4Addr> {
        self.add.or(self.remove)
    }
}

fn parse_address(flag: &str, value: Option<&String>) -> Result<Option<Ipv4Addr>, anyhow::Error> {
    value
        .map(|address| {
            address
                .parse::<Ipv4Addr>()
                .with_context(|| format!("{flag} expects an IPv4 address, got '{address}'"))
        })
        .transpose()
}

pub(crate) fn edit(
    api: &impl PrismApi,
    node_name: &str,
    edit: &AddressEdit,
) -> Result<(), anyhow::Error> {
    let vms = api.list_vms().context("Listing VMs")?;

    let located = locate(&vms, node_name)?;
    let uuid = located
        .metadata
        .uuid
        .as_deref()
        .ok_or_else(|| anyhow!("VM '{node_name}' has no UUID in its metadata"))?;

    // The list result is not guaranteed to be field-complete, fetch the full
    // document before editing it.
    info!("Getting further info for VM {node_name} with UUID {uuid}");
    let mut vm = api
        .get_vm(uuid)
        .with_context(|| format!("Fetching VM {uuid}"))?;

    let outcome = reconcile(api, &mut vm, edit)?;

    // Without an address argument the run is a read-only report.
    let Some(address) = edit.requested() else {
        return Ok(());
    };

    if !outcome.contained {
        bail!("Address {address} is outside every subnet attached to '{node_name}'");
    }
    if !outcome.changed {
        info!("Interfaces of '{node_name}' already match the requested state, nothing to update");
        return Ok(());
    }

    let intent = VmIntent {
        spec: vm.spec,
        metadata: vm.metadata,
    };
    let result = api
        .update_vm(uuid, &intent)
        .with_context(|| format!("Updating VM {uuid}"))?;
    info!(
        "Update accepted: {}",
        serde_json::to_string_pretty(&result).unwrap_or_else(|_| result.to_string())
    );

    Ok(())
}

/// Exact name match over the inventory. Ambiguous names are rejected rather
/// than silently resolved to the first match.
fn locate<'a>(vms: &'a [Vm], name: &str) -> Result<&'a Vm, anyhow::Error> {
    let matches: Vec<&Vm> = vms.iter().filter(|vm| vm.spec.name == name).collect();

    match matches.as_slice() {
        [] => bail!("No VM named '{name}' found in the inventory"),
        [vm] => Ok(*vm),
        all => {
            let uuids: Vec<&str> = all
                .iter()
                .map(|vm| vm.metadata.uuid.as_deref().unwrap_or("<no uuid>"))
                .collect();
            bail!(
                "VM name '{name}' is ambiguous, matching UUIDs: {}",
                uuids.join(", ")
            )
        }
    }
}

struct Outcome {
    // Some attached subnet contains the requested address.
    contained: bool,
    // At least one interface's address list changed.
    changed: bool,
}

/// Walk the VM's interfaces in order, resolve each attached subnet and apply
/// the requested edit to every interface whose subnet contains the address.
fn reconcile(
    api: &impl PrismApi,
    vm: &mut Vm,
    edit: &AddressEdit,
) -> Result<Outcome, anyhow::Error> {
    let name = vm.spec.name.clone();
    let mut outcome = Outcome {
        contained: false,
        changed: false,
    };

    for (index, nic) in vm.spec.resources.nic_list.iter_mut().enumerate() {
        let addresses: Vec<&str> = nic.ip_endpoint_list.iter().map(|e| e.ip.as_str()).collect();
        info!(
            "VM {name} interface {index} has MAC {} and IP addresses {addresses:?}",
            nic.mac_address.as_deref().unwrap_or("<unknown>")
        );

        let Some(reference) = &nic.subnet_reference else {
            warn!("Interface {index} has no subnet reference, skipping");
            continue;
        };

        let subnet = api
            .get_subnet(&reference.uuid)
            .with_context(|| format!("Looking up subnet {}", reference.uuid))?;
        let block = subnet_block(&subnet)
            .with_context(|| format!("Subnet {} is malformed", reference.uuid))?;
        info!("Attached subnet {} with CIDR {block}", subnet.spec.name);

        if let Some(add) = edit.add {
            if block.contains(&add) {
                outcome.contained = true;
                if contains_address(nic, add) {
                    info!("IP {add} is already assigned on interface {index}");
                } else {
                    info!("Adding IP {add} to node {name}");
                    nic.ip_endpoint_list.push(IpEndpoint {
                        ip: add.to_string(),
                        kind: Some(ADDRESS_KIND_ASSIGNED.to_string()),
                        extra: serde_json::Map::new(),
                    });
                    outcome.changed = true;
                }
            }
        }

        if let Some(remove) = edit.remove {
            if block.contains(&remove) {
                outcome.contained = true;
                let before = nic.ip_endpoint_list.len();
                nic.ip_endpoint_list
                    .retain(|endpoint| endpoint.ip.parse::<Ipv4Addr>().ok() != Some(remove));
                if nic.ip_endpoint_list.len() != before {
                    info!("Removing IP {remove} from node {name}");
                    outcome.changed = true;
                }
            }
        }
    }

    Ok(outcome)
}

/// Membership by parsed address equality, not string equality.
fn contains_address(nic: &Nic, address: Ipv4Addr) -> bool {
    nic.ip_endpoint_list
        .iter()
        .any(|endpoint| endpoint.ip.parse::<Ipv4Addr>().ok() == Some(address))
}

fn subnet_block(subnet: &Subnet) -> Result<Ipv4Net, anyhow::Error> {
    let ip_config = subnet
        .spec
        .resources
        .ip_config
        .as_ref()
        .ok_or_else(|| anyhow!("Subnet has no IP configuration"))?;

    let base: Ipv4Addr = ip_config
        .subnet_ip
        .parse()
        .with_context(|| format!("Invalid subnet base address '{}'", ip_config.subnet_ip))?;
    let block = Ipv4Net::new(base, ip_config.prefix_length)
        .with_context(|| format!("Invalid prefix length {}", ip_config.prefix_length))?;

    Ok(block.trunc())
}
