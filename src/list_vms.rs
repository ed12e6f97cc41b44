use anyhow::Context;
use log::info;

use crate::client::PrismApi;

/// Report every VM in the inventory with its interface details.
pub(crate) fn list(api: &impl PrismApi) -> Result<(), anyhow::Error> {
    let vms = api.list_vms().context("Listing VMs")?;
    info!("Found {} VMs", vms.len());

    for vm in &vms {
        let uuid = vm.metadata.uuid.as_deref().unwrap_or("<no uuid>");
        info!("VM {} (uuid {uuid})", vm.spec.name);

        for (index, nic) in vm.spec.resources.nic_list.iter().enumerate() {
            let addresses: Vec<&str> =
                nic.ip_endpoint_list.iter().map(|e| e.ip.as_str()).collect();
            info!(
                "  interface {index} has MAC {} and IP addresses {addresses:?}",
                nic.mac_address.as_deref().unwrap_or("<unknown>")
            );
        }
    }

    Ok(())
}
