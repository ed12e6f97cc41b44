use serde::{Deserialize, Serialize};

/// Address kind assigned to endpoints created by this tool.
pub(crate) const ADDRESS_KIND_ASSIGNED: &str = "ASSIGNED";

/// A VM document as returned by both the list and the get endpoints. The
/// `status` section is read-only on the wire and never carried into updates,
/// so it is not modeled here.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[cfg_attr(test, derive(PartialEq))]
pub(crate) struct Vm {
    pub(crate) metadata: VmMetadata,
    pub(crate) spec: VmSpec,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[cfg_attr(test, derive(PartialEq))]
pub(crate) struct VmMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) uuid: Option<String>,
    // Concurrency token; the server rejects updates carrying a stale value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) spec_version: Option<i64>,
    #[serde(flatten)]
    pub(crate) extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[cfg_attr(test, derive(PartialEq))]
pub(crate) struct VmSpec {
    pub(crate) name: String,
    pub(crate) resources: VmResources,
    #[serde(flatten)]
    pub(crate) extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[cfg_attr(test, derive(PartialEq))]
pub(crate) struct VmResources {
    #[serde(default)]
    pub(crate) nic_list: Vec<Nic>,
    #[serde(flatten)]
    pub(crate) extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[cfg_attr(test, derive(PartialEq))]
pub(crate) struct Nic {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) mac_address: Option<String>,
    #[serde(default)]
    pub(crate) ip_endpoint_list: Vec<IpEndpoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) subnet_reference: Option<SubnetReference>,
    #[serde(flatten)]
    pub(crate) extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[cfg_attr(test, derive(PartialEq))]
pub(crate) struct IpEndpoint {
    pub(crate) ip: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub(crate) kind: Option<String>,
    #[serde(flatten)]
    pub(crate) extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[cfg_attr(test, derive(PartialEq))]
pub(crate) struct SubnetReference {
    pub(crate) uuid: String,
    #[serde(flatten)]
    pub(crate) extra: serde_json::Map<String, serde_json::Value>,
}

/// Update payload: the full (possibly edited) spec plus the unmodified
/// metadata carrying the concurrency token.
#[derive(Serialize, Debug)]
pub(crate) struct VmIntent {
    pub(crate) spec: VmSpec,
    pub(crate) metadata: VmMetadata,
}

#[derive(Deserialize, Debug)]
pub(crate) struct VmListResponse {
    #[serde(default)]
    pub(crate) entities: Vec<Vm>,
    #[serde(default)]
    pub(crate) metadata: ListMetadata,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct ListMetadata {
    pub(crate) total_matches: Option<i64>,
}

#[derive(Deserialize, Debug, Clone)]
pub(crate) struct Subnet {
    pub(crate) spec: SubnetSpec,
}

#[derive(Deserialize, Debug, Clone)]
pub(crate) struct SubnetSpec {
    pub(crate) name: String,
    pub(crate) resources: SubnetResources,
}

#[derive(Deserialize, Debug, Clone)]
pub(crate) struct SubnetResources {
    pub(crate) ip_config: Option<IpConfig>,
}

#[derive(Deserialize, Debug, Clone)]
pub(crate) struct IpConfig {
    pub(crate) subnet_ip: String,
    pub(crate) prefix_length: u8,
}
