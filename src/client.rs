use std::time::Duration;

use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::PrismConfig;
use crate::types::{Subnet, Vm, VmIntent, VmListResponse};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Page size used by the list endpoint.
const LIST_PAGE_LENGTH: i64 = 500;

#[derive(Debug, thiserror::Error)]
pub(crate) enum ApiError {
    #[error("Failed to construct the HTTP client: {0}")]
    Construction(#[source] reqwest::Error),

    #[error("Request to '{path}' failed: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Server rejected '{path}' with status {status}: {message}")]
    Rejected {
        path: String,
        status: u16,
        message: String,
    },

    #[error("Failed to decode the response from '{path}': {source}")]
    Decode {
        path: String,
        #[source]
        source: reqwest::Error,
    },
}

impl ApiError {
    /// Transient failures may succeed on a later attempt; everything else
    /// points at bad input or a change the server refuses.
    pub(crate) fn is_transient(&self) -> bool {
        match self {
            ApiError::Transport { .. } => true,
            ApiError::Rejected { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Inventory operations of the management endpoint.
pub(crate) trait PrismApi {
    fn list_vms(&self) -> Result<Vec<Vm>, ApiError>;
    fn get_vm(&self, uuid: &str) -> Result<Vm, ApiError>;
    fn get_subnet(&self, uuid: &str) -> Result<Subnet, ApiError>;
    fn update_vm(&self, uuid: &str, intent: &VmIntent) -> Result<serde_json::Value, ApiError>;
}

pub(crate) struct PrismClient {
    http: reqwest::blocking::Client,
    base_url: String,
    username: String,
    password: String,
}

impl PrismClient {
    pub(crate) fn new(config: &PrismConfig) -> Result<Self, ApiError> {
        Self::with_base_url(
            format!("https://{}:{}", config.address, config.port),
            &config.username,
            &config.password,
        )
    }

    fn with_base_url(base_url: String, username: &str, password: &str) -> Result<Self, ApiError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(ApiError::Construction)?;

        Ok(Self {
            http,
            base_url,
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::blocking::RequestBuilder,
        path: &str,
    ) -> Result<T, ApiError> {
        let response = request
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/json")
            .send()
            .map_err(|source| ApiError::Transport {
                path: path.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Rejected {
                path: path.to_string(),
                status: status.as_u16(),
                message: response.text().unwrap_or_default(),
            });
        }

        response.json().map_err(|source| ApiError::Decode {
            path: path.to_string(),
            source,
        })
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(self.http.get(format!("{}/{path}", self.base_url)), path)
    }

    fn post<T: DeserializeOwned>(&self, path: &str, body: &impl Serialize) -> Result<T, ApiError> {
        self.send(
            self.http.post(format!("{}/{path}", self.base_url)).json(body),
            path,
        )
    }

    fn put<T: DeserializeOwned>(&self, path: &str, body: &impl Serialize) -> Result<T, ApiError> {
        self.send(
            self.http.put(format!("{}/{path}", self.base_url)).json(body),
            path,
        )
    }
}

impl PrismApi for PrismClient {
    /// Collect the full inventory, following the server's pagination.
    fn list_vms(&self) -> Result<Vec<Vm>, ApiError> {
        let mut vms: Vec<Vm> = Vec::new();

        loop {
            let body = serde_json::json!({
                "kind": "vm",
                "offset": vms.len(),
                "length": LIST_PAGE_LENGTH,
            });
            let page: VmListResponse = self.post("api/nutanix/v3/vms/list", &body)?;

            let received = page.entities.len();
            let total = page.metadata.total_matches.unwrap_or(0);
            vms.extend(page.entities);
            debug!("Received {received} VMs, {} of {total} so far", vms.len());

            if received == 0 || vms.len() as i64 >= total {
                return Ok(vms);
            }
        }
    }

    fn get_vm(&self, uuid: &str) -> Result<Vm, ApiError> {
        self.get(&format!("api/nutanix/v3/vms/{uuid}"))
    }

    fn get_subnet(&self, uuid: &str) -> Result<Subnet, ApiError> {
        self.get(&format!("api/nutanix/v3/subnets/{uuid}"))
    }

    fn update_vm(&self, uuid: &str, intent: &VmIntent) -> Result<serde_json::Value, ApiError> {
        self.put(&format!("api/nutanix/v3/vms/{uuid}"), intent)
    }
}


#[cfg(test)]
mod tests {
    use mockito::Matcher;
    use serde_json::json;

    use crate::client::{ApiError, PrismApi, PrismClient};

    fn client(server: &mockito::Server) -> PrismClient {
        PrismClient::with_base_url(server.url(), "admin", "secret").unwrap()
    }

    fn vm_entity(uuid: &str, name: &str) -> serde_json::Value {
        json!({
            "metadata": {"uuid": uuid, "spec_version": 1},
            "spec": {"name": name, "resources": {"nic_list": []}},
        })
    }

    #[test]
    fn list_vms_follows_pagination() {
        let mut server = mockito::Server::new();

        let first = server
            .mock("POST", "/api/nutanix/v3/vms/list")
            .match_body(Matcher::PartialJson(json!({"kind": "vm", "offset": 0})))
            .with_status(200)
            .with_body(
                json!({
                    "metadata": {"total_matches": 2},
                    "entities": [vm_entity("uuid-1", "node-1")],
                })
                .to_string(),
            )
            .expect(1)
            .create();
        let second = server
            .mock("POST", "/api/nutanix/v3/vms/list")
            .match_body(Matcher::PartialJson(json!({"kind": "vm", "offset": 1})))
            .with_status(200)
            .with_body(
                json!({
                    "metadata": {"total_matches": 2},
                    "entities": [vm_entity("uuid-2", "node-2")],
                })
                .to_string(),
            )
            .expect(1)
            .create();

        let vms = client(&server).list_vms().unwrap();

        assert_eq!(vms.len(), 2);
        assert_eq!(vms[0].spec.name, "node-1");
        assert_eq!(vms[1].metadata.uuid.as_deref(), Some("uuid-2"));

        first.assert();
        second.assert();
    }

    #[test]
    fn get_vm_sends_basic_auth() {
        let mut server = mockito::Server::new();

        let mock = server
            .mock("GET", "/api/nutanix/v3/vms/uuid-1")
            .match_header("authorization", "Basic YWRtaW46c2VjcmV0")
            .with_status(200)
            .with_body(vm_entity("uuid-1", "node-1").to_string())
            .expect(1)
            .create();

        let vm = client(&server).get_vm("uuid-1").unwrap();

        assert_eq!(vm.spec.name, "node-1");
        mock.assert();
    }

    #[test]
    fn get_subnet_parses_ip_config() {
        let mut server = mockito::Server::new();

        server
            .mock("GET", "/api/nutanix/v3/subnets/subnet-1")
            .with_status(200)
            .with_body(
                json!({
                    "spec": {
                        "name": "lan",
                        "resources": {
                            "ip_config": {"subnet_ip": "10.0.0.0", "prefix_length": 24},
                        },
                    },
                })
                .to_string(),
            )
            .create();

        let subnet = client(&server).get_subnet("subnet-1").unwrap();

        assert_eq!(subnet.spec.name, "lan");
        let ip_config = subnet.spec.resources.ip_config.unwrap();
        assert_eq!(ip_config.subnet_ip, "10.0.0.0");
        assert_eq!(ip_config.prefix_length, 24);
    }

    #[test]
    fn update_vm_carries_spec_and_metadata() {
        let mut server = mockito::Server::new();

        let mock = server
            .mock("PUT", "/api/nutanix/v3/vms/uuid-1")
            .match_body(Matcher::PartialJson(json!({
                "spec": {"name": "node-1"},
                "metadata": {"uuid": "uuid-1", "spec_version": 3},
            })))
            .with_status(202)
            .with_body(json!({"status": {"state": "PENDING"}}).to_string())
            .expect(1)
            .create();

        let vm: crate::types::Vm = serde_json::from_value(json!({
            "metadata": {"uuid": "uuid-1", "spec_version": 3},
            "spec": {"name": "node-1", "resources": {"nic_list": []}},
        }))
        .unwrap();
        let intent = crate::types::VmIntent {
            spec: vm.spec,
            metadata: vm.metadata,
        };

        let result = client(&server).update_vm("uuid-1", &intent).unwrap();

        assert_eq!(result["status"]["state"], "PENDING");
        mock.assert();
    }

    #[test]
    fn rejection_statuses_map_to_api_errors() {
        let mut server = mockito::Server::new();

        server
            .mock("GET", "/api/nutanix/v3/vms/uuid-1")
            .with_status(409)
            .with_body("CONCURRENT_REQUESTS_NOT_ALLOWED")
            .create();

        let error = client(&server).get_vm("uuid-1").unwrap_err();

        match &error {
            ApiError::Rejected {
                status, message, ..
            } => {
                assert_eq!(*status, 409);
                assert!(message.contains("CONCURRENT_REQUESTS_NOT_ALLOWED"));
            }
            other => panic!("Unexpected error: {other:?}"),
        }
        assert!(!error.is_transient());
    }

    #[test]
    fn server_errors_are_transient() {
        let mut server = mockito::Server::new();

        server
            .mock("GET", "/api/nutanix/v3/subnets/subnet-1")
            .with_status(503)
            .create();

        let error = client(&server).get_subnet("subnet-1").unwrap_err();
        assert!(error.is_transient());
    }
}
