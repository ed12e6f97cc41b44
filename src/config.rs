use std::env;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Directory under the user's home holding the connection documents.
const CONFIG_DIR: &str = ".secret/nutanix";
const SECRET_FILE: &str = "secret.conf";
const ENDPOINT_FILE: &str = "endpoint.conf";

const CREDENTIAL_TYPE_BASIC_AUTH: &str = "basic_auth";

/// Connection settings merged from the secret and endpoint documents.
/// Built once at startup and passed by reference afterwards.
#[derive(Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub(crate) struct PrismConfig {
    pub(crate) address: String,
    pub(crate) port: u16,
    pub(crate) username: String,
    pub(crate) password: String,
}

#[derive(Deserialize)]
struct SecretDocument {
    #[serde(rename = "type")]
    kind: String,
    data: SecretData,
}

#[derive(Deserialize)]
struct SecretData {
    #[serde(rename = "prismCentral")]
    prism_central: Credentials,
}

#[derive(Deserialize)]
struct Credentials {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct EndpointDocument {
    #[serde(rename = "prismCentral")]
    prism_central: Endpoint,
}

#[derive(Deserialize)]
struct Endpoint {
    address: String,
    port: u16,
}

impl PrismConfig {
    pub(crate) fn load() -> Result<Self, anyhow::Error> {
        let home = env::home_dir().ok_or_else(|| anyhow!("Home directory is not set"))?;
        Self::load_from(&home.join(CONFIG_DIR))
    }

    /// Merge the two documents: credentials come from the secret document,
    /// address and port from the endpoint document.
    fn load_from(dir: &Path) -> Result<Self, anyhow::Error> {
        let secret: SecretDocument = read_json(&dir.join(SECRET_FILE))?;
        if secret.kind != CREDENTIAL_TYPE_BASIC_AUTH {
            bail!("Unsupported credential type '{}'", secret.kind);
        }

        let endpoint: EndpointDocument = read_json(&dir.join(ENDPOINT_FILE))?;

        Ok(Self {
            address: endpoint.prism_central.address,
            port: endpoint.prism_central.port,
            username: secret.data.prism_central.username,
            password: secret.data.prism_central.password,
        })
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, anyhow::Error> {
    let contents = fs::read_to_string(path).with_context(|| format!("Reading {path:?}"))?;
    serde_json::from_str(&contents).with_context(|| format!("Parsing {path:?}"))
}
