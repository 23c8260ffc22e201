//! Content hashes of rollout inputs
//!
//! Hashes of the ConfigMaps and Secrets the operand mounts are embedded in
//! its config ConfigMap, so a change to any input changes the config and
//! drives a rollout.

use crate::client::ClusterClient;
use crate::error::Result;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Reference to a rollout input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputRef {
    ConfigMap { namespace: String, name: String },
    Secret { namespace: String, name: String },
}

impl InputRef {
    pub fn config_map(namespace: &str, name: &str) -> Self {
        InputRef::ConfigMap {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub fn secret(namespace: &str, name: &str) -> Self {
        InputRef::Secret {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Key under which the hash is stored, e.g. `configmaps.client-ca`
    pub fn key(&self) -> String {
        match self {
            InputRef::ConfigMap { name, .. } => format!("configmaps.{}", name),
            InputRef::Secret { name, .. } => format!("secrets.{}", name),
        }
    }
}

fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hash of a ConfigMap's data and binaryData
pub fn config_map_hash(config_map: &ConfigMap) -> Result<String> {
    let content = serde_json::json!({
        "data": config_map.data,
        "binaryData": config_map.binary_data,
    });
    Ok(digest(&serde_json::to_vec(&content)?))
}

/// Hash of a Secret's data
pub fn secret_hash(secret: &Secret) -> Result<String> {
    let content = serde_json::json!({
        "data": secret.data,
    });
    Ok(digest(&serde_json::to_vec(&content)?))
}

/// Hash every input that exists; missing inputs are left out.
pub async fn input_hashes<C>(client: &C, inputs: &[InputRef]) -> Result<BTreeMap<String, String>>
where
    C: ClusterClient + ?Sized,
{
    let mut hashes = BTreeMap::new();
    for input in inputs {
        let hash = match input {
            InputRef::ConfigMap { namespace, name } => {
                match client.get_config_map(namespace, name).await? {
                    Some(cm) => config_map_hash(&cm)?,
                    None => continue,
                }
            }
            InputRef::Secret { namespace, name } => match client.get_secret(namespace, name).await? {
                Some(secret) => secret_hash(&secret)?,
                None => continue,
            },
        };
        hashes.insert(input.key(), hash);
    }
    Ok(hashes)
}
