//! Static manifests for the controller manager operand
//!
//! Manifests are embedded at compile time and looked up by their path
//! relative to `assets/`, e.g. `v3.11.0/openshift-svcat-controller-manager/sa.yaml`.

use crate::error::{OperatorError, Result};
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::ConfigMap;

/// Directory prefix shared by every operand manifest
pub const ASSET_DIR: &str = "v3.11.0/openshift-svcat-controller-manager";

macro_rules! embed {
    ($($file:literal),+ $(,)?) => {
        &[$(
            (
                concat!("v3.11.0/openshift-svcat-controller-manager/", $file),
                include_str!(concat!("../assets/v3.11.0/openshift-svcat-controller-manager/", $file)),
            ),
        )+]
    };
}

static ASSETS: &[(&str, &str)] = embed![
    "ns.yaml",
    "crb-catalog-controller.yaml",
    "crb-controller-namespace-viewer-binding.yaml",
    "cr-catalog-controller.yaml",
    "rolebinding-cluster-info-configmap.yaml",
    "rolebinding-configmap-accessor.yaml",
    "role-cluster-info-configmap.yaml",
    "role-configmap-accessor.yaml",
    "sa.yaml",
    "svc.yaml",
    "servicemonitor-role.yaml",
    "servicemonitor-rolebinding.yaml",
    "servicemonitor.yaml",
    "cm.yaml",
    "defaultconfig.yaml",
    "trusted-ca.yaml",
    "ds.yaml",
];

/// Full asset path for a file in the operand directory
pub fn path(file: &str) -> String {
    format!("{}/{}", ASSET_DIR, file)
}

/// Raw manifest contents by path
pub fn asset(name: &str) -> Result<&'static str> {
    ASSETS
        .iter()
        .find(|(path, _)| *path == name)
        .map(|(_, contents)| *contents)
        .ok_or_else(|| OperatorError::NotFound(format!("asset {}", name)))
}

/// Every embedded asset path
pub fn asset_names() -> impl Iterator<Item = &'static str> {
    ASSETS.iter().map(|(path, _)| *path)
}

/// Parse an embedded ConfigMap
pub fn read_config_map(name: &str) -> Result<ConfigMap> {
    serde_yaml::from_str(asset(name)?)
        .map_err(|e| OperatorError::Manifest(format!("{}: {}", name, e)))
}

/// Parse an embedded DaemonSet
pub fn read_daemon_set(name: &str) -> Result<DaemonSet> {
    serde_yaml::from_str(asset(name)?)
        .map_err(|e| OperatorError::Manifest(format!("{}: {}", name, e)))
}

/// A manifest ready to be applied without a typed client
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    /// Asset path the manifest was read from
    pub file: String,
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
    /// Full object as JSON
    pub object: serde_json::Value,
}

impl Manifest {
    /// Parse a YAML manifest, requiring apiVersion, kind and metadata.name.
    pub fn parse(file: &str, yaml: &str) -> Result<Self> {
        let object: serde_json::Value = serde_yaml::from_str(yaml)
            .map_err(|e| OperatorError::Manifest(format!("{}: invalid YAML: {}", file, e)))?;

        let field = |pointer: &str| -> Option<String> {
            object
                .pointer(pointer)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };

        let api_version = field("/apiVersion")
            .ok_or_else(|| OperatorError::Manifest(format!("{}: missing apiVersion", file)))?;
        let kind = field("/kind")
            .ok_or_else(|| OperatorError::Manifest(format!("{}: missing kind", file)))?;
        let name = field("/metadata/name")
            .ok_or_else(|| OperatorError::Manifest(format!("{}: missing metadata.name", file)))?;
        let namespace = field("/metadata/namespace");

        Ok(Self {
            file: file.to_string(),
            api_version,
            kind,
            name,
            namespace,
            object,
        })
    }

    /// Load and parse an embedded manifest
    pub fn load(name: &str) -> Result<Self> {
        Self::parse(name, asset(name)?)
    }

    /// Split apiVersion into (group, version); the core group is empty.
    pub fn group_version(&self) -> (&str, &str) {
        match self.api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", self.api_version.as_str()),
        }
    }
}
