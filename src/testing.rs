//! In-memory cluster for exercising whole syncs in tests

use crate::assets::{self, Manifest};
use crate::client::ClusterClient;
use crate::crd::{ClusterOperator, Proxy, ServiceCatalogControllerManager};
use crate::error::{OperatorError, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::ResourceExt;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

fn object_key<K: kube::Resource>(obj: &K) -> Key {
    key(
        obj.meta().namespace.as_deref().unwrap_or_default(),
        obj.meta().name.as_deref().unwrap_or_default(),
    )
}

#[derive(Default)]
struct State {
    operator_config: Option<ServiceCatalogControllerManager>,
    operator_status_writes: usize,
    proxy: Option<Proxy>,
    namespaces: BTreeSet<String>,
    manifests: BTreeMap<String, Value>,
    changed_files: Vec<String>,
    config_maps: BTreeMap<Key, ConfigMap>,
    secrets: BTreeMap<Key, Secret>,
    daemon_sets: BTreeMap<Key, DaemonSet>,
    daemon_set_updates: usize,
    cluster_operators: BTreeMap<String, ClusterOperator>,
    cluster_operator_status_writes: usize,
    failures: BTreeSet<String>,
}

/// Fake cluster state behind [`ClusterClient`]
///
/// Updates store objects exactly as given, so generations and statuses only
/// move when a test sets them.
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<State>,
}

/// The stock operand DaemonSet
pub fn daemon_set_template() -> DaemonSet {
    assets::read_daemon_set(&assets::path("ds.yaml")).expect("ds.yaml parses")
}

fn manifest_key(kind: &str, namespace: Option<&str>, name: &str) -> String {
    format!("{}/{}/{}", kind, namespace.unwrap_or_default(), name)
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("fake cluster lock")
    }

    /// Make every call to `operation` fail. Manifest applies are named
    /// `apply_manifest:<Kind>`.
    pub fn fail(&self, operation: &str) {
        self.state().failures.insert(operation.to_string());
    }

    /// Undo [`FakeCluster::fail`]
    pub fn recover(&self, operation: &str) {
        self.state().failures.remove(operation);
    }

    fn check(&self, operation: &str) -> Result<()> {
        if self.state().failures.contains(operation) {
            return Err(OperatorError::KubeApi(format!("injected failure in {}", operation)));
        }
        Ok(())
    }

    pub fn with_operator_config(self, config: ServiceCatalogControllerManager) -> Self {
        self.state().operator_config = Some(config);
        self
    }

    pub fn operator_config(&self) -> Option<ServiceCatalogControllerManager> {
        self.state().operator_config.clone()
    }

    pub fn operator_status_writes(&self) -> usize {
        self.state().operator_status_writes
    }

    pub fn put_proxy(&self, proxy: Proxy) {
        self.state().proxy = Some(proxy);
    }

    pub fn remove_proxy(&self) {
        self.state().proxy = None;
    }

    pub fn put_namespace(&self, name: &str) {
        self.state().namespaces.insert(name.to_string());
    }

    pub fn namespace_exists(&self, name: &str) -> bool {
        self.state().namespaces.contains(name)
    }

    pub fn manifest(&self, kind: &str, namespace: Option<&str>, name: &str) -> Option<Value> {
        self.state()
            .manifests
            .get(&manifest_key(kind, namespace, name))
            .cloned()
    }

    /// Asset files whose apply wrote something, in order
    pub fn changed_files(&self) -> Vec<String> {
        self.state().changed_files.clone()
    }

    pub fn put_config_map(&self, config_map: ConfigMap) {
        let k = object_key(&config_map);
        self.state().config_maps.insert(k, config_map);
    }

    pub fn config_map(&self, namespace: &str, name: &str) -> Option<ConfigMap> {
        self.state().config_maps.get(&key(namespace, name)).cloned()
    }

    pub fn remove_config_map(&self, namespace: &str, name: &str) {
        self.state().config_maps.remove(&key(namespace, name));
    }

    pub fn put_secret(&self, secret: Secret) {
        let k = object_key(&secret);
        self.state().secrets.insert(k, secret);
    }

    pub fn put_daemon_set(&self, daemon_set: DaemonSet) {
        let k = object_key(&daemon_set);
        self.state().daemon_sets.insert(k, daemon_set);
    }

    pub fn daemon_set(&self, namespace: &str, name: &str) -> Option<DaemonSet> {
        self.state().daemon_sets.get(&key(namespace, name)).cloned()
    }

    pub fn daemon_set_updates(&self) -> usize {
        self.state().daemon_set_updates
    }

    pub fn put_cluster_operator(&self, cluster_operator: ClusterOperator) {
        let name = cluster_operator.name_any();
        self.state().cluster_operators.insert(name, cluster_operator);
    }

    pub fn cluster_operator(&self, name: &str) -> Option<ClusterOperator> {
        self.state().cluster_operators.get(name).cloned()
    }

    pub fn cluster_operator_status_writes(&self) -> usize {
        self.state().cluster_operator_status_writes
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn get_operator_config(
        &self,
        name: &str,
    ) -> Result<Option<ServiceCatalogControllerManager>> {
        self.check("get_operator_config")?;
        Ok(self
            .state()
            .operator_config
            .clone()
            .filter(|config| config.name_any() == name))
    }

    async fn update_operator_status(&self, config: &ServiceCatalogControllerManager) -> Result<()> {
        self.check("update_operator_status")?;
        let mut state = self.state();
        let stored = state
            .operator_config
            .as_mut()
            .ok_or_else(|| OperatorError::NotFound(config.name_any()))?;
        stored.status = config.status.clone();
        state.operator_status_writes += 1;
        Ok(())
    }

    async fn get_proxy(&self, name: &str) -> Result<Option<Proxy>> {
        self.check("get_proxy")?;
        Ok(self
            .state()
            .proxy
            .clone()
            .filter(|proxy| proxy.name_any() == name))
    }

    async fn delete_namespace(&self, name: &str) -> Result<bool> {
        self.check("delete_namespace")?;
        let mut state = self.state();
        state.manifests.remove(&manifest_key("Namespace", None, name));
        Ok(state.namespaces.remove(name))
    }

    async fn apply_manifest(&self, manifest: &Manifest) -> Result<bool> {
        self.check(&format!("apply_manifest:{}", manifest.kind))?;
        let mut state = self.state();
        let k = manifest_key(&manifest.kind, manifest.namespace.as_deref(), &manifest.name);
        if state.manifests.get(&k) == Some(&manifest.object) {
            return Ok(false);
        }
        state.manifests.insert(k, manifest.object.clone());
        if manifest.kind == "Namespace" {
            state.namespaces.insert(manifest.name.clone());
        }
        state.changed_files.push(manifest.file.clone());
        Ok(true)
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        self.check("get_config_map")?;
        Ok(self.config_map(namespace, name))
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap> {
        self.check("create_config_map")?;
        let k = object_key(config_map);
        let mut state = self.state();
        if state.config_maps.contains_key(&k) {
            return Err(OperatorError::KubeApi(format!("configmap {}/{} already exists", k.0, k.1)));
        }
        state.config_maps.insert(k, config_map.clone());
        Ok(config_map.clone())
    }

    async fn update_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap> {
        self.check("update_config_map")?;
        let k = object_key(config_map);
        let mut state = self.state();
        if !state.config_maps.contains_key(&k) {
            return Err(OperatorError::NotFound(format!("configmap {}/{}", k.0, k.1)));
        }
        state.config_maps.insert(k, config_map.clone());
        Ok(config_map.clone())
    }

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<bool> {
        self.check("delete_config_map")?;
        Ok(self
            .state()
            .config_maps
            .remove(&key(namespace, name))
            .is_some())
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        self.check("get_secret")?;
        Ok(self.state().secrets.get(&key(namespace, name)).cloned())
    }

    async fn get_daemon_set(&self, namespace: &str, name: &str) -> Result<Option<DaemonSet>> {
        self.check("get_daemon_set")?;
        Ok(self.daemon_set(namespace, name))
    }

    async fn create_daemon_set(&self, daemon_set: &DaemonSet) -> Result<DaemonSet> {
        self.check("create_daemon_set")?;
        self.put_daemon_set(daemon_set.clone());
        Ok(daemon_set.clone())
    }

    async fn update_daemon_set(&self, daemon_set: &DaemonSet) -> Result<DaemonSet> {
        self.check("update_daemon_set")?;
        let k = object_key(daemon_set);
        let mut state = self.state();
        if !state.daemon_sets.contains_key(&k) {
            return Err(OperatorError::NotFound(format!("daemonset {}/{}", k.0, k.1)));
        }
        state.daemon_sets.insert(k, daemon_set.clone());
        state.daemon_set_updates += 1;
        Ok(daemon_set.clone())
    }

    async fn get_cluster_operator(&self, name: &str) -> Result<Option<ClusterOperator>> {
        self.check("get_cluster_operator")?;
        Ok(self.cluster_operator(name))
    }

    async fn create_cluster_operator(
        &self,
        cluster_operator: &ClusterOperator,
    ) -> Result<ClusterOperator> {
        self.check("create_cluster_operator")?;
        self.put_cluster_operator(cluster_operator.clone());
        Ok(cluster_operator.clone())
    }

    async fn update_cluster_operator_status(&self, cluster_operator: &ClusterOperator) -> Result<()> {
        self.check("update_cluster_operator_status")?;
        let name = cluster_operator.name_any();
        let mut state = self.state();
        let stored = state
            .cluster_operators
            .get_mut(&name)
            .ok_or_else(|| OperatorError::NotFound(format!("clusteroperator {}", name)))?;
        stored.status = cluster_operator.status.clone();
        state.cluster_operator_status_writes += 1;
        Ok(())
    }
}
