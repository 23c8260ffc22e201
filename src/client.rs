//! Cluster access for the controllers
//!
//! Every read and write the reconcilers perform goes through [`ClusterClient`]
//! so the sync logic can run against a fake cluster in tests.

use crate::assets::Manifest;
use crate::constants::FIELD_MANAGER;
use crate::crd::{ClusterOperator, Proxy, ServiceCatalogControllerManager};
use crate::error::{OperatorError, Result};
use crate::resource::is_subset;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret};
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, GroupVersionKind, Patch, PatchParams,
    PostParams,
};
use kube::{Client, Resource, ResourceExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

/// Trait abstracting the Kubernetes operations the operator needs
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Fetch the operator config by name
    async fn get_operator_config(&self, name: &str)
        -> Result<Option<ServiceCatalogControllerManager>>;

    /// Write the status subresource of the operator config
    async fn update_operator_status(&self, config: &ServiceCatalogControllerManager) -> Result<()>;

    /// Fetch the cluster-wide Proxy config by name
    async fn get_proxy(&self, name: &str) -> Result<Option<Proxy>>;

    /// Delete a namespace. Returns false when it did not exist.
    async fn delete_namespace(&self, name: &str) -> Result<bool>;

    /// Create the manifest's object, or apply it when the live object does
    /// not already contain it. Returns whether anything was written.
    async fn apply_manifest(&self, manifest: &Manifest) -> Result<bool>;

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>>;
    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap>;
    async fn update_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap>;

    /// Delete a ConfigMap. Returns false when it did not exist.
    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<bool>;

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>>;

    async fn get_daemon_set(&self, namespace: &str, name: &str) -> Result<Option<DaemonSet>>;
    async fn create_daemon_set(&self, daemon_set: &DaemonSet) -> Result<DaemonSet>;
    async fn update_daemon_set(&self, daemon_set: &DaemonSet) -> Result<DaemonSet>;

    async fn get_cluster_operator(&self, name: &str) -> Result<Option<ClusterOperator>>;
    async fn create_cluster_operator(&self, cluster_operator: &ClusterOperator)
        -> Result<ClusterOperator>;

    /// Write the status subresource of a ClusterOperator
    async fn update_cluster_operator_status(&self, cluster_operator: &ClusterOperator) -> Result<()>;
}

/// Real Kubernetes client implementation
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    /// Create a new KubeClusterClient wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn namespaced<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn dynamic_api(&self, manifest: &Manifest) -> Api<DynamicObject> {
        let (group, version) = manifest.group_version();
        let gvk = GroupVersionKind::gvk(group, version, &manifest.kind);
        let resource = ApiResource::from_gvk(&gvk);
        match &manifest.namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        }
    }
}

fn required_name<K: Resource>(obj: &K) -> Result<String> {
    obj.meta()
        .name
        .clone()
        .ok_or_else(|| OperatorError::InvalidState("object has no metadata.name".to_string()))
}

fn required_namespace<K: Resource>(obj: &K) -> Result<String> {
    obj.namespace()
        .ok_or_else(|| OperatorError::InvalidState("object has no metadata.namespace".to_string()))
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get_operator_config(
        &self,
        name: &str,
    ) -> Result<Option<ServiceCatalogControllerManager>> {
        let api: Api<ServiceCatalogControllerManager> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }

    async fn update_operator_status(&self, config: &ServiceCatalogControllerManager) -> Result<()> {
        let api: Api<ServiceCatalogControllerManager> = Api::all(self.client.clone());
        let patch = serde_json::json!({
            "status": config.status
        });
        api.patch_status(
            &required_name(config)?,
            &PatchParams::default(),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }

    async fn get_proxy(&self, name: &str) -> Result<Option<Proxy>> {
        let api: Api<Proxy> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }

    async fn delete_namespace(&self, name: &str) -> Result<bool> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn apply_manifest(&self, manifest: &Manifest) -> Result<bool> {
        let api = self.dynamic_api(manifest);

        match api.get_opt(&manifest.name).await? {
            None => {
                let obj: DynamicObject = serde_json::from_value(manifest.object.clone())?;
                api.create(&PostParams::default(), &obj).await?;
                debug!(kind = %manifest.kind, name = %manifest.name, "Created manifest object");
                Ok(true)
            }
            Some(existing) => {
                let live = serde_json::to_value(&existing)?;
                let mut required = manifest.object.clone();
                if let Some(obj) = required.as_object_mut() {
                    obj.remove("apiVersion");
                    obj.remove("kind");
                }
                if is_subset(&required, &live) {
                    return Ok(false);
                }
                api.patch(
                    &manifest.name,
                    &PatchParams::apply(FIELD_MANAGER).force(),
                    &Patch::Apply(&manifest.object),
                )
                .await?;
                debug!(kind = %manifest.kind, name = %manifest.name, "Applied manifest object");
                Ok(true)
            }
        }
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        Ok(self.namespaced::<ConfigMap>(namespace).get_opt(name).await?)
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap> {
        let api = self.namespaced::<ConfigMap>(&required_namespace(config_map)?);
        Ok(api.create(&PostParams::default(), config_map).await?)
    }

    async fn update_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap> {
        let api = self.namespaced::<ConfigMap>(&required_namespace(config_map)?);
        Ok(api
            .replace(&required_name(config_map)?, &PostParams::default(), config_map)
            .await?)
    }

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<bool> {
        match self
            .namespaced::<ConfigMap>(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        Ok(self.namespaced::<Secret>(namespace).get_opt(name).await?)
    }

    async fn get_daemon_set(&self, namespace: &str, name: &str) -> Result<Option<DaemonSet>> {
        Ok(self.namespaced::<DaemonSet>(namespace).get_opt(name).await?)
    }

    async fn create_daemon_set(&self, daemon_set: &DaemonSet) -> Result<DaemonSet> {
        let api = self.namespaced::<DaemonSet>(&required_namespace(daemon_set)?);
        Ok(api.create(&PostParams::default(), daemon_set).await?)
    }

    async fn update_daemon_set(&self, daemon_set: &DaemonSet) -> Result<DaemonSet> {
        let api = self.namespaced::<DaemonSet>(&required_namespace(daemon_set)?);
        Ok(api
            .replace(&required_name(daemon_set)?, &PostParams::default(), daemon_set)
            .await?)
    }

    async fn get_cluster_operator(&self, name: &str) -> Result<Option<ClusterOperator>> {
        let api: Api<ClusterOperator> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }

    async fn create_cluster_operator(
        &self,
        cluster_operator: &ClusterOperator,
    ) -> Result<ClusterOperator> {
        let api: Api<ClusterOperator> = Api::all(self.client.clone());
        Ok(api.create(&PostParams::default(), cluster_operator).await?)
    }

    async fn update_cluster_operator_status(&self, cluster_operator: &ClusterOperator) -> Result<()> {
        let api: Api<ClusterOperator> = Api::all(self.client.clone());
        let patch = serde_json::json!({
            "status": cluster_operator.status
        });
        api.patch_status(
            &required_name(cluster_operator)?,
            &PatchParams::default(),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }
}
