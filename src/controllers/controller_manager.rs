//! Controller Manager Controller
//!
//! Reconciles the `cluster` ServiceCatalogControllerManager into the
//! operand: namespace, RBAC, config, trusted CA and client CA ConfigMaps, the
//! ServiceMonitor and the controller-manager DaemonSet. Every watched object
//! maps to the single `cluster` key, so a sync always works from the whole
//! picture.

use super::rate_limit::{ItemBackoff, TokenBucket};
use crate::assets::{self, Manifest};
use crate::client::{ClusterClient, KubeClusterClient};
use crate::conditions::{
    build_condition, set_condition, CONDITION_AVAILABLE, CONDITION_DEGRADED, CONDITION_FALSE,
    CONDITION_PROGRESSING, CONDITION_TRUE, CONDITION_UNKNOWN, CONDITION_UPGRADEABLE,
    CONDITION_WORKLOAD_DEGRADED, REASON_AS_EXPECTED,
};
use crate::config::Settings;
use crate::constants::{
    CLIENT_CA, DAEMON_SET_NAME, KUBE_APISERVER_NAMESPACE, OPERATOR_CONFIG_NAME, SERVING_CERT,
    TARGET_NAMESPACE, TRUSTED_CA_BUNDLE, VERSION_ANNOTATION,
};
use crate::crd::{LogLevel, ManagementState, Proxy, ServiceCatalogControllerManager};
use crate::error::{OperatorError, Result};
use crate::events::{reasons, EventPublisher};
use crate::proxy::{add_proxy_to_environment, first_container, proxy_env_changed};
use crate::resource::{
    apply_config_map, apply_daemon_set, ensure_object_meta, expected_daemon_set_generation,
    input_hashes, merge_config_map, set_daemon_set_generation, sync_config_map, InputRef,
};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, KeyToPath, Namespace, ObjectReference, Service,
    ServiceAccount, Volume, VolumeMount,
};
use kube::api::Api;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::events::EventType;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config;
use kube::{Client, Resource};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Manifests applied as-is, in order
pub const DIRECT_MANIFESTS: [&str; 12] = [
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
];

/// Manifests whose change must roll the DaemonSet
const FORCE_ROLLOUT_MANIFESTS: [&str; 1] = ["sa.yaml"];

const CONFIG_KEY: &str = "config.yaml";
const TRUSTED_CA_MOUNT_PATH: &str = "/etc/pki/ca-trust/extracted/pem/";
const TRUSTED_CA_KEY: &str = "ca-bundle.crt";
const TRUSTED_CA_PATH: &str = "tls-ca-bundle.pem";

const REASON_MANAGED: &str = "Managed";
const REASON_UNMANAGED: &str = "Unmanaged";
const REASON_REMOVED: &str = "Removed";
const REASON_NO_PODS_AVAILABLE: &str = "NoPodsAvailable";
const REASON_DESIRED_STATE_ACHIEVED: &str = "DesiredStateAchieved";
const REASON_DESIRED_STATE_NOT_YET_ACHIEVED: &str = "DesiredStateNotYetAchieved";
const REASON_SYNC_ERROR: &str = "SyncError";

const SERVICE_CATALOG_DOCS: &str = "https://docs.openshift.com/container-platform/4.4/applications/service_brokers/installing-service-catalog.html";

/// Reconciler for the controller manager operand
pub struct ControllerManagerController {
    cluster: Arc<dyn ClusterClient>,
    events: Arc<dyn EventPublisher>,
    settings: Settings,
    limiter: Mutex<TokenBucket>,
    backoff: Mutex<ItemBackoff>,
}

impl ControllerManagerController {
    /// Create a controller talking to the cluster behind `client`
    pub fn new(client: Client, events: Arc<dyn EventPublisher>, settings: Settings) -> Self {
        Self::with_cluster(Arc::new(KubeClusterClient::new(client)), events, settings)
    }

    pub fn with_cluster(
        cluster: Arc<dyn ClusterClient>,
        events: Arc<dyn EventPublisher>,
        settings: Settings,
    ) -> Self {
        Self {
            cluster,
            events,
            settings,
            limiter: Mutex::new(TokenBucket::default()),
            backoff: Mutex::new(ItemBackoff::default()),
        }
    }

    /// Run the controller until shutdown
    pub async fn run(self: Arc<Self>, client: Client) -> Result<()> {
        let configs: Api<ServiceCatalogControllerManager> = Api::all(client.clone());
        let by_name = |name: &str| Config::default().fields(&format!("metadata.name={}", name));

        info!("Starting ServiceCatalogControllerManager controller");

        Controller::new(configs, by_name(OPERATOR_CONFIG_NAME))
            .watches(
                Api::<Proxy>::all(client.clone()),
                by_name(OPERATOR_CONFIG_NAME),
                |_| Some(work_key()),
            )
            .watches(
                Api::<ConfigMap>::namespaced(client.clone(), TARGET_NAMESPACE),
                Config::default(),
                |_| Some(work_key()),
            )
            .watches(
                Api::<ServiceAccount>::namespaced(client.clone(), TARGET_NAMESPACE),
                Config::default(),
                |_| Some(work_key()),
            )
            .watches(
                Api::<Service>::namespaced(client.clone(), TARGET_NAMESPACE),
                Config::default(),
                |_| Some(work_key()),
            )
            .watches(
                Api::<DaemonSet>::namespaced(client.clone(), TARGET_NAMESPACE),
                Config::default(),
                |_| Some(work_key()),
            )
            .watches(
                Api::<Namespace>::all(client),
                by_name(TARGET_NAMESPACE),
                |_| Some(work_key()),
            )
            .shutdown_on_signal()
            .run(
                |config, ctx| async move { ctx.reconcile(config).await },
                |_config, error, ctx| {
                    let delay = ctx.next_backoff();
                    error!(error = %error, retry_in_ms = delay.as_millis() as u64, "Sync failed");
                    Action::requeue(delay)
                },
                Arc::clone(&self),
            )
            .for_each(|result| async move {
                match result {
                    Ok((obj, _action)) => debug!(name = %obj.name, "Synced operator config"),
                    Err(e) => warn!(error = %e, "Controller error"),
                }
            })
            .await;

        Ok(())
    }

    async fn reconcile(
        &self,
        _config: Arc<ServiceCatalogControllerManager>,
    ) -> std::result::Result<Action, OperatorError> {
        self.wait_for_token().await;

        let requeue = self.sync().await?;
        if requeue {
            let delay = self.next_backoff();
            info!(retry_in_ms = delay.as_millis() as u64, "Sync reported errors, requeueing");
            return Ok(Action::requeue(delay));
        }

        self.backoff
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .reset();
        Ok(Action::requeue(self.settings.resync_interval))
    }

    async fn wait_for_token(&self) {
        let delay = self
            .limiter
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .reserve(Instant::now());
        if !delay.is_zero() {
            debug!(wait_ms = delay.as_millis() as u64, "Throttling sync");
            tokio::time::sleep(delay).await;
        }
    }

    fn next_backoff(&self) -> std::time::Duration {
        self.backoff
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .next_delay()
    }

    /// One pass over the operator config. Returns whether the pass collected
    /// errors and should be retried with backoff.
    pub async fn sync(&self) -> Result<bool> {
        let config = self
            .cluster
            .get_operator_config(OPERATOR_CONFIG_NAME)
            .await?
            .ok_or_else(|| {
                OperatorError::NotFound(format!(
                    "servicecatalogcontrollermanagers.operator.openshift.io {:?}",
                    OPERATOR_CONFIG_NAME
                ))
            })?;

        match &config.spec.management_state {
            ManagementState::Managed => {}
            ManagementState::Unmanaged => {
                self.sync_unmanaged(&config).await?;
                return Ok(false);
            }
            ManagementState::Removed => {
                self.sync_removed(&config).await?;
                return Ok(false);
            }
            ManagementState::Unknown(value) => {
                warn!(state = %value, "Unrecognized operator management state");
                self.publish(
                    EventType::Warning,
                    reasons::MANAGEMENT_STATE_UNKNOWN,
                    format!("Unrecognized operator management state {:?}", value),
                )
                .await;
                return Ok(false);
            }
        }

        let proxy = match self.cluster.get_proxy(OPERATOR_CONFIG_NAME).await {
            Ok(proxy) => proxy,
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };

        let mut managed = config.clone();
        set_condition(
            &mut managed.status.get_or_insert_with(Default::default).conditions,
            build_condition(
                CONDITION_UPGRADEABLE,
                CONDITION_FALSE,
                REASON_MANAGED,
                &format!(
                    "the controller manager is in a managed state, upgrades are not possible. Service Catalog must be removed before upgrading, see {}",
                    SERVICE_CATALOG_DOCS
                ),
            ),
        );

        self.sync_to_latest(&config, managed, proxy.as_ref()).await
    }

    async fn sync_unmanaged(&self, original: &ServiceCatalogControllerManager) -> Result<()> {
        let mut config = original.clone();
        let conditions = &mut config.status.get_or_insert_with(Default::default).conditions;
        for (condition_type, status, message) in [
            (
                CONDITION_AVAILABLE,
                CONDITION_UNKNOWN,
                "the controller manager is in an unmanaged state, therefore its availability is unknown.",
            ),
            (
                CONDITION_PROGRESSING,
                CONDITION_FALSE,
                "the controller manager is in an unmanaged state, therefore no changes are being applied.",
            ),
            (
                CONDITION_DEGRADED,
                CONDITION_FALSE,
                "the controller manager is in an unmanaged state, therefore no operator actions are degraded.",
            ),
            (
                CONDITION_UPGRADEABLE,
                CONDITION_TRUE,
                "the controller manager is in an unmanaged state, upgrades are possible.",
            ),
        ] {
            set_condition(
                conditions,
                build_condition(condition_type, status, REASON_UNMANAGED, message),
            );
        }

        self.write_status_if_changed(original, &config).await
    }

    async fn sync_removed(&self, original: &ServiceCatalogControllerManager) -> Result<()> {
        if self.cluster.delete_namespace(TARGET_NAMESPACE).await? {
            info!(namespace = TARGET_NAMESPACE, "Deleted operand namespace");
            self.publish(
                EventType::Normal,
                reasons::NAMESPACE_DELETED,
                format!("Deleted namespace {} because the operand was removed", TARGET_NAMESPACE),
            )
            .await;
        }

        let mut config = original.clone();
        let status = config.status.get_or_insert_with(Default::default);
        for (condition_type, condition_status, message) in [
            (CONDITION_AVAILABLE, CONDITION_TRUE, ""),
            (CONDITION_PROGRESSING, CONDITION_FALSE, ""),
            (CONDITION_DEGRADED, CONDITION_FALSE, ""),
            (
                CONDITION_UPGRADEABLE,
                CONDITION_TRUE,
                "the controller manager is in a removed state, upgrades are possible.",
            ),
        ] {
            set_condition(
                &mut status.conditions,
                build_condition(condition_type, condition_status, REASON_REMOVED, message),
            );
        }
        // the version is reported even though nothing is running
        status.version = self.settings.release_version.clone();

        self.write_status_if_changed(original, &config).await
    }

    async fn write_status_if_changed(
        &self,
        original: &ServiceCatalogControllerManager,
        config: &ServiceCatalogControllerManager,
    ) -> Result<()> {
        if config.status == original.status {
            return Ok(());
        }
        self.cluster.update_operator_status(config).await?;
        debug!("Updated operator config status");
        Ok(())
    }

    /// Bring the operand to the state described by `config`.
    ///
    /// Failures of individual steps are collected into the WorkloadDegraded
    /// condition instead of aborting the pass. Returns whether any were
    /// collected.
    pub async fn sync_to_latest(
        &self,
        original: &ServiceCatalogControllerManager,
        mut config: ServiceCatalogControllerManager,
        proxy: Option<&Proxy>,
    ) -> Result<bool> {
        let mut errors: Vec<String> = Vec::new();
        let mut force_rollout = false;

        for file in DIRECT_MANIFESTS {
            let path = assets::path(file);
            match self.apply_direct(&path).await {
                Ok(changed) => {
                    if changed && FORCE_ROLLOUT_MANIFESTS.contains(&file) {
                        force_rollout = true;
                    }
                }
                Err((kind, e)) => errors.push(format!("{:?} ({}): {}", path, kind, e)),
            }
        }

        if let Err((_, e)) = self.apply_direct(&assets::path("servicemonitor.yaml")).await {
            errors.push(format!("{:?}: {}", "servicemonitor", e));
        }

        let config_changed = self
            .manage_config_map(&config)
            .await
            .unwrap_or_else(|e| {
                errors.push(format!("{:?}: {}", "configmap", e));
                false
            });

        let trusted_ca_changed = self.manage_trusted_ca().await.unwrap_or_else(|e| {
            errors.push(format!("{:?}: {}", "configmap", e));
            false
        });

        // the kube-apiserver is the source of truth for client CA bundles
        let client_ca_changed =
            sync_config_map(self.cluster.as_ref(), KUBE_APISERVER_NAMESPACE, CLIENT_CA, TARGET_NAMESPACE, CLIENT_CA)
                .await
                .unwrap_or_else(|e| {
                    errors.push(format!("{:?}: {}", "client-ca", e));
                    false
                });

        let generation = config.metadata.generation.unwrap_or_default();
        let observed_generation = config
            .status
            .as_ref()
            .map(|s| s.observed_generation)
            .unwrap_or_default();

        force_rollout = force_rollout
            || generation != observed_generation
            || config_changed
            || trusted_ca_changed
            || client_ca_changed;

        let daemon_set = match self
            .manage_daemon_set(&config, force_rollout, proxy)
            .await
        {
            Ok(daemon_set) => Some(daemon_set),
            Err(e) => {
                errors.push(format!("{:?}: {}", "deployment", e));
                None
            }
        };

        let ds_status = daemon_set
            .as_ref()
            .and_then(|ds| ds.status.clone())
            .unwrap_or_default();
        let number_available = ds_status.number_available.unwrap_or_default();

        let status = config.status.get_or_insert_with(Default::default);

        if number_available > 0 {
            set_condition(
                &mut status.conditions,
                build_condition(CONDITION_AVAILABLE, CONDITION_TRUE, REASON_AS_EXPECTED, ""),
            );
        } else {
            set_condition(
                &mut status.conditions,
                build_condition(
                    CONDITION_AVAILABLE,
                    CONDITION_FALSE,
                    REASON_NO_PODS_AVAILABLE,
                    "no daemon pods available on any node.",
                ),
            );
        }

        if number_available > 0
            && ds_status.updated_number_scheduled.unwrap_or_default()
                == ds_status.current_number_scheduled
        {
            let version = daemon_set
                .as_ref()
                .and_then(|ds| ds.metadata.annotations.as_ref())
                .and_then(|annotations| annotations.get(VERSION_ANNOTATION))
                .filter(|version| !version.is_empty());
            if let Some(version) = version {
                status.version = version.clone();
            }
        }

        let mut progressing = Vec::new();
        if let Some(ds) = &daemon_set {
            let desired = ds.metadata.generation.unwrap_or_default();
            let observed = ds_status.observed_generation.unwrap_or_default();
            if desired != observed {
                progressing.push(format!(
                    "daemonset/{}: observed generation is {}, desired generation is {}.",
                    DAEMON_SET_NAME, observed, desired
                ));
            }
        }
        if generation != status.observed_generation {
            progressing.push(format!(
                "servicecatalogcontrollermanagers.operator.openshift.io/{}: observed generation is {}, desired generation is {}.",
                OPERATOR_CONFIG_NAME, status.observed_generation, generation
            ));
        }
        if progressing.is_empty() {
            set_condition(
                &mut status.conditions,
                build_condition(
                    CONDITION_PROGRESSING,
                    CONDITION_FALSE,
                    REASON_DESIRED_STATE_ACHIEVED,
                    "",
                ),
            );
        } else {
            set_condition(
                &mut status.conditions,
                build_condition(
                    CONDITION_PROGRESSING,
                    CONDITION_TRUE,
                    REASON_DESIRED_STATE_NOT_YET_ACHIEVED,
                    &progressing.join("\n"),
                ),
            );
        }

        status.observed_generation = generation;
        if let Some(ds) = &daemon_set {
            set_daemon_set_generation(&mut status.generations, ds);
        }
        status.ready_replicas = number_available;

        if errors.is_empty() {
            set_condition(
                &mut status.conditions,
                build_condition(
                    CONDITION_WORKLOAD_DEGRADED,
                    CONDITION_FALSE,
                    REASON_AS_EXPECTED,
                    "",
                ),
            );
        } else {
            let message: String = errors.iter().map(|e| format!("{}\n", e)).collect();
            warn!(errors = errors.len(), "Sync finished with errors");
            set_condition(
                &mut status.conditions,
                build_condition(
                    CONDITION_WORKLOAD_DEGRADED,
                    CONDITION_TRUE,
                    REASON_SYNC_ERROR,
                    &message,
                ),
            );
        }

        self.write_status_if_changed(original, &config).await?;

        Ok(!errors.is_empty())
    }

    /// Apply an embedded manifest. Errors carry the manifest kind when known.
    async fn apply_direct(&self, path: &str) -> std::result::Result<bool, (String, OperatorError)> {
        let manifest = Manifest::load(path).map_err(|e| ("Unknown".to_string(), e))?;
        let changed = self
            .cluster
            .apply_manifest(&manifest)
            .await
            .map_err(|e| (manifest.kind.clone(), e))?;
        if changed {
            debug!(file = %path, kind = %manifest.kind, "Applied manifest");
        }
        Ok(changed)
    }

    /// Render and apply the operand config. Returns whether it changed.
    async fn manage_config_map(&self, config: &ServiceCatalogControllerManager) -> Result<bool> {
        let template = assets::read_config_map(&assets::path("cm.yaml"))?;
        let default_config = assets::asset(&assets::path("defaultconfig.yaml"))?;
        let overrides = raw_config(config.spec.unsupported_config_overrides.as_ref())?;
        let observed = raw_config(config.spec.observed_config.as_ref())?;

        let mut required = merge_config_map(
            template,
            CONFIG_KEY,
            &[default_config.as_bytes(), &overrides, &observed],
        )?;

        // input hashes roll the operand when a mounted input changes
        let hashes = input_hashes(
            self.cluster.as_ref(),
            &[
                InputRef::config_map(TARGET_NAMESPACE, CLIENT_CA),
                InputRef::secret(TARGET_NAMESPACE, SERVING_CERT),
            ],
        )
        .await?;
        required.data.get_or_insert_with(BTreeMap::new).extend(hashes);

        let (_, changed) = apply_config_map(self.cluster.as_ref(), &required).await?;
        Ok(changed)
    }

    /// Make sure the trusted CA ConfigMap exists and carries the injection
    /// label. Its content is owned by the network operator.
    async fn manage_trusted_ca(&self) -> Result<bool> {
        let required = assets::read_config_map(&assets::path("trusted-ca.yaml"))?;

        let Some(existing) = self
            .cluster
            .get_config_map(TARGET_NAMESPACE, TRUSTED_CA_BUNDLE)
            .await?
        else {
            return match self.cluster.create_config_map(&required).await {
                Ok(_) => {
                    self.publish(
                        EventType::Normal,
                        reasons::CONFIG_MAP_CREATED,
                        format!(
                            "Created configmap/{} -n {} because it was missing",
                            TRUSTED_CA_BUNDLE, TARGET_NAMESPACE
                        ),
                    )
                    .await;
                    Ok(true)
                }
                Err(e) => {
                    self.publish(
                        EventType::Warning,
                        reasons::CONFIG_MAP_CREATE_FAILED,
                        format!(
                            "Failed to create configmap/{} -n {}: {}",
                            TRUSTED_CA_BUNDLE, TARGET_NAMESPACE, e
                        ),
                    )
                    .await;
                    Err(e)
                }
            };
        };

        let mut modified = false;
        let mut updated = existing;
        ensure_object_meta(&mut modified, &mut updated.metadata, &required.metadata);
        if !modified {
            return Ok(false);
        }

        match self.cluster.update_config_map(&updated).await {
            Ok(_) => {
                self.publish(
                    EventType::Normal,
                    reasons::CONFIG_MAP_UPDATED,
                    format!(
                        "Updated configmap/{} -n {} because its metadata changed",
                        TRUSTED_CA_BUNDLE, TARGET_NAMESPACE
                    ),
                )
                .await;
                Ok(true)
            }
            Err(e) => {
                self.publish(
                    EventType::Warning,
                    reasons::CONFIG_MAP_UPDATE_FAILED,
                    format!(
                        "Failed to update configmap/{} -n {}: {}",
                        TRUSTED_CA_BUNDLE, TARGET_NAMESPACE, e
                    ),
                )
                .await;
                Err(e)
            }
        }
    }

    /// Build the desired DaemonSet and apply it
    async fn manage_daemon_set(
        &self,
        config: &ServiceCatalogControllerManager,
        mut force_rollout: bool,
        proxy: Option<&Proxy>,
    ) -> Result<DaemonSet> {
        let mut required = assets::read_daemon_set(&assets::path("ds.yaml"))?;

        let level = LogLevel::verbosity(config.spec.log_level.clone());
        {
            let container = first_container(&mut required)
                .ok_or_else(|| OperatorError::Manifest("ds.yaml: no containers".to_string()))?;
            if !self.settings.image_pull_spec.is_empty() {
                container.image = Some(self.settings.image_pull_spec.clone());
            }
            container
                .args
                .get_or_insert_with(Vec::new)
                .push(format!("-v={}", level));
        }

        if self
            .cluster
            .get_config_map(TARGET_NAMESPACE, TRUSTED_CA_BUNDLE)
            .await?
            .is_some()
        {
            add_trusted_ca_volume(&mut required);
        }

        let existing = self
            .cluster
            .get_daemon_set(TARGET_NAMESPACE, DAEMON_SET_NAME)
            .await?;
        match &existing {
            None => {
                if let Some(proxy) = proxy {
                    debug!("Proxy configured and no DaemonSet yet, adding proxy environment");
                    add_proxy_to_environment(&mut required, proxy);
                    force_rollout = true;
                }
            }
            Some(live) => {
                let env = live
                    .spec
                    .as_ref()
                    .and_then(|spec| spec.template.spec.as_ref())
                    .and_then(|pod| pod.containers.first())
                    .map(|container| container.env.clone().unwrap_or_default())
                    .ok_or_else(|| {
                        OperatorError::InvalidState(
                            "the existing daemonset has no defined containers".to_string(),
                        )
                    })?;
                if proxy_env_changed(&env, proxy) {
                    info!("Proxy environment changed, forcing rollout");
                    force_rollout = true;
                }
                if let Some(proxy) = proxy {
                    add_proxy_to_environment(&mut required, proxy);
                }
            }
        }

        required
            .metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(
                VERSION_ANNOTATION.to_string(),
                self.settings.release_version.clone(),
            );

        let generations = config
            .status
            .as_ref()
            .map(|s| s.generations.as_slice())
            .unwrap_or_default();
        let expected_generation = expected_daemon_set_generation(&required, generations);

        let (daemon_set, changed) = apply_daemon_set(
            self.cluster.as_ref(),
            &required,
            expected_generation,
            force_rollout,
        )
        .await?;

        if changed {
            let (reason, verb) = if existing.is_none() {
                (reasons::DAEMON_SET_CREATED, "Created")
            } else {
                (reasons::DAEMON_SET_UPDATED, "Updated")
            };
            self.publish(
                EventType::Normal,
                reason,
                format!("{} daemonset/{} -n {}", verb, DAEMON_SET_NAME, TARGET_NAMESPACE),
            )
            .await;
        }

        Ok(daemon_set)
    }

    async fn publish(&self, type_: EventType, reason: &str, note: String) {
        self.events
            .publish(&operator_config_reference(), type_, reason, Some(note))
            .await;
    }
}

fn work_key() -> ObjectRef<ServiceCatalogControllerManager> {
    ObjectRef::new(OPERATOR_CONFIG_NAME)
}

/// Reference to the operator config that events are recorded against
pub fn operator_config_reference() -> ObjectReference {
    ObjectReference {
        api_version: Some(ServiceCatalogControllerManager::api_version(&()).to_string()),
        kind: Some(ServiceCatalogControllerManager::kind(&()).to_string()),
        name: Some(OPERATOR_CONFIG_NAME.to_string()),
        ..Default::default()
    }
}

/// Serialize a free-form config section; absent or null sections are empty.
fn raw_config(value: Option<&serde_json::Value>) -> Result<Vec<u8>> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(Vec::new()),
        Some(value) => Ok(serde_json::to_vec(value)?),
    }
}

/// Mount the trusted CA bundle where the operand's TLS stack looks for it.
pub fn add_trusted_ca_volume(daemon_set: &mut DaemonSet) {
    if let Some(container) = first_container(daemon_set) {
        container
            .volume_mounts
            .get_or_insert_with(Vec::new)
            .push(VolumeMount {
                name: TRUSTED_CA_BUNDLE.to_string(),
                mount_path: TRUSTED_CA_MOUNT_PATH.to_string(),
                ..Default::default()
            });
    }

    if let Some(pod) = daemon_set
        .spec
        .as_mut()
        .and_then(|spec| spec.template.spec.as_mut())
    {
        pod.volumes.get_or_insert_with(Vec::new).push(Volume {
            name: TRUSTED_CA_BUNDLE.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: TRUSTED_CA_BUNDLE.to_string(),
                items: Some(vec![KeyToPath {
                    key: TRUSTED_CA_KEY.to_string(),
                    path: TRUSTED_CA_PATH.to_string(),
                    mode: None,
                }]),
                optional: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockClusterClient;
    use crate::conditions::find_condition;
    use crate::crd::{OperatorSpec, OperatorStatus, ProxySpec, ProxyStatus};
    use crate::events::InMemoryRecorder;
    use crate::testing::{daemon_set_template, FakeCluster};
    use k8s_openapi::api::apps::v1::DaemonSetStatus;
    use k8s_openapi::api::core::v1::{EnvVar, Secret};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use k8s_openapi::ByteString;

    fn operator_config(
        state: ManagementState,
        generation: i64,
        observed_generation: i64,
    ) -> ServiceCatalogControllerManager {
        let mut config = ServiceCatalogControllerManager::new(
            OPERATOR_CONFIG_NAME,
            OperatorSpec {
                management_state: state,
                ..Default::default()
            },
        );
        config.metadata.generation = Some(generation);
        config.status = Some(OperatorStatus {
            observed_generation,
            ..Default::default()
        });
        config
    }

    fn live_daemon_set(generation: i64, observed_generation: i64, available: i32) -> DaemonSet {
        let mut ds = daemon_set_template();
        ds.metadata.generation = Some(generation);
        ds.status = Some(DaemonSetStatus {
            number_available: Some(available),
            observed_generation: Some(observed_generation),
            ..Default::default()
        });
        ds
    }

    fn proxy(http: &str) -> Proxy {
        let mut proxy = Proxy::new(OPERATOR_CONFIG_NAME, ProxySpec::default());
        proxy.status = Some(ProxyStatus {
            http_proxy: http.to_string(),
            ..Default::default()
        });
        proxy
    }

    fn build_controller(cluster: Arc<FakeCluster>) -> (ControllerManagerController, Arc<InMemoryRecorder>) {
        let recorder = Arc::new(InMemoryRecorder::new());
        let controller = ControllerManagerController::with_cluster(
            cluster,
            recorder.clone(),
            Settings::new("quay.io/openshift/origin-service-catalog:v4.4", "4.4.0"),
        );
        (controller, recorder)
    }

    fn stored_condition(cluster: &FakeCluster, condition_type: &str) -> crate::crd::OperatorCondition {
        let config = cluster.operator_config().unwrap();
        let status = config.status.unwrap();
        find_condition(&status.conditions, condition_type)
            .unwrap_or_else(|| panic!("no {} condition", condition_type))
            .clone()
    }

    fn first_env(ds: &DaemonSet) -> Vec<EnvVar> {
        ds.spec.as_ref().unwrap().template.spec.as_ref().unwrap().containers[0]
            .env
            .clone()
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_progressing_condition() {
        // (name, ds generation, ds observed, config generation, config observed, status, message)
        let cases: [(&str, i64, i64, i64, i64, &str, &str); 7] = [
            ("happy path", 100, 100, 100, 100, CONDITION_FALSE, ""),
            (
                "daemonset observed ahead",
                100,
                101,
                100,
                100,
                CONDITION_TRUE,
                "daemonset/controller-manager: observed generation is 101, desired generation is 100.",
            ),
            (
                "daemonset observed behind",
                101,
                100,
                100,
                100,
                CONDITION_TRUE,
                "daemonset/controller-manager: observed generation is 100, desired generation is 101.",
            ),
            (
                "config observed ahead",
                100,
                100,
                100,
                101,
                CONDITION_TRUE,
                "servicecatalogcontrollermanagers.operator.openshift.io/cluster: observed generation is 101, desired generation is 100.",
            ),
            (
                "config observed behind",
                100,
                100,
                101,
                100,
                CONDITION_TRUE,
                "servicecatalogcontrollermanagers.operator.openshift.io/cluster: observed generation is 100, desired generation is 101.",
            ),
            (
                "multiple observed ahead",
                100,
                101,
                100,
                101,
                CONDITION_TRUE,
                "daemonset/controller-manager: observed generation is 101, desired generation is 100.\nservicecatalogcontrollermanagers.operator.openshift.io/cluster: observed generation is 101, desired generation is 100.",
            ),
            (
                "config and daemonset generation mismatch",
                100,
                100,
                101,
                101,
                CONDITION_FALSE,
                "",
            ),
        ];

        for (name, ds_gen, ds_observed, cfg_gen, cfg_observed, status, message) in cases {
            let config = operator_config(ManagementState::Managed, cfg_gen, cfg_observed);
            let cluster = Arc::new(FakeCluster::new().with_operator_config(config.clone()));
            cluster.put_daemon_set(live_daemon_set(ds_gen, ds_observed, 100));
            cluster.put_secret(Secret {
                metadata: ObjectMeta {
                    name: Some(SERVING_CERT.to_string()),
                    namespace: Some(TARGET_NAMESPACE.to_string()),
                    ..Default::default()
                },
                ..Default::default()
            });
            let (controller, _) = build_controller(cluster.clone());

            controller
                .sync_to_latest(&config, config.clone(), Some(&proxy("")))
                .await
                .unwrap();

            let condition = stored_condition(&cluster, CONDITION_PROGRESSING);
            assert_eq!(condition.status, status, "{}", name);
            assert_eq!(condition.message.as_deref().unwrap_or_default(), message, "{}", name);
        }
    }

    #[tokio::test]
    async fn test_upgradeable_per_management_state() {
        let cases = [
            (ManagementState::Managed, CONDITION_FALSE, SERVICE_CATALOG_DOCS),
            (
                ManagementState::Unmanaged,
                CONDITION_TRUE,
                "unmanaged state, upgrades are possible",
            ),
            (
                ManagementState::Removed,
                CONDITION_TRUE,
                "removed state, upgrades are possible",
            ),
        ];

        for (state, status, message) in cases {
            let cluster = Arc::new(
                FakeCluster::new().with_operator_config(operator_config(state.clone(), 100, 100)),
            );
            let mut ds = live_daemon_set(100, 100, 0);
            ds.spec.as_mut().unwrap().template.spec.as_mut().unwrap().containers[0].env =
                Some(vec![EnvVar {
                    name: "HTTP_PROXY".to_string(),
                    value: Some("http://0.0.0.0:8080".to_string()),
                    value_from: None,
                }]);
            cluster.put_daemon_set(ds);
            cluster.put_proxy(proxy(""));
            let (controller, _) = build_controller(cluster.clone());

            controller.sync().await.unwrap();

            let condition = stored_condition(&cluster, CONDITION_UPGRADEABLE);
            assert_eq!(condition.status, status, "{:?}", state);
            assert!(
                condition.message.as_deref().unwrap_or_default().contains(message),
                "{:?}: {:?}",
                state,
                condition.message
            );
        }
    }

    #[tokio::test]
    async fn test_managed_sync_creates_operand() {
        let cluster = Arc::new(
            FakeCluster::new().with_operator_config(operator_config(ManagementState::Managed, 1, 0)),
        );
        cluster.put_config_map(ConfigMap {
            metadata: ObjectMeta {
                name: Some(CLIENT_CA.to_string()),
                namespace: Some(KUBE_APISERVER_NAMESPACE.to_string()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([("ca-bundle.crt".to_string(), "pem".to_string())])),
            ..Default::default()
        });
        cluster.put_secret(Secret {
            metadata: ObjectMeta {
                name: Some(SERVING_CERT.to_string()),
                namespace: Some(TARGET_NAMESPACE.to_string()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(
                "tls.crt".to_string(),
                ByteString(b"cert".to_vec()),
            )])),
            ..Default::default()
        });
        let (controller, recorder) = build_controller(cluster.clone());

        let requeue = controller.sync().await.unwrap();
        assert!(!requeue);

        assert!(cluster.namespace_exists(TARGET_NAMESPACE));
        assert_eq!(cluster.changed_files().len(), DIRECT_MANIFESTS.len() + 1);
        assert!(cluster
            .manifest(
                "ServiceMonitor",
                Some(TARGET_NAMESPACE),
                "service-catalog-controller-manager"
            )
            .is_some());

        // client-ca is hashed before it is copied, so it only shows up next pass
        let config_map = cluster.config_map(TARGET_NAMESPACE, "config").unwrap();
        let data = config_map.data.unwrap();
        assert!(data[CONFIG_KEY].starts_with('{'));
        assert!(!data.contains_key("configmaps.client-ca"));
        assert!(data.contains_key("secrets.serving-cert"));

        assert!(cluster.config_map(TARGET_NAMESPACE, TRUSTED_CA_BUNDLE).is_some());
        assert!(cluster.config_map(TARGET_NAMESPACE, CLIENT_CA).is_some());

        let ds = cluster.daemon_set(TARGET_NAMESPACE, DAEMON_SET_NAME).unwrap();
        assert_eq!(
            ds.metadata.annotations.as_ref().unwrap()[VERSION_ANNOTATION],
            "4.4.0"
        );
        let pod = ds.spec.as_ref().unwrap().template.spec.as_ref().unwrap();
        let container = &pod.containers[0];
        assert_eq!(
            container.image.as_deref(),
            Some("quay.io/openshift/origin-service-catalog:v4.4")
        );
        assert_eq!(container.args.as_ref().unwrap().last().unwrap(), "-v=3");
        assert!(pod
            .volumes
            .as_ref()
            .unwrap()
            .iter()
            .any(|v| v.name == TRUSTED_CA_BUNDLE));

        assert_eq!(
            stored_condition(&cluster, CONDITION_AVAILABLE).reason.as_deref(),
            Some(REASON_NO_PODS_AVAILABLE)
        );
        assert_eq!(
            stored_condition(&cluster, CONDITION_WORKLOAD_DEGRADED).status,
            CONDITION_FALSE
        );
        let status = cluster.operator_config().unwrap().status.unwrap();
        assert_eq!(status.observed_generation, 1);
        assert_eq!(status.generations.len(), 1);

        let reasons = recorder.reasons();
        assert!(reasons.contains(&reasons::CONFIG_MAP_CREATED.to_string()));
        assert!(reasons.contains(&reasons::DAEMON_SET_CREATED.to_string()));

        controller.sync().await.unwrap();
        let data = cluster
            .config_map(TARGET_NAMESPACE, "config")
            .unwrap()
            .data
            .unwrap();
        assert!(data.contains_key("configmaps.client-ca"));
    }

    #[tokio::test]
    async fn test_second_sync_is_quiet() {
        let cluster = Arc::new(
            FakeCluster::new().with_operator_config(operator_config(ManagementState::Managed, 1, 0)),
        );
        let (controller, _) = build_controller(cluster.clone());

        // the first pass reports Progressing until observedGeneration catches up
        controller.sync().await.unwrap();
        assert_eq!(
            stored_condition(&cluster, CONDITION_PROGRESSING).status,
            CONDITION_TRUE
        );
        let writes = cluster.operator_status_writes();

        controller.sync().await.unwrap();
        assert_eq!(cluster.operator_status_writes(), writes + 1);
        assert_eq!(
            stored_condition(&cluster, CONDITION_PROGRESSING).status,
            CONDITION_FALSE
        );
        let writes = cluster.operator_status_writes();
        let updates = cluster.daemon_set_updates();

        controller.sync().await.unwrap();
        assert_eq!(cluster.operator_status_writes(), writes);
        assert_eq!(cluster.daemon_set_updates(), updates);
    }

    #[tokio::test]
    async fn test_proxy_removal_forces_rollout() {
        let cluster = Arc::new(
            FakeCluster::new().with_operator_config(operator_config(ManagementState::Managed, 1, 1)),
        );
        let (controller, _) = build_controller(cluster.clone());
        cluster.put_proxy(proxy("http://proxy:3128"));
        controller.sync().await.unwrap();
        let ds = cluster.daemon_set(TARGET_NAMESPACE, DAEMON_SET_NAME).unwrap();
        assert!(first_env(&ds)
            .iter()
            .any(|e| e.name == "HTTP_PROXY" && e.value.as_deref() == Some("http://proxy:3128")));
        let updates = cluster.daemon_set_updates();

        cluster.remove_proxy();
        controller.sync().await.unwrap();

        assert_eq!(cluster.daemon_set_updates(), updates + 1);
        let ds = cluster.daemon_set(TARGET_NAMESPACE, DAEMON_SET_NAME).unwrap();
        let env = first_env(&ds);
        assert!(env
            .iter()
            .all(|e| !e.name.eq_ignore_ascii_case("HTTP_PROXY")
                && !e.name.eq_ignore_ascii_case("HTTPS_PROXY")
                && !e.name.eq_ignore_ascii_case("NO_PROXY")));
        assert!(ds
            .spec
            .as_ref()
            .unwrap()
            .template
            .metadata
            .as_ref()
            .and_then(|m| m.annotations.as_ref())
            .is_some_and(|a| a.contains_key(crate::constants::FORCE_ROLLOUT_ANNOTATION)));
    }

    #[tokio::test]
    async fn test_reconcile_backs_off_and_resets() {
        let config = operator_config(ManagementState::Managed, 1, 1);
        let cluster = Arc::new(FakeCluster::new().with_operator_config(config.clone()));
        let (controller, _) = build_controller(cluster.clone());
        let config = Arc::new(config);

        cluster.fail("apply_manifest:ServiceMonitor");
        assert_eq!(
            controller.reconcile(config.clone()).await.unwrap(),
            Action::requeue(std::time::Duration::from_millis(5))
        );
        assert_eq!(
            controller.reconcile(config.clone()).await.unwrap(),
            Action::requeue(std::time::Duration::from_millis(10))
        );

        cluster.recover("apply_manifest:ServiceMonitor");
        assert_eq!(
            controller.reconcile(config.clone()).await.unwrap(),
            Action::requeue(controller.settings.resync_interval)
        );

        cluster.fail("apply_manifest:ServiceMonitor");
        assert_eq!(
            controller.reconcile(config).await.unwrap(),
            Action::requeue(std::time::Duration::from_millis(5))
        );
    }

    #[tokio::test]
    async fn test_available_and_version_from_daemon_set() {
        let config = operator_config(ManagementState::Managed, 2, 2);
        let cluster = Arc::new(FakeCluster::new().with_operator_config(config));
        let mut ds = live_daemon_set(5, 5, 3);
        ds.metadata.annotations = Some(BTreeMap::from([(
            VERSION_ANNOTATION.to_string(),
            "4.3.0".to_string(),
        )]));
        if let Some(status) = ds.status.as_mut() {
            status.current_number_scheduled = 3;
            status.updated_number_scheduled = Some(3);
        }
        cluster.put_daemon_set(ds);
        let (controller, _) = build_controller(cluster.clone());

        controller.sync().await.unwrap();

        let available = stored_condition(&cluster, CONDITION_AVAILABLE);
        assert_eq!(available.status, CONDITION_TRUE);
        assert_eq!(available.reason.as_deref(), Some(REASON_AS_EXPECTED));

        let status = cluster.operator_config().unwrap().status.unwrap();
        // the live annotation is overwritten by the apply, so the new version shows
        assert_eq!(status.version, "4.4.0");
        assert_eq!(status.ready_replicas, 3);
    }

    #[tokio::test]
    async fn test_proxy_change_forces_rollout() {
        let cluster = Arc::new(
            FakeCluster::new().with_operator_config(operator_config(ManagementState::Managed, 3, 3)),
        );
        let (controller, _) = build_controller(cluster.clone());
        cluster.put_proxy(proxy("http://proxy-a:3128"));
        controller.sync().await.unwrap();

        let ds = cluster.daemon_set(TARGET_NAMESPACE, DAEMON_SET_NAME).unwrap();
        assert!(first_env(&ds)
            .iter()
            .any(|v| v.name == "http_proxy" && v.value.as_deref() == Some("http://proxy-a:3128")));

        let updates = cluster.daemon_set_updates();
        cluster.put_proxy(proxy("http://proxy-b:3128"));
        controller.sync().await.unwrap();
        assert_eq!(cluster.daemon_set_updates(), updates + 1);

        let ds = cluster.daemon_set(TARGET_NAMESPACE, DAEMON_SET_NAME).unwrap();
        let env = first_env(&ds);
        assert!(env
            .iter()
            .any(|v| v.name == "HTTP_PROXY" && v.value.as_deref() == Some("http://proxy-b:3128")));
        assert!(!env
            .iter()
            .any(|v| v.value.as_deref() == Some("http://proxy-a:3128")));
        let template_annotations = ds
            .spec
            .unwrap()
            .template
            .metadata
            .unwrap()
            .annotations
            .unwrap();
        assert!(template_annotations.contains_key(crate::constants::FORCE_ROLLOUT_ANNOTATION));
    }

    #[tokio::test]
    async fn test_daemon_set_without_containers_degrades() {
        let cluster = Arc::new(
            FakeCluster::new().with_operator_config(operator_config(ManagementState::Managed, 1, 1)),
        );
        let mut ds = live_daemon_set(1, 1, 1);
        ds.spec.as_mut().unwrap().template.spec.as_mut().unwrap().containers.clear();
        cluster.put_daemon_set(ds);
        let (controller, _) = build_controller(cluster.clone());

        let requeue = controller.sync().await.unwrap();
        assert!(requeue);

        let degraded = stored_condition(&cluster, CONDITION_WORKLOAD_DEGRADED);
        assert_eq!(degraded.status, CONDITION_TRUE);
        assert_eq!(degraded.reason.as_deref(), Some(REASON_SYNC_ERROR));
        assert_eq!(
            degraded.message.as_deref(),
            Some("\"deployment\": Invalid state: the existing daemonset has no defined containers\n")
        );
        assert_eq!(
            stored_condition(&cluster, CONDITION_AVAILABLE).status,
            CONDITION_FALSE
        );
    }

    #[tokio::test]
    async fn test_manifest_failures_are_collected() {
        let cluster = Arc::new(
            FakeCluster::new().with_operator_config(operator_config(ManagementState::Managed, 1, 1)),
        );
        cluster.fail("apply_manifest:ServiceAccount");
        cluster.fail("apply_manifest:ServiceMonitor");
        let (controller, _) = build_controller(cluster.clone());

        assert!(controller.sync().await.unwrap());

        let message = stored_condition(&cluster, CONDITION_WORKLOAD_DEGRADED)
            .message
            .unwrap();
        let lines: Vec<&str> = message.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with(
            "\"v3.11.0/openshift-svcat-controller-manager/sa.yaml\" (ServiceAccount): "
        ));
        assert!(lines[1].starts_with("\"servicemonitor\": "));
        assert!(message.ends_with('\n'));
        // the rest of the operand is still rolled out
        assert!(cluster.daemon_set(TARGET_NAMESPACE, DAEMON_SET_NAME).is_some());
    }

    #[tokio::test]
    async fn test_trusted_ca_label_restored() {
        let cluster = Arc::new(
            FakeCluster::new().with_operator_config(operator_config(ManagementState::Managed, 1, 1)),
        );
        cluster.put_config_map(ConfigMap {
            metadata: ObjectMeta {
                name: Some(TRUSTED_CA_BUNDLE.to_string()),
                namespace: Some(TARGET_NAMESPACE.to_string()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([("ca-bundle.crt".to_string(), "pem".to_string())])),
            ..Default::default()
        });
        let (controller, recorder) = build_controller(cluster.clone());

        controller.sync().await.unwrap();

        let cm = cluster.config_map(TARGET_NAMESPACE, TRUSTED_CA_BUNDLE).unwrap();
        assert_eq!(
            cm.metadata.labels.unwrap()["config.openshift.io/inject-trusted-cabundle"],
            "true"
        );
        // injected content is left alone
        assert_eq!(cm.data.unwrap()["ca-bundle.crt"], "pem");
        assert!(recorder
            .reasons()
            .contains(&reasons::CONFIG_MAP_UPDATED.to_string()));
    }

    #[tokio::test]
    async fn test_removed_deletes_namespace() {
        let cluster = Arc::new(
            FakeCluster::new().with_operator_config(operator_config(ManagementState::Removed, 1, 1)),
        );
        cluster.put_namespace(TARGET_NAMESPACE);
        let (controller, recorder) = build_controller(cluster.clone());

        assert!(!controller.sync().await.unwrap());
        assert!(!cluster.namespace_exists(TARGET_NAMESPACE));
        assert_eq!(recorder.reasons(), vec![reasons::NAMESPACE_DELETED]);

        let status = cluster.operator_config().unwrap().status.unwrap();
        assert_eq!(status.version, "4.4.0");
        let available = find_condition(&status.conditions, CONDITION_AVAILABLE).unwrap();
        assert_eq!(available.status, CONDITION_TRUE);
        assert_eq!(available.reason.as_deref(), Some(REASON_REMOVED));

        // already removed: nothing to delete, nothing to write
        let writes = cluster.operator_status_writes();
        controller.sync().await.unwrap();
        assert_eq!(cluster.operator_status_writes(), writes);
        assert_eq!(recorder.reasons().len(), 1);
    }

    #[tokio::test]
    async fn test_unmanaged_leaves_operand_alone() {
        let cluster = Arc::new(
            FakeCluster::new()
                .with_operator_config(operator_config(ManagementState::Unmanaged, 1, 1)),
        );
        let (controller, _) = build_controller(cluster.clone());

        controller.sync().await.unwrap();

        assert!(cluster.changed_files().is_empty());
        assert!(cluster.daemon_set(TARGET_NAMESPACE, DAEMON_SET_NAME).is_none());
        assert_eq!(
            stored_condition(&cluster, CONDITION_AVAILABLE).status,
            CONDITION_UNKNOWN
        );
        assert_eq!(
            stored_condition(&cluster, CONDITION_DEGRADED).reason.as_deref(),
            Some(REASON_UNMANAGED)
        );
    }

    #[tokio::test]
    async fn test_unknown_state_warns() {
        let cluster = Arc::new(
            FakeCluster::new().with_operator_config(operator_config(
                ManagementState::Unknown("Force".to_string()),
                1,
                1,
            )),
        );
        let (controller, recorder) = build_controller(cluster.clone());

        assert!(!controller.sync().await.unwrap());

        let events = recorder.events();
        assert_eq!(events.len(), 1);
        assert!(events[0].warning);
        assert_eq!(events[0].reason, reasons::MANAGEMENT_STATE_UNKNOWN);
        assert_eq!(
            events[0].note.as_deref(),
            Some("Unrecognized operator management state \"Force\"")
        );
        assert_eq!(cluster.operator_status_writes(), 0);
    }

    #[tokio::test]
    async fn test_missing_operator_config() {
        let cluster = Arc::new(FakeCluster::new());
        let (controller, _) = build_controller(cluster);
        let err = controller.sync().await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_proxy_lookup_error_aborts_sync() {
        let mut mock = MockClusterClient::new();
        mock.expect_get_operator_config()
            .returning(|_| Ok(Some(operator_config(ManagementState::Managed, 1, 1))));
        mock.expect_get_proxy()
            .returning(|_| Err(OperatorError::KubeApi("forbidden".to_string())));
        mock.expect_apply_manifest().never();

        let controller = ControllerManagerController::with_cluster(
            Arc::new(mock),
            Arc::new(InMemoryRecorder::new()),
            Settings::default(),
        );
        let err = controller.sync().await.unwrap_err();
        assert!(err.to_string().contains("forbidden"));
    }

    #[tokio::test]
    async fn test_status_write_failure_is_returned() {
        let mut mock = MockClusterClient::new();
        mock.expect_get_operator_config()
            .returning(|_| Ok(Some(operator_config(ManagementState::Unmanaged, 1, 1))));
        mock.expect_update_operator_status()
            .times(1)
            .returning(|_| Err(OperatorError::KubeApi("conflict".to_string())));

        let controller = ControllerManagerController::with_cluster(
            Arc::new(mock),
            Arc::new(InMemoryRecorder::new()),
            Settings::default(),
        );
        assert!(controller.sync().await.is_err());
    }

    #[test]
    fn test_trusted_ca_volume() {
        let mut ds = daemon_set_template();
        add_trusted_ca_volume(&mut ds);
        let pod = ds.spec.unwrap().template.spec.unwrap();
        let mount = pod.containers[0]
            .volume_mounts
            .as_ref()
            .unwrap()
            .iter()
            .find(|m| m.name == TRUSTED_CA_BUNDLE)
            .unwrap()
            .clone();
        assert_eq!(mount.mount_path, "/etc/pki/ca-trust/extracted/pem/");

        let volume = pod
            .volumes
            .unwrap()
            .into_iter()
            .find(|v| v.name == TRUSTED_CA_BUNDLE)
            .unwrap();
        let source = volume.config_map.unwrap();
        assert_eq!(source.optional, Some(true));
        let items = source.items.unwrap();
        assert_eq!(items[0].key, "ca-bundle.crt");
        assert_eq!(items[0].path, "tls-ca-bundle.pem");
    }

    #[test]
    fn test_raw_config() {
        assert!(raw_config(None).unwrap().is_empty());
        assert!(raw_config(Some(&serde_json::Value::Null)).unwrap().is_empty());
        assert_eq!(
            raw_config(Some(&serde_json::json!({"a": 1}))).unwrap(),
            br#"{"a":1}"#.to_vec()
        );
    }
}
