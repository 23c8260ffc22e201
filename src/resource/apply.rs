//! Create-or-update helpers for the objects the operator owns

use super::merge::ensure_object_meta;
use crate::client::ClusterClient;
use crate::constants::FORCE_ROLLOUT_ANNOTATION;
use crate::crd::GenerationStatus;
use crate::error::{OperatorError, Result};
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use rand::Rng;
use tracing::{debug, info};

const DAEMON_SET_GROUP: &str = "apps";
const DAEMON_SET_RESOURCE: &str = "daemonsets";

fn name_and_namespace(meta: &ObjectMeta) -> Result<(String, String)> {
    match (&meta.name, &meta.namespace) {
        (Some(name), Some(namespace)) => Ok((name.clone(), namespace.clone())),
        _ => Err(OperatorError::InvalidState(
            "object needs metadata.name and metadata.namespace".to_string(),
        )),
    }
}

/// Create `required` when missing, or update the live ConfigMap when its
/// data or metadata differ. Returns the resulting object and whether it was
/// written.
pub async fn apply_config_map<C>(client: &C, required: &ConfigMap) -> Result<(ConfigMap, bool)>
where
    C: ClusterClient + ?Sized,
{
    let (name, namespace) = name_and_namespace(&required.metadata)?;

    let Some(existing) = client.get_config_map(&namespace, &name).await? else {
        let created = client.create_config_map(required).await?;
        info!(namespace = %namespace, name = %name, "Created ConfigMap");
        return Ok((created, true));
    };

    let mut modified = false;
    let mut updated = existing.clone();
    ensure_object_meta(&mut modified, &mut updated.metadata, &required.metadata);

    let data_same = existing.data.clone().unwrap_or_default() == required.data.clone().unwrap_or_default()
        && existing.binary_data.clone().unwrap_or_default()
            == required.binary_data.clone().unwrap_or_default();
    if data_same && !modified {
        return Ok((existing, false));
    }

    updated.data = required.data.clone();
    updated.binary_data = required.binary_data.clone();
    let updated = client.update_config_map(&updated).await?;
    info!(namespace = %namespace, name = %name, "Updated ConfigMap");
    Ok((updated, true))
}

/// Copy the data of one ConfigMap into another. When the source is missing
/// the destination is deleted. Returns whether the destination changed.
pub async fn sync_config_map<C>(
    client: &C,
    source_namespace: &str,
    source_name: &str,
    target_namespace: &str,
    target_name: &str,
) -> Result<bool>
where
    C: ClusterClient + ?Sized,
{
    match client.get_config_map(source_namespace, source_name).await? {
        None => {
            let deleted = client.delete_config_map(target_namespace, target_name).await?;
            if deleted {
                info!(
                    namespace = %target_namespace,
                    name = %target_name,
                    "Deleted ConfigMap because its source is gone"
                );
            }
            Ok(deleted)
        }
        Some(source) => {
            let required = ConfigMap {
                metadata: ObjectMeta {
                    name: Some(target_name.to_string()),
                    namespace: Some(target_namespace.to_string()),
                    ..Default::default()
                },
                data: source.data,
                binary_data: source.binary_data,
                ..Default::default()
            };
            let (_, changed) = apply_config_map(client, &required).await?;
            Ok(changed)
        }
    }
}

fn is_daemon_set_record(record: &GenerationStatus, namespace: &str, name: &str) -> bool {
    record.group == DAEMON_SET_GROUP
        && record.resource == DAEMON_SET_RESOURCE
        && record.namespace == namespace
        && record.name == name
}

/// Last generation recorded for the DaemonSet, or -1 when none was.
pub fn expected_daemon_set_generation(required: &DaemonSet, generations: &[GenerationStatus]) -> i64 {
    let namespace = required.metadata.namespace.as_deref().unwrap_or_default();
    let name = required.metadata.name.as_deref().unwrap_or_default();
    generations
        .iter()
        .find(|g| is_daemon_set_record(g, namespace, name))
        .map(|g| g.last_generation)
        .unwrap_or(-1)
}

/// Record the generation of `daemon_set` in `generations`.
pub fn set_daemon_set_generation(generations: &mut Vec<GenerationStatus>, daemon_set: &DaemonSet) {
    let namespace = daemon_set.metadata.namespace.clone().unwrap_or_default();
    let name = daemon_set.metadata.name.clone().unwrap_or_default();
    let last_generation = daemon_set.metadata.generation.unwrap_or_default();

    match generations
        .iter_mut()
        .find(|g| is_daemon_set_record(g, &namespace, &name))
    {
        Some(record) => record.last_generation = last_generation,
        None => generations.push(GenerationStatus {
            group: DAEMON_SET_GROUP.to_string(),
            resource: DAEMON_SET_RESOURCE.to_string(),
            namespace,
            name,
            last_generation,
            hash: String::new(),
        }),
    }
}

fn force_token() -> String {
    format!("{:016x}", rand::thread_rng().gen::<u64>())
}

/// Create or update a DaemonSet.
///
/// The write is skipped when the live metadata already matches, the live
/// generation equals `expected_generation` and no rollout is forced. A forced
/// rollout stamps a fresh value into the pod template so new pods are
/// scheduled even when nothing else changed.
pub async fn apply_daemon_set<C>(
    client: &C,
    required: &DaemonSet,
    expected_generation: i64,
    force_rollout: bool,
) -> Result<(DaemonSet, bool)>
where
    C: ClusterClient + ?Sized,
{
    let mut required = required.clone();
    if force_rollout {
        if let Some(spec) = required.spec.as_mut() {
            spec.template
                .metadata
                .get_or_insert_with(Default::default)
                .annotations
                .get_or_insert_with(Default::default)
                .insert(FORCE_ROLLOUT_ANNOTATION.to_string(), force_token());
        }
    }

    let (name, namespace) = name_and_namespace(&required.metadata)?;

    let Some(existing) = client.get_daemon_set(&namespace, &name).await? else {
        let created = client.create_daemon_set(&required).await?;
        info!(namespace = %namespace, name = %name, "Created DaemonSet");
        return Ok((created, true));
    };

    let mut modified = false;
    let mut to_write = existing.clone();
    ensure_object_meta(&mut modified, &mut to_write.metadata, &required.metadata);

    let live_generation = existing.metadata.generation.unwrap_or_default();
    if !modified && live_generation == expected_generation && !force_rollout {
        debug!(
            namespace = %namespace,
            name = %name,
            generation = live_generation,
            "DaemonSet is up to date"
        );
        return Ok((existing, false));
    }

    to_write.spec = required.spec.clone();
    let updated = client.update_daemon_set(&to_write).await?;
    info!(
        namespace = %namespace,
        name = %name,
        forced = force_rollout,
        "Updated DaemonSet"
    );
    Ok((updated, true))
}
