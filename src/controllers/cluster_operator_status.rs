//! ClusterOperator Status Controller
//!
//! Folds the operator config conditions into the cluster-wide
//! `service-catalog-controller-manager` ClusterOperator.

use crate::client::{ClusterClient, KubeClusterClient};
use crate::conditions::{
    set_cluster_operator_condition, union_condition, CONDITION_AVAILABLE, CONDITION_DEGRADED,
    CONDITION_FALSE, CONDITION_PROGRESSING, CONDITION_TRUE, CONDITION_UPGRADEABLE,
};
use crate::constants::{
    CLUSTER_OPERATOR_NAME, OPERATOR_CONFIG_NAME, OPERATOR_NAMESPACE, TARGET_NAMESPACE,
};
use crate::crd::{
    ClusterOperator, ClusterOperatorSpec, ClusterOperatorStatus, OperandVersion, RelatedObject,
    ServiceCatalogControllerManager,
};
use crate::error::{OperatorError, Result};
use crate::events::{reasons, EventPublisher};
use futures::StreamExt;
use kube::api::Api;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::events::EventType;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config;
use kube::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Name under which the operator version is reported
pub const OPERATOR_VERSION_NAME: &str = "operator";

/// Condition types rolled up into the ClusterOperator, with their default status
const ROLLED_UP_CONDITIONS: [(&str, &str); 4] = [
    (CONDITION_DEGRADED, CONDITION_FALSE),
    (CONDITION_PROGRESSING, CONDITION_FALSE),
    (CONDITION_AVAILABLE, CONDITION_TRUE),
    (CONDITION_UPGRADEABLE, CONDITION_TRUE),
];

/// Objects worth collecting when debugging the operator
pub fn related_objects() -> Vec<RelatedObject> {
    vec![
        RelatedObject {
            group: "operator.openshift.io".to_string(),
            resource: "servicecatalogcontrollermanagers".to_string(),
            namespace: String::new(),
            name: OPERATOR_CONFIG_NAME.to_string(),
        },
        RelatedObject {
            group: String::new(),
            resource: "namespaces".to_string(),
            namespace: String::new(),
            name: TARGET_NAMESPACE.to_string(),
        },
        RelatedObject {
            group: String::new(),
            resource: "namespaces".to_string(),
            namespace: String::new(),
            name: OPERATOR_NAMESPACE.to_string(),
        },
    ]
}

/// Compute the ClusterOperator status for `config`, starting from `current`
/// so unchanged conditions keep their transition times.
pub fn compute_status(
    config: &ServiceCatalogControllerManager,
    current: &ClusterOperatorStatus,
) -> ClusterOperatorStatus {
    let operator_status = config.status.clone().unwrap_or_default();
    let mut status = current.clone();

    for (condition_type, default_status) in ROLLED_UP_CONDITIONS {
        set_cluster_operator_condition(
            &mut status.conditions,
            union_condition(condition_type, default_status, &operator_status.conditions).into(),
        );
    }

    if !operator_status.version.is_empty() {
        status.versions = vec![OperandVersion {
            name: OPERATOR_VERSION_NAME.to_string(),
            version: operator_status.version,
        }];
    }
    status.related_objects = related_objects();
    status
}

/// Describe which rolled-up conditions changed status
fn describe_changes(before: &ClusterOperatorStatus, after: &ClusterOperatorStatus) -> String {
    let changes: Vec<String> = after
        .conditions
        .iter()
        .filter_map(|new| {
            let old = before.conditions.iter().find(|c| c.r#type == new.r#type);
            match old {
                Some(old) if old.status == new.status => None,
                Some(old) => Some(format!(
                    "{} changed from {} to {}",
                    new.r#type, old.status, new.status
                )),
                None => Some(format!("{} set to {}", new.r#type, new.status)),
            }
        })
        .collect();
    if changes.is_empty() {
        "details changed".to_string()
    } else {
        changes.join(", ")
    }
}

/// Reports operator health through the ClusterOperator
pub struct ClusterOperatorStatusController {
    cluster: Arc<dyn ClusterClient>,
    events: Arc<dyn EventPublisher>,
    resync_interval: Duration,
}

impl ClusterOperatorStatusController {
    pub fn new(client: Client, events: Arc<dyn EventPublisher>, resync_interval: Duration) -> Self {
        Self::with_cluster(
            Arc::new(KubeClusterClient::new(client)),
            events,
            resync_interval,
        )
    }

    pub fn with_cluster(
        cluster: Arc<dyn ClusterClient>,
        events: Arc<dyn EventPublisher>,
        resync_interval: Duration,
    ) -> Self {
        Self {
            cluster,
            events,
            resync_interval,
        }
    }

    /// Run the controller until shutdown
    pub async fn run(self: Arc<Self>, client: Client) -> Result<()> {
        let configs: Api<ServiceCatalogControllerManager> = Api::all(client.clone());
        let cluster_operators: Api<ClusterOperator> = Api::all(client);

        info!("Starting ClusterOperator status controller");

        Controller::new(
            configs,
            Config::default().fields(&format!("metadata.name={}", OPERATOR_CONFIG_NAME)),
        )
        .watches(
            cluster_operators,
            Config::default().fields(&format!("metadata.name={}", CLUSTER_OPERATOR_NAME)),
            |_| Some(ObjectRef::new(OPERATOR_CONFIG_NAME)),
        )
        .shutdown_on_signal()
        .run(
            |_config, ctx| async move {
                ctx.sync().await?;
                Ok::<_, OperatorError>(Action::requeue(ctx.resync_interval))
            },
            |_config, error, _ctx| {
                error!(error = %error, "ClusterOperator status sync failed");
                Action::requeue(Duration::from_secs(30))
            },
            Arc::clone(&self),
        )
        .for_each(|result| async move {
            if let Err(e) = result {
                debug!(error = %e, "ClusterOperator status controller error");
            }
        })
        .await;

        Ok(())
    }

    /// Write the ClusterOperator status when it differs from the computed one
    pub async fn sync(&self) -> Result<()> {
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

        let existing = self.cluster.get_cluster_operator(CLUSTER_OPERATOR_NAME).await?;
        let mut cluster_operator = match existing {
            Some(existing) => existing,
            None => {
                info!(name = CLUSTER_OPERATOR_NAME, "Creating ClusterOperator");
                self.cluster
                    .create_cluster_operator(&ClusterOperator::new(
                        CLUSTER_OPERATOR_NAME,
                        ClusterOperatorSpec {},
                    ))
                    .await?
            }
        };

        let current = cluster_operator.status.clone().unwrap_or_default();
        let desired = compute_status(&config, &current);
        if cluster_operator.status.as_ref() == Some(&desired) {
            return Ok(());
        }

        let note = format!(
            "Status for clusteroperator/{} changed: {}",
            CLUSTER_OPERATOR_NAME,
            describe_changes(&current, &desired)
        );
        cluster_operator.status = Some(desired);
        self.cluster
            .update_cluster_operator_status(&cluster_operator)
            .await?;
        info!(name = CLUSTER_OPERATOR_NAME, "Updated ClusterOperator status");

        self.events
            .publish(
                &super::controller_manager::operator_config_reference(),
                EventType::Normal,
                reasons::OPERATOR_STATUS_CHANGED,
                Some(note),
            )
            .await;
        Ok(())
    }
}
