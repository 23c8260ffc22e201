//! Kubernetes Events emitted by the operator
//!
//! Events are recorded against the operator config object so that
//! `kubectl describe servicecatalogcontrollermanager cluster` shows what the
//! operator did. Publishing is fire-and-forget: a failed event is logged and
//! never fails a sync.

use crate::constants::FIELD_MANAGER;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use std::sync::Mutex;
use tracing::warn;

/// Trait for publishing Kubernetes Events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an Event about `regarding`
    async fn publish(
        &self,
        regarding: &ObjectReference,
        type_: EventType,
        reason: &str,
        note: Option<String>,
    );
}

/// Production implementation wrapping `kube::runtime::events::Recorder`
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a publisher reporting as the operator. `instance` is usually the
    /// pod name.
    pub fn new(client: Client, instance: Option<String>) -> Self {
        let reporter = Reporter {
            controller: FIELD_MANAGER.to_string(),
            instance,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        regarding: &ObjectReference,
        type_: EventType,
        reason: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: actions::SYNC.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, regarding).await {
            warn!(reason, error = %e, "Failed to publish Kubernetes event");
        }
    }
}

/// An Event held by [`InMemoryRecorder`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub warning: bool,
    pub reason: String,
    pub note: Option<String>,
}

/// Recorder that keeps events in memory
#[derive(Default)]
pub struct InMemoryRecorder {
    events: Mutex<Vec<RecordedEvent>>,
}

impl InMemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Reasons of everything recorded so far, in order
    pub fn reasons(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.reason).collect()
    }
}

#[async_trait]
impl EventPublisher for InMemoryRecorder {
    async fn publish(
        &self,
        _regarding: &ObjectReference,
        type_: EventType,
        reason: &str,
        note: Option<String>,
    ) {
        if let Ok(mut events) = self.events.lock() {
            events.push(RecordedEvent {
                warning: matches!(type_, EventType::Warning),
                reason: reason.to_string(),
                note,
            });
        }
    }
}

/// Event reasons
pub mod reasons {
    pub const CONFIG_MAP_CREATED: &str = "ConfigMapCreated";
    pub const CONFIG_MAP_UPDATED: &str = "ConfigMapUpdated";
    pub const CONFIG_MAP_CREATE_FAILED: &str = "ConfigMapCreateFailed";
    pub const CONFIG_MAP_UPDATE_FAILED: &str = "ConfigMapUpdateFailed";
    pub const DAEMON_SET_CREATED: &str = "DaemonSetCreated";
    pub const DAEMON_SET_UPDATED: &str = "DaemonSetUpdated";
    pub const NAMESPACE_DELETED: &str = "NamespaceDeleted";
    /// Emitted as a Warning
    pub const MANAGEMENT_STATE_UNKNOWN: &str = "ManagementStateUnknown";
    pub const OPERATOR_STATUS_CHANGED: &str = "OperatorStatusChanged";
}

/// Event actions
pub mod actions {
    pub const SYNC: &str = "Sync";
}
