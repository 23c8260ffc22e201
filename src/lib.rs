//! OpenShift Service Catalog controller manager operator
//!
//! Keeps the Service Catalog controller manager running in
//! `openshift-service-catalog-controller-manager` according to the
//! cluster-scoped `ServiceCatalogControllerManager` named `cluster`, and
//! reports the outcome through the `service-catalog-controller-manager`
//! ClusterOperator.
//!
//! ## Example
//!
//! ```yaml
//! apiVersion: operator.openshift.io/v1
//! kind: ServiceCatalogControllerManager
//! metadata:
//!   name: cluster
//! spec:
//!   managementState: Managed
//!   logLevel: Debug
//! ```

pub mod assets;
pub mod client;
pub mod conditions;
pub mod config;
pub mod constants;
pub mod controllers;
pub mod crd;
pub mod error;
pub mod events;
pub mod leader_election;
pub mod proxy;
pub mod resource;
pub mod startup;

#[cfg(test)]
mod testing;

pub use client::{ClusterClient, KubeClusterClient};
pub use config::Settings;
pub use controllers::{ClusterOperatorStatusController, ControllerManagerController};
pub use crd::{
    ClusterOperator, ManagementState, OperatorSpec, OperatorStatus, Proxy,
    ServiceCatalogControllerManager,
};
pub use error::{OperatorError, Result};
pub use events::{EventPublisher, KubeEventPublisher};
