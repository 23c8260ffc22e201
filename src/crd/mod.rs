//! Custom Resource Definitions consumed by the operator
//!
//! - ServiceCatalogControllerManager: the operator config (owned by this operator)
//! - Proxy: cluster-wide proxy settings (read only)
//! - ClusterOperator: cluster-wide operator health report (status written)

mod cluster_operator;
mod proxy;
mod service_catalog;

pub use cluster_operator::{
    ClusterOperator, ClusterOperatorSpec, ClusterOperatorStatus, ClusterOperatorStatusCondition,
    OperandVersion, RelatedObject,
};
pub use proxy::{Proxy, ProxySpec, ProxyStatus};
pub use service_catalog::{
    GenerationStatus, LogLevel, ManagementState, OperatorCondition, OperatorSpec, OperatorStatus,
    ServiceCatalogControllerManager,
};
