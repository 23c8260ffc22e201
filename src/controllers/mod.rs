//! Controllers for the Service Catalog controller manager operator
//!
//! Both controllers key on the single `cluster` operator config. One drives
//! the operand toward the desired state, the other mirrors the resulting
//! conditions into the ClusterOperator.

mod cluster_operator_status;
mod controller_manager;
mod rate_limit;

pub use cluster_operator_status::{
    compute_status, related_objects, ClusterOperatorStatusController, OPERATOR_VERSION_NAME,
};
pub use controller_manager::{
    add_trusted_ca_volume, operator_config_reference, ControllerManagerController,
    DIRECT_MANIFESTS,
};
pub use rate_limit::{ItemBackoff, TokenBucket};
