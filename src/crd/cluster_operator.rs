//! ClusterOperator (`config.openshift.io/v1`)
//!
//! The cluster-wide object through which this operator reports its health.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// ClusterOperator is the Custom Resource object which holds the current state of an operator
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "config.openshift.io",
    version = "v1",
    kind = "ClusterOperator",
    status = "ClusterOperatorStatus",
    shortname = "co"
)]
pub struct ClusterOperatorSpec {}

/// Status of a ClusterOperator
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterOperatorStatus {
    #[serde(default)]
    pub conditions: Vec<ClusterOperatorStatusCondition>,
    #[serde(default)]
    pub versions: Vec<OperandVersion>,
    #[serde(default)]
    pub related_objects: Vec<RelatedObject>,
}

/// Condition on a ClusterOperator
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterOperatorStatusCondition {
    pub r#type: String,
    pub status: String,
    #[serde(default)]
    pub last_transition_time: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Version of an operand reported by the operator
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct OperandVersion {
    pub name: String,
    pub version: String,
}

/// Object related to the operator, gathered for debugging
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct RelatedObject {
    pub group: String,
    pub resource: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    pub name: String,
}
