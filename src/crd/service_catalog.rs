//! ServiceCatalogControllerManager Custom Resource Definition
//!
//! The cluster-scoped operator config. Its spec selects whether the operator
//! manages the controller manager operand; its status carries the operator
//! conditions and the generations of the workloads it rolled out.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// ServiceCatalogControllerManager is the Schema for the servicecatalogcontrollermanagers API
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "operator.openshift.io",
    version = "v1",
    kind = "ServiceCatalogControllerManager",
    status = "OperatorStatus",
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".spec.managementState"}"#,
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".status.version"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct OperatorSpec {
    /// Whether and how the operator should manage the operand
    #[serde(default)]
    pub management_state: ManagementState,

    /// Verbosity of the operand
    #[serde(default)]
    pub log_level: Option<LogLevel>,

    /// Verbosity of the operator itself
    #[serde(default)]
    pub operator_log_level: Option<LogLevel>,

    /// Unsupported configuration merged over the default operand config
    #[serde(default)]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub unsupported_config_overrides: Option<serde_json::Value>,

    /// Configuration observed from the cluster, merged last
    #[serde(default)]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub observed_config: Option<serde_json::Value>,
}

/// Management state of the operand
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum ManagementState {
    /// Operator applies and reports on the operand
    #[default]
    Managed,
    /// Operator leaves the operand untouched
    Unmanaged,
    /// Operand is removed from the cluster
    Removed,
    /// Any value the operator does not recognize, kept verbatim
    Unknown(String),
}

impl From<String> for ManagementState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Managed" => ManagementState::Managed,
            "Unmanaged" => ManagementState::Unmanaged,
            "Removed" => ManagementState::Removed,
            _ => ManagementState::Unknown(value),
        }
    }
}

impl From<ManagementState> for String {
    fn from(state: ManagementState) -> Self {
        match state {
            ManagementState::Managed => "Managed".to_string(),
            ManagementState::Unmanaged => "Unmanaged".to_string(),
            ManagementState::Removed => "Removed".to_string(),
            ManagementState::Unknown(value) => value,
        }
    }
}

impl JsonSchema for ManagementState {
    fn schema_name() -> String {
        "ManagementState".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        String::json_schema(gen)
    }
}

/// Operand log verbosity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum LogLevel {
    Normal,
    Debug,
    Trace,
    TraceAll,
    /// Empty or unrecognized values run at the default verbosity
    #[serde(other)]
    Unknown,
}

impl LogLevel {
    /// klog `-v` level for the operand
    pub fn verbosity(level: Option<LogLevel>) -> u8 {
        match level {
            Some(LogLevel::TraceAll) => 8,
            Some(LogLevel::Trace) => 6,
            Some(LogLevel::Debug) => 4,
            Some(LogLevel::Normal) | Some(LogLevel::Unknown) | None => 3,
        }
    }
}

/// Status of the ServiceCatalogControllerManager
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OperatorStatus {
    /// Last spec generation acted upon
    #[serde(default)]
    pub observed_generation: i64,
    /// Conditions representing operator state
    #[serde(default)]
    pub conditions: Vec<OperatorCondition>,
    /// Release version of the running operand
    #[serde(default)]
    pub version: String,
    /// Number of available operand pods
    #[serde(default)]
    pub ready_replicas: i32,
    /// Generations of the workloads rolled out by the operator
    #[serde(default)]
    pub generations: Vec<GenerationStatus>,
}

/// Operator condition
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OperatorCondition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Last time the condition transitioned
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Human-readable message
    #[serde(default)]
    pub message: Option<String>,
}

/// Last generation of a workload written by the operator
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationStatus {
    pub group: String,
    pub resource: String,
    pub namespace: String,
    pub name: String,
    pub last_generation: i64,
    #[serde(default)]
    pub hash: String,
}

fn preserve_unknown_fields(_gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
    let mut schema = schemars::schema::SchemaObject::default();
    schema.extensions.insert(
        "x-kubernetes-preserve-unknown-fields".to_string(),
        serde_json::Value::Bool(true),
    );
    schemars::schema::Schema::Object(schema)
}
