//! Operator status condition helpers
//!
//! Provides constants and builder functions for managing operator conditions
//! and for folding them into the ClusterOperator's aggregate conditions.

use crate::crd::{ClusterOperatorStatusCondition, OperatorCondition};
use chrono::Utc;

// Condition status values
pub const CONDITION_TRUE: &str = "True";
pub const CONDITION_FALSE: &str = "False";
pub const CONDITION_UNKNOWN: &str = "Unknown";

// Operator condition types
pub const CONDITION_AVAILABLE: &str = "Available";
pub const CONDITION_PROGRESSING: &str = "Progressing";
pub const CONDITION_DEGRADED: &str = "Degraded";
pub const CONDITION_UPGRADEABLE: &str = "Upgradeable";
pub const CONDITION_WORKLOAD_DEGRADED: &str = "WorkloadDegraded";

/// Reason used when nothing is wrong
pub const REASON_AS_EXPECTED: &str = "AsExpected";

/// Build a condition with the current timestamp.
pub fn build_condition(
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) -> OperatorCondition {
    OperatorCondition {
        r#type: condition_type.to_string(),
        status: status.to_string(),
        last_transition_time: Some(Utc::now().to_rfc3339()),
        reason: if reason.is_empty() {
            None
        } else {
            Some(reason.to_string())
        },
        message: if message.is_empty() {
            None
        } else {
            Some(message.to_string())
        },
    }
}

/// Set or update a condition in a list, preserving lastTransitionTime when status hasn't changed.
pub fn set_condition(conditions: &mut Vec<OperatorCondition>, new: OperatorCondition) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.r#type == new.r#type) {
        if existing.status != new.status {
            *existing = new;
        } else {
            existing.reason = new.reason;
            existing.message = new.message;
        }
    } else {
        conditions.push(new);
    }
}

/// Find a condition by type.
pub fn find_condition<'a>(
    conditions: &'a [OperatorCondition],
    condition_type: &str,
) -> Option<&'a OperatorCondition> {
    conditions.iter().find(|c| c.r#type == condition_type)
}

/// Aggregate every condition whose type ends in `condition_type` into one.
///
/// A condition is "interesting" when it deviates from `default_status`
/// (`True` for Degraded/Progressing, `False` for Available/Upgradeable).
/// Interesting conditions win, then Unknown ones, then the default.
pub fn union_condition(
    condition_type: &str,
    default_status: &str,
    conditions: &[OperatorCondition],
) -> OperatorCondition {
    let interesting_status = if default_status == CONDITION_TRUE {
        CONDITION_FALSE
    } else {
        CONDITION_TRUE
    };

    let matching: Vec<&OperatorCondition> = conditions
        .iter()
        .filter(|c| c.r#type.ends_with(condition_type))
        .collect();

    let interesting: Vec<&OperatorCondition> = matching
        .iter()
        .copied()
        .filter(|c| c.status == interesting_status)
        .collect();
    if !interesting.is_empty() {
        return fold_conditions(condition_type, interesting_status, &interesting);
    }

    let unknown: Vec<&OperatorCondition> = matching
        .iter()
        .copied()
        .filter(|c| c.status == CONDITION_UNKNOWN)
        .collect();
    if !unknown.is_empty() {
        return fold_conditions(condition_type, CONDITION_UNKNOWN, &unknown);
    }

    let mut condition = build_condition(condition_type, default_status, REASON_AS_EXPECTED, "");
    condition.last_transition_time = latest_transition(&matching);
    condition
}

fn fold_conditions(
    condition_type: &str,
    status: &str,
    matched: &[&OperatorCondition],
) -> OperatorCondition {
    let reasons: Vec<String> = matched
        .iter()
        .filter_map(|c| {
            let reason = c.reason.as_deref().filter(|r| !r.is_empty())?;
            Some(if c.r#type == condition_type {
                reason.to_string()
            } else {
                format!("{}_{}", c.r#type, reason)
            })
        })
        .collect();

    // every line is attributed to its source condition
    let messages: Vec<String> = matched
        .iter()
        .flat_map(|c| {
            c.message
                .as_deref()
                .unwrap_or_default()
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(move |line| format!("{}: {}", c.r#type, line))
        })
        .collect();

    let mut condition = build_condition(
        condition_type,
        status,
        &reasons.join("::"),
        &messages.join("\n"),
    );
    condition.last_transition_time = latest_transition(matched);
    condition
}

fn latest_transition(conditions: &[&OperatorCondition]) -> Option<String> {
    conditions
        .iter()
        .filter_map(|c| c.last_transition_time.clone())
        .max()
        .or_else(|| Some(Utc::now().to_rfc3339()))
}

impl From<OperatorCondition> for ClusterOperatorStatusCondition {
    fn from(c: OperatorCondition) -> Self {
        ClusterOperatorStatusCondition {
            r#type: c.r#type,
            status: c.status,
            last_transition_time: c.last_transition_time,
            reason: c.reason,
            message: c.message,
        }
    }
}

/// Set a ClusterOperator condition, preserving lastTransitionTime when status hasn't changed.
pub fn set_cluster_operator_condition(
    conditions: &mut Vec<ClusterOperatorStatusCondition>,
    new: ClusterOperatorStatusCondition,
) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.r#type == new.r#type) {
        if existing.status != new.status {
            *existing = new;
        } else {
            existing.reason = new.reason;
            existing.message = new.message;
        }
    } else {
        conditions.push(new);
    }
}
