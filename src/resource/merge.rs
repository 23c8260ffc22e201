//! Object comparison and config merging

use crate::error::{OperatorError, Result};
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::Value;
use std::collections::BTreeMap;

/// Whether every field set in `required` has the same value in `existing`.
///
/// Objects are compared key by key, arrays element by element (lengths must
/// match), everything else by equality. Fields the server defaulted on the
/// live object are ignored.
pub fn is_subset(required: &Value, existing: &Value) -> bool {
    match (required, existing) {
        (Value::Object(req), Value::Object(live)) => req.iter().all(|(key, value)| {
            match live.get(key) {
                Some(live_value) => is_subset(value, live_value),
                None => is_empty(value),
            }
        }),
        (Value::Array(req), Value::Array(live)) => {
            req.len() == live.len() && req.iter().zip(live).all(|(r, l)| is_subset(r, l))
        }
        (req, live) => req == live,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Merge labels and annotations of `required` into `existing`, setting
/// `modified` when anything changed.
pub fn ensure_object_meta(modified: &mut bool, existing: &mut ObjectMeta, required: &ObjectMeta) {
    merge_string_map(modified, &mut existing.labels, required.labels.as_ref());
    merge_string_map(modified, &mut existing.annotations, required.annotations.as_ref());
}

fn merge_string_map(
    modified: &mut bool,
    existing: &mut Option<BTreeMap<String, String>>,
    required: Option<&BTreeMap<String, String>>,
) {
    let Some(required) = required else {
        return;
    };
    for (key, value) in required {
        let target = existing.get_or_insert_with(BTreeMap::new);
        if target.get(key) != Some(value) {
            target.insert(key.clone(), value.clone());
            *modified = true;
        }
    }
}

/// Deep-merge config documents in order; later documents win.
///
/// Maps merge recursively, any other value replaces what was there. Empty
/// documents are skipped. The result is rendered as JSON.
pub fn merge_config(documents: &[&[u8]]) -> Result<String> {
    let mut merged = Value::Object(serde_json::Map::new());
    for raw in documents {
        if raw.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        let doc: Value = serde_yaml::from_slice(raw)
            .map_err(|e| OperatorError::Configuration(format!("invalid config document: {}", e)))?;
        if doc.is_null() {
            continue;
        }
        merge_value(&mut merged, doc);
    }
    Ok(serde_json::to_string(&merged)?)
}

fn merge_value(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge_value(existing, value)
                    }
                    _ => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Write the merged config documents into `template` under `key`.
pub fn merge_config_map(template: ConfigMap, key: &str, documents: &[&[u8]]) -> Result<ConfigMap> {
    let merged = merge_config(documents)?;
    let mut config_map = template;
    config_map
        .data
        .get_or_insert_with(BTreeMap::new)
        .insert(key.to_string(), merged);
    Ok(config_map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subset_ignores_defaulted_fields() {
        let required = json!({"spec": {"ports": [{"port": 443, "targetPort": 6443}]}});
        let live = json!({
            "spec": {
                "clusterIP": "172.30.0.10",
                "ports": [{"port": 443, "targetPort": 6443, "protocol": "TCP"}]
            },
            "status": {}
        });
        assert!(is_subset(&required, &live));
    }

    #[test]
    fn test_subset_detects_changed_value() {
        let required = json!({"rules": [{"verbs": ["get", "list"]}]});
        let live = json!({"rules": [{"verbs": ["get"]}]});
        assert!(!is_subset(&required, &live));
    }

    #[test]
    fn test_subset_missing_field() {
        let required = json!({"metadata": {"labels": {"a": "b"}}});
        assert!(!is_subset(&required, &json!({"metadata": {}})));
        // empty required maps are satisfied by absence
        assert!(is_subset(&json!({"selector": {}}), &json!({})));
    }

    #[test]
    fn test_ensure_object_meta() {
        let mut existing = ObjectMeta {
            labels: Some(BTreeMap::from([("keep".to_string(), "me".to_string())])),
            ..Default::default()
        };
        let required = ObjectMeta {
            labels: Some(BTreeMap::from([(
                "config.openshift.io/inject-trusted-cabundle".to_string(),
                "true".to_string(),
            )])),
            ..Default::default()
        };

        let mut modified = false;
        ensure_object_meta(&mut modified, &mut existing, &required);
        assert!(modified);
        let labels = existing.labels.as_ref().unwrap();
        assert_eq!(labels.len(), 2);

        let mut modified = false;
        ensure_object_meta(&mut modified, &mut existing, &required);
        assert!(!modified);
    }

    #[test]
    fn test_merge_config_order() {
        let default = b"servingInfo:\n  bindAddress: 0.0.0.0:6443\n  certFile: a\nkind: Config\n";
        let overrides = br#"{"servingInfo":{"certFile":"b"},"extra":[1,2]}"#;
        let observed = br#"{"extra":[3]}"#;

        let merged = merge_config(&[default, overrides, b"", observed]).unwrap();
        let merged: Value = serde_json::from_str(&merged).unwrap();
        assert_eq!(merged["servingInfo"]["bindAddress"], "0.0.0.0:6443");
        assert_eq!(merged["servingInfo"]["certFile"], "b");
        assert_eq!(merged["extra"], json!([3]));
        assert_eq!(merged["kind"], "Config");
    }

    #[test]
    fn test_merge_config_rejects_garbage() {
        assert!(merge_config(&[b"a: ["]).is_err());
    }

    #[test]
    fn test_merge_config_map() {
        let template = ConfigMap {
            data: Some(BTreeMap::from([("config.yaml".to_string(), String::new())])),
            ..Default::default()
        };
        let cm = merge_config_map(template, "config.yaml", &[b"a: 1"]).unwrap();
        assert_eq!(cm.data.unwrap()["config.yaml"], r#"{"a":1}"#);
    }
}
