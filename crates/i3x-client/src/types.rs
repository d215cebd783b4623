//! Request and response types for the I3X client

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

// =============================================================================
// Catalog Types
// =============================================================================

/// A namespace that organizes types and elements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Namespace {
    pub uri: String,
    #[serde(default)]
    pub display_name: String,
}

/// Schema definition for object instances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectType {
    pub element_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub namespace_uri: String,
    #[serde(default)]
    pub schema: Map<String, Value>,
}

/// A kind of relationship between object instances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipType {
    pub element_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub namespace_uri: String,
    #[serde(default)]
    pub reverse_of: String,
}

/// An object instance on the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInstance {
    pub element_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub type_id: String,
    #[serde(default)]
    pub namespace_uri: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub is_composition: bool,
}

// =============================================================================
// Subscription Types
// =============================================================================

/// Server-side state of a subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub subscription_id: String,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub is_streaming: bool,
    #[serde(default)]
    pub queued_updates: u64,
    #[serde(default)]
    pub objects: Vec<String>,
}

/// Response to `POST /subscriptions`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateSubscriptionResponse {
    pub subscription_id: String,
}

/// Response to `GET /subscriptions`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubscriptionListResponse {
    #[serde(default)]
    pub subscription_ids: Vec<Value>,
}

// =============================================================================
// Value Types
// =============================================================================

/// A value/quality/timestamp triple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vqt {
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub quality: String,
    #[serde(default)]
    pub timestamp: String,
}

/// Key holding the VQT list inside a snapshot payload
pub const DATA_KEY: &str = "data";

/// Nesting limit for snapshot payloads
pub const MAX_SNAPSHOT_DEPTH: usize = 32;

/// Errors raised while unpacking a snapshot payload
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot for '{0}' is not a JSON object")]
    NotAnObject(String),

    #[error("'data' of '{0}' is not an array")]
    DataNotArray(String),

    #[error("malformed VQT in '{element_id}': {source}")]
    InvalidVqt {
        element_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("snapshot for '{0}' nests deeper than {} levels", MAX_SNAPSHOT_DEPTH)]
    TooDeep(String),
}

/// Values for one element plus nested children.
///
/// In the raw payload every key other than `data` is a child element,
/// parsed the same way.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ValueSnapshot {
    pub element_id: String,
    pub data: Vec<Vqt>,
    pub children: BTreeMap<String, ValueSnapshot>,
}

/// Result of a value or history query
pub type LastKnownValue = ValueSnapshot;

/// A value update received on a subscription stream
pub type ValueChange = ValueSnapshot;

impl ValueSnapshot {
    /// Parse one element's entry from a value response or stream update
    pub fn from_payload(element_id: &str, payload: &Value) -> Result<Self, SnapshotError> {
        Self::parse(element_id, payload, 0)
    }

    fn parse(element_id: &str, payload: &Value, depth: usize) -> Result<Self, SnapshotError> {
        if depth > MAX_SNAPSHOT_DEPTH {
            return Err(SnapshotError::TooDeep(element_id.to_string()));
        }

        let fields = payload
            .as_object()
            .ok_or_else(|| SnapshotError::NotAnObject(element_id.to_string()))?;

        let mut snapshot = ValueSnapshot {
            element_id: element_id.to_string(),
            ..Default::default()
        };

        for (key, value) in fields {
            if key == DATA_KEY {
                snapshot.data = parse_vqts(element_id, value)?;
            } else {
                let child = Self::parse(key, value, depth + 1)?;
                snapshot.children.insert(key.clone(), child);
            }
        }

        Ok(snapshot)
    }

    /// Unpack a stream update map (`elementId -> snapshot`) into one change
    /// per top-level key, in key order
    pub fn from_update(update: &Map<String, Value>) -> Result<Vec<ValueChange>, SnapshotError> {
        update
            .iter()
            .map(|(element_id, payload)| Self::from_payload(element_id, payload))
            .collect()
    }

    /// Most recent VQT, if any
    pub fn latest(&self) -> Option<&Vqt> {
        self.data.last()
    }

    pub fn child(&self, name: &str) -> Option<&ValueSnapshot> {
        self.children.get(name)
    }
}

fn parse_vqts(element_id: &str, value: &Value) -> Result<Vec<Vqt>, SnapshotError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                Vqt::deserialize(item).map_err(|source| SnapshotError::InvalidVqt {
                    element_id: element_id.to_string(),
                    source,
                })
            })
            .collect(),
        _ => Err(SnapshotError::DataNotArray(element_id.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_namespace_from_json() {
        let ns: Namespace = serde_json::from_value(json!({
            "uri": "http://example.com/ns1",
            "displayName": "Namespace One"
        }))
        .unwrap();
        assert_eq!(ns.uri, "http://example.com/ns1");
        assert_eq!(ns.display_name, "Namespace One");
    }

    #[test]
    fn test_object_instance_defaults() {
        let obj: ObjectInstance = serde_json::from_value(json!({"elementId": "obj-1"})).unwrap();
        assert_eq!(obj.element_id, "obj-1");
        assert_eq!(obj.display_name, "");
        assert_eq!(obj.parent_id, None);
        assert!(!obj.is_composition);
    }

    #[test]
    fn test_subscription_from_json() {
        let sub: Subscription = serde_json::from_value(json!({
            "subscriptionId": "sub-1",
            "created": "2026-01-01T00:00:00Z",
            "isStreaming": true,
            "queuedUpdates": 3,
            "objects": ["obj-1"]
        }))
        .unwrap();
        assert_eq!(sub.subscription_id, "sub-1");
        assert!(sub.is_streaming);
        assert_eq!(sub.queued_updates, 3);
        assert_eq!(sub.objects, vec!["obj-1".to_string()]);
    }

    #[test]
    fn test_vqt_defaults() {
        let vqt: Vqt = serde_json::from_value(json!({"value": 1})).unwrap();
        assert_eq!(vqt.value, json!(1));
        assert_eq!(vqt.quality, "");
        assert_eq!(vqt.timestamp, "");

        let vqt: Vqt = serde_json::from_value(json!({})).unwrap();
        assert_eq!(vqt.value, Value::Null);
    }

    #[test]
    fn test_snapshot_simple() {
        let payload = json!({
            "data": [{"value": 72.5, "quality": "Good", "timestamp": "t1"}]
        });
        let snap = ValueSnapshot::from_payload("obj-1", &payload).unwrap();

        assert_eq!(snap.element_id, "obj-1");
        assert_eq!(
            snap.data,
            vec![Vqt {
                value: json!(72.5),
                quality: "Good".into(),
                timestamp: "t1".into(),
            }]
        );
        assert!(snap.children.is_empty());
    }

    #[test]
    fn test_snapshot_with_children() {
        let payload = json!({
            "data": [{"value": 1, "quality": "Good", "timestamp": "t1"}],
            "child-1": {
                "data": [{"value": 2, "quality": "Good", "timestamp": "t2"}],
                "grandchild": {"data": []}
            }
        });
        let snap = ValueSnapshot::from_payload("parent", &payload).unwrap();

        assert_eq!(snap.children.len(), 1);
        assert!(!snap.children.contains_key("data"));

        let child = snap.child("child-1").unwrap();
        assert_eq!(child.element_id, "child-1");
        assert_eq!(child.latest().unwrap().value, json!(2));

        let grandchild = child.child("grandchild").unwrap();
        assert!(grandchild.data.is_empty());
        assert!(grandchild.children.is_empty());
    }

    #[test]
    fn test_snapshot_without_data() {
        let snap = ValueSnapshot::from_payload("x", &json!({})).unwrap();
        assert!(snap.data.is_empty());
        assert!(snap.latest().is_none());
    }

    #[test]
    fn test_snapshot_rejects_non_object() {
        let err = ValueSnapshot::from_payload("x", &json!(42)).unwrap_err();
        assert!(matches!(err, SnapshotError::NotAnObject(id) if id == "x"));

        let err = ValueSnapshot::from_payload("x", &json!({"child": "scalar"})).unwrap_err();
        assert!(matches!(err, SnapshotError::NotAnObject(id) if id == "child"));
    }

    #[test]
    fn test_snapshot_rejects_bad_data() {
        let err = ValueSnapshot::from_payload("x", &json!({"data": {"value": 1}})).unwrap_err();
        assert!(matches!(err, SnapshotError::DataNotArray(_)));

        let err = ValueSnapshot::from_payload("x", &json!({"data": [1, 2]})).unwrap_err();
        assert!(matches!(err, SnapshotError::InvalidVqt { .. }));
    }

    #[test]
    fn test_snapshot_depth_limit() {
        let mut payload = json!({"data": []});
        for _ in 0..=MAX_SNAPSHOT_DEPTH {
            payload = json!({ "nested": payload });
        }
        let err = ValueSnapshot::from_payload("root", &payload).unwrap_err();
        assert!(matches!(err, SnapshotError::TooDeep(_)));

        // Exactly at the limit is fine
        let mut payload = json!({"data": []});
        for _ in 0..MAX_SNAPSHOT_DEPTH {
            payload = json!({ "nested": payload });
        }
        assert!(ValueSnapshot::from_payload("root", &payload).is_ok());
    }

    #[test]
    fn test_from_update_preserves_key_order() {
        let update = json!({
            "zeta": {"data": [{"value": 1}]},
            "alpha": {"data": [{"value": 2}]},
            "mid": {"data": []}
        });
        let changes = ValueSnapshot::from_update(update.as_object().unwrap()).unwrap();

        let ids: Vec<_> = changes.iter().map(|c| c.element_id.as_str()).collect();
        assert_eq!(ids, vec!["zeta", "alpha", "mid"]);
    }
}
