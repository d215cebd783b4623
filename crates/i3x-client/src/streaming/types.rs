//! Types for subscription streaming

use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::I3xError;
use crate::types::{SnapshotError, ValueChange, ValueSnapshot};

/// One update as sent by the server: `elementId -> snapshot`
pub type UpdateMap = Map<String, Value>;

/// Callback receiving one decoded batch of value changes
pub type EventSink = Arc<dyn Fn(Vec<ValueChange>) + Send + Sync>;

/// Callback receiving stream failures
pub type ErrorSink = Arc<dyn Fn(I3xError) + Send + Sync>;

/// Decoded JSON document carried by one frame
#[derive(Debug, Clone, PartialEq)]
pub enum StreamPayload {
    /// A single update map
    Single(UpdateMap),
    /// An ordered batch of items, each expected to be an update map.
    ///
    /// Items are checked one by one in [`into_batches`](Self::into_batches)
    /// so a bad item does not take its siblings down with it.
    Batch(Vec<Value>),
}

impl StreamPayload {
    /// Classify a parsed JSON document
    pub fn from_value(value: Value) -> FrameResult<Self> {
        match value {
            Value::Object(map) => Ok(Self::Single(map)),
            Value::Array(items) => Ok(Self::Batch(items)),
            other => Err(FrameError::Shape(format!(
                "payload is {}, expected an object or array",
                json_type(&other)
            ))),
        }
    }

    /// Unpack into one result per update map, in frame order.
    ///
    /// Each item is decoded independently. Empty update maps produce no
    /// entry.
    pub fn into_batches(self) -> Vec<FrameResult<Vec<ValueChange>>> {
        match self {
            Self::Single(map) => decode_update(&map).into_iter().collect(),
            Self::Batch(items) => items
                .iter()
                .enumerate()
                .filter_map(|(i, item)| match item {
                    Value::Object(map) => decode_update(map),
                    other => Some(Err(FrameError::Shape(format!(
                        "batch item {} is {}, expected an object",
                        i,
                        json_type(other)
                    )))),
                })
                .collect(),
        }
    }
}

fn decode_update(update: &UpdateMap) -> Option<FrameResult<Vec<ValueChange>>> {
    match ValueSnapshot::from_update(update) {
        Ok(changes) if changes.is_empty() => None,
        Ok(changes) => Some(Ok(changes)),
        Err(e) => Some(Err(e.into())),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A frame that could not be decoded. Recoverable: the frame is skipped.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid UTF-8 in frame")]
    InvalidUtf8,

    #[error("invalid JSON in frame: {source} (data: {preview})")]
    Json {
        #[source]
        source: serde_json::Error,
        preview: String,
    },

    #[error("unexpected payload shape: {0}")]
    Shape(String),

    #[error("invalid snapshot: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// Result type for frame decoding
pub type FrameResult<T> = std::result::Result<T, FrameError>;

/// Lifecycle of a stream reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Idle,
    Starting,
    Running,
    Stopping,
}

impl std::fmt::Display for ReaderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn delivered(payload: StreamPayload) -> Vec<Vec<ValueChange>> {
        payload.into_batches().into_iter().flatten().collect()
    }

    #[test]
    fn test_single_payload() {
        let payload = StreamPayload::from_value(json!({"obj-1": {"data": []}})).unwrap();
        assert!(matches!(payload, StreamPayload::Single(_)));

        let batches = delivered(payload);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0][0].element_id, "obj-1");
    }

    #[test]
    fn test_batch_payload_keeps_order() {
        let payload = StreamPayload::from_value(json!([
            {"b": {"data": [{"value": 1}]}},
            {},
            {"a": {"data": [{"value": 2}]}, "c": {"data": []}}
        ]))
        .unwrap();

        let results = payload.into_batches();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(Result::is_ok));

        let batches: Vec<_> = results.into_iter().flatten().collect();
        assert_eq!(batches[0][0].element_id, "b");
        let ids: Vec<_> = batches[1].iter().map(|c| c.element_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_rejects_scalars() {
        assert!(matches!(
            StreamPayload::from_value(json!(5)),
            Err(FrameError::Shape(_))
        ));
        assert!(matches!(
            StreamPayload::from_value(json!("text")),
            Err(FrameError::Shape(_))
        ));
    }

    #[test]
    fn test_non_object_item_keeps_siblings() {
        let payload = StreamPayload::from_value(json!([
            {"a": {"data": [{"value": 1}]}},
            "oops",
            {"b": {"data": [{"value": 2}]}}
        ]))
        .unwrap();

        let results = payload.into_batches();
        assert_eq!(results.len(), 3);
        assert!(matches!(results[1], Err(FrameError::Shape(_))));

        let ids: Vec<_> = results
            .into_iter()
            .flatten()
            .map(|batch| batch[0].element_id.clone())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_bad_snapshot_skips_only_its_item() {
        let payload = StreamPayload::from_value(json!([
            {"good": {"data": [{"value": 1}]}},
            {"bad": 17}
        ]))
        .unwrap();

        let results = payload.into_batches();
        assert_eq!(results.len(), 2);
        assert!(matches!(
            results[1],
            Err(FrameError::Snapshot(SnapshotError::NotAnObject(_)))
        ));

        let batches: Vec<_> = results.into_iter().flatten().collect();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0][0].element_id, "good");
        assert_eq!(batches[0][0].data[0].value, json!(1));
    }

    #[test]
    fn test_bad_single_update_is_one_error() {
        let payload = StreamPayload::from_value(json!({"bad": [1, 2]})).unwrap();
        let results = payload.into_batches();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(FrameError::Snapshot(_))));
    }
}
