//! Work and result items exchanged with the worker.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Ordered string-keyed request parameters.
///
/// Keys are whatever the caller sent; the bridge never inspects them.
pub type Payload = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtoError {
    #[error("work item operation must not be empty")]
    EmptyOperation,
}

/// One unit of work for the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Which worker function to invoke (e.g. `requestDrumPattern`).
    pub operation: String,
    /// Caller-supplied id. Used for logging and by workers that track
    /// sessions; the bridge correlates on its own request ids instead.
    pub correlation_id: String,
    #[serde(default)]
    pub payload: Payload,
}

impl WorkItem {
    pub fn new(
        operation: impl Into<String>,
        correlation_id: impl Into<String>,
        payload: Payload,
    ) -> Result<Self, ProtoError> {
        let operation = operation.into();
        if operation.trim().is_empty() {
            return Err(ProtoError::EmptyOperation);
        }

        Ok(Self {
            operation,
            correlation_id: correlation_id.into(),
            payload,
        })
    }

    /// String value of a payload key, if present and a string.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

/// Body of a worker reply.
///
/// Most replies are JSON documents. Some older operations answer with a bare
/// string or raw bytes, which are passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum ReplyBody {
    Json(Value),
    Text(String),
    Bytes(#[serde(with = "serde_bytes")] Vec<u8>),
}

impl ReplyBody {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ReplyBody::Json(v) => Some(v),
            _ => None,
        }
    }
}

/// The worker's reply to exactly one [`WorkItem`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultItem {
    /// Usually the originating operation name.
    pub result_type: String,
    pub payload: ReplyBody,
}

impl ResultItem {
    pub fn json(result_type: impl Into<String>, value: Value) -> Self {
        Self {
            result_type: result_type.into(),
            payload: ReplyBody::Json(value),
        }
    }

    pub fn text(result_type: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            result_type: result_type.into(),
            payload: ReplyBody::Text(text.into()),
        }
    }

    pub fn bytes(result_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            result_type: result_type.into(),
            payload: ReplyBody::Bytes(bytes),
        }
    }
}
