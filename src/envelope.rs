//! Request, response, and feedback envelopes.
//!
//! The engine moves three message shapes end to end: a request envelope in,
//! a response envelope out, and a feedback envelope replayed along the path
//! that produced an earlier response. Payloads are opaque to the engine —
//! they are forwarded to leaf services unchanged; only routing and combining
//! nodes inspect the structure their own decision needs.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata travelling with every envelope.
///
/// `correlation_id` is filled in by the engine before traversal when the
/// caller did not supply one; `tags` are free-form labels copied into log
/// fields.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "FxHashMap::is_empty")]
    pub tags: FxHashMap<String, Value>,
}

impl Meta {
    #[must_use]
    pub fn with_correlation_id(id: impl Into<String>) -> Self {
        Self {
            correlation_id: Some(id.into()),
            tags: FxHashMap::default(),
        }
    }
}

/// An inbound prediction request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    #[serde(default)]
    pub meta: Meta,
    pub payload: Value,
}

impl RequestEnvelope {
    #[must_use]
    pub fn new(payload: Value) -> Self {
        Self {
            meta: Meta::default(),
            payload,
        }
    }
}

/// The engine's aggregated response.
///
/// `meta.correlation_id` always carries the engine's own id for the
/// originating request — anything a downstream service set is overwritten,
/// so callers can trust it for log correlation and feedback.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub meta: Meta,
    pub payload: Value,
}

impl ResponseEnvelope {
    #[must_use]
    pub fn new(correlation_id: impl Into<String>, payload: Value) -> Self {
        Self {
            meta: Meta::with_correlation_id(correlation_id),
            payload,
        }
    }
}

/// A reward signal replayed through the routing decisions that produced the
/// original response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEnvelope {
    pub request: RequestEnvelope,
    /// The response as observed by the caller.
    pub response: ResponseEnvelope,
    #[serde(default)]
    pub reward: f64,
}

impl FeedbackEnvelope {
    /// Correlation id of the original exchange, preferring the response's.
    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        self.response
            .meta
            .correlation_id
            .as_deref()
            .or(self.request.meta.correlation_id.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_meta_defaults_when_absent() {
        let env: RequestEnvelope = serde_json::from_value(json!({"payload": {"x": 1}})).unwrap();
        assert!(env.meta.correlation_id.is_none());
        assert_eq!(env.payload, json!({"x": 1}));
    }

    #[test]
    fn feedback_prefers_response_correlation_id() {
        let fb = FeedbackEnvelope {
            request: RequestEnvelope {
                meta: Meta::with_correlation_id("req-id"),
                payload: json!(null),
            },
            response: ResponseEnvelope::new("resp-id", json!(null)),
            reward: 1.0,
        };
        assert_eq!(fb.correlation_id(), Some("resp-id"));
    }
}
