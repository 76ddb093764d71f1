//! Engine error taxonomy.
//!
//! Every failure the engine can surface maps to one [`EngineError`] kind
//! with a stable numeric code and an HTTP status for the inbound API.
//! Errors from deep in a traversal propagate unchanged to the top; only the
//! first failure of a concurrent fan-out is surfaced, with sibling calls
//! cancelled. No partial or best-effort response is ever synthesized for a
//! failed traversal.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::GraphError;
use crate::transport::TransportError;

/// Failures surfaced by the engine, mapped 1:1 onto the public taxonomy.
#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    /// Malformed request/feedback envelope.
    #[error("invalid request: {0}")]
    #[diagnostic(code(trellis::engine::invalid_request))]
    InvalidRequest(String),

    /// A node endpoint whose host/port cannot be resolved.
    #[error("invalid endpoint {endpoint}: {reason}")]
    #[diagnostic(code(trellis::engine::invalid_endpoint))]
    InvalidEndpoint { endpoint: String, reason: String },

    /// A remote node call failed or returned a non-success status.
    #[error("microservice call failed with status {status}: {reason}")]
    #[diagnostic(code(trellis::engine::microservice))]
    Microservice { status: u16, reason: String },

    /// A router produced a child index outside its children list.
    #[error("invalid routing decision at node {node_id:?}: {reason}")]
    #[diagnostic(
        code(trellis::engine::invalid_routing),
        help("router decisions must be an index into the node's ordered children")
    )]
    InvalidRouting { node_id: String, reason: String },

    /// Unexpected internal failure.
    #[error("execution failure: {0}")]
    #[diagnostic(code(trellis::engine::execution))]
    ExecutionFailure(String),

    /// The traversal was cancelled before completing.
    #[error("traversal interrupted: {0}")]
    #[diagnostic(code(trellis::engine::interrupted))]
    Interrupted(String),

    /// The resolution boundary found no deployment for the caller identity.
    #[error("no active deployment for identity {0:?}")]
    #[diagnostic(code(trellis::engine::no_active_deployment))]
    NoActiveDeployment(String),
}

impl EngineError {
    /// Stable numeric code reported alongside the reason.
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) => 101,
            Self::InvalidEndpoint { .. } => 102,
            Self::Microservice { .. } => 103,
            Self::InvalidRouting { .. } => 104,
            Self::ExecutionFailure(_) => 105,
            Self::Interrupted(_) => 106,
            Self::NoActiveDeployment(_) => 107,
        }
    }

    /// HTTP status the inbound API answers with for this kind.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) => 400,
            Self::NoActiveDeployment(_) => 404,
            Self::Microservice { .. } => 502,
            Self::Interrupted(_) => 503,
            Self::InvalidEndpoint { .. }
            | Self::InvalidRouting { .. }
            | Self::ExecutionFailure(_) => 500,
        }
    }

    /// Wire-facing rendering of this error.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code(),
            status: self.http_status(),
            reason: self.to_string(),
        }
    }
}

/// JSON body returned by the inbound surfaces for failed calls.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: u16,
    pub status: u16,
    pub reason: String,
}

impl From<TransportError> for EngineError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::UnknownHost { endpoint, reason } => Self::InvalidEndpoint {
                endpoint,
                reason,
            },
            TransportError::RemoteStatus { status, reason } => Self::Microservice {
                status,
                reason,
            },
            // Everything else means the backing service was not reached or
            // did not answer usefully.
            other => Self::Microservice {
                status: 503,
                reason: other.to_string(),
            },
        }
    }
}

impl From<GraphError> for EngineError {
    fn from(err: GraphError) -> Self {
        Self::ExecutionFailure(err.to_string())
    }
}
