//! Transport layer: multi-protocol dispatch to node backing services.
//!
//! The engine never talks to the network directly — it hands every remote
//! call to a [`Dispatcher`], which resolves the endpoint's declared protocol
//! to a [`Transport`] implementation and applies the retry policy. The
//! trait seam exists so traversal tests can substitute a scripted transport
//! without sockets.
//!
//! # Retry policy
//!
//! Applied to REST calls only, uniformly: up to a fixed small bound of
//! attempts on *connection-establishment* failures. A request whose body
//! may already have been sent is never replayed (node calls are
//! non-idempotent POSTs — replaying risks duplicate side effects on the
//! remote model), and unknown-host or TLS-handshake failures are never
//! retried because they will not resolve on retry.

pub mod rest;
pub mod rpc;
pub mod wire;

use std::sync::Arc;

use async_trait::async_trait;
use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::config::TransportConfig;
use crate::graph::{Endpoint, Protocol};

pub use rest::RestTransport;
pub use rpc::RpcTransport;

/// The two logical operations a backing service exposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallOp {
    Predict,
    Feedback,
}

impl CallOp {
    /// REST path for this operation.
    #[must_use]
    pub fn path(&self) -> &'static str {
        match self {
            Self::Predict => "predict",
            Self::Feedback => "feedback",
        }
    }
}

/// How a failed call relates to the retry policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    /// The connection was never established; retrying is safe.
    ConnectionEstablishment,
    /// The request body may have reached the remote; retrying a
    /// non-idempotent call risks duplicate side effects.
    InFlight,
    /// Will not resolve on retry (DNS miss, TLS handshake, remote status,
    /// malformed reply).
    Permanent,
}

/// Failures raised below the engine, before taxonomy mapping.
#[derive(Debug, Error, Diagnostic)]
pub enum TransportError {
    #[error("connect to {endpoint} failed: {reason}")]
    #[diagnostic(code(trellis::transport::connect))]
    Connect { endpoint: String, reason: String },

    #[error("cannot resolve host for {endpoint}: {reason}")]
    #[diagnostic(code(trellis::transport::unknown_host))]
    UnknownHost { endpoint: String, reason: String },

    #[error("TLS handshake with {endpoint} failed: {reason}")]
    #[diagnostic(code(trellis::transport::tls))]
    Tls { endpoint: String, reason: String },

    #[error("call to {endpoint} failed in flight: {reason}")]
    #[diagnostic(code(trellis::transport::in_flight))]
    InFlight { endpoint: String, reason: String },

    #[error("remote returned status {status}: {reason}")]
    #[diagnostic(code(trellis::transport::remote_status))]
    RemoteStatus { status: u16, reason: String },

    #[error("malformed reply: {reason}")]
    #[diagnostic(code(trellis::transport::codec))]
    Codec { reason: String },

    #[error("failed to build transport: {0}")]
    #[diagnostic(code(trellis::transport::build))]
    Build(String),
}

impl TransportError {
    /// Classify this failure for the retry policy.
    #[must_use]
    pub fn failure_class(&self) -> FailureClass {
        match self {
            Self::Connect { .. } => FailureClass::ConnectionEstablishment,
            Self::InFlight { .. } => FailureClass::InFlight,
            Self::UnknownHost { .. }
            | Self::Tls { .. }
            | Self::RemoteStatus { .. }
            | Self::Codec { .. }
            | Self::Build(_) => FailureClass::Permanent,
        }
    }
}

/// A protocol-specific client for node backing services.
///
/// Implementations own their connection reuse: the REST transport keeps a
/// process-wide pooled HTTP client, the RPC transport a channel per
/// distinct endpoint tuple. One call here is one attempt — retries live in
/// the [`Dispatcher`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(
        &self,
        endpoint: &Endpoint,
        op: CallOp,
        body: Value,
        correlation_id: &str,
    ) -> Result<Value, TransportError>;
}

/// Routes calls to the per-protocol transport and applies the retry policy.
///
/// One dispatcher is constructed at startup and shared by every in-flight
/// traversal; the pools behind it are process-wide.
#[derive(Clone)]
pub struct Dispatcher {
    rest: Arc<dyn Transport>,
    rpc: Arc<dyn Transport>,
    max_attempts: u32,
}

impl Dispatcher {
    /// Build the production dispatcher from transport configuration.
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        Ok(Self {
            rest: Arc::new(RestTransport::new(config)?),
            rpc: Arc::new(RpcTransport::new(config)),
            max_attempts: config.max_attempts,
        })
    }

    /// Assemble a dispatcher from explicit transports. Used by tests to
    /// inject scripted failures.
    #[must_use]
    pub fn with_transports(
        rest: Arc<dyn Transport>,
        rpc: Arc<dyn Transport>,
        max_attempts: u32,
    ) -> Self {
        Self {
            rest,
            rpc,
            max_attempts,
        }
    }

    /// Dispatch one logical call, retrying REST connection failures up to
    /// the configured bound. RPC channels re-dial lazily on the next call
    /// instead of retrying in place.
    pub async fn call(
        &self,
        endpoint: &Endpoint,
        op: CallOp,
        body: Value,
        correlation_id: &str,
    ) -> Result<Value, TransportError> {
        match endpoint.protocol {
            Protocol::Rpc => self.rpc.call(endpoint, op, body, correlation_id).await,
            Protocol::Rest => {
                let mut attempt = 1u32;
                loop {
                    match self
                        .rest
                        .call(endpoint, op, body.clone(), correlation_id)
                        .await
                    {
                        Ok(value) => return Ok(value),
                        Err(err)
                            if attempt < self.max_attempts
                                && err.failure_class()
                                    == FailureClass::ConnectionEstablishment =>
                        {
                            warn!(
                                endpoint = %endpoint,
                                attempt,
                                error = %err,
                                "retrying connect failure"
                            );
                            attempt += 1;
                        }
                        Err(err) => return Err(err),
                    }
                }
            }
        }
    }
}
