//! REST transport: one pooled HTTP client shared process-wide.
//!
//! Pool bounds keep socket growth flat under combiner fan-out; the connect
//! and read timeouts are independent and small because node services are
//! co-located, not on the public internet. Failure classification walks the
//! error source chain so the retry policy can distinguish a connection that
//! never happened from a request that may already have side effects.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::config::TransportConfig;
use crate::graph::Endpoint;

use super::{CallOp, Transport, TransportError};

/// Header carrying the engine's correlation id on every outbound call.
pub const CORRELATION_HEADER: &str = "x-correlation-id";

const REASON_LIMIT: usize = 512;

/// Process-wide pooled HTTP client for REST node endpoints.
pub struct RestTransport {
    client: reqwest::Client,
}

impl RestTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .build()
            .map_err(|e| TransportError::Build(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for RestTransport {
    async fn call(
        &self,
        endpoint: &Endpoint,
        op: CallOp,
        body: Value,
        correlation_id: &str,
    ) -> Result<Value, TransportError> {
        let url = format!("http://{}:{}/{}", endpoint.host, endpoint.port, op.path());
        debug!(%url, correlation_id, "rest call");

        let response = self
            .client
            .post(&url)
            .header(CORRELATION_HEADER, correlation_id)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify(e, endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let reason = response.text().await.unwrap_or_default();
            return Err(TransportError::RemoteStatus {
                status: status.as_u16(),
                reason: truncate(&reason),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| TransportError::Codec {
                reason: e.to_string(),
            })
    }
}

/// Map a reqwest failure onto the retry taxonomy.
///
/// DNS misses and TLS failures are pulled out of the source chain first —
/// reqwest reports both as connect errors, but neither resolves on retry.
fn classify(err: reqwest::Error, endpoint: &Endpoint) -> TransportError {
    let authority = endpoint.authority();

    let mut dns = false;
    let mut tls = false;
    let mut root_reason = err.to_string();
    let mut source = std::error::Error::source(&err);
    while let Some(cause) = source {
        let text = cause.to_string();
        let lowered = text.to_ascii_lowercase();
        if lowered.contains("dns") || lowered.contains("failed to lookup") {
            dns = true;
        }
        if lowered.contains("certificate") || lowered.contains("handshake") {
            tls = true;
        }
        root_reason = text;
        source = cause.source();
    }

    if dns {
        return TransportError::UnknownHost {
            endpoint: authority,
            reason: root_reason,
        };
    }
    if tls {
        return TransportError::Tls {
            endpoint: authority,
            reason: root_reason,
        };
    }
    if err.is_connect() {
        // Covers refused/reset/aborted and the connect timeout: the request
        // body was never sent, so a retry is safe.
        return TransportError::Connect {
            endpoint: authority,
            reason: root_reason,
        };
    }
    if err.is_timeout() {
        return TransportError::InFlight {
            endpoint: authority,
            reason: "read timeout".into(),
        };
    }
    TransportError::InFlight {
        endpoint: authority,
        reason: root_reason,
    }
}

fn truncate(reason: &str) -> String {
    if reason.len() <= REASON_LIMIT {
        reason.to_string()
    } else {
        let mut end = REASON_LIMIT;
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &reason[..end])
    }
}
