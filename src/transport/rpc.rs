//! RPC transport: long-lived framed TCP channels, one per endpoint tuple.
//!
//! Channels are created lazily on first use, cached process-wide, and
//! reused for the life of the process — never closed per request. The cache
//! key includes the declared protocol kind, so two endpoints that share a
//! `host:port` but declare different protocols get distinct channels. A
//! channel that fails mid-call is dropped from under its slot; the next
//! call re-dials.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{json, Value};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tracing::debug;

use crate::config::TransportConfig;
use crate::graph::{Endpoint, Protocol};

use super::wire::{self, Frame, FrameKind, WireError};
use super::{CallOp, Transport, TransportError};

/// Cache key: distinct protocol kinds map to distinct channels even when
/// host and port are identical.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ChannelKey {
    host: String,
    port: u16,
    protocol: Protocol,
}

impl ChannelKey {
    fn of(endpoint: &Endpoint) -> Self {
        Self {
            host: endpoint.host.clone(),
            port: endpoint.port,
            protocol: endpoint.protocol,
        }
    }
}

/// One cached channel slot. The async mutex serializes frames on the
/// underlying stream; `None` means the next caller dials.
type ChannelSlot = Arc<tokio::sync::Mutex<Option<TcpStream>>>;

/// Framed-TCP transport with a process-wide channel cache.
pub struct RpcTransport {
    channels: Mutex<FxHashMap<ChannelKey, ChannelSlot>>,
    connect_timeout: std::time::Duration,
    read_timeout: std::time::Duration,
}

impl RpcTransport {
    #[must_use]
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            channels: Mutex::new(FxHashMap::default()),
            connect_timeout: config.connect_timeout,
            read_timeout: config.read_timeout,
        }
    }

    /// Number of distinct channels currently cached.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.lock().len()
    }

    fn slot(&self, endpoint: &Endpoint) -> ChannelSlot {
        let key = ChannelKey::of(endpoint);
        self.channels.lock().entry(key).or_default().clone()
    }

    async fn dial(&self, endpoint: &Endpoint) -> Result<TcpStream, TransportError> {
        let authority = endpoint.authority();

        // Resolve explicitly so an unknown host is distinguishable from a
        // refused connection: the former never resolves on retry.
        let mut addrs = lookup_host(authority.as_str())
            .await
            .map_err(|e| TransportError::UnknownHost {
                endpoint: authority.clone(),
                reason: e.to_string(),
            })?;
        let addr = addrs.next().ok_or_else(|| TransportError::UnknownHost {
            endpoint: authority.clone(),
            reason: "no addresses resolved".into(),
        })?;

        let stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::Connect {
                endpoint: authority.clone(),
                reason: "connect timed out".into(),
            })?
            .map_err(|e| TransportError::Connect {
                endpoint: authority.clone(),
                reason: e.to_string(),
            })?;
        stream.set_nodelay(true).ok();
        debug!(endpoint = %authority, "rpc channel established");
        Ok(stream)
    }

    async fn exchange(
        &self,
        stream: &mut TcpStream,
        endpoint: &Endpoint,
        frame: &Frame,
    ) -> Result<Frame, TransportError> {
        let authority = endpoint.authority();
        wire::write_frame(stream, frame)
            .await
            .map_err(|e| in_flight(&authority, e))?;
        timeout(self.read_timeout, wire::read_frame(stream))
            .await
            .map_err(|_| TransportError::InFlight {
                endpoint: authority.clone(),
                reason: "reply timed out".into(),
            })?
            .map_err(|e| in_flight(&authority, e))
    }
}

fn in_flight(authority: &str, err: WireError) -> TransportError {
    match err {
        WireError::Io(io) => TransportError::InFlight {
            endpoint: authority.to_string(),
            reason: io.to_string(),
        },
        other => TransportError::Codec {
            reason: other.to_string(),
        },
    }
}

#[async_trait]
impl Transport for RpcTransport {
    async fn call(
        &self,
        endpoint: &Endpoint,
        op: CallOp,
        body: Value,
        correlation_id: &str,
    ) -> Result<Value, TransportError> {
        let kind = match op {
            CallOp::Predict => FrameKind::Predict,
            CallOp::Feedback => FrameKind::Feedback,
        };
        // The wire has no headers; the correlation id rides in the body.
        let frame = Frame::new(
            kind,
            json!({
                "meta": { "correlation_id": correlation_id },
                "payload": body,
            }),
        );

        let slot = self.slot(endpoint);
        let mut guard = slot.lock().await;
        if guard.is_none() {
            *guard = Some(self.dial(endpoint).await?);
        }
        let stream = guard.as_mut().ok_or_else(|| TransportError::Connect {
            endpoint: endpoint.authority(),
            reason: "channel unavailable".into(),
        })?;

        let reply = match self.exchange(stream, endpoint, &frame).await {
            Ok(reply) => reply,
            Err(err) => {
                // Evict the broken channel; the next call re-dials.
                *guard = None;
                return Err(err);
            }
        };

        match reply.kind {
            FrameKind::Ok => Ok(reply.body),
            FrameKind::Err => {
                let status = reply
                    .body
                    .get("status")
                    .and_then(Value::as_u64)
                    .unwrap_or(500) as u16;
                let reason = reply
                    .body
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or("remote error")
                    .to_string();
                Err(TransportError::RemoteStatus { status, reason })
            }
            other => {
                *guard = None;
                Err(TransportError::Codec {
                    reason: format!("unexpected reply frame {other:?}"),
                })
            }
        }
    }
}
