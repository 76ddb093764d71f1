//! Binary RPC surface: the wire frame codec over plain TCP.
//!
//! One task per accepted connection; frames on a connection are handled
//! sequentially, mirroring the outbound channel's request/reply discipline.
//! The deployment identity rides in the envelope's `meta.tags.deployment`
//! (the wire has no headers); absent, the default identity applies.

use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::envelope::{FeedbackEnvelope, RequestEnvelope};
use crate::errors::EngineError;
use crate::resolver::DEFAULT_IDENTITY;
use crate::transport::wire::{self, Frame, FrameKind, WireError};

use super::AppState;

/// Accept loop; one spawned task per connection.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "rpc surface listening");
    }
    loop {
        let (stream, peer) = listener.accept().await?;
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, state).await {
                debug!(%peer, error = %err, "rpc connection closed");
            }
        });
    }
}

async fn handle_connection(mut stream: TcpStream, state: AppState) -> Result<(), WireError> {
    loop {
        let frame = match wire::read_frame(&mut stream).await {
            Ok(frame) => frame,
            // Peer hung up between frames: a normal close.
            Err(WireError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(())
            }
            Err(err) => return Err(err),
        };
        let reply = dispatch(&state, frame).await;
        wire::write_frame(&mut stream, &reply).await?;
    }
}

async fn dispatch(state: &AppState, frame: Frame) -> Frame {
    match frame.kind {
        FrameKind::Predict => match predict(state, frame.body).await {
            Ok(body) => Frame::new(FrameKind::Ok, body),
            Err(err) => err_frame(err),
        },
        FrameKind::Feedback => match feedback(state, frame.body).await {
            Ok(()) => Frame::new(FrameKind::Ok, json!({})),
            Err(err) => err_frame(err),
        },
        FrameKind::Ok | FrameKind::Err => err_frame(EngineError::InvalidRequest(
            "reply frame sent to request surface".into(),
        )),
    }
}

async fn predict(state: &AppState, body: Value) -> Result<Value, EngineError> {
    let envelope: RequestEnvelope =
        serde_json::from_value(body).map_err(|e| EngineError::InvalidRequest(e.to_string()))?;
    let identity = tag_identity(&envelope.meta.tags);
    let tree = state.resolver.resolve(&identity).await?;
    let response = state.engine.execute(&tree, envelope).await?;
    serde_json::to_value(&response)
        .map_err(|e| EngineError::ExecutionFailure(format!("unserializable response: {e}")))
}

async fn feedback(state: &AppState, body: Value) -> Result<(), EngineError> {
    let envelope: FeedbackEnvelope =
        serde_json::from_value(body).map_err(|e| EngineError::InvalidRequest(e.to_string()))?;
    let identity = tag_identity(&envelope.request.meta.tags);
    let tree = state.resolver.resolve(&identity).await?;
    state.engine.send_feedback(&tree, envelope).await
}

fn tag_identity(tags: &rustc_hash::FxHashMap<String, Value>) -> String {
    tags.get("deployment")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_IDENTITY)
        .to_string()
}

fn err_frame(err: EngineError) -> Frame {
    let body = serde_json::to_value(err.to_body()).unwrap_or_else(|_| {
        json!({"code": 105, "status": 500, "reason": "error body encoding failed"})
    });
    Frame::new(FrameKind::Err, body)
}
