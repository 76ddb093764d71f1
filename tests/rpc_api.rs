//! Inbound RPC surface: the frame codec end to end.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;

use common::*;
use serde_json::{json, Value};
use tokio::net::TcpStream;

use trellis::api::{rpc, AppState};
use trellis::readiness::ReadinessHandle;
use trellis::resolver::StaticResolver;
use trellis::transport::wire::{self, Frame, FrameKind};

async fn serve_api(stub: Arc<StubTransport>) -> SocketAddr {
    let engine = Arc::new(engine_with(stub));
    let resolver = Arc::new(StaticResolver::single(single_model_tree()));
    let state = AppState::new(engine, resolver, ReadinessHandle::default());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(rpc::serve(listener, state));
    addr
}

#[tokio::test]
async fn predict_frame_round_trip() {
    let stub = StubTransport::new().always("model-a:9000", json!({"y": 2}));
    let addr = serve_api(stub).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = Frame::new(FrameKind::Predict, json!({"payload": {"x": 1}}));
    wire::write_frame(&mut stream, &request).await.unwrap();

    let reply = wire::read_frame(&mut stream).await.unwrap();
    assert_eq!(reply.kind, FrameKind::Ok);
    assert_eq!(reply.body["payload"], json!({"y": 2}));
    assert!(reply.body["meta"]["correlation_id"].is_string());
}

#[tokio::test]
async fn frames_on_one_connection_are_handled_sequentially() {
    let stub = StubTransport::new().always("model-a:9000", json!({"y": 2}));
    let addr = serve_api(stub).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    for i in 0..3 {
        let request = Frame::new(FrameKind::Predict, json!({"payload": {"i": i}}));
        wire::write_frame(&mut stream, &request).await.unwrap();
        let reply = wire::read_frame(&mut stream).await.unwrap();
        assert_eq!(reply.kind, FrameKind::Ok);
    }
}

#[tokio::test]
async fn unknown_deployment_tag_yields_err_frame() {
    let stub = StubTransport::new();
    let addr = serve_api(stub).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = Frame::new(
        FrameKind::Predict,
        json!({
            "meta": {"tags": {"deployment": "tenant-nine"}},
            "payload": {},
        }),
    );
    wire::write_frame(&mut stream, &request).await.unwrap();

    let reply = wire::read_frame(&mut stream).await.unwrap();
    assert_eq!(reply.kind, FrameKind::Err);
    assert_eq!(reply.body["code"], json!(107));
    assert_eq!(reply.body["status"], json!(404));
}

#[tokio::test]
async fn malformed_envelope_yields_invalid_request_frame() {
    let stub = StubTransport::new();
    let addr = serve_api(stub).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    // An envelope whose payload is missing entirely.
    let request = Frame::new(FrameKind::Predict, json!({"meta": {}}));
    wire::write_frame(&mut stream, &request).await.unwrap();

    let reply = wire::read_frame(&mut stream).await.unwrap();
    assert_eq!(reply.kind, FrameKind::Err);
    assert_eq!(reply.body["code"], json!(101));
}

#[tokio::test]
async fn feedback_frame_acks_after_prediction() {
    let stub = StubTransport::new().always("model-a:9000", json!({"y": 2}));
    let addr = serve_api(stub).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = Frame::new(FrameKind::Predict, json!({"payload": {"x": 1}}));
    wire::write_frame(&mut stream, &request).await.unwrap();
    let predicted = wire::read_frame(&mut stream).await.unwrap();
    assert_eq!(predicted.kind, FrameKind::Ok);

    let feedback = Frame::new(
        FrameKind::Feedback,
        json!({
            "request": {"payload": {"x": 1}},
            "response": predicted.body,
            "reward": 1.0,
        }),
    );
    wire::write_frame(&mut stream, &feedback).await.unwrap();
    let ack = wire::read_frame(&mut stream).await.unwrap();
    assert_eq!(ack.kind, FrameKind::Ok);
    assert_eq!(ack.body, json!({}));
}

#[tokio::test]
async fn reply_frame_kinds_are_rejected() {
    let stub = StubTransport::new();
    let addr = serve_api(stub).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = Frame::new(FrameKind::Ok, Value::Null);
    wire::write_frame(&mut stream, &request).await.unwrap();

    let reply = wire::read_frame(&mut stream).await.unwrap();
    assert_eq!(reply.kind, FrameKind::Err);
    assert_eq!(reply.body["code"], json!(101));
}
