//! Retry-policy behaviour at the dispatcher seam.

mod common;

use common::*;
use serde_json::json;

use trellis::envelope::RequestEnvelope;
use trellis::errors::EngineError;
use trellis::transport::TransportError;

fn connect_failure() -> TransportError {
    TransportError::Connect {
        endpoint: "model-a:9000".into(),
        reason: "connect timed out".into(),
    }
}

#[tokio::test]
async fn connect_timeouts_are_retried_up_to_the_bound() {
    // Attempts 1 and 2 fail to connect, attempt 3 succeeds.
    let stub = StubTransport::new()
        .script(
            "model-a:9000",
            vec![Err(connect_failure()), Err(connect_failure())],
        )
        .always("model-a:9000", json!({"y": 2}));
    let engine = engine_with(stub.clone());

    let response = engine
        .execute(&single_model_tree(), RequestEnvelope::new(json!({"x": 1})))
        .await
        .unwrap();
    assert_eq!(response.payload, json!({"y": 2}));
    assert_eq!(stub.calls_to("model-a:9000"), 3);
}

#[tokio::test]
async fn exhausted_retries_surface_the_connect_failure() {
    let stub = StubTransport::new().script(
        "model-a:9000",
        vec![
            Err(connect_failure()),
            Err(connect_failure()),
            Err(connect_failure()),
        ],
    );
    let engine = engine_with(stub.clone());

    let err = engine
        .execute(&single_model_tree(), RequestEnvelope::new(json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Microservice { .. }));
    // Bound of 3 attempts, no more.
    assert_eq!(stub.calls_to("model-a:9000"), 3);
}

#[tokio::test]
async fn unknown_host_is_never_retried() {
    let stub = StubTransport::new().script(
        "model-a:9000",
        vec![Err(TransportError::UnknownHost {
            endpoint: "model-a:9000".into(),
            reason: "failed to lookup address".into(),
        })],
    );
    let engine = engine_with(stub.clone());

    let err = engine
        .execute(&single_model_tree(), RequestEnvelope::new(json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidEndpoint { .. }));
    assert_eq!(stub.calls_to("model-a:9000"), 1);
}

#[tokio::test]
async fn tls_failure_is_never_retried() {
    let stub = StubTransport::new().script(
        "model-a:9000",
        vec![Err(TransportError::Tls {
            endpoint: "model-a:9000".into(),
            reason: "handshake failed".into(),
        })],
    );
    let engine = engine_with(stub.clone());

    let err = engine
        .execute(&single_model_tree(), RequestEnvelope::new(json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Microservice { .. }));
    assert_eq!(stub.calls_to("model-a:9000"), 1);
}

#[tokio::test]
async fn in_flight_failure_is_never_retried() {
    // The body may have reached the model; replaying a non-idempotent call
    // risks duplicate side effects.
    let stub = StubTransport::new().script(
        "model-a:9000",
        vec![Err(TransportError::InFlight {
            endpoint: "model-a:9000".into(),
            reason: "read timeout".into(),
        })],
    );
    let engine = engine_with(stub.clone());

    let err = engine
        .execute(&single_model_tree(), RequestEnvelope::new(json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Microservice { .. }));
    assert_eq!(stub.calls_to("model-a:9000"), 1);
}

#[tokio::test]
async fn non_success_status_is_never_retried() {
    let stub = StubTransport::new().script(
        "model-a:9000",
        vec![Err(TransportError::RemoteStatus {
            status: 503,
            reason: "overloaded".into(),
        })],
    );
    let engine = engine_with(stub.clone());

    let err = engine
        .execute(&single_model_tree(), RequestEnvelope::new(json!({})))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Microservice { status: 503, .. }
    ));
    assert_eq!(stub.calls_to("model-a:9000"), 1);
}
