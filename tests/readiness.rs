//! Readiness monitor behaviour against real sockets.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::rest;
use trellis::config::ReadinessConfig;
use trellis::graph::{GraphNode, GraphTree};
use trellis::readiness::ReadinessMonitor;

fn fast_config() -> ReadinessConfig {
    ReadinessConfig {
        interval: Duration::from_millis(50),
        probe_attempts: 3,
        probe_timeout: Duration::from_millis(100),
    }
}

async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

#[tokio::test]
async fn flag_starts_false_and_flips_when_endpoint_accepts() {
    let port = free_port().await;
    let tree = GraphTree::new(
        "m",
        vec![GraphNode::model("m", "model").with_endpoint(rest("127.0.0.1", port))],
    )
    .unwrap();

    let monitor = ReadinessMonitor::spawn(Arc::new(tree), fast_config());
    let handle = monitor.handle();

    // Nothing listens yet: default false, and the first checks keep it so.
    assert!(!handle.ready());
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!handle.ready());

    // Once the port accepts connections, a following tick flips the flag.
    let _listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .unwrap();
    let mut flipped = false;
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if handle.ready() {
            flipped = true;
            break;
        }
    }
    assert!(flipped, "readiness never became true");

    let report = handle.report();
    assert!(report.ready);
    assert!(report.checked_at.is_some());
}

#[tokio::test]
async fn flag_drops_back_when_endpoint_goes_away() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let tree = GraphTree::new(
        "m",
        vec![GraphNode::model("m", "model").with_endpoint(rest("127.0.0.1", port))],
    )
    .unwrap();

    let monitor = ReadinessMonitor::spawn(Arc::new(tree), fast_config());
    let handle = monitor.handle();

    let mut ready = false;
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if handle.ready() {
            ready = true;
            break;
        }
    }
    assert!(ready);

    // Every tick re-derives from scratch, so a vanished service is noticed.
    drop(listener);
    let mut dropped = false;
    for _ in 0..60 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if !handle.ready() {
            dropped = true;
            break;
        }
    }
    assert!(dropped, "readiness never went back to false");
}
