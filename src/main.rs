//! Engine binary: loads a graph definition, spawns the readiness monitor,
//! and serves the HTTP and RPC surfaces until Ctrl-C.

use std::sync::Arc;

use miette::IntoDiagnostic;
use tokio::net::TcpListener;
use tracing::info;

use trellis::api::{http, rpc, AppState};
use trellis::config::EngineConfig;
use trellis::engine::Engine;
use trellis::graph::GraphTree;
use trellis::readiness::ReadinessMonitor;
use trellis::resolver::StaticResolver;
use trellis::telemetry;

#[tokio::main]
async fn main() -> miette::Result<()> {
    telemetry::init();

    let config = EngineConfig::from_env();
    let graph_path =
        std::env::var("TRELLIS_GRAPH").unwrap_or_else(|_| "graph.json".to_string());
    let raw = std::fs::read_to_string(&graph_path).into_diagnostic()?;
    let tree = GraphTree::from_json(&raw)?;
    info!(graph = %graph_path, nodes = tree.len(), "graph loaded");

    let monitor = ReadinessMonitor::spawn(Arc::new(tree.clone()), config.readiness.clone());
    let engine = Arc::new(Engine::new(&config)?);
    let resolver = Arc::new(StaticResolver::single(tree));
    let state = AppState::new(engine, resolver, monitor.handle());

    let http_listener = TcpListener::bind(&config.http_listen)
        .await
        .into_diagnostic()?;
    let rpc_listener = TcpListener::bind(&config.rpc_listen)
        .await
        .into_diagnostic()?;

    tokio::select! {
        result = http::serve(http_listener, state.clone()) => result.into_diagnostic()?,
        result = rpc::serve(rpc_listener, state) => result.into_diagnostic()?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }
    Ok(())
}
