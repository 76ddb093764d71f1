//! Shared fixtures: scripted transports and small graph builders.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;

use trellis::config::EngineConfig;
use trellis::engine::Engine;
use trellis::graph::{Endpoint, GraphNode, GraphTree, NodeKind, ParamValue, Protocol};
use trellis::transport::{CallOp, Dispatcher, Transport, TransportError};

/// One observed call against the stub.
#[derive(Clone, Debug)]
pub struct CallRecord {
    pub authority: String,
    pub op: CallOp,
    pub body: Value,
}

/// Transport double scripted per endpoint authority.
///
/// Scripted results are consumed in order; when a script runs dry the
/// `always` response for that authority (if any) answers every further
/// call.
#[derive(Default)]
pub struct StubTransport {
    scripts: Mutex<FxHashMap<String, VecDeque<Result<Value, TransportError>>>>,
    always: Mutex<FxHashMap<String, Value>>,
    calls: Mutex<Vec<CallRecord>>,
}

impl StubTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(
        self: Arc<Self>,
        authority: &str,
        results: Vec<Result<Value, TransportError>>,
    ) -> Arc<Self> {
        self.scripts
            .lock()
            .entry(authority.to_string())
            .or_default()
            .extend(results);
        self
    }

    pub fn always(self: Arc<Self>, authority: &str, value: Value) -> Arc<Self> {
        self.always.lock().insert(authority.to_string(), value);
        self
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls.lock().clone()
    }

    /// Authorities called, in order.
    pub fn called_authorities(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.authority.clone()).collect()
    }

    pub fn calls_to(&self, authority: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.authority == authority)
            .count()
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn call(
        &self,
        endpoint: &Endpoint,
        op: CallOp,
        body: Value,
        _correlation_id: &str,
    ) -> Result<Value, TransportError> {
        let authority = endpoint.authority();
        self.calls.lock().push(CallRecord {
            authority: authority.clone(),
            op,
            body,
        });

        if let Some(queue) = self.scripts.lock().get_mut(&authority) {
            if let Some(result) = queue.pop_front() {
                return result;
            }
        }
        if let Some(value) = self.always.lock().get(&authority) {
            return Ok(value.clone());
        }
        Err(TransportError::Connect {
            endpoint: authority,
            reason: "no scripted response".into(),
        })
    }
}

/// Engine wired to the stub for both protocols, default retry bound.
pub fn engine_with(stub: Arc<StubTransport>) -> Engine {
    let config = EngineConfig::default();
    let dispatcher =
        Dispatcher::with_transports(stub.clone(), stub, config.transport.max_attempts);
    Engine::with_dispatcher(dispatcher, &config)
}

pub fn rest(host: &str, port: u16) -> Endpoint {
    Endpoint::new(host, port, Protocol::Rest)
}

/// `model` — one MODEL at the root.
pub fn single_model_tree() -> GraphTree {
    GraphTree::new(
        "model",
        vec![GraphNode::model("model", "model").with_endpoint(rest("model-a", 9000))],
    )
    .unwrap()
}

/// `router(branch = index)` over MODEL a (`model-a:9000`) and MODEL b
/// (`model-b:9000`).
pub fn router_tree(branch: i64) -> GraphTree {
    GraphTree::new(
        "router",
        vec![
            GraphNode::router("router", "splitter")
                .with_parameter("branch", ParamValue::Int(branch))
                .with_children(vec!["a", "b"]),
            GraphNode::model("a", "model-a").with_endpoint(rest("model-a", 9000)),
            GraphNode::model("b", "model-b").with_endpoint(rest("model-b", 9000)),
        ],
    )
    .unwrap()
}

/// COMBINER without an endpoint over MODEL a and MODEL b.
pub fn combiner_tree() -> GraphTree {
    GraphTree::new(
        "combiner",
        vec![
            GraphNode::combiner("combiner", "ensemble").with_children(vec!["a", "b"]),
            GraphNode::model("a", "model-a").with_endpoint(rest("model-a", 9000)),
            GraphNode::model("b", "model-b").with_endpoint(rest("model-b", 9000)),
        ],
    )
    .unwrap()
}

/// TRANSFORMER_INPUT -> MODEL -> (wrapped by) TRANSFORMER_OUTPUT chain:
/// `tout -> tin -> model`.
pub fn transformer_chain_tree() -> GraphTree {
    GraphTree::new(
        "tout",
        vec![
            GraphNode::new("tout", "postprocess", NodeKind::TransformerOutput)
                .with_endpoint(rest("post", 9000))
                .with_children(vec!["tin"]),
            GraphNode::new("tin", "preprocess", NodeKind::TransformerInput)
                .with_endpoint(rest("pre", 9000))
                .with_children(vec!["model"]),
            GraphNode::model("model", "model").with_endpoint(rest("model-a", 9000)),
        ],
    )
    .unwrap()
}
