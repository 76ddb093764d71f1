//! # Trellis: Inference-Graph Orchestration Engine
//!
//! Trellis executes a *prediction graph* — a tree of independently deployed
//! model-serving microservices (models, routers, combiners, transformers) —
//! for every inbound prediction or feedback request, and returns a single
//! aggregated response.
//!
//! ## Core Concepts
//!
//! - **Graph model**: an immutable, per-deployment tree of typed nodes with
//!   their remote endpoints and parameters
//! - **Traversal**: a two-phase (forward/backward) recursive walk,
//!   dispatched on node kind, with concurrent fan-out under combiners
//! - **Transport**: REST and RPC dispatch behind one injected seam, with
//!   pooled connections and a bounded, idempotency-aware retry policy
//! - **Readiness**: a background monitor re-deriving graph health on a
//!   timer into one atomic flag
//! - **Correlation**: a per-request id propagated end to end, with router
//!   decisions recorded for feedback replay
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use serde_json::json;
//! use trellis::config::EngineConfig;
//! use trellis::engine::Engine;
//! use trellis::envelope::RequestEnvelope;
//! use trellis::graph::{Endpoint, GraphNode, GraphTree, Protocol};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let tree = GraphTree::new(
//!     "clf",
//!     vec![GraphNode::model("clf", "classifier")
//!         .with_endpoint(Endpoint::new("10.0.0.12", 9000, Protocol::Rest))],
//! )?;
//!
//! let engine = Engine::new(&EngineConfig::default())?;
//! let response = engine
//!     .execute(&tree, RequestEnvelope::new(json!({"instances": [[1.0, 2.0]]})))
//!     .await?;
//! println!("{}", response.payload);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Guide
//!
//! - [`graph`] - Node tree, endpoints, parameters, load-time validation
//! - [`envelope`] - Request/response/feedback message shapes
//! - [`engine`] - The traversal engine and its routing policies
//! - [`transport`] - REST/RPC clients, pooling, retry classification
//! - [`readiness`] - Background readiness monitor
//! - [`correlation`] - Correlation ids and the routing-decision store
//! - [`resolver`] - Deployment resolution boundary
//! - [`api`] - Inbound HTTP and RPC surfaces
//! - [`errors`] - The engine error taxonomy
//! - [`config`] - Tunables and environment overrides

pub mod api;
pub mod config;
pub mod correlation;
pub mod engine;
pub mod envelope;
pub mod errors;
pub mod graph;
pub mod readiness;
pub mod resolver;
pub mod telemetry;
pub mod transport;
