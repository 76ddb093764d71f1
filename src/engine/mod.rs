//! Traversal engine: executes a prediction graph per inbound request.
//!
//! The engine walks the tree in two phases per node — a forward phase that
//! decides which children to visit and a backward phase that produces the
//! node's output from its children's outputs — dispatching on
//! [`NodeKind`](crate::graph::NodeKind) in a single match. Remote calls go
//! through the injected [`Dispatcher`]; sibling subtrees under a combiner
//! run concurrently, and the first failure cancels the rest.
//!
//! Each remote call carries its own fixed timeout; there is no aggregate
//! per-request deadline, so deep chains can accumulate latency beyond any
//! single call's bound (a known gap, see DESIGN.md).
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use trellis::config::EngineConfig;
//! use trellis::engine::Engine;
//! use trellis::envelope::RequestEnvelope;
//! use trellis::graph::GraphTree;
//! use serde_json::json;
//!
//! # async fn example(tree: GraphTree) -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::new(&EngineConfig::default())?;
//! let response = engine
//!     .execute(&tree, RequestEnvelope::new(json!({"x": 1})))
//!     .await?;
//! println!("correlation id: {:?}", response.meta.correlation_id);
//! # Ok(())
//! # }
//! ```

mod routing;
mod traversal;

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::Semaphore;
use tracing::instrument;

use crate::config::EngineConfig;
use crate::correlation::{self, RouteStore};
use crate::envelope::{FeedbackEnvelope, RequestEnvelope, ResponseEnvelope};
use crate::errors::EngineError;
use crate::graph::GraphTree;
use crate::transport::{Dispatcher, TransportError};

/// Executes prediction and feedback traversals over immutable graph trees.
///
/// One engine is shared by every inbound surface; the semaphore bounds the
/// number of concurrent traversals, and the transport pools behind the
/// dispatcher are process-wide.
pub struct Engine {
    dispatcher: Dispatcher,
    routes: RouteStore,
    round_robin: Mutex<FxHashMap<String, usize>>,
    permits: Arc<Semaphore>,
}

impl Engine {
    /// Build an engine with production transports.
    pub fn new(config: &EngineConfig) -> Result<Self, TransportError> {
        Ok(Self::with_dispatcher(
            Dispatcher::new(&config.transport)?,
            config,
        ))
    }

    /// Build an engine around an explicit dispatcher (tests inject scripted
    /// transports this way).
    #[must_use]
    pub fn with_dispatcher(dispatcher: Dispatcher, config: &EngineConfig) -> Self {
        Self {
            dispatcher,
            routes: RouteStore::new(config.route_store_capacity),
            round_robin: Mutex::new(FxHashMap::default()),
            permits: Arc::new(Semaphore::new(config.max_concurrent_traversals)),
        }
    }

    /// Execute one prediction traversal.
    ///
    /// Assigns the correlation id (caller's, or freshly generated), walks
    /// the tree from the root, and returns the root's backward-phase output
    /// with the engine's own id stamped on the response.
    #[instrument(skip(self, tree, request), fields(root = %tree.root_id()), err)]
    pub async fn execute(
        &self,
        tree: &GraphTree,
        request: RequestEnvelope,
    ) -> Result<ResponseEnvelope, EngineError> {
        let _permit = self.admit().await?;
        let correlation_id = correlation::resolve_id(&request.meta);
        let payload =
            traversal::predict(self, tree, tree.root(), request.payload, &correlation_id).await?;
        Ok(ResponseEnvelope::new(correlation_id, payload))
    }

    /// Replay a feedback message along the path that produced the original
    /// response: routers re-use their recorded child selection, models call
    /// the feedback operation on their endpoint.
    #[instrument(skip(self, tree, feedback), fields(root = %tree.root_id()), err)]
    pub async fn send_feedback(
        &self,
        tree: &GraphTree,
        feedback: FeedbackEnvelope,
    ) -> Result<(), EngineError> {
        let _permit = self.admit().await?;
        let correlation_id = feedback
            .correlation_id()
            .ok_or_else(|| {
                EngineError::InvalidRequest("feedback carries no correlation id".into())
            })?
            .to_string();
        traversal::feedback(self, tree, tree.root(), &feedback, &correlation_id).await
    }

    async fn admit(&self) -> Result<tokio::sync::OwnedSemaphorePermit, EngineError> {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| EngineError::Interrupted("engine is shutting down".into()))
    }

    pub(crate) fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub(crate) fn routes(&self) -> &RouteStore {
        &self.routes
    }

    /// Next round-robin slot for a router, modulo its child count.
    pub(crate) fn next_round_robin(&self, node_id: &str, children: usize) -> usize {
        let mut counters = self.round_robin.lock();
        let counter = counters.entry(node_id.to_string()).or_insert(0);
        let index = *counter % children;
        *counter = counter.wrapping_add(1);
        index
    }
}
