//! Background readiness monitor.
//!
//! A single atomic flag, process-wide, false until the first check
//! completes successfully. On every tick the monitor re-derives graph
//! health from scratch — backing services can restart at any time, so no
//! memoized state carries over — and atomically replaces the previous
//! value. In-flight requests never block on a check.
//!
//! A node is ready if (a) it has no endpoint and all of its children are
//! ready, or (b) it has an endpoint and one of a bounded number of short
//! TCP connect probes to it succeeds. The graph is ready iff the root is.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::ReadinessConfig;
use crate::graph::{Endpoint, GraphNode, GraphTree};

/// Cheap, cloneable view of the monitor's current verdict.
#[derive(Clone, Default)]
pub struct ReadinessHandle {
    ready: Arc<AtomicBool>,
    last_checked: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl ReadinessHandle {
    /// Whether the whole graph was reachable at the last completed check.
    #[must_use]
    pub fn ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Snapshot for the probe surface.
    #[must_use]
    pub fn report(&self) -> ReadinessReport {
        ReadinessReport {
            ready: self.ready(),
            checked_at: *self.last_checked.lock(),
        }
    }

    fn publish(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
        *self.last_checked.lock() = Some(Utc::now());
    }
}

/// What the probe surface reports.
#[derive(Clone, Debug, Serialize)]
pub struct ReadinessReport {
    pub ready: bool,
    pub checked_at: Option<DateTime<Utc>>,
}

/// Periodic readiness checker for one deployment's graph.
///
/// Owns a background task; dropping the monitor aborts it. The handle stays
/// valid after a drop and simply keeps its last value.
pub struct ReadinessMonitor {
    handle: ReadinessHandle,
    task: JoinHandle<()>,
}

impl ReadinessMonitor {
    /// Spawn the monitor. The flag starts false and flips after the first
    /// successful full-graph check.
    #[must_use]
    pub fn spawn(tree: Arc<GraphTree>, config: ReadinessConfig) -> Self {
        let handle = ReadinessHandle::default();
        let published = handle.clone();
        let task = tokio::spawn(async move {
            let mut ticker = interval(config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let ready = check_node(&tree, tree.root(), &config).await;
                let previous = published.ready();
                published.publish(ready);
                if ready != previous {
                    info!(ready, "readiness changed");
                }
            }
        });
        Self { handle, task }
    }

    #[must_use]
    pub fn handle(&self) -> ReadinessHandle {
        self.handle.clone()
    }
}

impl Drop for ReadinessMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Recursive readiness of one node (iterative over an explicit stack to
/// avoid boxing; the endpoint probe is the only await point).
async fn check_node(tree: &GraphTree, root: &GraphNode, config: &ReadinessConfig) -> bool {
    // Post-order: a node with no endpoint needs its children's verdicts.
    let mut stack: Vec<&GraphNode> = vec![root];
    let mut order: Vec<&GraphNode> = Vec::new();
    while let Some(node) = stack.pop() {
        order.push(node);
        for id in &node.children {
            if let Some(child) = tree.node(id) {
                stack.push(child);
            }
        }
    }

    let mut verdicts: rustc_hash::FxHashMap<&str, bool> = rustc_hash::FxHashMap::default();
    for node in order.iter().rev() {
        let ready = match &node.endpoint {
            Some(endpoint) => probe(endpoint, config).await,
            None => node
                .children
                .iter()
                .all(|id| verdicts.get(id.as_str()).copied().unwrap_or(false)),
        };
        if !ready {
            debug!(node = %node.id, "not ready");
        }
        verdicts.insert(node.id.as_str(), ready);
    }
    verdicts.get(root.id.as_str()).copied().unwrap_or(false)
}

/// Bounded TCP connect probes against one endpoint.
async fn probe(endpoint: &Endpoint, config: &ReadinessConfig) -> bool {
    let authority = endpoint.authority();
    for _ in 0..config.probe_attempts {
        match timeout(config.probe_timeout, TcpStream::connect(authority.as_str())).await {
            Ok(Ok(_stream)) => return true,
            Ok(Err(_)) | Err(_) => {}
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphNode, GraphTree, Protocol};
    use std::time::Duration;

    fn config() -> ReadinessConfig {
        ReadinessConfig {
            interval: Duration::from_millis(50),
            probe_attempts: 3,
            probe_timeout: Duration::from_millis(100),
        }
    }

    #[tokio::test]
    async fn node_with_listening_endpoint_is_ready() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let tree = GraphTree::new(
            "m",
            vec![GraphNode::model("m", "model")
                .with_endpoint(Endpoint::new("127.0.0.1", port, Protocol::Rest))],
        )
        .unwrap();
        assert!(check_node(&tree, tree.root(), &config()).await);
    }

    #[tokio::test]
    async fn refused_endpoint_is_not_ready() {
        // Bind then drop, so the port exists but refuses connections.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let tree = GraphTree::new(
            "m",
            vec![GraphNode::model("m", "model")
                .with_endpoint(Endpoint::new("127.0.0.1", port, Protocol::Rest))],
        )
        .unwrap();
        assert!(!check_node(&tree, tree.root(), &config()).await);
    }

    #[tokio::test]
    async fn local_decision_node_needs_all_children_ready() {
        let up = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let up_port = up.local_addr().unwrap().port();
        let down = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let down_port = down.local_addr().unwrap().port();
        drop(down);

        let tree = GraphTree::new(
            "c",
            vec![
                GraphNode::combiner("c", "combiner").with_children(vec!["a", "b"]),
                GraphNode::model("a", "a")
                    .with_endpoint(Endpoint::new("127.0.0.1", up_port, Protocol::Rest)),
                GraphNode::model("b", "b")
                    .with_endpoint(Endpoint::new("127.0.0.1", down_port, Protocol::Rest)),
            ],
        )
        .unwrap();
        assert!(!check_node(&tree, tree.root(), &config()).await);
    }
}
