//! Correlation ids and the routing-decision store.
//!
//! Every inbound request gets a correlation id before it enters the
//! traversal: the caller's own id when supplied, a fresh random one
//! otherwise. The id accompanies every downstream call for log correlation
//! only — remote services never make decisions from it. Router choices are
//! recorded against the id so a later feedback message replays the exact
//! path that produced the response.

use std::collections::VecDeque;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use uuid::Uuid;

use crate::envelope::Meta;

/// Generate a fresh correlation id (UUID v4, cryptographically random).
#[must_use]
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// The id to run a request under: the caller's if present, else a new one.
#[must_use]
pub fn resolve_id(meta: &Meta) -> String {
    meta.correlation_id.clone().unwrap_or_else(generate_id)
}

/// Routing decisions of one request, keyed by router node id.
type Route = FxHashMap<String, usize>;

/// Bounded, process-wide store of routing decisions for feedback replay.
///
/// Insertion order is tracked so the oldest request's route is evicted when
/// the capacity is reached; feedback for evicted requests surfaces as a
/// routing error rather than silently re-routing.
pub struct RouteStore {
    inner: Mutex<RouteStoreInner>,
    capacity: usize,
}

struct RouteStoreInner {
    routes: FxHashMap<String, Route>,
    order: VecDeque<String>,
}

impl RouteStore {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(RouteStoreInner {
                routes: FxHashMap::default(),
                order: VecDeque::new(),
            }),
            capacity: capacity.max(1),
        }
    }

    /// Record the child index a router chose for this correlation id.
    pub fn record(&self, correlation_id: &str, node_id: &str, child_index: usize) {
        let mut inner = self.inner.lock();
        if !inner.routes.contains_key(correlation_id) {
            if inner.order.len() >= self.capacity {
                if let Some(evicted) = inner.order.pop_front() {
                    inner.routes.remove(&evicted);
                }
            }
            inner.order.push_back(correlation_id.to_string());
            inner
                .routes
                .insert(correlation_id.to_string(), Route::default());
        }
        if let Some(route) = inner.routes.get_mut(correlation_id) {
            route.insert(node_id.to_string(), child_index);
        }
    }

    /// The child index recorded for `(correlation_id, node_id)`, if any.
    #[must_use]
    pub fn recall(&self, correlation_id: &str, node_id: &str) -> Option<usize> {
        self.inner
            .lock()
            .routes
            .get(correlation_id)
            .and_then(|route| route.get(node_id))
            .copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().routes.is_empty()
    }
}
