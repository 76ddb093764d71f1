//! Inbound request surfaces.
//!
//! Both surfaces accept the same logical envelopes: JSON over HTTP
//! ([`http`]) and the binary frame encoding over TCP ([`rpc`]). Each
//! resolves the caller's deployment, runs the traversal on the shared
//! engine, and renders failures through the engine taxonomy.

pub mod http;
pub mod rpc;

use std::sync::Arc;

use crate::engine::Engine;
use crate::readiness::ReadinessHandle;
use crate::resolver::DeploymentResolver;

/// Shared state behind every inbound handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub resolver: Arc<dyn DeploymentResolver>,
    pub readiness: ReadinessHandle,
}

impl AppState {
    #[must_use]
    pub fn new(
        engine: Arc<Engine>,
        resolver: Arc<dyn DeploymentResolver>,
        readiness: ReadinessHandle,
    ) -> Self {
        Self {
            engine,
            resolver,
            readiness,
        }
    }
}
