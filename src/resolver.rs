//! Deployment resolution boundary.
//!
//! Given a caller identity, resolution returns the graph to execute
//! against. The engine treats this as a synchronous lookup that may fail
//! with "no active deployment"; how deployments are distributed and kept
//! current is an external collaborator's concern.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::errors::EngineError;
use crate::graph::GraphTree;

/// Identity used when the caller supplies none.
pub const DEFAULT_IDENTITY: &str = "default";

/// Maps a caller identity to the deployment's graph.
#[async_trait]
pub trait DeploymentResolver: Send + Sync {
    async fn resolve(&self, identity: &str) -> Result<Arc<GraphTree>, EngineError>;
}

/// In-memory resolver for single-process deployments and tests.
///
/// Trees are registered up front (or swapped wholesale on a config push);
/// lookups are read-mostly.
#[derive(Default)]
pub struct StaticResolver {
    deployments: RwLock<FxHashMap<String, Arc<GraphTree>>>,
}

impl StaticResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver holding a single tree under [`DEFAULT_IDENTITY`].
    #[must_use]
    pub fn single(tree: GraphTree) -> Self {
        let resolver = Self::new();
        resolver.register(DEFAULT_IDENTITY, tree);
        resolver
    }

    /// Register (or replace) the tree served for an identity.
    pub fn register(&self, identity: impl Into<String>, tree: GraphTree) {
        self.deployments
            .write()
            .insert(identity.into(), Arc::new(tree));
    }
}

#[async_trait]
impl DeploymentResolver for StaticResolver {
    async fn resolve(&self, identity: &str) -> Result<Arc<GraphTree>, EngineError> {
        self.deployments
            .read()
            .get(identity)
            .cloned()
            .ok_or_else(|| EngineError::NoActiveDeployment(identity.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Endpoint, GraphNode, Protocol};

    fn tree() -> GraphTree {
        GraphTree::new(
            "m",
            vec![GraphNode::model("m", "model")
                .with_endpoint(Endpoint::new("127.0.0.1", 9000, Protocol::Rest))],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn resolves_registered_identity() {
        let resolver = StaticResolver::single(tree());
        assert!(resolver.resolve(DEFAULT_IDENTITY).await.is_ok());
    }

    #[tokio::test]
    async fn miss_is_no_active_deployment() {
        let resolver = StaticResolver::new();
        let err = resolver.resolve("tenant-a").await.unwrap_err();
        assert!(matches!(err, EngineError::NoActiveDeployment(id) if id == "tenant-a"));
    }
}
