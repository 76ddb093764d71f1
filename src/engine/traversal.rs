//! The two-phase recursive walk over a prediction graph.
//!
//! Recursion terminates at MODEL leaves; the overall response is the
//! backward-phase output of the root. Any node-level failure aborts the
//! whole traversal — no partial or degraded response is synthesized, and a
//! combiner never proceeds with a subset of its children's outputs.

use futures_util::future::{try_join_all, BoxFuture};
use futures_util::FutureExt;
use serde_json::{json, Value};
use tracing::debug;

use crate::envelope::FeedbackEnvelope;
use crate::errors::EngineError;
use crate::graph::{GraphNode, GraphTree, NodeKind};
use crate::transport::CallOp;

use super::{routing, Engine};

/// Forward/backward walk producing this node's output for a prediction.
///
/// Boxed because the future recurses through children of unbounded depth.
pub(crate) fn predict<'a>(
    engine: &'a Engine,
    tree: &'a GraphTree,
    node: &'a GraphNode,
    payload: Value,
    correlation_id: &'a str,
) -> BoxFuture<'a, Result<Value, EngineError>> {
    async move {
        debug!(node = %node.id, kind = %node.kind, correlation_id, "visit");
        match node.kind {
            // Leaf call: forward phase is a no-op, backward phase asks the
            // backing service for its prediction.
            NodeKind::Model => {
                let endpoint = node.endpoint.as_ref().ok_or_else(|| {
                    EngineError::ExecutionFailure(format!("model {:?} has no endpoint", node.id))
                })?;
                engine
                    .dispatcher()
                    .call(endpoint, CallOp::Predict, payload, correlation_id)
                    .await
                    .map_err(Into::into)
            }

            // Pure fan-out: every child is visited concurrently; the first
            // failure cancels the in-flight siblings and no combiner-level
            // call is made with partial inputs.
            NodeKind::Combiner => {
                let futures = node
                    .children
                    .iter()
                    .map(|id| child(tree, id).map(|c| predict(engine, tree, c, payload.clone(), correlation_id)))
                    .collect::<Result<Vec<_>, _>>()?;
                let outputs = try_join_all(futures).await?;
                match &node.endpoint {
                    Some(endpoint) => engine
                        .dispatcher()
                        .call(
                            endpoint,
                            CallOp::Predict,
                            json!({ "inputs": outputs }),
                            correlation_id,
                        )
                        .await
                        .map_err(Into::into),
                    // Default fold without a combining endpoint: the first
                    // child's output.
                    None => outputs.into_iter().next().ok_or_else(|| {
                        EngineError::ExecutionFailure(format!(
                            "combiner {:?} produced no outputs",
                            node.id
                        ))
                    }),
                }
            }

            // Exactly one child is visited; the chosen index is recorded on
            // the way back up so feedback can replay the same path.
            NodeKind::Router => {
                let index = routing::decide(engine, node, &payload, correlation_id).await?;
                let selected = node.children.get(index).ok_or_else(|| {
                    EngineError::InvalidRouting {
                        node_id: node.id.clone(),
                        reason: format!(
                            "index {index} out of range for {} children",
                            node.children.len()
                        ),
                    }
                })?;
                let output =
                    predict(engine, tree, child(tree, selected)?, payload, correlation_id).await?;
                engine.routes().record(correlation_id, &node.id, index);
                Ok(output)
            }

            // Rewrite the payload, then descend into the sole child.
            NodeKind::TransformerInput => {
                let transformed = match &node.endpoint {
                    Some(endpoint) => {
                        engine
                            .dispatcher()
                            .call(endpoint, CallOp::Predict, payload, correlation_id)
                            .await?
                    }
                    None => payload,
                };
                let sole = sole_child(tree, node)?;
                predict(engine, tree, sole, transformed, correlation_id).await
            }

            // Descend first, then rewrite the child's output on the way up.
            NodeKind::TransformerOutput => {
                let sole = sole_child(tree, node)?;
                let output = predict(engine, tree, sole, payload, correlation_id).await?;
                match &node.endpoint {
                    Some(endpoint) => engine
                        .dispatcher()
                        .call(endpoint, CallOp::Predict, output, correlation_id)
                        .await
                        .map_err(Into::into),
                    None => Ok(output),
                }
            }
        }
    }
    .boxed()
}

/// Replay a feedback message along the recorded path.
pub(crate) fn feedback<'a>(
    engine: &'a Engine,
    tree: &'a GraphTree,
    node: &'a GraphNode,
    envelope: &'a FeedbackEnvelope,
    correlation_id: &'a str,
) -> BoxFuture<'a, Result<(), EngineError>> {
    async move {
        match node.kind {
            // Models receive the feedback operation on their endpoint.
            NodeKind::Model => {
                let endpoint = node.endpoint.as_ref().ok_or_else(|| {
                    EngineError::ExecutionFailure(format!("model {:?} has no endpoint", node.id))
                })?;
                engine
                    .dispatcher()
                    .call(endpoint, CallOp::Feedback, to_value(envelope)?, correlation_id)
                    .await?;
                Ok(())
            }

            // The recorded child selection is replayed — never recomputed —
            // and a learning router with an endpoint observes the reward
            // itself before the replay descends.
            NodeKind::Router => {
                let index = engine.routes().recall(correlation_id, &node.id).ok_or_else(|| {
                    EngineError::InvalidRouting {
                        node_id: node.id.clone(),
                        reason: format!("no recorded route for correlation id {correlation_id:?}"),
                    }
                })?;
                let selected = node.children.get(index).ok_or_else(|| {
                    EngineError::InvalidRouting {
                        node_id: node.id.clone(),
                        reason: format!(
                            "recorded index {index} out of range for {} children",
                            node.children.len()
                        ),
                    }
                })?;
                if let Some(endpoint) = &node.endpoint {
                    engine
                        .dispatcher()
                        .call(endpoint, CallOp::Feedback, to_value(envelope)?, correlation_id)
                        .await?;
                }
                feedback(engine, tree, child(tree, selected)?, envelope, correlation_id).await
            }

            // Feedback fans out to every child that contributed an output.
            NodeKind::Combiner => {
                let futures = node
                    .children
                    .iter()
                    .map(|id| {
                        child(tree, id)
                            .map(|c| feedback(engine, tree, c, envelope, correlation_id))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                try_join_all(futures).await?;
                Ok(())
            }

            // Transformers are transparent to feedback.
            NodeKind::TransformerInput | NodeKind::TransformerOutput => {
                let sole = sole_child(tree, node)?;
                feedback(engine, tree, sole, envelope, correlation_id).await
            }
        }
    }
    .boxed()
}

fn child<'t>(tree: &'t GraphTree, id: &str) -> Result<&'t GraphNode, EngineError> {
    tree.node(id)
        .ok_or_else(|| EngineError::ExecutionFailure(format!("dangling child id {id:?}")))
}

fn sole_child<'t>(tree: &'t GraphTree, node: &GraphNode) -> Result<&'t GraphNode, EngineError> {
    let id = node.children.first().ok_or_else(|| {
        EngineError::ExecutionFailure(format!("transformer {:?} has no child", node.id))
    })?;
    child(tree, id)
}

fn to_value(envelope: &FeedbackEnvelope) -> Result<Value, EngineError> {
    serde_json::to_value(envelope)
        .map_err(|e| EngineError::ExecutionFailure(format!("unserializable feedback: {e}")))
}
