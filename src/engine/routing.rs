//! Routing decisions for ROUTER nodes.
//!
//! A decision is an index into the node's ordered children. Resolution
//! order: the router's own endpoint (called with the request payload), a
//! static `branch` parameter, then the `strategy` parameter — `round_robin`
//! (the default) or `weighted` with a `weights` parameter of
//! comma-separated values, one per child.

use rand::Rng;
use serde_json::Value;

use crate::errors::EngineError;
use crate::graph::{GraphNode, ParamValue};
use crate::transport::CallOp;

use super::Engine;

pub(crate) async fn decide(
    engine: &Engine,
    node: &GraphNode,
    payload: &Value,
    correlation_id: &str,
) -> Result<usize, EngineError> {
    if let Some(endpoint) = &node.endpoint {
        let reply = engine
            .dispatcher()
            .call(endpoint, CallOp::Predict, payload.clone(), correlation_id)
            .await?;
        return parse_decision(&reply).ok_or_else(|| EngineError::InvalidRouting {
            node_id: node.id.clone(),
            reason: format!("unparseable routing reply: {reply}"),
        });
    }

    if let Some(branch) = node.parameter("branch").and_then(ParamValue::as_int) {
        return usize::try_from(branch).map_err(|_| EngineError::InvalidRouting {
            node_id: node.id.clone(),
            reason: format!("negative branch parameter {branch}"),
        });
    }

    match node.parameter("strategy").and_then(ParamValue::as_str) {
        None | Some("round_robin") => Ok(engine.next_round_robin(&node.id, node.children.len())),
        Some("weighted") => weighted(node),
        Some(other) => Err(EngineError::InvalidRouting {
            node_id: node.id.clone(),
            reason: format!("unknown routing strategy {other:?}"),
        }),
    }
}

/// A routing reply is either a bare index or `{"branch": <index>}`.
fn parse_decision(reply: &Value) -> Option<usize> {
    reply
        .as_u64()
        .or_else(|| reply.get("branch").and_then(Value::as_u64))
        .map(|n| n as usize)
}

/// Weighted-random selection over the `weights` parameter.
fn weighted(node: &GraphNode) -> Result<usize, EngineError> {
    let invalid = |reason: String| EngineError::InvalidRouting {
        node_id: node.id.clone(),
        reason,
    };

    let raw = node
        .parameter("weights")
        .and_then(ParamValue::as_str)
        .ok_or_else(|| invalid("weighted strategy requires a weights parameter".into()))?;

    let weights: Vec<f64> = raw
        .split(',')
        .map(|w| w.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| invalid(format!("bad weights parameter {raw:?}: {e}")))?;

    if weights.len() != node.children.len() {
        return Err(invalid(format!(
            "{} weights for {} children",
            weights.len(),
            node.children.len()
        )));
    }
    let total: f64 = weights.iter().copied().filter(|w| *w > 0.0).sum();
    if total <= 0.0 {
        return Err(invalid("weights sum to zero".into()));
    }

    let mut sample = rand::rng().random_range(0.0..total);
    for (index, weight) in weights.iter().enumerate() {
        if *weight <= 0.0 {
            continue;
        }
        if sample < *weight {
            return Ok(index);
        }
        sample -= weight;
    }
    // Floating-point edge: the sample landed exactly on the upper bound.
    Ok(weights.len() - 1)
}
