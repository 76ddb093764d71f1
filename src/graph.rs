//! Graph model for prediction-graph execution.
//!
//! This module defines the immutable, per-deployment tree of typed nodes the
//! engine walks for every inbound request: node kinds, remote endpoints,
//! configuration parameters, and the [`GraphTree`] container with its
//! load-time validation.
//!
//! # Core Concepts
//!
//! - **Nodes**: One stage in the inference graph, identified by a stable
//!   string id and dispatched on [`NodeKind`]
//! - **Endpoints**: Optional `host:port` + protocol of the backing service
//! - **Parameters**: Ordered, typed configuration forwarded to the backing
//!   service (e.g. traffic-split weights)
//! - **Validation**: Structural checks run once at load time, never per
//!   request
//!
//! # Quick Start
//!
//! ```
//! use trellis::graph::{Endpoint, GraphNode, GraphTree, NodeKind, Protocol};
//!
//! let model = GraphNode::model("clf", "classifier")
//!     .with_endpoint(Endpoint::new("10.0.0.12", 9000, Protocol::Rest));
//!
//! let tree = GraphTree::new("clf", vec![model]).unwrap();
//! assert_eq!(tree.root().name, "classifier");
//! ```

use std::fmt;

use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifies the behaviour of a node within a prediction graph.
///
/// The set is closed: the traversal dispatches on this tag in a single
/// `match`, so adding a kind means extending the enum and the switch rather
/// than a class hierarchy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    /// Leaf call to a model-serving microservice.
    Model,
    /// Selects exactly one child per request (A/B test, canary split).
    Router,
    /// Fans out to all children and folds their outputs into one.
    Combiner,
    /// Rewrites the request payload before descending into its child.
    TransformerInput,
    /// Rewrites the child's output payload on the way back up.
    TransformerOutput,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Model => "MODEL",
            Self::Router => "ROUTER",
            Self::Combiner => "COMBINER",
            Self::TransformerInput => "TRANSFORMER_INPUT",
            Self::TransformerOutput => "TRANSFORMER_OUTPUT",
        };
        write!(f, "{s}")
    }
}

/// Wire protocol spoken by a node's backing service.
///
/// Chosen once when the endpoint is resolved from the graph, never per call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Protocol {
    Rest,
    Rpc,
}

/// Remote address of a node's backing service.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16, protocol: Protocol) -> Self {
        Self {
            host: host.into(),
            port,
            protocol,
        }
    }

    /// `host:port` form used for socket addresses and log fields.
    #[must_use]
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A typed configuration value forwarded to the backing service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParamValue {
    Double(f64),
    Float(f32),
    Int(i64),
    String(String),
}

impl ParamValue {
    /// Integer view of this value, when it has one.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// String view of this value, when it has one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }
}

/// A named parameter; parameters keep the order they were declared in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(flatten)]
    pub value: ParamValue,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: ParamValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// One immutable node of a prediction graph.
///
/// `endpoint` is present iff the node's behaviour requires calling a remote
/// service; routers and combiners may instead be purely local decision
/// points. `children` is an ordered list of node ids — order matters for
/// routing indices and combiner folds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub name: String,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<Endpoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
}

impl GraphNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            endpoint: None,
            parameters: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Convenience constructor for a leaf MODEL node.
    pub fn model(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, name, NodeKind::Model)
    }

    /// Convenience constructor for a ROUTER node.
    pub fn router(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, name, NodeKind::Router)
    }

    /// Convenience constructor for a COMBINER node.
    pub fn combiner(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, name, NodeKind::Combiner)
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.parameters.push(Parameter::new(name, value));
        self
    }

    #[must_use]
    pub fn with_children(mut self, children: Vec<&str>) -> Self {
        self.children = children.into_iter().map(String::from).collect();
        self
    }

    /// Look up a parameter by name.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&ParamValue> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }
}

/// Structural problems detected when loading a graph.
///
/// All of these are configuration errors: they reject the deployment at
/// load time so requests never meet a malformed tree.
#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("graph has no nodes")]
    #[diagnostic(code(trellis::graph::empty))]
    Empty,

    #[error("root node {0:?} is not present in the graph")]
    #[diagnostic(code(trellis::graph::missing_root))]
    MissingRoot(String),

    #[error("node {parent:?} references unknown child {child:?}")]
    #[diagnostic(code(trellis::graph::unknown_child))]
    UnknownChild { parent: String, child: String },

    #[error("duplicate node id {0:?}")]
    #[diagnostic(code(trellis::graph::duplicate_id))]
    DuplicateId(String),

    #[error("node {child:?} is referenced by more than one parent")]
    #[diagnostic(
        code(trellis::graph::shared_child),
        help("a prediction graph is a tree; give each parent its own subtree")
    )]
    SharedChild { child: String },

    #[error("cycle detected through node {0:?}")]
    #[diagnostic(code(trellis::graph::cycle))]
    Cycle(String),

    #[error("node {id:?} ({kind}) requires at least one child")]
    #[diagnostic(code(trellis::graph::childless))]
    Childless { id: String, kind: NodeKind },

    #[error("transformer {id:?} must have exactly one child, found {found}")]
    #[diagnostic(code(trellis::graph::transformer_arity))]
    TransformerArity { id: String, found: usize },

    #[error("model {id:?} has no endpoint")]
    #[diagnostic(
        code(trellis::graph::missing_endpoint),
        help("a MODEL's behaviour is a call to its backing service")
    )]
    MissingEndpoint { id: String },

    #[error("model {id:?} must be a leaf, found {found} children")]
    #[diagnostic(code(trellis::graph::model_children))]
    LeafWithChildren { id: String, found: usize },

    #[error("node {id:?} is unreachable from the root")]
    #[diagnostic(code(trellis::graph::unreachable))]
    Unreachable { id: String },

    #[error("invalid graph definition: {0}")]
    #[diagnostic(code(trellis::graph::parse))]
    Parse(#[from] serde_json::Error),
}

/// An immutable prediction graph: a single connected, acyclic tree.
///
/// Constructed once per deployment version and never mutated afterwards;
/// concurrency is only over *execution*, so the tree needs no locking.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GraphTree {
    root_id: String,
    nodes: FxHashMap<String, GraphNode>,
}

impl GraphTree {
    /// Build and validate a tree from a node list.
    pub fn new(root_id: impl Into<String>, nodes: Vec<GraphNode>) -> Result<Self, GraphError> {
        let root_id = root_id.into();
        let mut map: FxHashMap<String, GraphNode> = FxHashMap::default();
        for node in nodes {
            let id = node.id.clone();
            if map.insert(id.clone(), node).is_some() {
                return Err(GraphError::DuplicateId(id));
            }
        }
        let tree = Self {
            root_id,
            nodes: map,
        };
        tree.validate()?;
        Ok(tree)
    }

    /// Parse a tree from its JSON definition and validate it.
    pub fn from_json(raw: &str) -> Result<Self, GraphError> {
        let tree: GraphTree = serde_json::from_str(raw)?;
        tree.validate()?;
        Ok(tree)
    }

    #[must_use]
    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    /// The root node. Validation guarantees it exists.
    #[must_use]
    pub fn root(&self) -> &GraphNode {
        &self.nodes[&self.root_id]
    }

    #[must_use]
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    /// Iterate over all nodes in unspecified order.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Structural validation, run at load time.
    ///
    /// Checks, in order: non-empty, root present, all child references
    /// resolve, tree shape (single parent, acyclic, everything reachable),
    /// and per-kind arity rules.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.nodes.is_empty() {
            return Err(GraphError::Empty);
        }
        if !self.nodes.contains_key(&self.root_id) {
            return Err(GraphError::MissingRoot(self.root_id.clone()));
        }

        // Child references resolve, and no node has two parents.
        let mut seen_as_child: FxHashSet<&str> = FxHashSet::default();
        for node in self.nodes.values() {
            for child in &node.children {
                if !self.nodes.contains_key(child) {
                    return Err(GraphError::UnknownChild {
                        parent: node.id.clone(),
                        child: child.clone(),
                    });
                }
                if !seen_as_child.insert(child) {
                    return Err(GraphError::SharedChild {
                        child: child.clone(),
                    });
                }
            }
        }
        if seen_as_child.contains(self.root_id.as_str()) {
            return Err(GraphError::Cycle(self.root_id.clone()));
        }

        // Depth-first walk from the root: detects cycles and counts reach.
        let mut visited: FxHashSet<&str> = FxHashSet::default();
        let mut stack: Vec<&str> = vec![self.root_id.as_str()];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                return Err(GraphError::Cycle(id.to_string()));
            }
            for child in &self.nodes[id].children {
                stack.push(child);
            }
        }
        if visited.len() != self.nodes.len() {
            let orphan = self
                .nodes
                .keys()
                .find(|id| !visited.contains(id.as_str()))
                .cloned()
                .unwrap_or_default();
            return Err(GraphError::Unreachable { id: orphan });
        }

        // Per-kind arity rules.
        for node in self.nodes.values() {
            match node.kind {
                NodeKind::Combiner | NodeKind::Router if node.children.is_empty() => {
                    return Err(GraphError::Childless {
                        id: node.id.clone(),
                        kind: node.kind,
                    });
                }
                NodeKind::TransformerInput | NodeKind::TransformerOutput
                    if node.children.len() != 1 =>
                {
                    return Err(GraphError::TransformerArity {
                        id: node.id.clone(),
                        found: node.children.len(),
                    });
                }
                NodeKind::Model if node.endpoint.is_none() => {
                    return Err(GraphError::MissingEndpoint {
                        id: node.id.clone(),
                    });
                }
                NodeKind::Model if !node.children.is_empty() => {
                    return Err(GraphError::LeafWithChildren {
                        id: node.id.clone(),
                        found: node.children.len(),
                    });
                }
                _ => {}
            }
        }

        Ok(())
    }
}
