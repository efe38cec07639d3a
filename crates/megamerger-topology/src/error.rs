//! Error types for megamerger-topology.

use thiserror::Error;

use crate::NodeId;

/// Result type for topology construction.
pub type Result<T> = std::result::Result<T, TopologyError>;

/// A malformed topology. Raised before any protocol run starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TopologyError {
    /// A link names a node outside `0..node_count`.
    #[error("link endpoint {node} is outside a topology of {node_count} nodes")]
    UnknownNode { node: NodeId, node_count: usize },

    /// A link joins a node to itself.
    #[error("self loop on node {0}")]
    SelfLoop(NodeId),

    /// Weights must be positive and finite.
    #[error("link {a}-{b} has invalid weight {weight}")]
    InvalidWeight { a: NodeId, b: NodeId, weight: f64 },

    /// Two links join the same pair of nodes.
    #[error("parallel link between {a} and {b}")]
    ParallelLink { a: NodeId, b: NodeId },

    /// A generator was asked for a shape it cannot build.
    #[error("invalid shape: {0}")]
    InvalidShape(String),
}
