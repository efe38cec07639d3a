//! Error types for megamerger-protocol.

use megamerger_topology::{NodeId, Port, TopologyError};
use thiserror::Error;

use crate::link::LinkKind;

/// Result type for megamerger-protocol operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the protocol engine.
///
/// Unexpected events are not errors: they resolve to the nil action and are
/// only counted. Everything here means the merge logic itself went wrong.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A state the protocol guarantees cannot happen was reached.
    #[error("node {node}: invariant broken: {detail}")]
    InvariantBroken { node: NodeId, detail: String },

    /// A port index outside the node's port range.
    #[error("node {node}: port {port} out of range (degree {degree})")]
    UnknownPort {
        node: NodeId,
        port: Port,
        degree: usize,
    },

    /// A link classification tried to move backwards.
    #[error("node {node}: link on port {port} cannot go from {from} to {to}")]
    LinkRegression {
        node: NodeId,
        port: Port,
        from: LinkKind,
        to: LinkKind,
    },

    /// The topology handed to the engine was malformed.
    #[error("topology error: {0}")]
    Topology(#[from] TopologyError),
}

impl Error {
    /// Shorthand for [`Error::InvariantBroken`].
    pub fn invariant(node: NodeId, detail: impl Into<String>) -> Self {
        Self::InvariantBroken {
            node,
            detail: detail.into(),
        }
    }

    /// True for errors that signal broken merge logic.
    #[must_use]
    pub fn is_invariant_break(&self) -> bool {
        matches!(self, Self::InvariantBroken { .. } | Self::LinkRegression { .. })
    }
}
