//! MegaMerger Network Topology
//!
//! Weighted, undirected network description consumed by the MegaMerger
//! protocol engine and its message substrates.
//!
//! # Model
//!
//! Nodes are identified by their topology index (`0..n`). Every link joins
//! two distinct nodes and carries a positive, finite weight. Each node sees
//! its links as a list of **ports**, numbered in link insertion order; a port
//! knows the peer node, the port number on the peer side, and the weight.
//!
//! # Candidate Edge Order
//!
//! Edges are ranked by the key `(weight, min(uid), max(uid))`. Both endpoints
//! of a link compute the same key, so two nodes deciding independently always
//! agree on the rank of the link between them. With this key every topology
//! has exactly one minimum spanning forest, computed here by Kruskal as the
//! reference the distributed protocol is checked against.

mod error;
#[cfg(feature = "serde")]
mod file;
mod graph;
mod key;
mod mst;
mod ports;

pub use error::{Result, TopologyError};
#[cfg(feature = "serde")]
pub use file::{LinkSpec, TopologySpec};
pub use graph::{Link, Topology};
pub use key::EdgeKey;
pub use mst::{reference_mst, SpanningForest};
pub use ports::PortInfo;

/// Index of a port in a node's local port list.
pub type Port = usize;

/// A node identifier: the node's index in the topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct NodeId(pub u64);

impl NodeId {
    /// Sentinel larger than every real node id.
    pub const MAX: Self = Self(u64::MAX);

    /// Create from a raw index.
    #[inline]
    pub const fn new(index: u64) -> Self {
        Self(index)
    }

    /// The raw index value.
    #[inline]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// The index as a `usize`, for addressing per-node tables.
    #[inline]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

impl From<u64> for NodeId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<usize> for NodeId {
    fn from(value: usize) -> Self {
        Self(value as u64)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
