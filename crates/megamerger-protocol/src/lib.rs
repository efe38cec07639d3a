//! MegaMerger Protocol - distributed minimum spanning tree construction
//!
//! This crate provides the per-node engine of the MegaMerger protocol, a
//! Gallager-Humblet-Spira style algorithm: fragments of the network find their
//! cheapest outgoing edge by convergecast, merge across it, and stop when no
//! outgoing edge remains. The branch links left behind form the minimum
//! spanning tree.
//!
//! # Overview
//!
//! ## Engine
//!
//! [`MegaMergerNode`] holds one node's state and exposes a single entry point,
//! [`handle`](MegaMergerNode::handle). Every event is looked up in a
//! `(status, event kind)` [`DispatchTable`]; the matching action mutates the
//! node and queues messages addressed by local port. Events with no rule are
//! discarded and counted.
//!
//! - **Link Registry**: per-port neighbour records and link kinds that only tighten
//! - **Candidate order**: edges ranked by `(weight, min uid, max uid)`
//! - **Deferred caches**: queries, requests and mins that arrive too early wait
//!   and are re-examined after every identity change
//!
//! ## Routing
//!
//! With [`NodeConfig::gather_routes`], the finished tree gathers every node's
//! link list at the leader, distributes the full adjacency back down, and each
//! node builds a shortest-path [`RoutingTable`].
//!
//! # Example
//!
//! ```rust,ignore
//! use megamerger_protocol::{Event, MegaMergerNode, NodeConfig};
//!
//! let mut node = MegaMergerNode::from_topology(&topology, uid, NodeConfig::default())?;
//! node.handle(Event::Impulse)?;
//! for envelope in node.drain_outbox() {
//!     // hand `envelope.message` to the substrate for `envelope.port`
//! }
//! ```

pub mod dispatch;
pub mod error;
pub mod link;
pub mod message;
pub mod node;
pub mod routing;

pub use dispatch::{Action, DispatchTable, Rule};
pub use error::{Error, Result};
pub use link::{LinkEntry, LinkKind, LinkRegistry};
pub use message::{
    Check, Envelope, Event, EventKind, Graph, Hello, Message, Min, Neighborhood, Outbox, Query,
    Request,
};
pub use node::{MegaMergerNode, NodeConfig, NodeMetrics, NodeView, Status};
pub use routing::{AdjacencyEntry, Route, RoutingTable};

// Re-export the topology types the engine speaks in
pub use megamerger_topology::{EdgeKey, NodeId, Port, Topology};
