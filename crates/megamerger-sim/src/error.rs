//! Error types for megamerger-sim.

use megamerger_protocol::NodeId;
use megamerger_topology::TopologyError;
use thiserror::Error;

/// Result type for megamerger-sim operations.
pub type Result<T> = std::result::Result<T, SimError>;

/// Errors raised while setting up or running a substrate.
#[derive(Debug, Error)]
pub enum SimError {
    /// A node hit a broken protocol invariant.
    #[error("protocol error: {0}")]
    Protocol(#[from] megamerger_protocol::Error),

    /// The topology could not be built.
    #[error("topology error: {0}")]
    Topology(#[from] TopologyError),

    /// The run configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The run did not settle in time.
    #[error("simulation still busy after {0} steps")]
    StepLimit(u64),

    /// An actor's inbox closed while it still had work.
    #[error("inbox of node {0} closed before it finished")]
    ChannelClosed(NodeId),

    /// Reading or writing a file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An actor task panicked or was cancelled.
    #[error("actor task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
