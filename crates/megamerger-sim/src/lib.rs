//! MegaMerger Simulation
//!
//! Substrates that carry messages between [`MegaMergerNode`]s built from a
//! [`Topology`], plus checks of the tree they end up agreeing on.
//!
//! # Architecture
//!
//! - **Simulation**: discrete-event clock with seeded per-message delays and
//!   FIFO links; records a [`ProtocolEvent`] timeline
//! - **Actors**: one tokio task and inbox per node
//! - **Scenarios**: rings, grids, random graphs and JSON topology files
//! - **Verification**: single leader, mutual branches, minimality, monotone levels
//!
//! # Usage
//!
//! ```ignore
//! let topology = Scenario::Random(50).build(7)?;
//! let mut sim = Simulation::new(topology, SimulationConfig::default())?;
//! sim.run()?;
//!
//! let tree = verify_run(sim.topology(), &sim.views(), sim.events())?;
//! println!("weight {}", tree.total_weight);
//! ```
//!
//! [`MegaMergerNode`]: megamerger_protocol::MegaMergerNode
//! [`Topology`]: megamerger_protocol::Topology

mod actors;
mod error;
mod events;
mod scenario;
mod simulation;
mod verify;

pub use actors::run_actors;
pub use error::{Result, SimError};
pub use events::{NetworkSnapshot, ProtocolEvent};
pub use scenario::{load_topology, random_connected, save_topology, Scenario, MAX_WEIGHT};
pub use simulation::{RunSummary, Simulation, SimulationConfig};
pub use verify::{
    branch_links, check_agreement, check_levels, check_minimal, check_termination, verify_run,
    TreeSummary, TreeViolation,
};
