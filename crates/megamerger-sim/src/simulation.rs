//! Discrete-event simulation of a MegaMerger run with event recording.
//!
//! Every message gets a seeded random delay. A message never overtakes an
//! earlier one on the same directed link: its delivery time is pushed to at
//! least the previous delivery time on that link, and ties are broken by
//! scheduling order.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use megamerger_protocol::{Event, MegaMergerNode, Message, NodeConfig, NodeId, NodeView, Port, Status, Topology};
use megamerger_topology::TopologyError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, trace};

use crate::error::{Result, SimError};
use crate::events::{NetworkSnapshot, ProtocolEvent};

/// Configuration for the simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Seed for delays and start times
    pub seed: u64,
    /// Smallest link delay, in ticks
    pub min_delay: u64,
    /// Largest link delay, in ticks
    pub max_delay: u64,
    /// Initiators wake at a random tick in `0..=start_jitter`
    pub start_jitter: u64,
    /// Nodes woken by an impulse; `None` wakes every node
    pub initiators: Option<Vec<NodeId>>,
    /// Run the routing phase after termination
    pub gather_routes: bool,
    /// Abort after this many handled events
    pub max_steps: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            min_delay: 1,
            max_delay: 10,
            start_jitter: 5,
            initiators: None,
            gather_routes: false,
            max_steps: 1_000_000,
        }
    }
}

impl SimulationConfig {
    /// Defaults overridden by `MEGAMERGER_SEED`, `MEGAMERGER_MAX_DELAY` and
    /// `MEGAMERGER_ROUTES`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(seed) = env_var("MEGAMERGER_SEED")? {
            config.seed = seed;
        }
        if let Some(max_delay) = env_var("MEGAMERGER_MAX_DELAY")? {
            config.max_delay = max_delay;
        }
        if let Some(routes) = env_var("MEGAMERGER_ROUTES")? {
            config.gather_routes = routes;
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn with_delays(mut self, min_delay: u64, max_delay: u64) -> Self {
        self.min_delay = min_delay;
        self.max_delay = max_delay;
        self
    }

    #[must_use]
    pub fn with_start_jitter(mut self, start_jitter: u64) -> Self {
        self.start_jitter = start_jitter;
        self
    }

    #[must_use]
    pub fn with_initiators(mut self, initiators: impl IntoIterator<Item = NodeId>) -> Self {
        self.initiators = Some(initiators.into_iter().collect());
        self
    }

    #[must_use]
    pub fn with_routes(mut self, gather_routes: bool) -> Self {
        self.gather_routes = gather_routes;
        self
    }

    #[must_use]
    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Engine configuration handed to every node.
    pub fn node_config(&self) -> NodeConfig {
        NodeConfig::default().with_routes(self.gather_routes)
    }

    /// Check the settings against `topology` and return the initiator list.
    pub fn validate(&self, topology: &Topology) -> Result<Vec<NodeId>> {
        if self.min_delay == 0 || self.min_delay > self.max_delay {
            return Err(SimError::Config(format!(
                "delays must satisfy 1 <= min ({}) <= max ({})",
                self.min_delay, self.max_delay
            )));
        }
        let initiators = match &self.initiators {
            Some(list) => list.clone(),
            None => topology.node_ids().collect(),
        };
        check_initiators(topology, &initiators)?;
        Ok(initiators)
    }
}

fn env_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| SimError::Config(format!("cannot parse {name}={raw:?}"))),
        Err(_) => Ok(None),
    }
}

/// Every initiator must exist and every component needs one, or part of
/// the network would never wake.
pub(crate) fn check_initiators(topology: &Topology, initiators: &[NodeId]) -> Result<()> {
    let node_count = topology.node_count();
    if let Some(&node) = initiators.iter().find(|n| n.index() >= node_count) {
        return Err(TopologyError::UnknownNode { node, node_count }.into());
    }
    for component in topology.components() {
        if !component.iter().any(|n| initiators.contains(n)) {
            return Err(SimError::Config(format!(
                "no initiator in the component of node {}",
                component[0]
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
enum Pending {
    Wake(NodeId),
    Deliver {
        to: NodeId,
        port: Port,
        message: Message,
    },
}

#[derive(Debug, Clone)]
struct ScheduledEvent {
    time: u64,
    seq: u64,
    pending: Pending,
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    // Reverse ordering for min-heap
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Events handled
    pub steps: u64,
    /// Messages delivered
    pub messages: u64,
    /// Tick of the last event
    pub end_time: u64,
    /// Nodes that finished as leader
    pub leaders: Vec<NodeId>,
    /// Events discarded for lack of a rule
    pub violations: u64,
}

/// Runs every node of a topology against a simulated clock and records a
/// timeline of what happened.
pub struct Simulation {
    config: SimulationConfig,
    topology: Topology,
    nodes: Vec<MegaMergerNode>,
    queue: BinaryHeap<ScheduledEvent>,
    link_clock: HashMap<(NodeId, Port), u64>,
    rng: StdRng,
    events: Vec<ProtocolEvent>,
    next_seq: u64,
    now: u64,
    steps: u64,
    messages: u64,
}

impl Simulation {
    /// Create nodes for `topology` and schedule the initiators.
    pub fn new(topology: Topology, config: SimulationConfig) -> Result<Self> {
        let initiators = config.validate(&topology)?;
        let node_config = config.node_config();
        let nodes = topology
            .node_ids()
            .map(|id| MegaMergerNode::from_topology(&topology, id, node_config.clone()))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let events = nodes
            .iter()
            .map(|n| ProtocolEvent::NodeCreated {
                node: n.uid(),
                degree: n.links().degree(),
                time: 0,
            })
            .collect();

        let mut sim = Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            topology,
            nodes,
            queue: BinaryHeap::new(),
            link_clock: HashMap::new(),
            events,
            next_seq: 0,
            now: 0,
            steps: 0,
            messages: 0,
        };

        for node in initiators {
            let at = sim.rng.gen_range(0..=sim.config.start_jitter);
            sim.schedule(at, Pending::Wake(node));
        }
        info!(
            nodes = sim.nodes.len(),
            links = sim.topology.link_count(),
            seed = sim.config.seed,
            "Simulation ready"
        );
        Ok(sim)
    }

    fn schedule(&mut self, time: u64, pending: Pending) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(ScheduledEvent { time, seq, pending });
    }

    /// Handle the next scheduled event. Returns false once nothing is left.
    pub fn step(&mut self) -> Result<bool> {
        let Some(next) = self.queue.pop() else {
            return Ok(false);
        };
        self.now = next.time;
        self.steps += 1;

        let (to, event) = match next.pending {
            Pending::Wake(node) => (node, Event::Impulse),
            Pending::Deliver { to, port, message } => {
                self.messages += 1;
                (to, Event::receive(port, message))
            }
        };
        self.deliver(to, event)?;
        Ok(true)
    }

    fn deliver(&mut self, to: NodeId, event: Event) -> Result<()> {
        let now = self.now;
        let node = &mut self.nodes[to.index()];
        if event == Event::Impulse && node.status() != Status::Idle {
            trace!(node = %to, "Already awake, impulse skipped");
            return Ok(());
        }

        let before = node.view();
        let discarded = node.metrics().violations;
        let kind = event.kind();
        node.handle(event)?;
        let after = node.view();
        if node.metrics().violations > discarded {
            self.events.push(ProtocolEvent::EventDiscarded {
                node: to,
                status: before.status,
                event: kind,
                time: now,
            });
        }
        let outbox = node.drain_outbox();

        self.events.extend(ProtocolEvent::diff(&before, &after, now));
        for envelope in outbox {
            self.send(to, envelope.port, envelope.message)?;
        }
        Ok(())
    }

    fn send(&mut self, from: NodeId, port: Port, message: Message) -> Result<()> {
        let (to, peer_port) = self.topology.peer(from, port).ok_or(
            megamerger_protocol::Error::UnknownPort {
                node: from,
                port,
                degree: self.topology.degree(from),
            },
        )?;

        let delay = self.rng.gen_range(self.config.min_delay..=self.config.max_delay);
        let last = self.link_clock.entry((from, port)).or_insert(0);
        let deliver_at = (self.now + delay).max(*last);
        *last = deliver_at;

        self.events.push(ProtocolEvent::MessageSent {
            from,
            to,
            kind: message.kind(),
            time: self.now,
            deliver_at,
        });
        self.schedule(
            deliver_at,
            Pending::Deliver {
                to,
                port: peer_port,
                message,
            },
        );
        Ok(())
    }

    /// Run until no event is left.
    pub fn run(&mut self) -> Result<RunSummary> {
        while self.step()? {
            if self.steps >= self.config.max_steps && !self.queue.is_empty() {
                return Err(SimError::StepLimit(self.steps));
            }
        }

        let summary = self.summary();
        info!(
            steps = summary.steps,
            messages = summary.messages,
            end_time = summary.end_time,
            leaders = summary.leaders.len(),
            "Simulation settled"
        );
        for node in self.nodes.iter().filter(|n| !n.is_finished()) {
            debug!(node = %node.uid(), status = %node.status(), "Node did not finish");
        }
        Ok(summary)
    }

    /// Counters of the run so far.
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            steps: self.steps,
            messages: self.messages,
            end_time: self.now,
            leaders: self
                .nodes
                .iter()
                .filter(|n| n.status() == Status::Leader)
                .map(MegaMergerNode::uid)
                .collect(),
            violations: self.nodes.iter().map(|n| n.metrics().violations).sum(),
        }
    }

    /// Current simulated time.
    pub fn now(&self) -> u64 {
        self.now
    }

    /// True once every node expects no further work.
    pub fn is_finished(&self) -> bool {
        self.nodes.iter().all(MegaMergerNode::is_finished)
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn nodes(&self) -> &[MegaMergerNode] {
        &self.nodes
    }

    /// Get a node by id.
    pub fn node(&self, id: NodeId) -> Option<&MegaMergerNode> {
        self.nodes.get(id.index())
    }

    pub fn views(&self) -> Vec<NodeView> {
        self.nodes.iter().map(MegaMergerNode::view).collect()
    }

    /// Get all recorded events.
    pub fn events(&self) -> &[ProtocolEvent] {
        &self.events
    }

    /// Get total event count.
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Get current network state.
    pub fn snapshot(&self) -> NetworkSnapshot {
        NetworkSnapshot::from_views(self.now, self.views(), self.messages as usize)
    }
}
