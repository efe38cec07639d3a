//! Protocol Engine - the per-node MegaMerger state machine.
//!
//! A [`MegaMergerNode`] owns all of its state and reacts to one [`Event`] at a
//! time through [`handle`](MegaMergerNode::handle). Outgoing messages collect
//! in an outbox that the substrate drains after every event.
//!
//! # Fragment Lifecycle
//!
//! 1. **Discovery**: wake, broadcast `Hello`, wait for a hello on every port.
//! 2. **Local search**: probe the cheapest `Unknown` port with `Query`.
//!    `No` marks it `Internal` and moves on; `Yes` makes it the local
//!    candidate.
//! 3. **Convergecast**: report the best of the local candidate and every
//!    child's `Min` to the parent. The core ends up with the fragment minimum.
//! 4. **Merge**: the core relays a forwarded `Request` down to the contact
//!    point, which sends a fresh `Request` across the outgoing edge.
//!    A lower-level requester is absorbed, an equal-level crossing request
//!    fuses the two fragments, anything else waits in the request cache.
//! 5. **Expand**: the new identity travels down the tree in `Check`.
//! 6. **Termination**: a core whose convergecast finds no outgoing edge
//!    becomes `Leader` and multicasts `Termination`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use megamerger_topology::{EdgeKey, NodeId, Port, Topology, TopologyError};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};

use crate::dispatch::DispatchTable;
use crate::error::{Error, Result};
use crate::link::{LinkKind, LinkRegistry};
use crate::message::{
    Check, Envelope, Event, EventKind, Graph, Hello, Message, Min, Neighborhood, Outbox, Query,
    Request,
};
use crate::routing::{AdjacencyEntry, RoutingTable};

/// Per-node configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeConfig {
    /// Gather the adjacency and build routing tables after termination.
    pub gather_routes: bool,
}

impl NodeConfig {
    /// Enable or disable the routing phase.
    #[must_use]
    pub fn with_routes(mut self, gather_routes: bool) -> Self {
        self.gather_routes = gather_routes;
        self
    }
}

/// Node status, the first half of the dispatch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// Not yet woken
    Idle,
    /// Collecting hellos or probing ports
    Updating,
    /// Local probing done, waiting for children
    Processing,
    /// Reported; waiting for a merge outcome
    Connecting,
    /// Core of the final tree
    Leader,
    /// Any other node of the final tree
    Follower,
}

impl Status {
    /// True once the node has observed termination.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Leader | Self::Follower)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Updating => write!(f, "Updating"),
            Self::Processing => write!(f, "Processing"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Leader => write!(f, "Leader"),
            Self::Follower => write!(f, "Follower"),
        }
    }
}

/// Counters kept by a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetrics {
    /// Events handled, including discarded ones
    pub events: u64,
    /// Events discarded for lack of a rule, or ignored as unexpected
    pub violations: u64,
    /// Messages handed to the substrate
    pub sent: u64,
}

/// Read-only snapshot of a node for rendering and checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeView {
    pub uid: NodeId,
    pub status: Status,
    pub cid: NodeId,
    pub level: u32,
    pub core: bool,
    pub parent: Option<Port>,
    pub links: Vec<LinkKind>,
}

#[derive(Debug, Clone, Default)]
struct RouteGather {
    started: bool,
    done: bool,
    entries: Vec<AdjacencyEntry>,
    subtree_size: usize,
    reports: BTreeSet<Port>,
}

type Rules = DispatchTable<Status, EventKind, MegaMergerNode, Event>;

fn rules() -> &'static Rules {
    static RULES: OnceLock<Rules> = OnceLock::new();
    RULES.get_or_init(|| {
        use EventKind as E;
        use Status as S;

        let searching = [S::Updating, S::Processing, S::Connecting];
        let mut table = Rules::new();
        table
            .add_rule(&[S::Idle], E::Impulse, "wake up", MegaMergerNode::on_impulse)
            .add_rule(&[S::Idle], E::Hello, "wake up by hello", MegaMergerNode::on_first_hello)
            .add_rule(&[S::Updating], E::Hello, "update link cache", MegaMergerNode::on_hello)
            .add_rule(&searching, E::Query, "answer query", MegaMergerNode::on_query)
            .add_rule(&searching, E::Request, "merge or absorb", MegaMergerNode::on_request)
            .add_rule(&[S::Updating], E::Yes, "accept candidate", MegaMergerNode::on_yes)
            .add_rule(&[S::Updating], E::No, "reject candidate", MegaMergerNode::on_no)
            .add_rule(&[S::Updating], E::Min, "cache minimum", MegaMergerNode::on_early_min)
            .add_rule(&[S::Processing], E::Min, "compute minimum", MegaMergerNode::on_min)
            .add_rule(&[S::Connecting], E::Forward, "forward request", MegaMergerNode::on_forward)
            .add_rule(&[S::Connecting], E::Check, "expand", MegaMergerNode::on_check)
            .add_rule(&[S::Connecting], E::Termination, "terminate", MegaMergerNode::on_termination)
            .add_rule(
                &[S::Leader, S::Follower],
                E::Neighborhood,
                "gather adjacency",
                MegaMergerNode::on_neighborhood,
            )
            .add_rule(&[S::Follower], E::Graph, "compute routes", MegaMergerNode::on_graph);
        table
    })
}

/// One participant of the MegaMerger protocol.
#[derive(Debug, Clone)]
pub struct MegaMergerNode {
    uid: NodeId,
    config: NodeConfig,
    status: Status,

    // Fragment identity
    cid: NodeId,
    level: u32,
    core: bool,

    // Tree
    parent: Option<Port>,
    children: BTreeSet<Port>,
    tree: BTreeSet<Port>,
    links: LinkRegistry,

    // Minimum-edge search
    test_port: Option<Port>,
    best_key: EdgeKey,
    best_port: Option<Port>,
    contact_point: Option<NodeId>,
    request_port: Option<Port>,
    min_received: BTreeSet<Port>,
    reported: bool,

    // Deferred messages
    pending_queries: Vec<(Port, Query)>,
    pending_requests: BTreeMap<Port, Request>,
    pending_mins: Vec<(Port, Min)>,

    gather: RouteGather,
    routing_table: Option<RoutingTable>,

    outbox: Outbox,
    metrics: NodeMetrics,
}

impl MegaMergerNode {
    /// Create a node with one port per weight, as a level-0 singleton.
    #[must_use]
    pub fn new(uid: NodeId, weights: &[f64], config: NodeConfig) -> Self {
        debug!(node = %uid, degree = weights.len(), routes = config.gather_routes, "Created node");
        Self {
            uid,
            config,
            status: Status::Idle,
            cid: uid,
            level: 0,
            core: true,
            parent: None,
            children: BTreeSet::new(),
            tree: BTreeSet::new(),
            links: LinkRegistry::new(uid, weights),
            test_port: None,
            best_key: EdgeKey::INFINITE,
            best_port: None,
            contact_point: None,
            request_port: None,
            min_received: BTreeSet::new(),
            reported: false,
            pending_queries: Vec::new(),
            pending_requests: BTreeMap::new(),
            pending_mins: Vec::new(),
            gather: RouteGather::default(),
            routing_table: None,
            outbox: Outbox::new(weights.len()),
            metrics: NodeMetrics::default(),
        }
    }

    /// Create node `uid` with the ports it has in `topology`.
    pub fn from_topology(topology: &Topology, uid: NodeId, config: NodeConfig) -> Result<Self> {
        if uid.index() >= topology.node_count() {
            return Err(TopologyError::UnknownNode {
                node: uid,
                node_count: topology.node_count(),
            }
            .into());
        }
        Ok(Self::new(uid, &topology.port_weights(uid), config))
    }

    /// Handle one event to completion.
    ///
    /// An event with no rule for the current status is discarded and counted
    /// as a violation. An error means a protocol invariant broke.
    pub fn handle(&mut self, event: Event) -> Result<()> {
        self.metrics.events += 1;
        let (status, kind) = (self.status, event.kind());

        let Some(rule) = rules().lookup(status, kind) else {
            self.metrics.violations += 1;
            warn!(
                node = %self.uid,
                status = %status,
                event = %kind,
                port = ?event.port(),
                "No rule for event, discarding"
            );
            return Ok(());
        };

        debug!(node = %self.uid, status = %status, event = %kind, port = ?event.port(), rule = rule.name, "Dispatching");
        let result = (rule.action)(self, event);
        if let Err(ref e) = result {
            error!(node = %self.uid, status = %status, event = %kind, error = %e, "Protocol invariant broken");
        }
        result
    }

    /// True if `(status, kind)` has a rule.
    #[must_use]
    pub fn has_rule(status: Status, kind: EventKind) -> bool {
        rules().handles(status, kind)
    }

    /// Take the messages produced so far.
    pub fn drain_outbox(&mut self) -> Vec<Envelope> {
        let out = self.outbox.drain();
        self.metrics.sent += out.len() as u64;
        out
    }

    #[must_use]
    pub const fn uid(&self) -> NodeId {
        self.uid
    }

    #[must_use]
    pub const fn cid(&self) -> NodeId {
        self.cid
    }

    #[must_use]
    pub const fn level(&self) -> u32 {
        self.level
    }

    #[must_use]
    pub const fn is_core(&self) -> bool {
        self.core
    }

    #[must_use]
    pub const fn status(&self) -> Status {
        self.status
    }

    /// Port toward the core (`None` for the core).
    #[must_use]
    pub const fn parent(&self) -> Option<Port> {
        self.parent
    }

    /// Ports reporting into this node.
    #[must_use]
    pub fn children(&self) -> &BTreeSet<Port> {
        &self.children
    }

    /// All branch ports.
    #[must_use]
    pub fn tree(&self) -> &BTreeSet<Port> {
        &self.tree
    }

    /// The link registry.
    #[must_use]
    pub fn links(&self) -> &LinkRegistry {
        &self.links
    }

    /// Best candidate known in the current search.
    #[must_use]
    pub fn best(&self) -> (Option<Port>, EdgeKey) {
        (self.best_port, self.best_key)
    }

    /// Number of children whose `Min` has arrived this search.
    #[must_use]
    pub fn min_counter(&self) -> usize {
        self.min_received.len()
    }

    /// Sizes of the deferred query, request and min caches.
    #[must_use]
    pub fn pending(&self) -> (usize, usize, usize) {
        (
            self.pending_queries.len(),
            self.pending_requests.len(),
            self.pending_mins.len(),
        )
    }

    #[must_use]
    pub fn metrics(&self) -> &NodeMetrics {
        &self.metrics
    }

    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Forwarding table, once routes are computed.
    #[must_use]
    pub fn routing_table(&self) -> Option<&RoutingTable> {
        self.routing_table.as_ref()
    }

    /// True once termination reached this node.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.status.is_terminal()
    }

    /// True once this node expects no further work.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.is_terminated() && (!self.config.gather_routes || self.routing_table.is_some())
    }

    /// Snapshot for observers.
    #[must_use]
    pub fn view(&self) -> NodeView {
        NodeView {
            uid: self.uid,
            status: self.status,
            cid: self.cid,
            level: self.level,
            core: self.core,
            parent: self.parent,
            links: self.links.kinds(),
        }
    }

    fn invariant(&self, detail: impl Into<String>) -> Error {
        Error::invariant(self.uid, detail)
    }

    fn mismatch(&self, expected: EventKind) -> Error {
        self.invariant(format!("dispatched {expected} rule on a different event"))
    }

    fn send(&mut self, port: Port, message: Message) {
        trace!(node = %self.uid, port, kind = %message.kind(), "Queue message");
        self.outbox.send(port, message);
    }

    fn send_to_children(&mut self, message: &Message) {
        self.outbox.multicast(self.children.iter().copied(), message);
    }

    // ---- Discovery ----

    fn on_impulse(&mut self, _event: Event) -> Result<()> {
        self.wake()?;
        if self.links.all_heard() {
            // No ports: a lone node is its own final fragment.
            self.begin_search()?;
        }
        Ok(())
    }

    fn on_first_hello(&mut self, event: Event) -> Result<()> {
        self.wake()?;
        self.on_hello(event)
    }

    fn on_hello(&mut self, event: Event) -> Result<()> {
        let Event::Receive {
            port,
            message: Message::Hello(hello),
        } = event
        else {
            return Err(self.mismatch(EventKind::Hello));
        };

        if !self.links.record_hello(port, hello.sender_id)? {
            self.metrics.violations += 1;
            warn!(node = %self.uid, port, "Repeated hello ignored");
            return Ok(());
        }
        trace!(node = %self.uid, port, neighbor = %hello.sender_id, unheard = self.links.unheard_count(), "Hello recorded");

        if self.links.all_heard() {
            self.begin_search()?;
        }
        Ok(())
    }

    fn wake(&mut self) -> Result<()> {
        self.cid = self.uid;
        self.level = 0;
        self.core = true;
        self.ensure_singleton()?;
        self.status = Status::Updating;
        debug!(node = %self.uid, degree = self.links.degree(), "Waking up");
        self.outbox.broadcast(&Message::Hello(Hello {
            sender_id: self.uid,
        }));
        Ok(())
    }

    /// Hellos advertise the sender's id as its cluster id, which only holds
    /// for an untouched level-0 singleton.
    fn ensure_singleton(&self) -> Result<()> {
        if self.level != 0 || self.cid != self.uid || !self.tree.is_empty() {
            return Err(self.invariant(format!(
                "hello from a node that is not a singleton (cid {}, level {})",
                self.cid, self.level
            )));
        }
        Ok(())
    }

    // ---- Local search ----

    fn reset_search(&mut self) {
        self.status = Status::Updating;
        self.test_port = None;
        self.best_key = EdgeKey::INFINITE;
        self.best_port = None;
        self.contact_point = None;
        self.min_received.clear();
        self.reported = false;
    }

    fn begin_search(&mut self) -> Result<()> {
        self.reset_search();
        self.test()
    }

    /// Probe the cheapest unclassified port, or finish the local search.
    fn test(&mut self) -> Result<()> {
        let (port, key) = self.links.select_minimum(&[LinkKind::Unknown]);
        self.test_port = port;
        match port {
            Some(port) => {
                trace!(node = %self.uid, port, key = %key, "Probing port");
                let query = Query {
                    cid: self.cid,
                    level: self.level,
                    contact_point: self.uid,
                };
                self.send(port, Message::Query(query));
                Ok(())
            }
            None => self.local_search_done(),
        }
    }

    fn local_search_done(&mut self) -> Result<()> {
        self.test_port = None;
        self.status = Status::Processing;
        for (port, min) in std::mem::take(&mut self.pending_mins) {
            self.accept_min(port, min);
        }
        self.try_report()
    }

    fn on_yes(&mut self, event: Event) -> Result<()> {
        let Event::Receive {
            port,
            message: Message::Yes,
        } = event
        else {
            return Err(self.mismatch(EventKind::Yes));
        };

        if self.test_port != Some(port) {
            self.metrics.violations += 1;
            warn!(node = %self.uid, port, test_port = ?self.test_port, "Yes on a port that is not being probed");
            return Ok(());
        }

        self.links.classify(port, LinkKind::Outgoing)?;
        let key = self.links.key(port)?;
        if key < self.best_key {
            self.best_key = key;
            self.best_port = Some(port);
            self.contact_point = Some(self.uid);
        }
        debug!(node = %self.uid, port, key = %key, "Outgoing edge found");
        self.local_search_done()
    }

    fn on_no(&mut self, event: Event) -> Result<()> {
        let Event::Receive {
            port,
            message: Message::No,
        } = event
        else {
            return Err(self.mismatch(EventKind::No));
        };

        self.mark_internal(port)?;
        if self.test_port == Some(port) {
            self.test()?;
        }
        Ok(())
    }

    /// Mark a port internal unless it is already final.
    fn mark_internal(&mut self, port: Port) -> Result<()> {
        if matches!(
            self.links.kind(port)?,
            LinkKind::Unknown | LinkKind::Outgoing
        ) {
            self.links.classify(port, LinkKind::Internal)?;
        }
        Ok(())
    }

    fn on_query(&mut self, event: Event) -> Result<()> {
        let Event::Receive {
            port,
            message: Message::Query(query),
        } = event
        else {
            return Err(self.mismatch(EventKind::Query));
        };

        self.links.note_cluster(port, query.cid)?;
        if !self.answer_query(port, query)? {
            debug!(node = %self.uid, port, level = self.level, query_level = query.level, "Deferring query");
            self.pending_queries.push((port, query));
        }
        Ok(())
    }

    /// Answer a query if this node's identity allows it. Returns `false` when
    /// the query must wait for a higher level.
    fn answer_query(&mut self, port: Port, query: Query) -> Result<bool> {
        if query.cid == self.cid {
            self.mark_internal(port)?;
            if self.test_port == Some(port) {
                // Crossing probes on an internal link: the peer's query is our No.
                self.test()?;
            } else {
                self.send(port, Message::No);
            }
            Ok(true)
        } else if self.level >= query.level {
            self.send(port, Message::Yes);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn reply_pending_queries(&mut self) -> Result<()> {
        for (port, query) in std::mem::take(&mut self.pending_queries) {
            if !self.answer_query(port, query)? {
                self.pending_queries.push((port, query));
            }
        }
        Ok(())
    }

    // ---- Convergecast ----

    fn on_early_min(&mut self, event: Event) -> Result<()> {
        let Event::Receive {
            port,
            message: Message::Min(min),
        } = event
        else {
            return Err(self.mismatch(EventKind::Min));
        };
        trace!(node = %self.uid, port, "Caching min until the local search ends");
        self.pending_mins.push((port, min));
        Ok(())
    }

    fn on_min(&mut self, event: Event) -> Result<()> {
        let Event::Receive {
            port,
            message: Message::Min(min),
        } = event
        else {
            return Err(self.mismatch(EventKind::Min));
        };
        self.accept_min(port, min);
        self.try_report()
    }

    fn accept_min(&mut self, port: Port, min: Min) {
        if !self.children.contains(&port) {
            self.metrics.violations += 1;
            warn!(node = %self.uid, port, "Min from a port that is not a child");
            return;
        }
        if !self.min_received.insert(port) {
            self.metrics.violations += 1;
            warn!(node = %self.uid, port, "Duplicate min ignored");
            return;
        }
        let key = min.key();
        if key < self.best_key {
            self.best_key = key;
            self.best_port = Some(port);
            self.contact_point = Some(min.sender_id);
        }
        trace!(node = %self.uid, port, key = %key, received = self.min_received.len(), children = self.children.len(), "Min received");
    }

    fn try_report(&mut self) -> Result<()> {
        if self.status != Status::Processing
            || self.reported
            || self.test_port.is_some()
            || self.min_received.len() < self.children.len()
        {
            return Ok(());
        }
        self.reported = true;

        if !self.core {
            let parent = self
                .parent
                .ok_or_else(|| self.invariant("non-core node without a parent"))?;
            let contact = self.contact_point.unwrap_or(self.uid);
            debug!(node = %self.uid, key = %self.best_key, contact = %contact, "Reporting subtree minimum");
            self.status = Status::Connecting;
            self.send(parent, Message::Min(Min::new(self.best_key, contact)));
            Ok(())
        } else if self.best_key.is_infinite() {
            self.status = Status::Leader;
            info!(node = %self.uid, level = self.level, "No outgoing edge left, fragment is final");
            self.send_to_children(&Message::Termination);
            self.start_gather()
        } else {
            self.status = Status::Connecting;
            info!(
                node = %self.uid,
                level = self.level,
                key = %self.best_key,
                contact = ?self.contact_point,
                "Fragment minimum found"
            );
            self.route_request()
        }
    }

    // ---- Merge ----

    /// Move the merge request one hop toward the contact point.
    fn route_request(&mut self) -> Result<()> {
        let port = self
            .best_port
            .ok_or_else(|| self.invariant("no port toward the fragment minimum"))?;

        if self.children.contains(&port) {
            let request = Request {
                cid: self.cid,
                level: self.level,
                contact_point: self.contact_point.unwrap_or(self.uid),
                forwarded: true,
            };
            self.send(port, Message::Request(request));
            Ok(())
        } else {
            self.connect(port)
        }
    }

    fn on_forward(&mut self, event: Event) -> Result<()> {
        let Event::Receive {
            port,
            message: Message::Request(request),
        } = event
        else {
            return Err(self.mismatch(EventKind::Forward));
        };

        if self.parent != Some(port) {
            return Err(self.invariant(format!(
                "forwarded request on port {port}, parent is {:?}",
                self.parent
            )));
        }
        if self.contact_point != Some(request.contact_point) {
            return Err(self.invariant(format!(
                "forwarded request for {} but the subtree minimum belongs to {:?}",
                request.contact_point, self.contact_point
            )));
        }
        self.route_request()
    }

    /// Send a fresh request across the outgoing edge on `port`.
    fn connect(&mut self, port: Port) -> Result<()> {
        let kind = self.links.kind(port)?;
        if kind != LinkKind::Outgoing {
            return Err(self.invariant(format!("merge request over {kind} port {port}")));
        }
        self.links.classify(port, LinkKind::Branch)?;
        self.tree.insert(port);
        self.request_port = Some(port);

        info!(node = %self.uid, port, cid = %self.cid, level = self.level, "Requesting merge");
        let request = Request {
            cid: self.cid,
            level: self.level,
            contact_point: self.uid,
            forwarded: false,
        };
        self.send(port, Message::Request(request));
        self.attend_pending_requests()
    }

    fn on_request(&mut self, event: Event) -> Result<()> {
        let Event::Receive {
            port,
            message: Message::Request(request),
        } = event
        else {
            return Err(self.mismatch(EventKind::Request));
        };

        self.links.note_cluster(port, request.cid)?;
        if self.can_serve(port, &request) {
            self.serve_request(port, request)
        } else {
            debug!(node = %self.uid, port, level = self.level, request_level = request.level, "Deferring request");
            self.pending_requests.insert(port, request);
            Ok(())
        }
    }

    fn can_serve(&self, port: Port, request: &Request) -> bool {
        request.level < self.level
            || (request.level == self.level && self.request_port == Some(port))
    }

    fn serve_request(&mut self, port: Port, request: Request) -> Result<()> {
        if request.level < self.level {
            self.absorb(port, request)
        } else {
            self.fuse(port, request)
        }
    }

    /// Serve every cached request the current state allows.
    fn attend_pending_requests(&mut self) -> Result<()> {
        while let Some(port) = self
            .pending_requests
            .iter()
            .find(|(port, request)| self.can_serve(**port, request))
            .map(|(port, _)| *port)
        {
            if let Some(request) = self.pending_requests.remove(&port) {
                self.serve_request(port, request)?;
            }
        }
        Ok(())
    }

    fn absorb(&mut self, port: Port, request: Request) -> Result<()> {
        if self.tree.contains(&port) {
            debug!(node = %self.uid, port, "Request already served");
            return Ok(());
        }
        self.links.classify(port, LinkKind::Branch)?;
        self.tree.insert(port);
        self.children.insert(port);

        let update_status = !self.reported;
        info!(
            node = %self.uid,
            port,
            absorbed = %request.cid,
            absorbed_level = request.level,
            level = self.level,
            update_status,
            "Absorbing fragment"
        );
        let check = Check {
            cid: self.cid,
            level: self.level,
            update_status,
        };
        self.send(port, Message::Check(check));
        Ok(())
    }

    fn fuse(&mut self, port: Port, request: Request) -> Result<()> {
        let peer = request.contact_point;
        if peer == self.uid {
            return Err(self.invariant("fusion request from self"));
        }
        if self.uid < peer {
            debug!(node = %self.uid, port, peer = %peer, "Fusion agreed, waiting for the new core");
            return Ok(());
        }

        self.level += 1;
        self.cid = self.uid;
        self.core = true;
        self.parent = None;
        self.children = self.tree.clone();
        self.request_port = None;
        self.links.refresh_outgoing();
        info!(node = %self.uid, peer = %peer, level = self.level, "Fusion, taking over as core");

        self.reset_search();
        let check = Check {
            cid: self.cid,
            level: self.level,
            update_status: true,
        };
        self.send_to_children(&Message::Check(check));
        self.attend_pending_requests()?;
        self.reply_pending_queries()?;
        self.test()
    }

    // ---- Expand ----

    fn on_check(&mut self, event: Event) -> Result<()> {
        let Event::Receive {
            port,
            message: Message::Check(check),
        } = event
        else {
            return Err(self.mismatch(EventKind::Check));
        };

        if check.level <= self.level {
            return Err(self.invariant(format!(
                "check at level {} does not raise level {}",
                check.level, self.level
            )));
        }
        if !self.tree.contains(&port) {
            return Err(self.invariant(format!("check on non-branch port {port}")));
        }

        self.cid = check.cid;
        self.level = check.level;
        self.core = false;
        self.parent = Some(port);
        self.children = self.tree.iter().copied().filter(|&p| p != port).collect();
        self.request_port = None;
        self.links.refresh_outgoing();
        debug!(
            node = %self.uid,
            cid = %self.cid,
            level = self.level,
            update_status = check.update_status,
            "New fragment identity"
        );

        if check.update_status {
            self.reset_search();
        } else {
            self.reported = true;
            self.status = Status::Connecting;
        }
        self.send_to_children(&Message::Check(check));
        self.attend_pending_requests()?;
        self.reply_pending_queries()?;
        if check.update_status {
            self.test()?;
        }
        Ok(())
    }

    // ---- Termination ----

    fn on_termination(&mut self, event: Event) -> Result<()> {
        let Event::Receive {
            port,
            message: Message::Termination,
        } = event
        else {
            return Err(self.mismatch(EventKind::Termination));
        };
        if self.parent != Some(port) {
            return Err(self.invariant(format!("termination on port {port}, not from the parent")));
        }

        self.status = Status::Follower;
        info!(node = %self.uid, cid = %self.cid, level = self.level, "Terminated");
        self.send_to_children(&Message::Termination);
        self.start_gather()
    }

    // ---- Routing ----

    fn start_gather(&mut self) -> Result<()> {
        if !self.config.gather_routes {
            return Ok(());
        }
        let uid = self.uid;
        let own = self.links.entries().iter().filter_map(|e| {
            e.neighbor.map(|to| AdjacencyEntry {
                from: uid,
                to,
                weight: e.weight,
            })
        });
        self.gather.entries.extend(own);
        self.gather.subtree_size += 1;
        self.gather.started = true;
        self.try_finish_gather()
    }

    fn on_neighborhood(&mut self, event: Event) -> Result<()> {
        let Event::Receive {
            port,
            message: Message::Neighborhood(hood),
        } = event
        else {
            return Err(self.mismatch(EventKind::Neighborhood));
        };

        if !self.children.contains(&port) || !self.gather.reports.insert(port) {
            self.metrics.violations += 1;
            warn!(node = %self.uid, port, "Unexpected neighborhood report");
            return Ok(());
        }
        self.gather.entries.extend(hood.entries);
        self.gather.subtree_size += hood.subtree_size;
        self.try_finish_gather()
    }

    fn try_finish_gather(&mut self) -> Result<()> {
        if !self.gather.started
            || self.gather.done
            || self.gather.reports.len() < self.children.len()
        {
            return Ok(());
        }
        self.gather.done = true;
        let entries = std::mem::take(&mut self.gather.entries);

        if self.status == Status::Leader {
            info!(node = %self.uid, nodes = self.gather.subtree_size, links = entries.len(), "Adjacency gathered");
            self.install_routes(&entries);
            self.send_to_children(&Message::Graph(Graph { entries }));
            Ok(())
        } else {
            let parent = self
                .parent
                .ok_or_else(|| self.invariant("follower without a parent"))?;
            let hood = Neighborhood {
                entries,
                subtree_size: self.gather.subtree_size,
            };
            self.send(parent, Message::Neighborhood(hood));
            Ok(())
        }
    }

    fn on_graph(&mut self, event: Event) -> Result<()> {
        let Event::Receive {
            port,
            message: Message::Graph(graph),
        } = event
        else {
            return Err(self.mismatch(EventKind::Graph));
        };

        if self.parent != Some(port) {
            return Err(self.invariant(format!("graph on port {port}, not from the parent")));
        }
        if self.routing_table.is_some() {
            self.metrics.violations += 1;
            warn!(node = %self.uid, "Routes already computed");
            return Ok(());
        }
        self.install_routes(&graph.entries);
        self.send_to_children(&Message::Graph(graph));
        Ok(())
    }

    fn install_routes(&mut self, entries: &[AdjacencyEntry]) {
        let links = &self.links;
        let table = RoutingTable::compute(self.uid, entries, |n| links.port_of(n));
        debug!(node = %self.uid, destinations = table.len(), "Routing table ready");
        self.routing_table = Some(table);
    }
}
