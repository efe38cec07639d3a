//! Protocol messages, events and the outgoing message queue.

use megamerger_topology::{EdgeKey, NodeId, Port};
use serde::{Deserialize, Serialize};

use crate::routing::AdjacencyEntry;

/// Discovery announcement sent once on every port at wake-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    pub sender_id: NodeId,
}

/// Probe of a neighbour's fragment identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub cid: NodeId,
    pub level: u32,
    pub contact_point: NodeId,
}

/// Merge request, either crossing an outgoing edge or relayed inside a
/// fragment toward its contact point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub cid: NodeId,
    pub level: u32,
    pub contact_point: NodeId,
    pub forwarded: bool,
}

/// New fragment identity, broadcast down the tree after a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Check {
    pub cid: NodeId,
    pub level: u32,
    /// Receivers join the running minimum-edge search
    pub update_status: bool,
}

/// Convergecast report of the best outgoing edge in a subtree.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Min {
    pub weight: f64,
    pub min_uid: NodeId,
    pub max_uid: NodeId,
    /// Node owning the reported edge
    pub sender_id: NodeId,
}

impl Min {
    /// Build a report for `key` owned by `sender_id`.
    pub fn new(key: EdgeKey, sender_id: NodeId) -> Self {
        Self {
            weight: key.weight,
            min_uid: key.min_uid,
            max_uid: key.max_uid,
            sender_id,
        }
    }

    /// The reported key.
    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            weight: self.weight,
            min_uid: self.min_uid,
            max_uid: self.max_uid,
        }
    }
}

/// Adjacency gathered from a subtree after termination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighborhood {
    pub entries: Vec<AdjacencyEntry>,
    pub subtree_size: usize,
}

/// Full adjacency, multicast from the leader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub entries: Vec<AdjacencyEntry>,
}

/// A message carried on a link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    Hello(Hello),
    Query(Query),
    Request(Request),
    Check(Check),
    Min(Min),
    Yes,
    No,
    Termination,
    Neighborhood(Neighborhood),
    Graph(Graph),
}

impl Message {
    /// Dispatch kind of this message.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Hello(_) => EventKind::Hello,
            Self::Query(_) => EventKind::Query,
            Self::Request(r) if r.forwarded => EventKind::Forward,
            Self::Request(_) => EventKind::Request,
            Self::Check(_) => EventKind::Check,
            Self::Min(_) => EventKind::Min,
            Self::Yes => EventKind::Yes,
            Self::No => EventKind::No,
            Self::Termination => EventKind::Termination,
            Self::Neighborhood(_) => EventKind::Neighborhood,
            Self::Graph(_) => EventKind::Graph,
        }
    }
}

/// Dispatch key of an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Impulse,
    Timeout,
    Hello,
    Query,
    Request,
    Forward,
    Check,
    Min,
    Yes,
    No,
    Termination,
    Neighborhood,
    Graph,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Something delivered to a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Spontaneous wake-up
    Impulse,
    /// Timer expiry (no protocol rule uses it)
    Timeout,
    /// A message arriving on `port`
    Receive { port: Port, message: Message },
}

impl Event {
    /// Shorthand for [`Event::Receive`].
    pub fn receive(port: Port, message: Message) -> Self {
        Self::Receive { port, message }
    }

    /// Dispatch kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Impulse => EventKind::Impulse,
            Self::Timeout => EventKind::Timeout,
            Self::Receive { message, .. } => message.kind(),
        }
    }

    /// Arrival port, for received messages.
    pub fn port(&self) -> Option<Port> {
        match self {
            Self::Receive { port, .. } => Some(*port),
            _ => None,
        }
    }
}

/// An outgoing message addressed by local port.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub port: Port,
    pub message: Message,
}

/// Queue of outgoing messages with the delivery patterns a node needs.
///
/// Messages leave in the order they were queued, which the substrates keep
/// per link.
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    degree: usize,
    queue: Vec<Envelope>,
}

impl Outbox {
    /// Outbox for a node with `degree` ports.
    pub fn new(degree: usize) -> Self {
        Self {
            degree,
            queue: Vec::new(),
        }
    }

    /// Unicast on one port.
    pub fn send(&mut self, port: Port, message: Message) {
        self.queue.push(Envelope { port, message });
    }

    /// Same message on every port.
    pub fn broadcast(&mut self, message: &Message) {
        for port in 0..self.degree {
            self.send(port, message.clone());
        }
    }

    /// Same message on every port except `except`.
    pub fn flood(&mut self, except: Port, message: &Message) {
        for port in (0..self.degree).filter(|&p| p != except) {
            self.send(port, message.clone());
        }
    }

    /// Same message on an explicit set of ports.
    pub fn multicast<I>(&mut self, ports: I, message: &Message)
    where
        I: IntoIterator<Item = Port>,
    {
        for port in ports {
            self.send(port, message.clone());
        }
    }

    /// Take everything queued so far.
    pub fn drain(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.queue)
    }

    /// Messages waiting to leave.
    pub fn pending(&self) -> &[Envelope] {
        &self.queue
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
