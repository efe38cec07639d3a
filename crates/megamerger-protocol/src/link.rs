//! Link Registry - per-port neighbour records owned by one node.
//!
//! Each port carries the physical weight of its link, the neighbour learned
//! from its hello, the cluster id the neighbour reported, and a [`LinkKind`].
//!
//! # Classification
//!
//! Kinds only tighten:
//!
//! ```text
//! Unknown ──► Internal | Branch | Outgoing
//! Outgoing ──► Internal | Branch
//! Outgoing ──► Unknown          (refresh after a fragment identity change)
//! Branch, Internal              (final)
//! ```

use megamerger_topology::{EdgeKey, NodeId, Port};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Classification of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkKind {
    /// Not yet classified
    Unknown,
    /// Same fragment, not a tree edge
    Internal,
    /// Spanning tree edge
    Branch,
    /// Candidate edge to another fragment
    Outgoing,
}

impl std::fmt::Display for LinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "Unknown"),
            Self::Internal => write!(f, "Internal"),
            Self::Branch => write!(f, "Branch"),
            Self::Outgoing => write!(f, "Outgoing"),
        }
    }
}

impl LinkKind {
    fn can_become(self, next: Self) -> bool {
        match (self, next) {
            (a, b) if a == b => true,
            (Self::Unknown, _) => true,
            (Self::Outgoing, Self::Internal | Self::Branch) => true,
            _ => false,
        }
    }
}

/// Registry record for one port.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkEntry {
    /// Physical weight, fixed at construction
    pub weight: f64,
    /// `(weight, min_uid, max_uid)` once the neighbour is known
    pub key: EdgeKey,
    /// Neighbour id from its hello
    pub neighbor: Option<NodeId>,
    /// Cluster id the neighbour reported in its hello
    pub neighbor_cid: Option<NodeId>,
    /// Current classification
    pub kind: LinkKind,
}

/// Port table of one node.
#[derive(Debug, Clone)]
pub struct LinkRegistry {
    owner: NodeId,
    entries: Vec<LinkEntry>,
}

impl LinkRegistry {
    /// Create a registry with one `Unknown` entry per weight, in port order.
    pub fn new(owner: NodeId, weights: &[f64]) -> Self {
        let entries = weights
            .iter()
            .map(|&weight| LinkEntry {
                weight,
                key: EdgeKey::new(weight, owner, NodeId::MAX),
                neighbor: None,
                neighbor_cid: None,
                kind: LinkKind::Unknown,
            })
            .collect();
        Self { owner, entries }
    }

    /// Number of ports.
    #[must_use]
    pub fn degree(&self) -> usize {
        self.entries.len()
    }

    /// The record for `port`.
    pub fn entry(&self, port: Port) -> Result<&LinkEntry> {
        self.entries.get(port).ok_or(Error::UnknownPort {
            node: self.owner,
            port,
            degree: self.entries.len(),
        })
    }

    fn entry_mut(&mut self, port: Port) -> Result<&mut LinkEntry> {
        let (node, degree) = (self.owner, self.entries.len());
        self.entries
            .get_mut(port)
            .ok_or(Error::UnknownPort { node, port, degree })
    }

    /// Physical weight of the link behind `port`.
    pub fn weight(&self, port: Port) -> Result<f64> {
        Ok(self.entry(port)?.weight)
    }

    /// Candidate key of the link behind `port`.
    pub fn key(&self, port: Port) -> Result<EdgeKey> {
        Ok(self.entry(port)?.key)
    }

    /// Current kind of `port`.
    pub fn kind(&self, port: Port) -> Result<LinkKind> {
        Ok(self.entry(port)?.kind)
    }

    /// Neighbour behind `port`, if its hello has arrived.
    pub fn neighbor(&self, port: Port) -> Option<NodeId> {
        self.entries.get(port).and_then(|e| e.neighbor)
    }

    /// Port leading to `neighbor`, if known.
    pub fn port_of(&self, neighbor: NodeId) -> Option<Port> {
        self.entries
            .iter()
            .position(|e| e.neighbor == Some(neighbor))
    }

    /// Fill a record from a neighbour's hello.
    ///
    /// Hellos are only sent by level-0 singletons, so the neighbour's cluster
    /// id is its own id. Returns `false` for a repeated hello.
    pub fn record_hello(&mut self, port: Port, neighbor: NodeId) -> Result<bool> {
        let owner = self.owner;
        let entry = self.entry_mut(port)?;
        if entry.neighbor.is_some() {
            return Ok(false);
        }
        entry.neighbor = Some(neighbor);
        entry.neighbor_cid = Some(neighbor);
        entry.key = EdgeKey::new(entry.weight, owner, neighbor);
        Ok(true)
    }

    /// True once every port has delivered its hello.
    #[must_use]
    pub fn all_heard(&self) -> bool {
        self.entries.iter().all(|e| e.neighbor.is_some())
    }

    /// Number of ports still waiting for a hello.
    #[must_use]
    pub fn unheard_count(&self) -> usize {
        self.entries.iter().filter(|e| e.neighbor.is_none()).count()
    }

    /// Number of ports not yet classified.
    #[must_use]
    pub fn unknown_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.kind == LinkKind::Unknown)
            .count()
    }

    /// Reclassify `port`. Returns whether the kind changed.
    pub fn classify(&mut self, port: Port, kind: LinkKind) -> Result<bool> {
        let owner = self.owner;
        let entry = self.entry_mut(port)?;
        if !entry.kind.can_become(kind) {
            return Err(Error::LinkRegression {
                node: owner,
                port,
                from: entry.kind,
                to: kind,
            });
        }
        let changed = entry.kind != kind;
        entry.kind = kind;
        Ok(changed)
    }

    /// Return every `Outgoing` port to `Unknown`. Returns how many moved.
    pub fn refresh_outgoing(&mut self) -> usize {
        let mut moved = 0;
        for entry in &mut self.entries {
            if entry.kind == LinkKind::Outgoing {
                entry.kind = LinkKind::Unknown;
                moved += 1;
            }
        }
        moved
    }

    /// Note the cluster id a neighbour reported in a query.
    pub fn note_cluster(&mut self, port: Port, cid: NodeId) -> Result<()> {
        self.entry_mut(port)?.neighbor_cid = Some(cid);
        Ok(())
    }

    /// The minimal-key port among ports of the given kinds.
    ///
    /// Returns `(None, EdgeKey::INFINITE)` when no port qualifies.
    pub fn select_minimum(&self, kinds: &[LinkKind]) -> (Option<Port>, EdgeKey) {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| kinds.contains(&e.kind))
            .min_by_key(|(_, e)| e.key)
            .map_or((None, EdgeKey::INFINITE), |(port, e)| (Some(port), e.key))
    }

    /// Ports currently of `kind`, ascending.
    pub fn ports_of(&self, kind: LinkKind) -> impl Iterator<Item = Port> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(move |(_, e)| e.kind == kind)
            .map(|(port, _)| port)
    }

    /// Kind of every port, in port order.
    #[must_use]
    pub fn kinds(&self) -> Vec<LinkKind> {
        self.entries.iter().map(|e| e.kind).collect()
    }

    /// All records, in port order.
    pub fn entries(&self) -> &[LinkEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heard(weights: &[f64], neighbors: &[u64]) -> LinkRegistry {
        let mut links = LinkRegistry::new(NodeId(0), weights);
        for (port, &n) in neighbors.iter().enumerate() {
            assert!(links.record_hello(port, NodeId(n)).unwrap());
        }
        links
    }

    #[test]
    fn hello_fills_entry() {
        let mut links = LinkRegistry::new(NodeId(3), &[2.0, 1.0]);
        assert!(!links.all_heard());
        assert_eq!(links.unheard_count(), 2);

        assert!(links.record_hello(1, NodeId(1)).unwrap());
        let entry = links.entry(1).unwrap();
        assert_eq!(entry.neighbor, Some(NodeId(1)));
        assert_eq!(entry.neighbor_cid, Some(NodeId(1)));
        assert_eq!(entry.key, EdgeKey::new(1.0, NodeId(1), NodeId(3)));

        assert!(!links.record_hello(1, NodeId(1)).unwrap());
        assert!(links.record_hello(0, NodeId(7)).unwrap());
        assert!(links.all_heard());
        assert_eq!(links.port_of(NodeId(7)), Some(0));
    }

    #[test]
    fn classification_only_tightens() {
        let mut links = heard(&[1.0, 2.0, 3.0], &[1, 2, 3]);

        assert!(links.classify(0, LinkKind::Outgoing).unwrap());
        assert!(links.classify(0, LinkKind::Branch).unwrap());
        assert!(!links.classify(0, LinkKind::Branch).unwrap());
        assert!(matches!(
            links.classify(0, LinkKind::Unknown),
            Err(Error::LinkRegression { from: LinkKind::Branch, .. })
        ));
        assert!(links.classify(0, LinkKind::Internal).is_err());

        links.classify(1, LinkKind::Internal).unwrap();
        assert!(links.classify(1, LinkKind::Branch).is_err());
        assert_eq!(links.unknown_count(), 1);
    }

    #[test]
    fn refresh_returns_outgoing_to_unknown() {
        let mut links = heard(&[1.0, 2.0], &[1, 2]);
        links.classify(0, LinkKind::Outgoing).unwrap();
        links.classify(1, LinkKind::Branch).unwrap();
        assert_eq!(links.refresh_outgoing(), 1);
        assert_eq!(links.kinds(), vec![LinkKind::Unknown, LinkKind::Branch]);
    }

    #[test]
    fn select_minimum_breaks_ties_on_ids() {
        // Node 0 with leaves 1, 2, 3 at weights 5, 3, 3.
        let links = heard(&[5.0, 3.0, 3.0], &[1, 2, 3]);
        let (port, key) = links.select_minimum(&[LinkKind::Unknown]);
        assert_eq!(port, Some(1));
        assert_eq!(key, EdgeKey::new(3.0, NodeId(0), NodeId(2)));

        // Same ports registered in a different order.
        let links = heard(&[3.0, 3.0, 5.0], &[3, 2, 1]);
        assert_eq!(links.select_minimum(&[LinkKind::Unknown]).0, Some(1));
    }

    #[test]
    fn select_minimum_without_candidates_is_infinite() {
        let mut links = heard(&[1.0], &[1]);
        links.classify(0, LinkKind::Internal).unwrap();
        let (port, key) = links.select_minimum(&[LinkKind::Unknown, LinkKind::Outgoing]);
        assert_eq!(port, None);
        assert!(key.is_infinite());
    }

    #[test]
    fn out_of_range_port_is_an_error() {
        let links = LinkRegistry::new(NodeId(0), &[1.0]);
        assert_eq!(
            links.weight(4),
            Err(Error::UnknownPort {
                node: NodeId(0),
                port: 4,
                degree: 1
            })
        );
    }
}
