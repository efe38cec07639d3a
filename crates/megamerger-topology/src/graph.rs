//! The weighted network graph and its per-node port view.

use std::collections::VecDeque;

use crate::error::{Result, TopologyError};
use crate::ports::{weights_of, PortInfo};
use crate::{EdgeKey, NodeId, Port};

/// An undirected weighted link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Link {
    /// First endpoint (as inserted)
    pub a: NodeId,
    /// Second endpoint (as inserted)
    pub b: NodeId,
    /// Positive link weight
    pub weight: f64,
}

impl Link {
    /// Rank of this link in the candidate edge order.
    pub fn key(&self) -> EdgeKey {
        EdgeKey::new(self.weight, self.a, self.b)
    }

    /// True if the link joins `x` and `y`, in either direction.
    pub fn joins(&self, x: NodeId, y: NodeId) -> bool {
        (self.a == x && self.b == y) || (self.a == y && self.b == x)
    }
}

/// Immutable-after-construction network description.
///
/// Node ids are `0..node_count`. Ports of a node are numbered in the order
/// its links were added.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Topology {
    links: Vec<Link>,
    ports: Vec<Vec<PortInfo>>,
}

impl Topology {
    /// A topology of `node_count` isolated nodes.
    pub fn new(node_count: usize) -> Self {
        Self {
            links: Vec::new(),
            ports: vec![Vec::new(); node_count],
        }
    }

    /// Build from `(a, b, weight)` triples, validating each link.
    pub fn from_links<I>(node_count: usize, links: I) -> Result<Self>
    where
        I: IntoIterator<Item = (u64, u64, f64)>,
    {
        let mut topology = Self::new(node_count);
        for (a, b, weight) in links {
            topology.add_link(NodeId(a), NodeId(b), weight)?;
        }
        Ok(topology)
    }

    /// Add a link and return the port it occupies on `a` and on `b`.
    pub fn add_link(&mut self, a: NodeId, b: NodeId, weight: f64) -> Result<(Port, Port)> {
        let node_count = self.node_count();
        for node in [a, b] {
            if node.index() >= node_count {
                return Err(TopologyError::UnknownNode { node, node_count });
            }
        }
        if a == b {
            return Err(TopologyError::SelfLoop(a));
        }
        if !(weight.is_finite() && weight > 0.0) {
            return Err(TopologyError::InvalidWeight { a, b, weight });
        }
        if self.ports[a.index()].iter().any(|p| p.peer == b) {
            return Err(TopologyError::ParallelLink { a, b });
        }

        let port_a = self.ports[a.index()].len();
        let port_b = self.ports[b.index()].len();
        self.ports[a.index()].push(PortInfo {
            peer: b,
            peer_port: port_b,
            weight,
        });
        self.ports[b.index()].push(PortInfo {
            peer: a,
            peer_port: port_a,
            weight,
        });
        self.links.push(Link { a, b, weight });
        Ok((port_a, port_b))
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.ports.len()
    }

    /// Number of links.
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// All links in insertion order.
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// All node ids.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.node_count()).map(NodeId::from)
    }

    /// Ports of a node (empty for unknown nodes).
    pub fn ports(&self, node: NodeId) -> &[PortInfo] {
        self.ports.get(node.index()).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Port weights of a node, in port order.
    pub fn port_weights(&self, node: NodeId) -> Vec<f64> {
        weights_of(self.ports(node))
    }

    /// Number of ports on a node.
    pub fn degree(&self, node: NodeId) -> usize {
        self.ports(node).len()
    }

    /// Where a message sent by `node` on `port` arrives.
    pub fn peer(&self, node: NodeId, port: Port) -> Option<(NodeId, Port)> {
        self.ports(node).get(port).map(|p| (p.peer, p.peer_port))
    }

    /// The link joining `x` and `y`, if any.
    pub fn find_link(&self, x: NodeId, y: NodeId) -> Option<&Link> {
        self.links.iter().find(|l| l.joins(x, y))
    }

    /// Connected components, each sorted, ordered by smallest member.
    pub fn components(&self) -> Vec<Vec<NodeId>> {
        let mut seen = vec![false; self.node_count()];
        let mut components = Vec::new();

        for start in 0..self.node_count() {
            if seen[start] {
                continue;
            }
            seen[start] = true;
            let mut component = vec![NodeId::from(start)];
            let mut queue = VecDeque::from([start]);
            while let Some(current) = queue.pop_front() {
                for port in &self.ports[current] {
                    let next = port.peer.index();
                    if !seen[next] {
                        seen[next] = true;
                        component.push(port.peer);
                        queue.push_back(next);
                    }
                }
            }
            component.sort();
            components.push(component);
        }
        components
    }

    /// True if every node can reach every other node.
    pub fn is_connected(&self) -> bool {
        self.components().len() <= 1
    }

    /// A path `0 - 1 - ... - n`, where link `i` joins `i` and `i + 1`.
    pub fn chain(weights: &[f64]) -> Result<Self> {
        let mut topology = Self::new(weights.len() + 1);
        for (i, &w) in weights.iter().enumerate() {
            topology.add_link(NodeId::from(i), NodeId::from(i + 1), w)?;
        }
        Ok(topology)
    }

    /// A cycle over `weights.len()` nodes; link `i` joins `i` and `i + 1 mod n`.
    pub fn ring(weights: &[f64]) -> Result<Self> {
        let n = weights.len();
        if n < 3 {
            return Err(TopologyError::InvalidShape(format!(
                "a ring needs at least 3 links, got {n}"
            )));
        }
        let mut topology = Self::new(n);
        for (i, &w) in weights.iter().enumerate() {
            topology.add_link(NodeId::from(i), NodeId::from((i + 1) % n), w)?;
        }
        Ok(topology)
    }

    /// A star with centre `0`; leaf `i + 1` hangs off the centre with `weights[i]`.
    pub fn star(weights: &[f64]) -> Result<Self> {
        let mut topology = Self::new(weights.len() + 1);
        for (i, &w) in weights.iter().enumerate() {
            topology.add_link(NodeId(0), NodeId::from(i + 1), w)?;
        }
        Ok(topology)
    }

    /// A complete graph on `n` nodes with weights chosen by `weight(a, b)`.
    pub fn complete<F>(n: usize, mut weight: F) -> Result<Self>
    where
        F: FnMut(NodeId, NodeId) -> f64,
    {
        let mut topology = Self::new(n);
        for a in 0..n {
            for b in (a + 1)..n {
                let (a, b) = (NodeId::from(a), NodeId::from(b));
                topology.add_link(a, b, weight(a, b))?;
            }
        }
        Ok(topology)
    }

    /// A `width` x `height` grid; node `y * width + x` links right and down.
    pub fn grid<F>(width: usize, height: usize, mut weight: F) -> Result<Self>
    where
        F: FnMut(NodeId, NodeId) -> f64,
    {
        if width == 0 || height == 0 {
            return Err(TopologyError::InvalidShape(format!(
                "grid dimensions must be non-zero, got {width}x{height}"
            )));
        }
        let mut topology = Self::new(width * height);
        for y in 0..height {
            for x in 0..width {
                let here = NodeId::from(y * width + x);
                if x + 1 < width {
                    let right = NodeId::from(y * width + x + 1);
                    topology.add_link(here, right, weight(here, right))?;
                }
                if y + 1 < height {
                    let down = NodeId::from((y + 1) * width + x);
                    topology.add_link(here, down, weight(here, down))?;
                }
            }
        }
        Ok(topology)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ports_are_numbered_in_insertion_order() {
        let mut t = Topology::new(3);
        assert_eq!(t.add_link(NodeId(0), NodeId(1), 1.0), Ok((0, 0)));
        assert_eq!(t.add_link(NodeId(0), NodeId(2), 2.0), Ok((1, 0)));
        assert_eq!(t.add_link(NodeId(1), NodeId(2), 3.0), Ok((1, 1)));

        assert_eq!(t.peer(NodeId(0), 1), Some((NodeId(2), 0)));
        assert_eq!(t.peer(NodeId(2), 1), Some((NodeId(1), 1)));
        assert_eq!(t.port_weights(NodeId(2)), vec![2.0, 3.0]);
        assert_eq!(t.degree(NodeId(1)), 2);
    }

    #[test]
    fn peer_of_peer_is_self() {
        let t = Topology::complete(5, |a, b| (a.value() * 5 + b.value()) as f64 + 1.0).unwrap();
        for node in t.node_ids() {
            for port in 0..t.degree(node) {
                let (peer, peer_port) = t.peer(node, port).unwrap();
                assert_eq!(t.peer(peer, peer_port), Some((node, port)));
            }
        }
    }

    #[test]
    fn rejects_malformed_links() {
        let mut t = Topology::new(2);
        assert!(matches!(
            t.add_link(NodeId(0), NodeId(5), 1.0),
            Err(TopologyError::UnknownNode { .. })
        ));
        assert_eq!(t.add_link(NodeId(1), NodeId(1), 1.0), Err(TopologyError::SelfLoop(NodeId(1))));
        for weight in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                t.add_link(NodeId(0), NodeId(1), weight),
                Err(TopologyError::InvalidWeight { .. })
            ));
        }
        t.add_link(NodeId(0), NodeId(1), 1.0).unwrap();
        assert!(matches!(
            t.add_link(NodeId(1), NodeId(0), 2.0),
            Err(TopologyError::ParallelLink { .. })
        ));
        assert_eq!(t.link_count(), 1);
    }

    #[test]
    fn components_of_disconnected_graph() {
        let t = Topology::from_links(5, [(0, 1, 1.0), (3, 4, 1.0)]).unwrap();
        assert!(!t.is_connected());
        assert_eq!(
            t.components(),
            vec![
                vec![NodeId(0), NodeId(1)],
                vec![NodeId(2)],
                vec![NodeId(3), NodeId(4)],
            ]
        );
    }

    #[test]
    fn generators_have_expected_shapes() {
        let chain = Topology::chain(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!((chain.node_count(), chain.link_count()), (4, 3));
        assert!(chain.is_connected());

        let ring = Topology::ring(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!((ring.node_count(), ring.link_count()), (4, 4));
        assert!(ring.find_link(NodeId(3), NodeId(0)).is_some());
        assert!(Topology::ring(&[1.0, 2.0]).is_err());

        let star = Topology::star(&[5.0, 3.0, 3.0]).unwrap();
        assert_eq!(star.degree(NodeId(0)), 3);
        assert_eq!(star.port_weights(NodeId(0)), vec![5.0, 3.0, 3.0]);

        let grid = Topology::grid(3, 2, |_, _| 1.0).unwrap();
        assert_eq!((grid.node_count(), grid.link_count()), (6, 7));
        assert!(Topology::grid(0, 2, |_, _| 1.0).is_err());

        let complete = Topology::complete(4, |_, _| 1.0).unwrap();
        assert_eq!(complete.link_count(), 6);
    }

    #[test]
    fn link_key_matches_port_key() {
        let t = Topology::from_links(3, [(2, 0, 4.0)]).unwrap();
        let link = t.links()[0];
        assert!(link.joins(NodeId(0), NodeId(2)));
        assert_eq!(link.key(), t.ports(NodeId(0))[0].key(NodeId(0)));
    }
}
