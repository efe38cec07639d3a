//! Routing Consumer - shortest-path forwarding tables over the gathered
//! adjacency.
//!
//! Once the spanning tree is final, every node's link list is convergecast
//! to the leader and the merged adjacency is multicast back down. Each node
//! then runs single-source Dijkstra from itself.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap};

use megamerger_topology::{NodeId, Port};
use serde::{Deserialize, Serialize};

/// One directed adjacency record: `from` reaches `to` over a link of `weight`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdjacencyEntry {
    pub from: NodeId,
    pub to: NodeId,
    pub weight: f64,
}

/// How to reach one destination.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Node preceding the destination on the shortest path
    pub previous: NodeId,
    /// Local port of the first hop (`None` for the node itself)
    pub port: Option<Port>,
    /// Total path weight
    pub distance: f64,
}

#[derive(Debug, Clone, Copy)]
struct Tentative {
    distance: f64,
    node: NodeId,
}

impl PartialEq for Tentative {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Tentative {}

impl PartialOrd for Tentative {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tentative {
    // Reversed so the max-heap pops the smallest distance.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .distance
            .total_cmp(&self.distance)
            .then_with(|| other.node.cmp(&self.node))
    }
}

/// Forwarding table of one node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingTable {
    source: NodeId,
    routes: BTreeMap<NodeId, Route>,
}

impl RoutingTable {
    /// Run Dijkstra from `source` over `adjacency`.
    ///
    /// `first_hop_port` maps a neighbour of `source` to the local port that
    /// leads to it. Unreachable nodes get no route.
    pub fn compute<F>(source: NodeId, adjacency: &[AdjacencyEntry], first_hop_port: F) -> Self
    where
        F: Fn(NodeId) -> Option<Port>,
    {
        let mut edges: HashMap<NodeId, Vec<(NodeId, f64)>> = HashMap::new();
        for entry in adjacency {
            edges.entry(entry.from).or_default().push((entry.to, entry.weight));
        }

        let mut distance: HashMap<NodeId, f64> = HashMap::from([(source, 0.0)]);
        let mut previous: HashMap<NodeId, NodeId> = HashMap::new();
        let mut first_hop: HashMap<NodeId, NodeId> = HashMap::new();
        let mut routes = BTreeMap::new();
        let mut heap = BinaryHeap::from([Tentative {
            distance: 0.0,
            node: source,
        }]);

        while let Some(Tentative { distance: d, node }) = heap.pop() {
            if routes.contains_key(&node) {
                continue;
            }
            let hop = first_hop.get(&node).copied();
            routes.insert(
                node,
                Route {
                    previous: previous.get(&node).copied().unwrap_or(source),
                    port: hop.and_then(&first_hop_port),
                    distance: d,
                },
            );

            for &(next, weight) in edges.get(&node).map(Vec::as_slice).unwrap_or(&[]) {
                if routes.contains_key(&next) {
                    continue;
                }
                let candidate = d + weight;
                let better = distance.get(&next).map_or(true, |&known| candidate < known);
                if better {
                    distance.insert(next, candidate);
                    previous.insert(next, node);
                    first_hop.insert(next, if node == source { next } else { hop.unwrap_or(next) });
                    heap.push(Tentative {
                        distance: candidate,
                        node: next,
                    });
                }
            }
        }

        Self { source, routes }
    }

    /// Node this table belongs to.
    #[must_use]
    pub fn source(&self) -> NodeId {
        self.source
    }

    /// Route toward `destination`.
    #[must_use]
    pub fn route(&self, destination: NodeId) -> Option<&Route> {
        self.routes.get(&destination)
    }

    /// Shortest distance to `destination`.
    #[must_use]
    pub fn distance(&self, destination: NodeId) -> Option<f64> {
        self.routes.get(&destination).map(|r| r.distance)
    }

    /// All routes, by destination.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &Route)> {
        self.routes.iter()
    }

    /// Number of reachable destinations, including the source.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// True if the table has no routes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
