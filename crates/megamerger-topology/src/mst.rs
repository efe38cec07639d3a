//! Centralised reference minimum spanning forest (Kruskal).

use crate::{EdgeKey, Link, NodeId, Topology};

/// A minimum spanning forest: one tree per connected component.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpanningForest {
    /// Forest links, ascending by key
    pub links: Vec<Link>,
    /// Sum of link weights
    pub total_weight: f64,
}

impl SpanningForest {
    /// True if the forest holds the link joining `a` and `b`.
    pub fn contains(&self, a: NodeId, b: NodeId) -> bool {
        self.links.iter().any(|l| l.joins(a, b))
    }

    /// Keys of the forest links, sorted.
    pub fn keys(&self) -> Vec<EdgeKey> {
        let mut keys: Vec<EdgeKey> = self.links.iter().map(Link::key).collect();
        keys.sort();
        keys
    }
}

struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
        true
    }
}

/// Compute the unique minimum spanning forest under the [`EdgeKey`] order.
pub fn reference_mst(topology: &Topology) -> SpanningForest {
    let mut candidates: Vec<Link> = topology.links().to_vec();
    candidates.sort_by_key(Link::key);

    let mut sets = DisjointSet::new(topology.node_count());
    let mut forest = SpanningForest::default();
    for link in candidates {
        if sets.union(link.a.index(), link.b.index()) {
            forest.total_weight += link.weight;
            forest.links.push(link);
        }
    }
    forest
}
