//! Candidate edge keys and their total order.
//!
//! A key is the triple `(weight, min_uid, max_uid)`, compared
//! lexicographically ascending. Among equal weights the smaller minimum
//! endpoint wins, and among those the smaller maximum endpoint wins. Weights
//! are compared with [`f64::total_cmp`] so the order is total.

use std::cmp::Ordering;

use crate::NodeId;

/// Rank of a (candidate) edge.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EdgeKey {
    /// Physical weight of the link
    pub weight: f64,
    /// Smaller endpoint id
    pub min_uid: NodeId,
    /// Larger endpoint id
    pub max_uid: NodeId,
}

impl EdgeKey {
    /// The "no outgoing edge" key. Greater than every real key.
    pub const INFINITE: Self = Self {
        weight: f64::INFINITY,
        min_uid: NodeId::MAX,
        max_uid: NodeId::MAX,
    };

    /// Key of the link joining `a` and `b`; endpoint order does not matter.
    pub fn new(weight: f64, a: NodeId, b: NodeId) -> Self {
        Self {
            weight,
            min_uid: a.min(b),
            max_uid: a.max(b),
        }
    }

    /// True for the sentinel returned when no candidate exists.
    pub fn is_infinite(&self) -> bool {
        self.weight == f64::INFINITY
    }

    /// Compare two keys (same as `Ord::cmp`).
    pub fn compare(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }
}

impl Default for EdgeKey {
    fn default() -> Self {
        Self::INFINITE
    }
}

impl PartialEq for EdgeKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for EdgeKey {}

impl PartialOrd for EdgeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EdgeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.weight
            .total_cmp(&other.weight)
            .then(self.min_uid.cmp(&other.min_uid))
            .then(self.max_uid.cmp(&other.max_uid))
    }
}

impl std::fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_infinite() {
            write!(f, "(inf)")
        } else {
            write!(f, "({}, {}, {})", self.weight, self.min_uid, self.max_uid)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(w: f64, a: u64, b: u64) -> EdgeKey {
        EdgeKey::new(w, NodeId(a), NodeId(b))
    }

    #[test]
    fn endpoints_are_normalised() {
        assert_eq!(key(2.0, 5, 1), key(2.0, 1, 5));
        let k = key(2.0, 5, 1);
        assert_eq!(k.min_uid, NodeId(1));
        assert_eq!(k.max_uid, NodeId(5));
    }

    #[test]
    fn weight_dominates() {
        assert!(key(1.0, 8, 9) < key(2.0, 0, 1));
    }

    #[test]
    fn equal_weights_break_on_min_then_max() {
        assert!(key(3.0, 0, 2) < key(3.0, 0, 3));
        assert!(key(3.0, 0, 9) < key(3.0, 1, 2));
    }

    #[test]
    fn infinite_is_greatest() {
        assert!(key(f64::MAX, 0, 1) < EdgeKey::INFINITE);
        assert!(EdgeKey::INFINITE.is_infinite());
        assert!(!key(1.0, 0, 1).is_infinite());
        assert_eq!(EdgeKey::default(), EdgeKey::INFINITE);
    }

    #[test]
    fn min_selection_is_order_independent() {
        let mut keys = vec![key(5.0, 0, 1), key(3.0, 0, 3), key(3.0, 0, 2)];
        let forward = keys.iter().copied().min();
        keys.reverse();
        let backward = keys.iter().copied().min();
        assert_eq!(forward, Some(key(3.0, 0, 2)));
        assert_eq!(forward, backward);
    }
}
