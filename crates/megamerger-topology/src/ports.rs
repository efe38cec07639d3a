//! Per-node port tables.
//!
//! A node never addresses a peer directly. It only knows its ports, numbered
//! `0..degree`, and the weight of the link behind each one. The substrate
//! uses the `peer` and `peer_port` fields to route a message sent on a port
//! to the arrival port at the other end.

use crate::{EdgeKey, NodeId, Port};

/// One end of a link as seen from a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortInfo {
    /// Node at the other end
    pub peer: NodeId,
    /// Port number of this link on the peer
    pub peer_port: Port,
    /// Weight of the link
    pub weight: f64,
}

impl PortInfo {
    /// Key of the link behind this port, seen from `owner`.
    pub fn key(&self, owner: NodeId) -> EdgeKey {
        EdgeKey::new(self.weight, owner, self.peer)
    }
}

/// Extract the weights of a port list, in port order.
pub(crate) fn weights_of(ports: &[PortInfo]) -> Vec<f64> {
    ports.iter().map(|p| p.weight).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_symmetric_across_ends() {
        let a_side = PortInfo {
            peer: NodeId(4),
            peer_port: 0,
            weight: 2.5,
        };
        let b_side = PortInfo {
            peer: NodeId(1),
            peer_port: 3,
            weight: 2.5,
        };
        assert_eq!(a_side.key(NodeId(1)), b_side.key(NodeId(4)));
    }

    #[test]
    fn weights_follow_port_order() {
        let ports = [
            PortInfo { peer: NodeId(1), peer_port: 0, weight: 3.0 },
            PortInfo { peer: NodeId(2), peer_port: 0, weight: 1.0 },
        ];
        assert_eq!(weights_of(&ports), vec![3.0, 1.0]);
    }
}
