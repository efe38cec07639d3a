//! Post-run checks of the tree the nodes agreed on.

use std::collections::{BTreeSet, HashMap};

use megamerger_protocol::{EdgeKey, LinkKind, NodeId, NodeView, Status, Topology};
use megamerger_topology::{reference_mst, Link};
use thiserror::Error;

use crate::events::ProtocolEvent;

/// A property the final network state failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TreeViolation {
    #[error("expected {expected} node views, got {actual}")]
    ViewCount { expected: usize, actual: usize },

    #[error("node {node} ended in status {status}")]
    NotTerminated { node: NodeId, status: Status },

    #[error("component of node {first} has {leaders} leaders")]
    LeaderCount { first: NodeId, leaders: usize },

    #[error("link {a}-{b} is a branch at {a} but {kind} at {b}")]
    OneSidedBranch { a: NodeId, b: NodeId, kind: LinkKind },

    #[error("nodes {a} and {b} share a branch but disagree on the fragment")]
    Disagreement { a: NodeId, b: NodeId },

    #[error("branch set differs from the minimum spanning forest: {missing} missing, {extra} extra")]
    NotMinimal { missing: usize, extra: usize },

    #[error("level of node {node} dropped from {from} to {to}")]
    LevelDecreased { node: NodeId, from: u32, to: u32 },
}

/// What a verified run built.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeSummary {
    pub links: Vec<Link>,
    pub total_weight: f64,
    pub leaders: Vec<NodeId>,
}

fn link_at<'a>(topology: &'a Topology, view: &NodeView, port: usize) -> Option<&'a Link> {
    let info = topology.ports(view.uid).get(port)?;
    topology.find_link(view.uid, info.peer)
}

/// Links both endpoints classified as branch. A one-sided branch is a violation.
pub fn branch_links(topology: &Topology, views: &[NodeView]) -> Result<Vec<Link>, TreeViolation> {
    let mut links = Vec::new();
    for view in views {
        for (port, kind) in view.links.iter().enumerate() {
            if *kind != LinkKind::Branch {
                continue;
            }
            let Some((peer, peer_port)) = topology.peer(view.uid, port) else {
                continue;
            };
            let peer_kind = views
                .get(peer.index())
                .and_then(|v| v.links.get(peer_port))
                .copied()
                .unwrap_or(LinkKind::Unknown);
            if peer_kind != LinkKind::Branch {
                return Err(TreeViolation::OneSidedBranch {
                    a: view.uid,
                    b: peer,
                    kind: peer_kind,
                });
            }
            if view.uid < peer {
                if let Some(link) = link_at(topology, view, port) {
                    links.push(*link);
                }
            }
        }
    }
    links.sort_by_key(Link::key);
    Ok(links)
}

/// Every node terminated, with exactly one leader per connected component.
pub fn check_termination(topology: &Topology, views: &[NodeView]) -> Result<Vec<NodeId>, TreeViolation> {
    if views.len() != topology.node_count() {
        return Err(TreeViolation::ViewCount {
            expected: topology.node_count(),
            actual: views.len(),
        });
    }
    if let Some(view) = views.iter().find(|v| !v.status.is_terminal()) {
        return Err(TreeViolation::NotTerminated {
            node: view.uid,
            status: view.status,
        });
    }

    let mut leaders = Vec::new();
    for component in topology.components() {
        let found: Vec<NodeId> = component
            .iter()
            .copied()
            .filter(|n| views[n.index()].status == Status::Leader)
            .collect();
        if found.len() != 1 {
            return Err(TreeViolation::LeaderCount {
                first: component[0],
                leaders: found.len(),
            });
        }
        leaders.extend(found);
    }
    leaders.sort();
    Ok(leaders)
}

/// Branch endpoints carry the same fragment identity.
pub fn check_agreement(topology: &Topology, views: &[NodeView]) -> Result<(), TreeViolation> {
    for link in branch_links(topology, views)? {
        let (a, b) = (&views[link.a.index()], &views[link.b.index()]);
        if (a.cid, a.level) != (b.cid, b.level) {
            return Err(TreeViolation::Disagreement { a: a.uid, b: b.uid });
        }
    }
    Ok(())
}

/// The branch set is the unique minimum spanning forest.
pub fn check_minimal(topology: &Topology, views: &[NodeView]) -> Result<(), TreeViolation> {
    let built: BTreeSet<EdgeKey> = branch_links(topology, views)?.iter().map(Link::key).collect();
    let expected: BTreeSet<EdgeKey> = reference_mst(topology).keys().into_iter().collect();
    if built != expected {
        return Err(TreeViolation::NotMinimal {
            missing: expected.difference(&built).count(),
            extra: built.difference(&expected).count(),
        });
    }
    Ok(())
}

/// No node's level ever went down over the timeline.
pub fn check_levels(events: &[ProtocolEvent]) -> Result<(), TreeViolation> {
    let mut levels: HashMap<NodeId, u32> = HashMap::new();
    for event in events {
        if let ProtocolEvent::IdentityChanged { node, level, .. } = event {
            let from = levels.insert(*node, *level).unwrap_or(0);
            if *level < from {
                return Err(TreeViolation::LevelDecreased {
                    node: *node,
                    from,
                    to: *level,
                });
            }
        }
    }
    Ok(())
}

/// Run every check and summarise the tree.
pub fn verify_run(
    topology: &Topology,
    views: &[NodeView],
    events: &[ProtocolEvent],
) -> Result<TreeSummary, TreeViolation> {
    let leaders = check_termination(topology, views)?;
    check_agreement(topology, views)?;
    check_minimal(topology, views)?;
    check_levels(events)?;

    let links = branch_links(topology, views)?;
    let total_weight = links.iter().map(|l| l.weight).sum();
    Ok(TreeSummary {
        links,
        total_weight,
        leaders,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(uid: u64, status: Status, cid: u64, links: Vec<LinkKind>) -> NodeView {
        NodeView {
            uid: NodeId(uid),
            status,
            cid: NodeId(cid),
            level: 1,
            core: false,
            parent: None,
            links,
        }
    }

    fn chain() -> Topology {
        // 0 -1- 1 -2- 2
        Topology::chain(&[1.0, 2.0]).unwrap()
    }

    fn good_views() -> Vec<NodeView> {
        vec![
            view(0, Status::Follower, 1, vec![LinkKind::Branch]),
            view(1, Status::Leader, 1, vec![LinkKind::Branch, LinkKind::Branch]),
            view(2, Status::Follower, 1, vec![LinkKind::Branch]),
        ]
    }

    #[test]
    fn good_tree_passes() {
        let summary = verify_run(&chain(), &good_views(), &[]).unwrap();
        assert_eq!(summary.links.len(), 2);
        assert_eq!(summary.total_weight, 3.0);
        assert_eq!(summary.leaders, vec![NodeId(1)]);
    }

    #[test]
    fn one_sided_branch_is_caught() {
        let mut views = good_views();
        views[2].links[0] = LinkKind::Outgoing;
        assert_eq!(
            branch_links(&chain(), &views),
            Err(TreeViolation::OneSidedBranch {
                a: NodeId(1),
                b: NodeId(2),
                kind: LinkKind::Outgoing
            })
        );
    }

    #[test]
    fn two_leaders_are_caught() {
        let mut views = good_views();
        views[0].status = Status::Leader;
        assert!(matches!(
            check_termination(&chain(), &views),
            Err(TreeViolation::LeaderCount { leaders: 2, .. })
        ));
    }

    #[test]
    fn unfinished_node_is_caught() {
        let mut views = good_views();
        views[2].status = Status::Connecting;
        assert!(matches!(
            check_termination(&chain(), &views),
            Err(TreeViolation::NotTerminated { .. })
        ));
    }

    #[test]
    fn fragment_disagreement_is_caught() {
        let mut views = good_views();
        views[2].cid = NodeId(2);
        assert_eq!(
            check_agreement(&chain(), &views),
            Err(TreeViolation::Disagreement { a: NodeId(1), b: NodeId(2) })
        );
    }

    #[test]
    fn heavier_tree_is_not_minimal() {
        // Triangle where the 0-2 link is the heaviest.
        let topology = Topology::from_links(3, [(0, 1, 1.0), (1, 2, 2.0), (0, 2, 9.0)]).unwrap();
        let views = vec![
            view(0, Status::Follower, 1, vec![LinkKind::Branch, LinkKind::Branch]),
            view(1, Status::Leader, 1, vec![LinkKind::Branch, LinkKind::Internal]),
            view(2, Status::Follower, 1, vec![LinkKind::Internal, LinkKind::Branch]),
        ];
        assert_eq!(
            check_minimal(&topology, &views),
            Err(TreeViolation::NotMinimal { missing: 1, extra: 1 })
        );
    }

    #[test]
    fn level_drop_is_caught() {
        let bump = |level| ProtocolEvent::IdentityChanged {
            node: NodeId(3),
            cid: NodeId(3),
            level,
            core: true,
            parent: None,
            time: 0,
        };
        assert!(check_levels(&[bump(1), bump(2)]).is_ok());
        assert_eq!(
            check_levels(&[bump(2), bump(1)]),
            Err(TreeViolation::LevelDecreased { node: NodeId(3), from: 2, to: 1 })
        );
    }
}
