//! Protocol timeline events and network snapshots.

use std::collections::{BTreeMap, HashMap};

use megamerger_protocol::{EventKind, LinkKind, NodeId, NodeView, Port, Status};
use serde::{Deserialize, Serialize};

/// Things that happen during a run, in the order they happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProtocolEvent {
    /// A node exists with `degree` ports (recorded before time 0 work)
    NodeCreated {
        node: NodeId,
        degree: usize,
        time: u64,
    },

    /// A message left `from` and will reach `to` at `deliver_at`
    MessageSent {
        from: NodeId,
        to: NodeId,
        kind: EventKind,
        time: u64,
        deliver_at: u64,
    },

    /// A node moved to a new status
    StatusChanged {
        node: NodeId,
        from: Status,
        to: Status,
        time: u64,
    },

    /// A node adopted a new fragment identity or tree position
    IdentityChanged {
        node: NodeId,
        cid: NodeId,
        level: u32,
        core: bool,
        parent: Option<Port>,
        time: u64,
    },

    /// A port was reclassified
    LinkClassified {
        node: NodeId,
        port: Port,
        kind: LinkKind,
        time: u64,
    },

    /// An event had no rule and was dropped
    EventDiscarded {
        node: NodeId,
        status: Status,
        event: EventKind,
        time: u64,
    },
}

impl ProtocolEvent {
    /// Simulated time of this event.
    pub fn time(&self) -> u64 {
        match self {
            ProtocolEvent::NodeCreated { time, .. } => *time,
            ProtocolEvent::MessageSent { time, .. } => *time,
            ProtocolEvent::StatusChanged { time, .. } => *time,
            ProtocolEvent::IdentityChanged { time, .. } => *time,
            ProtocolEvent::LinkClassified { time, .. } => *time,
            ProtocolEvent::EventDiscarded { time, .. } => *time,
        }
    }

    /// Events describing how `before` became `after`.
    pub fn diff(before: &NodeView, after: &NodeView, time: u64) -> Vec<Self> {
        let node = after.uid;
        let mut out = Vec::new();
        if before.status != after.status {
            out.push(ProtocolEvent::StatusChanged {
                node,
                from: before.status,
                to: after.status,
                time,
            });
        }
        if (before.cid, before.level, before.core, before.parent)
            != (after.cid, after.level, after.core, after.parent)
        {
            out.push(ProtocolEvent::IdentityChanged {
                node,
                cid: after.cid,
                level: after.level,
                core: after.core,
                parent: after.parent,
                time,
            });
        }
        for (port, (old, new)) in before.links.iter().zip(&after.links).enumerate() {
            if old != new {
                out.push(ProtocolEvent::LinkClassified {
                    node,
                    port,
                    kind: *new,
                    time,
                });
            }
        }
        out
    }
}

/// State of every node at one point of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub time: u64,
    pub nodes: Vec<NodeView>,
    pub messages: usize,
    pub leaders: usize,
    pub max_level: u32,
}

impl NetworkSnapshot {
    /// Build from current node views.
    pub fn from_views(time: u64, nodes: Vec<NodeView>, messages: usize) -> Self {
        let leaders = nodes.iter().filter(|n| n.status == Status::Leader).count();
        let max_level = nodes.iter().map(|n| n.level).max().unwrap_or(0);
        Self {
            time,
            nodes,
            messages,
            leaders,
            max_level,
        }
    }

    /// Rebuild network state from events up to (but not including) the given event index.
    pub fn from_events(events: &[ProtocolEvent], up_to_event: usize) -> Self {
        let mut nodes: HashMap<NodeId, NodeView> = HashMap::new();
        let mut messages = 0;
        let mut time = 0u64;

        for event in events.iter().take(up_to_event) {
            time = time.max(event.time());
            match event {
                ProtocolEvent::NodeCreated { node, degree, .. } => {
                    nodes.insert(
                        *node,
                        NodeView {
                            uid: *node,
                            status: Status::Idle,
                            cid: *node,
                            level: 0,
                            core: true,
                            parent: None,
                            links: vec![LinkKind::Unknown; *degree],
                        },
                    );
                }
                ProtocolEvent::MessageSent { .. } => messages += 1,
                ProtocolEvent::StatusChanged { node, to, .. } => {
                    if let Some(view) = nodes.get_mut(node) {
                        view.status = *to;
                    }
                }
                ProtocolEvent::IdentityChanged {
                    node,
                    cid,
                    level,
                    core,
                    parent,
                    ..
                } => {
                    if let Some(view) = nodes.get_mut(node) {
                        view.cid = *cid;
                        view.level = *level;
                        view.core = *core;
                        view.parent = *parent;
                    }
                }
                ProtocolEvent::LinkClassified {
                    node, port, kind, ..
                } => {
                    if let Some(slot) = nodes.get_mut(node).and_then(|v| v.links.get_mut(*port)) {
                        *slot = *kind;
                    }
                }
                ProtocolEvent::EventDiscarded { .. } => {
                    // Informational only
                }
            }
        }

        let mut views: Vec<NodeView> = nodes.into_values().collect();
        views.sort_by_key(|v| v.uid);
        Self::from_views(time, views, messages)
    }

    /// Number of nodes per fragment id.
    pub fn fragments(&self) -> BTreeMap<NodeId, usize> {
        let mut sizes = BTreeMap::new();
        for node in &self.nodes {
            *sizes.entry(node.cid).or_insert(0) += 1;
        }
        sizes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(uid: u64, status: Status, level: u32, links: Vec<LinkKind>) -> NodeView {
        NodeView {
            uid: NodeId(uid),
            status,
            cid: NodeId(uid),
            level,
            core: true,
            parent: None,
            links,
        }
    }

    #[test]
    fn event_serialization() {
        let event = ProtocolEvent::LinkClassified {
            node: NodeId(4),
            port: 2,
            kind: LinkKind::Branch,
            time: 17,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("LinkClassified"));
        assert!(json.contains("Branch"));

        let parsed: ProtocolEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.time(), 17);
    }

    #[test]
    fn diff_reports_each_change() {
        let before = view(1, Status::Connecting, 0, vec![LinkKind::Outgoing, LinkKind::Unknown]);
        let mut after = view(1, Status::Updating, 1, vec![LinkKind::Branch, LinkKind::Unknown]);
        after.cid = NodeId(3);

        let events = ProtocolEvent::diff(&before, &after, 5);
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], ProtocolEvent::StatusChanged { to: Status::Updating, .. }));
        assert!(matches!(events[1], ProtocolEvent::IdentityChanged { level: 1, .. }));
        assert!(matches!(events[2], ProtocolEvent::LinkClassified { port: 0, .. }));
        assert!(ProtocolEvent::diff(&after, &after, 6).is_empty());
    }

    #[test]
    fn snapshot_replays_timeline() {
        let events = vec![
            ProtocolEvent::NodeCreated { node: NodeId(0), degree: 1, time: 0 },
            ProtocolEvent::NodeCreated { node: NodeId(1), degree: 1, time: 0 },
            ProtocolEvent::StatusChanged {
                node: NodeId(1),
                from: Status::Idle,
                to: Status::Leader,
                time: 9,
            },
            ProtocolEvent::IdentityChanged {
                node: NodeId(0),
                cid: NodeId(1),
                level: 1,
                core: false,
                parent: Some(0),
                time: 9,
            },
            ProtocolEvent::LinkClassified {
                node: NodeId(0),
                port: 0,
                kind: LinkKind::Branch,
                time: 10,
            },
        ];

        let early = NetworkSnapshot::from_events(&events, 2);
        assert_eq!(early.nodes.len(), 2);
        assert_eq!(early.leaders, 0);

        let full = NetworkSnapshot::from_events(&events, events.len());
        assert_eq!(full.time, 10);
        assert_eq!(full.leaders, 1);
        assert_eq!(full.max_level, 1);
        assert_eq!(full.nodes[0].links, vec![LinkKind::Branch]);
        assert_eq!(full.fragments().get(&NodeId(1)), Some(&2));
    }

    #[test]
    fn snapshot_default() {
        let snap = NetworkSnapshot::default();
        assert_eq!(snap.time, 0);
        assert!(snap.nodes.is_empty());
    }
}
