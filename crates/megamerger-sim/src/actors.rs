//! Tokio actor substrate: one task and one inbox per node.
//!
//! Each node owns an unbounded channel. A sender pushes its messages in
//! order into the receiver's inbox, so every directed link stays FIFO while
//! the interleaving across links is left to the runtime.

use std::sync::Arc;

use megamerger_protocol::{Event, MegaMergerNode, NodeConfig, NodeId, Status, Topology};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::{Result, SimError};
use crate::simulation::check_initiators;

type Inbox = mpsc::UnboundedReceiver<Event>;
type Mailboxes = Arc<Vec<mpsc::UnboundedSender<Event>>>;

/// Run the protocol with one tokio task per node and return the final nodes,
/// indexed by id.
///
/// Initiators get an impulse before any task starts. The run ends when every
/// node is finished; the first node error stops all tasks.
pub async fn run_actors(
    topology: Arc<Topology>,
    config: NodeConfig,
    initiators: &[NodeId],
) -> Result<Vec<MegaMergerNode>> {
    check_initiators(&topology, initiators)?;

    let mut senders = Vec::with_capacity(topology.node_count());
    let mut inboxes = Vec::with_capacity(topology.node_count());
    for _ in topology.node_ids() {
        let (tx, rx) = mpsc::unbounded_channel();
        senders.push(tx);
        inboxes.push(rx);
    }
    for node in initiators {
        // Receivers are alive until the tasks below exit.
        let _ = senders[node.index()].send(Event::Impulse);
    }

    let mailboxes: Mailboxes = Arc::new(senders);
    let (stop_tx, stop_rx) = watch::channel(false);
    let stop_tx = Arc::new(stop_tx);

    let mut handles = Vec::with_capacity(inboxes.len());
    for (index, inbox) in inboxes.into_iter().enumerate() {
        let node = MegaMergerNode::from_topology(&topology, NodeId::from(index), config.clone())?;
        handles.push(tokio::spawn(drive(
            node,
            inbox,
            Arc::clone(&topology),
            Arc::clone(&mailboxes),
            stop_rx.clone(),
            Arc::clone(&stop_tx),
        )));
    }
    drop(mailboxes);

    let mut nodes = Vec::with_capacity(handles.len());
    let mut first_error = None;
    for handle in handles {
        match handle.await {
            Ok(Ok(node)) => nodes.push(node),
            Ok(Err(e)) => {
                first_error.get_or_insert(e);
            }
            Err(e) => {
                stop_tx.send_replace(true);
                first_error.get_or_insert(SimError::Join(e));
            }
        }
    }
    if let Some(e) = first_error {
        return Err(e);
    }

    info!(
        nodes = nodes.len(),
        leaders = nodes.iter().filter(|n| n.status() == Status::Leader).count(),
        "Actors finished"
    );
    Ok(nodes)
}

async fn drive(
    mut node: MegaMergerNode,
    mut inbox: Inbox,
    topology: Arc<Topology>,
    mailboxes: Mailboxes,
    mut stop: watch::Receiver<bool>,
    stop_tx: Arc<watch::Sender<bool>>,
) -> Result<MegaMergerNode> {
    let uid = node.uid();
    while !node.is_finished() {
        let event = tokio::select! {
            event = inbox.recv() => match event {
                Some(event) => event,
                None => return Err(SimError::ChannelClosed(uid)),
            },
            _ = stop.changed() => {
                debug!(node = %uid, "Stopped before finishing");
                return Ok(node);
            }
        };

        if event == Event::Impulse && node.status() != Status::Idle {
            continue;
        }
        if let Err(e) = node.handle(event) {
            stop_tx.send_replace(true);
            return Err(e.into());
        }

        for envelope in node.drain_outbox() {
            let Some((peer, peer_port)) = topology.peer(uid, envelope.port) else {
                stop_tx.send_replace(true);
                return Err(megamerger_protocol::Error::UnknownPort {
                    node: uid,
                    port: envelope.port,
                    degree: topology.degree(uid),
                }
                .into());
            };
            if mailboxes[peer.index()]
                .send(Event::receive(peer_port, envelope.message))
                .is_err()
            {
                warn!(node = %uid, peer = %peer, "Peer already finished, message dropped");
            }
        }
    }
    debug!(node = %uid, status = %node.status(), "Actor finished");
    Ok(node)
}
