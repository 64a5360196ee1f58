use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use anyhow::Result;
use chain_control::{NetworkMaintenance, P2pMessage, RejectionReason};
use futures::{channel::mpsc::UnboundedReceiver, StreamExt as _};
use logging::{debug_with_status, info_with_status, warn_with_status, NODE_LOG_METRICS};
use parking_lot::Mutex;
use types::{BlockHash, ConnectionId};

struct Connection {
    address: String,
    dos_score: u32,
    queued_inventory: Vec<BlockHash>,
    announced: usize,
}

#[derive(Default)]
struct NetworkState {
    connections: HashMap<ConnectionId, Connection>,
    banned: HashSet<String>,
    stopped: bool,
}

/// Connection table driven by the dispatch loop through [`NetworkMaintenance`] and by
/// [`P2pMessage`]s through [`LocalNetwork::run`].
///
/// Clones share the same table.
#[derive(Clone)]
pub struct LocalNetwork {
    ban_threshold: u32,
    state: Arc<Mutex<NetworkState>>,
}

impl LocalNetwork {
    #[must_use]
    pub fn new(ban_threshold: u32) -> Self {
        Self {
            ban_threshold,
            state: Arc::default(),
        }
    }

    /// Returns `false` if `address` has been banned.
    pub fn connect(&self, connection_id: ConnectionId, address: impl Into<String>) -> bool {
        let address = address.into();
        let mut state = self.state.lock();

        if state.banned.contains(&address) {
            debug_with_status!("refusing banned address {address:?} ({connection_id})");
            return false;
        }

        state.connections.insert(
            connection_id,
            Connection {
                address,
                dos_score: 0,
                queued_inventory: vec![],
                announced: 0,
            },
        );

        NODE_LOG_METRICS.set_connected_peer_count(state.connections.len());

        true
    }

    #[must_use]
    pub fn is_connected(&self, connection_id: ConnectionId) -> bool {
        self.state.lock().connections.contains_key(&connection_id)
    }

    #[cfg(test)]
    fn dos_score(&self, connection_id: ConnectionId) -> Option<u32> {
        self.state
            .lock()
            .connections
            .get(&connection_id)
            .map(|connection| connection.dos_score)
    }

    #[cfg(test)]
    fn announced(&self, connection_id: ConnectionId) -> Option<usize> {
        self.state
            .lock()
            .connections
            .get(&connection_id)
            .map(|connection| connection.announced)
    }

    /// Applies messages from the dispatch loop until it stops.
    pub async fn run(self, mut p2p_rx: UnboundedReceiver<P2pMessage>) -> Result<()> {
        while let Some(message) = p2p_rx.next().await {
            if !self.apply(message) {
                break;
            }
        }

        debug_with_status!("network message handler stopped");

        Ok(())
    }

    /// Returns `false` once the dispatch loop has stopped.
    pub fn apply(&self, message: P2pMessage) -> bool {
        let mut state = self.state.lock();

        match message {
            P2pMessage::PenalizePeer(connection_id, reason) => {
                if let Some(connection) = state.connections.get_mut(&connection_id) {
                    connection.dos_score = connection.dos_score.saturating_add(penalty(reason));

                    debug_with_status!(
                        "peer penalized ({connection_id}, reason: {}, score: {})",
                        <&str>::from(reason),
                        connection.dos_score,
                    );
                }
            }
            P2pMessage::RouteInventory { hash, except } => {
                for (connection_id, connection) in &mut state.connections {
                    if Some(*connection_id) != except {
                        connection.queued_inventory.push(hash);
                    }
                }
            }
            P2pMessage::Stop => {
                state.stopped = true;
                return false;
            }
        }

        true
    }
}

impl NetworkMaintenance for LocalNetwork {
    fn tick(&mut self) {
        let mut state = self.state.lock();

        let to_ban = state
            .connections
            .iter()
            .filter(|(_, connection)| connection.dos_score >= self.ban_threshold)
            .map(|(connection_id, _)| *connection_id)
            .collect::<Vec<_>>();

        for connection_id in to_ban {
            if let Some(connection) = state.connections.remove(&connection_id) {
                warn_with_status!(
                    "banning {:?} ({connection_id}, score: {})",
                    connection.address,
                    connection.dos_score,
                );

                state.banned.insert(connection.address);
            }
        }

        for (connection_id, connection) in &mut state.connections {
            if connection.queued_inventory.is_empty() {
                continue;
            }

            let inventory = core::mem::take(&mut connection.queued_inventory);

            debug_with_status!(
                "announcing {} blocks to {connection_id} (latest: {:?})",
                inventory.len(),
                inventory.last(),
            );

            connection.announced += inventory.len();
        }

        NODE_LOG_METRICS.set_connected_peer_count(state.connections.len());
    }

    fn close_all(&mut self) {
        let mut state = self.state.lock();
        let closed = state.connections.len();

        state.connections.clear();

        NODE_LOG_METRICS.set_connected_peer_count(0);

        info_with_status!(
            "network connections closed (connections: {closed}, stopped: {})",
            state.stopped,
        );
    }
}

const fn penalty(reason: RejectionReason) -> u32 {
    match reason {
        RejectionReason::InvalidBlock | RejectionReason::InvalidCachedBlock => 100,
        RejectionReason::PoisonedCachedBlock => 50,
    }
}

#[cfg(test)]
mod tests {
    use futures::channel::mpsc;
    use types::H256;

    use super::*;

    const ALICE: ConnectionId = ConnectionId(1);
    const BOB: ConnectionId = ConnectionId(2);

    fn network() -> LocalNetwork {
        let network = LocalNetwork::new(100);
        network.connect(ALICE, "10.0.0.1:8333");
        network.connect(BOB, "10.0.0.2:8333");
        network
    }

    #[test]
    fn inventory_is_routed_to_everyone_except_the_sender() {
        let mut network = network();

        network.apply(P2pMessage::RouteInventory {
            hash: H256::repeat_byte(1),
            except: Some(ALICE),
        });
        network.apply(P2pMessage::RouteInventory {
            hash: H256::repeat_byte(2),
            except: None,
        });
        network.tick();

        assert_eq!(network.announced(ALICE), Some(1));
        assert_eq!(network.announced(BOB), Some(2));
    }

    #[test]
    fn peers_are_banned_at_the_threshold_on_the_next_tick() {
        let mut network = network();

        network.apply(P2pMessage::PenalizePeer(
            ALICE,
            RejectionReason::PoisonedCachedBlock,
        ));
        network.tick();

        assert_eq!(network.dos_score(ALICE), Some(50));

        network.apply(P2pMessage::PenalizePeer(
            ALICE,
            RejectionReason::PoisonedCachedBlock,
        ));

        assert!(network.is_connected(ALICE));

        network.tick();

        assert!(!network.is_connected(ALICE));
        assert!(network.is_connected(BOB));
        assert!(!network.connect(ConnectionId(3), "10.0.0.1:8333"));
    }

    #[test]
    fn close_all_drops_every_connection() {
        let mut network = network();

        network.close_all();

        assert!(!network.is_connected(ALICE));
        assert!(!network.is_connected(BOB));
    }

    #[tokio::test]
    async fn message_handler_stops_on_stop_message() -> Result<()> {
        let network = network();
        let (p2p_tx, p2p_rx) = mpsc::unbounded();

        p2p_tx.unbounded_send(P2pMessage::PenalizePeer(BOB, RejectionReason::InvalidBlock))?;
        p2p_tx.unbounded_send(P2pMessage::Stop)?;

        network.clone().run(p2p_rx).await?;

        assert_eq!(network.dos_score(BOB), Some(100));

        Ok(())
    }
}
