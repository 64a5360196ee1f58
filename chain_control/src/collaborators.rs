//! Contracts of the components the dispatch loop drives but does not own the logic of.
//!
//! Penalties and inventory announcements are not part of these traits.
//! They are delivered as [`P2pMessage`]s so that the network layer can apply them concurrently.
//!
//! [`P2pMessage`]: crate::P2pMessage

use anyhow::Result;
use types::{Block, ConnectionId, Transaction, TxHash};

pub trait TransactionPool: Send + 'static {
    fn handle_transaction(&mut self, transaction: Transaction, connection_id: ConnectionId);

    /// Called for every non-coinbase transaction of an accepted block.
    fn mark_confirmed(&mut self, tx_hash: TxHash);

    fn expire(&mut self);
}

pub trait PeerDirectory: Send + 'static {
    fn expire(&mut self);

    fn close(&mut self) -> Result<()>;
}

pub trait NetworkMaintenance: Send + 'static {
    fn tick(&mut self);

    fn close_all(&mut self);
}

pub trait Wallet: Send + 'static {
    /// Returns a description of the new balance if `block` changed it.
    fn balance_change(&mut self, block: &Block) -> Option<String>;

    fn summary(&self) -> String;
}

/// Everything the dispatch loop drives. Returned by [`DispatchLoop::run`] for shutdown.
///
/// [`DispatchLoop::run`]: crate::DispatchLoop::run
pub struct Collaborators<C, T, W, D, N> {
    pub chain: C,
    pub transaction_pool: T,
    pub wallet: W,
    pub peer_directory: D,
    pub network: N,
}
