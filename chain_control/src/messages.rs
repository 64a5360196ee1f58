use std::sync::Arc;

use derivative::Derivative;
use futures::channel::oneshot::Sender as OneshotSender;
use types::{Block, BlockHash, ConnectionId, Height, Transaction};

use crate::{
    misc::{BlockOrigin, RejectionReason},
    ui::UiContext,
    unbounded_sink::UnboundedSink,
};

#[derive(PartialEq, Eq, Debug)]
pub enum P2pMessage {
    PenalizePeer(ConnectionId, RejectionReason),
    RouteInventory {
        hash: BlockHash,
        except: Option<ConnectionId>,
    },
    Stop,
}

impl P2pMessage {
    pub fn send(self, tx: &impl UnboundedSink<Self>) {
        tx.send_or_log(self, "p2p");
    }
}

#[derive(PartialEq, Eq, Debug)]
pub enum NotifierMessage {
    NewBlock {
        hash: BlockHash,
        tip_height: Height,
    },
    MinedByUs {
        hash: BlockHash,
    },
    /// A fresh block was accepted without becoming the best tip.
    OrphanedBlock {
        hash: BlockHash,
        height: Height,
        fork_depth: Height,
    },
    BalanceChanged {
        summary: String,
        alert: bool,
    },
    Stop,
}

impl NotifierMessage {
    pub fn send(self, tx: &impl UnboundedSink<Self>) {
        tx.send_or_log(self, "notifier");
    }
}

#[derive(Debug)]
pub struct NetBlock {
    pub block: Arc<Block>,
    pub origin: BlockOrigin,
}

#[derive(Debug)]
pub struct NetTx {
    pub transaction: Transaction,
    pub connection_id: ConnectionId,
}

pub type UiHandler = Box<dyn FnOnce(&mut UiContext<'_>, String) + Send>;

/// An operation executed by the dispatch loop between chain mutations.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct UiCommand {
    #[derivative(Debug = "ignore")]
    pub handler: UiHandler,
    pub parameter: String,
    pub done: OneshotSender<()>,
}
