use core::fmt::{Formatter, Result as FmtResult};
use std::{sync::Arc, time::Instant};

use chain_store::ChainNode;
use derivative::Derivative;
use strum::IntoStaticStr;
use types::{Block, ConnectionId, UnixSeconds};

/// Where a block entered the node.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BlockOrigin {
    Peer(ConnectionId),
    /// Produced locally. Never penalized.
    Own,
}

impl BlockOrigin {
    #[must_use]
    pub const fn connection_id(self) -> Option<ConnectionId> {
        match self {
            Self::Peer(connection_id) => Some(connection_id),
            Self::Own => None,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum RejectionReason {
    InvalidBlock,
    InvalidCachedBlock,
    PoisonedCachedBlock,
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct PendingEntry {
    #[derivative(Debug(format_with = "fmt_block_concisely"))]
    pub block: Arc<Block>,
    pub origin: BlockOrigin,
    pub submission_time: Instant,
}

/// What the acceptance pipeline did with a block received from the network.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum IngestOutcome {
    /// `retry_pending` tells the caller whether retrying cached blocks may make more progress.
    Accepted { retry_pending: bool },
    AcceptFailed,
    Cached,
    AlreadyCached,
    Rejected { dos: bool },
}

/// The best tip as of the last successful acceptance.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct LastObservedTip {
    pub node: ChainNode,
    pub observed_at: UnixSeconds,
}

fn fmt_block_concisely(block: &Arc<Block>, formatter: &mut Formatter) -> FmtResult {
    formatter
        .debug_struct("Block")
        .field("hash", &block.hash)
        .field("parent_hash", &block.parent_hash)
        .field("timestamp", &block.timestamp)
        .finish_non_exhaustive()
}
