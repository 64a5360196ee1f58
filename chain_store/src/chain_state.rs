use std::sync::Arc;

use anyhow::Result;
use types::{Block, BlockHash, Height, UnixSeconds};

use crate::error::BlockError;

/// A node in the block index.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ChainNode {
    pub hash: BlockHash,
    pub parent_hash: BlockHash,
    pub height: Height,
    pub timestamp: UnixSeconds,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum BlockCheck {
    Valid,
    Invalid { error: BlockError, dos: bool },
    NotYetValidatable { error: BlockError },
}

impl BlockCheck {
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// The authoritative tree of known blocks.
///
/// Implementations are driven by a single owner. None of the methods are expected to block on
/// network I/O. Failures are reported through return values, never through panics.
pub trait ChainState: Send + 'static {
    fn check_block(&self, block: &Block) -> BlockCheck;

    fn accept_block(&mut self, block: &Arc<Block>) -> Result<()>;

    /// Performs a unit of background maintenance.
    /// Returns `true` if more work remains.
    fn idle(&mut self) -> Result<bool>;

    fn best_tip(&self) -> ChainNode;

    fn node(&self, hash: BlockHash) -> Option<ChainNode>;

    fn block(&self, hash: BlockHash) -> Option<Arc<Block>>;

    fn common_ancestor(&self, left: &ChainNode, right: &ChainNode) -> Option<ChainNode>;

    fn nodes(&self) -> Box<dyn Iterator<Item = ChainNode> + '_>;

    fn node_count(&self) -> usize;

    fn close(&mut self) -> Result<()>;
}
