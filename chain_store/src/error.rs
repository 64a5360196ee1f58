use thiserror::Error;
use types::{BlockHash, TxHash, UnixSeconds};

use crate::chain_state::BlockCheck;

#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub enum BlockError {
    #[error("block hash does not match its contents (declared: {declared:?}, computed: {computed:?})")]
    HashMismatch {
        declared: BlockHash,
        computed: BlockHash,
    },
    #[error("block is already known: {hash:?}")]
    AlreadyKnown { hash: BlockHash },
    #[error("block has no coinbase transaction: {hash:?}")]
    MissingCoinbase { hash: BlockHash },
    #[error("block has a coinbase transaction at index {index}: {hash:?}")]
    MisplacedCoinbase { hash: BlockHash, index: usize },
    #[error("block contains transaction {tx_hash:?} more than once: {hash:?}")]
    DuplicateTransaction { hash: BlockHash, tx_hash: TxHash },
    #[error(
        "block timestamp is too far in the future \
         (hash: {hash:?}, timestamp: {timestamp}, now: {now})"
    )]
    TimestampTooFarInFuture {
        hash: BlockHash,
        timestamp: UnixSeconds,
        now: UnixSeconds,
    },
    #[error("parent of block is unknown (hash: {hash:?}, parent_hash: {parent_hash:?})")]
    UnknownParent {
        hash: BlockHash,
        parent_hash: BlockHash,
    },
    #[error(
        "block timestamp is earlier than parent timestamp \
         (hash: {hash:?}, timestamp: {timestamp}, parent_timestamp: {parent_timestamp})"
    )]
    TimestampBeforeParent {
        hash: BlockHash,
        timestamp: UnixSeconds,
        parent_timestamp: UnixSeconds,
    },
}

impl BlockError {
    /// Whether the block may become valid once more chain state arrives.
    #[must_use]
    pub const fn may_become_valid(&self) -> bool {
        matches!(
            self,
            Self::TimestampTooFarInFuture { .. } | Self::UnknownParent { .. },
        )
    }

    /// Whether sending a block that fails with this error counts as misbehavior.
    #[must_use]
    pub const fn is_dos(&self) -> bool {
        !self.may_become_valid() && !matches!(self, Self::AlreadyKnown { .. })
    }

    #[must_use]
    pub fn into_check(self) -> BlockCheck {
        if self.may_become_valid() {
            BlockCheck::NotYetValidatable { error: self }
        } else {
            let dos = self.is_dos();
            BlockCheck::Invalid { error: self, dos }
        }
    }
}
