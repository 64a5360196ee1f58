use core::time::Duration;
use std::collections::HashMap;

use chain_store::ChainNode;
use parking_lot::Mutex;
use types::{BlockHash, UnixSeconds};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ReceivedBlock {
    pub received_at: UnixSeconds,
    /// How long the chain state took to accept the block.
    pub accept_time: Option<Duration>,
}

/// Per-block bookkeeping shared between the dispatch loop and readers on other threads.
#[derive(Default)]
pub struct ReceivedBlocks {
    blocks: Mutex<HashMap<BlockHash, ReceivedBlock>>,
}

impl ReceivedBlocks {
    pub fn seed(&self, nodes: impl IntoIterator<Item = ChainNode>) {
        let mut blocks = self.blocks.lock();

        for node in nodes {
            blocks.entry(node.hash).or_insert(ReceivedBlock {
                received_at: node.timestamp,
                accept_time: None,
            });
        }
    }

    /// Returns `false` if the block has been received before.
    pub fn record_received(&self, hash: BlockHash, received_at: UnixSeconds) -> bool {
        let mut blocks = self.blocks.lock();

        if blocks.contains_key(&hash) {
            return false;
        }

        blocks.insert(
            hash,
            ReceivedBlock {
                received_at,
                accept_time: None,
            },
        );

        true
    }

    /// Blocks accepted without being cached first are recorded as received at `received_at`.
    pub fn record_accepted(
        &self,
        hash: BlockHash,
        received_at: UnixSeconds,
        accept_time: Duration,
    ) {
        self.blocks
            .lock()
            .entry(hash)
            .or_insert(ReceivedBlock {
                received_at,
                accept_time: None,
            })
            .accept_time = Some(accept_time);
    }

    #[must_use]
    pub fn get(&self, hash: BlockHash) -> Option<ReceivedBlock> {
        self.blocks.lock().get(&hash).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use types::H256;

    use super::*;

    #[test]
    fn first_receipt_is_kept() {
        let received = ReceivedBlocks::default();
        let hash = H256::repeat_byte(1);

        assert!(received.record_received(hash, 10));
        assert!(!received.record_received(hash, 20));

        received.record_accepted(hash, 30, Duration::from_millis(3));

        assert_eq!(
            received.get(hash),
            Some(ReceivedBlock {
                received_at: 10,
                accept_time: Some(Duration::from_millis(3)),
            }),
        );
    }

    #[test]
    fn seeding_does_not_overwrite_entries() {
        let received = ReceivedBlocks::default();
        let hash = H256::repeat_byte(2);

        received.record_received(hash, 10);

        received.seed([
            ChainNode {
                hash,
                parent_hash: H256::zero(),
                height: 1,
                timestamp: 5,
            },
            ChainNode {
                hash: H256::repeat_byte(3),
                parent_hash: hash,
                height: 2,
                timestamp: 6,
            },
        ]);

        assert_eq!(received.len(), 2);
        assert_eq!(received.get(hash).map(|block| block.received_at), Some(10));
    }
}
