use core::num::NonZeroUsize;
use std::collections::HashMap;

use itertools::Itertools as _;
use types::BlockHash;

use crate::misc::PendingEntry;

pub enum Insertion {
    Inserted { evicted: Option<PendingEntry> },
    AlreadyPresent,
}

/// Blocks that passed structural checks but cannot be validated yet.
pub struct PendingBlocks {
    entries: HashMap<BlockHash, (u64, PendingEntry)>,
    capacity: NonZeroUsize,
    next_sequence: u64,
}

impl PendingBlocks {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity,
            next_sequence: 0,
        }
    }

    // The entry inserted first is evicted to make room when the cache is full.
    pub fn insert(&mut self, entry: PendingEntry) -> Insertion {
        let hash = entry.block.hash;

        if self.entries.contains_key(&hash) {
            return Insertion::AlreadyPresent;
        }

        let evicted = if self.entries.len() >= self.capacity.get() {
            self.oldest().and_then(|oldest| self.remove(&oldest))
        } else {
            None
        };

        self.entries.insert(hash, (self.next_sequence, entry));
        self.next_sequence += 1;

        Insertion::Inserted { evicted }
    }

    /// Snapshot of the cached hashes, so entries can be removed while iterating over it.
    pub fn hashes(&self) -> Vec<BlockHash> {
        self.entries.keys().copied().collect_vec()
    }

    pub fn get(&self, hash: &BlockHash) -> Option<&PendingEntry> {
        self.entries.get(hash).map(|(_, entry)| entry)
    }

    pub fn remove(&mut self, hash: &BlockHash) -> Option<PendingEntry> {
        self.entries.remove(hash).map(|(_, entry)| entry)
    }

    #[cfg(test)]
    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.entries.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn oldest(&self) -> Option<BlockHash> {
        self.entries
            .iter()
            .min_by_key(|(_, (sequence, _))| *sequence)
            .map(|(hash, _)| *hash)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Instant};

    use nonzero_ext::nonzero;
    use types::{Block, ConnectionId};

    use crate::misc::BlockOrigin;

    use super::*;

    fn entry(block: Arc<Block>, submission_time: Instant) -> PendingEntry {
        PendingEntry {
            block,
            origin: BlockOrigin::Peer(ConnectionId(1)),
            submission_time,
        }
    }

    #[test]
    fn duplicate_insert_is_ignored() {
        let genesis = Block::genesis();
        let block = factory::child(&genesis, 1, 0);
        let now = Instant::now();
        let mut pending = PendingBlocks::new(nonzero!(2_usize));

        assert!(matches!(
            pending.insert(entry(block.clone(), now)),
            Insertion::Inserted { evicted: None },
        ));

        assert!(matches!(
            pending.insert(entry(block, now)),
            Insertion::AlreadyPresent,
        ));

        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn full_cache_evicts_entry_inserted_first() {
        let genesis = Block::genesis();
        let blocks = (0..4)
            .map(|nonce| factory::child(&genesis, 1, nonce))
            .collect_vec();
        let now = Instant::now();
        let mut pending = PendingBlocks::new(nonzero!(2_usize));

        pending.insert(entry(blocks[0].clone(), now));
        pending.insert(entry(blocks[1].clone(), now));

        let Insertion::Inserted { evicted } = pending.insert(entry(blocks[2].clone(), now)) else {
            panic!("new block should be inserted");
        };

        assert_eq!(evicted.map(|entry| entry.block.hash), Some(blocks[0].hash));

        pending.remove(&blocks[1].hash);
        pending.insert(entry(blocks[3].clone(), now));

        assert!(!pending.contains(&blocks[0].hash));
        assert!(!pending.contains(&blocks[1].hash));
        assert!(pending.contains(&blocks[2].hash));
        assert!(pending.contains(&blocks[3].hash));
        assert_eq!(pending.len(), 2);
    }
}
