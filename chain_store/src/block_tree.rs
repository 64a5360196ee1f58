use std::{
    collections::{HashMap, HashSet},
    path::Path,
    sync::Arc,
};

use anyhow::{ensure, Result};
use logging::{debug_with_status, info_with_status};
use types::{Block, BlockHash, UnixSeconds};

use crate::{
    block_log::BlockLog,
    chain_state::{BlockCheck, ChainNode, ChainState},
    error::BlockError,
    tree_config::TreeConfig,
};

pub struct BlockTree {
    config: TreeConfig,
    tip: ChainNode,
    nodes: HashMap<BlockHash, ChainNode>,
    blocks: HashMap<BlockHash, Arc<Block>>,
    log: Option<BlockLog>,
}

impl BlockTree {
    #[must_use]
    pub fn in_memory(config: TreeConfig, genesis: Arc<Block>) -> Self {
        let root = ChainNode {
            hash: genesis.hash,
            parent_hash: genesis.parent_hash,
            height: 0,
            timestamp: genesis.timestamp,
        };

        Self {
            config,
            tip: root,
            nodes: HashMap::from([(root.hash, root)]),
            blocks: HashMap::from([(root.hash, genesis)]),
            log: None,
        }
    }

    /// Opens a tree backed by a block log in `directory`, replaying any blocks already logged.
    pub fn open(config: TreeConfig, genesis: Arc<Block>, directory: &Path) -> Result<Self> {
        let (log, logged_blocks) = BlockLog::open(directory)?;
        let mut tree = Self::in_memory(config, genesis);
        let logged_count = logged_blocks.len();

        for block in logged_blocks {
            let computed = block.computed_hash();

            ensure!(
                computed == block.hash,
                BlockError::HashMismatch {
                    declared: block.hash,
                    computed,
                },
            );

            let block = Arc::new(block);
            let node = tree.link(&block)?;
            tree.attach(node, block);
        }

        info_with_status!(
            "block log replayed (directory: {directory:?}, blocks: {logged_count}, \
             tip height: {}, tip: {:?})",
            tree.tip.height,
            tree.tip.hash,
        );

        tree.log = Some(log);

        Ok(tree)
    }

    #[must_use]
    pub fn check_block_at(&self, block: &Block, now: UnixSeconds) -> BlockCheck {
        match self.validate(block, now) {
            Ok(()) => BlockCheck::Valid,
            Err(error) => error.into_check(),
        }
    }

    fn validate(&self, block: &Block, now: UnixSeconds) -> Result<(), BlockError> {
        let hash = block.hash;
        let computed = block.computed_hash();

        if computed != hash {
            return Err(BlockError::HashMismatch {
                declared: hash,
                computed,
            });
        }

        if self.nodes.contains_key(&hash) {
            return Err(BlockError::AlreadyKnown { hash });
        }

        match block.transactions.first() {
            Some(transaction) if transaction.coinbase => {}
            _ => return Err(BlockError::MissingCoinbase { hash }),
        }

        if let Some(index) = block
            .non_coinbase_transactions()
            .position(|transaction| transaction.coinbase)
        {
            return Err(BlockError::MisplacedCoinbase {
                hash,
                index: index + 1,
            });
        }

        let mut seen = HashSet::with_capacity(block.transactions.len());

        for transaction in &block.transactions {
            if !seen.insert(transaction.hash) {
                return Err(BlockError::DuplicateTransaction {
                    hash,
                    tx_hash: transaction.hash,
                });
            }
        }

        if block.timestamp > now.saturating_add(self.config.max_future_drift.as_secs()) {
            return Err(BlockError::TimestampTooFarInFuture {
                hash,
                timestamp: block.timestamp,
                now,
            });
        }

        let parent = self.link(block)?;

        if block.timestamp < parent.timestamp {
            return Err(BlockError::TimestampBeforeParent {
                hash,
                timestamp: block.timestamp,
                parent_timestamp: parent.timestamp,
            });
        }

        Ok(())
    }

    fn link(&self, block: &Block) -> Result<ChainNode, BlockError> {
        if self.nodes.contains_key(&block.hash) {
            return Err(BlockError::AlreadyKnown { hash: block.hash });
        }

        let parent = self
            .nodes
            .get(&block.parent_hash)
            .ok_or(BlockError::UnknownParent {
                hash: block.hash,
                parent_hash: block.parent_hash,
            })?;

        Ok(*parent)
    }

    fn attach(&mut self, parent: ChainNode, block: Arc<Block>) -> ChainNode {
        let node = ChainNode {
            hash: block.hash,
            parent_hash: parent.hash,
            height: parent.height + 1,
            timestamp: block.timestamp,
        };

        self.nodes.insert(node.hash, node);
        self.blocks.insert(node.hash, block);

        // Ties go to the branch seen first.
        if node.height > self.tip.height {
            self.tip = node;
        }

        node
    }

    fn parent_of(&self, node: &ChainNode) -> Option<ChainNode> {
        self.nodes.get(&node.parent_hash).copied()
    }
}

impl ChainState for BlockTree {
    fn check_block(&self, block: &Block) -> BlockCheck {
        // A clock before the Unix epoch only disables the future timestamp rule.
        let now = clock::unix_now().unwrap_or(UnixSeconds::MAX);
        self.check_block_at(block, now)
    }

    fn accept_block(&mut self, block: &Arc<Block>) -> Result<()> {
        let parent = self.link(block)?;

        if let Some(log) = self.log.as_mut() {
            log.append(block)?;
        }

        let node = self.attach(parent, block.clone());

        debug_with_status!(
            "block attached to tree (hash: {:?}, height: {}, tip: {:?})",
            node.hash,
            node.height,
            self.tip.hash,
        );

        Ok(())
    }

    fn idle(&mut self) -> Result<bool> {
        if let Some(log) = self.log.as_mut() {
            if log.flush()? {
                debug_with_status!("block log flushed");
            }
        }

        Ok(false)
    }

    fn best_tip(&self) -> ChainNode {
        self.tip
    }

    fn node(&self, hash: BlockHash) -> Option<ChainNode> {
        self.nodes.get(&hash).copied()
    }

    fn block(&self, hash: BlockHash) -> Option<Arc<Block>> {
        self.blocks.get(&hash).cloned()
    }

    fn common_ancestor(&self, left: &ChainNode, right: &ChainNode) -> Option<ChainNode> {
        let mut left = *left;
        let mut right = *right;

        while left.height > right.height {
            left = self.parent_of(&left)?;
        }

        while right.height > left.height {
            right = self.parent_of(&right)?;
        }

        while left.hash != right.hash {
            left = self.parent_of(&left)?;
            right = self.parent_of(&right)?;
        }

        Some(left)
    }

    fn nodes(&self) -> Box<dyn Iterator<Item = ChainNode> + '_> {
        Box::new(self.nodes.values().copied())
    }

    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn close(&mut self) -> Result<()> {
        if let Some(log) = self.log.as_mut() {
            log.close()?;
        }

        info_with_status!(
            "block tree closed (tip height: {}, tip: {:?})",
            self.tip.height,
            self.tip.hash,
        );

        Ok(())
    }
}
