// `Mutator` owns the chain state and everything that changes together with it: the pending block
// cache, the last observed tip and the transaction pool. Only the dispatch loop calls it, so every
// chain mutation runs to completion before the next event is looked at and nothing needs a lock.
//
// Received block statistics are the exception. They are read by UI threads and live behind their
// own mutex in `ReceivedBlocks`.

use std::{sync::Arc, time::Instant};

use anyhow::Result;
use chain_store::{BlockCheck, BlockError, ChainNode, ChainState};
use logging::{debug_with_status, info_with_status, warn_with_status, NODE_LOG_METRICS};
use prometheus_metrics::Metrics;
use types::{Block, UnixSeconds};

use crate::{
    collaborators::{Collaborators, TransactionPool, Wallet},
    config::ControlConfig,
    messages::{NotifierMessage, P2pMessage},
    misc::{BlockOrigin, IngestOutcome, LastObservedTip, PendingEntry, RejectionReason},
    pending::{Insertion, PendingBlocks},
    received::ReceivedBlocks,
    ui::UiContext,
    unbounded_sink::UnboundedSink,
};

pub struct Mutator<C, T, W, PS, NS> {
    config: Arc<ControlConfig>,
    chain: C,
    transaction_pool: T,
    wallet: W,
    pending_blocks: PendingBlocks,
    received_blocks: Arc<ReceivedBlocks>,
    last_observed_tip: LastObservedTip,
    metrics: Option<Arc<Metrics>>,
    p2p_tx: PS,
    notifier_tx: NS,
}

impl<C, T, W, PS, NS> Mutator<C, T, W, PS, NS>
where
    C: ChainState,
    T: TransactionPool,
    W: Wallet,
    PS: UnboundedSink<P2pMessage>,
    NS: UnboundedSink<NotifierMessage>,
{
    #[expect(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<ControlConfig>,
        chain: C,
        transaction_pool: T,
        wallet: W,
        received_blocks: Arc<ReceivedBlocks>,
        metrics: Option<Arc<Metrics>>,
        p2p_tx: PS,
        notifier_tx: NS,
    ) -> Self {
        let tip = chain.best_tip();

        received_blocks.seed(chain.nodes());

        NODE_LOG_METRICS.set_tip_height(tip.height);

        if let Some(metrics) = metrics.as_ref() {
            metrics.set_tip_height(tip.height);
        }

        Self {
            pending_blocks: PendingBlocks::new(config.max_pending_blocks),
            config,
            chain,
            transaction_pool,
            wallet,
            received_blocks,
            last_observed_tip: LastObservedTip {
                node: tip,
                observed_at: tip.timestamp,
            },
            metrics,
            p2p_tx,
            notifier_tx,
        }
    }

    /// Runs a block received from the network (or produced locally) through the pipeline.
    pub fn handle_net_block(&mut self, block: Arc<Block>, origin: BlockOrigin) -> IngestOutcome {
        let submission_time = Instant::now();

        if let Some(metrics) = self.metrics.as_ref() {
            metrics.handle_net_block.inc();
            metrics.observe_block_propagation_delay(block.timestamp);
        }

        match self.chain.check_block(&block) {
            BlockCheck::Valid => {}
            BlockCheck::Invalid { error, dos } => {
                if dos {
                    warn_with_status!("block rejected (error: {error}, origin: {origin:?})");
                    self.penalize(origin, RejectionReason::InvalidBlock);
                } else {
                    debug_with_status!("block ignored (error: {error}, origin: {origin:?})");
                }

                if let Some(metrics) = self.metrics.as_ref() {
                    metrics.invalid_blocks.inc();
                }

                return IngestOutcome::Rejected { dos };
            }
            BlockCheck::NotYetValidatable { error } => {
                self.received_blocks.record_received(block.hash, unix_now());

                let pending_entry = PendingEntry {
                    block,
                    origin,
                    submission_time,
                };

                return self.delay_block(pending_entry, &error);
            }
        }

        match self.local_accept_block(&block, origin, submission_time) {
            Ok(()) => IngestOutcome::Accepted {
                retry_pending: self.retry_cached_blocks(),
            },
            Err(error) => {
                warn_with_status!(
                    "block passed checks but could not be accepted, \
                     the block store may need to be rebuilt \
                     (error: {error:?}, block: {:?}, origin: {origin:?})",
                    block.hash,
                );

                if let Some(metrics) = self.metrics.as_ref() {
                    metrics.accept_failures.inc();
                }

                IngestOutcome::AcceptFailed
            }
        }
    }

    /// Tries every cached block once, committing at most one acceptance.
    ///
    /// Returns `true` if a block was accepted and more blocks remain cached.
    pub fn retry_cached_blocks(&mut self) -> bool {
        if self.pending_blocks.is_empty() {
            return false;
        }

        let mut accepted = false;

        for hash in self.pending_blocks.hashes() {
            let check = match self.pending_blocks.get(&hash) {
                Some(pending_entry) => self.chain.check_block(&pending_entry.block),
                None => continue,
            };

            match check {
                BlockCheck::Valid => {
                    let Some(pending_entry) = self.pending_blocks.remove(&hash) else {
                        continue;
                    };

                    let PendingEntry {
                        block,
                        origin,
                        submission_time,
                    } = pending_entry;

                    match self.local_accept_block(&block, origin, submission_time) {
                        Ok(()) => {
                            debug_with_status!("cached block accepted: {hash:?}");

                            if let Some(metrics) = self.metrics.as_ref() {
                                metrics.blocks_from_cache.inc();
                            }

                            accepted = true;
                            break;
                        }
                        Err(error) => {
                            warn_with_status!(
                                "cached block could not be accepted \
                                 (error: {error:?}, block: {hash:?}, origin: {origin:?})",
                            );

                            if let Some(metrics) = self.metrics.as_ref() {
                                metrics.accept_failures.inc();
                                metrics.cached_blocks_dos.inc();
                            }

                            self.penalize(origin, RejectionReason::PoisonedCachedBlock);
                        }
                    }
                }
                BlockCheck::Invalid { error, dos } => {
                    let origin = self
                        .pending_blocks
                        .remove(&hash)
                        .map(|pending_entry| pending_entry.origin);

                    warn_with_status!(
                        "cached block rejected (error: {error}, block: {hash:?}, origin: {origin:?})",
                    );

                    if let Some(metrics) = self.metrics.as_ref() {
                        metrics.bad_cached_blocks.inc();
                    }

                    if let Some(origin) = origin.filter(|_| dos) {
                        if let Some(metrics) = self.metrics.as_ref() {
                            metrics.cached_blocks_dos.inc();
                        }

                        self.penalize(origin, RejectionReason::InvalidCachedBlock);
                    }
                }
                BlockCheck::NotYetValidatable { .. } => {}
            }
        }

        self.track_pending_blocks();

        accepted && !self.pending_blocks.is_empty()
    }

    pub fn transaction_pool_mut(&mut self) -> &mut T {
        &mut self.transaction_pool
    }

    pub fn idle(&mut self) -> Result<bool> {
        self.chain.idle()
    }

    pub fn ui_context(&self) -> UiContext<'_> {
        UiContext::new(
            &self.chain,
            &self.wallet,
            &self.received_blocks,
            self.last_observed_tip,
            self.pending_blocks.len(),
        )
    }

    pub fn pending_block_count(&self) -> usize {
        self.pending_blocks.len()
    }

    pub const fn last_observed_tip(&self) -> LastObservedTip {
        self.last_observed_tip
    }

    #[cfg(test)]
    pub const fn chain(&self) -> &C {
        &self.chain
    }

    pub fn handle_stop(self) -> (C, T, W) {
        P2pMessage::Stop.send(&self.p2p_tx);
        NotifierMessage::Stop.send(&self.notifier_tx);

        (self.chain, self.transaction_pool, self.wallet)
    }

    pub fn into_collaborators<D, N>(
        self,
        peer_directory: D,
        network: N,
    ) -> Collaborators<C, T, W, D, N> {
        let (chain, transaction_pool, wallet) = self.handle_stop();

        Collaborators {
            chain,
            transaction_pool,
            wallet,
            peer_directory,
            network,
        }
    }

    fn local_accept_block(
        &mut self,
        block: &Arc<Block>,
        origin: BlockOrigin,
        submission_time: Instant,
    ) -> Result<()> {
        let previous_tip = self.last_observed_tip.node;
        let accept_start = Instant::now();

        self.chain.accept_block(block)?;

        let accept_time = accept_start.elapsed();
        let now = unix_now();

        self.received_blocks.record_accepted(block.hash, now, accept_time);

        for transaction in block.non_coinbase_transactions() {
            self.transaction_pool.mark_confirmed(transaction.hash);
        }

        let tip = self.chain.best_tip();
        let fresh = clock::is_fresh(block.timestamp, now, self.config.freshness_window);
        let balance_change = self.wallet.balance_change(block);

        if tip != previous_tip && tip.parent_hash != previous_tip.hash {
            self.notify_about_reorganization(&previous_tip, &tip);
        }

        if fresh {
            self.handle_fresh_block(block, origin, &previous_tip, &tip);
        }

        self.last_observed_tip = LastObservedTip {
            node: tip,
            observed_at: now,
        };

        if let Some(summary) = balance_change {
            let alert = fresh && self.config.notifications.new_balance;
            NotifierMessage::BalanceChanged { summary, alert }.send(&self.notifier_tx);
        }

        NODE_LOG_METRICS.set_tip_height(tip.height);

        if let Some(metrics) = self.metrics.as_ref() {
            metrics.blocks_accepted.inc();
            metrics
                .block_processing_times
                .observe(submission_time.elapsed().as_secs_f64());
            metrics.set_tip_height(tip.height);
        }

        if fresh {
            info_with_status!(
                "block accepted (block: {:?}, origin: {origin:?}, tip: {:?})",
                block.hash,
                tip.hash,
            );
        } else {
            debug_with_status!(
                "historical block accepted (block: {:?}, origin: {origin:?}, tip: {:?})",
                block.hash,
                tip.hash,
            );
        }

        Ok(())
    }

    fn handle_fresh_block(
        &self,
        block: &Block,
        origin: BlockOrigin,
        previous_tip: &ChainNode,
        tip: &ChainNode,
    ) {
        P2pMessage::RouteInventory {
            hash: block.hash,
            except: origin.connection_id(),
        }
        .send(&self.p2p_tx);

        let notifications = self.config.notifications;

        if notifications.new_block {
            NotifierMessage::NewBlock {
                hash: block.hash,
                tip_height: tip.height,
            }
            .send(&self.notifier_tx);
        }

        if self.mined_by_us(&block.raw) {
            NotifierMessage::MinedByUs { hash: block.hash }.send(&self.notifier_tx);
        }

        // An unchanged tip means the block extended a branch other than the best one.
        if notifications.active_fork && tip == previous_tip {
            self.notify_about_orphaned_block(block, previous_tip);
        }
    }

    fn notify_about_orphaned_block(&self, block: &Block, previous_tip: &ChainNode) {
        let Some(node) = self.chain.node(block.hash) else {
            warn_with_status!("accepted block missing from block index: {:?}", block.hash);
            return;
        };

        let Some(ancestor) = self.chain.common_ancestor(previous_tip, &node) else {
            warn_with_status!(
                "no common ancestor found (block: {:?}, tip: {:?})",
                node.hash,
                previous_tip.hash,
            );
            return;
        };

        // Only the tip observed right before this block is compared against.
        // Several quick reorganizations can make this smaller than the real divergence.
        let fork_depth = node.height.saturating_sub(ancestor.height);

        if fork_depth > 1 {
            warn_with_status!(
                "orphaned block on a fork {fork_depth} blocks deep \
                 (block: {:?}, height: {}, common ancestor: {:?})",
                node.hash,
                node.height,
                ancestor.hash,
            );
        } else {
            info_with_status!(
                "orphaned block (block: {:?}, height: {})",
                node.hash,
                node.height,
            );
        }

        NotifierMessage::OrphanedBlock {
            hash: node.hash,
            height: node.height,
            fork_depth,
        }
        .send(&self.notifier_tx);
    }

    fn notify_about_reorganization(&self, old_tip: &ChainNode, new_tip: &ChainNode) {
        if let Some(metrics) = self.metrics.as_ref() {
            metrics.reorgs_total.inc();
        }

        info_with_status!(
            "chain reorganized (old tip: {:?}, new tip: {:?})",
            old_tip.hash,
            new_tip.hash,
        );
    }

    fn delay_block(&mut self, pending_entry: PendingEntry, error: &BlockError) -> IngestOutcome {
        let hash = pending_entry.block.hash;

        let outcome = match self.pending_blocks.insert(pending_entry) {
            Insertion::Inserted { evicted } => {
                debug_with_status!("block delayed (error: {error}, block: {hash:?})");

                if let Some(evicted) = evicted {
                    debug_with_status!("pending block evicted: {evicted:?}");

                    if let Some(metrics) = self.metrics.as_ref() {
                        metrics.pending_evictions.inc();
                    }
                }

                if let Some(metrics) = self.metrics.as_ref() {
                    metrics.blocks_cached.inc();
                }

                IngestOutcome::Cached
            }
            Insertion::AlreadyPresent => IngestOutcome::AlreadyCached,
        };

        self.track_pending_blocks();

        outcome
    }

    fn penalize(&self, origin: BlockOrigin, reason: RejectionReason) {
        let BlockOrigin::Peer(connection_id) = origin else {
            return;
        };

        if let Some(metrics) = self.metrics.as_ref() {
            metrics.penalized_blocks.inc();
        }

        P2pMessage::PenalizePeer(connection_id, reason).send(&self.p2p_tx);
    }

    fn mined_by_us(&self, raw: &[u8]) -> bool {
        let Some(miner_id) = self.config.miner_id.as_deref() else {
            return false;
        };

        !miner_id.is_empty()
            && raw
                .windows(miner_id.len())
                .any(|window| window == miner_id.as_bytes())
    }

    fn track_pending_blocks(&self) {
        let pending_block_count = self.pending_blocks.len();

        NODE_LOG_METRICS.set_pending_block_count(pending_block_count);

        if let Some(metrics) = self.metrics.as_ref() {
            metrics.set_pending_blocks(pending_block_count);
        }
    }

    #[cfg(test)]
    pub(crate) fn pending_contains(&self, hash: types::BlockHash) -> bool {
        self.pending_blocks.contains(&hash)
    }
}

// A clock before the Unix epoch makes every block look fresh.
fn unix_now() -> UnixSeconds {
    clock::unix_now().unwrap_or_default()
}
