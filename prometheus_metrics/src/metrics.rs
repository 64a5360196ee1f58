
use anyhow::Result;
use prometheus::{histogram_opts, Histogram, IntCounter, IntGauge, Registry};
use tracing::warn;
use types::UnixSeconds;

use crate::helpers;

#[derive(Debug)]
pub struct Metrics {
    // Block ingestion
    pub handle_net_block: IntCounter,
    pub blocks_accepted: IntCounter,
    pub invalid_blocks: IntCounter,
    pub penalized_blocks: IntCounter,
    pub accept_failures: IntCounter,
    pub block_processing_times: Histogram,
    block_propagation_delay_times: Histogram,

    // Pending block cache
    pub blocks_cached: IntCounter,
    pub blocks_from_cache: IntCounter,
    pub bad_cached_blocks: IntCounter,
    pub cached_blocks_dos: IntCounter,
    pub pending_evictions: IntCounter,
    pending_blocks: IntGauge,

    // Chain
    pub reorgs_total: IntCounter,
    tip_height: IntGauge,

    // Dispatch loop
    pub main_loop_iterations: IntCounter,
    pub main_loop_timeouts: IntCounter,
    pub net_messages: IntCounter,
    pub ui_commands: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        Ok(Self {
            // Block ingestion
            handle_net_block: IntCounter::new(
                "HANDLE_NET_BLOCK",
                "Number of blocks received from the network",
            )?,

            blocks_accepted: IntCounter::new(
                "BLOCKS_ACCEPTED",
                "Number of blocks accepted into the chain state",
            )?,

            invalid_blocks: IntCounter::new(
                "INVALID_BLOCKS",
                "Number of blocks that failed the block check",
            )?,

            penalized_blocks: IntCounter::new(
                "PENALIZED_BLOCKS",
                "Number of blocks that caused their source connection to be penalized",
            )?,

            accept_failures: IntCounter::new(
                "ACCEPT_FAILURES",
                "Number of blocks rejected by the chain state after passing the block check",
            )?,

            block_processing_times: Histogram::with_opts(histogram_opts!(
                "BLOCK_PROCESSING_TIMES",
                "Time taken to accept a block into the chain state",
            ))?,

            block_propagation_delay_times: Histogram::with_opts(histogram_opts!(
                "BLOCK_PROPAGATION_DELAY_TIMES",
                "Duration between the declared timestamp of a fresh block and its acceptance",
            ))?,

            // Pending block cache
            blocks_cached: IntCounter::new(
                "BLOCKS_CACHED",
                "Number of blocks deferred into the pending block cache",
            )?,

            blocks_from_cache: IntCounter::new(
                "BLOCKS_FROM_CACHE",
                "Number of pending blocks accepted by cache retries",
            )?,

            bad_cached_blocks: IntCounter::new(
                "BAD_CACHED_BLOCKS",
                "Number of pending blocks found invalid by cache retries",
            )?,

            cached_blocks_dos: IntCounter::new(
                "CACHED_BLOCKS_DOS",
                "Number of pending blocks that caused their source connection to be penalized",
            )?,

            pending_evictions: IntCounter::new(
                "PENDING_EVICTIONS",
                "Number of pending blocks evicted to keep the cache within its limit",
            )?,

            pending_blocks: IntGauge::new(
                "PENDING_BLOCKS",
                "Number of blocks in the pending block cache",
            )?,

            // Chain
            reorgs_total: IntCounter::new(
                "REORGS_TOTAL",
                "Number of times the best tip moved to a different branch",
            )?,

            tip_height: IntGauge::new("TIP_HEIGHT", "Height of the best tip")?,

            // Dispatch loop
            main_loop_iterations: IntCounter::new(
                "MAIN_LOOP_ITERATIONS",
                "Number of dispatch loop iterations",
            )?,

            main_loop_timeouts: IntCounter::new(
                "MAIN_LOOP_TIMEOUTS",
                "Number of dispatch loop iterations that ended with the idle timeout",
            )?,

            net_messages: IntCounter::new(
                "NET_MESSAGES",
                "Number of network messages and timer events serviced by the dispatch loop",
            )?,

            ui_commands: IntCounter::new(
                "UI_COMMANDS",
                "Number of user interface commands executed by the dispatch loop",
            )?,
        })
    }

    pub fn register_with_default_metrics(&self) -> Result<()> {
        self.register(prometheus::default_registry())
    }

    pub fn register(&self, registry: &Registry) -> Result<()> {
        registry.register(Box::new(self.handle_net_block.clone()))?;
        registry.register(Box::new(self.blocks_accepted.clone()))?;
        registry.register(Box::new(self.invalid_blocks.clone()))?;
        registry.register(Box::new(self.penalized_blocks.clone()))?;
        registry.register(Box::new(self.accept_failures.clone()))?;
        registry.register(Box::new(self.block_processing_times.clone()))?;
        registry.register(Box::new(self.block_propagation_delay_times.clone()))?;
        registry.register(Box::new(self.blocks_cached.clone()))?;
        registry.register(Box::new(self.blocks_from_cache.clone()))?;
        registry.register(Box::new(self.bad_cached_blocks.clone()))?;
        registry.register(Box::new(self.cached_blocks_dos.clone()))?;
        registry.register(Box::new(self.pending_evictions.clone()))?;
        registry.register(Box::new(self.pending_blocks.clone()))?;
        registry.register(Box::new(self.reorgs_total.clone()))?;
        registry.register(Box::new(self.tip_height.clone()))?;
        registry.register(Box::new(self.main_loop_iterations.clone()))?;
        registry.register(Box::new(self.main_loop_timeouts.clone()))?;
        registry.register(Box::new(self.net_messages.clone()))?;
        registry.register(Box::new(self.ui_commands.clone()))?;

        Ok(())
    }

    // Block ingestion
    pub fn observe_block_propagation_delay(&self, block_timestamp: UnixSeconds) {
        match helpers::duration_from_now_to(block_timestamp) {
            Ok(duration) => self
                .block_propagation_delay_times
                .observe(duration.as_secs_f64()),
            Err(error) => warn!("unable to observe block propagation delay: {error:?}"),
        }
    }

    // Pending block cache
    pub fn set_pending_blocks(&self, pending_block_count: usize) {
        self.pending_blocks
            .set(i64::try_from(pending_block_count).unwrap_or(i64::MAX))
    }

    // Chain
    pub fn set_tip_height(&self, height: u64) {
        self.tip_height.set(i64::try_from(height).unwrap_or(i64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_can_be_registered_once_per_registry() -> Result<()> {
        let metrics = Metrics::new()?;
        let registry = Registry::new();

        metrics.register(&registry)?;
        metrics.blocks_accepted.inc();
        metrics.set_pending_blocks(3);

        assert_eq!(registry.gather().len(), 19);
        assert_eq!(metrics.blocks_accepted.get(), 1);

        assert!(metrics.register(&registry).is_err());

        Ok(())
    }
}
