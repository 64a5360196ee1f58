use chain_store::ChainState;

use crate::{collaborators::Wallet, misc::LastObservedTip, received::ReceivedBlocks};

/// What a UI command may see while the dispatch loop runs it.
pub struct UiContext<'loop_ref> {
    chain: &'loop_ref dyn ChainState,
    wallet: &'loop_ref dyn Wallet,
    received_blocks: &'loop_ref ReceivedBlocks,
    last_observed_tip: LastObservedTip,
    pending_block_count: usize,
    exit_requested: bool,
}

impl<'loop_ref> UiContext<'loop_ref> {
    pub(crate) fn new(
        chain: &'loop_ref dyn ChainState,
        wallet: &'loop_ref dyn Wallet,
        received_blocks: &'loop_ref ReceivedBlocks,
        last_observed_tip: LastObservedTip,
        pending_block_count: usize,
    ) -> Self {
        Self {
            chain,
            wallet,
            received_blocks,
            last_observed_tip,
            pending_block_count,
            exit_requested: false,
        }
    }

    #[must_use]
    pub fn chain(&self) -> &dyn ChainState {
        self.chain
    }

    #[must_use]
    pub fn wallet_summary(&self) -> String {
        self.wallet.summary()
    }

    #[must_use]
    pub const fn received_blocks(&self) -> &ReceivedBlocks {
        self.received_blocks
    }

    #[must_use]
    pub const fn last_observed_tip(&self) -> LastObservedTip {
        self.last_observed_tip
    }

    #[must_use]
    pub const fn pending_block_count(&self) -> usize {
        self.pending_block_count
    }

    /// Makes the dispatch loop terminate after the current command.
    pub fn request_exit(&mut self) {
        self.exit_requested = true;
    }

    #[must_use]
    pub const fn exit_requested(&self) -> bool {
        self.exit_requested
    }
}
