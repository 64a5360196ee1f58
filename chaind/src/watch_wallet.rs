use std::collections::BTreeMap;

use chain_control::Wallet;
use chain_store::ChainState;
use itertools::Itertools as _;
use logging::info_with_status;
use types::Block;

/// Tracks how much has been paid to a set of watched addresses.
///
/// Outputs of every transaction count, coinbase included. Spending is not tracked.
pub struct WatchWallet {
    balances: BTreeMap<String, u64>,
}

impl WatchWallet {
    #[must_use]
    pub fn new(addresses: impl IntoIterator<Item = String>) -> Self {
        Self {
            balances: addresses.into_iter().map(|address| (address, 0)).collect(),
        }
    }

    /// Adds up outputs of every block on the best chain.
    pub fn scan(&mut self, chain: &dyn ChainState) {
        if self.balances.is_empty() {
            return;
        }

        let mut next = Some(chain.best_tip().hash);
        let mut scanned = 0_usize;

        while let Some(block) = next.and_then(|hash| chain.block(hash)) {
            self.credit(&block);
            next = Some(block.parent_hash);
            scanned += 1;
        }

        info_with_status!("wallet scanned {scanned} blocks: {}", self.summary());
    }

    #[cfg(test)]
    fn balance(&self, address: &str) -> Option<u64> {
        self.balances.get(address).copied()
    }

    fn credit(&mut self, block: &Block) -> bool {
        let mut changed = false;

        for output in block
            .transactions
            .iter()
            .flat_map(|transaction| &transaction.outputs)
        {
            if let Some(balance) = self.balances.get_mut(&output.address) {
                *balance = balance.saturating_add(output.value);
                changed |= output.value > 0;
            }
        }

        changed
    }
}

impl Wallet for WatchWallet {
    fn balance_change(&mut self, block: &Block) -> Option<String> {
        self.credit(block).then(|| self.summary())
    }

    fn summary(&self) -> String {
        if self.balances.is_empty() {
            return "no watched addresses".to_owned();
        }

        let total = self.balances.values().copied().fold(0_u64, u64::saturating_add);

        format!(
            "{} (total: {total})",
            self.balances
                .iter()
                .format_with(", ", |(address, balance), f| f(&format_args!(
                    "{address}: {balance}"
                ))),
        )
    }
}
