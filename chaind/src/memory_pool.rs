use core::time::Duration;
use std::collections::HashMap;

use chain_control::TransactionPool;
use logging::debug_with_status;
use types::{ConnectionId, Transaction, TxHash, UnixSeconds};

struct PooledTransaction {
    transaction: Transaction,
    connection_id: ConnectionId,
    received_at: UnixSeconds,
}

/// Unconfirmed transactions relayed by peers.
pub struct MemoryPool {
    timeout: Duration,
    transactions: HashMap<TxHash, PooledTransaction>,
}

impl MemoryPool {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            transactions: HashMap::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    #[cfg(test)]
    fn contains(&self, tx_hash: TxHash) -> bool {
        self.transactions.contains_key(&tx_hash)
    }

    pub fn insert_at(
        &mut self,
        transaction: Transaction,
        connection_id: ConnectionId,
        now: UnixSeconds,
    ) -> bool {
        if transaction.coinbase {
            debug_with_status!(
                "coinbase transaction relayed outside a block \
                 (transaction: {:?}, {connection_id})",
                transaction.hash,
            );
            return false;
        }

        let computed = transaction.computed_hash();

        if computed != transaction.hash {
            debug_with_status!(
                "transaction hash mismatch (declared: {:?}, computed: {computed:?}, {connection_id})",
                transaction.hash,
            );
            return false;
        }

        if self.transactions.contains_key(&transaction.hash) {
            return false;
        }

        self.transactions.insert(
            transaction.hash,
            PooledTransaction {
                transaction,
                connection_id,
                received_at: now,
            },
        );

        true
    }

    pub fn expire_at(&mut self, now: UnixSeconds) -> usize {
        let cutoff = now.saturating_sub(self.timeout.as_secs());
        let before = self.transactions.len();

        self.transactions
            .retain(|_, pooled| pooled.received_at > cutoff);

        before - self.transactions.len()
    }
}

impl TransactionPool for MemoryPool {
    fn handle_transaction(&mut self, transaction: Transaction, connection_id: ConnectionId) {
        self.insert_at(transaction, connection_id, unix_now());
    }

    fn mark_confirmed(&mut self, tx_hash: TxHash) {
        if let Some(pooled) = self.transactions.remove(&tx_hash) {
            debug_with_status!(
                "transaction confirmed (transaction: {:?}, relayed by {}, nonce: {})",
                tx_hash,
                pooled.connection_id,
                pooled.transaction.nonce,
            );
        }
    }

    fn expire(&mut self) {
        let expired = self.expire_at(unix_now());

        if expired > 0 {
            debug_with_status!(
                "unconfirmed transactions expired (expired: {expired}, remaining: {})",
                self.len(),
            );
        }
    }
}

fn unix_now() -> UnixSeconds {
    clock::unix_now().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use types::TxOutput;

    use super::*;

    const PEER: ConnectionId = ConnectionId(3);

    #[test]
    fn transactions_are_pooled_until_confirmed() {
        let mut pool = MemoryPool::new(Duration::from_secs(60));
        let payment = factory::payment(1, "alice", 10);

        assert!(pool.insert_at(payment.clone(), PEER, 1000));
        assert!(!pool.insert_at(payment.clone(), PEER, 1001));
        assert!(pool.contains(payment.hash));

        pool.mark_confirmed(payment.hash);

        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn coinbase_and_forged_transactions_are_ignored() {
        let mut pool = MemoryPool::new(Duration::from_secs(60));
        let coinbase = Transaction::coinbase(1, vec![]);

        let mut forged = factory::payment(2, "alice", 10);
        forged.outputs.push(TxOutput {
            address: "mallory".to_owned(),
            value: 1,
        });

        assert!(!pool.insert_at(coinbase, PEER, 1000));
        assert!(!pool.insert_at(forged, PEER, 1000));
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn old_transactions_expire() {
        let mut pool = MemoryPool::new(Duration::from_secs(60));

        pool.insert_at(factory::payment(1, "alice", 10), PEER, 1000);
        pool.insert_at(factory::payment(2, "alice", 10), PEER, 1030);

        assert_eq!(pool.expire_at(1060), 1);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.expire_at(1090), 1);
        assert_eq!(pool.len(), 0);
    }
}
