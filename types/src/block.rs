use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::{
    consts::{GENESIS_PAYLOAD, GENESIS_TIMESTAMP},
    primitives::{BlockHash, TxHash, UnixSeconds, H256},
};

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct TxOutput {
    pub address: String,
    pub value: u64,
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct Transaction {
    pub hash: TxHash,
    pub coinbase: bool,
    pub nonce: u64,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    #[must_use]
    pub fn new(coinbase: bool, nonce: u64, outputs: Vec<TxOutput>) -> Self {
        let hash = transaction_hash(coinbase, nonce, &outputs);

        Self {
            hash,
            coinbase,
            nonce,
            outputs,
        }
    }

    #[must_use]
    pub fn coinbase(nonce: u64, outputs: Vec<TxOutput>) -> Self {
        Self::new(true, nonce, outputs)
    }

    #[must_use]
    pub fn computed_hash(&self) -> TxHash {
        transaction_hash(self.coinbase, self.nonce, &self.outputs)
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct Block {
    pub hash: BlockHash,
    pub parent_hash: BlockHash,
    pub timestamp: UnixSeconds,
    pub transactions: Vec<Transaction>,
    #[serde(with = "hex")]
    pub raw: Vec<u8>,
}

impl Block {
    #[must_use]
    pub fn new(
        parent_hash: BlockHash,
        timestamp: UnixSeconds,
        transactions: Vec<Transaction>,
        raw: Vec<u8>,
    ) -> Self {
        let hash = block_hash(parent_hash, timestamp, &transactions, &raw);

        Self {
            hash,
            parent_hash,
            timestamp,
            transactions,
            raw,
        }
    }

    #[must_use]
    pub fn genesis() -> Arc<Self> {
        Arc::new(Self::new(
            H256::zero(),
            GENESIS_TIMESTAMP,
            vec![Transaction::coinbase(0, vec![])],
            GENESIS_PAYLOAD.to_vec(),
        ))
    }

    #[must_use]
    pub fn computed_hash(&self) -> BlockHash {
        block_hash(self.parent_hash, self.timestamp, &self.transactions, &self.raw)
    }

    /// Every transaction except the leading coinbase.
    pub fn non_coinbase_transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter().skip(1)
    }
}

fn transaction_hash(coinbase: bool, nonce: u64, outputs: &[TxOutput]) -> TxHash {
    let mut hasher = Sha256::new();

    hasher.update([u8::from(coinbase)]);
    hasher.update(nonce.to_le_bytes());
    hasher.update(length_prefix(outputs.len()));

    for TxOutput { address, value } in outputs {
        hasher.update(length_prefix(address.len()));
        hasher.update(address.as_bytes());
        hasher.update(value.to_le_bytes());
    }

    double_sha256(hasher)
}

fn block_hash(
    parent_hash: BlockHash,
    timestamp: UnixSeconds,
    transactions: &[Transaction],
    raw: &[u8],
) -> BlockHash {
    let mut hasher = Sha256::new();

    hasher.update(parent_hash.as_bytes());
    hasher.update(timestamp.to_le_bytes());
    hasher.update(length_prefix(transactions.len()));

    for transaction in transactions {
        hasher.update(transaction.hash.as_bytes());
    }

    hasher.update(length_prefix(raw.len()));
    hasher.update(raw);

    double_sha256(hasher)
}

fn double_sha256(hasher: Sha256) -> H256 {
    H256::from_slice(Sha256::digest(hasher.finalize()).as_slice())
}

// Lengths are capped at `u32::MAX` in the encoding. Nothing produces collections that large.
fn length_prefix(length: usize) -> [u8; 4] {
    u32::try_from(length).unwrap_or(u32::MAX).to_le_bytes()
}
