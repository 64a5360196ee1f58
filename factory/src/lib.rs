//! Builders for blocks used in tests throughout the workspace.
//!
//! Every block produced here has a correct hash and a leading coinbase transaction.
//! The `nonce` parameters exist to make sibling blocks with otherwise equal contents distinct.

use std::sync::Arc;

use itertools::Itertools as _;
use types::{Block, Transaction, TxOutput, UnixSeconds};

/// A child of `parent` with only a coinbase transaction.
#[must_use]
pub fn child(parent: &Block, timestamp: UnixSeconds, nonce: u64) -> Arc<Block> {
    child_with(parent, timestamp, nonce, vec![], vec![])
}

#[must_use]
pub fn child_with(
    parent: &Block,
    timestamp: UnixSeconds,
    nonce: u64,
    payments: Vec<Transaction>,
    raw: Vec<u8>,
) -> Arc<Block> {
    let transactions = core::iter::once(Transaction::coinbase(nonce, vec![]))
        .chain(payments)
        .collect_vec();

    Arc::new(Block::new(parent.hash, timestamp, transactions, raw))
}

/// `length` blocks extending `parent`, each one second after the previous.
#[must_use]
pub fn chain(
    parent: &Block,
    length: usize,
    first_timestamp: UnixSeconds,
    nonce: u64,
) -> Vec<Arc<Block>> {
    let mut blocks: Vec<Arc<Block>> = Vec::with_capacity(length);
    let mut timestamp = first_timestamp;

    for _ in 0..length {
        let block = child(blocks.last().map_or(parent, Arc::as_ref), timestamp, nonce);
        blocks.push(block);
        timestamp += 1;
    }

    blocks
}

#[must_use]
pub fn payment(nonce: u64, address: &str, value: u64) -> Transaction {
    Transaction::new(
        false,
        nonce,
        vec![TxOutput {
            address: address.to_owned(),
            value,
        }],
    )
}
