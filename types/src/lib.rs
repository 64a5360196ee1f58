//! Data types shared by the block ingestion pipeline and its collaborators.
//!
//! Blocks and transactions are content-addressed. Their hashes are computed from their contents
//! when they are constructed and can be recomputed to verify blocks received from elsewhere.

pub use crate::{
    block::{Block, Transaction, TxOutput},
    primitives::{BlockHash, ConnectionId, Height, TxHash, UnixSeconds, H256},
};

pub mod consts;

mod block;
mod primitives;
