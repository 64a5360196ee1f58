//! The chain state collaborator of the block ingestion core.
//!
//! [`ChainState`] is the contract the core depends on. [`BlockTree`] is the implementation used by
//! the node: an in-memory block index that picks the highest branch as the best tip and optionally
//! persists accepted blocks to an append-only log.

pub use crate::{
    block_tree::BlockTree,
    chain_state::{BlockCheck, ChainNode, ChainState},
    error::BlockError,
    tree_config::{TreeConfig, DEFAULT_MAX_FUTURE_DRIFT},
};

mod block_log;
mod block_tree;
mod chain_state;
mod error;
mod tree_config;
