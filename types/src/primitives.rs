use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

pub use primitive_types::H256;

pub type BlockHash = H256;
pub type TxHash = H256;
pub type Height = u64;
pub type UnixSeconds = u64;

/// Identity of a peer connection as assigned by the network layer.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Display, From, Deserialize, Serialize,
)]
#[display("connection {_0}")]
#[serde(transparent)]
pub struct ConnectionId(pub u64);
