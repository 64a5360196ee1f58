use crate::primitives::UnixSeconds;

pub const GENESIS_TIMESTAMP: UnixSeconds = 1_700_000_000;
pub const GENESIS_PAYLOAD: &[u8] = b"chaind genesis";
