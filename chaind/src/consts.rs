use types::ConnectionId;

pub const APPLICATION_NAME: &str = "chaind";

pub const CONFIG_FILE: &str = "chaind.yaml";
pub const LOCK_FILE: &str = "LOCK";
pub const PEERS_FILE: &str = "peers.json";
pub const BLOCKS_DIRECTORY: &str = "blocks";

/// Blocks read from an import file are attributed to this connection.
pub const IMPORT_CONNECTION_ID: ConnectionId = ConnectionId(0);

pub const DEFAULT_BAN_THRESHOLD: u32 = 100;
pub const DEFAULT_PEER_TIMEOUT_SECS: u64 = 3 * 60 * 60;
pub const DEFAULT_TX_POOL_TIMEOUT_SECS: u64 = 60 * 60;
