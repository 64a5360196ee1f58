use core::time::Duration;
use std::path::PathBuf;

use chain_control::ControlConfig;
use chain_store::TreeConfig;
use derivative::Derivative;
use itertools::Itertools as _;
use logging::info_with_status;
use serde::Deserialize;

use crate::consts::{DEFAULT_BAN_THRESHOLD, DEFAULT_PEER_TIMEOUT_SECS, DEFAULT_TX_POOL_TIMEOUT_SECS};

/// Settings of the collaborators the binary provides.
#[derive(Clone, Copy, Debug, Derivative, Deserialize)]
#[derivative(Default)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    /// Accumulated penalty points at which a connection is dropped.
    #[derivative(Default(value = "DEFAULT_BAN_THRESHOLD"))]
    pub ban_threshold: u32,
    #[derivative(Default(value = "Duration::from_secs(DEFAULT_PEER_TIMEOUT_SECS)"))]
    #[serde(with = "seconds")]
    pub peer_timeout: Duration,
    #[derivative(Default(value = "Duration::from_secs(DEFAULT_TX_POOL_TIMEOUT_SECS)"))]
    #[serde(with = "seconds")]
    pub tx_pool_timeout: Duration,
}

#[cfg_attr(test, derive(Debug))]
pub struct ChaindConfig {
    pub data_dir: PathBuf,
    pub control_config: ControlConfig,
    pub tree_config: TreeConfig,
    pub node_config: NodeConfig,
    pub watch_addresses: Vec<String>,
    pub import: Option<PathBuf>,
    pub console: bool,
}

impl ChaindConfig {
    pub fn report(&self) {
        let Self {
            data_dir,
            control_config,
            tree_config,
            node_config,
            watch_addresses,
            import,
            console,
        } = self;

        let ControlConfig {
            notifications,
            miner_id,
            max_pending_blocks,
            freshness_window,
            idle_timeout,
            ..
        } = control_config;

        info_with_status!("data directory: {data_dir:?}");
        info_with_status!(
            "notifications: new block: {}, active fork: {}, new balance: {}",
            notifications.new_block,
            notifications.active_fork,
            notifications.new_balance,
        );

        match miner_id {
            Some(miner_id) => info_with_status!("miner id: {miner_id:?}"),
            None => info_with_status!("miner id: none"),
        }

        info_with_status!("max pending blocks: {max_pending_blocks}");
        info_with_status!("freshness window: {freshness_window:?}");
        info_with_status!("idle timeout: {idle_timeout:?}");
        info_with_status!(
            "max future drift: {:?}",
            tree_config.max_future_drift,
        );
        info_with_status!("ban threshold: {}", node_config.ban_threshold);
        info_with_status!("watched addresses: [{}]", watch_addresses.iter().format(", "));

        if let Some(import) = import {
            info_with_status!("importing blocks from {import:?}");
        }

        if !console {
            info_with_status!("console disabled");
        }
    }
}

mod seconds {
    use core::time::Duration;

    use serde::{Deserialize as _, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
