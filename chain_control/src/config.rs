use core::{num::NonZeroUsize, time::Duration};

use derivative::Derivative;
use nonzero_ext::nonzero;
use serde::Deserialize;

pub const DEFAULT_MAX_PENDING_BLOCKS: NonZeroUsize = nonzero!(500_usize);
pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(10 * 60);

#[derive(Clone, Debug, Derivative, Deserialize)]
#[derivative(Default)]
#[serde(default, deny_unknown_fields)]
pub struct ControlConfig {
    pub notifications: Notifications,
    /// Blocks whose raw payload contains these bytes are reported as mined by us.
    pub miner_id: Option<String>,
    #[derivative(Default(value = "DEFAULT_MAX_PENDING_BLOCKS"))]
    pub max_pending_blocks: NonZeroUsize,
    /// Blocks with timestamps older than this are treated as historical.
    #[derivative(Default(value = "DEFAULT_FRESHNESS_WINDOW"))]
    #[serde(with = "seconds")]
    pub freshness_window: Duration,
    #[derivative(Default(value = "Duration::from_secs(5 * 60)"))]
    #[serde(with = "seconds")]
    pub peer_expiry_interval: Duration,
    #[derivative(Default(value = "Duration::from_secs(60)"))]
    #[serde(with = "seconds")]
    pub tx_pool_expiry_interval: Duration,
    #[derivative(Default(value = "Duration::from_secs(1)"))]
    #[serde(with = "seconds")]
    pub network_tick_interval: Duration,
    #[derivative(Default(value = "Duration::from_millis(500)"))]
    #[serde(with = "milliseconds")]
    pub idle_timeout: Duration,
    #[derivative(Default(value = "64"))]
    pub block_channel_capacity: usize,
    #[derivative(Default(value = "256"))]
    pub transaction_channel_capacity: usize,
    #[derivative(Default(value = "16"))]
    pub ui_channel_capacity: usize,
}

/// Operator alerts raised for fresh blocks.
#[derive(Clone, Copy, Default, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Notifications {
    pub new_block: bool,
    pub active_fork: bool,
    pub new_balance: bool,
}

mod seconds {
    use core::time::Duration;

    use serde::{Deserialize as _, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod milliseconds {
    use core::time::Duration;

    use serde::{Deserialize as _, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;

    #[test]
    fn missing_fields_take_default_values() -> Result<()> {
        let config = serde_json::from_str::<ControlConfig>(
            r#"{"notifications": {"active_fork": true}, "idle_timeout": 250}"#,
        )?;

        assert!(config.notifications.active_fork);
        assert!(!config.notifications.new_block);
        assert_eq!(config.idle_timeout, Duration::from_millis(250));
        assert_eq!(config.max_pending_blocks, DEFAULT_MAX_PENDING_BLOCKS);
        assert_eq!(config.freshness_window, DEFAULT_FRESHNESS_WINDOW);
        assert_eq!(config.peer_expiry_interval, Duration::from_secs(300));

        Ok(())
    }

    #[test]
    fn zero_pending_limit_is_rejected() {
        serde_json::from_str::<ControlConfig>(r#"{"max_pending_blocks": 0}"#)
            .expect_err("pending block limit must be positive");
    }
}
