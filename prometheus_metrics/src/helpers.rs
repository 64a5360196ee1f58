use std::time::{Duration, SystemTime};

use anyhow::Result;
use types::UnixSeconds;

pub fn duration_from_now_to(timestamp: UnixSeconds) -> Result<Duration> {
    let duration_since_epoch = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH)?;

    Ok(duration_since_epoch.saturating_sub(Duration::from_secs(timestamp)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_from_now_to_future_timestamp_is_zero() -> Result<()> {
        assert_eq!(duration_from_now_to(UnixSeconds::MAX)?, Duration::ZERO);
        Ok(())
    }

    #[test]
    fn duration_from_now_to_epoch_is_positive() -> Result<()> {
        assert!(duration_from_now_to(0)? > Duration::ZERO);
        Ok(())
    }
}
