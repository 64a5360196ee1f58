//! Timers for the dispatch loop and helpers for working with Unix time.
//!
//! # Implementation
//!
//! Periodic timers are implemented using [`Interval`]. Some subtleties to keep in mind:
//!
//! - The first item is produced one period after the stream is created, not immediately.
//!   [`interval`] would fire right away, which is not what maintenance timers want.
//!
//! - Missed ticks are skipped rather than bursted. If the consumer is busy for several periods,
//!   only one item is produced when it comes back. There is never a backlog of pending ticks.
//!
//! - The idle timeout of the dispatch loop is not an [`Interval`]. It is a [`Sleep`] recreated on
//!   every iteration, so it only fires after a full quiet period.
//!
//! [`Interval`]: tokio::time::Interval
//! [`Sleep`]:    tokio::time::Sleep
//! [`interval`]: tokio::time::interval

use core::time::Duration;
use std::time::{SystemTime, SystemTimeError};

use anyhow::Result;
use futures::stream::{FusedStream, StreamExt as _};
use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;
use types::UnixSeconds;

#[derive(Debug, Error)]
#[cfg_attr(test, derive(PartialEq, Eq))]
pub enum ClockError {
    #[error("timer period must not be zero")]
    ZeroPeriod,
    #[error("time of first tick overflowed")]
    FirstInstantOverflow,
}

/// Produces an item every `period`, starting one `period` from now.
pub fn periodic(period: Duration) -> Result<impl FusedStream<Item = Instant> + Unpin> {
    if period.is_zero() {
        return Err(ClockError::ZeroPeriod.into());
    }

    let start = Instant::now()
        .checked_add(period)
        .ok_or(ClockError::FirstInstantOverflow)?;

    let mut interval = tokio::time::interval_at(start, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    Ok(IntervalStream::new(interval).fuse())
}

pub fn unix_now() -> Result<UnixSeconds, SystemTimeError> {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|duration| duration.as_secs())
}

/// Whether a block declaring `timestamp` was produced within `window` before `now`.
///
/// Blocks from the future count as fresh.
#[must_use]
pub fn is_fresh(timestamp: UnixSeconds, now: UnixSeconds, window: Duration) -> bool {
    timestamp > now.saturating_sub(window.as_secs())
}

#[cfg(test)]
mod tests {
    use futures::FutureExt as _;
    use test_case::test_case;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn periodic_produces_first_item_after_one_period() -> Result<()> {
        let mut ticks = periodic(Duration::from_secs(5))?;
        let mut next_tick = || ticks.next().now_or_never().flatten();

        assert_eq!(next_tick(), None);

        tokio::time::advance(Duration::from_secs(4)).await;

        assert_eq!(next_tick(), None);

        tokio::time::advance(Duration::from_secs(1)).await;

        assert!(next_tick().is_some());
        assert_eq!(next_tick(), None);

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_skips_missed_ticks() -> Result<()> {
        let mut ticks = periodic(Duration::from_secs(1))?;
        let mut next_tick = || ticks.next().now_or_never().flatten();

        tokio::time::advance(Duration::from_millis(3500)).await;

        assert!(next_tick().is_some());
        assert_eq!(next_tick(), None);

        tokio::time::advance(Duration::from_millis(500)).await;

        assert!(next_tick().is_some());
        assert_eq!(next_tick(), None);

        Ok(())
    }

    #[test]
    fn periodic_rejects_zero_period() {
        let error = periodic(Duration::ZERO).err().expect("zero period is rejected");

        assert_eq!(error.downcast_ref(), Some(&ClockError::ZeroPeriod));
    }

    #[test_case(1000, 1000, true; "produced now")]
    #[test_case(401, 1000, true; "just inside window")]
    #[test_case(400, 1000, false; "at window boundary")]
    #[test_case(10, 1000, false; "historical")]
    #[test_case(1200, 1000, true; "from the future")]
    #[test_case(0, 100, false; "window reaches before epoch")]
    fn freshness(timestamp: UnixSeconds, now: UnixSeconds, expected: bool) {
        assert_eq!(is_fresh(timestamp, now, Duration::from_secs(600)), expected);
    }
}
