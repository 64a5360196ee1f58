use core::time::Duration;

use derivative::Derivative;
use serde::Deserialize;

pub const DEFAULT_MAX_FUTURE_DRIFT: Duration = Duration::from_secs(2 * 60 * 60);

#[derive(Clone, Copy, Debug, Derivative, Deserialize)]
#[derivative(Default)]
#[serde(default)]
pub struct TreeConfig {
    /// How far ahead of the local clock a block timestamp may be before the block is deferred.
    #[derivative(Default(value = "DEFAULT_MAX_FUTURE_DRIFT"))]
    #[serde(with = "seconds")]
    pub max_future_drift: Duration,
}

mod seconds {
    use core::time::Duration;

    use serde::{Deserialize as _, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
