pub use crate::{
    helpers::duration_from_now_to,
    metrics::Metrics,
};

mod helpers;
mod metrics;
