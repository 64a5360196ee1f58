use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use derive_more::Display;

pub static NODE_LOG_METRICS: NodeLogMetrics = NodeLogMetrics::new();

#[derive(Display, Debug)]
#[display("peers: {connected_peer_count:?}, tip: {tip_height:?}, pending: {pending_block_count:?}")]
pub struct NodeLogMetrics {
    connected_peer_count: AtomicUsize,
    tip_height: AtomicU64,
    pending_block_count: AtomicUsize,
}

impl NodeLogMetrics {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connected_peer_count: AtomicUsize::new(0),
            tip_height: AtomicU64::new(0),
            pending_block_count: AtomicUsize::new(0),
        }
    }

    pub fn set_connected_peer_count(&self, connected_peer_count: usize) {
        self.connected_peer_count
            .store(connected_peer_count, Ordering::Relaxed)
    }

    pub fn set_tip_height(&self, tip_height: u64) {
        self.tip_height.store(tip_height, Ordering::Relaxed)
    }

    pub fn set_pending_block_count(&self, pending_block_count: usize) {
        self.pending_block_count
            .store(pending_block_count, Ordering::Relaxed)
    }

    #[must_use]
    pub fn tip_height(&self) -> u64 {
        self.tip_height.load(Ordering::Relaxed)
    }
}

impl Default for NodeLogMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[macro_export]
macro_rules! info_with_status {
    ($($arg:tt)*) => {
        ::tracing::info!("[{}] {}", $crate::NODE_LOG_METRICS, format_args!($($arg)*));
    };
}

#[macro_export]
macro_rules! debug_with_status {
    ($($arg:tt)*) => {
        ::tracing::debug!("[{}] {}", $crate::NODE_LOG_METRICS, format_args!($($arg)*));
    };
}

#[macro_export]
macro_rules! warn_with_status {
    ($($arg:tt)*) => {
        ::tracing::warn!("[{}] {}", $crate::NODE_LOG_METRICS, format_args!($($arg)*));
    };
}

#[macro_export]
macro_rules! error_with_status {
    ($($arg:tt)*) => {
        ::tracing::error!("[{}] {}", $crate::NODE_LOG_METRICS, format_args!($($arg)*));
    };
}

#[macro_export]
macro_rules! trace_with_status {
    ($($arg:tt)*) => {
        ::tracing::trace!("[{}] {}", $crate::NODE_LOG_METRICS, format_args!($($arg)*));
    };
}
