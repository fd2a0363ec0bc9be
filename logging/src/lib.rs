use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use derive_more::Display;
use types::primitives::ExecutionBlockNumber;

pub static HEAD_LOG_METRICS: HeadLogMetrics = HeadLogMetrics::new();

#[derive(Display, Debug)]
#[display("head: {head_number:?}, synced: {synced:?}")]
pub struct HeadLogMetrics {
    head_number: AtomicU64,
    synced: AtomicBool,
}

impl HeadLogMetrics {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            head_number: AtomicU64::new(0),
            synced: AtomicBool::new(false),
        }
    }

    pub fn set_head_number(&self, head_number: ExecutionBlockNumber) {
        self.head_number.store(head_number, Ordering::Relaxed)
    }

    pub fn set_synced(&self, synced: bool) {
        self.synced.store(synced, Ordering::Relaxed)
    }
}

impl Default for HeadLogMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[macro_export]
macro_rules! info_with_head {
    ($($arg:tt)*) => {
        ::log::info!("[{}] {}", $crate::HEAD_LOG_METRICS, format_args!($($arg)*));
    };
}

#[macro_export]
macro_rules! debug_with_head {
    ($($arg:tt)*) => {
        ::log::debug!("[{}] {}", $crate::HEAD_LOG_METRICS, format_args!($($arg)*));
    };
}

#[macro_export]
macro_rules! warn_with_head {
    ($($arg:tt)*) => {
        ::log::warn!("[{}] {}", $crate::HEAD_LOG_METRICS, format_args!($($arg)*));
    };
}

#[macro_export]
macro_rules! error_with_head {
    ($($arg:tt)*) => {
        ::log::error!("[{}] {}", $crate::HEAD_LOG_METRICS, format_args!($($arg)*));
    };
}
