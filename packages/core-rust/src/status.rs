//! Resource snapshot carried by every meter.
//!
//! The collection mechanism is not part of this crate: a [`StatusSampler`]
//! implementation fills the gauges, and a meter without one keeps them at zero.

use serde::{Deserialize, Serialize};

/// Numeric gauges describing the process at the time of an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub heap_committed: u64,
    pub heap_used: u64,
    pub heap_max: u64,
    pub non_heap_committed: u64,
    pub non_heap_used: u64,
    pub non_heap_max: u64,
    pub gc_count: u64,
    pub gc_time: u64,
    pub class_loading_total: u64,
    pub class_loading_loaded: u64,
    pub class_loading_unloaded: u64,
    pub compilation_time: u64,
    pub system_load: f64,
}

impl SystemStatus {
    /// True when no gauge has been populated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Populates a [`SystemStatus`] from whatever source the host provides.
pub trait StatusSampler: Send + Sync {
    fn sample(&self, status: &mut SystemStatus);
}
