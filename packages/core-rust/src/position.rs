//! Per-operation sequence numbers.
//!
//! Every meter receives a position unique within its (category, operation)
//! key. Counters live for the lifetime of the registry and are never removed.

use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;

/// Builds the registry key for a category and optional operation name.
///
/// `"category"` when there is no operation, `"category/operation"` otherwise.
#[must_use]
pub fn position_key(category: &str, operation: Option<&str>) -> String {
    match operation {
        Some(op) => format!("{category}/{op}"),
        None => category.to_string(),
    }
}

/// Concurrent map from key to an atomic sequence counter.
#[derive(Debug, Default)]
pub struct PositionRegistry {
    counters: DashMap<String, AtomicI64>,
}

impl PositionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            counters: DashMap::new(),
        }
    }

    /// Atomically advances the counter for `key` and returns the new value.
    ///
    /// A missing counter starts at 0, so the first position handed out is 1.
    /// When the counter sits at `i64::MAX` the next value is 1.
    pub fn next_position(&self, key: &str) -> i64 {
        if let Some(counter) = self.counters.get(key) {
            return advance(&counter);
        }
        let counter = self
            .counters
            .entry(key.to_string())
            .or_insert_with(|| AtomicI64::new(0));
        advance(&counter)
    }

    /// Overwrites the counter for `key`; the next position will be `value + 1`
    /// (or 1 when `value == i64::MAX`).
    pub fn seed(&self, key: &str, value: i64) {
        self.counters
            .entry(key.to_string())
            .or_insert_with(|| AtomicI64::new(0))
            .store(value, Ordering::SeqCst);
    }

    /// Last position handed out for `key`, or 0 when the key was never seen.
    #[must_use]
    pub fn current(&self, key: &str) -> i64 {
        self.counters
            .get(key)
            .map_or(0, |counter| counter.load(Ordering::SeqCst))
    }

    /// Number of distinct keys seen so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

fn advance(counter: &AtomicI64) -> i64 {
    let previous = counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| Some(successor(v)))
        .unwrap_or_else(|v| v);
    successor(previous)
}

fn successor(value: i64) -> i64 {
    if value == i64::MAX {
        1
    } else {
        value + 1
    }
}
