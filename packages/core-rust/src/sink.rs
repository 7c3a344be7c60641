//! Log sink contract and the two bundled sinks.
//!
//! - [`TracingSink`]: forwards every record to the `tracing` crate
//! - [`MemorySink`]: keeps records in memory for assertions and embedding

use parking_lot::Mutex;
use tracing::Level;

use crate::marker::Marker;

// ---------------------------------------------------------------------------
// LogRecord
// ---------------------------------------------------------------------------

/// A single event handed to a sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: Level,
    pub marker: Marker,
    /// Decorated logger name (message or data channel of a category).
    pub logger: String,
    /// Human-readable line, or the JSON body for data records.
    pub message: String,
}

// ---------------------------------------------------------------------------
// LogSink trait
// ---------------------------------------------------------------------------

/// Destination of meter events.
///
/// Calls arrive synchronously and in lifecycle order for each meter.
/// Implementations must not panic; a panicking sink is reported as a meter bug.
pub trait LogSink: Send + Sync {
    /// Whether records at `level` for `logger` would be kept. Lets meters
    /// skip building records nobody reads.
    fn is_enabled(&self, _level: Level, _logger: &str) -> bool {
        true
    }

    fn emit(&self, record: LogRecord);
}

// ---------------------------------------------------------------------------
// TracingSink
// ---------------------------------------------------------------------------

/// Target used for every event forwarded by [`TracingSink`].
pub const TRACING_TARGET: &str = "opmeter";

/// Sink forwarding records as `tracing` events with `logger` and `marker` fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

macro_rules! forward {
    ($level:expr, $record:expr) => {
        tracing::event!(
            target: TRACING_TARGET,
            $level,
            logger = %$record.logger,
            marker = $record.marker.as_str(),
            "{}",
            $record.message
        )
    };
}

impl LogSink for TracingSink {
    fn is_enabled(&self, level: Level, _logger: &str) -> bool {
        match level {
            Level::ERROR => tracing::enabled!(target: TRACING_TARGET, Level::ERROR),
            Level::WARN => tracing::enabled!(target: TRACING_TARGET, Level::WARN),
            Level::INFO => tracing::enabled!(target: TRACING_TARGET, Level::INFO),
            Level::DEBUG => tracing::enabled!(target: TRACING_TARGET, Level::DEBUG),
            _ => tracing::enabled!(target: TRACING_TARGET, Level::TRACE),
        }
    }

    fn emit(&self, record: LogRecord) {
        match record.level {
            Level::ERROR => forward!(Level::ERROR, record),
            Level::WARN => forward!(Level::WARN, record),
            Level::INFO => forward!(Level::INFO, record),
            Level::DEBUG => forward!(Level::DEBUG, record),
            _ => forward!(Level::TRACE, record),
        }
    }
}

// ---------------------------------------------------------------------------
// MemorySink
// ---------------------------------------------------------------------------

/// Sink that appends every record to an in-memory list.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all records received so far, in arrival order.
    #[must_use]
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    /// Removes and returns all records received so far.
    pub fn take(&self) -> Vec<LogRecord> {
        std::mem::take(&mut *self.records.lock())
    }

    /// Markers of all records, in arrival order.
    #[must_use]
    pub fn markers(&self) -> Vec<Marker> {
        self.records.lock().iter().map(|r| r.marker).collect()
    }

    /// Records tagged with `marker`.
    #[must_use]
    pub fn with_marker(&self, marker: Marker) -> Vec<LogRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.marker == marker)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn count(&self, marker: Marker) -> usize {
        self.records.lock().iter().filter(|r| r.marker == marker).count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl LogSink for MemorySink {
    fn emit(&self, record: LogRecord) {
        self.records.lock().push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(marker: Marker) -> LogRecord {
        LogRecord {
            level: Level::INFO,
            marker,
            logger: "app".to_string(),
            message: "hello".to_string(),
        }
    }

    #[test]
    fn memory_sink_keeps_order() {
        let sink = MemorySink::new();
        sink.emit(record(Marker::MsgStart));
        sink.emit(record(Marker::DataStart));
        sink.emit(record(Marker::MsgOk));
        assert_eq!(
            sink.markers(),
            vec![Marker::MsgStart, Marker::DataStart, Marker::MsgOk]
        );
        assert_eq!(sink.count(Marker::MsgOk), 1);
        assert_eq!(sink.with_marker(Marker::DataStart).len(), 1);
    }

    #[test]
    fn take_drains_records() {
        let sink = MemorySink::new();
        sink.emit(record(Marker::Bug));
        assert_eq!(sink.take().len(), 1);
        assert!(sink.is_empty());
    }

    #[test]
    fn tracing_sink_without_subscriber_is_silent() {
        // No subscriber installed: nothing is enabled and emitting is a no-op.
        let sink = TracingSink;
        assert!(!sink.is_enabled(Level::ERROR, "app"));
        sink.emit(record(Marker::MsgFail));
    }
}
