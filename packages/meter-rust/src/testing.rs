//! Shared fixtures for unit tests.

use std::sync::Arc;
use std::time::Duration;

use opmeter_core::{ManualClock, MemorySink, MeterConfig};

use crate::factory::{MeterFactory, MeterFactoryBuilder};

/// Factory writing to a fresh [`MemorySink`], driven by a manual clock
/// starting at tick 1000, with progress throttling disabled.
pub(crate) fn fixture() -> (MeterFactory, Arc<MemorySink>, Arc<ManualClock>) {
    fixture_with(|builder| builder)
}

/// Like [`fixture`], letting the test replace further collaborators.
pub(crate) fn fixture_with<F>(customize: F) -> (MeterFactory, Arc<MemorySink>, Arc<ManualClock>)
where
    F: FnOnce(MeterFactoryBuilder) -> MeterFactoryBuilder,
{
    let sink = Arc::new(MemorySink::new());
    let clock = Arc::new(ManualClock::new(1_000));
    let config = MeterConfig {
        progress_period: Duration::ZERO,
        ..MeterConfig::default()
    };
    let builder = MeterFactory::builder(Arc::clone(&sink) as Arc<dyn opmeter_core::LogSink>)
        .config(config)
        .clock(Arc::clone(&clock) as Arc<dyn opmeter_core::ClockSource>)
        .session_id("test-session");
    (customize(builder).build(), sink, clock)
}
