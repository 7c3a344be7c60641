//! `opmeter` — operation lifecycle meters.
//!
//! A [`Meter`] wraps one execution of a unit of work, records its timing and
//! outcome, and reports each lifecycle step as a pair of events: a readable
//! message and a JSON data record. Misuse and internal defects are reported as
//! diagnostic events and never propagate into the instrumented code.
//!
//! ```no_run
//! use opmeter::MeterFactory;
//!
//! let mut meter = MeterFactory::global().operation_meter("billing", "invoice");
//! meter.ctx("customer", 42).start();
//! // ... work ...
//! meter.ok_with("cached");
//! ```

pub mod call;
pub mod context;
pub mod error;
pub mod factory;
pub mod meter;
pub mod validator;

#[cfg(test)]
mod testing;

pub use call::ResultValue;
pub use context::{CurrentMeter, FALLBACK_CATEGORY};
pub use error::{MeterError, UsageViolation};
pub use factory::{MeterFactory, MeterFactoryBuilder};
pub use meter::{Meter, PANIC_PATH, UNTERMINATED_PATH};
pub use validator::{log_bug, StandardValidator, Transition, Validator};

pub use opmeter_core::{
    ClockSource, ConfigError, EventKind, Level, LogRecord, LogSink, ManualClock, Marker,
    MemorySink, MeterConfig, MeterData, MeterState, MonotonicClock, Outcome, StatusSampler,
    SystemStatus, TracingSink,
};

/// Meter for `category` from the process-wide factory.
#[must_use]
pub fn meter(category: impl Into<String>) -> Meter {
    MeterFactory::global().meter(category)
}

/// The operation running on this thread, see [`MeterFactory::current_meter`].
#[must_use]
pub fn current_meter() -> CurrentMeter {
    MeterFactory::global().current_meter()
}

/// Child of the operation running on this thread, from the process-wide factory.
#[must_use]
pub fn current_sub_meter(name: &str) -> Meter {
    MeterFactory::global().current_sub_meter(name)
}

/// Meter from the process-wide factory, categorized by the calling module.
///
/// `meter!()` measures the module itself; `meter!("op")` measures operation
/// `op` within it.
#[macro_export]
macro_rules! meter {
    () => {
        $crate::MeterFactory::global().meter(::core::module_path!())
    };
    ($operation:expr) => {
        $crate::MeterFactory::global().operation_meter(::core::module_path!(), $operation)
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }

    #[test]
    fn macro_uses_module_path() {
        let meter = meter!("macro-op");
        assert_eq!(meter.category(), module_path!());
        assert_eq!(meter.operation(), Some("macro-op"));
        assert_eq!(crate::meter!().operation(), None);
    }
}
