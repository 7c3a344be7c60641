//! Precondition checks for meter transitions and the bug-report chokepoint.
//!
//! A [`Validator`] decides whether a requested transition is legal for the
//! meter's current state. Misuse comes back as [`MeterError::Usage`]; any
//! other failure during evaluation is a defect and ends up in [`log_bug`].

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use opmeter_core::{Level, LogRecord, Marker};

use crate::error::{MeterError, UsageViolation};
use crate::meter::Meter;

// ---------------------------------------------------------------------------
// Transition
// ---------------------------------------------------------------------------

/// Family of a meter method, used to pick the marker of a usage violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    Start,
    Increment,
    Progress,
    Ok,
    Reject,
    Fail,
    Close,
    /// Setters such as `iterations(n)` that run in any state.
    Configure,
}

impl Transition {
    /// Marker reported when this transition is requested from the wrong state.
    #[must_use]
    pub fn inconsistent_marker(self) -> Marker {
        match self {
            Self::Start => Marker::InconsistentStart,
            Self::Increment => Marker::InconsistentIncrement,
            Self::Progress => Marker::InconsistentProgress,
            Self::Ok => Marker::InconsistentOk,
            Self::Reject => Marker::InconsistentReject,
            Self::Fail => Marker::InconsistentFail,
            Self::Close => Marker::InconsistentClose,
            Self::Configure => Marker::IllegalArgument,
        }
    }

    /// Marker for `violation` raised by this transition.
    #[must_use]
    pub fn marker_for(self, violation: &UsageViolation) -> Marker {
        if violation.is_illegal_argument() {
            Marker::IllegalArgument
        } else {
            self.inconsistent_marker()
        }
    }
}

// ---------------------------------------------------------------------------
// Validator trait
// ---------------------------------------------------------------------------

/// Stateless precondition checker consulted before every transition.
///
/// All methods have the standard behavior as defaults; implementations
/// override only what they need to change.
pub trait Validator: Send + Sync {
    /// `start()` is legal only from CREATED.
    fn validate_start(&self, meter: &Meter) -> Result<(), MeterError> {
        if meter.start_time() != 0 {
            return Err(UsageViolation::AlreadyStarted { method: "start()" }.into());
        }
        Ok(())
    }

    /// Progress and increment methods are legal only while STARTED.
    fn validate_progress(&self, meter: &Meter, method: &'static str) -> Result<(), MeterError> {
        require_running(meter, method)
    }

    /// Terminal transitions are legal only while STARTED.
    fn validate_stop(&self, meter: &Meter, method: &'static str) -> Result<(), MeterError> {
        require_running(meter, method)
    }

    /// Outcome paths must carry some text.
    fn validate_path(&self, method: &'static str, path: &str) -> Result<(), MeterError> {
        if path.trim().is_empty() {
            return Err(UsageViolation::EmptyPath { method }.into());
        }
        Ok(())
    }

    /// `close()` is legal in every state.
    fn validate_close(&self, _meter: &Meter) -> Result<(), MeterError> {
        Ok(())
    }
}

/// The validator every factory uses unless told otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardValidator;

impl Validator for StandardValidator {}

fn require_running(meter: &Meter, method: &'static str) -> Result<(), MeterError> {
    if meter.start_time() == 0 {
        return Err(UsageViolation::NotStarted { method }.into());
    }
    if meter.stop_time() != 0 {
        return Err(UsageViolation::AlreadyStopped { method }.into());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

/// Reports a defect inside the instrumentation as a single BUG event.
///
/// Touches only the meter's immutable identity, so it is usable whatever
/// state the failed transition left behind. A sink panic here is swallowed.
pub fn log_bug(meter: &Meter, method: &str, cause: &dyn fmt::Display) {
    let _ = panic::catch_unwind(AssertUnwindSafe(|| {
        let env = meter.env();
        let logger = env.config.load().message_logger(meter.category());
        env.sink.emit(LogRecord {
            level: Level::ERROR,
            marker: Marker::Bug,
            logger,
            message: format!("meter bug in {method} on {}: {cause}", meter.full_id()),
        });
    }));
}

/// Reports caller misuse as one ERROR event tagged with `marker`.
pub(crate) fn log_violation(meter: &Meter, marker: Marker, violation: &UsageViolation) {
    let env = meter.env();
    let logger = env.config.load().message_logger(meter.category());
    if !env.sink.is_enabled(Level::ERROR, &logger) {
        return;
    }
    env.sink.emit(LogRecord {
        level: Level::ERROR,
        marker,
        logger,
        message: format!("{violation}; meter {}", meter.full_id()),
    });
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::fixture;

    #[test]
    fn start_twice_is_a_violation() {
        let (factory, _sink, _clock) = fixture();
        let mut meter = factory.meter("v");
        assert!(StandardValidator.validate_start(&meter).is_ok());
        meter.start();
        let err = StandardValidator.validate_start(&meter).unwrap_err();
        assert!(matches!(
            err,
            MeterError::Usage(UsageViolation::AlreadyStarted { .. })
        ));
    }

    #[test]
    fn stop_requires_running_meter() {
        let (factory, _sink, _clock) = fixture();
        let mut meter = factory.meter("v");
        assert!(matches!(
            StandardValidator.validate_stop(&meter, "ok()"),
            Err(MeterError::Usage(UsageViolation::NotStarted { method: "ok()" }))
        ));
        meter.start();
        assert!(StandardValidator.validate_stop(&meter, "ok()").is_ok());
        meter.ok();
        assert!(matches!(
            StandardValidator.validate_stop(&meter, "ok()"),
            Err(MeterError::Usage(UsageViolation::AlreadyStopped { .. }))
        ));
    }

    #[test]
    fn blank_path_is_rejected() {
        assert!(StandardValidator.validate_path("reject(path)", "  ").is_err());
        assert!(StandardValidator.validate_path("reject(path)", "timeout").is_ok());
    }

    #[test]
    fn markers_depend_on_transition_and_violation() {
        let state = UsageViolation::NotStarted { method: "ok()" };
        let argument = UsageViolation::EmptyPath { method: "ok(path)" };
        assert_eq!(Transition::Ok.marker_for(&state), Marker::InconsistentOk);
        assert_eq!(Transition::Ok.marker_for(&argument), Marker::IllegalArgument);
        assert_eq!(
            Transition::Increment.marker_for(&state),
            Marker::InconsistentIncrement
        );
    }

    #[test]
    fn log_bug_emits_single_bug_event() {
        let (factory, sink, _clock) = fixture();
        let meter = factory.operation_meter("svc", "load");
        log_bug(&meter, "ok()", &"broken invariant");
        let bugs = sink.with_marker(Marker::Bug);
        assert_eq!(bugs.len(), 1);
        assert_eq!(bugs[0].level, Level::ERROR);
        assert!(bugs[0].message.contains("ok()"));
        assert!(bugs[0].message.contains("broken invariant"));
        assert!(bugs[0].message.contains("svc/load#1"));
    }

    struct PanickingSink;

    impl opmeter_core::LogSink for PanickingSink {
        fn emit(&self, _record: LogRecord) {
            panic!("sink exploded");
        }
    }

    #[test]
    fn log_bug_survives_panicking_sink() {
        let factory = crate::MeterFactory::new(Arc::new(PanickingSink));
        let meter = factory.meter("v");
        // Reaching the end of the test is the assertion.
        log_bug(&meter, "start()", &"cause");
    }
}
