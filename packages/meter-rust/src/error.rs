use std::any::Any;

/// Caller misuse of a meter: a transition requested from the wrong state,
/// or an argument the meter cannot accept.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsageViolation {
    #[error("{method} called on a meter that was already started")]
    AlreadyStarted { method: &'static str },
    #[error("{method} called before start()")]
    NotStarted { method: &'static str },
    #[error("{method} called after the meter already stopped")]
    AlreadyStopped { method: &'static str },
    #[error("{method} requires a non-empty path")]
    EmptyPath { method: &'static str },
    #[error("{method} requires a positive argument, got {value}")]
    NonPositive { method: &'static str, value: i64 },
    #[error("{method} cannot move the iteration from {current} back to {requested}")]
    IterationBackwards {
        method: &'static str,
        current: i64,
        requested: i64,
    },
}

impl UsageViolation {
    /// True when the argument, not the lifecycle state, was wrong.
    #[must_use]
    pub fn is_illegal_argument(&self) -> bool {
        matches!(
            self,
            Self::EmptyPath { .. } | Self::NonPositive { .. } | Self::IterationBackwards { .. }
        )
    }
}

/// Errors raised while a meter evaluates a transition.
#[derive(Debug, thiserror::Error)]
pub enum MeterError {
    /// Reported with an INCONSISTENT_* or ILLEGAL_ARGUMENT event.
    #[error(transparent)]
    Usage(#[from] UsageViolation),
    /// Defect in the instrumentation itself; reported with a BUG event.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
