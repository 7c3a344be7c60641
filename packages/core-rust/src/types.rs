use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::marker::Marker;

/// Terminal classification of a meter.
///
/// `Pending` until one of the terminal transitions succeeds; afterwards
/// exactly one of the other variants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    #[default]
    Pending,
    Ok { path: Option<String> },
    Rejected { path: String },
    Failed { path: String, message: Option<String> },
}

impl Outcome {
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    #[must_use]
    pub fn ok_path(&self) -> Option<&str> {
        match self {
            Self::Ok { path } => path.as_deref(),
            _ => None,
        }
    }

    #[must_use]
    pub fn reject_path(&self) -> Option<&str> {
        match self {
            Self::Rejected { path } => Some(path),
            _ => None,
        }
    }

    #[must_use]
    pub fn fail_path(&self) -> Option<&str> {
        match self {
            Self::Failed { path, .. } => Some(path),
            _ => None,
        }
    }

    #[must_use]
    pub fn fail_message(&self) -> Option<&str> {
        match self {
            Self::Failed { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}

/// Lifecycle position of a meter: `Created -> Started -> {Ok | Rejected | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeterState {
    Created,
    Started,
    Ok,
    Rejected,
    Failed,
}

impl MeterState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ok | Self::Rejected | Self::Failed)
    }
}

/// Lifecycle event a meter reports as a message/data pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Start,
    Progress,
    Ok,
    SlowOk,
    Reject,
    Fail,
}

impl EventKind {
    /// Label printed at the head of human-readable messages.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Start => "STARTED",
            Self::Progress => "PROGRESS",
            Self::Ok => "OK",
            Self::SlowOk => "SLOW",
            Self::Reject => "REJECT",
            Self::Fail => "FAIL",
        }
    }

    #[must_use]
    pub fn message_marker(self) -> Marker {
        match self {
            Self::Start => Marker::MsgStart,
            Self::Progress => Marker::MsgProgress,
            Self::Ok => Marker::MsgOk,
            Self::SlowOk => Marker::MsgSlowOk,
            Self::Reject => Marker::MsgReject,
            Self::Fail => Marker::MsgFail,
        }
    }

    #[must_use]
    pub fn data_marker(self) -> Marker {
        match self {
            Self::Start => Marker::DataStart,
            Self::Progress => Marker::DataProgress,
            Self::Ok => Marker::DataOk,
            Self::SlowOk => Marker::DataSlowOk,
            Self::Reject => Marker::DataReject,
            Self::Fail => Marker::DataFail,
        }
    }

    /// Severity of the human-readable message. Data records are always TRACE.
    #[must_use]
    pub fn message_level(self) -> Level {
        match self {
            Self::Start => Level::DEBUG,
            Self::Progress | Self::Ok | Self::Reject => Level::INFO,
            Self::SlowOk => Level::WARN,
            Self::Fail => Level::ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_outcome_has_no_paths() {
        let outcome = Outcome::default();
        assert!(outcome.is_pending());
        assert_eq!(outcome.ok_path(), None);
        assert_eq!(outcome.reject_path(), None);
        assert_eq!(outcome.fail_path(), None);
        assert_eq!(outcome.fail_message(), None);
    }

    #[test]
    fn paths_are_mutually_exclusive() {
        let failed = Outcome::Failed {
            path: "io".to_string(),
            message: Some("disk full".to_string()),
        };
        assert_eq!(failed.fail_path(), Some("io"));
        assert_eq!(failed.fail_message(), Some("disk full"));
        assert_eq!(failed.ok_path(), None);
        assert_eq!(failed.reject_path(), None);
    }

    #[test]
    fn severities_follow_outcome() {
        assert_eq!(EventKind::Start.message_level(), Level::DEBUG);
        assert_eq!(EventKind::Reject.message_level(), Level::INFO);
        assert_eq!(EventKind::SlowOk.message_level(), Level::WARN);
        assert_eq!(EventKind::Fail.message_level(), Level::ERROR);
    }

    #[test]
    fn markers_pair_up() {
        for kind in [
            EventKind::Start,
            EventKind::Progress,
            EventKind::Ok,
            EventKind::SlowOk,
            EventKind::Reject,
            EventKind::Fail,
        ] {
            assert!(!kind.message_marker().is_data());
            assert!(kind.data_marker().is_data());
        }
    }
}
