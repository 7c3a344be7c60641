//! Markers classifying every event a meter emits.
//!
//! Message markers tag the human-readable line, data markers tag the
//! machine-readable record, and the remaining markers tag diagnostics
//! produced when a meter is misused or misbehaves.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification attached to each [`LogRecord`](crate::LogRecord).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Marker {
    MsgStart,
    MsgProgress,
    MsgOk,
    MsgSlowOk,
    MsgReject,
    MsgFail,
    DataStart,
    DataProgress,
    DataOk,
    DataSlowOk,
    DataReject,
    DataFail,
    /// The instrumentation itself failed.
    Bug,
    /// An argument passed to a meter method was not acceptable.
    IllegalArgument,
    InconsistentStart,
    InconsistentIncrement,
    InconsistentProgress,
    InconsistentOk,
    InconsistentReject,
    InconsistentFail,
    InconsistentClose,
}

impl Marker {
    /// Stable upper-case name, as written to sinks.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MsgStart => "MSG_START",
            Self::MsgProgress => "MSG_PROGRESS",
            Self::MsgOk => "MSG_OK",
            Self::MsgSlowOk => "MSG_SLOW_OK",
            Self::MsgReject => "MSG_REJECT",
            Self::MsgFail => "MSG_FAIL",
            Self::DataStart => "DATA_START",
            Self::DataProgress => "DATA_PROGRESS",
            Self::DataOk => "DATA_OK",
            Self::DataSlowOk => "DATA_SLOW_OK",
            Self::DataReject => "DATA_REJECT",
            Self::DataFail => "DATA_FAIL",
            Self::Bug => "BUG",
            Self::IllegalArgument => "ILLEGAL_ARGUMENT",
            Self::InconsistentStart => "INCONSISTENT_START",
            Self::InconsistentIncrement => "INCONSISTENT_INCREMENT",
            Self::InconsistentProgress => "INCONSISTENT_PROGRESS",
            Self::InconsistentOk => "INCONSISTENT_OK",
            Self::InconsistentReject => "INCONSISTENT_REJECT",
            Self::InconsistentFail => "INCONSISTENT_FAIL",
            Self::InconsistentClose => "INCONSISTENT_CLOSE",
        }
    }

    /// True for markers that tag a structured data record.
    #[must_use]
    pub fn is_data(self) -> bool {
        matches!(
            self,
            Self::DataStart
                | Self::DataProgress
                | Self::DataOk
                | Self::DataSlowOk
                | Self::DataReject
                | Self::DataFail
        )
    }

    /// True for markers produced by usage checks (misuse, not defects).
    #[must_use]
    pub fn is_inconsistent(self) -> bool {
        matches!(
            self,
            Self::IllegalArgument
                | Self::InconsistentStart
                | Self::InconsistentIncrement
                | Self::InconsistentProgress
                | Self::InconsistentOk
                | Self::InconsistentReject
                | Self::InconsistentFail
                | Self::InconsistentClose
        )
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_markers_are_classified() {
        assert!(Marker::DataOk.is_data());
        assert!(Marker::DataSlowOk.is_data());
        assert!(!Marker::MsgOk.is_data());
        assert!(!Marker::Bug.is_data());
    }

    #[test]
    fn bug_is_not_an_inconsistency() {
        assert!(!Marker::Bug.is_inconsistent());
        assert!(Marker::InconsistentClose.is_inconsistent());
        assert!(Marker::IllegalArgument.is_inconsistent());
    }

    #[test]
    fn serde_name_matches_display() {
        let json = serde_json::to_string(&Marker::InconsistentOk).unwrap();
        assert_eq!(json, "\"INCONSISTENT_OK\"");
        assert_eq!(Marker::InconsistentOk.to_string(), "INCONSISTENT_OK");
    }
}
