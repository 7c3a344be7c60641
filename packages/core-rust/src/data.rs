//! Machine-readable snapshot of a meter, written to the data channel.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::status::SystemStatus;

/// Everything a meter knows at the moment an event is emitted.
///
/// Serialized as compact JSON. Unset fields (zero timestamps, empty paths,
/// empty context, unsampled status) are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterData {
    pub session: String,
    pub position: i64,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub create_time: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub start_time: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub stop_time: u64,
    pub last_current_time: u64,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub iteration: i64,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub expected_iterations: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub time_limit: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reject_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub slow: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
    #[serde(flatten)]
    pub status: Option<SystemStatus>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(value: &u64) -> bool {
    *value == 0
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero_i64(value: &i64) -> bool {
    *value == 0
}

impl MeterData {
    /// Identifier in the form `category[/operation]#position`.
    #[must_use]
    pub fn full_id(&self) -> String {
        match &self.operation {
            Some(op) => format!("{}/{op}#{}", self.category, self.position),
            None => format!("{}#{}", self.category, self.position),
        }
    }

    /// Nanoseconds between start and stop (or `now` while running); zero
    /// before start.
    #[must_use]
    pub fn elapsed_at(&self, now: u64) -> u64 {
        if self.start_time == 0 {
            return 0;
        }
        let end = if self.stop_time == 0 { now } else { self.stop_time };
        end.saturating_sub(self.start_time)
    }

    /// Compact JSON rendering used as the data record body.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; never expected for this type.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
