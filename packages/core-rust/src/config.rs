//! Meter configuration.
//!
//! Controls progress throttling, which parts of the human-readable message
//! are printed, and how sink logger names are decorated.

use std::time::Duration;

/// Environment variables read by [`MeterConfig::from_env`].
pub mod env_keys {
    pub const PROGRESS_PERIOD_MS: &str = "OPMETER_PROGRESS_PERIOD_MS";
    pub const PRINT_CATEGORY: &str = "OPMETER_PRINT_CATEGORY";
    pub const PRINT_STATUS: &str = "OPMETER_PRINT_STATUS";
    pub const PRINT_POSITION: &str = "OPMETER_PRINT_POSITION";
    pub const PRINT_MEMORY: &str = "OPMETER_PRINT_MEMORY";
    pub const PRINT_LOAD: &str = "OPMETER_PRINT_LOAD";
    pub const MESSAGE_PREFIX: &str = "OPMETER_MESSAGE_PREFIX";
    pub const MESSAGE_SUFFIX: &str = "OPMETER_MESSAGE_SUFFIX";
    pub const DATA_PREFIX: &str = "OPMETER_DATA_PREFIX";
    pub const DATA_SUFFIX: &str = "OPMETER_DATA_SUFFIX";
}

/// Errors from reading configuration out of the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key}: expected a non-negative integer, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },
    #[error("{key}: expected true/false, got {value:?}")]
    InvalidBool { key: &'static str, value: String },
}

/// Runtime configuration shared by all meters of a factory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeterConfig {
    /// Minimum time between two emitted progress events. Zero never suppresses.
    pub progress_period: Duration,
    /// Include the category in human-readable messages.
    pub print_category: bool,
    /// Include the status label (`OK`, `FAIL`, ...) in human-readable messages.
    pub print_status: bool,
    /// Include the `#position` suffix in human-readable messages.
    pub print_position: bool,
    /// Include heap usage when a status sampler populated it.
    pub print_memory: bool,
    /// Include system load when a status sampler populated it.
    pub print_load: bool,
    pub message_prefix: String,
    pub message_suffix: String,
    pub data_prefix: String,
    pub data_suffix: String,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            progress_period: Duration::from_secs(2),
            print_category: false,
            print_status: true,
            print_position: false,
            print_memory: false,
            print_load: false,
            message_prefix: String::new(),
            message_suffix: String::new(),
            data_prefix: "data.".to_string(),
            data_suffix: String::new(),
        }
    }
}

impl MeterConfig {
    /// Logger name for the human-readable channel of `category`.
    #[must_use]
    pub fn message_logger(&self, category: &str) -> String {
        format!("{}{category}{}", self.message_prefix, self.message_suffix)
    }

    /// Logger name for the structured data channel of `category`.
    #[must_use]
    pub fn data_logger(&self, category: &str) -> String {
        format!("{}{category}{}", self.data_prefix, self.data_suffix)
    }

    /// Reads the configuration from `OPMETER_*` environment variables,
    /// falling back to defaults for unset ones.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable is set to an unparseable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable is set to an unparseable value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(env_keys::PROGRESS_PERIOD_MS) {
            let millis = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidNumber {
                    key: env_keys::PROGRESS_PERIOD_MS,
                    value: raw.clone(),
                })?;
            config.progress_period = Duration::from_millis(millis);
        }

        let flags: [(&'static str, &mut bool); 5] = [
            (env_keys::PRINT_CATEGORY, &mut config.print_category),
            (env_keys::PRINT_STATUS, &mut config.print_status),
            (env_keys::PRINT_POSITION, &mut config.print_position),
            (env_keys::PRINT_MEMORY, &mut config.print_memory),
            (env_keys::PRINT_LOAD, &mut config.print_load),
        ];
        for (key, slot) in flags {
            if let Some(raw) = lookup(key) {
                *slot = parse_bool(key, &raw)?;
            }
        }

        let names: [(&'static str, &mut String); 4] = [
            (env_keys::MESSAGE_PREFIX, &mut config.message_prefix),
            (env_keys::MESSAGE_SUFFIX, &mut config.message_suffix),
            (env_keys::DATA_PREFIX, &mut config.data_prefix),
            (env_keys::DATA_SUFFIX, &mut config.data_suffix),
        ];
        for (key, slot) in names {
            if let Some(raw) = lookup(key) {
                *slot = raw;
            }
        }

        Ok(config)
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key,
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_values() {
        let config = MeterConfig::default();
        assert_eq!(config.progress_period, Duration::from_secs(2));
        assert!(config.print_status);
        assert!(!config.print_category);
        assert_eq!(config.data_prefix, "data.");
    }

    #[test]
    fn logger_names_are_decorated() {
        let config = MeterConfig {
            message_prefix: "msg.".to_string(),
            message_suffix: ".out".to_string(),
            ..MeterConfig::default()
        };
        assert_eq!(config.message_logger("db"), "msg.db.out");
        assert_eq!(config.data_logger("db"), "data.db");
    }

    #[test]
    fn empty_lookup_yields_defaults() {
        let config = MeterConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, MeterConfig::default());
    }

    #[test]
    fn lookup_overrides_fields() {
        let config = MeterConfig::from_lookup(lookup_from(&[
            (env_keys::PROGRESS_PERIOD_MS, "0"),
            (env_keys::PRINT_CATEGORY, "yes"),
            (env_keys::PRINT_STATUS, "false"),
            (env_keys::DATA_SUFFIX, ".json"),
        ]))
        .unwrap();
        assert_eq!(config.progress_period, Duration::ZERO);
        assert!(config.print_category);
        assert!(!config.print_status);
        assert_eq!(config.data_logger("x"), "data.x.json");
    }

    #[test]
    fn malformed_number_is_rejected() {
        let err = MeterConfig::from_lookup(lookup_from(&[(env_keys::PROGRESS_PERIOD_MS, "-5")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { .. }));
    }

    #[test]
    fn malformed_bool_is_rejected() {
        let err = MeterConfig::from_lookup(lookup_from(&[(env_keys::PRINT_LOAD, "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBool { key, .. } if key == env_keys::PRINT_LOAD));
    }
}
