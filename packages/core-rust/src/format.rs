//! Human-readable message rendering.
//!
//! Layout: `LABEL: name#pos; description; i/n [path]; result=v; message; elapsed; k=v ...`
//! where each part is present only when configured and set.

use std::fmt::Write;

use crate::config::MeterConfig;
use crate::data::MeterData;
use crate::types::EventKind;

/// Renders the message line for `kind`, reading elapsed time at `now`.
#[must_use]
pub fn readable_message(data: &MeterData, kind: EventKind, config: &MeterConfig, now: u64) -> String {
    let mut out = String::with_capacity(96);

    if config.print_status {
        out.push_str(kind.label());
        out.push_str(": ");
    }

    match (&data.operation, config.print_category) {
        (Some(op), true) => {
            let _ = write!(out, "{}/{op}", data.category);
        }
        (Some(op), false) => out.push_str(op),
        (None, _) => out.push_str(&data.category),
    }
    if config.print_position {
        let _ = write!(out, "#{}", data.position);
    }

    if let Some(description) = &data.description {
        let _ = write!(out, "; {description}");
    }

    if data.iteration > 0 || data.expected_iterations > 0 {
        if data.expected_iterations > 0 {
            let _ = write!(out, "; {}/{}", data.iteration, data.expected_iterations);
        } else {
            let _ = write!(out, "; {}", data.iteration);
        }
    }

    let path = data
        .ok_path
        .as_deref()
        .or(data.reject_path.as_deref())
        .or(data.fail_path.as_deref());
    if let Some(path) = path {
        let _ = write!(out, " [{path}]");
    }
    if let Some(result) = &data.result {
        let _ = write!(out, "; result={result}");
    }
    if let Some(message) = &data.fail_message {
        let _ = write!(out, "; {message}");
    }

    if kind != EventKind::Start {
        let _ = write!(out, "; {}", format_nanos(data.elapsed_at(now)));
    }

    for (key, value) in &data.context {
        if value.is_empty() {
            let _ = write!(out, "; {key}");
        } else {
            let _ = write!(out, "; {key}={value}");
        }
    }

    if let Some(status) = &data.status {
        if config.print_memory && status.heap_max > 0 {
            let _ = write!(
                out,
                "; heap {}/{}",
                format_bytes(status.heap_used),
                format_bytes(status.heap_max)
            );
        }
        if config.print_load && status.system_load > 0.0 {
            let _ = write!(out, "; load {:.1}", status.system_load);
        }
    }

    out
}

/// Formats a nanosecond interval with a unit suited to its magnitude.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_nanos(nanos: u64) -> String {
    let value = nanos as f64;
    if nanos < 1_000 {
        format!("{nanos}ns")
    } else if nanos < 1_000_000 {
        format!("{:.1}us", value / 1e3)
    } else if nanos < 1_000_000_000 {
        format!("{:.1}ms", value / 1e6)
    } else if nanos < 60_000_000_000 {
        format!("{:.1}s", value / 1e9)
    } else {
        format!("{:.1}min", value / 60e9)
    }
}

/// Formats a byte count with a binary unit.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["kB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{bytes}B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1}{}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::SystemStatus;

    fn running() -> MeterData {
        MeterData {
            session: "s".to_string(),
            position: 4,
            category: "billing".to_string(),
            operation: Some("invoice".to_string()),
            create_time: 1,
            start_time: 1_000,
            last_current_time: 1_000,
            ..MeterData::default()
        }
    }

    #[test]
    fn start_message_has_label_and_operation() {
        let msg = readable_message(&running(), EventKind::Start, &MeterConfig::default(), 5_000);
        assert_eq!(msg, "STARTED: invoice");
    }

    #[test]
    fn category_and_position_are_optional() {
        let config = MeterConfig {
            print_category: true,
            print_position: true,
            print_status: false,
            ..MeterConfig::default()
        };
        let msg = readable_message(&running(), EventKind::Start, &config, 5_000);
        assert_eq!(msg, "billing/invoice#4");
    }

    #[test]
    fn ok_message_carries_path_result_and_elapsed() {
        let mut data = running();
        data.stop_time = 3_500;
        data.ok_path = Some("cached".to_string());
        data.result = Some("42".to_string());
        let msg = readable_message(&data, EventKind::Ok, &MeterConfig::default(), 9_999);
        assert_eq!(msg, "OK: invoice [cached]; result=42; 2.5us");
    }

    #[test]
    fn fail_message_carries_cause() {
        let mut data = running();
        data.stop_time = 1_000;
        data.fail_path = Some("io::Error".to_string());
        data.fail_message = Some("disk full".to_string());
        let msg = readable_message(&data, EventKind::Fail, &MeterConfig::default(), 0);
        assert!(msg.starts_with("FAIL: invoice [io::Error]; disk full"));
    }

    #[test]
    fn progress_shows_iterations_and_context() {
        let mut data = running();
        data.iteration = 3;
        data.expected_iterations = 10;
        data.context.insert("batch".to_string(), "7".to_string());
        data.context.insert("dry-run".to_string(), String::new());
        let msg = readable_message(&data, EventKind::Progress, &MeterConfig::default(), 2_000);
        assert_eq!(msg, "PROGRESS: invoice; 3/10; 1.0us; batch=7; dry-run");
    }

    #[test]
    fn memory_and_load_only_when_enabled() {
        let mut data = running();
        data.status = Some(SystemStatus {
            heap_used: 512 * 1024,
            heap_max: 2 * 1024 * 1024,
            system_load: 1.3,
            ..SystemStatus::default()
        });
        let quiet = readable_message(&data, EventKind::Start, &MeterConfig::default(), 0);
        assert_eq!(quiet, "STARTED: invoice");

        let config = MeterConfig {
            print_memory: true,
            print_load: true,
            ..MeterConfig::default()
        };
        let loud = readable_message(&data, EventKind::Start, &config, 0);
        assert_eq!(loud, "STARTED: invoice; heap 512.0kB/2.0MB; load 1.3");
    }

    #[test]
    fn nanos_pick_a_unit() {
        assert_eq!(format_nanos(850), "850ns");
        assert_eq!(format_nanos(12_300), "12.3us");
        assert_eq!(format_nanos(4_500_000), "4.5ms");
        assert_eq!(format_nanos(1_200_000_000), "1.2s");
        assert_eq!(format_nanos(120_000_000_000), "2.0min");
    }

    #[test]
    fn bytes_pick_a_unit() {
        assert_eq!(format_bytes(100), "100B");
        assert_eq!(format_bytes(2048), "2.0kB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0GB");
    }
}
