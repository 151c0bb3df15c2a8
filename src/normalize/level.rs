//! Total severity mapping from heterogeneous source levels.
//!
//! Every function here is total: any input maps to exactly one canonical
//! level, with `Info` as the fallback for anything unrecognized. This is a
//! deliberate fail-open contract for parsing — a log line must never be
//! dropped because its level field is garbage.

use crate::domain::LogLevel;
use serde_json::Value;

/// Map any level-shaped JSON value to a canonical level.
///
/// Numbers follow Pino/Bunyan thresholds; strings go through the synonym
/// table. Anything else (null, arrays, objects) maps to `Info`.
#[must_use]
pub fn normalize_level(value: &Value) -> LogLevel {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map_or(LogLevel::Info, level_from_number),
        Value::String(s) => level_from_text(s),
        _ => LogLevel::Info,
    }
}

/// Pino/Bunyan numeric levels: 10 trace, 20 debug, 30 info, 40 warn,
/// 50 error, 60 fatal.
#[must_use]
pub fn level_from_number(n: i64) -> LogLevel {
    if n >= 60 {
        LogLevel::Critical
    } else if n >= 50 {
        LogLevel::Error
    } else if n >= 40 {
        LogLevel::Warn
    } else if n >= 30 {
        LogLevel::Info
    } else {
        LogLevel::Debug
    }
}

/// Syslog PRIORITY 0-7 (RFC 5424 severities).
#[must_use]
pub fn level_from_syslog_priority(priority: u8) -> LogLevel {
    match priority {
        0..=2 => LogLevel::Critical,
        3 => LogLevel::Error,
        4 => LogLevel::Warn,
        5 | 6 => LogLevel::Info,
        _ => LogLevel::Debug,
    }
}

/// Case-insensitive textual level mapping.
///
/// Canonical names pass through; syslog severity words and common
/// framework synonyms fold to their canonical level. A string that parses
/// as a number is treated numerically (Pino exporters sometimes emit
/// `"level": "30"`).
#[must_use]
pub fn level_from_text(text: &str) -> LogLevel {
    let lower = text.trim().to_ascii_lowercase();
    if let Ok(n) = lower.parse::<i64>() {
        return level_from_number(n);
    }
    match lower.as_str() {
        "debug" | "trace" | "verbose" => LogLevel::Debug,
        "info" | "notice" | "information" => LogLevel::Info,
        "warn" | "warning" => LogLevel::Warn,
        "error" | "err" => LogLevel::Error,
        "critical" | "crit" | "fatal" | "alert" | "emergency" | "emerg" | "panic" => {
            LogLevel::Critical
        }
        _ => LogLevel::Info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pino_thresholds() {
        assert_eq!(level_from_number(10), LogLevel::Debug);
        assert_eq!(level_from_number(20), LogLevel::Debug);
        assert_eq!(level_from_number(30), LogLevel::Info);
        assert_eq!(level_from_number(40), LogLevel::Warn);
        assert_eq!(level_from_number(50), LogLevel::Error);
        assert_eq!(level_from_number(60), LogLevel::Critical);
        assert_eq!(level_from_number(100), LogLevel::Critical);
        assert_eq!(level_from_number(-5), LogLevel::Debug);
    }

    #[test]
    fn syslog_priorities() {
        assert_eq!(level_from_syslog_priority(0), LogLevel::Critical);
        assert_eq!(level_from_syslog_priority(1), LogLevel::Critical);
        assert_eq!(level_from_syslog_priority(2), LogLevel::Critical);
        assert_eq!(level_from_syslog_priority(3), LogLevel::Error);
        assert_eq!(level_from_syslog_priority(4), LogLevel::Warn);
        assert_eq!(level_from_syslog_priority(5), LogLevel::Info);
        assert_eq!(level_from_syslog_priority(6), LogLevel::Info);
        assert_eq!(level_from_syslog_priority(7), LogLevel::Debug);
    }

    #[test]
    fn textual_synonyms() {
        assert_eq!(level_from_text("EMERGENCY"), LogLevel::Critical);
        assert_eq!(level_from_text("Fatal"), LogLevel::Critical);
        assert_eq!(level_from_text("err"), LogLevel::Error);
        assert_eq!(level_from_text("warning"), LogLevel::Warn);
        assert_eq!(level_from_text("notice"), LogLevel::Info);
        assert_eq!(level_from_text("verbose"), LogLevel::Debug);
        assert_eq!(level_from_text("trace"), LogLevel::Debug);
    }

    #[test]
    fn canonical_names_pass_through() {
        assert_eq!(level_from_text("debug"), LogLevel::Debug);
        assert_eq!(level_from_text("info"), LogLevel::Info);
        assert_eq!(level_from_text("warn"), LogLevel::Warn);
        assert_eq!(level_from_text("error"), LogLevel::Error);
        assert_eq!(level_from_text("critical"), LogLevel::Critical);
    }

    #[test]
    fn unrecognized_defaults_to_info() {
        assert_eq!(level_from_text("???"), LogLevel::Info);
        assert_eq!(level_from_text(""), LogLevel::Info);
        assert_eq!(normalize_level(&Value::Null), LogLevel::Info);
        assert_eq!(normalize_level(&serde_json::json!([1, 2])), LogLevel::Info);
    }

    #[test]
    fn numeric_strings_treated_numerically() {
        assert_eq!(level_from_text("50"), LogLevel::Error);
        assert_eq!(level_from_text(" 30 "), LogLevel::Info);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Level mapping is total: any i64 yields exactly one level.
            #[test]
            fn any_number_maps(n in any::<i64>()) {
                let _ = level_from_number(n);
            }

            #[test]
            fn any_string_maps(s in ".{0,64}") {
                let _ = level_from_text(&s);
            }

            #[test]
            fn numbers_partition_cleanly(n in 0i64..200) {
                let level = level_from_number(n);
                let expected = if n >= 60 {
                    LogLevel::Critical
                } else if n >= 50 {
                    LogLevel::Error
                } else if n >= 40 {
                    LogLevel::Warn
                } else if n >= 30 {
                    LogLevel::Info
                } else {
                    LogLevel::Debug
                };
                prop_assert_eq!(level, expected);
            }
        }
    }
}
