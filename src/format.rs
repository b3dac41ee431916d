use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::Value;

/// Epoch values above this are milliseconds, not seconds.
const MILLIS_THRESHOLD: f64 = 1e12;

const RELATIVE_UNITS: &[(&str, u64)] = &[
    ("year", 365 * 86_400),
    ("month", 30 * 86_400),
    ("week", 7 * 86_400),
    ("day", 86_400),
    ("hour", 3_600),
    ("minute", 60),
    ("second", 1),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishedStyle {
    Relative,
    Absolute,
}

#[derive(Debug, Clone)]
pub struct Formatter {
    now: DateTime<Utc>,
    style: PublishedStyle,
}

impl Formatter {
    pub fn new(now: DateTime<Utc>, style: PublishedStyle) -> Self {
        Formatter { now, style }
    }

    /// Relative text when enabled, else a short absolute date, else the
    /// verbatim source text, else empty.
    pub fn published_text(&self, instant: Option<DateTime<Utc>>, source_text: &str) -> String {
        match instant {
            Some(instant) if self.style == PublishedStyle::Relative => self.relative(instant),
            Some(instant) => absolute_date(instant),
            None => source_text.trim().to_string(),
        }
    }

    fn relative(&self, instant: DateTime<Utc>) -> String {
        let delta = self.now.signed_duration_since(instant).num_seconds();
        let magnitude = delta.unsigned_abs();

        let Some((unit, size)) = RELATIVE_UNITS.iter().find(|(_, size)| magnitude >= *size) else {
            return "just now".into();
        };

        let count = magnitude / size;
        let label = if count == 1 {
            unit.to_string()
        } else {
            format!("{unit}s")
        };

        if delta >= 0 {
            format!("{count} {label} ago")
        } else {
            format!("in {count} {label}")
        }
    }
}

pub fn absolute_date(instant: DateTime<Utc>) -> String {
    instant.format("%b %-d, %Y").to_string()
}

pub fn iso_string(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(number) => number.as_f64().and_then(from_epoch),
        Value::String(text) => parse_timestamp_str(text),
        _ => None,
    }
}

pub fn parse_timestamp_str(text: &str) -> Option<DateTime<Utc>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.chars().all(|c| c.is_ascii_digit()) {
        let number: i64 = trimmed.parse().ok()?;
        if number <= 0 {
            return None;
        }
        return if trimmed.len() > 10 {
            from_millis(number)
        } else {
            Utc.timestamp_opt(number, 0).single()
        };
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    for format in ["%Y-%m-%d", "%b %d, %Y", "%B %d, %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }

    None
}

fn from_epoch(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    if value > MILLIS_THRESHOLD {
        from_millis(value as i64)
    } else {
        Utc.timestamp_opt(value as i64, 0).single()
    }
}

fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

/// `H:MM:SS` from one hour up, `M:SS` below. Zero and negative values are
/// unknown durations and format as an empty string.
pub fn format_duration(seconds: i64) -> String {
    if seconds <= 0 {
        return String::new();
    }

    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

pub fn duration_from_value(value: &Value) -> String {
    let seconds = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };

    match seconds {
        Some(s) if s.is_finite() && s >= 1.0 && s < i64::MAX as f64 => format_duration(s as i64),
        _ => String::new(),
    }
}
