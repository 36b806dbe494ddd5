//! Small value-rendering helpers for CLI table output, grounded on the
//! teacher's `pbs_tools::format` renderers (`render_epoch`,
//! `render_bytes_human_readable`) but generalized away from backup-file and
//! task-status concerns toward report dates, percentages, and cache sizes.

use anyhow::Error;
use serde_json::Value;

/// Renders a `YYYY-MM-DD` date field for table display, leaving anything
/// that isn't a string as-is.
pub fn render_date(value: &Value, _record: &Value) -> Result<String, Error> {
    match value.as_str() {
        Some(s) => Ok(s.to_string()),
        None if value.is_null() => Ok(String::new()),
        None => Ok(value.to_string()),
    }
}

/// Renders a percentage field with two decimal places, e.g. `12.34%`.
pub fn render_percent(value: &Value, _record: &Value) -> Result<String, Error> {
    match value.as_f64() {
        Some(pct) => Ok(format!("{:.2}%", pct)),
        None => Ok(String::new()),
    }
}

/// Renders a byte count using the usual binary suffixes, e.g. `1.50 KiB`.
pub fn render_bytes_human_readable(value: &Value, _record: &Value) -> Result<String, Error> {
    match value.as_u64() {
        Some(bytes) => Ok(human_byte(bytes)),
        None if value.is_null() => Ok(String::new()),
        None => Ok(value.to_string()),
    }
}

fn human_byte(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_percent_with_two_decimals() {
        let v = serde_json::json!(12.3456);
        assert_eq!(render_percent(&v, &Value::Null).unwrap(), "12.35%");
    }

    #[test]
    fn renders_human_bytes() {
        assert_eq!(human_byte(512), "512 B");
        assert_eq!(human_byte(1536), "1.50 KiB");
        assert_eq!(human_byte(5 * 1024 * 1024), "5.00 MiB");
    }
}
