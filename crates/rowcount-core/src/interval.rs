//! Polling interval parsing
//!
//! Accepts the compact duration syntax operators already use for exporter
//! flags: a sequence of decimal numbers each followed by a unit, such as
//! `30s`, `1m`, `1h30m` or `1.5h`.

use std::time::Duration;

use crate::error::ConfigError;

const NANOS_PER_MICRO: f64 = 1e3;
const NANOS_PER_MILLI: f64 = 1e6;
const NANOS_PER_SEC: f64 = 1e9;

/// Parse an interval string into a strictly positive [`Duration`].
///
/// Supported units: `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`.
pub fn parse_interval(input: &str) -> Result<Duration, ConfigError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::interval(input, "empty value"));
    }

    let mut rest = trimmed;
    let mut total_nanos = 0f64;

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(ConfigError::interval(input, "expected a number"));
        }
        let (number, tail) = rest.split_at(number_len);
        let value: f64 = number
            .parse()
            .map_err(|_| ConfigError::interval(input, format!("malformed number {:?}", number)))?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);

        let scale = match unit {
            "ns" => 1.0,
            "us" | "µs" | "μs" => NANOS_PER_MICRO,
            "ms" => NANOS_PER_MILLI,
            "s" => NANOS_PER_SEC,
            "m" => 60.0 * NANOS_PER_SEC,
            "h" => 3600.0 * NANOS_PER_SEC,
            "" => return Err(ConfigError::interval(input, "missing unit")),
            other => {
                return Err(ConfigError::interval(
                    input,
                    format!("unknown unit {:?}", other),
                ))
            }
        };

        total_nanos += value * scale;
        rest = tail;
    }

    if total_nanos < 1.0 {
        return Err(ConfigError::interval(input, "interval must be positive"));
    }
    if total_nanos >= u64::MAX as f64 {
        return Err(ConfigError::interval(input, "interval too large"));
    }

    Ok(Duration::from_nanos(total_nanos.round() as u64))
}
