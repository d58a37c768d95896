//! Duration strings in the `10s` / `1m30s` / `500ms` style used by compose
//! files and the controller interval setting.

use std::time::Duration;

use crate::error::CoreError;

/// Parse a duration string such as `"10s"`, `"1m30s"`, `"1.5h"` or `"250ms"`.
///
/// Supported units: `ns`, `us`/`µs`, `ms`, `s`, `m`, `h`. A bare number is
/// read as seconds.
pub fn parse_duration(input: &str) -> Result<Duration, CoreError> {
    let invalid = || CoreError::InvalidDuration(input.to_string());
    let s = input.trim();
    if s.is_empty() {
        return Err(invalid());
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_end == 0 {
            return Err(invalid());
        }
        let (number, tail) = rest.split_at(number_end);
        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_end);

        let value: f64 = number.parse().map_err(|_| invalid())?;
        let nanos_per_unit = match unit {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };
        let part = Duration::from_nanos((value * nanos_per_unit).round() as u64);
        total = total.checked_add(part).ok_or_else(invalid)?;
        rest = next;
    }
    Ok(total)
}

/// Parse the controller tick interval. Zero is rejected.
pub fn parse_interval(input: &str) -> Result<Duration, CoreError> {
    match parse_duration(input) {
        Ok(d) if !d.is_zero() => Ok(d),
        _ => Err(CoreError::InvalidInterval(input.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_units() {
        assert_eq!(parse_duration("10s"), Ok(Duration::from_secs(10)));
        assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
        assert_eq!(parse_duration("15us"), Ok(Duration::from_micros(15)));
        assert_eq!(parse_duration("15µs"), Ok(Duration::from_micros(15)));
        assert_eq!(parse_duration("7ns"), Ok(Duration::from_nanos(7)));
    }

    #[test]
    fn compound_and_fractional() {
        assert_eq!(parse_duration("1m30s"), Ok(Duration::from_secs(90)));
        assert_eq!(parse_duration("1h2m3s"), Ok(Duration::from_secs(3723)));
        assert_eq!(parse_duration("1.5s"), Ok(Duration::from_millis(1500)));
    }

    #[test]
    fn plain_number_is_seconds() {
        assert_eq!(parse_duration("30"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration(" 5 "), Ok(Duration::from_secs(5)));
    }

    #[test]
    fn rejects_garbage() {
        for bad in ["", "s", "10x", "-5s", "ten seconds", "1..2s", "5s3"] {
            assert!(parse_duration(bad).is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn interval_must_be_positive() {
        assert_eq!(parse_interval("10s"), Ok(Duration::from_secs(10)));
        assert!(matches!(parse_interval("0s"), Err(CoreError::InvalidInterval(_))));
        assert!(matches!(parse_interval("soon"), Err(CoreError::InvalidInterval(_))));
    }
}
