//! Duration parsing and formatting.
//!
//! Durations are written the way load-test options usually write them:
//! `30s`, `1m30s`, `500ms`, `1.5s`. A bare number is taken as seconds.

use crate::error::LoadError;
use std::time::Duration;

const NANOS_PER_UNIT: &[(&str, f64)] = &[
    ("ns", 1.0),
    ("us", 1e3),
    ("µs", 1e3),
    ("ms", 1e6),
    ("s", 1e9),
    ("m", 60e9),
    ("h", 3_600e9),
];

/// Parse a human duration such as `30s`, `1m30s` or `250ms`.
pub fn parse_duration(input: &str) -> Result<Duration, LoadError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(LoadError::duration(input, "empty duration"));
    }

    if let Ok(secs) = s.parse::<f64>() {
        if secs < 0.0 || !secs.is_finite() {
            return Err(LoadError::duration(input, "must be a non-negative number"));
        }
        return Duration::try_from_secs_f64(secs)
            .map_err(|_| LoadError::duration(input, "duration too large"));
    }

    let mut total_nanos = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        if rest.starts_with('-') {
            return Err(LoadError::duration(input, "negative durations are not allowed"));
        }

        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_end == 0 {
            return Err(LoadError::duration(input, "expected a number before the unit"));
        }
        let value: f64 = rest[..num_end]
            .parse()
            .map_err(|_| LoadError::duration(input, "malformed number"))?;
        rest = &rest[num_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.' || c == '-')
            .unwrap_or(rest.len());
        let unit = &rest[..unit_end];
        if unit.is_empty() {
            return Err(LoadError::duration(input, "missing unit"));
        }
        let scale = NANOS_PER_UNIT
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, scale)| *scale)
            .ok_or_else(|| LoadError::duration(input, format!("unknown unit '{}'", unit)))?;

        total_nanos += value * scale;
        rest = &rest[unit_end..];
    }

    let total_nanos = total_nanos.round();
    if !total_nanos.is_finite() || total_nanos >= u64::MAX as f64 {
        return Err(LoadError::duration(input, "duration too large"));
    }
    Ok(Duration::from_nanos(total_nanos as u64))
}

/// Format a duration with consistent units: ns, µs, ms, or s.
/// Always uses 2 decimal places, no scientific notation.
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos >= 1_000_000_000 {
        format!("{:.2}s", d.as_secs_f64())
    } else if nanos >= 1_000_000 {
        format!("{:.2}ms", d.as_secs_f64() * 1_000.0)
    } else if nanos >= 1_000 {
        format!("{:.2}µs", d.as_secs_f64() * 1_000_000.0)
    } else {
        format!("{}ns", nanos)
    }
}

/// Render a duration in the shortest form `parse_duration` reads back exactly.
pub fn to_human(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        "0s".to_string()
    } else if nanos % 1_000_000_000 == 0 {
        format!("{}s", d.as_secs())
    } else if nanos % 1_000_000 == 0 {
        format!("{}ms", d.as_millis())
    } else if nanos % 1_000 == 0 {
        format!("{}us", d.as_micros())
    } else {
        format!("{}ns", nanos)
    }
}

/// Serde adapter for options files: durations as `"30s"` strings.
pub(crate) mod human_serde {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::to_human(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_duration(&raw).map_err(D::Error::custom)
    }
}

/// Same as [`human_serde`] for optional fields.
pub(crate) mod opt_human_serde {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&super::to_human(*d)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        raw.map(|r| super::parse_duration(&r).map_err(D::Error::custom))
            .transpose()
    }
}

/// Serde adapter for results files: durations as integer nanoseconds.
pub(crate) mod nanos_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_nanos().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let nanos = u128::deserialize(d)?;
        Ok(Duration::from_nanos(nanos as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_parse_single_unit_durations() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("250us").unwrap(), Duration::from_micros(250));
        assert_eq!(parse_duration("250µs").unwrap(), Duration::from_micros(250));
        assert_eq!(parse_duration("10ns").unwrap(), Duration::from_nanos(10));
    }

    #[test]
    fn should_parse_compound_and_fractional_durations() {
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("1h2m3s").unwrap(), Duration::from_secs(3723));
    }

    #[test]
    fn should_treat_bare_number_as_seconds() {
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_duration(" 0.25 ").unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn should_reject_malformed_durations() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("1m30").is_err());
        assert!(parse_duration("-5s").is_err());
        assert!(parse_duration("-5").is_err());
    }

    #[test]
    fn should_reject_durations_when_out_of_range() {
        assert!(parse_duration("1e20").is_err());
        assert!(parse_duration("99999999999999999999h").is_err());
        assert!(parse_duration("100000000000000000000ns").is_err());
        // Largest whole-second value still fits.
        assert!(parse_duration("1000000000s").is_ok());
    }

    #[test]
    fn should_format_duration_in_appropriate_units() {
        assert_eq!(format_duration(Duration::from_secs(2)), "2.00s");
        assert_eq!(format_duration(Duration::from_millis(500)), "500.00ms");
        assert_eq!(format_duration(Duration::from_micros(100)), "100.00µs");
        assert_eq!(format_duration(Duration::from_nanos(42)), "42ns");
    }

    #[test]
    fn should_render_human_form_that_parses_back() {
        for d in [
            Duration::from_secs(30),
            Duration::from_millis(1500),
            Duration::from_micros(7),
            Duration::from_nanos(3),
            Duration::ZERO,
        ] {
            assert_eq!(parse_duration(&to_human(d)).unwrap(), d);
        }
    }
}
