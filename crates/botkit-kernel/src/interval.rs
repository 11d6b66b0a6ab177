//! Human-friendly duration strings.
//!
//! A duration string is a non-negative decimal number immediately followed
//! by one unit:
//!
//! | Unit | Meaning |
//! |---|---|
//! | `ms` | milliseconds |
//! | `s` | seconds |
//! | `m` | minutes |
//! | `h` | hours |
//!
//! e.g. `"500ms"`, `"1.5s"`, `"2m"`, `"1h"`. [`format_duration`] produces
//! strings that [`parse_duration`] maps back to the same value.
//!
//! Scheduler entry points accept anything implementing [`IntoInterval`], so
//! hot loops can pass a [`Duration`] and skip parsing altogether.

use std::time::Duration;

use botkit_types::ConfigError;

const NANOS_PER_MS: u128 = 1_000_000;
const NANOS_PER_SEC: u128 = 1_000_000_000;
const NANOS_PER_MIN: u128 = 60 * NANOS_PER_SEC;
const NANOS_PER_HOUR: u128 = 60 * NANOS_PER_MIN;

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ms" => Some(NANOS_PER_MS),
        "s" => Some(NANOS_PER_SEC),
        "m" => Some(NANOS_PER_MIN),
        "h" => Some(NANOS_PER_HOUR),
        _ => None,
    }
}

/// Parse a duration string such as `"1.5s"`.
///
/// # Errors
///
/// [`ConfigError::InvalidDuration`] for empty input, a missing or unknown
/// unit, or a number that is negative, non-finite or unparsable.
pub fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidDuration {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty string"));
    }

    let split = trimmed
        .find(|c: char| c.is_ascii_alphabetic())
        .ok_or_else(|| invalid("missing unit (expected ms, s, m or h)"))?;
    let (number, unit) = trimmed.split_at(split);

    let per_unit = unit_nanos(unit).ok_or_else(|| invalid("unknown unit (expected ms, s, m or h)"))?;
    if number.is_empty() {
        return Err(invalid("missing number"));
    }
    let value: f64 = number.parse().map_err(|_| invalid("not a number"))?;
    if !value.is_finite() || value < 0.0 || number.starts_with(['+', '-']) {
        return Err(invalid("must be a non-negative decimal number"));
    }

    let nanos = (value * per_unit as f64).round();
    if nanos > u64::MAX as f64 {
        return Err(invalid("too large"));
    }
    Ok(Duration::from_nanos(nanos as u64))
}

/// Render `d` as whole hours or minutes when exact, otherwise in seconds
/// (fractional when needed), or milliseconds below one second.
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    for (unit, size) in [("h", NANOS_PER_HOUR), ("m", NANOS_PER_MIN)] {
        if nanos % size == 0 {
            return format!("{}{unit}", nanos / size);
        }
    }
    if nanos >= NANOS_PER_SEC {
        if nanos % NANOS_PER_SEC == 0 {
            format!("{}s", nanos / NANOS_PER_SEC)
        } else {
            format!("{}s", decimal(nanos, NANOS_PER_SEC, 9))
        }
    } else if nanos % NANOS_PER_MS == 0 {
        format!("{}ms", nanos / NANOS_PER_MS)
    } else {
        format!("{}ms", decimal(nanos, NANOS_PER_MS, 6))
    }
}

fn decimal(nanos: u128, size: u128, digits: usize) -> String {
    let frac = format!("{:0digits$}", nanos % size);
    format!("{}.{}", nanos / size, frac.trim_end_matches('0'))
}

/// Values accepted wherever the scheduler wants a period.
///
/// String forms are parsed with [`parse_duration`] and **panic** when
/// invalid: a malformed interval is a programming error and should fail
/// loudly at the call site.
pub trait IntoInterval {
    fn into_interval(self) -> Duration;
}

impl IntoInterval for Duration {
    fn into_interval(self) -> Duration {
        self
    }
}

impl IntoInterval for &str {
    fn into_interval(self) -> Duration {
        match parse_duration(self) {
            Ok(d) => d,
            Err(e) => panic!("{e}"),
        }
    }
}

impl IntoInterval for String {
    fn into_interval(self) -> Duration {
        self.as_str().into_interval()
    }
}

impl IntoInterval for &String {
    fn into_interval(self) -> Duration {
        self.as_str().into_interval()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_each_unit() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration(" 0.1s ").unwrap(), Duration::from_millis(100));
    }

    #[test]
    fn rejects_malformed_input() {
        for bad in ["", "ms", "10", "10x", "-1s", "+1s", "1.2.3s", "NaNs", "infh", "1 s"] {
            assert!(
                matches!(parse_duration(bad), Err(ConfigError::InvalidDuration { .. })),
                "'{bad}' should be rejected"
            );
        }
    }

    #[test]
    fn supported_strings_roundtrip() {
        for s in ["1ms", "250ms", "1.5s", "2.25s", "90s", "2m", "1h"] {
            assert_eq!(format_duration(parse_duration(s).unwrap()), s);
        }
    }

    #[test]
    fn formats_sub_millisecond_and_zero() {
        assert_eq!(format_duration(Duration::from_micros(1500)), "1.5ms");
        assert_eq!(format_duration(Duration::ZERO), "0s");
        assert_eq!(format_duration(Duration::from_secs(90)), "90s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_millis(61_001)), "61.001s");
    }

    #[test]
    fn into_interval_accepts_native_and_strings() {
        assert_eq!(Duration::from_millis(5).into_interval(), Duration::from_millis(5));
        assert_eq!("50ms".into_interval(), Duration::from_millis(50));
        assert_eq!(String::from("2s").into_interval(), Duration::from_secs(2));
    }

    #[test]
    #[should_panic(expected = "invalid duration")]
    fn into_interval_panics_on_garbage() {
        let _ = "soon".into_interval();
    }

    proptest! {
        #[test]
        fn millisecond_durations_roundtrip(ms in 0u64..1_000_000_000) {
            let d = Duration::from_millis(ms);
            prop_assert_eq!(parse_duration(&format_duration(d)).unwrap(), d);
        }
    }
}
