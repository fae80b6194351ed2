//! Duration literals in DSN parameters.
//!
//! Accepts the compact `1h30m`, `1.5ms`, `250us` notation: a sequence of
//! decimal numbers (optional fraction), each followed by a unit out of
//! `ns`, `us`/`µs`/`μs`, `ms`, `s`, `m`, `h`. A bare `0` is allowed.
//! Negative durations are rejected.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, digit0},
    combinator::{all_consuming, map, opt, recognize, value, verify},
    multi::many1,
    sequence::{pair, preceded, tuple},
};
use std::time::Duration;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Parse a duration literal; `None` when the text is not a valid duration.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let body = input.strip_prefix('+').unwrap_or(input);
    if body == "0" {
        return Some(Duration::ZERO);
    }
    let (_, parts) = all_consuming(many1(component))(body).ok()?;

    let mut total: u128 = 0;
    for (whole, frac, unit) in parts {
        let mut nanos = parse_digits(whole)?.checked_mul(unit)?;
        if !frac.is_empty() {
            let mut scaled: u128 = 0;
            let mut scale: u128 = 1;
            // Digits past nanosecond precision of the largest unit cannot matter.
            for d in frac.bytes().take(20) {
                scaled = scaled * 10 + u128::from(d - b'0');
                scale *= 10;
            }
            nanos += scaled * unit / scale;
        }
        total = total.checked_add(nanos)?;
    }

    if total > u128::from(i64::MAX as u64) {
        return None;
    }
    Some(Duration::from_nanos(total as u64))
}

fn parse_digits(digits: &str) -> Option<u128> {
    if digits.is_empty() {
        return Some(0);
    }
    digits.parse().ok()
}

/// One `<number><unit>` element: (integer digits, fraction digits, nanos per unit).
fn component(input: &str) -> IResult<&str, (&str, &str, u128)> {
    map(
        tuple((
            verify(number, |(whole, frac): &(&str, Option<&str>)| {
                !whole.is_empty() || frac.is_some_and(|f| !f.is_empty())
            }),
            unit,
        )),
        |((whole, frac), unit)| (whole, frac.unwrap_or(""), unit),
    )(input)
}

fn number(input: &str) -> IResult<&str, (&str, Option<&str>)> {
    pair(recognize(digit0), opt(preceded(char('.'), digit0)))(input)
}

fn unit(input: &str) -> IResult<&str, u128> {
    alt((
        value(1, tag("ns")),
        value(1_000, tag("us")),
        value(1_000, tag("µs")),
        value(1_000, tag("μs")),
        value(1_000_000, tag("ms")),
        value(NANOS_PER_SEC, tag("s")),
        value(60 * NANOS_PER_SEC, tag("m")),
        value(3_600 * NANOS_PER_SEC, tag("h")),
    ))(input)
}

/// Render a duration in the same notation, e.g. `1h0m0s`, `1m30s`, `1.5ms`.
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }

    if nanos < NANOS_PER_SEC {
        return if nanos < 1_000 {
            format!("{}ns", nanos)
        } else if nanos < 1_000_000 {
            format!("{}µs", fixed(nanos, 3))
        } else {
            format!("{}ms", fixed(nanos, 6))
        };
    }

    let secs = nanos / NANOS_PER_SEC;
    let frac = fixed(nanos % NANOS_PER_SEC, 9);
    let frac = frac.strip_prefix('0').unwrap_or(&frac);
    let mut out = String::new();
    let mins = secs / 60;
    if mins > 0 {
        let hours = mins / 60;
        if hours > 0 {
            out.push_str(&format!("{}h", hours));
        }
        out.push_str(&format!("{}m", mins % 60));
    }
    out.push_str(&format!("{}{}s", secs % 60, frac));
    out
}

/// `v / 10^prec` with the remainder as a fraction, trailing zeros trimmed.
fn fixed(v: u128, prec: u32) -> String {
    let base = 10u128.pow(prec);
    let whole = v / base;
    let rem = v % base;
    if rem == 0 {
        return whole.to_string();
    }
    let digits = format!("{:0width$}", rem, width = prec as usize);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("1m30s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("1.5ms"), Some(Duration::from_micros(1500)));
        assert_eq!(parse_duration("250us"), Some(Duration::from_micros(250)));
        assert_eq!(parse_duration("250µs"), Some(Duration::from_micros(250)));
        assert_eq!(parse_duration("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_duration(".5s"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("0"), Some(Duration::ZERO));
        assert_eq!(parse_duration("+10ns"), Some(Duration::from_nanos(10)));
    }

    #[test]
    fn test_parse_rejects() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("10"), None);
        assert_eq!(parse_duration("-1s"), None);
        assert_eq!(parse_duration("1x"), None);
        assert_eq!(parse_duration(".s"), None);
        assert_eq!(parse_duration("1s "), None);
    }

    #[test]
    fn test_format() {
        assert_eq!(format_duration(Duration::ZERO), "0s");
        assert_eq!(format_duration(Duration::from_nanos(15)), "15ns");
        assert_eq!(format_duration(Duration::from_micros(1500)), "1.5ms");
        assert_eq!(format_duration(Duration::from_nanos(2_500)), "2.5µs");
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m30s");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h0m0s");
        assert_eq!(format_duration(Duration::from_millis(2500)), "2.5s");
    }

    #[test]
    fn test_format_parses_back() {
        for d in [
            Duration::from_nanos(1),
            Duration::from_micros(1500),
            Duration::from_millis(61_001),
            Duration::from_secs(3 * 3600 + 7),
        ] {
            assert_eq!(parse_duration(&format_duration(d)), Some(d));
        }
    }
}
