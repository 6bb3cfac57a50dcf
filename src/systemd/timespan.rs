// Parsers for systemd's human readable time spans and timestamps

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use std::time::Duration;

const SECS_PER_MINUTE: f64 = 60.0;
const SECS_PER_HOUR: f64 = 60.0 * SECS_PER_MINUTE;
const SECS_PER_DAY: f64 = 24.0 * SECS_PER_HOUR;
const SECS_PER_WEEK: f64 = 7.0 * SECS_PER_DAY;
const SECS_PER_MONTH: f64 = 30.0 * SECS_PER_DAY;
const SECS_PER_YEAR: f64 = 365.0 * SECS_PER_DAY;

/// Words systemd appends to relative times in its tables
const TRAILING_WORDS: [&str; 2] = ["ago", "left"];

/// Seconds per unit suffix, following the suffix table in systemd's time-util.c
fn unit_factor(unit: &str) -> Option<f64> {
    let factor = match unit {
        "y" | "year" | "years" => SECS_PER_YEAR,
        "M" | "month" | "months" => SECS_PER_MONTH,
        "w" | "week" | "weeks" => SECS_PER_WEEK,
        "d" | "day" | "days" => SECS_PER_DAY,
        "h" | "hr" | "hour" | "hours" => SECS_PER_HOUR,
        "m" | "min" | "minute" | "minutes" => SECS_PER_MINUTE,
        "s" | "sec" | "second" | "seconds" => 1.0,
        "ms" | "msec" => 1e-3,
        "us" | "usec" | "µs" | "μs" => 1e-6,
        "ns" | "nsec" => 1e-9,
        _ => return None,
    };
    Some(factor)
}

/// Parse a time span such as `3h 39min ago`, `2 months 4 days` or `1min 2.154s`.
///
/// Components are summed. A number without a unit counts as seconds, which
/// is how systemd itself reads bare numbers.
pub fn parse_timespan(input: &str) -> Result<Duration, String> {
    let text = strip_trailing_words(input.trim());
    if text.is_empty() {
        return Err(format!("empty time span '{}'", input));
    }

    let chars: Vec<char> = text.chars().collect();
    let mut pos = 0;
    let mut total = 0.0_f64;

    while pos < chars.len() {
        while pos < chars.len() && chars[pos].is_whitespace() {
            pos += 1;
        }
        if pos == chars.len() {
            break;
        }

        let number_start = pos;
        while pos < chars.len() && (chars[pos].is_ascii_digit() || chars[pos] == '.') {
            pos += 1;
        }
        if number_start == pos {
            return Err(format!("expected a number at '{}' in '{}'", chars[pos..].iter().collect::<String>(), input));
        }
        let number: String = chars[number_start..pos].iter().collect();
        let value: f64 = number
            .parse()
            .map_err(|_| format!("invalid number '{}' in '{}'", number, input))?;

        while pos < chars.len() && chars[pos].is_whitespace() {
            pos += 1;
        }

        let unit_start = pos;
        while pos < chars.len() && chars[pos].is_alphabetic() {
            pos += 1;
        }
        let unit: String = chars[unit_start..pos].iter().collect();
        let factor = if unit.is_empty() {
            1.0
        } else {
            unit_factor(&unit).ok_or_else(|| format!("unknown time unit '{}' in '{}'", unit, input))?
        };

        total += value * factor;
    }

    // Microsecond resolution is what systemd stores internally.
    Ok(Duration::from_micros((total * 1e6).round() as u64))
}

fn strip_trailing_words(text: &str) -> &str {
    let mut text = text;
    for word in TRAILING_WORDS {
        if let Some(rest) = text.strip_suffix(word) {
            text = rest.trim_end();
        }
    }
    text
}

/// Parse a table timestamp such as `Sat 2020-05-16 15:11:15 CEST`.
///
/// The weekday is ignored. `UTC` is honoured, any other zone abbreviation
/// is read as the local time zone because abbreviations are ambiguous.
pub fn parse_timestamp(input: &str) -> Result<DateTime<Utc>, String> {
    let fields: Vec<&str> = input.split_whitespace().collect();
    let (date_time, zone) = match fields.as_slice() {
        [_weekday, date, time, zone] => (format!("{} {}", date, time), Some(*zone)),
        [_weekday, date, time] => (format!("{} {}", date, time), None),
        _ => return Err(format!("unexpected timestamp layout '{}'", input)),
    };

    let naive = NaiveDateTime::parse_from_str(&date_time, "%Y-%m-%d %H:%M:%S")
        .map_err(|e| format!("invalid timestamp '{}': {}", input, e))?;

    match zone {
        Some("UTC") | Some("GMT") => Ok(Utc.from_utc_datetime(&naive)),
        _ => Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|local| local.with_timezone(&Utc))
            .ok_or_else(|| format!("timestamp '{}' does not exist in the local time zone", input)),
    }
}

/// Convert a microsecond realtime value from D-Bus; zero means "never"
pub fn from_realtime_usec(usec: u64) -> Option<DateTime<Utc>> {
    if usec == 0 || usec == u64::MAX {
        return None;
    }
    DateTime::from_timestamp((usec / 1_000_000) as i64, ((usec % 1_000_000) * 1000) as u32)
}

/// Render seconds the way performance data wants them: no trailing zeros
pub fn format_seconds(seconds: f64) -> String {
    let rounded = (seconds * 1000.0).round() / 1000.0;
    let text = format!("{:.3}", rounded);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}
