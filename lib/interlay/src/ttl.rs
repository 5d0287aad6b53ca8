//! ISO-8601 duration parsing for cache TTLs (`"PT1H"`, `"P1DT30M"`, ...).
//!
//! Calendar units are fixed-length: a year is 365 days and a month 30 days.
//! Only the seconds component may carry a fraction.

use std::time::Duration;

use crate::{Error, Result};

const SECONDS_PER_DAY: u64 = 86_400;

const DATE_UNITS: [(char, u64); 4] = [
    ('Y', 365 * SECONDS_PER_DAY),
    ('M', 30 * SECONDS_PER_DAY),
    ('W', 7 * SECONDS_PER_DAY),
    ('D', SECONDS_PER_DAY),
];

const TIME_UNITS: [(char, u64); 3] = [('H', 3_600), ('M', 60), ('S', 1)];

/// Sum the components of one half of the duration, returning the total and
/// how many components were present. `None` on any syntax error.
fn sum_components(part: &str, units: &[(char, u64)], fraction_unit: Option<char>) -> Option<(Duration, usize)> {
    let mut total = Duration::ZERO;
    let mut next_unit = 0;
    let mut count = 0;
    let mut number = String::new();

    for c in part.chars() {
        if c.is_ascii_digit() || c == '.' {
            number.push(c);
            continue;
        }

        // Designators must appear in order, each at most once.
        let offset = units.iter().skip(next_unit).position(|(d, _)| *d == c)?;
        let index = next_unit + offset;
        let (designator, seconds) = units.get(index)?;
        if number.is_empty() {
            return None;
        }

        let amount = if number.contains('.') {
            if fraction_unit != Some(*designator) {
                return None;
            }
            let value: f64 = number.parse().ok()?;
            Duration::try_from_secs_f64(value).ok()?
        } else {
            let value: u64 = number.parse().ok()?;
            Duration::from_secs(value.checked_mul(*seconds)?)
        };

        total = total.checked_add(amount)?;
        number.clear();
        next_unit = index + 1;
        count += 1;
    }

    if number.is_empty() {
        Some((total, count))
    } else {
        None
    }
}

/// Parse an ISO-8601 duration such as `"PT1H"` into a [`Duration`].
pub fn parse_iso8601(input: &str) -> Result<Duration> {
    let invalid = || Error::configuration(format!("invalid ISO-8601 duration: {input:?}"));

    let rest = input.strip_prefix('P').ok_or_else(invalid)?;
    let (date, time) = match rest.split_once('T') {
        Some((_, "")) => return Err(invalid()),
        Some((date, time)) => (date, Some(time)),
        None => (rest, None),
    };

    let (date_total, date_count) = sum_components(date, &DATE_UNITS, None).ok_or_else(invalid)?;
    let (time_total, time_count) = match time {
        Some(time) => sum_components(time, &TIME_UNITS, Some('S')).ok_or_else(invalid)?,
        None => (Duration::ZERO, 0),
    };

    if date_count + time_count == 0 {
        return Err(invalid());
    }

    date_total.checked_add(time_total).ok_or_else(invalid)
}
