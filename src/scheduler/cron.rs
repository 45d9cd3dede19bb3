//! Five-field cron expressions: `MIN HOUR DOM MON DOW`.
//!
//! Each field accepts `*`, `*/N`, `N`, `A-B`, `A-B/N` and comma lists of those.
//! Day of week runs 0-7 with both 0 and 7 meaning Sunday. When day-of-month and day-of-week
//! are both restricted, a day matching either one matches, as in classic cron. A field
//! starting with `*` (including `*/N`) counts as unrestricted.
//! Example: `"0 8 * * *"` is every day at 08:00.

use crate::errors::{Error, Result};
use chrono::{Datelike, Duration, NaiveDateTime, Timelike};

/// A parsed cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronSchedule {
    /// Parses an expression, rejecting anything out of range.
    pub fn parse(expression: &str) -> Result<Self> {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(cron_error(
                expression,
                "need 5 fields: MIN HOUR DOM MON DOW",
            ));
        }

        let minutes = parse_field(parts[0], 0, 59).map_err(|e| cron_error(expression, &e))?;
        let hours = parse_field(parts[1], 0, 23).map_err(|e| cron_error(expression, &e))?;
        let days_of_month =
            parse_field(parts[2], 1, 31).map_err(|e| cron_error(expression, &e))?;
        let months = parse_field(parts[3], 1, 12).map_err(|e| cron_error(expression, &e))?;
        let mut days_of_week =
            parse_field(parts[4], 0, 7).map_err(|e| cron_error(expression, &e))?;
        // Fold 7 onto 0 (Sunday)
        if days_of_week & (1 << 7) != 0 {
            days_of_week = (days_of_week | 1) & !(1 << 7);
        }

        Ok(Self {
            minutes,
            hours,
            days_of_month,
            months,
            days_of_week,
            dom_restricted: !parts[2].starts_with('*'),
            dow_restricted: !parts[4].starts_with('*'),
        })
    }

    /// Whether the minute containing `at` matches.
    #[must_use]
    pub fn matches(&self, at: &NaiveDateTime) -> bool {
        let dom_match = bit(self.days_of_month, at.day());
        let dow_match = bit(self.days_of_week, at.weekday().num_days_from_sunday());
        let day_match = if self.dom_restricted && self.dow_restricted {
            dom_match || dow_match
        } else {
            dom_match && dow_match
        };

        bit(self.minutes, at.minute())
            && bit(self.hours, at.hour())
            && bit(self.months, at.month())
            && day_match
    }

    /// First matching minute strictly after `after`, searching up to a year ahead.
    #[must_use]
    pub fn next_after(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        let start = after.with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);
        let mut candidate = start;
        while candidate - start <= Duration::days(366) {
            if !bit(self.months, candidate.month()) {
                // Jump to midnight of the next day
                candidate = candidate.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if self.matches(&candidate) {
                return Some(candidate);
            }
            candidate += Duration::minutes(1);
        }
        None
    }
}

const fn bit(mask: u64, value: u32) -> bool {
    mask & (1 << value) != 0
}

fn cron_error(expression: &str, reason: &str) -> Error {
    Error::Config {
        message: format!("invalid cron expression '{expression}': {reason}"),
    }
}

/// Parses one field into a bitmask of allowed values.
fn parse_field(field: &str, min: u32, max: u32) -> std::result::Result<u64, String> {
    let mut mask = 0u64;
    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| format!("bad step '{step}' in '{field}'"))?;
                if step == 0 {
                    return Err(format!("step must be positive in '{field}'"));
                }
                (range, step)
            }
            None => (item, 1),
        };

        let (start, end) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            (parse_value(a, field)?, parse_value(b, field)?)
        } else {
            let value = parse_value(range, field)?;
            // "N/S" means from N to the end of the range
            if item.contains('/') {
                (value, max)
            } else {
                (value, value)
            }
        };

        if start < min || end > max || start > end {
            return Err(format!("'{item}' is outside {min}-{max}"));
        }
        let mut value = start;
        while value <= end {
            mask |= 1 << value;
            value += step;
        }
    }
    Ok(mask)
}

fn parse_value(raw: &str, field: &str) -> std::result::Result<u32, String> {
    raw.trim()
        .parse()
        .map_err(|_| format!("bad value '{raw}' in '{field}'"))
}
