//! # Lightweight cron expression evaluator.
//!
//! Supports standard 5-field (`minute hour day-of-month month day-of-week`)
//! and 6-field (leading seconds) expressions. Each field accepts `*`, comma
//! lists, ranges (`a-b`), and stepped ranges (`a-b/n`, `a/n`, `*/n`).
//!
//! ## Field bounds
//! ```text
//! second        0-59   (implicitly {0} for 5-field expressions)
//! minute        0-59
//! hour          0-23
//! day-of-month  1-31
//! month         1-12
//! day-of-week   0-6    (0 = Sunday)
//! ```
//!
//! ## Match semantics
//! A timestamp matches when second ∧ minute ∧ hour ∧ month all match **and**
//! the day constraint holds. Day matching follows standard cron: a `*` day
//! field is unrestricted, so the other day field governs alone; when both
//! day-of-month and day-of-week are restricted they combine with **or**.
//!
//! ## Next-occurrence search
//! [`CronExpr::next_after`] starts at `now + 1s` (sub-second part zeroed) and
//! scans forward, jumping directly to the next candidate value of the first
//! mismatching field rather than stepping second by second. The scan is
//! bounded; a fruitless search (e.g. `0 0 31 2 *`) fails with
//! [`ScheduleError::NextOccurrence`].

use chrono::{DateTime, Datelike, Duration, FixedOffset, Timelike};
use thiserror::Error;

use crate::error::ScheduleError;

/// Upper bound on forward-scan steps.
///
/// The scan advances at worst one day per step, so this covers roughly four
/// years of candidates with generous headroom for intra-day jumps.
const MAX_SEARCH_STEPS: usize = 4 * 366 * 8;

/// Detailed cron parse failure. Collapsed into the unified
/// [`ScheduleError::InvalidFormat`] by the schedule parser.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub(crate) enum CronParseError {
    #[error("expected 5 or 6 fields, got {0}")]
    FieldCount(usize),
    #[error("malformed field {field:?}")]
    Malformed { field: String },
    #[error("value out of range in {field:?} (expected {min}-{max})")]
    OutOfRange { field: String, min: u8, max: u8 },
    #[error("step must be greater than zero in {field:?}")]
    ZeroStep { field: String },
}

/// Sorted, deduplicated set of values accepted by one cron field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FieldSet {
    values: Vec<u8>,
    /// Whether the field was written as a bare `*` (unrestricted).
    wildcard: bool,
}

impl FieldSet {
    /// Parses one field against its bounds.
    fn parse(field: &str, min: u8, max: u8) -> Result<Self, CronParseError> {
        let malformed = || CronParseError::Malformed {
            field: field.to_string(),
        };
        let out_of_range = || CronParseError::OutOfRange {
            field: field.to_string(),
            min,
            max,
        };

        if field == "*" {
            return Ok(Self {
                values: (min..=max).collect(),
                wildcard: true,
            });
        }

        let mut values: Vec<u8> = Vec::new();
        for part in field.split(',') {
            if let Some((range, step)) = part.split_once('/') {
                let step: u8 = step.parse().map_err(|_| malformed())?;
                if step == 0 {
                    return Err(CronParseError::ZeroStep {
                        field: field.to_string(),
                    });
                }
                let (start, end) = if range == "*" {
                    (min, max)
                } else if let Some((a, b)) = range.split_once('-') {
                    let a: u8 = a.parse().map_err(|_| malformed())?;
                    let b: u8 = b.parse().map_err(|_| malformed())?;
                    if a < min || b > max {
                        return Err(out_of_range());
                    }
                    if a > b {
                        return Err(malformed());
                    }
                    (a, b)
                } else {
                    // `a/n` steps from `a` to the field maximum.
                    let a: u8 = range.parse().map_err(|_| malformed())?;
                    if a < min || a > max {
                        return Err(out_of_range());
                    }
                    (a, max)
                };
                values.extend((start..=end).step_by(step as usize));
            } else if let Some((a, b)) = part.split_once('-') {
                let a: u8 = a.parse().map_err(|_| malformed())?;
                let b: u8 = b.parse().map_err(|_| malformed())?;
                if a < min || b > max {
                    return Err(out_of_range());
                }
                if a > b {
                    return Err(malformed());
                }
                values.extend(a..=b);
            } else {
                let v: u8 = part.parse().map_err(|_| malformed())?;
                if v < min || v > max {
                    return Err(out_of_range());
                }
                values.push(v);
            }
        }

        values.sort_unstable();
        values.dedup();
        if values.is_empty() {
            return Err(malformed());
        }
        Ok(Self {
            values,
            wildcard: false,
        })
    }

    fn single(value: u8) -> Self {
        Self {
            values: vec![value],
            wildcard: false,
        }
    }

    fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    fn contains(&self, v: u8) -> bool {
        self.values.binary_search(&v).is_ok()
    }

    /// Smallest accepted value.
    fn first(&self) -> u8 {
        self.values[0]
    }

    /// Smallest accepted value strictly greater than `v`, if any.
    fn next_after(&self, v: u8) -> Option<u8> {
        self.values.iter().copied().find(|&x| x > v)
    }

    #[cfg(test)]
    pub(crate) fn values(&self) -> &[u8] {
        &self.values
    }
}

/// A validated, normalized cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    expr: String,
    second: FieldSet,
    minute: FieldSet,
    hour: FieldSet,
    day_of_month: FieldSet,
    month: FieldSet,
    day_of_week: FieldSet,
}

impl CronExpr {
    /// Parses a 5- or 6-field cron expression.
    ///
    /// 5-field expressions get an implicit seconds field of `{0}`.
    pub(crate) fn parse(expr: &str) -> Result<Self, CronParseError> {
        let parts: Vec<&str> = expr.split_whitespace().collect();
        let (second, rest) = match parts.len() {
            5 => (FieldSet::single(0), &parts[..]),
            6 => (FieldSet::parse(parts[0], 0, 59)?, &parts[1..]),
            n => return Err(CronParseError::FieldCount(n)),
        };
        Ok(Self {
            expr: expr.to_string(),
            second,
            minute: FieldSet::parse(rest[0], 0, 59)?,
            hour: FieldSet::parse(rest[1], 0, 23)?,
            day_of_month: FieldSet::parse(rest[2], 1, 31)?,
            month: FieldSet::parse(rest[3], 1, 12)?,
            day_of_week: FieldSet::parse(rest[4], 0, 6)?,
        })
    }

    /// The original expression text.
    pub fn as_str(&self) -> &str {
        &self.expr
    }

    /// Whether `at` satisfies the expression.
    pub fn matches(&self, at: DateTime<FixedOffset>) -> bool {
        self.second.contains(at.second() as u8)
            && self.minute.contains(at.minute() as u8)
            && self.hour.contains(at.hour() as u8)
            && self.month.contains(at.month() as u8)
            && self.day_matches(at)
    }

    /// Standard cron day semantics: a `*` field is unrestricted; when both
    /// day fields are restricted they combine with OR.
    fn day_matches(&self, at: DateTime<FixedOffset>) -> bool {
        let dom = self.day_of_month.contains(at.day() as u8);
        let dow = self
            .day_of_week
            .contains(at.weekday().num_days_from_sunday() as u8);
        match (
            self.day_of_month.is_wildcard(),
            self.day_of_week.is_wildcard(),
        ) {
            (true, true) => true,
            (true, false) => dow,
            (false, true) => dom,
            (false, false) => dom || dow,
        }
    }

    /// Earliest occurrence strictly after `now` (second granularity).
    ///
    /// The scan jumps to the next candidate value of the first mismatching
    /// time field; a date mismatch advances to the next day at the first
    /// accepted time of day.
    pub fn next_after(
        &self,
        now: DateTime<FixedOffset>,
    ) -> Result<DateTime<FixedOffset>, ScheduleError> {
        let mut candidate = now + Duration::seconds(1);
        candidate = candidate.with_nanosecond(0).unwrap_or(candidate);

        for _ in 0..MAX_SEARCH_STEPS {
            if self.matches(candidate) {
                return Ok(candidate);
            }

            let sec = candidate.second() as u8;
            if !self.second.contains(sec) {
                candidate = match self.second.next_after(sec) {
                    Some(next) => set_second(candidate, next),
                    None => set_second(candidate + Duration::minutes(1), self.second.first()),
                };
                continue;
            }

            let min = candidate.minute() as u8;
            if !self.minute.contains(min) {
                candidate = match self.minute.next_after(min) {
                    Some(next) => set_ms(candidate, next, self.second.first()),
                    None => set_ms(
                        candidate + Duration::hours(1),
                        self.minute.first(),
                        self.second.first(),
                    ),
                };
                continue;
            }

            let hour = candidate.hour() as u8;
            if !self.hour.contains(hour) {
                candidate = match self.hour.next_after(hour) {
                    Some(next) => set_hms(candidate, next, self.minute.first(), self.second.first()),
                    None => set_hms(
                        candidate + Duration::days(1),
                        self.hour.first(),
                        self.minute.first(),
                        self.second.first(),
                    ),
                };
                continue;
            }

            // Time-of-day matches; the date does not. Try the next day at the
            // first accepted time.
            candidate = set_hms(
                candidate + Duration::days(1),
                self.hour.first(),
                self.minute.first(),
                self.second.first(),
            );
        }

        Err(ScheduleError::NextOccurrence {
            expr: self.expr.clone(),
        })
    }
}

fn set_second(dt: DateTime<FixedOffset>, s: u8) -> DateTime<FixedOffset> {
    dt.with_second(s as u32)
        .unwrap_or_else(|| dt + Duration::seconds(1))
}

fn set_ms(dt: DateTime<FixedOffset>, m: u8, s: u8) -> DateTime<FixedOffset> {
    dt.with_minute(m as u32)
        .and_then(|d| d.with_second(s as u32))
        .unwrap_or_else(|| dt + Duration::seconds(1))
}

fn set_hms(dt: DateTime<FixedOffset>, h: u8, m: u8, s: u8) -> DateTime<FixedOffset> {
    dt.with_hour(h as u32)
        .and_then(|d| d.with_minute(m as u32))
        .and_then(|d| d.with_second(s as u32))
        .unwrap_or_else(|| dt + Duration::seconds(1))
}
