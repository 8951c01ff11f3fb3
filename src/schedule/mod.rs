//! # Schedule parsing and next-occurrence computation.
//!
//! A schedule string is either a fixed interval or a cron expression:
//!
//! ```text
//! "10s" / "5m" / "2h" / "1d"   → Interval (fixed multipliers to milliseconds)
//! "*/5 * * * *"                → Cron (5 or 6 fields, see [`cron`])
//! ```
//!
//! [`parse`] tries the interval syntax first, then cron; if neither matches
//! it fails with a single unified [`ScheduleError::InvalidFormat`].
//!
//! ## Interval drift
//! For intervals the next run is computed from `last_run` (or "now" when the
//! task has never run). Because `last_run` is stamped at the *start* of each
//! execution, successive occurrences are relative to actual run time, not
//! nominal schedule time: intervals drift forward by execution duration.
//! This is a design choice (self-correcting against overlap), not a defect.

mod cron;

pub use cron::CronExpr;

use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, Local, Offset, Utc};

use crate::error::ScheduleError;

/// A parsed schedule: fixed interval or validated cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedSchedule {
    /// Fixed recurrence interval.
    Interval(Duration),
    /// Cron expression with normalized field sets.
    Cron(CronExpr),
}

/// Parses a schedule string.
///
/// Attempts the interval syntax (`^(\d+)(s|m|h|d)$`) first, then cron.
pub fn parse(schedule: &str) -> Result<ParsedSchedule, ScheduleError> {
    if let Some(interval) = parse_interval(schedule) {
        return Ok(ParsedSchedule::Interval(interval));
    }
    match CronExpr::parse(schedule) {
        Ok(expr) => Ok(ParsedSchedule::Cron(expr)),
        Err(_) => Err(ScheduleError::InvalidFormat {
            input: schedule.to_string(),
        }),
    }
}

/// Interval syntax: one or more digits followed by a unit suffix.
fn parse_interval(schedule: &str) -> Option<Duration> {
    let unit = schedule.chars().last()?;
    let digits = &schedule[..schedule.len() - unit.len_utf8()];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: u64 = digits.parse().ok()?;
    let multiplier_ms: u64 = match unit {
        's' => 1_000,
        'm' => 60_000,
        'h' => 3_600_000,
        'd' => 86_400_000,
        _ => return None,
    };
    Some(Duration::from_millis(value.checked_mul(multiplier_ms)?))
}

/// Options consulted when computing the next occurrence.
#[derive(Debug, Clone, Copy, Default)]
pub struct NextRunOptions {
    /// Fixed UTC offset for cron field evaluation (local offset when unset).
    pub timezone: Option<FixedOffset>,
    /// Start of the most recent execution (interval schedules only).
    pub last_run: Option<DateTime<Utc>>,
}

/// Computes the next occurrence of `schedule` strictly relative to `now`.
///
/// - Interval: `(last_run ?? now) + interval`.
/// - Cron: forward scan from `now + 1s` in the configured offset.
pub fn next_run(
    schedule: &ParsedSchedule,
    now: DateTime<Utc>,
    opts: NextRunOptions,
) -> Result<DateTime<Utc>, ScheduleError> {
    match schedule {
        ParsedSchedule::Interval(interval) => {
            let base = opts.last_run.unwrap_or(now);
            // Saturate on absurdly large intervals instead of panicking.
            let next = ChronoDuration::from_std(*interval)
                .ok()
                .and_then(|step| base.checked_add_signed(step))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            Ok(next)
        }
        ParsedSchedule::Cron(expr) => {
            let offset = opts
                .timezone
                .unwrap_or_else(|| Local::now().offset().fix());
            let next = expr.next_after(now.with_timezone(&offset))?;
            Ok(next.with_timezone(&Utc))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_interval_units() {
        assert_eq!(
            parse("10s").unwrap(),
            ParsedSchedule::Interval(Duration::from_secs(10))
        );
        assert_eq!(
            parse("5m").unwrap(),
            ParsedSchedule::Interval(Duration::from_secs(300))
        );
        assert_eq!(
            parse("2h").unwrap(),
            ParsedSchedule::Interval(Duration::from_secs(7200))
        );
        assert_eq!(
            parse("1d").unwrap(),
            ParsedSchedule::Interval(Duration::from_secs(86_400))
        );
    }

    #[test]
    fn test_interval_rejects_malformed() {
        for bad in ["s", "10", "10x", "-5s", "1.5h", "10 s", ""] {
            assert!(
                parse_interval(bad).is_none(),
                "{bad:?} should not parse as interval"
            );
        }
    }

    #[test]
    fn test_cron_fallback() {
        assert!(matches!(
            parse("*/5 * * * *").unwrap(),
            ParsedSchedule::Cron(_)
        ));
    }

    #[test]
    fn test_unified_error_for_garbage() {
        assert!(matches!(
            parse("every tuesday"),
            Err(ScheduleError::InvalidFormat { .. })
        ));
        assert!(matches!(
            parse("70 * * * *"),
            Err(ScheduleError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_interval_next_run_from_last_run() {
        let schedule = parse("10s").unwrap();
        let last = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 7).unwrap();
        let next = next_run(
            &schedule,
            now,
            NextRunOptions {
                last_run: Some(last),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(next, last + ChronoDuration::seconds(10));
    }

    #[test]
    fn test_interval_next_run_without_last_run_uses_now() {
        let schedule = parse("5m").unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let next = next_run(&schedule, now, NextRunOptions::default()).unwrap();
        assert_eq!(next, now + ChronoDuration::minutes(5));
    }

    #[test]
    fn test_cron_next_run_respects_offset() {
        // Daily at 09:00 in UTC+2 is 07:00 UTC.
        let schedule = parse("0 9 * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let next = next_run(
            &schedule,
            now,
            NextRunOptions {
                timezone: FixedOffset::east_opt(2 * 3600),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 2, 7, 0, 0).unwrap());
    }
}
