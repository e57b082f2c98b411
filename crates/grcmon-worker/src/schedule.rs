//! Next-fire computation for test schedules.
//!
//! Cron expressions use the classic 5-field form
//! (`minute hour day-of-month month day-of-week`, day-of-week `0`/`7` =
//! Sunday). They are translated to the seconds-first form the `cron` crate
//! parses. When both day-of-month and day-of-week are restricted, a time
//! must satisfy both.

use chrono::{DateTime, Duration, Utc};
use grcmon_common::error::ConfigError;
use grcmon_common::types::Schedule;
use std::str::FromStr;

/// Delay used when a stored cron expression cannot be parsed.
pub const CRON_FALLBACK_MINUTES: i64 = 60;

const WEEKDAYS: [&str; 8] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"];

/// Parses a 5-field cron expression.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use grcmon_worker::schedule::parse_cron;
///
/// let schedule = parse_cron("30 9 * * 1-5").unwrap();
/// let friday = Utc.with_ymd_and_hms(2026, 3, 6, 10, 0, 0).unwrap();
/// let next = schedule.after(&friday).next().unwrap();
/// assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 9, 9, 30, 0).unwrap());
///
/// assert!(parse_cron("*/5 * * *").is_err());
/// ```
pub fn parse_cron(expression: &str) -> Result<cron::Schedule, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidCron {
        expression: expression.to_string(),
        reason,
    };
    let fields: Vec<&str> = expression.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(invalid(format!("expected 5 fields, got {}", fields.len())));
    }
    let day_of_week = translate_day_of_week(fields[4]).map_err(invalid)?;
    let normalized = format!(
        "0 {} {} {} {} {}",
        fields[0], fields[1], fields[2], fields[3], day_of_week
    );
    cron::Schedule::from_str(&normalized).map_err(|e| invalid(e.to_string()))
}

/// Maps numeric weekdays (`0`-`7`, Sunday = 0 or 7) to names so the
/// numbering does not depend on the parser's convention.
fn translate_day_of_week(field: &str) -> Result<String, String> {
    let parts = field
        .split(',')
        .map(|part| {
            let (range, step) = match part.split_once('/') {
                Some((range, step)) => (range, Some(step)),
                None => (part, None),
            };
            if let Some(days) = expand_through_sunday(range, step)? {
                return Ok(days);
            }
            let range = range
                .split('-')
                .map(|day| match day.parse::<usize>() {
                    Ok(n) => WEEKDAYS
                        .get(n)
                        .map(|name| name.to_string())
                        .ok_or_else(|| format!("day-of-week {n} out of range 0-7")),
                    Err(_) => Ok(day.to_string()),
                })
                .collect::<Result<Vec<_>, _>>()?
                .join("-");
            Ok(match step {
                Some(step) => format!("{range}/{step}"),
                None => range,
            })
        })
        .collect::<Result<Vec<_>, String>>()?;
    Ok(parts.join(","))
}

/// Numeric ranges ending at `7` (`5-7`, `1-7/2`) would become a descending
/// `FRI-SUN` range, so they are spelled out as a list of day names instead.
fn expand_through_sunday(range: &str, step: Option<&str>) -> Result<Option<String>, String> {
    let Some((start, end)) = range.split_once('-') else {
        return Ok(None);
    };
    let (Ok(start), Ok(7)) = (start.parse::<usize>(), end.parse::<usize>()) else {
        return Ok(None);
    };
    if start > 7 {
        return Err(format!("day-of-week {start} out of range 0-7"));
    }
    let step = match step {
        Some(step) => step
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| format!("invalid day-of-week step {step}"))?,
        None => 1,
    };
    let mut names: Vec<&str> = Vec::new();
    for day in (start..=7).step_by(step) {
        let name = WEEKDAYS[day];
        if !names.contains(&name) {
            names.push(name);
        }
    }
    Ok(Some(names.join(",")))
}

/// Checks a schedule the way test create/update does.
pub fn validate(schedule: &Schedule) -> Result<(), ConfigError> {
    match schedule {
        Schedule::Interval { minutes: 0 } => Err(ConfigError::InvalidInterval(0)),
        Schedule::Interval { .. } => Ok(()),
        Schedule::Cron { expression } => parse_cron(expression).map(|_| ()),
    }
}

/// Next fire time strictly after `reference`.
///
/// An unparseable cron expression falls back to
/// `reference + CRON_FALLBACK_MINUTES` and logs a warning.
pub fn next_run_after(schedule: &Schedule, reference: DateTime<Utc>) -> DateTime<Utc> {
    match schedule {
        Schedule::Interval { minutes } => {
            reference + Duration::minutes(i64::from((*minutes).max(1)))
        }
        Schedule::Cron { expression } => match parse_cron(expression) {
            Ok(cron) => match cron.after(&reference).next() {
                Some(next) if next > reference => next,
                _ => {
                    tracing::warn!(
                        cron = %expression,
                        "Cron expression has no future firing time, using fallback"
                    );
                    fallback(reference)
                }
            },
            Err(e) => {
                tracing::warn!(cron = %expression, error = %e, "Invalid cron expression, using fallback");
                fallback(reference)
            }
        },
    }
}

fn fallback(reference: DateTime<Utc>) -> DateTime<Utc> {
    reference + Duration::minutes(CRON_FALLBACK_MINUTES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 4, h, m, s).unwrap()
    }

    fn cron(expression: &str) -> Schedule {
        Schedule::Cron {
            expression: expression.to_string(),
        }
    }

    #[test]
    fn interval_adds_minutes() {
        let next = next_run_after(&Schedule::Interval { minutes: 5 }, at(12, 0, 30));
        assert_eq!(next, at(12, 5, 30));
    }

    #[test]
    fn cron_returns_strictly_later_time() {
        assert_eq!(next_run_after(&cron("*/15 * * * *"), at(12, 0, 0)), at(12, 15, 0));
        assert_eq!(next_run_after(&cron("*/15 * * * *"), at(12, 7, 10)), at(12, 15, 0));
        assert_eq!(
            next_run_after(&cron("0 6 * * *"), at(12, 0, 0)),
            Utc.with_ymd_and_hms(2026, 3, 5, 6, 0, 0).unwrap()
        );
    }

    #[test]
    fn numeric_sunday_accepts_zero_and_seven() {
        // 2026-03-04 is a Wednesday.
        let sunday = Utc.with_ymd_and_hms(2026, 3, 8, 0, 0, 0).unwrap();
        assert_eq!(next_run_after(&cron("0 0 * * 0"), at(12, 0, 0)), sunday);
        assert_eq!(next_run_after(&cron("0 0 * * 7"), at(12, 0, 0)), sunday);

        // Ranges that end on Sunday-as-7.
        let friday = Utc.with_ymd_and_hms(2026, 3, 6, 9, 0, 0).unwrap();
        assert_eq!(next_run_after(&cron("0 9 * * 5-7"), at(12, 0, 0)), friday);
        let sunday_nine = Utc.with_ymd_and_hms(2026, 3, 8, 9, 0, 0).unwrap();
        assert_eq!(
            next_run_after(&cron("0 9 * * 5-7"), Utc.with_ymd_and_hms(2026, 3, 7, 10, 0, 0).unwrap()),
            sunday_nine
        );
        let thursday = Utc.with_ymd_and_hms(2026, 3, 5, 9, 0, 0).unwrap();
        assert_eq!(next_run_after(&cron("0 9 * * 1-7"), at(12, 0, 0)), thursday);
        assert!(parse_cron("0 9 * * 1-7").is_ok());
        assert!(parse_cron("0 9 * * 0-7").is_ok());
    }

    #[test]
    fn weekday_ranges_and_lists() {
        assert_eq!(translate_day_of_week("1-5").unwrap(), "MON-FRI");
        assert_eq!(translate_day_of_week("0,6").unwrap(), "SUN,SAT");
        assert_eq!(translate_day_of_week("*/2").unwrap(), "*/2");
        assert_eq!(translate_day_of_week("MON").unwrap(), "MON");
        assert!(translate_day_of_week("8").is_err());
        assert_eq!(translate_day_of_week("5-7").unwrap(), "FRI,SAT,SUN");
        assert_eq!(
            translate_day_of_week("1-7").unwrap(),
            "MON,TUE,WED,THU,FRI,SAT,SUN"
        );
        assert_eq!(
            translate_day_of_week("0-7").unwrap(),
            "SUN,MON,TUE,WED,THU,FRI,SAT"
        );
        assert_eq!(translate_day_of_week("1-7/2").unwrap(), "MON,WED,FRI,SUN");
        assert_eq!(translate_day_of_week("1,6-7").unwrap(), "MON,SAT,SUN");
        assert!(translate_day_of_week("1-7/0").is_err());
    }

    #[test]
    fn malformed_cron_falls_back_to_an_hour() {
        assert_eq!(next_run_after(&cron("not a cron"), at(12, 0, 0)), at(13, 0, 0));
        assert_eq!(next_run_after(&cron("61 * * * *"), at(12, 0, 0)), at(13, 0, 0));
    }

    #[test]
    fn validate_rejects_bad_forms() {
        assert!(validate(&Schedule::Interval { minutes: 1 }).is_ok());
        assert_eq!(
            validate(&Schedule::Interval { minutes: 0 }),
            Err(ConfigError::InvalidInterval(0))
        );
        assert!(matches!(
            validate(&cron("* * *")),
            Err(ConfigError::InvalidCron { .. })
        ));
        assert!(validate(&cron("0 9 1 * *")).is_ok());
    }
}
