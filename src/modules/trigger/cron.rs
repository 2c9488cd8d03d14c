// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use chrono::{DateTime, Datelike, Duration, FixedOffset, Timelike};

use crate::{
    modules::error::{code::ErrorCode, MailSweepResult},
    raise_error,
};

/// Standard five-field cron expression (minute hour day-of-month month
/// day-of-week) supporting `*`, lists, ranges and steps. When both the
/// day-of-month and day-of-week fields are restricted the expression fires
/// on either, matching conventional cron semantics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CronExpression {
    minutes: Vec<u8>,
    hours: Vec<u8>,
    days_of_month: Vec<u8>,
    months: Vec<u8>,
    days_of_week: Vec<u8>,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronExpression {
    pub fn parse(expression: &str) -> MailSweepResult<CronExpression> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(raise_error!(
                format!(
                    "Cron expression must have 5 fields, got {} in '{}'",
                    fields.len(),
                    expression
                ),
                ErrorCode::InvalidParameter
            ));
        }
        Ok(CronExpression {
            minutes: parse_field(fields[0], 0, 59)?,
            hours: parse_field(fields[1], 0, 23)?,
            days_of_month: parse_field(fields[2], 1, 31)?,
            months: parse_field(fields[3], 1, 12)?,
            days_of_week: parse_field(fields[4], 0, 6)?,
            dom_restricted: fields[2] != "*",
            dow_restricted: fields[4] != "*",
        })
    }

    pub fn matches(&self, at: DateTime<FixedOffset>) -> bool {
        if !self.minutes.contains(&(at.minute() as u8)) {
            return false;
        }
        if !self.hours.contains(&(at.hour() as u8)) {
            return false;
        }
        if !self.months.contains(&(at.month() as u8)) {
            return false;
        }
        let dom_match = self.days_of_month.contains(&(at.day() as u8));
        let dow_match = self
            .days_of_week
            .contains(&(at.weekday().num_days_from_sunday() as u8));
        match (self.dom_restricted, self.dow_restricted) {
            (true, true) => dom_match || dow_match,
            (true, false) => dom_match,
            (false, true) => dow_match,
            (false, false) => true,
        }
    }

    /// First fire time strictly after `after`, in the caller's timezone.
    /// Returns None when no fire falls within the search horizon (about
    /// four years, enough for any satisfiable 5-field expression).
    pub fn next_fire(&self, after: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
        let mut candidate = (after + Duration::minutes(1))
            .with_second(0)?
            .with_nanosecond(0)?;
        let horizon = after + Duration::days(4 * 366);
        while candidate <= horizon {
            if self.matches(candidate) {
                return Some(candidate);
            }
            // Skip whole hours/days when the coarse fields cannot match.
            if !self.months.contains(&(candidate.month() as u8)) {
                candidate = candidate
                    .with_day(1)?
                    .with_hour(0)?
                    .with_minute(0)?
                    .checked_add_months(chrono::Months::new(1))?;
                continue;
            }
            if !self.hours.contains(&(candidate.hour() as u8)) {
                candidate = (candidate + Duration::hours(1)).with_minute(0)?;
                continue;
            }
            candidate += Duration::minutes(1);
        }
        None
    }
}

fn parse_field(field: &str, min: u8, max: u8) -> MailSweepResult<Vec<u8>> {
    let mut values = Vec::new();
    for part in field.split(',') {
        let (range_part, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u8 = step.parse().map_err(|_| {
                    raise_error!(
                        format!("Invalid cron step '{step}'"),
                        ErrorCode::InvalidParameter
                    )
                })?;
                if step == 0 {
                    return Err(raise_error!(
                        "Cron step must be greater than 0".into(),
                        ErrorCode::InvalidParameter
                    ));
                }
                (range, step)
            }
            None => (part, 1),
        };

        let (start, end) = if range_part == "*" {
            (min, max)
        } else if let Some((a, b)) = range_part.split_once('-') {
            let start = parse_value(a, min, max)?;
            let end = parse_value(b, min, max)?;
            if start > end {
                return Err(raise_error!(
                    format!("Inverted cron range '{range_part}'"),
                    ErrorCode::InvalidParameter
                ));
            }
            (start, end)
        } else {
            let value = parse_value(range_part, min, max)?;
            (value, value)
        };

        let mut v = start;
        while v <= end {
            if !values.contains(&v) {
                values.push(v);
            }
            match v.checked_add(step) {
                Some(next) => v = next,
                None => break,
            }
        }
    }
    values.sort_unstable();
    Ok(values)
}

fn parse_value(value: &str, min: u8, max: u8) -> MailSweepResult<u8> {
    let parsed: u8 = value.parse().map_err(|_| {
        raise_error!(
            format!("Invalid cron value '{value}'"),
            ErrorCode::InvalidParameter
        )
    })?;
    if parsed < min || parsed > max {
        return Err(raise_error!(
            format!("Cron value '{parsed}' outside range {min}-{max}"),
            ErrorCode::InvalidParameter
        ));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(offset_minutes: i32, y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(offset_minutes * 60)
            .unwrap()
            .with_ymd_and_hms(y, mo, d, h, mi, 0)
            .unwrap()
    }

    #[test]
    fn rejects_malformed_expressions() {
        assert!(CronExpression::parse("* * * *").is_err());
        assert!(CronExpression::parse("61 * * * *").is_err());
        assert!(CronExpression::parse("*/0 * * * *").is_err());
        assert!(CronExpression::parse("5-1 * * * *").is_err());
        assert!(CronExpression::parse("a * * * *").is_err());
    }

    #[test]
    fn daily_at_three_thirty() {
        let cron = CronExpression::parse("30 3 * * *").unwrap();
        let next = cron.next_fire(at(0, 2026, 5, 10, 4, 0)).unwrap();
        assert_eq!(next, at(0, 2026, 5, 11, 3, 30));
    }

    #[test]
    fn next_fire_is_strictly_after() {
        let cron = CronExpression::parse("30 3 * * *").unwrap();
        let next = cron.next_fire(at(0, 2026, 5, 10, 3, 30)).unwrap();
        assert_eq!(next, at(0, 2026, 5, 11, 3, 30));
    }

    #[test]
    fn steps_and_lists() {
        let cron = CronExpression::parse("*/15 9-17 * * 1,3,5").unwrap();
        // 2026-05-11 is a Monday.
        let next = cron.next_fire(at(0, 2026, 5, 10, 12, 0)).unwrap();
        assert_eq!(next, at(0, 2026, 5, 11, 9, 0));
        let following = cron.next_fire(next).unwrap();
        assert_eq!(following, at(0, 2026, 5, 11, 9, 15));
    }

    #[test]
    fn dom_and_dow_fire_on_either() {
        // 1st of the month OR every Sunday.
        let cron = CronExpression::parse("0 0 1 * 0").unwrap();
        // 2026-05-10 is a Sunday; starting just after midnight Sunday the
        // next fire is the following Sunday, before June 1st.
        let next = cron.next_fire(at(0, 2026, 5, 10, 0, 0)).unwrap();
        assert_eq!(next, at(0, 2026, 5, 17, 0, 0));
    }

    #[test]
    fn timezone_offset_shifts_local_fire_time() {
        let cron = CronExpression::parse("0 9 * * *").unwrap();
        let next = cron.next_fire(at(120, 2026, 5, 10, 10, 0)).unwrap();
        assert_eq!(next.hour(), 9);
        assert_eq!(next.offset().local_minus_utc(), 120 * 60);
    }
}
