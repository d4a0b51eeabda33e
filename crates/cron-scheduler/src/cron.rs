//! Five-field cron expressions.
//!
//! Supports the classic crontab grammar (`minute hour day-of-month month
//! day-of-week`) with `*`, ranges, steps, lists, month and weekday names, plus
//! the common `@daily`-style macros. Seconds and years are not supported.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Timelike};

use crate::error::SchedulerError;

/// How far ahead `next_after` looks before concluding a schedule never fires.
const MAX_SEARCH_YEARS: i32 = 5;

const MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

const WEEKDAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Minute,
    Hour,
    DayOfMonth,
    Month,
    DayOfWeek,
}

impl Field {
    fn bounds(self) -> (u32, u32) {
        match self {
            Field::Minute => (0, 59),
            Field::Hour => (0, 23),
            Field::DayOfMonth => (1, 31),
            Field::Month => (1, 12),
            // 7 is accepted as an alias for Sunday.
            Field::DayOfWeek => (0, 7),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Field::Minute => "minute",
            Field::Hour => "hour",
            Field::DayOfMonth => "day-of-month",
            Field::Month => "month",
            Field::DayOfWeek => "day-of-week",
        }
    }

    fn named_value(self, token: &str) -> Option<u32> {
        let token = token.to_ascii_lowercase();
        let names: &[&str] = match self {
            Field::Month => &MONTH_NAMES,
            Field::DayOfWeek => &WEEKDAY_NAMES,
            _ => return None,
        };
        let offset = if self == Field::Month { 1 } else { 0 };
        names
            .iter()
            .position(|name| *name == token)
            .map(|index| index as u32 + offset)
    }

    fn value(self, token: &str) -> Result<u32, String> {
        let value = match token.parse::<u32>() {
            Ok(value) => value,
            Err(_) => self
                .named_value(token)
                .ok_or_else(|| format!("invalid {} value '{}'", self.label(), token))?,
        };
        let (min, max) = self.bounds();
        if value < min || value > max {
            return Err(format!(
                "{} value {} out of range {}-{}",
                self.label(),
                value,
                min,
                max
            ));
        }
        Ok(value)
    }
}

/// Set of allowed values for one field, one bit per value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ValueSet(u64);

impl ValueSet {
    fn insert(&mut self, value: u32) {
        self.0 |= 1 << value;
    }

    fn contains(self, value: u32) -> bool {
        self.0 & (1 << value) != 0
    }
}

/// A parsed cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    source: String,
    minutes: ValueSet,
    hours: ValueSet,
    days_of_month: ValueSet,
    months: ValueSet,
    days_of_week: ValueSet,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronSchedule {
    /// Parse a five-field cron expression or one of the `@` macros.
    pub fn parse(expression: &str) -> Result<Self, SchedulerError> {
        let trimmed = expression.trim();
        let expanded = match trimmed.to_ascii_lowercase().as_str() {
            "@yearly" | "@annually" => "0 0 1 1 *".to_string(),
            "@monthly" => "0 0 1 * *".to_string(),
            "@weekly" => "0 0 * * 0".to_string(),
            "@daily" | "@midnight" => "0 0 * * *".to_string(),
            "@hourly" => "0 * * * *".to_string(),
            _ => trimmed.to_string(),
        };

        let fields: Vec<&str> = expanded.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(SchedulerError::invalid_cron(
                expression,
                format!("expected 5 fields, found {}", fields.len()),
            ));
        }

        let parse = |token: &str, field: Field| {
            parse_field(token, field)
                .map_err(|reason| SchedulerError::invalid_cron(expression, reason))
        };

        let mut days_of_week = parse(fields[4], Field::DayOfWeek)?;
        if days_of_week.contains(7) {
            days_of_week.insert(0);
        }

        Ok(Self {
            source: trimmed.to_string(),
            minutes: parse(fields[0], Field::Minute)?,
            hours: parse(fields[1], Field::Hour)?,
            days_of_month: parse(fields[2], Field::DayOfMonth)?,
            months: parse(fields[3], Field::Month)?,
            days_of_week,
            dom_restricted: !fields[2].starts_with('*'),
            dow_restricted: !fields[4].starts_with('*'),
        })
    }

    /// The expression as it was written.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// First matching minute strictly after `after`, in `after`'s timezone.
    ///
    /// Local times that do not exist (DST gaps) are skipped; ambiguous local
    /// times resolve to their earliest instant. Returns `None` if nothing
    /// matches within the search horizon.
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let tz = after.timezone();
        let start = after
            .naive_local()
            .with_second(0)?
            .with_nanosecond(0)?
            .checked_add_signed(TimeDelta::minutes(1))?;
        let last_year = start.year() + MAX_SEARCH_YEARS;

        let mut candidate = start;
        while candidate.year() <= last_year {
            if !self.months.contains(candidate.month()) {
                candidate = first_minute_of_next_month(candidate)?;
                continue;
            }
            if !self.day_matches(candidate.date()) {
                candidate = candidate.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !self.hours.contains(candidate.hour()) {
                candidate = candidate
                    .date()
                    .and_hms_opt(candidate.hour(), 0, 0)?
                    .checked_add_signed(TimeDelta::hours(1))?;
                continue;
            }
            if !self.minutes.contains(candidate.minute()) {
                candidate = candidate.checked_add_signed(TimeDelta::minutes(1))?;
                continue;
            }

            match tz.from_local_datetime(&candidate).earliest() {
                Some(fire) if fire > *after => return Some(fire),
                _ => candidate = candidate.checked_add_signed(TimeDelta::minutes(1))?,
            }
        }

        None
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = self.days_of_month.contains(date.day());
        let dow = self.days_of_week.contains(date.weekday().num_days_from_sunday());
        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }
}

impl FromStr for CronSchedule {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn first_minute_of_next_month(t: NaiveDateTime) -> Option<NaiveDateTime> {
    let (year, month) = if t.month() == 12 {
        (t.year() + 1, 1)
    } else {
        (t.year(), t.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
}

fn parse_field(token: &str, field: Field) -> Result<ValueSet, String> {
    let (min, max) = field.bounds();
    let mut set = ValueSet::default();

    for part in token.split(',') {
        if part.is_empty() {
            return Err(format!("empty list element in {} field", field.label()));
        }

        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step = step
                    .parse::<u32>()
                    .ok()
                    .filter(|step| *step > 0)
                    .ok_or_else(|| format!("invalid step '{}' in {} field", step, field.label()))?;
                (range, Some(step))
            }
            None => (part, None),
        };

        let (low, high) = if range == "*" {
            (min, max)
        } else if let Some((low, high)) = range.split_once('-') {
            (field.value(low)?, field.value(high)?)
        } else {
            let value = field.value(range)?;
            // `5/10` means "from 5 to the end in steps of 10".
            if step.is_some() { (value, max) } else { (value, value) }
        };

        if low > high {
            return Err(format!(
                "range {}-{} is reversed in {} field",
                low,
                high,
                field.label()
            ));
        }

        for value in (low..=high).step_by(step.unwrap_or(1) as usize) {
            set.insert(value);
        }
    }

    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};
    use rstest::rstest;

    fn utc(s: &str) -> DateTime<Utc> {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
            .unwrap()
            .and_utc()
    }

    #[rstest]
    #[case("0 * * * *", "2024-05-01 10:15:00", "2024-05-01 11:00:00")]
    #[case("*/15 * * * *", "2024-05-01 10:15:00", "2024-05-01 10:30:00")]
    #[case("*/15 * * * *", "2024-05-01 10:14:59", "2024-05-01 10:15:00")]
    #[case("30 9 * * mon-fri", "2024-05-04 12:00:00", "2024-05-06 09:30:00")]
    #[case("0 0 1,15 * *", "2024-05-02 00:00:00", "2024-05-15 00:00:00")]
    #[case("0 0 13 * 5", "2024-05-01 00:00:00", "2024-05-03 00:00:00")]
    #[case("0 12 * dec sun", "2024-12-01 13:00:00", "2024-12-08 12:00:00")]
    #[case("0 0 * * 7", "2024-05-01 00:00:00", "2024-05-05 00:00:00")]
    #[case("0 0 29 2 *", "2024-03-01 00:00:00", "2028-02-29 00:00:00")]
    #[case("5/20 8-10 * * *", "2024-05-01 10:45:00", "2024-05-02 08:05:00")]
    #[case("@daily", "2024-12-31 23:59:00", "2025-01-01 00:00:00")]
    #[case("@hourly", "2024-05-01 10:59:30", "2024-05-01 11:00:00")]
    fn next_occurrence(#[case] expr: &str, #[case] after: &str, #[case] expected: &str) {
        let schedule = CronSchedule::parse(expr).unwrap();
        assert_eq!(schedule.next_after(&utc(after)), Some(utc(expected)));
    }

    #[rstest]
    #[case("not a cron")]
    #[case("* * * *")]
    #[case("* * * * * *")]
    #[case("60 * * * *")]
    #[case("* 24 * * *")]
    #[case("* * 0 * *")]
    #[case("*/0 * * * *")]
    #[case("5-1 * * * *")]
    #[case("* * * foo *")]
    #[case("1,,2 * * * *")]
    #[case("")]
    fn rejects_malformed(#[case] expr: &str) {
        let err = CronSchedule::parse(expr).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidCron { .. }), "{expr}: {err:?}");
    }

    #[test]
    fn impossible_date_never_fires() {
        let schedule = CronSchedule::parse("0 0 30 2 *").unwrap();
        assert_eq!(schedule.next_after(&utc("2024-01-01 00:00:00")), None);
    }

    #[test]
    fn next_is_strictly_after() {
        let schedule = CronSchedule::parse("0 * * * *").unwrap();
        let on_boundary = utc("2024-05-01 10:00:00");
        assert_eq!(schedule.next_after(&on_boundary), Some(utc("2024-05-01 11:00:00")));
    }

    #[test]
    fn respects_timezone_of_input() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let after = offset.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
        let schedule = CronSchedule::parse("0 9 * * *").unwrap();

        let next = schedule.next_after(&after).unwrap();
        assert_eq!(next, offset.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap());
        assert_eq!(next.with_timezone(&Utc), utc("2024-05-01 07:00:00"));
    }

    #[test]
    fn names_are_case_insensitive() {
        let upper = CronSchedule::parse("0 0 * JAN MON").unwrap();
        let lower = CronSchedule::parse("0 0 * jan mon").unwrap();
        let after = utc("2024-01-01 12:00:00");
        assert_eq!(upper.next_after(&after), lower.next_after(&after));
    }

    #[test]
    fn display_round_trips_source() {
        let schedule: CronSchedule = " 0 * * * * ".parse().unwrap();
        assert_eq!(schedule.to_string(), "0 * * * *");
        assert_eq!(schedule.as_str(), "0 * * * *");
    }
}
