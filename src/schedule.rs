//! The schedule calculator: pure date arithmetic for recurrence rules.
//!
//! Given the date an occurrence fell due and the template's recurrence rule,
//! [next_occurrence] computes the date the following occurrence falls due.
//! No database access happens here.

use time::{Date, Duration, Month};

use crate::Error;

/// The calendar unit a recurrence rule counts in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Frequency {
    /// Every `interval` days.
    Day,
    /// Every `interval` weeks.
    Week,
    /// Every `interval` calendar months of variable length.
    Month,
    /// Every `interval` calendar years.
    Year,
}

impl Frequency {
    /// The text stored in the `frequency` column for this frequency.
    pub fn as_code(&self) -> &'static str {
        match self {
            Frequency::Day => "day",
            Frequency::Week => "week",
            Frequency::Month => "month",
            Frequency::Year => "year",
        }
    }

    /// Decode the text stored in the `frequency` column.
    ///
    /// # Errors
    /// Returns [Error::InvalidFrequency] if `code` is not one of "day",
    /// "week", "month" or "year".
    pub fn from_code(code: &str) -> Result<Self, Error> {
        match code {
            "day" => Ok(Frequency::Day),
            "week" => Ok(Frequency::Week),
            "month" => Ok(Frequency::Month),
            "year" => Ok(Frequency::Year),
            _ => Err(Error::InvalidFrequency(code.to_owned())),
        }
    }
}

/// How often a recurring template emits an occurrence, e.g. "every 1 month"
/// or "every 2 weeks".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecurrenceRule {
    /// The calendar unit to count in.
    pub frequency: Frequency,
    /// How many units between occurrences. Always at least one.
    pub interval: u32,
}

impl RecurrenceRule {
    /// Create a recurrence rule of `interval` units of `frequency`.
    ///
    /// Intervals below one are bumped up to one, matching the validation the
    /// template-creation form applies before a rule reaches the database.
    pub fn new(frequency: Frequency, interval: u32) -> Self {
        Self {
            frequency,
            interval: interval.max(1),
        }
    }

    /// Decode a rule from its stored `frequency` text and `interval` columns.
    ///
    /// # Errors
    /// Returns [Error::InvalidFrequency] for unknown frequency text and
    /// [Error::InvalidInterval] for intervals below one. Either means the
    /// row was corrupted or written by a buggy client.
    pub fn decode(frequency_code: &str, interval: i64) -> Result<Self, Error> {
        let frequency = Frequency::from_code(frequency_code)?;

        if !(1..=i64::from(u32::MAX)).contains(&interval) {
            return Err(Error::InvalidInterval(interval));
        }

        Ok(Self {
            frequency,
            interval: interval as u32,
        })
    }
}

/// Compute the date the next occurrence falls due, strictly after
/// `current_due`.
///
/// Month and year arithmetic clamps day-of-month overflow to the last valid
/// day of the target month, so Jan 31 + 1 month is Feb 28 (or Feb 29 in a
/// leap year). This is a total function: every valid date and rule produces
/// a date.
pub fn next_occurrence(current_due: Date, rule: &RecurrenceRule) -> Date {
    let interval = i64::from(rule.interval);

    match rule.frequency {
        Frequency::Day => current_due + Duration::days(interval),
        Frequency::Week => current_due + Duration::weeks(interval),
        Frequency::Month => add_months(current_due, interval),
        Frequency::Year => add_months(current_due, interval * 12),
    }
}

/// Add `months` calendar months to `date`, clamping the day to the length of
/// the target month.
fn add_months(date: Date, months: i64) -> Date {
    let zero_based_month = i64::from(date.year()) * 12 + (date.month() as i64 - 1) + months;
    let year = zero_based_month.div_euclid(12) as i32;
    let month = Month::try_from((zero_based_month.rem_euclid(12) + 1) as u8)
        .expect("a value in 1..=12 is always a valid month");
    let day = date.day().min(time::util::days_in_month(month, year));

    Date::from_calendar_date(year, month, day)
        .expect("the day was clamped to the length of the target month")
}
