//! Calendar month layout and date arithmetic
//!
//! Everything here is pure: the same input date always produces the same grid,
//! and nothing touches storage or the clock.
//!
//! Weeks start on Sunday. The number of leading placeholders in a month grid is
//! the zero-based weekday index (Sunday = 0) of the 1st of that month.

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::error::{Result, SchedcastError};

/// One cell of a month grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "date", rename_all = "lowercase")]
pub enum CalendarCell {
    /// Empty cell before the 1st of the month
    Placeholder,
    /// A day of the month
    Day(NaiveDate),
}

impl CalendarCell {
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            CalendarCell::Placeholder => None,
            CalendarCell::Day(date) => Some(*date),
        }
    }
}

/// Ordered cells for one calendar month
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthGrid {
    pub year: i32,
    pub month: u32,
    pub cells: Vec<CalendarCell>,
}

impl MonthGrid {
    pub fn leading_placeholders(&self) -> usize {
        self.cells
            .iter()
            .take_while(|c| matches!(c, CalendarCell::Placeholder))
            .count()
    }

    /// Populated day cells in order
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.cells.iter().filter_map(CalendarCell::date)
    }

    /// Cells split into rows of seven; the last row may be short
    pub fn weeks(&self) -> impl Iterator<Item = &[CalendarCell]> {
        self.cells.chunks(7)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

/// Build the grid for the month containing `date`
pub fn month_grid(date: NaiveDate) -> MonthGrid {
    let first = first_of_month(date);
    let leading = first.weekday().num_days_from_sunday() as usize;
    let days = days_in_month(first.year(), first.month()) as usize;

    let mut cells = Vec::with_capacity(leading + days);
    cells.extend(std::iter::repeat(CalendarCell::Placeholder).take(leading));
    cells.extend(first.iter_days().take(days).map(CalendarCell::Day));

    MonthGrid {
        year: first.year(),
        month: first.month(),
        cells,
    }
}

/// Number of days in the given month (1-12); 0 for an out-of-range month
pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.day0()))
}

/// First day of the month `delta` months away from `date`'s month.
///
/// Returns `None` only when the result falls outside chrono's date range.
pub fn shift_month(date: NaiveDate, delta: i32) -> Option<NaiveDate> {
    let index = date.year() * 12 + date.month0() as i32 + delta;
    let year = index.div_euclid(12);
    let month = index.rem_euclid(12) as u32 + 1;
    NaiveDate::from_ymd_opt(year, month, 1)
}

/// Parse "YYYY-MM" into the first day of that month
pub fn parse_month(input: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(&format!("{}-01", input.trim()), "%Y-%m-%d").map_err(|_| {
        SchedcastError::Validation(format!(
            "Invalid month '{}'. Expected YYYY-MM",
            input
        ))
    })
}

/// Parse "YYYY-MM-DD"
pub fn parse_date(input: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d").map_err(|_| {
        SchedcastError::Validation(format!(
            "Invalid date '{}'. Expected YYYY-MM-DD",
            input
        ))
    })
}

/// Parse "HH:MM"
pub fn parse_time(input: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(input.trim(), "%H:%M").map_err(|_| {
        SchedcastError::Validation(format!("Invalid time '{}'. Expected HH:MM", input))
    })
}

/// Combine a calendar date and a local time-of-day in `tz` into an instant.
///
/// A local time that falls in a DST gap does not exist and is rejected. A
/// local time that occurs twice (fall-back overlap) resolves to the earlier
/// instant.
pub fn combine_date_time(date: NaiveDate, time: NaiveTime, tz: &Tz) -> Result<DateTime<Utc>> {
    match tz.from_local_datetime(&date.and_time(time)) {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        LocalResult::None => Err(SchedcastError::Validation(format!(
            "{} {} does not exist in {}",
            date,
            time.format("%H:%M"),
            tz.name()
        ))),
    }
}
