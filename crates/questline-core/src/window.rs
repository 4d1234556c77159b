//! Eligible earn window of a challenge month.
//!
//! A month's window is the half-open interval `[first instant of the month,
//! first instant of the next month)` in UTC, widened by a grace day: any
//! unlock dated on the last calendar day of the previous month also counts.

use chrono::{DateTime, Months, NaiveDate, NaiveTime, Utc};

use crate::error::InputError;
use crate::types::MonthKey;

/// Resolved earn window for one challenge month.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use questline_core::types::MonthKey;
/// use questline_core::window::EligibleWindow;
///
/// let window = EligibleWindow::resolve(MonthKey::new(2025, 3).unwrap()).unwrap();
/// assert!(window.contains(Utc.with_ymd_and_hms(2025, 3, 15, 12, 0, 0).unwrap()));
/// // Grace day: last day of February.
/// assert!(window.contains(Utc.with_ymd_and_hms(2025, 2, 28, 23, 59, 59).unwrap()));
/// // Half-open end.
/// assert!(!window.contains(Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap()));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EligibleWindow {
    month: MonthKey,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    grace_date: NaiveDate,
}

impl EligibleWindow {
    /// Compute the window for `month`. Pure: no clock reads.
    pub fn resolve(month: MonthKey) -> Result<Self, InputError> {
        let out_of_range = || InputError::MonthOutOfRange {
            year: month.year(),
            month: month.month(),
        };

        let first_day =
            NaiveDate::from_ymd_opt(month.year(), month.month(), 1).ok_or_else(out_of_range)?;
        let next_first_day = first_day
            .checked_add_months(Months::new(1))
            .ok_or_else(out_of_range)?;
        let grace_date = first_day.pred_opt().ok_or_else(out_of_range)?;

        Ok(Self {
            month,
            start: first_day.and_time(NaiveTime::MIN).and_utc(),
            end: next_first_day.and_time(NaiveTime::MIN).and_utc(),
            grace_date,
        })
    }

    pub fn month(&self) -> MonthKey {
        self.month
    }

    /// First instant of the month (inclusive).
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// First instant of the following month (exclusive).
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Last calendar day of the previous month.
    pub fn grace_date(&self) -> NaiveDate {
        self.grace_date
    }

    /// Whether an unlock at `at` counts toward this month.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        (self.start <= at && at < self.end) || at.date_naive() == self.grace_date
    }
}
