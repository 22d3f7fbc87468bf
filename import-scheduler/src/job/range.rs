//! Calendar date ranges for time series imports.
//!
//! A [`DateRange`] always satisfies `start < end`. The derivation helpers implement the
//! conventions used by the daily, monthly and seasonal forecast submissions, including the water
//! year convention: water year `N` runs from October 1 of `N - 1` through September 30 of `N`.
use chrono::{Datelike, Days, Months, NaiveDate};

use super::InvalidRequest;

/// The first valid water year accepted for seasonal forecast imports.
pub const MIN_WATER_YEAR: i32 = 1900;

/// An inclusive calendar date range where the start is strictly before the end.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Validate and construct a new range.
    ///
    /// # Example
    ///
    /// ```
    /// # use import_scheduler::job::{range::DateRange, InvalidRequest};
    /// # use chrono::NaiveDate;
    /// let jan_1 = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
    /// let jan_31 = NaiveDate::from_ymd_opt(2021, 1, 31).unwrap();
    ///
    /// assert!(DateRange::new(jan_1, jan_31).is_ok());
    /// assert!(matches!(
    ///     DateRange::new(jan_31, jan_1),
    ///     Err(InvalidRequest::EmptyRange { .. })
    /// ));
    /// ```
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, InvalidRequest> {
        if start < end {
            Ok(Self { start, end })
        } else {
            Err(InvalidRequest::EmptyRange { start, end })
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// A daily range between two optional dates.
    ///
    /// The end date defaults to, and is clamped at, `today`. When the start is missing or not
    /// before the end it falls back to `default_days` before the end.
    pub fn daily(
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        today: NaiveDate,
        default_days: u32,
    ) -> Result<Self, InvalidRequest> {
        let end = clamp_to_today(end, today);
        match start {
            Some(start) if start < end => Self::new(start, end),
            _ => Self::new(days_before(end, default_days)?, end),
        }
    }

    /// A daily range covering `days` days up to `end`.
    ///
    /// Missing, zero or negative day counts are replaced with `default_days`.
    pub fn daily_ending(
        end: Option<NaiveDate>,
        days: Option<i64>,
        today: NaiveDate,
        default_days: u32,
    ) -> Result<Self, InvalidRequest> {
        let end = clamp_to_today(end, today);
        let days = positive_count(days).unwrap_or(default_days);
        Self::new(days_before(end, days)?, end)
    }

    /// A monthly range between two optional dates, both moved to the first of their month.
    ///
    /// When the start is missing or not before the end it falls back to `default_months` before
    /// the end.
    pub fn monthly(
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        today: NaiveDate,
        default_months: u32,
    ) -> Result<Self, InvalidRequest> {
        let end = first_of_month(clamp_to_today(end, today));
        match start.map(first_of_month) {
            Some(start) if start < end => Self::new(start, end),
            _ => Self::new(months_before(end, default_months)?, end),
        }
    }

    /// A monthly range covering `months` months up to the first of the month of `end`.
    ///
    /// Missing, zero or negative month counts are replaced with `default_months`.
    pub fn monthly_ending(
        end: Option<NaiveDate>,
        months: Option<i64>,
        today: NaiveDate,
        default_months: u32,
    ) -> Result<Self, InvalidRequest> {
        let end = first_of_month(clamp_to_today(end, today));
        let months = positive_count(months).unwrap_or(default_months);
        Self::new(months_before(end, months)?, end)
    }

    /// The range covering `num_years` water years ending with `end_water_year`.
    ///
    /// Water years before [`MIN_WATER_YEAR`] or after the current water year are replaced with
    /// the current water year, and a missing or non-positive count means a single year.
    ///
    /// The range covers whole water years only: it starts on October 1 and ends on September 30,
    /// not on the September 1 forecast bulletin date.
    pub fn water_years(
        end_water_year: Option<i32>,
        num_years: Option<i32>,
        today: NaiveDate,
    ) -> Result<Self, InvalidRequest> {
        let current = water_year(today);
        let end_water_year = end_water_year
            .filter(|year| (MIN_WATER_YEAR..=current).contains(year))
            .unwrap_or(current);
        let num_years = num_years.filter(|years| *years > 0).unwrap_or(1);
        let start = NaiveDate::from_ymd_opt(end_water_year - num_years, 10, 1)
            .ok_or(InvalidRequest::DateOutOfRange)?;
        let end = NaiveDate::from_ymd_opt(end_water_year, 9, 30)
            .ok_or(InvalidRequest::DateOutOfRange)?;
        Self::new(start, end)
    }
}

/// The water year a date belongs to.
pub fn water_year(date: NaiveDate) -> i32 {
    if date.month() >= 10 {
        date.year() + 1
    } else {
        date.year()
    }
}

fn clamp_to_today(date: Option<NaiveDate>, today: NaiveDate) -> NaiveDate {
    date.map_or(today, |date| date.min(today))
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.day0()))
}

fn positive_count(count: Option<i64>) -> Option<u32> {
    count
        .filter(|count| *count > 0)
        .map(|count| u32::try_from(count).unwrap_or(u32::MAX))
}

fn days_before(date: NaiveDate, days: u32) -> Result<NaiveDate, InvalidRequest> {
    date.checked_sub_days(Days::new(days.into()))
        .ok_or(InvalidRequest::DateOutOfRange)
}

fn months_before(date: NaiveDate, months: u32) -> Result<NaiveDate, InvalidRequest> {
    date.checked_sub_months(Months::new(months))
        .ok_or(InvalidRequest::DateOutOfRange)
}
