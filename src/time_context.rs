//! Calendar ranges for the generation prompt
//!
//! Computed once per request from the configured reporting time zone. All
//! ranges are closed intervals of whole dates; week boundaries follow ISO
//! numbering (Monday starts the week).

use chrono::{Datelike, Duration, NaiveDate, Utc};
use chrono_tz::Tz;

/// Named calendar ranges relative to "today" in the reporting zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeContext {
    pub today: NaiveDate,
    pub yesterday: NaiveDate,
    pub last_month_start: NaiveDate,
    pub last_month_end: NaiveDate,
    pub last_week_start: NaiveDate,
    pub last_week_end: NaiveDate,
    pub this_year_start: NaiveDate,
    pub this_month_start: NaiveDate,
}

impl TimeContext {
    /// Context for the current instant in `tz`.
    pub fn now(tz: Tz) -> Self {
        Self::for_date(Utc::now().with_timezone(&tz).date_naive())
    }

    /// Context for an explicit date. Deterministic; used directly in tests.
    pub fn for_date(today: NaiveDate) -> Self {
        let yesterday = today - Duration::days(1);

        // Last month: step back one day from the first of the current month,
        // then take that day's own first-of-month. Handles year rollover.
        let this_month_start = first_of_month(today);
        let last_month_end = this_month_start - Duration::days(1);
        let last_month_start = first_of_month(last_month_end);

        // Last week, Monday through Sunday.
        let this_week_start =
            today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
        let last_week_start = this_week_start - Duration::days(7);
        let last_week_end = this_week_start - Duration::days(1);

        let this_year_start = NaiveDate::from_ymd_opt(today.year(), 1, 1)
            .expect("january 1st exists in every year");

        Self {
            today,
            yesterday,
            last_month_start,
            last_month_end,
            last_week_start,
            last_week_end,
            this_year_start,
            this_month_start,
        }
    }

    /// Prompt block handed to the generation gateway.
    pub fn render(&self) -> String {
        format!(
            "Current Date: {today}\n\
             Today: {today}\n\
             Yesterday: {yesterday}\n\
             Last Month Range: {lm_start} to {lm_end}\n\
             Last Week Range (Mon-Sun): {lw_start} to {lw_end}\n\
             This Year Range: {year_start} to {today}\n\
             This Month Range: {month_start} to {today}\n",
            today = self.today,
            yesterday = self.yesterday,
            lm_start = self.last_month_start,
            lm_end = self.last_month_end,
            lw_start = self.last_week_start,
            lw_end = self.last_week_end,
            year_start = self.this_year_start,
            month_start = self.this_month_start,
        )
    }
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
        .expect("day 1 exists in every month")
}
