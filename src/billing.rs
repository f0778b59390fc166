//! Billing-period boundaries.
//!
//! A customer's billing cycle resets every month on the calendar day and UTC
//! time-of-day at which API access was granted (the anchor). Months shorter
//! than the anchor day clamp to their last day; they never roll over into
//! the following month.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Day-of-month and time-of-day at which a billing cycle resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingAnchor {
    day_of_month: u32,
    time_of_day: NaiveTime,
}

impl BillingAnchor {
    pub fn new(day_of_month: u32, hour: u32, minute: u32, second: u32) -> Result<Self, CoreError> {
        if !(1..=31).contains(&day_of_month) {
            return Err(CoreError::InvalidAnchor(format!(
                "day of month {} is outside 1..=31",
                day_of_month
            )));
        }

        let time_of_day = NaiveTime::from_hms_opt(hour, minute, second).ok_or_else(|| {
            CoreError::InvalidAnchor(format!(
                "time of day {:02}:{:02}:{:02} is out of range",
                hour, minute, second
            ))
        })?;

        Ok(Self {
            day_of_month,
            time_of_day,
        })
    }

    /// Anchor taken from the moment access was granted, to whole seconds.
    pub fn from_access_granted(granted_at: DateTime<Utc>) -> Self {
        Self {
            day_of_month: granted_at.day(),
            time_of_day: NaiveTime::from_hms_opt(
                granted_at.hour(),
                granted_at.minute(),
                granted_at.second(),
            )
            .unwrap_or(NaiveTime::MIN),
        }
    }

    pub fn day_of_month(&self) -> u32 {
        self.day_of_month
    }

    pub fn time_of_day(&self) -> NaiveTime {
        self.time_of_day
    }
}

/// Which billing period to resolve relative to "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PeriodSelector {
    #[default]
    Current,
    Previous,
}

/// Half-open UTC time range `[start, end)` with `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Interval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, CoreError> {
        if start >= end {
            return Err(CoreError::InvalidInterval { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn span(&self) -> Duration {
        self.end - self.start
    }
}

/// Length of the given calendar month, or `None` outside chrono's date range.
pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let (next_year, next) = next_month(year, month);
    let last = NaiveDate::from_ymd_opt(next_year, next, 1)?.pred_opt()?;
    Some(last.day())
}

/// The anchor's boundary instant within the given calendar month.
fn normalize_to_month(
    year: i32,
    month: u32,
    anchor: &BillingAnchor,
) -> Result<DateTime<Utc>, CoreError> {
    let date = days_in_month(year, month)
        .map(|len| anchor.day_of_month.min(len))
        .and_then(|day| NaiveDate::from_ymd_opt(year, month, day))
        .ok_or(CoreError::DateOutOfRange { year, month })?;

    Ok(Utc.from_utc_datetime(&date.and_time(anchor.time_of_day)))
}

fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

/// Start of the billing period containing `now`.
///
/// Day-of-month and time-of-day are compared against the anchor's raw day,
/// so the boundary instant itself belongs to the period it opens. In a month
/// shorter than the anchor day, `now` stays in the period that began the
/// month before.
pub fn current_period_start(
    now: DateTime<Utc>,
    anchor: &BillingAnchor,
) -> Result<DateTime<Utc>, CoreError> {
    let now_time = now.time().with_nanosecond(0).unwrap_or(now.time());
    let reached = (now.day(), now_time) >= (anchor.day_of_month, anchor.time_of_day);

    if reached {
        return normalize_to_month(now.year(), now.month(), anchor);
    }

    let (year, month) = previous_month(now.year(), now.month());
    normalize_to_month(year, month, anchor)
}

/// Resolve the `[start, end)` interval of the selected billing period.
///
/// `Previous` ends one microsecond before the current period starts, so the
/// two periods tile with neither gap nor overlap.
pub fn resolve_period(
    now: DateTime<Utc>,
    anchor: &BillingAnchor,
    selector: PeriodSelector,
) -> Result<Interval, CoreError> {
    let start = current_period_start(now, anchor)?;

    match selector {
        PeriodSelector::Current => {
            let (year, month) = next_month(start.year(), start.month());
            let end = normalize_to_month(year, month, anchor)?;
            Interval::new(start, end)
        }
        PeriodSelector::Previous => {
            let (year, month) = previous_month(start.year(), start.month());
            let previous_start = normalize_to_month(year, month, anchor)?;
            Interval::new(previous_start, start - Duration::microseconds(1))
        }
    }
}
