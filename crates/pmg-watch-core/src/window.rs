//! UTC day-aligned time ranges for the mail statistics query.

use chrono::{DateTime, Days, Utc};

/// The time range passed to the mail statistics endpoint.
///
/// Derived each cycle from "now" and a configured day count: the window
/// ends today at 23:59:59 UTC and starts `days - 1` days earlier at
/// 00:00:00 UTC, so a day count of 1 covers exactly the current UTC day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsWindow {
    /// Inclusive window start, seconds since the UNIX epoch.
    pub start: i64,
    /// Inclusive window end, seconds since the UNIX epoch.
    pub end: i64,
}

impl StatsWindow {
    /// Compute the window covering the trailing `days` UTC days as seen
    /// from `now`.
    ///
    /// # Errors
    ///
    /// Returns [`WindowError::ZeroDays`] for a day count of zero, and
    /// [`WindowError::OutOfRange`] if the start would fall before the
    /// calendar's representable range (never for realistic day counts).
    pub fn trailing_days(now: DateTime<Utc>, days: u32) -> Result<Self, WindowError> {
        if days == 0 {
            return Err(WindowError::ZeroDays);
        }

        let today = now.date_naive();
        let end = today
            .and_hms_opt(23, 59, 59)
            .expect("23:59:59 is a valid time")
            .and_utc();
        let start_day = today
            .checked_sub_days(Days::new(u64::from(days - 1)))
            .ok_or(WindowError::OutOfRange { days })?;
        let start = start_day
            .and_hms_opt(0, 0, 0)
            .expect("midnight is a valid time")
            .and_utc();

        Ok(Self {
            start: start.timestamp(),
            end: end.timestamp(),
        })
    }

    /// Window length in whole seconds.
    #[must_use]
    pub fn duration_secs(&self) -> i64 {
        self.end - self.start
    }
}

/// Errors from window computation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WindowError {
    /// A zero-day window is undefined.
    #[error("stats window requires at least one day")]
    ZeroDays,
    /// The day count walked off the representable calendar.
    #[error("stats window of {days} days is out of range")]
    OutOfRange {
        /// The rejected day count.
        days: u32,
    },
}
