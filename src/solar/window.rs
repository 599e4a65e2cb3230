use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};
use std::fmt;

use crate::metrics::{ENERGY_PRODUCED_LAST_DAY, ENERGY_PRODUCED_LAST_HOUR};

const BOUND_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Half-open local interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    /// Bounds in the format the monitoring API expects
    pub fn start_param(&self) -> String {
        self.start.format(BOUND_FORMAT).to_string()
    }

    pub fn end_param(&self) -> String {
        self.end.format(BOUND_FORMAT).to_string()
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start_param(), self.end_param())
    }
}

/// Trailing window reported by the solar stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportWindow {
    LastHour,
    LastDay,
}

impl ReportWindow {
    /// Windows selected by the CLI flags, hour first.
    pub fn from_flags(hour: bool, day: bool) -> Vec<ReportWindow> {
        let mut windows = Vec::new();
        if hour {
            windows.push(ReportWindow::LastHour);
        }
        if day {
            windows.push(ReportWindow::LastDay);
        }
        windows
    }

    pub fn measurement(&self) -> &'static str {
        match self {
            ReportWindow::LastHour => ENERGY_PRODUCED_LAST_HOUR,
            ReportWindow::LastDay => ENERGY_PRODUCED_LAST_DAY,
        }
    }

    /// Window ending at `now` truncated to the hour (or to midnight).
    pub fn span(&self, now: NaiveDateTime) -> TimeWindow {
        let midnight = now.date().and_time(NaiveTime::MIN);
        let end = match self {
            ReportWindow::LastHour => midnight + Duration::hours(i64::from(now.hour())),
            ReportWindow::LastDay => midnight,
        };
        let start = match self {
            ReportWindow::LastHour => end - Duration::hours(1),
            ReportWindow::LastDay => end - Duration::days(1),
        };
        TimeWindow { start, end }
    }

    /// Last hour takes the first hourly value, last day sums them all.
    /// Missing values count as zero.
    pub fn aggregate(&self, values: &[Option<f64>]) -> f64 {
        match self {
            ReportWindow::LastHour => values.first().copied().flatten().unwrap_or(0.0),
            ReportWindow::LastDay => values.iter().map(|v| v.unwrap_or(0.0)).sum(),
        }
    }
}

impl fmt::Display for ReportWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportWindow::LastHour => write!(f, "last hour"),
            ReportWindow::LastDay => write!(f, "last day"),
        }
    }
}
