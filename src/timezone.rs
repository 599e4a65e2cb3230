use chrono::{DateTime, Duration, Local, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TimeZoneError {
    #[error("unknown time zone '{0}'")]
    UnknownZone(String),
    #[error("local time {0} cannot be represented in zone {1}")]
    Unrepresentable(NaiveDateTime, String),
}

/// Zone in which meter timestamps and report windows are expressed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocalZone {
    /// Whatever the host is configured with
    System,
    Named(Tz),
}

impl LocalZone {
    pub fn named(name: &str) -> Result<Self, TimeZoneError> {
        name.parse::<Tz>()
            .map(LocalZone::Named)
            .map_err(|_| TimeZoneError::UnknownZone(name.to_string()))
    }

    /// Current wall-clock time in this zone.
    pub fn now(&self) -> NaiveDateTime {
        match self {
            LocalZone::System => Local::now().naive_local(),
            LocalZone::Named(tz) => Utc::now().with_timezone(tz).naive_local(),
        }
    }

    pub fn to_utc(&self, local: NaiveDateTime) -> Result<DateTime<Utc>, TimeZoneError> {
        match self {
            LocalZone::System => resolve(&Local, local, self),
            LocalZone::Named(tz) => resolve(tz, local, self),
        }
    }
}

impl fmt::Display for LocalZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalZone::System => write!(f, "system local"),
            LocalZone::Named(tz) => write!(f, "{}", tz.name()),
        }
    }
}

// Fall-back overlaps take the earlier instant. Spring-forward gaps use the
// offset in force before the transition.
fn resolve<Z: TimeZone>(
    zone: &Z,
    local: NaiveDateTime,
    label: &LocalZone,
) -> Result<DateTime<Utc>, TimeZoneError> {
    match zone.from_local_datetime(&local) {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        LocalResult::None => {
            let before = local - Duration::hours(1);
            match zone.from_local_datetime(&before) {
                LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => {
                    Ok(dt.with_timezone(&Utc) + Duration::hours(1))
                }
                LocalResult::None => Err(TimeZoneError::Unrepresentable(local, label.to_string())),
            }
        }
    }
}
