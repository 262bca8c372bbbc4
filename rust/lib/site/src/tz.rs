use std::fmt;

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, Offset, TimeZone as _, Utc};
use chrono_tz::Tz;

/// Time zone of a site, user or request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeZone {
    /// The process' local zone.
    Local,
    Named(Tz),
}

impl TimeZone {
    /// Parse an IANA name such as `America/Sao_Paulo` or `UTC`.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        if name.eq_ignore_ascii_case("local") {
            return Some(TimeZone::Local);
        }
        name.parse::<Tz>().ok().map(TimeZone::Named)
    }

    /// Interpret a wall-clock time in this zone. Ambiguous times take the
    /// earliest instant; times in a DST gap are `None`.
    pub fn from_local(&self, naive: &NaiveDateTime) -> Option<DateTime<FixedOffset>> {
        match self {
            TimeZone::Local => Local
                .from_local_datetime(naive)
                .earliest()
                .map(|dt| dt.fixed_offset()),
            TimeZone::Named(tz) => tz
                .from_local_datetime(naive)
                .earliest()
                .map(|dt| dt.with_timezone(&dt.offset().fix())),
        }
    }

    pub fn now(&self) -> DateTime<FixedOffset> {
        let now = Utc::now();
        match self {
            TimeZone::Local => now.with_timezone(&Local).fixed_offset(),
            TimeZone::Named(tz) => {
                let dt = now.with_timezone(tz);
                dt.with_timezone(&dt.offset().fix())
            }
        }
    }
}

impl fmt::Display for TimeZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeZone::Local => f.write_str("Local"),
            TimeZone::Named(tz) => f.write_str(tz.name()),
        }
    }
}
