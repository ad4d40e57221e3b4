//! DOS date/time packing for archive entry headers.
//!
//! The ZIP format stores modification times as two 16-bit words with
//! 2-second resolution and no zone information. Zone resolution is the
//! caller's job: every constructor here takes already-resolved fields (or a
//! UTC instant) and the codec never consults the host clock or local zone.
//!
//! ```
//! use ditto_core::timestamp::ArchiveTimestamp;
//!
//! let ts = ArchiveTimestamp::new(1980, 1, 1, 0, 0, 0).unwrap();
//! assert_eq!(ts.pack().date, 0x0021);
//! ```

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use std::str::FromStr;

use crate::error::{BuildError, Result};

/// First year representable in a packed date.
pub const MIN_YEAR: u16 = 1980;
/// Last year representable in a packed date (7-bit year offset).
pub const MAX_YEAR: u16 = 2107;

/// A single resolved instant, applied identically to every entry of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchiveTimestamp {
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
}

impl ArchiveTimestamp {
    /// 1980-01-01T00:00:00, the earliest representable instant.
    pub const DOS_EPOCH: Self = Self {
        year: MIN_YEAR,
        month: 1,
        day: 1,
        hour: 0,
        minute: 0,
        second: 0,
    };

    /// Build from explicit calendar fields.
    ///
    /// Rejects years outside 1980..=2107 and any combination that is not a
    /// real calendar date or wall-clock time (month 0, day 0, Feb 30,
    /// hour 24, second 60, ...). Nothing is clamped.
    pub fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Result<Self> {
        if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return Err(BuildError::InvalidTimestamp(format!(
                "year {} outside {}..={}",
                year, MIN_YEAR, MAX_YEAR
            )));
        }
        if NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day)).is_none() {
            return Err(BuildError::InvalidTimestamp(format!(
                "{:04}-{:02}-{:02} is not a calendar date",
                year, month, day
            )));
        }
        if NaiveTime::from_hms_opt(u32::from(hour), u32::from(minute), u32::from(second)).is_none()
        {
            return Err(BuildError::InvalidTimestamp(format!(
                "{:02}:{:02}:{:02} is not a wall-clock time",
                hour, minute, second
            )));
        }
        Ok(Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
        })
    }

    /// Take the fields of a naive date-time as declared. No zone conversion.
    pub fn from_naive(dt: &NaiveDateTime) -> Result<Self> {
        let year = u16::try_from(dt.year())
            .map_err(|_| BuildError::InvalidTimestamp(format!("year {} out of range", dt.year())))?;
        // chrono keeps a leap second as second 59 plus >= 1s of nanoseconds.
        if dt.nanosecond() >= 1_000_000_000 {
            return Err(BuildError::InvalidTimestamp(format!(
                "{} is a leap second",
                dt.format("%Y-%m-%dT%H:%M:60")
            )));
        }
        // chrono guarantees the remaining fields are in range for u8.
        Self::new(
            year,
            dt.month() as u8,
            dt.day() as u8,
            dt.hour() as u8,
            dt.minute() as u8,
            dt.second() as u8,
        )
    }

    /// Take the UTC wall-clock fields of an instant.
    pub fn from_utc(dt: &DateTime<Utc>) -> Result<Self> {
        Self::from_naive(&dt.naive_utc())
    }

    /// Seconds since the Unix epoch, interpreted in UTC (`SOURCE_DATE_EPOCH`).
    pub fn from_unix_seconds(secs: i64) -> Result<Self> {
        let dt = DateTime::<Utc>::from_timestamp(secs, 0).ok_or_else(|| {
            BuildError::InvalidTimestamp(format!("unix time {} out of range", secs))
        })?;
        Self::from_utc(&dt)
    }

    pub fn year(&self) -> u16 {
        self.year
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    pub fn day(&self) -> u8 {
        self.day
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    pub fn second(&self) -> u8 {
        self.second
    }

    /// Pack into the DOS representation. Odd seconds round down.
    pub fn pack(&self) -> PackedDateTime {
        let date = ((self.year - MIN_YEAR) << 9) | (u16::from(self.month) << 5) | u16::from(self.day);
        let time = (u16::from(self.hour) << 11)
            | (u16::from(self.minute) << 5)
            | u16::from(self.second / 2);
        PackedDateTime { date, time }
    }
}

impl Default for ArchiveTimestamp {
    fn default() -> Self {
        Self::DOS_EPOCH
    }
}

impl std::fmt::Display for ArchiveTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// Parses `YYYY-MM-DDTHH:MM:SS` as declared fields, or RFC 3339 with an
/// explicit offset, which is converted to UTC first.
impl FromStr for ArchiveTimestamp {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Self::from_utc(&dt.with_timezone(&Utc));
        }
        for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
                return Self::from_naive(&dt);
            }
        }
        Err(BuildError::InvalidTimestamp(format!(
            "cannot parse {:?} (expected YYYY-MM-DDTHH:MM:SS or RFC 3339)",
            s
        )))
    }
}

/// Packed DOS date and time words as they appear in entry headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PackedDateTime {
    pub date: u16,
    pub time: u16,
}

impl PackedDateTime {
    /// Unpack. Seconds come back even (the format has 2-second resolution).
    pub fn decode(&self) -> Result<ArchiveTimestamp> {
        let year = MIN_YEAR + (self.date >> 9);
        let month = ((self.date >> 5) & 0x0f) as u8;
        let day = (self.date & 0x1f) as u8;
        let hour = (self.time >> 11) as u8;
        let minute = ((self.time >> 5) & 0x3f) as u8;
        let second = ((self.time & 0x1f) * 2) as u8;
        ArchiveTimestamp::new(year, month, day, hour, minute, second)
    }

    /// The combined `date << 16 | time` form used by some tools.
    pub fn to_dos_u32(&self) -> u32 {
        (u32::from(self.date) << 16) | u32::from(self.time)
    }
}

/// Validate calendar fields and pack them in one step.
pub fn encode(
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
) -> Result<PackedDateTime> {
    ArchiveTimestamp::new(year, month, day, hour, minute, second).map(|ts| ts.pack())
}
