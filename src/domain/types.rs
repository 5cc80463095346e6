//! Shared identifier and parsing types for the gatehouse domain.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tenant identifier (one managed community / society)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub uuid::Uuid);

impl TenantId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn from_uuid(id: uuid::Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> uuid::Uuid {
        self.0
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned when a wire string does not name a known enum variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value:?}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

/// Wall-clock format for booking slots (`HH:MM`, 24h).
pub const CLOCK_FORMAT: &str = "%H:%M";

/// Calendar format for booking and visit dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse an `HH:MM` slot boundary.
pub fn parse_clock(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), CLOCK_FORMAT).ok()
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok()
}

/// Fixed-width RFC 3339 rendering (microseconds, `Z`) so stored timestamps sort lexically.
pub fn timestamp_string(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Calendar of the community the gate serves
///
/// Booking dates, visit dates and "today" are local calendar days at a fixed UTC offset. Stored
/// timestamps stay in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiteClock {
    offset: FixedOffset,
}

impl Default for SiteClock {
    fn default() -> Self {
        Self::utc()
    }
}

impl SiteClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn utc() -> Self {
        Self::new(Utc.fix())
    }

    /// Offset of the host the process runs on
    pub fn server_local() -> Self {
        Self::new(*chrono::Local::now().offset())
    }

    /// `Z`, `UTC`, `+05:30`, `-0400` or `+09`
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
            return Some(Self::utc());
        }

        let (sign, rest) = match s.as_bytes().first()? {
            b'+' => (1, &s[1..]),
            b'-' => (-1, &s[1..]),
            _ => return None,
        };
        let digits: String = rest.chars().filter(|c| *c != ':').collect();
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let (hours, minutes) = match digits.len() {
            2 => (digits.parse::<i32>().ok()?, 0),
            4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
            _ => return None,
        };
        if minutes >= 60 {
            return None;
        }
        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).map(Self::new)
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Local calendar day containing `at`
    pub fn date_of(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }

    pub fn today(&self) -> NaiveDate {
        self.date_of(Utc::now())
    }

    /// First instant of the local day
    pub fn day_start(&self, date: NaiveDate) -> DateTime<Utc> {
        let local_midnight = date.and_time(NaiveTime::MIN);
        Utc.from_utc_datetime(&local_midnight)
            - Duration::seconds(i64::from(self.offset.local_minus_utc()))
    }

    /// Last whole second of the local day
    pub fn day_end(&self, date: NaiveDate) -> DateTime<Utc> {
        self.day_start(date) + Duration::days(1) - Duration::seconds(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clock() {
        assert_eq!(parse_clock("09:00"), NaiveTime::from_hms_opt(9, 0, 0));
        assert_eq!(parse_clock(" 23:59 "), NaiveTime::from_hms_opt(23, 59, 0));
        assert!(parse_clock("9am").is_none());
        assert!(parse_clock("24:00").is_none());
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("2026-10-16"), NaiveDate::from_ymd_opt(2026, 10, 16));
        assert!(parse_date("16/10/2026").is_none());
    }

    #[test]
    fn test_timestamp_string_sorts_lexically() {
        let a = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let b = a + chrono::Duration::microseconds(1);
        let c = a + chrono::Duration::seconds(10);
        assert!(timestamp_string(&a) < timestamp_string(&b));
        assert!(timestamp_string(&b) < timestamp_string(&c));
        assert!(timestamp_string(&a).ends_with('Z'));
    }

    #[test]
    fn test_site_clock_parse() {
        let ist = SiteClock::parse("+05:30").unwrap();
        assert_eq!(ist.offset().local_minus_utc(), 5 * 3600 + 30 * 60);
        assert_eq!(SiteClock::parse("-0400").unwrap().offset().local_minus_utc(), -4 * 3600);
        assert_eq!(SiteClock::parse("+09").unwrap().offset().local_minus_utc(), 9 * 3600);
        assert_eq!(SiteClock::parse("UTC"), Some(SiteClock::utc()));
        assert!(SiteClock::parse("05:30").is_none());
        assert!(SiteClock::parse("+05:75").is_none());
        assert!(SiteClock::parse("+99:00").is_none());
        assert!(SiteClock::parse("+5a").is_none());
    }

    #[test]
    fn test_local_day_differs_from_utc_near_midnight() {
        let ist = SiteClock::parse("+05:30").unwrap();
        let late_utc = Utc.with_ymd_and_hms(2026, 10, 16, 20, 0, 0).unwrap();
        assert_eq!(ist.date_of(late_utc), NaiveDate::from_ymd_opt(2026, 10, 17).unwrap());
        assert_eq!(SiteClock::utc().date_of(late_utc), NaiveDate::from_ymd_opt(2026, 10, 16).unwrap());

        let pacific = SiteClock::parse("-08:00").unwrap();
        let early_utc = Utc.with_ymd_and_hms(2026, 10, 17, 3, 0, 0).unwrap();
        assert_eq!(pacific.date_of(early_utc), NaiveDate::from_ymd_opt(2026, 10, 16).unwrap());
    }

    #[test]
    fn test_day_bounds_follow_offset() {
        let ist = SiteClock::parse("+05:30").unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        assert_eq!(ist.day_start(day), Utc.with_ymd_and_hms(2026, 10, 16, 18, 30, 0).unwrap());
        assert_eq!(ist.day_end(day), Utc.with_ymd_and_hms(2026, 10, 17, 18, 29, 59).unwrap());
        assert_eq!(ist.date_of(ist.day_start(day)), day);
        assert_eq!(ist.date_of(ist.day_end(day)), day);
    }
}
