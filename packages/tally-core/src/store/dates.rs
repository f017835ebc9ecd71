//! Calendar-day normalization for price keys.
//!
//! Every date entering the price store is reduced to a `NaiveDate` and stored
//! as `YYYY-MM-DD`, so a datetime, a timezone-aware timestamp and a plain date
//! string for the same day all land on the same `(ticker, date)` key.

use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone};

const DAY_FORMAT: &str = "%Y-%m-%d";

/// Anything that identifies a single calendar day.
pub trait CalendarDay {
    fn calendar_day(&self) -> Result<NaiveDate>;
}

impl CalendarDay for NaiveDate {
    fn calendar_day(&self) -> Result<NaiveDate> {
        Ok(*self)
    }
}

impl CalendarDay for NaiveDateTime {
    fn calendar_day(&self) -> Result<NaiveDate> {
        Ok(self.date())
    }
}

/// The day in the timestamp's own offset, not converted to UTC.
impl<Tz: TimeZone> CalendarDay for DateTime<Tz> {
    fn calendar_day(&self) -> Result<NaiveDate> {
        Ok(self.date_naive())
    }
}

impl CalendarDay for &str {
    fn calendar_day(&self) -> Result<NaiveDate> {
        parse_day(self)
    }
}

impl CalendarDay for String {
    fn calendar_day(&self) -> Result<NaiveDate> {
        parse_day(self)
    }
}

/// Parse a date or timestamp string down to its calendar day.
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS`,
/// RFC 3339 and `YYYY-MM-DD HH:MM:SS+HH:MM`.
pub fn parse_day(raw: &str) -> Result<NaiveDate> {
    let s = raw.trim();

    if let Ok(day) = NaiveDate::parse_from_str(s, DAY_FORMAT) {
        return Ok(day);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.date_naive());
    }
    for format in ["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M:%S%.f%:z"] {
        if let Ok(ts) = DateTime::parse_from_str(s, format) {
            return Ok(ts.date_naive());
        }
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(ts.date());
        }
    }

    Err(Error::MalformedInput(format!("unrecognized date '{}'", raw)))
}

/// Canonical storage form of a calendar day.
pub fn format_day(day: NaiveDate) -> String {
    day.format(DAY_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_string_forms_collapse_to_same_day() {
        let expected = day(2024, 3, 15);
        for raw in [
            "2024-03-15",
            " 2024-03-15 ",
            "2024-03-15 00:00:00",
            "2024-03-15T16:00:00",
            "2024-03-15T00:00:00-04:00",
            "2024-03-15 00:00:00-04:00",
            "2024-03-15T09:30:00Z",
        ] {
            assert_eq!(parse_day(raw).unwrap(), expected, "input {:?}", raw);
        }
    }

    #[test]
    fn test_timezone_aware_keeps_local_day() {
        let eastern = FixedOffset::west_opt(5 * 3600).unwrap();
        let ts = eastern.with_ymd_and_hms(2024, 1, 2, 20, 0, 0).unwrap();
        // 01:00 UTC on the 3rd, but the exchange-local day is the 2nd
        assert_eq!(ts.calendar_day().unwrap(), day(2024, 1, 2));

        let utc = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        assert_eq!(utc.calendar_day().unwrap(), day(2024, 1, 2));
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(parse_day("yesterday"), Err(Error::MalformedInput(_))));
        assert!(matches!(parse_day("2024-13-40"), Err(Error::MalformedInput(_))));
    }

    #[test]
    fn test_format_day() {
        assert_eq!(format_day(day(2024, 1, 5)), "2024-01-05");
    }
}
