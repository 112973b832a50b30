//! Jalali (Persian solar) calendar arithmetic.
//!
//! Dates are converted through an absolute day count:
//! - Gregorian dates are counted with the 4/100/400 leap rule
//! - Jalali years are decomposed with the 33-year sub-cycle (8 leap years)
//!   and the 4-year minor cycle
//! - Month and day are resolved from the month-length tables
//!
//! The arithmetic is only exact for a bounded range, so every constructor
//! rejects dates outside [`JalaliDate::MIN`]..=[`JalaliDate::MAX`]
//! (Gregorian 1621-03-21 through 2500-03-20).

use crate::{Error, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// First Jalali year inside the convertible range
pub const MIN_JALALI_YEAR: i32 = 1000;

/// Last Jalali year inside the convertible range
pub const MAX_JALALI_YEAR: i32 = 1878;

/// Offset between the internal day count and `NaiveDate::num_days_from_ce`
const CE_OFFSET: i64 = 365;

const DAYS_BEFORE_GREGORIAN_MONTH: [i64; 12] =
    [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];

/// A date in the Jalali calendar, always inside the convertible range.
///
/// Serialized as `"YYYY/MM/DD"`. Field order makes the derived `Ord`
/// chronological.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JalaliDate {
    year: i32,
    month: u32,
    day: u32,
}

impl JalaliDate {
    /// Earliest supported date (Gregorian 1621-03-21)
    pub const MIN: JalaliDate = JalaliDate {
        year: MIN_JALALI_YEAR,
        month: 1,
        day: 1,
    };

    /// Latest supported date (Gregorian 2500-03-20)
    pub const MAX: JalaliDate = JalaliDate {
        year: MAX_JALALI_YEAR,
        month: 12,
        day: 30,
    };

    /// Create a date, validating month, leap-aware day and the supported range
    pub fn new(year: i32, month: u32, day: u32) -> Result<Self> {
        if !(MIN_JALALI_YEAR..=MAX_JALALI_YEAR).contains(&year) {
            return Err(Error::InvalidDate(format!(
                "year {} outside supported range {}..={}",
                year, MIN_JALALI_YEAR, MAX_JALALI_YEAR
            )));
        }
        if !(1..=12).contains(&month) {
            return Err(Error::InvalidDate(format!("month {} out of range", month)));
        }
        let len = month_length(year, month);
        if day == 0 || day > len {
            return Err(Error::InvalidDate(format!(
                "day {} out of range for {}/{:02} ({} days)",
                day, year, month, len
            )));
        }
        Ok(Self { year, month, day })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn day(&self) -> u32 {
        self.day
    }

    /// Convert a chrono Gregorian date
    pub fn from_naive_date(date: NaiveDate) -> Result<Self> {
        let days = i64::from(date.num_days_from_ce()) + CE_OFFSET;
        Self::check_day_count(days)?;
        let (jy, jm, jd) = jalali_parts_from_gregorian(date.year(), date.month(), date.day());
        Self::new(jy, jm, jd)
    }

    /// Gregorian `(year, month, day)` for this date
    pub fn to_gregorian(&self) -> (i32, u32, u32) {
        gregorian_parts_from_day_count(self.day_count())
    }

    /// Gregorian date as a chrono value
    pub fn to_naive_date(&self) -> Result<NaiveDate> {
        let (gy, gm, gd) = self.to_gregorian();
        NaiveDate::from_ymd_opt(gy, gm, gd)
            .ok_or_else(|| Error::InvalidDate(format!("{} has no Gregorian equivalent", self)))
    }

    /// Absolute day count shared by both calendars
    fn day_count(&self) -> i64 {
        let jy = i64::from(self.year) + 1595;
        let month = i64::from(self.month);
        let days_before_month = if month < 7 {
            (month - 1) * 31
        } else {
            (month - 7) * 30 + 186
        };
        -355_668
            + 365 * jy
            + jy.div_euclid(33) * 8
            + (jy.rem_euclid(33) + 3).div_euclid(4)
            + i64::from(self.day)
            + days_before_month
    }

    fn from_day_count(days: i64) -> Result<Self> {
        Self::check_day_count(days)?;
        let (gy, gm, gd) = gregorian_parts_from_day_count(days);
        let (jy, jm, jd) = jalali_parts_from_gregorian(gy, gm, gd);
        Self::new(jy, jm, jd)
    }

    fn check_day_count(days: i64) -> Result<()> {
        if days < Self::MIN.day_count() || days > Self::MAX.day_count() {
            return Err(Error::InvalidDate(format!(
                "date outside supported range {}..={}",
                Self::MIN,
                Self::MAX
            )));
        }
        Ok(())
    }
}

impl fmt::Display for JalaliDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}/{:02}/{:02}", self.year, self.month, self.day)
    }
}

impl FromStr for JalaliDate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse(s)
    }
}

impl TryFrom<String> for JalaliDate {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        parse(&s)
    }
}

impl From<JalaliDate> for String {
    fn from(date: JalaliDate) -> Self {
        date.to_string()
    }
}

/// Jalali leap year under the 33-year arithmetic used by the conversions
pub fn is_jalali_leap_year(year: i32) -> bool {
    let cycle_leaps = |jy: i64| jy.div_euclid(33) * 8 + (jy.rem_euclid(33) + 3).div_euclid(4);
    let jy = i64::from(year) + 1595;
    cycle_leaps(jy + 1) - cycle_leaps(jy) == 1
}

/// Gregorian 4/100/400 leap rule
pub fn is_gregorian_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Number of days in a Jalali month (month must be 1..=12)
pub fn month_length(year: i32, month: u32) -> u32 {
    match month {
        1..=6 => 31,
        7..=11 => 30,
        _ if is_jalali_leap_year(year) => 30,
        _ => 29,
    }
}

/// Convert a proleptic Gregorian date to Jalali
pub fn gregorian_to_jalali(year: i32, month: u32, day: u32) -> Result<JalaliDate> {
    let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
        Error::InvalidDate(format!("{:04}-{:02}-{:02} is not a Gregorian date", year, month, day))
    })?;
    JalaliDate::from_naive_date(date)
}

/// Convert a Jalali date to Gregorian `(year, month, day)`
pub fn jalali_to_gregorian(year: i32, month: u32, day: u32) -> Result<(i32, u32, u32)> {
    Ok(JalaliDate::new(year, month, day)?.to_gregorian())
}

/// Parse the canonical `"YYYY/MM/DD"` form
///
/// Month and day may omit their zero padding on input.
pub fn parse(s: &str) -> Result<JalaliDate> {
    let fields: Vec<&str> = s.trim().split('/').collect();
    if fields.len() != 3 {
        return Err(Error::InvalidDate(format!(
            "expected YYYY/MM/DD, got {:?}",
            s
        )));
    }
    let numeric = |field: &str| -> Result<u32> {
        if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidDate(format!(
                "non-numeric field {:?} in {:?}",
                field, s
            )));
        }
        field
            .parse::<u32>()
            .map_err(|e| Error::InvalidDate(format!("{:?}: {}", s, e)))
    };
    let widths_ok = fields[0].len() == 4 && fields[1].len() <= 2 && fields[2].len() <= 2;
    if !widths_ok {
        return Err(Error::InvalidDate(format!(
            "expected a 4-digit year and 1-2 digit month and day, got {:?}",
            s
        )));
    }
    let year = i32::try_from(numeric(fields[0])?)
        .map_err(|_| Error::InvalidDate(format!("year out of range in {:?}", s)))?;
    JalaliDate::new(year, numeric(fields[1])?, numeric(fields[2])?)
}

/// Canonical string form, zero-padded
pub fn format(date: &JalaliDate) -> String {
    date.to_string()
}

/// Shift a date by `days` (may be negative)
pub fn add_days(date: &JalaliDate, days: i64) -> Result<JalaliDate> {
    if days == 0 {
        return Ok(*date);
    }
    let target = date
        .day_count()
        .checked_add(days)
        .ok_or_else(|| Error::InvalidDate(format!("{} + {} days overflows", date, days)))?;
    JalaliDate::from_day_count(target)
}

/// Chronological comparison
///
/// `Less` when `a` is earlier. Since `diff_days(a, b)` counts forward from
/// `a`, `diff_days(a, b).signum()` matches `compare(b, a)`.
pub fn compare(a: &JalaliDate, b: &JalaliDate) -> Ordering {
    a.cmp(b)
}

/// Signed number of days from `a` to `b` (`b - a`)
pub fn diff_days(a: &JalaliDate, b: &JalaliDate) -> i64 {
    b.day_count() - a.day_count()
}

/// Jalali parts from a Gregorian date, using the 1600 epoch.
///
/// Only meaningful for Gregorian years after 1600.
fn jalali_parts_from_gregorian(gy: i32, gm: u32, gd: u32) -> (i32, u32, u32) {
    let gy = i64::from(gy) - 1600;
    let gy2 = if gm > 2 { gy + 1 } else { gy };
    let mut days = 365 * gy + (gy2 + 3).div_euclid(4) - (gy2 + 99).div_euclid(100)
        + (gy2 + 399).div_euclid(400)
        - 80
        + i64::from(gd)
        + DAYS_BEFORE_GREGORIAN_MONTH[(gm - 1) as usize];

    let mut jy = 979 + 33 * days.div_euclid(12053);
    days = days.rem_euclid(12053);
    jy += 4 * days.div_euclid(1461);
    days = days.rem_euclid(1461);
    if days > 365 {
        jy += (days - 1) / 365;
        days = (days - 1) % 365;
    }

    let (jm, jd) = if days < 186 {
        (1 + days / 31, 1 + days % 31)
    } else {
        (7 + (days - 186) / 30, 1 + (days - 186) % 30)
    };
    (jy as i32, jm as u32, jd as u32)
}

/// Gregorian parts from the shared day count
fn gregorian_parts_from_day_count(days: i64) -> (i32, u32, u32) {
    let mut gy = 400 * days.div_euclid(146_097);
    let mut days = days.rem_euclid(146_097);
    if days > 36_524 {
        days -= 1;
        gy += 100 * (days / 36_524);
        days %= 36_524;
        if days >= 365 {
            days += 1;
        }
    }
    gy += 4 * (days / 1461);
    days %= 1461;
    if days > 365 {
        gy += (days - 1) / 365;
        days = (days - 1) % 365;
    }

    let gy = gy as i32;
    let february = if is_gregorian_leap_year(gy) { 29 } else { 28 };
    let month_lengths = [31, february, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    let mut gd = days + 1;
    let mut gm = 1;
    for len in month_lengths {
        if gd <= len {
            break;
        }
        gd -= len;
        gm += 1;
    }
    (gy, gm, gd as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn d(s: &str) -> JalaliDate {
        parse(s).unwrap()
    }

    #[test]
    fn test_nowruz_fixed_point() {
        let nowruz = gregorian_to_jalali(2025, 3, 21).unwrap();
        assert_eq!((nowruz.year(), nowruz.month(), nowruz.day()), (1404, 1, 1));
        assert_eq!(jalali_to_gregorian(1404, 1, 1).unwrap(), (2025, 3, 21));
    }

    #[test]
    fn test_known_conversions() {
        assert_eq!(gregorian_to_jalali(2000, 1, 1).unwrap(), d("1378/10/11"));
        assert_eq!(jalali_to_gregorian(1005, 7, 26).unwrap(), (1626, 10, 18));
        assert_eq!(jalali_to_gregorian(1403, 12, 30).unwrap(), (2025, 3, 20));
    }

    #[test]
    fn test_gregorian_round_trip_over_domain() {
        let mut date = NaiveDate::from_ymd_opt(1621, 3, 21).unwrap();
        let last = NaiveDate::from_ymd_opt(2500, 3, 20).unwrap();
        while date <= last {
            let jalali = JalaliDate::from_naive_date(date).unwrap();
            assert_eq!(jalali.to_naive_date().unwrap(), date, "via {}", jalali);
            date += Duration::days(1);
        }
    }

    #[test]
    fn test_jalali_round_trip_over_domain() {
        for year in MIN_JALALI_YEAR..=MAX_JALALI_YEAR {
            for month in 1..=12 {
                for day in 1..=month_length(year, month) {
                    let (gy, gm, gd) = jalali_to_gregorian(year, month, day).unwrap();
                    let back = gregorian_to_jalali(gy, gm, gd).unwrap();
                    assert_eq!((back.year(), back.month(), back.day()), (year, month, day));
                }
            }
        }
    }

    #[test]
    fn test_leap_years() {
        assert!(is_jalali_leap_year(1403));
        assert!(!is_jalali_leap_year(1404));
        assert!(is_jalali_leap_year(1399));
        assert!(parse("1403/12/30").is_ok());
        assert!(matches!(parse("1404/12/30"), Err(Error::InvalidDate(_))));
        assert!(is_gregorian_leap_year(2000));
        assert!(!is_gregorian_leap_year(1900));
    }

    #[test]
    fn test_parse_and_format() {
        let date = d("1404/1/5");
        assert_eq!(format(&date), "1404/01/05");
        assert_eq!(date.to_string().parse::<JalaliDate>().unwrap(), date);
    }

    #[test]
    fn test_parse_rejects_malformed_input() {
        for bad in [
            "", "1404", "1404/01", "1404-01-01", "1404/01/01/01", "1404/aa/01", "1404/+1/01",
            "1404//01", "1404/13/01", "1404/00/10", "1404/07/31", "1404/01/00",
            "01404/01/01", "404/01/01", "1404/001/01", "1404/01/010",
        ] {
            assert!(
                matches!(parse(bad), Err(Error::InvalidDate(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_parse_rejects_out_of_domain_years() {
        assert!(matches!(parse("0999/12/29"), Err(Error::InvalidDate(_))));
        assert!(matches!(parse("1879/01/01"), Err(Error::InvalidDate(_))));
        assert!(matches!(
            gregorian_to_jalali(1600, 1, 1),
            Err(Error::InvalidDate(_))
        ));
        assert!(matches!(
            gregorian_to_jalali(2600, 1, 1),
            Err(Error::InvalidDate(_))
        ));
        assert!(matches!(gregorian_to_jalali(2023, 2, 29), Err(Error::InvalidDate(_))));
    }

    #[test]
    fn test_add_days_identities() {
        let start = d("1404/01/10");
        assert_eq!(add_days(&start, 0).unwrap(), start);
        for n in [-4000, -366, -31, -1, 1, 7, 30, 186, 365, 10_000] {
            let moved = add_days(&start, n).unwrap();
            assert_eq!(add_days(&moved, -n).unwrap(), start);
            assert_eq!(diff_days(&start, &moved), n);
        }
        assert_eq!(add_days(&start, 7).unwrap(), d("1404/01/17"));
        assert_eq!(add_days(&d("1403/12/29"), 1).unwrap(), d("1403/12/30"));
        assert_eq!(add_days(&d("1404/12/29"), 1).unwrap(), d("1405/01/01"));
        assert_eq!(add_days(&d("1404/06/31"), 1).unwrap(), d("1404/07/01"));
    }

    #[test]
    fn test_add_days_past_domain_fails() {
        assert!(matches!(
            add_days(&JalaliDate::MAX, 1),
            Err(Error::InvalidDate(_))
        ));
        assert!(matches!(
            add_days(&JalaliDate::MIN, -1),
            Err(Error::InvalidDate(_))
        ));
        assert!(matches!(
            add_days(&JalaliDate::MIN, i64::MAX),
            Err(Error::InvalidDate(_))
        ));
    }

    #[test]
    fn test_compare_agrees_with_diff_days() {
        let dates = [d("1399/12/30"), d("1404/01/01"), d("1404/06/31"), d("1404/07/01")];
        for a in &dates {
            for b in &dates {
                assert_eq!(diff_days(a, b), -diff_days(b, a));
                // diff_days counts forward from a, compare orders a against b
                assert_eq!(diff_days(a, b).cmp(&0), compare(b, a));
            }
        }
    }

    #[test]
    fn test_serde_uses_canonical_string() {
        let date = d("1404/1/9");
        let json = serde_json::to_string(&date).unwrap();
        assert_eq!(json, "\"1404/01/09\"");
        let back: JalaliDate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, date);
        assert!(serde_json::from_str::<JalaliDate>("\"1404/13/01\"").is_err());
    }
}
