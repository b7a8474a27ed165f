use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, TimeZone, Utc};

/// UTC offset of the operating timezone (Asia/Seoul, no DST).
pub const KST_OFFSET_SECS: i32 = 9 * 3600;

/// The fixed operating timezone every date comparison is normalised to.
pub static KST: LazyLock<FixedOffset> =
    LazyLock::new(|| FixedOffset::east_opt(KST_OFFSET_SECS).unwrap());

/// Parse a `YYYY-MM-DD` date. Blank or malformed input yields `None`.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// Convert a date-only string into 23:59:59 of that day in KST.
///
/// Returns `None` for blank or unparsable input, which callers treat as
/// "no deadline".
pub fn to_kst_end_of_day(date: &str) -> Option<DateTime<FixedOffset>> {
    let day = parse_date(date)?;
    KST.from_local_datetime(&day.and_hms_opt(23, 59, 59)?).single()
}

/// Convert a timestamp into the KST timezone.
///
/// Accepts RFC 3339 (`2025-01-10T10:00:00+09:00`), the JIRA REST form
/// (`2025-01-10T10:00:00.000+0900`) and bare dates, which are taken as
/// midnight KST.
pub fn to_kst(s: &str) -> Option<DateTime<FixedOffset>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&*KST));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&*KST));
    }
    let day = parse_date(s)?;
    KST.from_local_datetime(&day.and_hms_opt(0, 0, 0)?).single()
}

/// Current instant in KST.
pub fn now_kst() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&*KST)
}

/// Today's calendar date in KST.
pub fn today_kst() -> NaiveDate {
    now_kst().date_naive()
}

/// `YYYY-MM` bucket key for a calendar date.
pub fn month_key(d: NaiveDate) -> String {
    d.format("%Y-%m").to_string()
}

/// Get the last day of a given month.
pub fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1).unwrap() - Duration::days(1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1).unwrap() - Duration::days(1)
    }
}

/// Get the quarter (1-4) for a given date.
pub fn quarter_of(d: NaiveDate) -> u8 {
    ((d.month() - 1) / 3 + 1) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_to_kst_end_of_day() {
        let dt = to_kst_end_of_day("2025-01-15").unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-01-15T23:59:59+09:00");
        assert_eq!(dt.offset().local_minus_utc(), KST_OFFSET_SECS);
    }

    #[test]
    fn test_to_kst_end_of_day_invalid() {
        assert!(to_kst_end_of_day("").is_none());
        assert!(to_kst_end_of_day("not-a-date").is_none());
        assert!(to_kst_end_of_day("2025-02-30").is_none());
    }

    #[test]
    fn test_to_kst_converts_offset() {
        // 2025-01-10 20:00 UTC is already the next day in Seoul
        let dt = to_kst("2025-01-10T20:00:00Z").unwrap();
        assert_eq!(dt.date_naive(), NaiveDate::from_ymd_opt(2025, 1, 11).unwrap());
        assert_eq!(dt.hour(), 5);
    }

    #[test]
    fn test_to_kst_jira_format() {
        let dt = to_kst("2025-01-10T10:30:00.000+0900").unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-01-10T10:30:00+09:00");
    }

    #[test]
    fn test_to_kst_date_only() {
        let dt = to_kst("2025-03-01").unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-03-01T00:00:00+09:00");
        assert!(to_kst("garbage").is_none());
    }

    #[test]
    fn test_now_kst_offset() {
        assert_eq!(now_kst().offset().local_minus_utc(), KST_OFFSET_SECS);
    }

    #[test]
    fn test_month_key() {
        assert_eq!(month_key(NaiveDate::from_ymd_opt(2025, 3, 9).unwrap()), "2025-03");
    }

    #[test]
    fn test_last_day_of_month() {
        assert_eq!(
            last_day_of_month(2025, 1),
            NaiveDate::from_ymd_opt(2025, 1, 31).unwrap()
        );
        assert_eq!(
            last_day_of_month(2024, 2),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        ); // Leap year
        assert_eq!(
            last_day_of_month(2025, 12),
            NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()
        );
    }

    #[test]
    fn test_quarter_of() {
        assert_eq!(quarter_of(NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()), 1);
        assert_eq!(quarter_of(NaiveDate::from_ymd_opt(2025, 4, 1).unwrap()), 2);
        assert_eq!(
            quarter_of(NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()),
            4
        );
    }
}
