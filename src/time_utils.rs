// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting and calendar arithmetic.

use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat, Utc};

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC3339 timestamp (any offset) into UTC.
pub fn parse_utc_rfc3339(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Whole 24-hour periods elapsed from `earlier` to `later` (floored).
///
/// Negative when `later` precedes `earlier`.
pub fn whole_days_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> i64 {
    (later - earlier).num_seconds().div_euclid(SECONDS_PER_DAY)
}

/// Calendar days from `earlier` to `later`.
pub fn calendar_days_between(earlier: NaiveDate, later: NaiveDate) -> i64 {
    (later - earlier).num_days()
}

/// `(year, month)` key of a date, months numbered from 1.
pub fn month_key(date: NaiveDate) -> (i32, u32) {
    (date.year(), date.month())
}

/// Step a `(year, month)` key back by `months`.
pub fn months_back(key: (i32, u32), months: u32) -> (i32, u32) {
    let index = key.0 * 12 + key.1 as i32 - 1 - months as i32;
    (index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
}

/// Three-letter English abbreviation for a month number (1-12).
pub fn month_abbrev(month: u32) -> &'static str {
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];
    MONTHS[(month.clamp(1, 12) - 1) as usize]
}

/// Render whole seconds as `HH:MM:SS`.
pub fn format_hms(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_whole_days_between_floors() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 22, 0, 0).unwrap();
        assert_eq!(whole_days_between(start, start + Duration::hours(23)), 0);
        assert_eq!(whole_days_between(start, start + Duration::hours(24)), 1);
        assert_eq!(whole_days_between(start, start + Duration::hours(71)), 2);
        assert_eq!(whole_days_between(start, start - Duration::hours(1)), -1);
    }

    #[test]
    fn test_months_back_wraps_year() {
        assert_eq!(months_back((2024, 3), 5), (2023, 10));
        assert_eq!(months_back((2024, 12), 0), (2024, 12));
        assert_eq!(months_back((2024, 1), 1), (2023, 12));
    }

    #[test]
    fn test_format_hms() {
        assert_eq!(format_hms(0), "00:00:00");
        assert_eq!(format_hms(3725), "01:02:05");
    }

    #[test]
    fn test_rfc3339_round_trip_offset() {
        let parsed = parse_utc_rfc3339("2024-01-15T10:30:00+02:00").unwrap();
        assert_eq!(format_utc_rfc3339(parsed), "2024-01-15T08:30:00.000Z");
        assert!(parse_utc_rfc3339("yesterday").is_none());
    }
}
