//! # DF Week Calendar
//!
//! Week 5 starts Thursday 2022-09-29 00:00 UTC and every following week rolls
//! over at Thursday 00:00 UTC. Anything before week 5 is week `-1`.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use df_core::{DfError, Result};

use crate::constants::*;

/// DF week containing a unix timestamp
pub fn df_week(timestamp: i64) -> i64 {
    let elapsed = timestamp - WEEK5_START_TS;
    if elapsed < 0 {
        return -1;
    }
    FIRST_DF_WEEK + elapsed / WEEK_SECS
}

/// DF week containing 00:00 UTC of a date
pub fn df_week_of_date(date: NaiveDate) -> i64 {
    df_week(date_start_ts(date))
}

/// Unix time of 00:00 UTC on `date`
pub fn date_start_ts(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

/// Unix time at which a DF week starts
pub fn week_start_ts(week: i64) -> Option<i64> {
    if week < FIRST_DF_WEEK {
        return None;
    }
    Some(WEEK5_START_TS + (week - FIRST_DF_WEEK) * WEEK_SECS)
}

/// Calendar date on which a DF week starts
pub fn week_start_date(week: i64) -> Option<NaiveDate> {
    week_start_ts(week)
        .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
        .map(|dt| dt.date_naive())
}

/// DF weeks roll over on Thursdays
pub fn is_week_start(date: &NaiveDate) -> bool {
    date.weekday() == Weekday::Thu
}

/// Parse `YYYY-MM-DD`
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| DfError::InvalidInput(format!("bad date {s:?}: {e}")))
}

/// Parse a round start date; it must be a Thursday
pub fn parse_week_start(s: &str) -> Result<NaiveDate> {
    let date = parse_date(s)?;
    if !is_week_start(&date) {
        return Err(DfError::InvalidInput(format!(
            "{date} is a {}, DF weeks start on Thursday",
            date.weekday()
        )));
    }
    Ok(date)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    #[test]
    fn test_week_numbering() {
        assert_eq!(df_week_of_date(date("2022-09-28")), -1);
        assert_eq!(df_week_of_date(date("2022-09-29")), 5);
        assert_eq!(df_week_of_date(date("2022-10-05")), 5);
        assert_eq!(df_week_of_date(date("2022-10-06")), 6);
        assert_eq!(df_week_of_date(date("2023-11-02")), 62);
        assert_eq!(df_week_of_date(date("2025-03-13")), 133);
    }

    #[test]
    fn test_rollover_at_midnight_utc() {
        let week6 = week_start_ts(6).unwrap();
        assert_eq!(df_week(week6 - 1), 5);
        assert_eq!(df_week(week6), 6);
    }

    #[test]
    fn test_week_start_date_inverse() {
        for week in [5, 9, 28, 62, 133, 200] {
            let start = week_start_date(week).unwrap();
            assert!(is_week_start(&start));
            assert_eq!(df_week_of_date(start), week);
        }
        assert!(week_start_date(4).is_none());
    }

    #[test]
    fn test_parse_week_start_requires_thursday() {
        assert!(parse_week_start("2023-11-02").is_ok());
        assert!(parse_week_start("2023-11-03").is_err());
        assert!(parse_week_start("11/02/2023").is_err());
    }
}
