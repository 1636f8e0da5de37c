//! Month arithmetic used by the monthly rebalance schedule.

use chrono::{Datelike, NaiveDate};

/// Last calendar day of the month containing `date`.
pub fn month_end(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .unwrap_or(date)
}

/// Next month end strictly after `date`: a date that already sits on a month
/// end rolls forward to the following month's end.
pub fn roll_to_month_end(date: NaiveDate) -> NaiveDate {
    let end = month_end(date);
    if end != date {
        return end;
    }
    date.succ_opt().map(month_end).unwrap_or(date)
}

/// Holding-start date for a signal computed over the month ending `month_end`.
pub fn next_period_start(month_end: NaiveDate) -> NaiveDate {
    month_end.succ_opt().unwrap_or(month_end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_month_end_handles_leap_and_december() {
        assert_eq!(month_end(d(2024, 2, 10)), d(2024, 2, 29));
        assert_eq!(month_end(d(2023, 2, 1)), d(2023, 2, 28));
        assert_eq!(month_end(d(2021, 12, 5)), d(2021, 12, 31));
    }

    #[test]
    fn test_roll_to_month_end() {
        assert_eq!(roll_to_month_end(d(2021, 2, 1)), d(2021, 2, 28));
        // Already on a month end: rolls to the next one
        assert_eq!(roll_to_month_end(d(2021, 1, 31)), d(2021, 2, 28));
    }

    #[test]
    fn test_next_period_start() {
        assert_eq!(next_period_start(d(2021, 1, 31)), d(2021, 2, 1));
        assert_eq!(next_period_start(d(2021, 12, 31)), d(2022, 1, 1));
    }
}
