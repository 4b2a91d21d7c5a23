//! Period designators — week-of-month computation.
//!
//! Records are grouped under a week-of-month period (1–4): days 1–7 are
//! week 1, 8–14 week 2, 15–21 week 3, and everything from the 22nd on is
//! week 4. Five-week months fold their tail into week 4 so the period
//! domain stays fixed.

use chrono::{Datelike, NaiveDate, Utc};

/// Week-of-month (1–4) for the given date.
pub fn week_of_month(date: NaiveDate) -> u8 {
    match date.day() {
        1..=7 => 1,
        8..=14 => 2,
        15..=21 => 3,
        _ => 4,
    }
}

/// The period for today's date (UTC).
pub fn current_period() -> u8 {
    week_of_month(Utc::now().date_naive())
}

/// Today's date (UTC) — the observation date stamped on records.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_week_boundaries() {
        assert_eq!(week_of_month(date(2026, 3, 1)), 1);
        assert_eq!(week_of_month(date(2026, 3, 7)), 1);
        assert_eq!(week_of_month(date(2026, 3, 8)), 2);
        assert_eq!(week_of_month(date(2026, 3, 14)), 2);
        assert_eq!(week_of_month(date(2026, 3, 15)), 3);
        assert_eq!(week_of_month(date(2026, 3, 21)), 3);
        assert_eq!(week_of_month(date(2026, 3, 22)), 4);
    }

    #[test]
    fn test_fifth_week_folds_into_week_four() {
        assert_eq!(week_of_month(date(2026, 1, 29)), 4);
        assert_eq!(week_of_month(date(2026, 1, 31)), 4);
    }

    #[test]
    fn test_current_period_in_domain() {
        let p = current_period();
        assert!((1..=4).contains(&p));
    }
}
