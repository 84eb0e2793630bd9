//! Calendar bucket tags for transaction dates.
//!
//! Rules implemented:
//! - month tag: `month{1..12}` from the calendar month
//! - holiday tag: `holiday{0,1}` against a fixed holiday list
//! - weekend tag: `weekend{0,1}` for weekday index {0,6} (Monday=0
//!   convention, so Monday and Sunday; Saturday is excluded)
//! - quarter tag: `q1` for months 1-3, `q2` for months 4-12

use chrono::{Datelike, NaiveDate};

/// 2018 bank holidays published by the Bank of Thailand, January through May.
pub const DEFAULT_BANK_HOLIDAYS: [(i32, u32, u32); 10] = [
    (2018, 1, 1),
    (2018, 1, 2),
    (2018, 3, 1),
    (2018, 4, 6),
    (2018, 4, 13),
    (2018, 4, 14),
    (2018, 4, 15),
    (2018, 4, 16),
    (2018, 5, 1),
    (2018, 5, 29),
];

pub fn default_holidays() -> Vec<NaiveDate> {
    DEFAULT_BANK_HOLIDAYS
        .iter()
        .map(|&(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).expect("valid holiday date expected"))
        .collect()
}

/// Bucket labels derived from one transaction date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarTags {
    pub month: String,
    pub holiday: String,
    pub weekend: String,
    pub quarter: String,
}

pub fn tag_date(date: NaiveDate, holidays: &[NaiveDate]) -> CalendarTags {
    CalendarTags {
        month: month_tag(date),
        holiday: holiday_tag(date, holidays),
        weekend: weekend_tag(date),
        quarter: quarter_tag(date),
    }
}

pub fn month_tag(date: NaiveDate) -> String {
    format!("month{}", date.month())
}

pub fn holiday_tag(date: NaiveDate, holidays: &[NaiveDate]) -> String {
    let flag = u8::from(holidays.contains(&date));
    format!("holiday{flag}")
}

/// Weekday index set {0,6} under Monday=0, matching the reference data.
pub fn weekend_tag(date: NaiveDate) -> String {
    let weekday = date.weekday().num_days_from_monday();
    let flag = u8::from(weekday == 0 || weekday == 6);
    format!("weekend{flag}")
}

pub fn quarter_tag(date: NaiveDate) -> String {
    let bucket = if date.month() < 4 { 1 } else { 2 };
    format!("q{bucket}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn month_tags_use_plain_month_numbers() {
        assert_eq!(month_tag(date(2018, 1, 15)), "month1");
        assert_eq!(month_tag(date(2018, 10, 2)), "month10");
        assert_eq!(month_tag(date(2018, 12, 31)), "month12");
    }

    #[test]
    fn new_years_day_is_a_holiday_and_jan_3_is_not() {
        let holidays = default_holidays();
        assert_eq!(holiday_tag(date(2018, 1, 1), &holidays), "holiday1");
        assert_eq!(holiday_tag(date(2018, 1, 3), &holidays), "holiday0");
    }

    #[test]
    fn all_default_holidays_are_tagged() {
        let holidays = default_holidays();
        assert_eq!(holidays.len(), 10);
        for holiday in &holidays {
            assert_eq!(holiday_tag(*holiday, &holidays), "holiday1");
        }
    }

    #[test]
    fn weekend_set_is_monday_and_sunday_not_saturday() {
        // 2018-01-01 Monday, 2018-01-07 Sunday, 2018-01-06 Saturday.
        assert_eq!(weekend_tag(date(2018, 1, 1)), "weekend1");
        assert_eq!(weekend_tag(date(2018, 1, 7)), "weekend1");
        assert_eq!(weekend_tag(date(2018, 1, 6)), "weekend0");
        assert_eq!(weekend_tag(date(2018, 1, 3)), "weekend0");
    }

    #[test]
    fn quarter_splits_at_april() {
        assert_eq!(quarter_tag(date(2018, 3, 31)), "q1");
        assert_eq!(quarter_tag(date(2018, 4, 1)), "q2");
        assert_eq!(quarter_tag(date(2018, 12, 25)), "q2");
    }

    #[test]
    fn tag_date_combines_all_buckets() {
        let holidays = default_holidays();
        let tags = tag_date(date(2018, 4, 16), &holidays);
        assert_eq!(
            tags,
            CalendarTags {
                month: "month4".to_string(),
                holiday: "holiday1".to_string(),
                weekend: "weekend1".to_string(),
                quarter: "q2".to_string(),
            }
        );
    }
}
