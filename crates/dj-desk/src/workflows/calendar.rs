//! Working-day arithmetic over a snapshot of configured holidays.

use std::collections::BTreeSet;

use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HolidayKind {
    Government,
    Company,
}

/// A non-working date. Recurring holidays repeat on the same month/day every year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holiday {
    pub date: NaiveDate,
    pub kind: HolidayKind,
    #[serde(default)]
    pub recurring: bool,
    #[serde(default)]
    pub name: String,
}

impl Holiday {
    pub fn one_off(date: NaiveDate, kind: HolidayKind, name: impl Into<String>) -> Self {
        Self {
            date,
            kind,
            recurring: false,
            name: name.into(),
        }
    }

    pub fn recurring(date: NaiveDate, kind: HolidayKind, name: impl Into<String>) -> Self {
        Self {
            date,
            kind,
            recurring: true,
            name: name.into(),
        }
    }
}

/// Immutable calendar snapshot answering the business-day predicate.
#[derive(Debug, Clone, Default)]
pub struct HolidayCalendar {
    exact: BTreeSet<NaiveDate>,
    recurring: BTreeSet<(u32, u32)>,
}

impl HolidayCalendar {
    pub fn from_holidays<I>(holidays: I) -> Self
    where
        I: IntoIterator<Item = Holiday>,
    {
        let mut calendar = Self::default();
        for holiday in holidays {
            if holiday.recurring {
                calendar
                    .recurring
                    .insert((holiday.date.month(), holiday.date.day()));
            } else {
                calendar.exact.insert(holiday.date);
            }
        }
        calendar
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.exact.contains(&date) || self.recurring.contains(&(date.month(), date.day()))
    }

    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.is_holiday(date)
    }

    /// The date `days` working days after `start`.
    ///
    /// Walks forward one calendar day at a time and only counts working days, so the
    /// result is always a working day. With `days == 0` the first working day on or
    /// after `start` is returned. `None` when the walk runs past the last
    /// representable date.
    pub fn add_working_days(&self, start: NaiveDate, days: u32) -> Option<NaiveDate> {
        let mut current = start;
        if days == 0 {
            while !self.is_working_day(current) {
                current = current.checked_add_days(Days::new(1))?;
            }
            return Some(current);
        }

        let mut remaining = days;
        while remaining > 0 {
            current = current.checked_add_days(Days::new(1))?;
            if self.is_working_day(current) {
                remaining -= 1;
            }
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn friday_plus_two_lands_on_tuesday() {
        let calendar = HolidayCalendar::default();
        let friday = date(2025, 1, 3);
        assert_eq!(friday.weekday(), Weekday::Fri);
        assert_eq!(calendar.add_working_days(friday, 2), Some(date(2025, 1, 7)));
    }

    #[test]
    fn exact_holidays_are_skipped() {
        let calendar = HolidayCalendar::from_holidays([Holiday::one_off(
            date(2025, 1, 6),
            HolidayKind::Company,
            "Offsite",
        )]);
        assert!(!calendar.is_working_day(date(2025, 1, 6)));
        assert_eq!(calendar.add_working_days(date(2025, 1, 3), 2), Some(date(2025, 1, 8)));
    }

    #[test]
    fn recurring_holidays_apply_to_every_year() {
        let calendar = HolidayCalendar::from_holidays([Holiday::recurring(
            date(2019, 4, 13),
            HolidayKind::Government,
            "Songkran",
        )]);
        assert!(!calendar.is_working_day(date(2026, 4, 13)));
        assert!(!calendar.is_working_day(date(2027, 4, 13)));
        assert!(calendar.is_working_day(date(2026, 4, 14)));
    }

    #[test]
    fn leap_day_holiday_only_lands_in_leap_years() {
        let calendar = HolidayCalendar::from_holidays([Holiday::recurring(
            date(2024, 2, 29),
            HolidayKind::Company,
            "Leap day",
        )]);
        assert!(calendar.is_working_day(date(2027, 3, 1)));
        assert_eq!(calendar.add_working_days(date(2027, 2, 26), 1), Some(date(2027, 3, 1)));
        assert!(!calendar.is_working_day(date(2028, 2, 29)));
        assert_eq!(calendar.add_working_days(date(2028, 2, 28), 1), Some(date(2028, 3, 1)));
    }

    #[test]
    fn one_off_holidays_do_not_recur() {
        let calendar = HolidayCalendar::from_holidays([Holiday::one_off(
            date(2025, 5, 12),
            HolidayKind::Government,
            "Visakha Bucha",
        )]);
        assert!(!calendar.is_working_day(date(2025, 5, 12)));
        assert!(calendar.is_working_day(date(2026, 5, 12)));
    }

    #[test]
    fn results_are_always_working_days() {
        let calendar = HolidayCalendar::from_holidays([
            Holiday::one_off(date(2025, 12, 31), HolidayKind::Company, "Year end"),
            Holiday::recurring(date(2000, 1, 1), HolidayKind::Government, "New Year"),
            Holiday::one_off(date(2026, 1, 2), HolidayKind::Company, "Bridge day"),
        ]);

        let mut start = date(2025, 12, 20);
        while start < date(2026, 1, 20) {
            for days in 0..=5 {
                let result = calendar.add_working_days(start, days).expect("in range");
                assert!(
                    calendar.is_working_day(result),
                    "{start} + {days} produced non-working {result}"
                );
                if days > 0 {
                    let counted = start
                        .iter_days()
                        .skip(1)
                        .take_while(|day| *day <= result)
                        .filter(|day| calendar.is_working_day(*day))
                        .count();
                    assert_eq!(counted, days as usize);
                }
            }
            start = start.succ_opt().expect("next day");
        }
    }

    #[test]
    fn zero_days_rolls_forward_off_weekends() {
        let calendar = HolidayCalendar::default();
        assert_eq!(calendar.add_working_days(date(2025, 1, 4), 0), Some(date(2025, 1, 6)));
        assert_eq!(calendar.add_working_days(date(2025, 1, 7), 0), Some(date(2025, 1, 7)));
    }

    #[test]
    fn running_past_the_last_date_is_none() {
        let calendar = HolidayCalendar::default();
        assert_eq!(calendar.add_working_days(NaiveDate::MAX, 1), None);
        let near_end = NaiveDate::MAX
            .checked_sub_days(Days::new(10))
            .expect("in range");
        assert_eq!(calendar.add_working_days(near_end, 30), None);
    }
}
