use chrono::{Datelike, NaiveDate};

use crate::error::{Result, SchedulerError};
use crate::types::{DayOfWeek, Frequency, ScheduleSpec};

/// 1-based week-of-month index of `date`: days 1–7 are week 1, 8–14 week 2,
/// and so on up to week 5. This is not the ISO week number.
pub fn week_of_month(date: NaiveDate) -> u8 {
    ((date.day() - 1) / 7 + 1) as u8
}

impl ScheduleSpec {
    /// Check the structural rules every persisted schedule must satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.days_of_week.is_empty() {
            return Err(SchedulerError::Validation(
                "days_of_week must not be empty".to_string(),
            ));
        }

        let Some(required) = self.frequency.required_week_numbers() else {
            return Ok(());
        };

        if self.week_numbers.len() != required {
            return Err(SchedulerError::Validation(format!(
                "{:?} schedule needs exactly {required} week_numbers, got {}",
                self.frequency,
                self.week_numbers.len()
            )));
        }
        if let Some(bad) = self.week_numbers.iter().find(|w| !(1..=5).contains(*w)) {
            return Err(SchedulerError::Validation(format!(
                "week number {bad} is outside 1..=5"
            )));
        }
        Ok(())
    }

    /// True when `date` is an occurrence of this schedule.
    pub fn matches(&self, date: NaiveDate) -> bool {
        if !self.days_of_week.contains(&DayOfWeek::from(date.weekday())) {
            return false;
        }
        match self.frequency {
            Frequency::Weekly => true,
            _ => self.week_numbers.contains(&week_of_month(date)),
        }
    }
}

/// Every occurrence of `spec` between `from` and `until`, both inclusive,
/// in ascending order.
///
/// Scans day by day. Returns an empty list when `from > until` or nothing
/// matches.
pub fn next_dates(spec: &ScheduleSpec, from: NaiveDate, until: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut day = Some(from);
    while let Some(d) = day.filter(|d| *d <= until) {
        if spec.matches(d) {
            dates.push(d);
        }
        day = d.succ_opt();
    }
    dates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn spec(frequency: Frequency, days: &[DayOfWeek], weeks: &[u8]) -> ScheduleSpec {
        ScheduleSpec {
            frequency,
            days_of_week: days.to_vec(),
            week_numbers: weeks.to_vec(),
        }
    }

    #[test]
    fn weekly_mon_wed_early_june() {
        let s = spec(Frequency::Weekly, &[DayOfWeek::Mon, DayOfWeek::Wed], &[]);
        assert_eq!(
            next_dates(&s, date("2025-06-01"), date("2025-06-10")),
            vec![date("2025-06-02"), date("2025-06-04"), date("2025-06-09")]
        );
    }

    #[test]
    fn biweekly_tuesdays_in_weeks_one_and_three() {
        let s = spec(Frequency::BiWeekly, &[DayOfWeek::Tue], &[1, 3]);
        assert_eq!(
            next_dates(&s, date("2025-06-01"), date("2025-06-30")),
            vec![date("2025-06-03"), date("2025-06-17")]
        );
    }

    #[test]
    fn triweekly_fridays_in_weeks_one_two_four() {
        let s = spec(Frequency::TriWeekly, &[DayOfWeek::Fri], &[1, 2, 4]);
        assert_eq!(
            next_dates(&s, date("2025-06-01"), date("2025-06-30")),
            vec![date("2025-06-06"), date("2025-06-13"), date("2025-06-27")]
        );
    }

    #[test]
    fn monthly_second_saturday() {
        let s = spec(Frequency::Monthly, &[DayOfWeek::Sat], &[2]);
        assert_eq!(
            next_dates(&s, date("2025-06-01"), date("2025-06-30")),
            vec![date("2025-06-14")]
        );
    }

    #[test]
    fn inverted_range_is_empty() {
        let s = spec(Frequency::Weekly, &[DayOfWeek::Mon], &[]);
        assert!(next_dates(&s, date("2025-06-10"), date("2025-06-01")).is_empty());
    }

    #[test]
    fn single_day_range_includes_the_day() {
        let s = spec(Frequency::Weekly, &[DayOfWeek::Mon], &[]);
        assert_eq!(
            next_dates(&s, date("2025-06-02"), date("2025-06-02")),
            vec![date("2025-06-02")]
        );
        assert!(next_dates(&s, date("2025-06-03"), date("2025-06-03")).is_empty());
    }

    #[test]
    fn weekly_ignores_week_numbers() {
        let with = spec(Frequency::Weekly, &[DayOfWeek::Thu], &[5]);
        let without = spec(Frequency::Weekly, &[DayOfWeek::Thu], &[]);
        let (from, until) = (date("2025-01-01"), date("2025-03-31"));
        assert_eq!(next_dates(&with, from, until), next_dates(&without, from, until));
    }

    #[test]
    fn weekly_returns_every_matching_weekday_once() {
        let s = spec(
            Frequency::Weekly,
            &[DayOfWeek::Sun, DayOfWeek::Fri, DayOfWeek::Fri],
            &[],
        );
        let (from, until) = (date("2024-02-01"), date("2024-12-31"));
        let dates = next_dates(&s, from, until);

        assert!(dates.windows(2).all(|w| w[0] < w[1]));
        let expected = from
            .iter_days()
            .take_while(|d| *d <= until)
            .filter(|d| matches!(d.weekday(), chrono::Weekday::Fri | chrono::Weekday::Sun))
            .count();
        assert_eq!(dates.len(), expected);
    }

    #[test]
    fn week_filtered_frequencies_agree_with_a_plain_day_filter() {
        let cases = [
            spec(Frequency::BiWeekly, &[DayOfWeek::Tue, DayOfWeek::Sat], &[1, 3]),
            spec(Frequency::BiWeekly, &[DayOfWeek::Sun], &[4, 5]),
            spec(Frequency::TriWeekly, &[DayOfWeek::Wed], &[2, 4, 5]),
            spec(Frequency::Monthly, &[DayOfWeek::Sun, DayOfWeek::Mon], &[5]),
            spec(Frequency::Monthly, &[DayOfWeek::Fri], &[1]),
        ];
        // Spans a leap February and several year boundaries.
        let (from, until) = (date("2023-11-15"), date("2026-03-10"));

        for s in &cases {
            let expected: Vec<NaiveDate> = from
                .iter_days()
                .take_while(|d| *d <= until)
                .filter(|d| {
                    s.days_of_week.contains(&DayOfWeek::from(d.weekday()))
                        && s.week_numbers.contains(&week_of_month(*d))
                })
                .collect();
            assert!(!expected.is_empty());
            assert_eq!(next_dates(s, from, until), expected, "{s:?}");
        }
    }

    #[test]
    fn fifth_week_only_in_long_months() {
        let s = spec(Frequency::Monthly, &[DayOfWeek::Mon], &[5]);
        // June 2025 has Mondays 2, 9, 16, 23, 30; only the 30th is week 5.
        assert_eq!(
            next_dates(&s, date("2025-06-01"), date("2025-06-30")),
            vec![date("2025-06-30")]
        );
        // February 2025 has 28 days and no week 5.
        assert!(next_dates(&s, date("2025-02-01"), date("2025-02-28")).is_empty());
    }

    #[test]
    fn week_of_month_boundaries() {
        assert_eq!(week_of_month(date("2025-06-01")), 1);
        assert_eq!(week_of_month(date("2025-06-07")), 1);
        assert_eq!(week_of_month(date("2025-06-08")), 2);
        assert_eq!(week_of_month(date("2025-06-28")), 4);
        assert_eq!(week_of_month(date("2025-06-29")), 5);
        assert_eq!(week_of_month(date("2025-01-31")), 5);
    }

    #[test]
    fn validate_rejects_empty_days() {
        let s = spec(Frequency::Weekly, &[], &[]);
        assert!(matches!(s.validate(), Err(SchedulerError::Validation(_))));
    }

    #[test]
    fn validate_enforces_week_number_cardinality() {
        assert!(spec(Frequency::Weekly, &[DayOfWeek::Mon], &[]).validate().is_ok());
        assert!(spec(Frequency::BiWeekly, &[DayOfWeek::Mon], &[1, 3]).validate().is_ok());
        assert!(spec(Frequency::BiWeekly, &[DayOfWeek::Mon], &[1]).validate().is_err());
        assert!(spec(Frequency::TriWeekly, &[DayOfWeek::Mon], &[1, 2]).validate().is_err());
        assert!(spec(Frequency::Monthly, &[DayOfWeek::Mon], &[1, 2]).validate().is_err());
        assert!(spec(Frequency::Monthly, &[DayOfWeek::Mon], &[6]).validate().is_err());
        assert!(spec(Frequency::Monthly, &[DayOfWeek::Mon], &[0]).validate().is_err());
    }
}
