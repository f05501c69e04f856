//! Recurrence rule evaluation and rendering.
//!
//! Pure, non-suspending functions: evaluate whether a rule fires on a
//! date, find the next firing date within a bounded horizon, and render
//! a rule as a short stable label. Evaluation never fails; rule shapes
//! that cannot be recognized have already degraded to `Daily` at
//! deserialization time.

use crate::types::{local_date_of_ms, Frequency, Medication, Recurrence};
use chrono::{Datelike, Duration, NaiveDate};

/// Forward-scan horizon for `next_due_date`, in days
pub const NEXT_DUE_HORIZON_DAYS: i64 = 60;

/// Day-of-week index, 0=Sunday..6=Saturday
fn dow(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// Drop out-of-range entries, sort Sunday-first, dedupe
fn normalize_days(days: &[u8]) -> Vec<u8> {
    let mut days: Vec<u8> = days.iter().copied().filter(|d| *d < 7).collect();
    days.sort_unstable();
    days.dedup();
    days
}

/// Monday of the week containing `date`
fn monday_of(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

fn days_in_month(date: NaiveDate) -> u32 {
    let (year, month) = (date.year(), date.month());
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    first_of_next
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(30)
}

/// Whether a recurrence rule fires on the given date
pub fn is_due(rule: &Recurrence, date: NaiveDate) -> bool {
    match rule {
        Recurrence::Daily => true,

        Recurrence::Weekly { days } => {
            let days = normalize_days(days);
            days.is_empty() || days.contains(&dow(date))
        }

        Recurrence::EveryNWeeks { n, days, anchor } => {
            let days = normalize_days(days);
            if !days.is_empty() && !days.contains(&dow(date)) {
                return false;
            }
            // Cycle boundaries are Monday-aligned; rem_euclid keeps the
            // arithmetic correct for dates before the anchor.
            let anchor_date = match local_date_of_ms(*anchor) {
                Some(d) => d,
                None => return true,
            };
            let n = i64::from((*n).max(1));
            let weeks_diff = (monday_of(date) - monday_of(anchor_date)).num_days() / 7;
            weeks_diff.rem_euclid(n) == 0
        }

        Recurrence::MonthlyByDate { day_of_month } => {
            // Clamp to the last day of shorter months; the one-day
            // window tolerates edge-of-month drift and never wraps into
            // the next month.
            let effective = u32::from(*day_of_month).min(days_in_month(date));
            (i64::from(date.day()) - i64::from(effective)).abs() <= 1
        }

        Recurrence::MonthlyByWeekday { week, dow: target } => {
            if dow(date) != *target {
                return false;
            }
            if *week == -1 {
                // Last such weekday: one week later lands in the next month
                (date + Duration::days(7)).month() != date.month()
            } else {
                // ceil(day/7) is the occurrence index; weeks outside 1..=5
                // can never match
                i64::from(date.day().div_ceil(7)) == i64::from(*week)
            }
        }
    }
}

/// Whether a medication's (possibly legacy) recurrence fires on a date
pub fn medication_is_due(medication: &Medication, date: NaiveDate) -> bool {
    is_due(&medication.effective_recurrence(), date)
}

/// First date strictly after `from` the medication is due, within the
/// scan horizon
///
/// Returns None when nothing fires in range; callers show "no upcoming
/// date" rather than scanning indefinitely.
pub fn next_due_date(medication: &Medication, from: NaiveDate) -> Option<NaiveDate> {
    let rule = medication.effective_recurrence();
    (1..=NEXT_DUE_HORIZON_DAYS)
        .filter_map(|offset| from.checked_add_signed(Duration::days(offset)))
        .find(|date| is_due(&rule, *date))
}

const DAY_ABBREV: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

fn day_list(days: &[u8]) -> String {
    days.iter()
        .map(|d| DAY_ABBREV[usize::from(*d)])
        .collect::<Vec<_>>()
        .join(", ")
}

/// Label for a weekly day set, special-casing the common sets
fn weekly_label(days: &[u8]) -> String {
    let days = normalize_days(days);
    if days.is_empty() || days.len() == 7 {
        return "daily".into();
    }
    if days == [1, 2, 3, 4, 5] {
        return "weekdays".into();
    }
    if days == [0, 6] {
        return "weekends".into();
    }
    day_list(&days)
}

fn ordinal(day: u8) -> String {
    let suffix = match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{day}{suffix}")
}

fn week_label(week: i8) -> String {
    match week {
        -1 => "Last".into(),
        1..=4 => ordinal(week as u8),
        other => format!("wk{other}"),
    }
}

/// Short human-readable schedule label, e.g. "2× weekdays" or
/// "1× monthly · Last Fri". Deterministic for identical input.
pub fn describe(medication: &Medication) -> String {
    if medication.frequency == Frequency::AsNeeded {
        return "As needed".into();
    }

    let per_day = medication.times.len().max(1);
    let pattern = match medication.effective_recurrence() {
        Recurrence::Daily => "daily".into(),
        Recurrence::Weekly { days } => weekly_label(&days),
        Recurrence::EveryNWeeks { n: 0 | 1, days, .. } => weekly_label(&days),
        Recurrence::EveryNWeeks { n, days, .. } => {
            let days = normalize_days(&days);
            if days.is_empty() || days.len() == 7 {
                format!("every {n}wks")
            } else {
                format!("every {n}wks · {}", day_list(&days))
            }
        }
        Recurrence::MonthlyByDate { day_of_month } => {
            format!("monthly · {}", ordinal(day_of_month))
        }
        Recurrence::MonthlyByWeekday { week, dow } => {
            format!(
                "monthly · {} {}",
                week_label(week),
                DAY_ABBREV[usize::from(dow.min(6))]
            )
        }
    };

    format!("{per_day}× {pattern}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn local_ms(y: i32, m: u32, d: u32) -> i64 {
        Local
            .with_ymd_and_hms(y, m, d, 12, 0, 0)
            .single()
            .unwrap()
            .timestamp_millis()
    }

    fn med_with(rule: Recurrence, times: Vec<&str>) -> Medication {
        Medication::new(
            "p1",
            "Test",
            "1 tablet",
            times.into_iter().map(String::from).collect(),
            Some(rule),
        )
    }

    #[test]
    fn test_daily_always_due() {
        assert!(is_due(&Recurrence::Daily, date(2024, 1, 1)));
        assert!(is_due(&Recurrence::Daily, date(2024, 2, 29)));
    }

    #[test]
    fn test_weekly_specific_days() {
        let rule = Recurrence::Weekly { days: vec![1, 3, 5] };
        // 2024-01-01 is a Monday
        assert!(is_due(&rule, date(2024, 1, 1))); // Mon
        assert!(!is_due(&rule, date(2024, 1, 2))); // Tue
        assert!(is_due(&rule, date(2024, 1, 3))); // Wed
        assert!(!is_due(&rule, date(2024, 1, 4))); // Thu
        assert!(is_due(&rule, date(2024, 1, 5))); // Fri
        assert!(!is_due(&rule, date(2024, 1, 6))); // Sat
        assert!(!is_due(&rule, date(2024, 1, 7))); // Sun
    }

    #[test]
    fn test_weekly_empty_set_means_every_day() {
        let rule = Recurrence::Weekly { days: vec![] };
        for offset in 0..7 {
            assert!(is_due(&rule, date(2024, 1, 1) + Duration::days(offset)));
        }
    }

    #[test]
    fn test_every_two_weeks_alternates() {
        // Anchor on Monday 2024-01-01, due Mondays of even weeks
        let rule = Recurrence::EveryNWeeks {
            n: 2,
            days: vec![1],
            anchor: local_ms(2024, 1, 1),
        };
        assert!(is_due(&rule, date(2024, 1, 1))); // W0 Mon
        assert!(!is_due(&rule, date(2024, 1, 8))); // W1 Mon
        assert!(is_due(&rule, date(2024, 1, 15))); // W2 Mon
        assert!(!is_due(&rule, date(2024, 1, 22))); // W3 Mon
        assert!(is_due(&rule, date(2024, 1, 29))); // W4 Mon
        assert!(!is_due(&rule, date(2024, 1, 16))); // W2 Tue, wrong day
    }

    #[test]
    fn test_every_n_weeks_anchor_mid_week_aligns_to_monday() {
        // Anchor on Wednesday; the whole Mon-aligned week is week 0
        let rule = Recurrence::EveryNWeeks {
            n: 2,
            days: vec![1],
            anchor: local_ms(2024, 1, 3),
        };
        assert!(is_due(&rule, date(2024, 1, 1)));
        assert!(!is_due(&rule, date(2024, 1, 8)));
        assert!(is_due(&rule, date(2024, 1, 15)));
    }

    #[test]
    fn test_every_n_weeks_dates_before_anchor() {
        let rule = Recurrence::EveryNWeeks {
            n: 2,
            days: vec![1],
            anchor: local_ms(2024, 1, 1),
        };
        // Two weeks before the anchor is on-cycle, one week before is not
        assert!(is_due(&rule, date(2023, 12, 18)));
        assert!(!is_due(&rule, date(2023, 12, 25)));
    }

    #[test]
    fn test_monthly_by_date_window() {
        let rule = Recurrence::MonthlyByDate { day_of_month: 15 };
        assert!(is_due(&rule, date(2024, 3, 14)));
        assert!(is_due(&rule, date(2024, 3, 15)));
        assert!(is_due(&rule, date(2024, 3, 16)));
        assert!(!is_due(&rule, date(2024, 3, 13)));
        assert!(!is_due(&rule, date(2024, 3, 17)));
    }

    #[test]
    fn test_monthly_by_date_clamps_to_short_month() {
        let rule = Recurrence::MonthlyByDate { day_of_month: 31 };
        // April has 30 days: effective day is 30
        assert!(is_due(&rule, date(2024, 4, 29)));
        assert!(is_due(&rule, date(2024, 4, 30)));
        assert!(!is_due(&rule, date(2024, 4, 28)));
        // No wraparound into the next month
        assert!(!is_due(&rule, date(2024, 5, 1)));
        // February (non-leap): clamps to 28
        assert!(is_due(&rule, date(2023, 2, 27)));
        assert!(is_due(&rule, date(2023, 2, 28)));
        assert!(!is_due(&rule, date(2023, 3, 1)));
    }

    #[test]
    fn test_monthly_by_weekday_nth() {
        // First Friday of March 2024 is the 1st
        let rule = Recurrence::MonthlyByWeekday { week: 1, dow: 5 };
        assert!(is_due(&rule, date(2024, 3, 1)));
        assert!(!is_due(&rule, date(2024, 3, 8)));
        assert!(!is_due(&rule, date(2024, 3, 2))); // Saturday

        let third = Recurrence::MonthlyByWeekday { week: 3, dow: 5 };
        assert!(is_due(&third, date(2024, 3, 15)));
        assert!(!is_due(&third, date(2024, 3, 22)));
    }

    #[test]
    fn test_monthly_by_weekday_occurrence_boundaries() {
        // Sunday 2024-09-01: days 1, 8, 15, 22, 29 are Sundays
        let first = Recurrence::MonthlyByWeekday { week: 1, dow: 0 };
        assert!(is_due(&first, date(2024, 9, 1)));
        assert!(!is_due(&first, date(2024, 9, 8)));

        let second = Recurrence::MonthlyByWeekday { week: 2, dow: 0 };
        assert!(is_due(&second, date(2024, 9, 8)));

        // A fifth occurrence exists in September 2024
        let fifth = Recurrence::MonthlyByWeekday { week: 5, dow: 0 };
        assert!(is_due(&fifth, date(2024, 9, 29)));
        assert!(!is_due(&fifth, date(2024, 9, 22)));

        // week 0 never fires on any date
        let zero = Recurrence::MonthlyByWeekday { week: 0, dow: 0 };
        for day in 1..=30 {
            assert!(!is_due(&zero, date(2024, 9, day)));
        }
    }

    #[test]
    fn test_monthly_by_weekday_last() {
        let rule = Recurrence::MonthlyByWeekday { week: -1, dow: 5 };
        // March 2024 has five Fridays; only the fifth is due
        assert!(is_due(&rule, date(2024, 3, 29)));
        assert!(!is_due(&rule, date(2024, 3, 22)));
        // April 2024 has four; only the fourth is due
        assert!(is_due(&rule, date(2024, 4, 26)));
        assert!(!is_due(&rule, date(2024, 4, 19)));
    }

    #[test]
    fn test_next_due_date_scans_forward_exclusive() {
        let med = med_with(Recurrence::Weekly { days: vec![3] }, vec!["08:00"]);
        // From Monday 2024-01-01, the next Wednesday is Jan 3
        assert_eq!(
            next_due_date(&med, date(2024, 1, 1)),
            Some(date(2024, 1, 3))
        );
        // From a Wednesday, `from` itself is excluded
        assert_eq!(
            next_due_date(&med, date(2024, 1, 3)),
            Some(date(2024, 1, 10))
        );
    }

    #[test]
    fn test_next_due_date_none_past_horizon() {
        // week 0 never matches ceil(day/7) >= 1, so this never fires
        let med = med_with(
            Recurrence::MonthlyByWeekday { week: 0, dow: 5 },
            vec!["08:00"],
        );
        assert_eq!(next_due_date(&med, date(2024, 1, 1)), None);
    }

    #[test]
    fn test_describe_common_patterns() {
        assert_eq!(
            describe(&med_with(Recurrence::Daily, vec!["08:00"])),
            "1× daily"
        );
        assert_eq!(
            describe(&med_with(
                Recurrence::Weekly {
                    days: vec![1, 2, 3, 4, 5]
                },
                vec!["08:00", "20:00"]
            )),
            "2× weekdays"
        );
        assert_eq!(
            describe(&med_with(
                Recurrence::Weekly { days: vec![0, 6] },
                vec!["08:00"]
            )),
            "1× weekends"
        );
        assert_eq!(
            describe(&med_with(
                Recurrence::Weekly {
                    days: vec![0, 1, 2, 3, 4, 5, 6]
                },
                vec!["08:00"]
            )),
            "1× daily"
        );
        assert_eq!(
            describe(&med_with(
                Recurrence::EveryNWeeks {
                    n: 2,
                    days: vec![1, 4],
                    anchor: 0
                },
                vec!["08:00"]
            )),
            "1× every 2wks · Mon, Thu"
        );
        assert_eq!(
            describe(&med_with(
                Recurrence::MonthlyByDate { day_of_month: 15 },
                vec!["08:00"]
            )),
            "1× monthly · 15th"
        );
        assert_eq!(
            describe(&med_with(
                Recurrence::MonthlyByWeekday { week: -1, dow: 5 },
                vec!["08:00"]
            )),
            "1× monthly · Last Fri"
        );
        assert_eq!(
            describe(&med_with(
                Recurrence::MonthlyByWeekday { week: 3, dow: 5 },
                vec!["08:00"]
            )),
            "1× monthly · 3rd Fri"
        );
    }

    #[test]
    fn test_describe_as_needed_and_legacy() {
        let prn = Medication::new_as_needed("p1", "Ibuprofen", "200mg");
        assert_eq!(describe(&prn), "As needed");

        // Legacy bare days array renders like its Weekly equivalent
        let mut legacy = med_with(Recurrence::Daily, vec!["08:00"]);
        legacy.recurrence = None;
        legacy.days = Some(vec![1, 2, 3, 4, 5]);
        assert_eq!(describe(&legacy), "1× weekdays");
    }

    #[test]
    fn test_legacy_days_evaluates_like_weekly() {
        let mut legacy = med_with(Recurrence::Daily, vec!["08:00"]);
        legacy.recurrence = None;
        legacy.days = Some(vec![1, 2, 3, 4, 5]);

        let tagged = med_with(
            Recurrence::Weekly {
                days: vec![1, 2, 3, 4, 5],
            },
            vec!["08:00"],
        );

        for offset in 0..14 {
            let d = date(2024, 1, 1) + Duration::days(offset);
            assert_eq!(medication_is_due(&legacy, d), medication_is_due(&tagged, d));
        }
    }
}
