//! Buckets a team's roster into day, night and vacation shifts for one date.
//!
//! Precedence: a raw code listed in [`VACATION_KEYWORDS`] always lands in the
//! vacation bucket, whatever the legend says about it. Other rows go by their
//! legend descriptor: day indicator first, then night indicator. Rows matching
//! neither are off the board. The buckets never overlap.

use chrono::{Datelike, NaiveDate};
use phf::phf_set;

use crate::types::{DIVISION_COLUMN, Legend, NAME_COLUMN, ShiftBuckets, ShiftEntry, Table};

/// Weekday symbols, Monday first.
pub const WEEKDAY_SYMBOLS: [&str; 7] = ["월", "화", "수", "목", "금", "토", "일"];

pub const DAY_INDICATOR: &str = "주";
pub const NIGHT_INDICATOR: &str = "야";

pub const SUPERVISOR_DIVISION: &str = "총괄";
pub const SUPERVISOR_DISPLAY: &str = "팀장";

/// Raw roster codes that mean the worker is on leave.
pub static VACATION_KEYWORDS: phf::Set<&'static str> = phf_set! {
    "휴가(주)",
    "대휴(주)",
    "대휴",
    "경조",
    "연차",
    "야/연차",
    "숙/연차",
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Day,
    Night,
    Vacation,
}

/// Roster column for a date, e.g. `"15(월)"`.
pub fn day_column(date: NaiveDate) -> String {
    let weekday = date.weekday().num_days_from_monday() as usize;
    format!("{}({})", date.day(), WEEKDAY_SYMBOLS[weekday])
}

pub fn bucket_for(raw_code: &str, descriptor: &str) -> Option<Bucket> {
    if VACATION_KEYWORDS.contains(raw_code) {
        Some(Bucket::Vacation)
    } else if descriptor.contains(DAY_INDICATOR) {
        Some(Bucket::Day)
    } else if descriptor.contains(NIGHT_INDICATOR) {
        Some(Bucket::Night)
    } else {
        None
    }
}

pub fn display_division(division: &str) -> &str {
    if division == SUPERVISOR_DIVISION {
        SUPERVISOR_DISPLAY
    } else {
        division
    }
}

/// Classifies every roster row for `date`. Returns `None` when the roster has no
/// column for that date.
pub fn classify(schedule: &Table, legend: &Legend, date: NaiveDate) -> Option<ShiftBuckets> {
    let column = schedule.column_index(&day_column(date))?;
    let division_col = schedule.column_index(DIVISION_COLUMN);
    let name_col = schedule.column_index(NAME_COLUMN);

    let mut day = Vec::new();
    let mut night = Vec::new();
    let mut vacation = Vec::new();

    for row in 0..schedule.rows.len() {
        let code = schedule.cell(row, column);
        let Some(bucket) = bucket_for(code, legend.descriptor(code)) else {
            continue;
        };
        let entry = RosterRow {
            division: division_col.map(|c| schedule.cell(row, c)).unwrap_or(""),
            name: name_col.map(|c| schedule.cell(row, c)).unwrap_or(""),
            code,
        };
        match bucket {
            Bucket::Day => day.push(entry),
            Bucket::Night => night.push(entry),
            Bucket::Vacation => vacation.push(entry),
        }
    }

    Some(ShiftBuckets {
        day: finish(day),
        night: finish(night),
        vacation: finish(vacation),
    })
}

struct RosterRow<'a> {
    division: &'a str,
    name: &'a str,
    code: &'a str,
}

/// Supervisors first, then division, then name.
fn finish(mut rows: Vec<RosterRow<'_>>) -> Vec<ShiftEntry> {
    rows.sort_by(|a, b| {
        (a.division != SUPERVISOR_DIVISION, a.division, a.name).cmp(&(
            b.division != SUPERVISOR_DIVISION,
            b.division,
            b.name,
        ))
    });
    rows.into_iter()
        .map(|r| ShiftEntry {
            division: display_division(r.division).to_string(),
            name: r.name.to_string(),
            shift_code: r.code.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn legend(pairs: &[(&str, &str)]) -> Legend {
        Legend::from_table(&Table::new(
            vec!["팀 근무기호".into(), "실제 근무".into()],
            pairs
                .iter()
                .map(|(c, d)| vec![c.to_string(), d.to_string()])
                .collect(),
        ))
        .unwrap()
    }

    fn roster(rows: &[(&str, &str, &str)]) -> Table {
        Table::new(
            vec!["파트 구분".into(), "이름".into(), "15(월)".into()],
            rows.iter()
                .map(|(p, n, c)| vec![p.to_string(), n.to_string(), c.to_string()])
                .collect(),
        )
    }

    #[test]
    fn day_column_uses_korean_weekday() {
        // 2025-09-15 is a Monday.
        assert_eq!(day_column(date(2025, 9, 15)), "15(월)");
        assert_eq!(day_column(date(2025, 9, 21)), "21(일)");
        assert_eq!(day_column(date(2025, 9, 3)), "3(수)");
    }

    #[test]
    fn supervisor_is_aliased_and_sorted_first() {
        let table = roster(&[
            ("1파트", "Lee", "D1"),
            ("총괄", "Kim", "D1"),
            ("1파트", "Ahn", "D1"),
        ]);
        let buckets = classify(&table, &legend(&[("D1", "주간 근무")]), date(2025, 9, 15)).unwrap();

        let names: Vec<_> = buckets.day.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Kim", "Ahn", "Lee"]);
        assert_eq!(buckets.day[0].division, "팀장");
        assert_eq!(buckets.day[0].shift_code, "D1");
        assert!(buckets.night.is_empty());
    }

    #[test]
    fn vacation_keyword_wins_over_legend() {
        let table = roster(&[("1파트", "Park", "대휴"), ("1파트", "Choi", "야/연차")]);
        let legend = legend(&[("대휴", "주간 근무"), ("야/연차", "야간")]);
        let buckets = classify(&table, &legend, date(2025, 9, 15)).unwrap();

        assert_eq!(buckets.vacation.len(), 2);
        assert!(buckets.day.is_empty());
        assert!(buckets.night.is_empty());
    }

    #[test]
    fn unmapped_and_unknown_codes_are_off_the_board() {
        let table = roster(&[
            ("1파트", "A", "N1"),
            ("1파트", "B", "X"),
            ("1파트", "C", ""),
            ("2파트", "D", "S"),
        ]);
        let legend = legend(&[("N1", "야간 근무"), ("S", "비번")]);
        let buckets = classify(&table, &legend, date(2025, 9, 15)).unwrap();

        assert_eq!(buckets.night.len(), 1);
        assert_eq!(buckets.night[0].name, "A");
        assert!(buckets.day.is_empty());
        assert!(buckets.vacation.is_empty());
    }

    #[test]
    fn day_indicator_takes_precedence_over_night() {
        assert_eq!(bucket_for("DN", "주야 연속"), Some(Bucket::Day));
        assert_eq!(bucket_for("N", "야간"), Some(Bucket::Night));
        assert_eq!(bucket_for("연차", "주간"), Some(Bucket::Vacation));
        assert_eq!(bucket_for("O", ""), None);
    }

    #[test]
    fn missing_date_column_yields_none() {
        let table = roster(&[("총괄", "Kim", "D1")]);
        assert!(classify(&table, &Legend::default(), date(2025, 9, 16)).is_none());
    }

    #[test]
    fn classification_is_deterministic() {
        let table = roster(&[
            ("2파트", "B", "D1"),
            ("1파트", "A", "N1"),
            ("총괄", "K", "연차"),
        ]);
        let legend = legend(&[("D1", "주간"), ("N1", "야간")]);
        let first = classify(&table, &legend, date(2025, 9, 15));
        let second = classify(&table, &legend, date(2025, 9, 15));
        assert_eq!(first, second);
    }
}
