use chrono::{Datelike, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;

use crate::classify::{WEEKDAY_SYMBOLS, day_column};
use crate::stores::memo::MEMO_TIMESTAMP_FORMAT;
use crate::types::{Memo, Period, Team};

pub fn today_in(timezone: Tz) -> NaiveDate {
    Utc::now().with_timezone(&timezone).date_naive()
}

/// `"2025-03-15 (토)"`, with a trailing `*` when `date` is `today`.
pub fn format_date_for_display(date: NaiveDate, today: NaiveDate) -> String {
    let weekday = WEEKDAY_SYMBOLS[date.weekday().num_days_from_monday() as usize];
    let formatted = format!("{} ({weekday})", date.format("%Y-%m-%d"));
    if date == today {
        format!("{formatted}*")
    } else {
        formatted
    }
}

/// Memo timestamps are shown to the minute. Unparseable values are shown as is.
pub fn format_memo_time(timestamp: &str) -> String {
    match NaiveDateTime::parse_from_str(timestamp, MEMO_TIMESTAMP_FORMAT) {
        Ok(parsed) => parsed.format("%Y-%m-%d %H:%M").to_string(),
        Err(_) => timestamp.to_string(),
    }
}

/// Memos in display order, newest first.
pub fn newest_first(mut memos: Vec<Memo>) -> Vec<Memo> {
    memos.reverse();
    memos
}

/// `"관제SO팀_3월_근무표.csv"`.
pub fn export_file_name(team: Team, period: Period) -> String {
    format!("{team}_{}_근무표.csv", period.month_label())
}

/// Heading for the shift board of a day, e.g. `"2025-03-15 관제SO팀 근무자 (15(토))"`.
pub fn board_title(team: Team, date: NaiveDate) -> String {
    format!("{} {team} 근무자 ({})", date.format("%Y-%m-%d"), day_column(date))
}
