use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Column holding the division (part) marker of a roster row.
pub const DIVISION_COLUMN: &str = "파트 구분";
/// Column holding the employee name of a roster row.
pub const NAME_COLUMN: &str = "이름";
/// Legend column with the team-local shorthand code.
pub const LEGEND_CODE_COLUMN: &str = "팀 근무기호";
/// Legend column with the canonical shift descriptor.
pub const LEGEND_DESCRIPTOR_COLUMN: &str = "실제 근무";
/// Roster metadata columns hidden from the full-table view.
pub const METADATA_COLUMNS: [&str; 4] = ["본부 구분", "팀 구분", "년/월", "근무 구분"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Team {
    #[serde(rename = "관제SO팀")]
    Control,
    #[serde(rename = "동부SO팀")]
    East,
    #[serde(rename = "보라매SO팀")]
    Boramae,
    #[serde(rename = "백본SO팀")]
    Backbone,
    #[serde(rename = "보안SO팀")]
    Security,
    #[serde(rename = "성수SO팀")]
    Seongsu,
    #[serde(rename = "중부SO팀")]
    Central,
}

impl Team {
    pub fn all() -> &'static [Team] {
        &[
            Self::Control,
            Self::East,
            Self::Boramae,
            Self::Backbone,
            Self::Security,
            Self::Seongsu,
            Self::Central,
        ]
    }

    /// Name used for folders, file names and the read API.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Control => "관제SO팀",
            Self::East => "동부SO팀",
            Self::Boramae => "보라매SO팀",
            Self::Backbone => "백본SO팀",
            Self::Security => "보안SO팀",
            Self::Seongsu => "성수SO팀",
            Self::Central => "중부SO팀",
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Team {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Team::all()
            .iter()
            .copied()
            .find(|team| team.name() == trimmed)
            .ok_or_else(|| format!("Unknown team: {trimmed}"))
    }
}

/// A calendar month of a roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|_| Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// Every calendar day of the month, in order.
    pub fn days(&self) -> Vec<NaiveDate> {
        let first = self.first_day();
        first
            .iter_days()
            .take_while(|d| d.month() == self.month)
            .collect()
    }

    /// `"3월"`, as used in file names.
    pub fn month_label(&self) -> String {
        format!("{}월", self.month)
    }

    /// `"2025-03"`, as used for snapshot folders.
    pub fn year_month(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.year, self.month_label())
    }
}

/// A header row plus string cells, as read from a roster or legend file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let headers = headers.into_iter().map(|h| h.trim().to_string()).collect();
        Self { headers, rows }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Cell value, empty when the row is shorter than the header.
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(|s| s.as_str())
            .unwrap_or("")
    }

    /// Copy of the table without the named columns.
    pub fn without_columns(&self, drop: &[&str]) -> Table {
        let keep: Vec<usize> = (0..self.headers.len())
            .filter(|&i| !drop.contains(&self.headers[i].as_str()))
            .collect();
        Table {
            headers: keep.iter().map(|&i| self.headers[i].clone()).collect(),
            rows: (0..self.rows.len())
                .map(|r| keep.iter().map(|&i| self.cell(r, i).to_string()).collect())
                .collect(),
        }
    }

    /// Rows whose value in `column` contains `needle`. Tables without the column
    /// yield no rows.
    pub fn filter_contains(&self, column: &str, needle: &str) -> Table {
        let rows = match self.column_index(column) {
            Some(col) => (0..self.rows.len())
                .filter(|&r| self.cell(r, col).contains(needle))
                .map(|r| self.rows[r].clone())
                .collect(),
            None => Vec::new(),
        };
        Table {
            headers: self.headers.clone(),
            rows,
        }
    }
}

/// Code -> canonical descriptor mapping of one team.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Legend {
    mapping: BTreeMap<String, String>,
}

impl Legend {
    /// Builds the mapping from a legend table, dropping rows where either the
    /// code or the descriptor is empty. Later rows win for repeated codes.
    pub fn from_table(table: &Table) -> Option<Self> {
        let code_col = table.column_index(LEGEND_CODE_COLUMN)?;
        let desc_col = table.column_index(LEGEND_DESCRIPTOR_COLUMN)?;

        let mapping = (0..table.rows.len())
            .filter_map(|r| {
                let code = table.cell(r, code_col).trim();
                let descriptor = table.cell(r, desc_col).trim();
                if code.is_empty() || descriptor.is_empty() {
                    None
                } else {
                    Some((code.to_string(), descriptor.to_string()))
                }
            })
            .collect();

        Some(Self { mapping })
    }

    /// Descriptor for a code; unmapped codes resolve to `""`.
    pub fn descriptor(&self, code: &str) -> &str {
        self.mapping.get(code).map(|s| s.as_str()).unwrap_or("")
    }

    #[cfg(test)]
    pub fn contains(&self, code: &str) -> bool {
        self.mapping.contains_key(code)
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    /// Two-column table in the stored legend shape.
    pub fn to_table(&self) -> Table {
        Table {
            headers: vec![
                LEGEND_CODE_COLUMN.to_string(),
                LEGEND_DESCRIPTOR_COLUMN.to_string(),
            ],
            rows: self
                .mapping
                .iter()
                .map(|(code, desc)| vec![code.clone(), desc.clone()])
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memo {
    pub note: String,
    pub author: String,
    pub timestamp: String,
}

impl Memo {
    /// `true` when note, author and timestamp are all identical.
    pub fn same_as(&self, other: &Memo) -> bool {
        self.note == other.note && self.author == other.author && self.timestamp == other.timestamp
    }
}

/// One worker placed in a shift bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftEntry {
    pub division: String,
    pub name: String,
    pub shift_code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShiftBuckets {
    pub day: Vec<ShiftEntry>,
    pub night: Vec<ShiftEntry>,
    pub vacation: Vec<ShiftEntry>,
}

/// Derived per-day roster summary served by the read API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySnapshot {
    pub date: String,
    pub day_shift: Vec<ShiftEntry>,
    pub night_shift: Vec<ShiftEntry>,
    pub vacation_shift: Vec<ShiftEntry>,
}

impl DailySnapshot {
    pub fn from_buckets(date: NaiveDate, buckets: ShiftBuckets) -> Self {
        Self {
            date: date.format("%Y-%m-%d").to_string(),
            day_shift: buckets.day,
            night_shift: buckets.night,
            vacation_shift: buckets.vacation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn team_round_trips_through_name() {
        for team in Team::all() {
            assert_eq!(team.name().parse::<Team>().unwrap(), *team);
        }
        assert!("없는팀".parse::<Team>().is_err());
        assert_eq!(" 관제SO팀 ".parse::<Team>().unwrap(), Team::Control);
    }

    #[test]
    fn period_days_cover_whole_month() {
        let feb = Period::new(2024, 2).unwrap();
        assert_eq!(feb.days().len(), 29);
        assert_eq!(Period::new(2025, 2).unwrap().days().len(), 28);
        assert_eq!(Period::new(2025, 12).unwrap().days().len(), 31);
        assert!(Period::new(2025, 13).is_none());
        assert_eq!(feb.month_label(), "2월");
        assert_eq!(feb.year_month(), "2024-02");
    }

    #[test]
    fn legend_drops_rows_with_empty_fields() {
        let table = Table::new(
            vec![" 팀 근무기호".into(), "실제 근무 ".into()],
            vec![
                vec!["D1".into(), "주간 근무".into()],
                vec!["N1".into(), "".into()],
                vec!["".into(), "야간 근무".into()],
                vec!["N2".into(), "야간 근무".into()],
            ],
        );
        let legend = Legend::from_table(&table).unwrap();
        assert_eq!(legend.len(), 2);
        assert!(!legend.contains("N1"));
        assert_eq!(legend.descriptor("D1"), "주간 근무");
        assert_eq!(legend.descriptor("missing"), "");
    }

    #[test]
    fn legend_requires_both_columns() {
        let table = Table::new(vec!["팀 근무기호".into()], vec![vec!["D1".into()]]);
        assert!(Legend::from_table(&table).is_none());
    }

    #[test]
    fn table_drops_metadata_and_filters_by_name() {
        let table = Table::new(
            vec!["본부 구분".into(), "파트 구분".into(), "이름".into(), "1(월)".into()],
            vec![
                vec!["A".into(), "총괄".into(), "김철수".into(), "D1".into()],
                vec!["A".into(), "1파트".into(), "이영희".into(), "N1".into()],
            ],
        );
        let view = table.without_columns(&METADATA_COLUMNS);
        assert_eq!(view.headers, vec!["파트 구분", "이름", "1(월)"]);
        assert_eq!(view.rows[1], vec!["1파트", "이영희", "N1"]);

        let found = view.filter_contains(NAME_COLUMN, "영희");
        assert_eq!(found.rows.len(), 1);
        assert!(view.filter_contains("없음", "x").rows.is_empty());
    }
}
