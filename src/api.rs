//! Read API: `team` + `date` in, daily snapshot or a structured error out.

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::error::StoreError;
use crate::store::RecordStore;
use crate::stores::SnapshotStore;
use crate::types::{DailySnapshot, Team};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("team 과 date 파라미터가 필요합니다.")]
    MissingParameters,

    #[error("날짜 형식은 YYYY-MM-DD 이어야 합니다.")]
    InvalidDate(String),

    #[error("알 수 없는 팀입니다: {0}")]
    UnknownTeam(String),

    #[error("{date} ({team})에 해당하는 데이터를 찾을 수 없습니다.")]
    NotFound { team: Team, date: NaiveDate },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Raw, percent-decoded parameters of a read request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotQuery {
    pub team: Option<String>,
    pub date: Option<String>,
}

impl SnapshotQuery {
    pub fn new(team: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            team: Some(team.into()),
            date: Some(date.into()),
        }
    }

    /// Parses `team=..&date=..`, with or without a leading `?`. Later
    /// duplicates of a key win.
    pub fn parse(query: &str) -> Self {
        let query = query.trim().trim_start_matches('?');
        let mut parsed = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "team" => parsed.team = Some(value.into_owned()),
                "date" => parsed.date = Some(value.into_owned()),
                _ => {}
            }
        }
        parsed
    }

    /// Validates the parameters. The date is checked before the team and
    /// before anything touches the store.
    pub fn validate(&self) -> Result<(Team, NaiveDate), ApiError> {
        let (Some(team), Some(date)) = (self.team.as_deref(), self.date.as_deref()) else {
            return Err(ApiError::MissingParameters);
        };
        if team.trim().is_empty() || date.trim().is_empty() {
            return Err(ApiError::MissingParameters);
        }
        let date = parse_date(date)?;
        let team = team
            .parse::<Team>()
            .map_err(|_| ApiError::UnknownTeam(team.to_string()))?;
        Ok((team, date))
    }
}

/// Strict `YYYY-MM-DD`.
pub fn parse_date(raw: &str) -> Result<NaiveDate, ApiError> {
    let raw = raw.trim();
    let shaped = raw.len() == 10
        && raw
            .bytes()
            .enumerate()
            .all(|(i, b)| if i == 4 || i == 7 { b == b'-' } else { b.is_ascii_digit() });
    if !shaped {
        return Err(ApiError::InvalidDate(raw.to_string()));
    }
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|_| ApiError::InvalidDate(raw.to_string()))
}

pub fn get_snapshot(store: &SnapshotStore, query: &SnapshotQuery) -> Result<DailySnapshot, ApiError> {
    let (team, date) = query.validate()?;
    store
        .read((team, date))?
        .ok_or(ApiError::NotFound { team, date })
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ApiResponse {
    Data { data: DailySnapshot },
    Error { status: &'static str, message: String },
}

impl ApiResponse {
    pub fn from_result(result: Result<DailySnapshot, ApiError>) -> Self {
        match result {
            Ok(data) => ApiResponse::Data { data },
            Err(e) => {
                if let ApiError::Store(inner) = &e {
                    tracing::error!("snapshot lookup failed: {inner}");
                }
                ApiResponse::Error {
                    status: "error",
                    message: e.to_string(),
                }
            }
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ApiResponse::Error { .. })
    }

    pub fn to_json(&self) -> String {
        simd_json::to_string_pretty(self).unwrap_or_else(|e| {
            format!(r#"{{"status":"error","message":"serialization failed: {e}"}}"#)
        })
    }
}

/// Full request cycle: parse, validate, look up, render.
pub fn handle_query(store: &SnapshotStore, query: &str) -> ApiResponse {
    ApiResponse::from_result(get_snapshot(store, &SnapshotQuery::parse(query)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing;
    use crate::types::{Period, ShiftEntry};
    use tempfile::TempDir;

    fn seeded(dir: &TempDir) -> SnapshotStore {
        let (ctx, _sync) = testing::context(dir.path());
        let store = SnapshotStore::new(ctx);
        let date = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();
        let snapshot = DailySnapshot {
            date: "2025-03-15".into(),
            day_shift: vec![ShiftEntry {
                division: "팀장".into(),
                name: "Kim".into(),
                shift_code: "D1".into(),
            }],
            night_shift: vec![],
            vacation_shift: vec![],
        };
        store
            .replace_month(Team::Control, Period::of(date), &[(date, Some(snapshot))])
            .unwrap();
        store
    }

    #[test]
    fn percent_encoded_query_resolves_snapshot() {
        let dir = TempDir::new().expect("tempdir");
        let store = seeded(&dir);
        let query = "?team=%EA%B4%80%EC%A0%9CSO%ED%8C%80&date=2025-03-15";

        let response = handle_query(&store, query);
        assert!(!response.is_error());
        let json = response.to_json();
        assert!(json.contains("\"data\""));
        assert!(json.contains("Kim"));
    }

    #[test]
    fn missing_parameters_are_reported() {
        let dir = TempDir::new().expect("tempdir");
        let store = seeded(&dir);
        for query in ["", "team=관제SO팀", "date=2025-03-15", "team=&date=2025-03-15"] {
            let err = get_snapshot(&store, &SnapshotQuery::parse(query)).unwrap_err();
            assert!(matches!(err, ApiError::MissingParameters), "{query}");
        }
    }

    #[test]
    fn bad_date_is_rejected_before_team_lookup() {
        let dir = TempDir::new().expect("tempdir");
        let store = seeded(&dir);
        for date in ["2025-3-15", "20250315", "2025-02-30", "15-03-2025"] {
            let err = get_snapshot(&store, &SnapshotQuery::new("없는팀", date)).unwrap_err();
            assert!(matches!(err, ApiError::InvalidDate(_)), "{date}");
        }
    }

    #[test]
    fn unknown_team_and_missing_snapshot_are_errors() {
        let dir = TempDir::new().expect("tempdir");
        let store = seeded(&dir);

        let err = get_snapshot(&store, &SnapshotQuery::new("없는팀", "2025-03-15")).unwrap_err();
        assert!(matches!(err, ApiError::UnknownTeam(_)));

        let response = handle_query(&store, "team=관제SO팀&date=2025-03-16");
        assert!(response.is_error());
        let json = response.to_json();
        assert!(json.contains("\"status\""));
        assert!(json.contains("2025-03-16 (관제SO팀)"));
    }
}
