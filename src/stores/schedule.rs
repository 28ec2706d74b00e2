use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{StoreError, StoreResult};
use crate::ingest;
use crate::layout::StoreKind;
use crate::store::{RecordStore, StoreContext, read_optional, remove_if_exists, write_atomic};
use crate::types::{Period, Table, Team};

/// Monthly rosters, one CSV per (team, month). Uploads replace the whole file.
pub struct ScheduleStore {
    ctx: Arc<StoreContext>,
}

impl ScheduleStore {
    pub fn new(ctx: Arc<StoreContext>) -> Self {
        Self { ctx }
    }

    /// Months with an uploaded roster, oldest first.
    pub fn list_periods(&self, team: Team) -> StoreResult<Vec<Period>> {
        let dir = self.ctx.layout().team_dir(StoreKind::Schedule, team);
        let pattern = format!(
            "{}/*_schedule.csv",
            glob::Pattern::escape(&dir.to_string_lossy())
        );

        let mut periods: Vec<Period> = glob::glob(&pattern)
            .map_err(|e| StoreError::malformed(format!("bad roster pattern: {e}")))?
            .filter_map(Result::ok)
            .filter_map(|path| {
                let name = path.file_name()?.to_str()?.to_string();
                parse_period(&name, team)
            })
            .collect();
        periods.sort();
        periods.dedup();
        Ok(periods)
    }
}

/// `"2025_3월_관제SO팀_schedule.csv"` -> 2025-03.
fn parse_period(file_name: &str, team: Team) -> Option<Period> {
    let stem = file_name.strip_suffix(&format!("_{}_schedule.csv", team.name()))?;
    let (year, month) = stem.split_once('_')?;
    let month = month.strip_suffix('월')?;
    Period::new(year.parse().ok()?, month.parse().ok()?)
}

impl RecordStore for ScheduleStore {
    type Key = (Team, Period);
    type Record = Table;

    fn path(&self, (team, period): Self::Key) -> PathBuf {
        self.ctx.layout().schedule_file(team, period)
    }

    fn read(&self, key: Self::Key) -> StoreResult<Option<Table>> {
        let Some(bytes) = read_optional(&self.path(key))? else {
            return Ok(None);
        };
        let (text, _) = ingest::decode_text(&bytes)?;
        Ok(Some(ingest::parse_csv(&text)?))
    }

    fn write(&self, key: Self::Key, table: &Table) -> StoreResult<()> {
        ingest::validate_schedule(table)?;
        let path = self.path(key);
        let bytes = ingest::to_csv(table, false)?;
        let label = format!("{} {}", key.0, key.1.month_label());
        self.ctx
            .mutate(&label, std::slice::from_ref(&path), || write_atomic(&path, &bytes))
    }

    fn delete(&self, key: Self::Key) -> StoreResult<bool> {
        let path = self.path(key);
        let label = format!("{} {} delete", key.0, key.1.month_label());
        self.ctx
            .mutate_if_changed(&label, std::slice::from_ref(&path), || {
                let removed = remove_if_exists(&path)?;
                Ok((removed, removed))
            })
    }
}
