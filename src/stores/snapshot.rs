use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;

use crate::error::{StoreError, StoreResult};
use crate::store::{RecordStore, StoreContext, read_optional, remove_if_exists, write_atomic};
use crate::types::{DailySnapshot, Period, Team};

/// What a month regeneration changed on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonthChanges {
    pub written: usize,
    pub removed: usize,
}

/// Derived per-day snapshots served by the read API.
pub struct SnapshotStore {
    ctx: Arc<StoreContext>,
}

impl SnapshotStore {
    pub fn new(ctx: Arc<StoreContext>) -> Self {
        Self { ctx }
    }

    /// Replaces the snapshots of a whole month in one commit. Days mapped to
    /// `None` have their stale snapshot removed.
    pub fn replace_month(
        &self,
        team: Team,
        period: Period,
        days: &[(NaiveDate, Option<DailySnapshot>)],
    ) -> StoreResult<MonthChanges> {
        let label = format!("{team} snapshots {}", period.year_month());
        self.ctx.mutate_batch(&label, || {
            let mut changes = MonthChanges::default();
            let mut touched = Vec::new();

            for (date, snapshot) in days {
                let path = self.path((team, *date));
                match snapshot {
                    Some(snapshot) => {
                        let bytes = encode(&path, snapshot)?;
                        if read_optional(&path)?.as_deref() == Some(bytes.as_slice()) {
                            continue;
                        }
                        write_atomic(&path, &bytes)?;
                        changes.written += 1;
                        touched.push(path);
                    }
                    None => {
                        if remove_if_exists(&path)? {
                            changes.removed += 1;
                            touched.push(path);
                        }
                    }
                }
            }

            tracing::info!(
                team = %team,
                period = %period,
                written = changes.written,
                removed = changes.removed,
                "snapshots regenerated"
            );
            Ok((changes, touched))
        })
    }
}

pub fn encode(path: &Path, snapshot: &DailySnapshot) -> StoreResult<Vec<u8>> {
    simd_json::to_string_pretty(snapshot)
        .map(String::into_bytes)
        .map_err(|e| StoreError::json(path, e))
}

impl RecordStore for SnapshotStore {
    type Key = (Team, NaiveDate);
    type Record = DailySnapshot;

    fn path(&self, (team, date): Self::Key) -> PathBuf {
        self.ctx.layout().snapshot_file(team, date)
    }

    fn read(&self, key: Self::Key) -> StoreResult<Option<DailySnapshot>> {
        let path = self.path(key);
        let Some(mut bytes) = read_optional(&path)? else {
            return Ok(None);
        };
        simd_json::from_slice::<DailySnapshot>(&mut bytes)
            .map(Some)
            .map_err(|e| StoreError::json(&path, e))
    }

    fn write(&self, key: Self::Key, snapshot: &DailySnapshot) -> StoreResult<()> {
        let path = self.path(key);
        let bytes = encode(&path, snapshot)?;
        let label = format!("{} snapshot {}", key.0, key.1);
        self.ctx
            .mutate(&label, std::slice::from_ref(&path), || write_atomic(&path, &bytes))
    }

    fn delete(&self, key: Self::Key) -> StoreResult<bool> {
        let path = self.path(key);
        let label = format!("{} snapshot {} delete", key.0, key.1);
        self.ctx
            .mutate_if_changed(&label, std::slice::from_ref(&path), || {
                let removed = remove_if_exists(&path)?;
                Ok((removed, removed))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing;
    use crate::types::ShiftEntry;
    use tempfile::TempDir;

    fn snapshot(date: NaiveDate, name: &str) -> DailySnapshot {
        DailySnapshot {
            date: date.to_string(),
            day_shift: vec![ShiftEntry {
                division: "팀장".into(),
                name: name.into(),
                shift_code: "D1".into(),
            }],
            night_shift: vec![],
            vacation_shift: vec![],
        }
    }

    #[test]
    fn month_replacement_is_one_batch_commit() {
        let dir = TempDir::new().expect("tempdir");
        let (ctx, sync) = testing::context(dir.path());
        let store = SnapshotStore::new(ctx);
        let period = Period::new(2025, 3).unwrap();
        let days: Vec<_> = period
            .days()
            .into_iter()
            .map(|d| (d, Some(snapshot(d, "Kim"))))
            .collect();

        let changes = store.replace_month(Team::Control, period, &days).unwrap();
        assert_eq!(changes.written, 31);
        assert_eq!(sync.commit_count(), 1);
        assert!(sync.commits.lock()[0].2, "batch flag");

        let d = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();
        assert_eq!(store.read((Team::Control, d)).unwrap(), Some(snapshot(d, "Kim")));
        assert!(
            store
                .path((Team::Control, d))
                .ends_with("team_today_schedules/관제SO팀/2025-03/2025-03-15_schedule.json")
        );
    }

    #[test]
    fn unchanged_month_is_not_committed_again() {
        let dir = TempDir::new().expect("tempdir");
        let (ctx, sync) = testing::context(dir.path());
        let store = SnapshotStore::new(ctx);
        let period = Period::new(2025, 2).unwrap();
        let days: Vec<_> = period
            .days()
            .into_iter()
            .map(|d| (d, Some(snapshot(d, "Kim"))))
            .collect();

        store.replace_month(Team::East, period, &days).unwrap();
        let again = store.replace_month(Team::East, period, &days).unwrap();
        assert_eq!(again, MonthChanges::default());
        assert_eq!(sync.commit_count(), 1);
    }

    #[test]
    fn days_without_data_drop_stale_snapshots() {
        let dir = TempDir::new().expect("tempdir");
        let (ctx, _sync) = testing::context(dir.path());
        let store = SnapshotStore::new(ctx);
        let period = Period::new(2025, 4).unwrap();
        let d1 = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2025, 4, 2).unwrap();

        store
            .replace_month(
                Team::East,
                period,
                &[(d1, Some(snapshot(d1, "A"))), (d2, Some(snapshot(d2, "B")))],
            )
            .unwrap();
        let changes = store
            .replace_month(Team::East, period, &[(d1, Some(snapshot(d1, "A"))), (d2, None)])
            .unwrap();

        assert_eq!(changes, MonthChanges { written: 0, removed: 1 });
        assert!(store.read((Team::East, d2)).unwrap().is_none());
        assert!(store.read((Team::East, d1)).unwrap().is_some());
    }
}
