use chrono::NaiveDate;

use crate::classify;
use crate::error::{StoreError, StoreResult};
use crate::store::RecordStore;
use crate::stores::{LegendStore, ScheduleStore, SnapshotStore};
use crate::types::{DailySnapshot, Legend, Period, Table, Team};

/// Outcome of regenerating one month of snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub team: Team,
    pub period: Period,
    /// Days the roster has a column for.
    pub days_covered: usize,
    pub written: usize,
    pub removed: usize,
    pub legend_missing: bool,
}

/// Snapshot of one day, or `None` when the roster has no column for it.
pub fn derive_day(schedule: &Table, legend: &Legend, date: NaiveDate) -> Option<DailySnapshot> {
    classify::classify(schedule, legend, date).map(|buckets| DailySnapshot::from_buckets(date, buckets))
}

pub fn derive_month(
    schedule: &Table,
    legend: &Legend,
    period: Period,
) -> Vec<(NaiveDate, Option<DailySnapshot>)> {
    period
        .days()
        .into_iter()
        .map(|date| (date, derive_day(schedule, legend, date)))
        .collect()
}

/// Regenerates every snapshot of `period` from the stored roster and legend,
/// overwriting whatever was published before. All days land in one commit.
pub fn publish_month(
    schedules: &ScheduleStore,
    legends: &LegendStore,
    snapshots: &SnapshotStore,
    team: Team,
    period: Period,
) -> StoreResult<PublishReport> {
    let schedule = schedules.read((team, period))?.ok_or_else(|| {
        StoreError::not_found(format!("{team} has no roster for {}", period.month_label()))
    })?;

    let stored_legend = legends.read(team)?;
    let legend_missing = stored_legend.is_none();
    if legend_missing {
        tracing::warn!(team = %team, "no legend uploaded, only vacation keywords will classify");
    }
    let legend = stored_legend.unwrap_or_default();

    let days = derive_month(&schedule, &legend, period);
    let days_covered = days.iter().filter(|(_, s)| s.is_some()).count();
    let changes = snapshots.replace_month(team, period, &days)?;

    Ok(PublishReport {
        team,
        period,
        days_covered,
        written: changes.written,
        removed: changes.removed,
        legend_missing,
    })
}
