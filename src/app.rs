//! Dashboard operations, shared by the CLI, the terminal dashboard and the MCP
//! server. Everything here takes the [`Session`] explicitly.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use chrono_tz::Tz;

use crate::auth::AdminGate;
use crate::config::Config;
use crate::error::{AppError, AppResult, GitError, StoreError, StoreResult};
use crate::git::{CancelToken, PullOutcome, RepoSession, SyncBackend};
use crate::ingest;
use crate::layout::Layout;
use crate::publish::{self, PublishReport};
use crate::session::Session;
use crate::store::{RecordStore, StoreContext};
use crate::stores::{LegendStore, MemoStore, ScheduleStore, SnapshotStore};
use crate::types::{METADATA_COLUMNS, Memo, NAME_COLUMN, Period, ShiftBuckets, Table, Team};
use crate::{classify, utils};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// One-line message shown to the operator after an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }

    pub fn from_pull(outcome: &PullOutcome) -> Self {
        match outcome {
            PullOutcome::LocalOnly => Notice::info("Local-only mode, nothing to sync"),
            PullOutcome::RemoteEmpty => Notice::info("Remote branch is empty"),
            PullOutcome::UpToDate => Notice::success("Already up to date"),
            PullOutcome::Merged => Notice::success("Pulled latest changes"),
            PullOutcome::ResolvedWithRemote(paths) => Notice::warning(format!(
                "Conflicts resolved with the remote copy: {}",
                paths.join(", ")
            )),
        }
    }

    pub fn from_error(err: &AppError) -> Self {
        Notice::error(err.to_string())
    }
}

/// Roster shift board for one date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShiftBoard {
    NoRoster,
    /// The roster has no column for the date.
    NoColumn(String),
    Ready {
        buckets: ShiftBuckets,
        legend_missing: bool,
    },
}

pub struct App {
    layout: Layout,
    repo: Option<Arc<RepoSession>>,
    timezone: Tz,
    gate: AdminGate,
    pub schedules: ScheduleStore,
    pub legends: LegendStore,
    pub memos: MemoStore,
    pub snapshots: SnapshotStore,
}

impl App {
    /// Opens the configured checkout, creating it when absent.
    pub fn open(config: &Config) -> Result<Self> {
        let root = config.checkout_dir()?;
        let settings = config.repo_settings()?;
        let timezone = settings.timezone;
        let layout = Layout::new(&root);

        let repo = Arc::new(RepoSession::new(&root, settings));
        repo.init(&layout)
            .with_context(|| format!("Failed to prepare checkout at {}", root.display()))?;

        let sync: Arc<dyn SyncBackend> = repo.clone();
        let mut app = Self::with_backend(layout, sync, timezone, AdminGate::from_config(config));
        app.repo = Some(repo);
        Ok(app)
    }

    pub fn with_backend(
        layout: Layout,
        sync: Arc<dyn SyncBackend>,
        timezone: Tz,
        gate: AdminGate,
    ) -> Self {
        let ctx = StoreContext::new(layout.clone(), sync);
        Self {
            layout,
            repo: None,
            timezone,
            gate,
            schedules: ScheduleStore::new(ctx.clone()),
            legends: LegendStore::new(ctx.clone()),
            memos: MemoStore::new(ctx.clone(), timezone),
            snapshots: SnapshotStore::new(ctx),
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn gate(&self) -> &AdminGate {
        &self.gate
    }

    pub fn today(&self) -> NaiveDate {
        utils::today_in(self.timezone)
    }

    pub fn new_session(&self, team: Team) -> Session {
        Session::new(team, self.today())
    }

    /// Pulls remote history. Without a repository this is a local-only no-op.
    pub fn sync(&self, cancel: &CancelToken) -> Result<PullOutcome, GitError> {
        match &self.repo {
            Some(repo) => {
                repo.init(&self.layout)?;
                repo.pull_cancellable(cancel)
            }
            None => Ok(PullOutcome::LocalOnly),
        }
    }

    /// Startup pull for surfaces that serve whatever is local when the remote
    /// is unreachable. The failure is logged and returned.
    pub fn refresh(&self) -> Option<GitError> {
        match self.sync(&CancelToken::new()) {
            Ok(outcome) => {
                tracing::debug!(?outcome, "startup sync");
                None
            }
            Err(e) => {
                tracing::warn!("startup sync failed, serving local data: {e}");
                Some(e)
            }
        }
    }

    fn require_admin(session: &Session, team: Team) -> AppResult<()> {
        if session.is_unlocked(team) {
            Ok(())
        } else {
            Err(AppError::AdminRequired(team))
        }
    }

    /// Stores a roster upload and republishes the month's snapshots.
    pub fn upload_schedule(
        &self,
        session: &Session,
        team: Team,
        period: Period,
        file_name: &Path,
        bytes: &[u8],
    ) -> AppResult<PublishReport> {
        Self::require_admin(session, team)?;
        let table = ingest::parse_upload(file_name, bytes)?;
        match self.schedules.write((team, period), &table) {
            Ok(()) => {}
            // The roster file is already replaced; its snapshots must follow it.
            Err(StoreError::Git(push_err)) => {
                tracing::error!(
                    team = %team,
                    period = %period,
                    error = %push_err,
                    "roster saved but not pushed, publishing anyway"
                );
                if let Err(e) = publish::publish_month(
                    &self.schedules,
                    &self.legends,
                    &self.snapshots,
                    team,
                    period,
                ) {
                    tracing::warn!(team = %team, error = %e, "publish after failed push also failed");
                }
                return Err(StoreError::Git(push_err).into());
            }
            Err(e) => return Err(e.into()),
        }
        tracing::info!(team = %team, period = %period, rows = table.rows.len(), "roster uploaded");
        Ok(publish::publish_month(
            &self.schedules,
            &self.legends,
            &self.snapshots,
            team,
            period,
        )?)
    }

    /// Replaces the team legend. A file without both legend columns leaves the
    /// stored legend untouched.
    pub fn upload_legend(
        &self,
        session: &Session,
        team: Team,
        file_name: &Path,
        bytes: &[u8],
    ) -> AppResult<usize> {
        Self::require_admin(session, team)?;
        let table = ingest::parse_upload(file_name, bytes)?;
        let legend = ingest::legend_from_upload(&table)?;
        self.legends.write(team, &legend)?;
        if legend.is_empty() {
            tracing::warn!(team = %team, "legend upload has no complete code rows");
        }
        tracing::info!(team = %team, codes = legend.len(), "legend uploaded");
        Ok(legend.len())
    }

    pub fn publish(&self, session: &Session, team: Team, period: Period) -> AppResult<PublishReport> {
        Self::require_admin(session, team)?;
        Ok(publish::publish_month(
            &self.schedules,
            &self.legends,
            &self.snapshots,
            team,
            period,
        )?)
    }

    pub fn delete_schedule(&self, session: &Session, team: Team, period: Period) -> AppResult<bool> {
        Self::require_admin(session, team)?;
        Ok(self.schedules.delete((team, period))?)
    }

    pub fn add_memo(&self, team: Team, period: Period, note: &str, author: &str) -> StoreResult<bool> {
        self.memos.append(team, period, note, author)
    }

    pub fn delete_memo(
        &self,
        session: &Session,
        team: Team,
        period: Period,
        memo: &Memo,
    ) -> AppResult<bool> {
        Self::require_admin(session, team)?;
        Ok(self.memos.delete_entry(team, period, memo)?)
    }

    /// Memos of the month, newest first.
    pub fn list_memos(&self, team: Team, period: Period) -> StoreResult<Vec<Memo>> {
        Ok(utils::newest_first(
            self.memos.read((team, period))?.unwrap_or_default(),
        ))
    }

    /// Roster without metadata columns, narrowed to names containing `search`.
    pub fn roster_view(&self, team: Team, period: Period, search: &str) -> StoreResult<Option<Table>> {
        let Some(table) = self.schedules.read((team, period))? else {
            return Ok(None);
        };
        let view = table.without_columns(&METADATA_COLUMNS);
        let search = search.trim();
        if search.is_empty() {
            Ok(Some(view))
        } else {
            Ok(Some(view.filter_contains(NAME_COLUMN, search)))
        }
    }

    /// The full roster as CSV with a UTF-8 BOM, plus its download file name.
    pub fn export_roster(&self, team: Team, period: Period) -> StoreResult<(String, Vec<u8>)> {
        let table = self.schedules.read((team, period))?.ok_or_else(|| {
            StoreError::not_found(format!("{team} has no roster for {}", period.month_label()))
        })?;
        Ok((utils::export_file_name(team, period), ingest::to_csv(&table, true)?))
    }

    pub fn shift_board(&self, team: Team, date: NaiveDate) -> StoreResult<ShiftBoard> {
        let Some(schedule) = self.schedules.read((team, Period::of(date)))? else {
            return Ok(ShiftBoard::NoRoster);
        };
        let legend = self.legends.read(team)?;
        let legend_missing = legend.is_none();
        let legend = legend.unwrap_or_default();
        Ok(match classify::classify(&schedule, &legend, date) {
            Some(buckets) => ShiftBoard::Ready {
                buckets,
                legend_missing,
            },
            None => ShiftBoard::NoColumn(classify::day_column(date)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::RecordingSync;
    use tempfile::TempDir;

    fn app(dir: &TempDir) -> (App, Arc<RecordingSync>) {
        let sync = Arc::new(RecordingSync::default());
        let layout = Layout::new(dir.path());
        layout.provision().unwrap();
        let gate = AdminGate::default().with_secret(Team::Control, "pw");
        (
            App::with_backend(layout, sync.clone(), chrono_tz::Asia::Seoul, gate),
            sync,
        )
    }

    fn admin(app: &App) -> Session {
        let mut session = Session::new(Team::Control, NaiveDate::from_ymd_opt(2025, 3, 15).unwrap());
        assert!(session.unlock(app.gate(), "pw"));
        session
    }

    const ROSTER: &str = "본부 구분,파트 구분,이름,14(금),15(토)\n\
                          X본부,총괄,Kim,D1,D1\n\
                          X본부,A파트,Lee,N1,연차\n";
    const LEGEND: &str = "팀 근무기호,실제 근무\nD1,주간 근무\nN1,야간 근무\n";

    #[test]
    fn uploads_require_unlocked_team() {
        let dir = TempDir::new().unwrap();
        let (app, sync) = app(&dir);
        let session = Session::new(Team::Control, NaiveDate::from_ymd_opt(2025, 3, 15).unwrap());
        let period = Period::new(2025, 3).unwrap();

        let err = app
            .upload_schedule(&session, Team::Control, period, Path::new("r.csv"), ROSTER.as_bytes())
            .unwrap_err();
        assert!(matches!(err, AppError::AdminRequired(Team::Control)));
        assert_eq!(sync.commit_count(), 0);
    }

    #[test]
    fn schedule_upload_publishes_the_month() {
        let dir = TempDir::new().unwrap();
        let (app, _sync) = app(&dir);
        let session = admin(&app);
        let period = Period::new(2025, 3).unwrap();

        app.upload_legend(&session, Team::Control, Path::new("l.csv"), LEGEND.as_bytes())
            .unwrap();
        let report = app
            .upload_schedule(&session, Team::Control, period, Path::new("r.csv"), ROSTER.as_bytes())
            .unwrap();
        assert_eq!(report.days_covered, 2);

        let date = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();
        let response = crate::api::handle_query(&app.snapshots, "team=관제SO팀&date=2025-03-15");
        assert!(!response.is_error());

        match app.shift_board(Team::Control, date).unwrap() {
            ShiftBoard::Ready { buckets, legend_missing } => {
                assert!(!legend_missing);
                assert_eq!(buckets.day[0].division, "팀장");
                assert_eq!(buckets.vacation[0].name, "Lee");
            }
            other => panic!("unexpected board {other:?}"),
        }
    }

    #[test]
    fn legend_without_descriptor_column_keeps_previous_legend() {
        let dir = TempDir::new().unwrap();
        let (app, _sync) = app(&dir);
        let session = admin(&app);

        app.upload_legend(&session, Team::Control, Path::new("l.csv"), LEGEND.as_bytes())
            .unwrap();
        let before = std::fs::read(app.legends.path(Team::Control)).unwrap();

        let broken = "팀 근무기호,비고\nD1,memo\n";
        let err = app
            .upload_legend(&session, Team::Control, Path::new("l.csv"), broken.as_bytes())
            .unwrap_err();
        assert!(matches!(err, AppError::Store(StoreError::MalformedInput(_))));
        assert_eq!(std::fs::read(app.legends.path(Team::Control)).unwrap(), before);
    }

    #[test]
    fn roster_view_drops_metadata_and_filters_by_name() {
        let dir = TempDir::new().unwrap();
        let (app, _sync) = app(&dir);
        let session = admin(&app);
        let period = Period::new(2025, 3).unwrap();
        app.upload_schedule(&session, Team::Control, period, Path::new("r.csv"), ROSTER.as_bytes())
            .unwrap();

        let view = app.roster_view(Team::Control, period, "").unwrap().unwrap();
        assert!(!view.has_column("본부 구분"));
        assert_eq!(view.rows.len(), 2);

        let view = app.roster_view(Team::Control, period, " Le ").unwrap().unwrap();
        assert_eq!(view.rows.len(), 1);
        assert!(app.roster_view(Team::East, period, "").unwrap().is_none());

        let (name, bytes) = app.export_roster(Team::Control, period).unwrap();
        assert_eq!(name, "관제SO팀_3월_근무표.csv");
        assert!(bytes.starts_with(&[0xEF, 0xBB, 0xBF]));
        assert!(String::from_utf8_lossy(&bytes).contains("본부 구분"));
    }

    #[test]
    fn memos_list_newest_first_and_delete_is_gated() {
        let dir = TempDir::new().unwrap();
        let (app, _sync) = app(&dir);
        let period = Period::new(2025, 3).unwrap();
        app.memos
            .append_at(Team::Control, period, "first", "Kim", "2025-03-01 10:00:00")
            .unwrap();
        app.memos
            .append_at(Team::Control, period, "second", "Kim", "2025-03-01 11:00:00")
            .unwrap();

        let listed = app.list_memos(Team::Control, period).unwrap();
        let notes: Vec<_> = listed.iter().map(|m| m.note.as_str()).collect();
        assert_eq!(notes, vec!["second", "first"]);

        let guest = Session::new(Team::Control, period.first_day());
        assert!(app
            .delete_memo(&guest, Team::Control, period, &listed[1])
            .is_err());
        assert!(app
            .delete_memo(&admin(&app), Team::Control, period, &listed[1])
            .unwrap());
    }

    #[test]
    fn failed_roster_push_still_publishes_the_month() {
        let dir = TempDir::new().unwrap();
        let (app, sync) = app(&dir);
        let session = admin(&app);
        app.upload_legend(&session, Team::Control, Path::new("l.csv"), LEGEND.as_bytes())
            .unwrap();
        sync.fail.store(true, std::sync::atomic::Ordering::SeqCst);

        let period = Period::new(2025, 3).unwrap();
        let err = app
            .upload_schedule(&session, Team::Control, period, Path::new("r.csv"), ROSTER.as_bytes())
            .unwrap_err();
        assert!(matches!(err, AppError::Store(StoreError::Git(_))));

        let day = |d| NaiveDate::from_ymd_opt(2025, 3, d).unwrap();
        assert!(app.schedules.exists((Team::Control, period)));
        assert!(app.snapshots.exists((Team::Control, day(14))));
        let snapshot = app.snapshots.read((Team::Control, day(15))).unwrap().unwrap();
        assert_eq!(snapshot.date, "2025-03-15");
        assert_eq!(snapshot.day_shift.len(), 1);
    }

    #[test]
    fn unreachable_remote_leaves_local_data_readable() {
        let git_ok = std::process::Command::new("git")
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success());
        if !git_ok {
            return;
        }
        let dir = TempDir::new().unwrap();
        let remote = dir.path().join("missing-remote.git");
        let root = dir.path().join("checkout");
        let settings = crate::git::RepoSettings {
            url: Some(remote.to_string_lossy().into_owned()),
            ..crate::git::RepoSettings::default()
        };
        let layout = Layout::new(&root);
        let repo = Arc::new(RepoSession::new(&root, settings));
        repo.init(&layout).unwrap();

        let mut app = App::with_backend(
            layout,
            repo.clone(),
            chrono_tz::Asia::Seoul,
            AdminGate::default(),
        );
        app.repo = Some(repo);

        assert!(app.refresh().is_some());
        let period = Period::new(2025, 3).unwrap();
        assert!(app.list_memos(Team::Control, period).unwrap().is_empty());
    }

    #[test]
    fn local_only_refresh_succeeds() {
        let dir = TempDir::new().unwrap();
        let (app, _sync) = app(&dir);
        assert!(app.refresh().is_none());
    }

    #[test]
    fn deleting_a_listed_memo_removes_that_memo_when_timestamps_tie() {
        let dir = TempDir::new().unwrap();
        let (app, _sync) = app(&dir);
        let period = Period::new(2025, 3).unwrap();
        let ts = "2025-03-01 10:00:00";
        app.memos.append_at(Team::Control, period, "older", "Kim", ts).unwrap();
        app.memos.append_at(Team::Control, period, "newer", "Lee", ts).unwrap();

        let listed = app.list_memos(Team::Control, period).unwrap();
        let selected = listed[0].clone();
        assert!(app
            .delete_memo(&admin(&app), Team::Control, period, &selected)
            .unwrap());

        let remaining = app.list_memos(Team::Control, period).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_ne!(remaining[0].note, selected.note);
    }

    #[test]
    fn board_reports_missing_roster_and_missing_column() {
        let dir = TempDir::new().unwrap();
        let (app, _sync) = app(&dir);
        let session = admin(&app);
        let date = NaiveDate::from_ymd_opt(2025, 3, 20).unwrap();
        assert_eq!(app.shift_board(Team::Control, date).unwrap(), ShiftBoard::NoRoster);

        app.upload_schedule(
            &session,
            Team::Control,
            Period::of(date),
            Path::new("r.csv"),
            ROSTER.as_bytes(),
        )
        .unwrap();
        assert_eq!(
            app.shift_board(Team::Control, date).unwrap(),
            ShiftBoard::NoColumn("20(목)".to_string())
        );
    }

    #[test]
    fn sync_without_repository_is_local_only() {
        let dir = TempDir::new().unwrap();
        let (app, _sync) = app(&dir);
        assert_eq!(app.sync(&CancelToken::new()).unwrap(), PullOutcome::LocalOnly);
    }
}
