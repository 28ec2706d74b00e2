//! Folder layout of the roster checkout.
//!
//! One git checkout holds four store roots, each with one subfolder per team:
//!
//! ```text
//! <checkout>/
//!   team_schedules/<team>/<year>_<m>월_<team>_schedule.csv
//!   team_model_example/<team>/<team>_model_example.csv
//!   team_today_schedules/<team>/<YYYY-MM>/<YYYY-MM-DD>_schedule.json
//!   team_memo/<team>/<year>_<m>월_memos.json
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::types::{Period, Team};

pub const SCHEDULES_DIR: &str = "team_schedules";
pub const LEGENDS_DIR: &str = "team_model_example";
pub const SNAPSHOTS_DIR: &str = "team_today_schedules";
pub const MEMOS_DIR: &str = "team_memo";

/// Placeholder committed into every store root so empty folders survive a clone.
pub const PLACEHOLDER: &str = ".gitkeep";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StoreKind {
    Schedule,
    Legend,
    Snapshot,
    Memo,
}

impl StoreKind {
    pub fn all() -> &'static [StoreKind] {
        &[Self::Schedule, Self::Legend, Self::Snapshot, Self::Memo]
    }

    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Schedule => SCHEDULES_DIR,
            Self::Legend => LEGENDS_DIR,
            Self::Snapshot => SNAPSHOTS_DIR,
            Self::Memo => MEMOS_DIR,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store_root(&self, kind: StoreKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    pub fn team_dir(&self, kind: StoreKind, team: Team) -> PathBuf {
        self.store_root(kind).join(team.name())
    }

    pub fn schedule_file(&self, team: Team, period: Period) -> PathBuf {
        self.team_dir(StoreKind::Schedule, team).join(format!(
            "{}_{}_{}_schedule.csv",
            period.year,
            period.month_label(),
            team.name()
        ))
    }

    pub fn legend_file(&self, team: Team) -> PathBuf {
        self.team_dir(StoreKind::Legend, team)
            .join(format!("{}_model_example.csv", team.name()))
    }

    pub fn memo_file(&self, team: Team, period: Period) -> PathBuf {
        self.team_dir(StoreKind::Memo, team)
            .join(format!("{}_{}_memos.json", period.year, period.month_label()))
    }

    pub fn snapshot_file(&self, team: Team, date: NaiveDate) -> PathBuf {
        self.team_dir(StoreKind::Snapshot, team)
            .join(Period::of(date).year_month())
            .join(format!("{}_schedule.json", date.format("%Y-%m-%d")))
    }

    /// Creates every store root and per-team folder that does not exist yet.
    /// Returns the folders that were created.
    pub fn provision(&self) -> io::Result<Vec<PathBuf>> {
        let mut created = Vec::new();

        for kind in StoreKind::all() {
            let store_root = self.store_root(*kind);
            if !store_root.exists() {
                fs::create_dir_all(&store_root)?;
                created.push(store_root);
            }
            for team in Team::all() {
                let dir = self.team_dir(*kind, *team);
                if !dir.exists() {
                    fs::create_dir_all(&dir)?;
                    created.push(dir);
                }
            }
        }

        if !created.is_empty() {
            tracing::info!(count = created.len(), root = %self.root.display(), "created store folders");
        }
        Ok(created)
    }

    /// Placeholder files for the initial commit, one per store root.
    pub fn write_placeholders(&self) -> io::Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for kind in StoreKind::all() {
            let path = self.store_root(*kind).join(PLACEHOLDER);
            if !path.exists() {
                fs::write(&path, b"")?;
            }
            written.push(path);
        }
        Ok(written)
    }

    /// Maps a path inside the checkout back to the store and team it belongs to.
    pub fn classify_path(&self, path: &Path) -> Option<(StoreKind, Team)> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let mut components = rel.components();
        let store = components.next()?.as_os_str().to_str()?;
        let team = components.next()?.as_os_str().to_str()?;

        let kind = StoreKind::all()
            .iter()
            .copied()
            .find(|k| k.dir_name() == store)?;
        let team = team.parse::<Team>().ok()?;
        Some((kind, team))
    }

    /// Path relative to the checkout root, as git wants it.
    pub fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn file_names_follow_store_conventions() {
        let layout = Layout::new("/data");
        let period = Period::new(2025, 3).unwrap();

        assert_eq!(
            layout.schedule_file(Team::Control, period),
            PathBuf::from("/data/team_schedules/관제SO팀/2025_3월_관제SO팀_schedule.csv")
        );
        assert_eq!(
            layout.legend_file(Team::East),
            PathBuf::from("/data/team_model_example/동부SO팀/동부SO팀_model_example.csv")
        );
        assert_eq!(
            layout.memo_file(Team::East, period),
            PathBuf::from("/data/team_memo/동부SO팀/2025_3월_memos.json")
        );
        let date = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(
            layout.snapshot_file(Team::Central, date),
            PathBuf::from(
                "/data/team_today_schedules/중부SO팀/2025-03/2025-03-07_schedule.json"
            )
        );
    }

    #[test]
    fn provision_is_idempotent() {
        let dir = TempDir::new().expect("tempdir");
        let layout = Layout::new(dir.path());

        let created = layout.provision().expect("provision");
        assert_eq!(created.len(), 4 + 4 * Team::all().len());
        for team in Team::all() {
            assert!(layout.team_dir(StoreKind::Memo, *team).is_dir());
        }

        assert!(layout.provision().expect("second provision").is_empty());
    }

    #[test]
    fn classify_path_finds_store_and_team() {
        let layout = Layout::new("/data");
        let path = layout.memo_file(Team::Security, Period::new(2025, 1).unwrap());
        assert_eq!(
            layout.classify_path(&path),
            Some((StoreKind::Memo, Team::Security))
        );
        assert_eq!(layout.classify_path(Path::new("/elsewhere/x")), None);
        assert_eq!(layout.classify_path(Path::new("/data/team_memo")), None);
    }
}
