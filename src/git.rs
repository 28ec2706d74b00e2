//! Git-backed persistence for the roster checkout.
//!
//! Every store file lives inside one local checkout. Mutations are staged path by
//! path, committed with a generated message and pushed to the configured remote;
//! remote history is merged back with [`RepoSession::pull_cancellable`]. Without a remote URL
//! the session runs in local-only mode and only commits.

use std::path::PathBuf;
use std::process::{Command, Output};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use chrono_tz::Tz;
use parking_lot::ReentrantMutex;
use serde::{Deserialize, Serialize};

use crate::error::GitError;
use crate::layout::Layout;

/// What to do when a merge leaves unmerged paths behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Abort the merge and report the conflicting paths to the operator.
    #[default]
    Surface,
    /// Keep the remote copy of every conflicting path. Local edits to those
    /// paths are discarded and logged.
    AcceptRemote,
}

impl std::str::FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "surface" => Ok(Self::Surface),
            "accept_remote" | "accept-remote" => Ok(Self::AcceptRemote),
            other => Err(format!(
                "Unknown conflict policy: {other} (use 'surface' or 'accept_remote')"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RepoSettings {
    /// Remote URL. `None` means local-only.
    pub url: Option<String>,
    /// Credential injected into https remote URLs.
    pub token: Option<String>,
    pub branch: String,
    pub author_name: String,
    pub author_email: String,
    pub conflict_policy: ConflictPolicy,
    pub timezone: Tz,
}

impl Default for RepoSettings {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            branch: "main".to_string(),
            author_name: "rosterboard".to_string(),
            author_email: "rosterboard@localhost".to_string(),
            conflict_policy: ConflictPolicy::default(),
            timezone: chrono_tz::Asia::Seoul,
        }
    }
}

impl RepoSettings {
    /// Remote URL with the token spliced in, for https remotes.
    pub fn authenticated_url(&self) -> Option<String> {
        let url = self.url.as_deref()?;
        match (self.token.as_deref(), url.strip_prefix("https://")) {
            (Some(token), Some(rest)) if !token.is_empty() => {
                // Drop any credential already embedded in the URL.
                let host_and_path = rest.split_once('@').map(|(_, r)| r).unwrap_or(rest);
                Some(format!("https://{token}@{host_and_path}"))
            }
            _ => Some(url.to_string()),
        }
    }

    /// Removes the configured token from text that is about to be surfaced.
    pub fn redact(&self, text: &str) -> String {
        match self.token.as_deref() {
            Some(token) if !token.is_empty() => text.replace(token, "***"),
            _ => text.to_string(),
        }
    }
}

/// Cooperative cancellation flag for long-running pulls.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    LocalOnly,
    /// The remote branch does not exist yet; the next push creates it.
    RemoteEmpty,
    UpToDate,
    Merged,
    /// Conflicts were resolved by taking the remote copy of these paths.
    ResolvedWithRemote(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    NoChanges,
    Committed,
    Pushed,
}

/// Commits store mutations somewhere durable.
pub trait SyncBackend: Send + Sync {
    /// The single writer lock. Store mutations hold it across their file writes
    /// and the commit; pulls hold it across fetch and merge. Reentrant so a
    /// holder can commit without releasing it.
    fn writer(&self) -> &ReentrantMutex<()>;

    /// Stages `paths` (changed or deleted), commits them as one commit labelled
    /// with `label`, and pushes.
    fn commit_and_push(&self, paths: &[PathBuf], label: &str) -> Result<CommitOutcome, GitError>;

    /// Like [`SyncBackend::commit_and_push`] but merges remote history before the
    /// push, for large batches that are expensive to redo.
    fn commit_batch_and_push(
        &self,
        paths: &[PathBuf],
        label: &str,
    ) -> Result<CommitOutcome, GitError> {
        self.commit_and_push(paths, label)
    }
}

pub struct RepoSession {
    root: PathBuf,
    settings: RepoSettings,
    lock: ReentrantMutex<()>,
}

impl RepoSession {
    pub fn new(root: impl Into<PathBuf>, settings: RepoSettings) -> Self {
        Self {
            root: root.into(),
            settings,
            lock: ReentrantMutex::new(()),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.root.join(".git").exists()
    }

    fn has_remote(&self) -> bool {
        self.settings.url.as_deref().is_some_and(|u| !u.is_empty())
    }

    /// Creates the checkout when absent: `git init`, origin remote, store folders,
    /// an initial commit of placeholder files, and the primary branch name.
    /// An existing checkout only gets its folders provisioned and its remote
    /// refreshed. Returns `true` when a new checkout was created.
    pub fn init(&self, layout: &Layout) -> Result<bool, GitError> {
        let _guard = self.lock.lock();

        std::fs::create_dir_all(&self.root)?;
        layout.provision()?;

        if self.is_initialized() {
            self.refresh_remote()?;
            return Ok(false);
        }

        tracing::info!(root = %self.root.display(), "initialising roster checkout");
        self.git(&["init", "-q"])?;
        self.refresh_remote()?;

        let placeholders = layout.write_placeholders()?;
        let mut args = vec!["add", "--"];
        let rel: Vec<String> = placeholders
            .iter()
            .map(|p| layout.relative(p).to_string_lossy().into_owned())
            .collect();
        args.extend(rel.iter().map(|s| s.as_str()));
        self.git(&args)?;
        self.git(&["commit", "-q", "-m", "Initial commit"])?;
        self.git(&["branch", "-M", &self.settings.branch])?;
        Ok(true)
    }

    #[cfg(test)]
    pub fn pull(&self) -> Result<PullOutcome, GitError> {
        self.pull_cancellable(&CancelToken::new())
    }

    /// Fetches and merges remote history, tolerating unrelated histories. Gives
    /// up between fetch and merge when `token` has been cancelled.
    pub fn pull_cancellable(&self, token: &CancelToken) -> Result<PullOutcome, GitError> {
        let _guard = self.lock.lock();
        self.pull_locked(token)
    }

    fn pull_locked(&self, token: &CancelToken) -> Result<PullOutcome, GitError> {
        if !self.is_initialized() {
            return Err(GitError::NotARepository(self.root.clone()));
        }
        if !self.has_remote() {
            return Ok(PullOutcome::LocalOnly);
        }
        if token.is_cancelled() {
            return Err(GitError::Cancelled);
        }

        self.refresh_remote()?;
        let branch = self.settings.branch.clone();
        match self.git(&["fetch", "-q", "origin", &branch]) {
            Ok(_) => {}
            Err(GitError::CommandFailed { stderr, .. })
                if stderr.contains("couldn't find remote ref") =>
            {
                tracing::debug!(branch = %branch, "remote branch does not exist yet");
                return Ok(PullOutcome::RemoteEmpty);
            }
            Err(e) => return Err(e),
        }

        if token.is_cancelled() {
            tracing::info!("pull cancelled after fetch");
            return Err(GitError::Cancelled);
        }

        match self.git(&[
            "merge",
            "--no-edit",
            "--allow-unrelated-histories",
            "FETCH_HEAD",
        ]) {
            Ok(stdout) => {
                if stdout.contains("Already up to date") {
                    Ok(PullOutcome::UpToDate)
                } else {
                    tracing::info!("merged remote roster changes");
                    Ok(PullOutcome::Merged)
                }
            }
            Err(err) => {
                let conflicts = self.unmerged_paths()?;
                if conflicts.is_empty() {
                    return Err(err);
                }
                self.resolve_conflicts(conflicts)
            }
        }
    }

    fn resolve_conflicts(&self, paths: Vec<String>) -> Result<PullOutcome, GitError> {
        match self.settings.conflict_policy {
            ConflictPolicy::Surface => {
                tracing::error!(paths = ?paths, "merge conflict, aborting merge");
                self.git(&["merge", "--abort"])?;
                Err(GitError::Conflict { paths })
            }
            ConflictPolicy::AcceptRemote => {
                for path in &paths {
                    tracing::warn!(path = %path, "conflict: discarding local copy in favour of remote");
                    if self.git(&["checkout", "--theirs", "--", path]).is_ok() {
                        self.git(&["add", "--", path])?;
                    } else {
                        // Deleted on the remote side.
                        self.git(&["rm", "-q", "--", path])?;
                    }
                }
                let message = self.commit_message("Conflict Resolution");
                self.git(&["commit", "-q", "-m", &message])?;
                Ok(PullOutcome::ResolvedWithRemote(paths))
            }
        }
    }

    fn unmerged_paths(&self) -> Result<Vec<String>, GitError> {
        let out = self.git(&["diff", "--name-only", "--diff-filter=U"])?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn commit_message(&self, label: &str) -> String {
        let now = Utc::now().with_timezone(&self.settings.timezone);
        format!("Auto-commit: {label} {}", now.format("%Y-%m-%d %H:%M"))
    }

    fn refresh_remote(&self) -> Result<(), GitError> {
        let Some(url) = self.settings.authenticated_url().filter(|u| !u.is_empty()) else {
            return Ok(());
        };
        let remotes = self.git(&["remote"])?;
        if remotes.lines().any(|r| r.trim() == "origin") {
            self.git(&["remote", "set-url", "origin", &url])?;
        } else {
            self.git(&["remote", "add", "origin", &url])?;
        }
        Ok(())
    }

    /// Stages and commits `paths`. Returns `false` when nothing changed.
    fn stage_and_commit(&self, paths: &[PathBuf], label: &str) -> Result<bool, GitError> {
        if !self.is_initialized() {
            return Err(GitError::NotARepository(self.root.clone()));
        }

        let rel: Vec<String> = paths
            .iter()
            .map(|p| {
                p.strip_prefix(&self.root)
                    .unwrap_or(p)
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();

        for (abs, rel) in paths.iter().zip(&rel) {
            if abs.exists() {
                self.git(&["add", "-A", "--", rel])?;
            } else {
                self.git(&["rm", "-q", "-r", "--cached", "--ignore-unmatch", "--", rel])?;
            }
        }

        let mut diff = vec!["diff", "--cached", "--quiet", "--"];
        diff.extend(rel.iter().map(|s| s.as_str()));
        let status = self.run(&diff)?;
        if status.status.success() {
            tracing::debug!(label, "nothing to commit");
            return Ok(false);
        }

        let message = self.commit_message(label);
        self.git(&["commit", "-q", "-m", &message])?;
        self.git(&["branch", "-M", &self.settings.branch])?;
        tracing::info!(label, files = rel.len(), "committed roster change");
        Ok(true)
    }

    fn push_locked(&self) -> Result<(), GitError> {
        self.refresh_remote()?;
        let branch = self.settings.branch.clone();
        self.git(&["push", "-q", "origin", &branch])?;
        tracing::info!(branch = %branch, "pushed roster changes");
        Ok(())
    }

    /// Runs `op`; on failure attempts one corrective pull and returns the
    /// original error.
    fn with_corrective_pull<T>(
        &self,
        op: impl FnOnce() -> Result<T, GitError>,
    ) -> Result<T, GitError> {
        match op() {
            Ok(value) => Ok(value),
            Err(err) => {
                tracing::error!(error = %err, "git operation failed, pulling to recover");
                if self.is_initialized()
                    && let Err(pull_err) = self.pull_locked(&CancelToken::new())
                {
                    tracing::warn!(error = %pull_err, "corrective pull failed");
                }
                Err(err)
            }
        }
    }

    fn git(&self, args: &[&str]) -> Result<String, GitError> {
        let output = self.run(args)?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let detail = if stderr.trim().is_empty() {
                stdout.trim()
            } else {
                stderr.trim()
            };
            Err(GitError::CommandFailed {
                command: self.settings.redact(&args.join(" ")),
                stderr: self.settings.redact(detail),
            })
        }
    }

    fn run(&self, args: &[&str]) -> Result<Output, GitError> {
        tracing::debug!(command = %self.settings.redact(&args.join(" ")), "git");
        Command::new("git")
            .arg("-C")
            .arg(&self.root)
            .arg("-c")
            .arg(format!("user.name={}", self.settings.author_name))
            .arg("-c")
            .arg(format!("user.email={}", self.settings.author_email))
            .args(["-c", "core.quotepath=false", "-c", "commit.gpgsign=false"])
            .args(args)
            .env("LC_ALL", "C")
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .map_err(|source| GitError::Spawn {
                command: self.settings.redact(&args.join(" ")),
                source,
            })
    }
}

impl SyncBackend for RepoSession {
    fn writer(&self) -> &ReentrantMutex<()> {
        &self.lock
    }

    fn commit_and_push(&self, paths: &[PathBuf], label: &str) -> Result<CommitOutcome, GitError> {
        let _guard = self.lock.lock();
        self.with_corrective_pull(|| {
            if !self.stage_and_commit(paths, label)? {
                return Ok(CommitOutcome::NoChanges);
            }
            if !self.has_remote() {
                return Ok(CommitOutcome::Committed);
            }
            self.push_locked()?;
            Ok(CommitOutcome::Pushed)
        })
    }

    fn commit_batch_and_push(
        &self,
        paths: &[PathBuf],
        label: &str,
    ) -> Result<CommitOutcome, GitError> {
        let _guard = self.lock.lock();
        self.with_corrective_pull(|| {
            if !self.stage_and_commit(paths, label)? {
                return Ok(CommitOutcome::NoChanges);
            }
            if !self.has_remote() {
                return Ok(CommitOutcome::Committed);
            }
            self.pull_locked(&CancelToken::new())?;
            self.push_locked()?;
            Ok(CommitOutcome::Pushed)
        })
    }
}
