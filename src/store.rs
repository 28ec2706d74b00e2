use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{StoreError, StoreResult};
use crate::git::SyncBackend;
use crate::layout::Layout;

/// Common surface of the file-backed stores.
///
/// Absent files are a normal state: `read` returns `Ok(None)` and `delete`
/// returns `Ok(false)`. Every successful mutation is committed and pushed
/// before it returns.
pub trait RecordStore {
    type Key: Copy;
    type Record;

    fn path(&self, key: Self::Key) -> PathBuf;

    fn read(&self, key: Self::Key) -> StoreResult<Option<Self::Record>>;

    /// Replaces the whole record.
    fn write(&self, key: Self::Key, record: &Self::Record) -> StoreResult<()>;

    /// Removes the record. Returns `false` when there was nothing to remove.
    fn delete(&self, key: Self::Key) -> StoreResult<bool>;

    fn exists(&self, key: Self::Key) -> bool {
        self.path(key).exists()
    }
}

/// Shared by all stores: the checkout layout and the commit backend. Every
/// mutation runs under the backend's writer lock, the same lock a pull takes.
pub struct StoreContext {
    layout: Layout,
    sync: Arc<dyn SyncBackend>,
}

impl StoreContext {
    pub fn new(layout: Layout, sync: Arc<dyn SyncBackend>) -> Arc<Self> {
        Arc::new(Self { layout, sync })
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Runs `mutate` under the writer lock and commits `paths` afterwards.
    /// Nothing is committed when `mutate` fails.
    pub fn mutate<T>(
        &self,
        label: &str,
        paths: &[PathBuf],
        mutate: impl FnOnce() -> StoreResult<T>,
    ) -> StoreResult<T> {
        let _guard = self.sync.writer().lock();
        let value = mutate()?;
        self.sync.commit_and_push(paths, label)?;
        Ok(value)
    }

    /// [`StoreContext::mutate`] where `mutate` reports whether it changed
    /// anything. Unchanged stores are not committed.
    pub fn mutate_if_changed<T>(
        &self,
        label: &str,
        paths: &[PathBuf],
        mutate: impl FnOnce() -> StoreResult<(T, bool)>,
    ) -> StoreResult<T> {
        let _guard = self.sync.writer().lock();
        let (value, changed) = mutate()?;
        if changed {
            self.sync.commit_and_push(paths, label)?;
        }
        Ok(value)
    }

    /// [`StoreContext::mutate`] for batches that touch many files at once.
    pub fn mutate_batch<T>(
        &self,
        label: &str,
        mutate: impl FnOnce() -> StoreResult<(T, Vec<PathBuf>)>,
    ) -> StoreResult<T> {
        let _guard = self.sync.writer().lock();
        let (value, paths) = mutate()?;
        if !paths.is_empty() {
            self.sync.commit_batch_and_push(&paths, label)?;
        }
        Ok(value)
    }
}

/// File contents, or `None` when the file does not exist.
pub fn read_optional(path: &Path) -> StoreResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::Io(e)),
    }
}

/// Replaces `path` with `bytes` through a sibling temp file and a rename, so
/// readers never observe a half-written file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| StoreError::malformed(format!("no parent folder for {}", path.display())))?;
    fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{file_name}.tmp"));
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Removes `path`. Returns `false` when it did not exist.
pub fn remove_if_exists(path: &Path) -> StoreResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StoreError::Io(e)),
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use crate::error::GitError;
    use crate::git::CommitOutcome;
    use parking_lot::{Mutex, ReentrantMutex};

    /// Records commits instead of running git.
    #[derive(Default)]
    pub struct RecordingSync {
        pub commits: Mutex<Vec<(String, Vec<PathBuf>, bool)>>,
        pub fail: std::sync::atomic::AtomicBool,
        pub writer: ReentrantMutex<()>,
    }

    impl RecordingSync {
        pub fn labels(&self) -> Vec<String> {
            self.commits.lock().iter().map(|c| c.0.clone()).collect()
        }

        pub fn commit_count(&self) -> usize {
            self.commits.lock().len()
        }
    }

    impl RecordingSync {
        fn record(
            &self,
            paths: &[PathBuf],
            label: &str,
            batch: bool,
        ) -> Result<CommitOutcome, GitError> {
            if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(GitError::CommandFailed {
                    command: "push -q origin main".to_string(),
                    stderr: "rejected".to_string(),
                });
            }
            self.commits
                .lock()
                .push((label.to_string(), paths.to_vec(), batch));
            Ok(CommitOutcome::Pushed)
        }
    }

    impl SyncBackend for RecordingSync {
        fn writer(&self) -> &ReentrantMutex<()> {
            &self.writer
        }

        fn commit_and_push(
            &self,
            paths: &[PathBuf],
            label: &str,
        ) -> Result<CommitOutcome, GitError> {
            self.record(paths, label, false)
        }

        fn commit_batch_and_push(
            &self,
            paths: &[PathBuf],
            label: &str,
        ) -> Result<CommitOutcome, GitError> {
            self.record(paths, label, true)
        }
    }

    pub fn context(root: &Path) -> (Arc<StoreContext>, Arc<RecordingSync>) {
        let sync = Arc::new(RecordingSync::default());
        let layout = Layout::new(root);
        layout.provision().expect("provision");
        (StoreContext::new(layout, sync.clone()), sync)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn read_optional_maps_missing_file_to_none() {
        let dir = TempDir::new().expect("tempdir");
        assert!(read_optional(&dir.path().join("nope")).unwrap().is_none());
    }

    #[test]
    fn write_atomic_replaces_and_leaves_no_temp_file() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("a/b/file.json");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"two");
        let names: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(remove_if_exists(&path).unwrap());
        assert!(!remove_if_exists(&path).unwrap());
    }

    #[test]
    fn failed_mutation_commits_nothing() {
        let dir = TempDir::new().expect("tempdir");
        let (ctx, sync) = testing::context(dir.path());
        let result: StoreResult<()> =
            ctx.mutate("x", &[dir.path().join("f")], || Err(StoreError::malformed("bad")));
        assert!(result.is_err());
        assert_eq!(sync.commit_count(), 0);
    }

    #[test]
    fn sync_failure_surfaces_as_git_error() {
        let dir = TempDir::new().expect("tempdir");
        let (ctx, sync) = testing::context(dir.path());
        sync.fail.store(true, std::sync::atomic::Ordering::SeqCst);
        let err = ctx
            .mutate("x", &[dir.path().join("f")], || Ok(()))
            .unwrap_err();
        assert!(matches!(err, StoreError::Git(_)));
    }

    #[test]
    fn mutation_waits_for_the_writer_lock() {
        let dir = TempDir::new().expect("tempdir");
        let (ctx, sync) = testing::context(dir.path());
        let path = dir.path().join("held.json");

        let guard = sync.writer().lock();
        let worker = {
            let ctx = ctx.clone();
            let path = path.clone();
            std::thread::spawn(move || {
                ctx.mutate("held", &[path.clone()], || write_atomic(&path, b"[]"))
            })
        };
        std::thread::sleep(std::time::Duration::from_millis(100));
        assert!(!path.exists());
        assert_eq!(sync.commit_count(), 0);

        drop(guard);
        worker.join().expect("join").unwrap();
        assert!(path.exists());
        assert_eq!(sync.labels(), vec!["held".to_string()]);
    }
}
