use anyhow::Result;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify_types::event::{Event, EventKind};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};

use crate::layout::{Layout, StoreKind};
use crate::types::Team;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatcherEvent {
    /// A store file was created, modified or deleted.
    StoreChanged(StoreKind, Team, PathBuf),
    /// An error occurred
    Error(String),
}

/// Watches the checkout so the dashboard notices files changed by a pull or
/// by another process.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    event_rx: Receiver<WatcherEvent>,
}

impl FileWatcher {
    pub fn new(layout: &Layout) -> Result<Self> {
        let (event_tx, event_rx) = mpsc::channel();
        let handler_layout = layout.clone();

        let mut watcher =
            notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
                Ok(event) => handle_fs_event(event, &event_tx, &handler_layout),
                Err(e) => {
                    let _ = event_tx.send(WatcherEvent::Error(format!("Watch error: {e}")));
                }
            })?;

        watcher.watch(layout.root(), RecursiveMode::Recursive)?;

        Ok(Self {
            _watcher: watcher,
            event_rx,
        })
    }

    pub fn try_recv(&self) -> Option<WatcherEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Drains pending events. Returns the distinct (store, team) pairs that
    /// changed and any watch errors.
    pub fn drain(&self) -> (BTreeSet<(StoreKind, Team)>, Vec<String>) {
        let mut changed = BTreeSet::new();
        let mut errors = Vec::new();
        while let Some(event) = self.try_recv() {
            match event {
                WatcherEvent::StoreChanged(kind, team, _) => {
                    changed.insert((kind, team));
                }
                WatcherEvent::Error(e) => errors.push(e),
            }
        }
        (changed, errors)
    }
}

fn handle_fs_event(event: Event, tx: &Sender<WatcherEvent>, layout: &Layout) {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return;
    }
    for path in &event.paths {
        if let Some((kind, team)) = store_file(path, layout) {
            let _ = tx.send(WatcherEvent::StoreChanged(kind, team, path.clone()));
        }
    }
}

/// Store and team of a data file. Git internals, placeholders and in-flight
/// temp files are ignored.
fn store_file(path: &Path, layout: &Layout) -> Option<(StoreKind, Team)> {
    let name = path.file_name()?.to_str()?;
    if name.starts_with('.') {
        return None;
    }
    layout.classify_path(path)
}
