//! Recursive filesystem watcher with debounce.
//!
//! Raw notifications from the `notify` backend funnel into a pump task
//! that resolves each path to its owning folder, filters ignored paths,
//! classifies the change, and debounces: every arrival restarts a single
//! global 100 ms deadline, and on expiry all pending events flush at once
//! into a bounded output channel. The last event per absolute path wins
//! within a window; a full output channel drops events with a warning
//! (a later full scan re-establishes truth).

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lansync_core::{fsutil, PathFilter};
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::error::NodeError;

/// Quiescence interval after the last raw notification.
pub const DEBOUNCE_MS: u64 = 100;

/// Capacity of the debounced output channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Classification of a filesystem change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    /// A file or directory appeared.
    Create,
    /// A file's content or metadata changed.
    Modify,
    /// A file or directory was removed.
    Delete,
    /// A file was renamed away; treated as the delete half downstream,
    /// the create half arrives as its own event.
    Rename,
}

impl std::fmt::Display for FileEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Delete => "delete",
            Self::Rename => "rename",
        })
    }
}

/// One debounced filesystem event inside a watched folder.
#[derive(Debug, Clone)]
pub struct FileEvent {
    /// What happened.
    pub kind: FileEventKind,
    /// Absolute path.
    pub path: PathBuf,
    /// Path relative to the owning folder, `/`-separated.
    pub rel_path: String,
    /// The owning folder root.
    pub folder_path: PathBuf,
    /// Detection time.
    pub at: DateTime<Utc>,
}

/// Recursive directory monitor producing debounced [`FileEvent`]s.
pub struct Watcher {
    folders: Arc<RwLock<HashSet<PathBuf>>>,
    watcher: Mutex<RecommendedWatcher>,
}

impl Watcher {
    /// Create the watcher and its event stream.
    ///
    /// The pump task runs until `cancel` fires or the watcher is dropped.
    pub fn new(
        filter: PathFilter,
        cancel: CancellationToken,
    ) -> Result<(Self, mpsc::Receiver<FileEvent>), NodeError> {
        let (raw_tx, raw_rx) = mpsc::channel::<notify::Result<notify::Event>>(1024);
        let watcher = RecommendedWatcher::new(
            move |result| {
                let _ = raw_tx.blocking_send(result);
            },
            notify::Config::default(),
        )?;

        let (out_tx, out_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let folders = Arc::new(RwLock::new(HashSet::new()));

        tokio::spawn(pump(raw_rx, out_tx, folders.clone(), filter, cancel));

        Ok((
            Self {
                folders,
                watcher: Mutex::new(watcher),
            },
            out_rx,
        ))
    }

    /// Start watching a folder subtree. Idempotent.
    pub fn add_folder(&self, path: &Path) -> Result<(), NodeError> {
        let mut folders = self.folders.write();
        if folders.contains(path) {
            return Ok(());
        }

        self.watcher
            .lock()
            .watch(path, RecursiveMode::Recursive)?;
        folders.insert(path.to_path_buf());
        tracing::info!("Watching folder {}", path.display());
        Ok(())
    }

    /// Stop watching a folder subtree. Idempotent.
    pub fn remove_folder(&self, path: &Path) {
        let mut folders = self.folders.write();
        if !folders.remove(path) {
            return;
        }

        if let Err(err) = self.watcher.lock().unwatch(path) {
            tracing::warn!("Failed to unwatch {}: {}", path.display(), err);
        }
        tracing::info!("Stopped watching folder {}", path.display());
    }

    /// Whether a folder is currently watched.
    pub fn is_watching(&self, path: &Path) -> bool {
        self.folders.read().contains(path)
    }

    /// The currently watched folder roots.
    pub fn watched_folders(&self) -> Vec<PathBuf> {
        self.folders.read().iter().cloned().collect()
    }
}

/// Debounce pump: raw notifications in, coalesced events out.
async fn pump(
    mut raw_rx: mpsc::Receiver<notify::Result<notify::Event>>,
    out_tx: mpsc::Sender<FileEvent>,
    folders: Arc<RwLock<HashSet<PathBuf>>>,
    filter: PathFilter,
    cancel: CancellationToken,
) {
    let mut pending: HashMap<PathBuf, FileEvent> = HashMap::new();
    let mut deadline: Option<tokio::time::Instant> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,

            maybe = raw_rx.recv() => {
                let Some(result) = maybe else {
                    // Watcher dropped; push out whatever is pending.
                    flush(&mut pending, &out_tx);
                    return;
                };
                match result {
                    Ok(event) => {
                        for file_event in classify(&event, &folders, &filter) {
                            pending.insert(file_event.path.clone(), file_event);
                            deadline = Some(
                                tokio::time::Instant::now()
                                    + Duration::from_millis(DEBOUNCE_MS),
                            );
                        }
                    }
                    Err(err) => {
                        tracing::error!("Watcher error: {}", err);
                    }
                }
            }

            _ = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            } => {
                deadline = None;
                flush(&mut pending, &out_tx);
            }
        }
    }
}

/// Map one raw notification to zero or more typed events.
fn classify(
    event: &notify::Event,
    folders: &RwLock<HashSet<PathBuf>>,
    filter: &PathFilter,
) -> Vec<FileEvent> {
    let mut out = Vec::new();

    for path in &event.paths {
        let Some((folder_path, rel_path)) = resolve(path, folders) else {
            continue;
        };
        if filter.is_ignored_under(path, &folder_path) {
            continue;
        }

        let kind = match event.kind {
            EventKind::Create(_) => FileEventKind::Create,
            EventKind::Modify(ModifyKind::Name(mode)) => match mode {
                RenameMode::From => FileEventKind::Rename,
                RenameMode::To => FileEventKind::Create,
                // Direction unknown; an existing path means we are the
                // destination of the rename.
                _ => {
                    if path.exists() {
                        FileEventKind::Create
                    } else {
                        FileEventKind::Rename
                    }
                }
            },
            EventKind::Remove(_) => FileEventKind::Delete,
            EventKind::Modify(_) => FileEventKind::Modify,
            _ => continue,
        };

        out.push(FileEvent {
            kind,
            path: path.clone(),
            rel_path,
            folder_path,
            at: Utc::now(),
        });
    }

    out
}

/// Map an absolute path back to its owning watched folder.
///
/// Paths escaping all roots, or whose relativization starts with `.`,
/// are discarded.
fn resolve(path: &Path, folders: &RwLock<HashSet<PathBuf>>) -> Option<(PathBuf, String)> {
    let folders = folders.read();
    for folder in folders.iter() {
        if let Some(rel) = fsutil::rel_path_string(path, folder) {
            return Some((folder.clone(), rel));
        }
    }
    None
}

fn flush(pending: &mut HashMap<PathBuf, FileEvent>, out_tx: &mpsc::Sender<FileEvent>) {
    for (_, event) in pending.drain() {
        if let Err(err) = out_tx.try_send(event) {
            match err {
                TrySendError::Full(event) => {
                    tracing::warn!(
                        "Event channel full, dropping event for {}",
                        event.path.display()
                    );
                }
                TrySendError::Closed(_) => return,
            }
        }
    }
}
