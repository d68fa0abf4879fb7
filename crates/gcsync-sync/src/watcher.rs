//! File watching
//!
//! Provides a [`FileWatcher`] that wraps the `notify` crate to monitor a rule's
//! directory tree, converting raw OS events into [`ChangeEvent`] values.
//!
//! Only directories are registered, each non-recursively: a directory watch
//! reports create/write/remove events for its immediate children. The set of
//! registered directories is the rule's watch state; it only grows while the
//! watcher lives, as the scheduler registers directories created after start.
//!
//! The channel is unbounded. The notify thread must never block on a full
//! channel, because registering a watch waits on that same thread.
//!
//! ## Architecture
//!
//! ```text
//! inotify / kqueue
//!       │
//!       ▼
//!  FileWatcher  ──→  mpsc::channel<WatchMessage>  ──→  RuleScheduler
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

// ============================================================================
// ChangeEvent / WatchMessage
// ============================================================================

/// Represents a filesystem change event detected by the watcher
///
/// These events are the internal representation used by the scheduler,
/// decoupled from the `notify` crate's raw event types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A new file or directory appeared at the given path (created or moved in)
    Created(PathBuf),
    /// An existing entry was modified (content or metadata changed)
    Modified(PathBuf),
    /// An entry disappeared from the given path (deleted or moved out)
    Deleted(PathBuf),
    /// An entry was renamed within the watched tree
    Renamed {
        /// The original path before the rename
        old: PathBuf,
        /// The new path after the rename
        new: PathBuf,
    },
}

impl ChangeEvent {
    /// Returns the primary path associated with this event
    ///
    /// For rename events, this returns the new (destination) path.
    pub fn path(&self) -> &Path {
        match self {
            ChangeEvent::Created(p) => p,
            ChangeEvent::Modified(p) => p,
            ChangeEvent::Deleted(p) => p,
            ChangeEvent::Renamed { new, .. } => new,
        }
    }

    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            ChangeEvent::Created(_) => "create",
            ChangeEvent::Modified(_) => "modify",
            ChangeEvent::Deleted(_) => "delete",
            ChangeEvent::Renamed { .. } => "rename",
        }
    }

    /// True when the event may have brought a new directory into the tree
    pub fn may_add_directory(&self) -> bool {
        matches!(self, ChangeEvent::Created(_) | ChangeEvent::Renamed { .. })
    }
}

/// Message delivered from the OS watcher thread to the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchMessage {
    Change(ChangeEvent),
    /// The backend reported an error; the watch keeps running
    Error(String),
}

// ============================================================================
// FileWatcher
// ============================================================================

/// Watches a directory tree for changes using the OS-native mechanism
///
/// On Linux this uses inotify. Raw events are converted into
/// [`WatchMessage`] values and sent through an mpsc channel. Dropping the
/// watcher releases every registration and closes the channel.
///
/// ## Usage
///
/// ```ignore
/// let (mut watcher, rx) = FileWatcher::new()?;
/// watcher.watch_tree(Path::new("/srv/site"))?;
/// // rx.recv().await to get messages
/// ```
pub struct FileWatcher {
    /// The underlying notify watcher instance
    watcher: RecommendedWatcher,
    /// Every directory registered so far
    watched: HashSet<PathBuf>,
}

impl FileWatcher {
    /// Creates a new `FileWatcher` with nothing registered yet
    ///
    /// Returns the watcher and a receiver channel for consuming messages.
    ///
    /// # Errors
    /// Returns an error if the underlying OS watcher cannot be created
    pub fn new() -> Result<(Self, mpsc::UnboundedReceiver<WatchMessage>)> {
        let (tx, rx) = mpsc::unbounded_channel::<WatchMessage>();

        let watcher = RecommendedWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| {
                let message = match res {
                    Ok(event) => match map_notify_event(&event) {
                        Some(change) => WatchMessage::Change(change),
                        None => return,
                    },
                    Err(err) => WatchMessage::Error(err.to_string()),
                };
                if let Err(e) = tx.send(message) {
                    warn!(error = %e, "Failed to send watch message (receiver dropped)");
                }
            },
            notify::Config::default(),
        )
        .context("Failed to create file watcher")?;

        Ok((
            Self {
                watcher,
                watched: HashSet::new(),
            },
            rx,
        ))
    }

    /// Registers `root` and every directory below it
    ///
    /// Every directory is (re-)registered with the OS, even when it is
    /// already known: a directory deleted and recreated under the same name
    /// needs a fresh watch, and re-adding a live one is harmless.
    /// Symlinked directories are not followed.
    ///
    /// # Returns
    /// The number of directories that were not known before.
    ///
    /// # Errors
    /// Returns an error if `root` is not a directory or if the walk or a
    /// registration fails (e.g., the directory vanished, insufficient
    /// permissions, or the inotify watch limit was reached). Directories
    /// registered before the failure stay registered.
    pub fn watch_tree(&mut self, root: &Path) -> Result<usize> {
        if !root.is_dir() {
            bail!("Not a directory: {}", root.display());
        }

        let mut added = 0;
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
            if !entry.file_type().is_dir() {
                continue;
            }

            self.watcher
                .watch(entry.path(), RecursiveMode::NonRecursive)
                .with_context(|| format!("Failed to watch path: {}", entry.path().display()))?;
            trace!(path = %entry.path().display(), "Watching directory");

            if self.watched.insert(entry.into_path()) {
                added += 1;
            }
        }

        debug!(root = %root.display(), added, total = self.watched.len(), "Registered directory watches");
        Ok(added)
    }

    /// Number of directories registered so far
    pub fn watched_count(&self) -> usize {
        self.watched.len()
    }
}

// ============================================================================
// Event mapping - notify::Event → ChangeEvent
// ============================================================================

/// Converts a `notify::Event` into our internal `ChangeEvent`
///
/// Maps the notify event kinds as follows:
/// - `Create(*)` -> `ChangeEvent::Created`
/// - `Modify(Name(To))` -> `ChangeEvent::Created` (moved into a watched directory)
/// - `Modify(Name(From))` -> `ChangeEvent::Deleted` (moved out)
/// - `Modify(Name(Both))` with 2 paths -> `ChangeEvent::Renamed`
/// - `Remove(*)` -> `ChangeEvent::Deleted`
/// - Other `Modify(*)` -> `ChangeEvent::Modified`
///
/// Returns `None` for events that have no associated paths or that should
/// be ignored (e.g., access events).
fn map_notify_event(event: &notify::Event) -> Option<ChangeEvent> {
    let paths = &event.paths;

    match &event.kind {
        EventKind::Create(_) => Some(ChangeEvent::Created(paths.first()?.clone())),

        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            Some(ChangeEvent::Created(paths.first()?.clone()))
        }

        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            Some(ChangeEvent::Deleted(paths.first()?.clone()))
        }

        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            if paths.len() >= 2 {
                Some(ChangeEvent::Renamed {
                    old: paths[0].clone(),
                    new: paths[1].clone(),
                })
            } else {
                // Fallback: treat as a modification of the first path
                Some(ChangeEvent::Modified(paths.first()?.clone()))
            }
        }

        EventKind::Remove(_) => Some(ChangeEvent::Deleted(paths.first()?.clone())),

        EventKind::Modify(_) => Some(ChangeEvent::Modified(paths.first()?.clone())),

        // Ignore access events and other event types
        _ => None,
    }
}
