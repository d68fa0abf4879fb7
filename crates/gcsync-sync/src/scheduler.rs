//! Rule scheduler - turns filesystem activity and timers into sync invocations
//!
//! A [`RuleScheduler`] owns everything belonging to one sync rule: the
//! expanded source root, the compiled ignore set, the [`FileWatcher`] and its
//! event channel, the debounce timer and the optional remote poll timer.
//!
//! ## Flow
//!
//! ```text
//! FileWatcher ──→ mpsc (unbounded) ──→ RuleScheduler ──→ ITransferInvoker
//!                                     │       │
//!                                 Debounce  poll Interval
//! ```
//!
//! ## States
//!
//! Construction (`Initializing`) registers the whole tree; `run` performs the
//! initial sync and then stays in `Watching` until the stop token fires. The
//! debounce timer (armed / idle) and the poll timer (present / absent) are
//! independent sub-states of `Watching`; both trigger the very same sync.
//!
//! All timer state lives inside the single `select!` loop of the rule, so
//! nothing is shared with other tasks. Transfers are awaited inline: while
//! one runs, new events queue in the watcher channel and syncs of the same
//! rule never overlap.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use gcsync_core::config::SyncRule;
use gcsync_core::ignore::IgnoreSet;
use gcsync_core::paths::{relative_slash, resolve_root};
use gcsync_core::ports::{ITransferInvoker, SyncReason, TransferRequest};
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::watcher::{ChangeEvent, FileWatcher, WatchMessage};
use crate::SchedulerError;

// ============================================================================
// Debounce
// ============================================================================

/// Single per-rule debounce timer
///
/// Idle until the first relevant event arms it; every further event pushes
/// the deadline out by a full window. At most one deadline exists at a time,
/// so a burst of events produces exactly one expiry.
#[derive(Debug)]
struct Debounce {
    window: Duration,
    deadline: Option<Instant>,
}

impl Debounce {
    fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    /// Arms or extends the timer; returns true if it was idle before
    fn arm(&mut self) -> bool {
        let was_idle = self.deadline.is_none();
        self.deadline = Some(Instant::now() + self.window);
        was_idle
    }

    fn disarm(&mut self) {
        self.deadline = None;
    }

    fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

/// Waits for the next poll tick, or forever when the rule does not poll
async fn next_poll(poll: &mut Option<Interval>) {
    match poll {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

// ============================================================================
// RuleScheduler
// ============================================================================

/// Drives one sync rule from construction until its stop token fires
pub struct RuleScheduler {
    rule: SyncRule,
    /// Absolute source directory
    root: PathBuf,
    ignore: IgnoreSet,
    transfer: Arc<dyn ITransferInvoker>,
    watcher: FileWatcher,
    events: mpsc::UnboundedReceiver<WatchMessage>,
    /// Carries `src`/`dst` on every log line of this rule
    span: Span,
}

impl RuleScheduler {
    /// Prepares a scheduler for `rule`
    ///
    /// Expands the source path, compiles the ignore patterns and registers a
    /// watch on every existing directory below the root. Nothing is synced
    /// until [`run`](Self::run) is called.
    ///
    /// # Errors
    /// Fails if the rule has no directions, if a timing window is zero or
    /// too long, if the source path cannot be resolved, if an ignore pattern
    /// is invalid, or if the initial watch tree cannot be registered.
    pub fn new(
        rule: SyncRule,
        transfer: Arc<dyn ITransferInvoker>,
    ) -> Result<Self, SchedulerError> {
        if rule.directions.is_empty() {
            return Err(SchedulerError::NoDirections { src: rule.src });
        }
        let window_problem = rule.invalid_window();
        if let Some((field, reason)) = window_problem {
            return Err(SchedulerError::InvalidWindow {
                src: rule.src,
                field,
                reason,
            });
        }

        let root = resolve_root(&rule.src).map_err(|source| SchedulerError::ResolveRoot {
            src: rule.src.clone(),
            source,
        })?;
        let span = info_span!("rule", src = %root.display(), dst = %rule.dst);

        let ignore = IgnoreSet::compile(&rule.ignore)?;

        let (mut watcher, events) = FileWatcher::new().map_err(|source| SchedulerError::Watch {
            root: root.clone(),
            source,
        })?;
        let registered = watcher
            .watch_tree(&root)
            .map_err(|source| SchedulerError::Watch {
                root: root.clone(),
                source,
            })?;

        span.in_scope(|| {
            info!(
                directories = registered,
                ignore = ?ignore.globs().collect::<Vec<_>>(),
                "Watching source tree"
            );
        });

        Ok(Self {
            rule,
            root,
            ignore,
            transfer,
            watcher,
            events,
            span,
        })
    }

    /// Absolute source directory of the rule
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// True when a remote poll timer will run alongside the watcher
    pub fn polls_remote(&self) -> bool {
        self.rule.polls_remote()
    }

    /// Number of directories currently registered with the watcher
    pub fn watched_directories(&self) -> usize {
        self.watcher.watched_count()
    }

    // ========================================================================
    // Main loop
    // ========================================================================

    /// Runs the rule until `shutdown` is cancelled
    ///
    /// 1. Performs an unconditional `initial` sync.
    /// 2. Starts the poll timer if any direction is remote-originated.
    /// 3. Reacts to whichever comes first: the stop signal, the debounce
    ///    deadline, a poll tick, or a watch message. Timers are checked
    ///    before the event queue, so a steady stream of events cannot hold
    ///    back a due sync.
    ///
    /// The stop signal is observed between syncs; an in-flight transfer is
    /// always allowed to finish. The watch is released when this returns.
    ///
    /// # Errors
    /// Returns [`SchedulerError::WatchClosed`] if the watcher's channel
    /// closes underneath the loop.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), SchedulerError> {
        let span = self.span.clone();
        self.run_loop(shutdown).instrument(span).await
    }

    async fn run_loop(mut self, shutdown: CancellationToken) -> Result<(), SchedulerError> {
        self.sync_once(SyncReason::Initial).await;

        let mut debounce = Debounce::new(self.rule.debounce_window);
        let mut poll = self.poll_interval();

        loop {
            let debounce_deadline = debounce.deadline();

            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Stopping watcher");
                    break;
                }

                _ = tokio::time::sleep_until(debounce_deadline.unwrap_or_else(Instant::now)),
                    if debounce_deadline.is_some() =>
                {
                    debounce.disarm();
                    self.sync_once(SyncReason::Debounce).await;
                }

                _ = next_poll(&mut poll) => {
                    self.sync_once(SyncReason::PeriodicPull).await;
                }

                message = self.events.recv() => match message {
                    Some(WatchMessage::Change(event)) => self.handle_event(event, &mut debounce),
                    Some(WatchMessage::Error(err)) => warn!(error = %err, "Watcher error"),
                    None => {
                        error!("Watch event channel closed");
                        return Err(SchedulerError::WatchClosed);
                    }
                },
            }
        }

        // Dropping the watcher releases every registration.
        drop(self.watcher);
        info!("Watcher stopped");
        Ok(())
    }

    /// Builds the poll timer for remote-originated directions
    ///
    /// The first tick fires one full window after start; the initial sync
    /// already covers time zero.
    fn poll_interval(&self) -> Option<Interval> {
        if !self.rule.polls_remote() {
            return None;
        }

        let window = self.rule.remote_poll_window;
        info!(poll_window = ?window, "Remote polling enabled");

        let mut interval = tokio::time::interval_at(Instant::now() + window, window);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Some(interval)
    }

    /// Filters one change event and arms the debounce timer for it
    ///
    /// Ignored paths neither reset the timer nor touch the watch. A new
    /// directory is registered (with its whole subtree) before arming, so
    /// files created inside it right away are observed; failures to do so
    /// are logged and otherwise ignored.
    fn handle_event(&mut self, event: ChangeEvent, debounce: &mut Debounce) {
        let path = event.path();
        let Some(rel) = relative_slash(&self.root, path) else {
            debug!(kind = event.kind(), path = %path.display(), "Event outside source root");
            return;
        };

        if self.ignore.is_match(&rel) {
            debug!(kind = event.kind(), path = %rel, "Ignored event");
            return;
        }
        debug!(kind = event.kind(), path = %rel, "Event");

        if event.may_add_directory() && path.is_dir() {
            match self.watcher.watch_tree(path) {
                Ok(added) => debug!(path = %rel, added, "Watching new directory"),
                Err(e) => warn!(path = %rel, error = %format!("{e:#}"), "Failed to watch new directory"),
            }
        }

        if debounce.arm() {
            debug!(window = ?debounce.window, trigger = %rel, "Debounce timer started");
        }
    }

    /// Performs one whole-rule sync and logs its outcome
    ///
    /// Failures never leave this function; the next trigger simply tries
    /// again.
    async fn sync_once(&self, reason: SyncReason) {
        let request = TransferRequest {
            source: &self.root,
            destination: &self.rule.dst,
            delete_at_destination: true,
            ignore: &self.ignore,
            reason,
        };

        info!(reason = %reason, "Starting sync");
        match self.transfer.sync(&request).await {
            Ok(outcome) if outcome.success => {
                info!(
                    reason = %reason,
                    elapsed_ms = outcome.elapsed.as_millis() as u64,
                    "Sync finished"
                );
            }
            Ok(outcome) => {
                error!(
                    reason = %reason,
                    exit_code = ?outcome.exit_code,
                    elapsed_ms = outcome.elapsed.as_millis() as u64,
                    "Sync failed"
                );
            }
            Err(e) => {
                error!(reason = %reason, error = %format!("{e:#}"), "Sync could not be started");
            }
        }
    }
}

// ============================================================================
// Unit tests
// ============================================================================
