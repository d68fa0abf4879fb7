//! gcs-sync Sync - rule scheduling engine
//!
//! Provides:
//! - Directory-level filesystem watching with dynamic expansion
//! - Debounced, coalesced sync triggers per rule
//! - Periodic remote polling for remote-originated directions
//! - Concurrent supervision of all rules with bounded shutdown
//!
//! ## Modules
//!
//! - [`watcher`] - `notify`-backed watcher over a rule's directory tree
//! - [`scheduler`] - Per-rule state machine driving the transfer invoker
//! - [`supervisor`] - Starts every enabled rule and stops them together
//! - [`gsutil`] - Transfer invoker adapter running `gsutil rsync`

pub mod gsutil;
pub mod scheduler;
pub mod supervisor;
pub mod watcher;

use std::path::PathBuf;
use std::time::Duration;

use gcsync_core::ignore::PatternError;
use thiserror::Error;

pub use scheduler::RuleScheduler;
pub use supervisor::Supervisor;

/// Errors that prevent a rule scheduler from starting or keep it from running
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// An enabled rule without directions can never be scheduled
    #[error("Rule for {src} has no sync directions")]
    NoDirections { src: String },

    /// A debounce or poll window the timers cannot run with
    #[error("Rule for {src} has an invalid {field}: {reason}")]
    InvalidWindow {
        src: String,
        field: &'static str,
        reason: &'static str,
    },

    /// The source path could not be made absolute
    #[error("Failed to resolve source path {src}: {source}")]
    ResolveRoot {
        src: String,
        #[source]
        source: std::io::Error,
    },

    /// An ignore pattern did not compile
    #[error(transparent)]
    Pattern(#[from] PatternError),

    /// The watcher could not be created or the initial tree not registered
    #[error("Failed to watch {}: {source:#}", .root.display())]
    Watch {
        root: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// The watcher's event channel closed while the rule was running
    #[error("Watch event channel closed")]
    WatchClosed,
}

/// Errors reported by the [`Supervisor`]
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A rule failed to construct; nothing was started
    #[error("Failed to start rule #{index} ({src}): {source}")]
    Rule {
        index: usize,
        src: String,
        #[source]
        source: SchedulerError,
    },

    /// Not every scheduler stopped before the deadline
    #[error("Shutdown timed out after {deadline:?} with {remaining} rule(s) still running")]
    ShutdownTimedOut { deadline: Duration, remaining: usize },
}
