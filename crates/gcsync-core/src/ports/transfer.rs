//! Transfer port (driven/secondary port)
//!
//! This module defines the interface the scheduler uses to perform one
//! complete directional synchronization between a local tree and a remote
//! location. The production adapter shells out to `gsutil rsync`; any
//! equivalent primitive (SDK call, HTTP batch API) can implement it.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at port boundaries are adapter-specific.
//!   `Err` means the transfer could not be attempted at all (e.g. the tool is
//!   missing); a transfer that ran and failed is reported through
//!   [`TransferOutcome::success`].
//! - Uses `#[async_trait]` for async trait methods.
//! - Calls are potentially slow; callers await them inline and do not cancel
//!   them.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::ignore::IgnoreSet;

// ============================================================================
// SyncReason
// ============================================================================

/// What caused a sync invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncReason {
    /// Unconditional sync performed once when a rule starts
    Initial,
    /// The debounce window elapsed after local changes
    Debounce,
    /// The remote poll timer fired
    PeriodicPull,
}

impl SyncReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncReason::Initial => "initial",
            SyncReason::Debounce => "debounce",
            SyncReason::PeriodicPull => "periodic pull",
        }
    }
}

impl fmt::Display for SyncReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// TransferRequest / TransferOutcome
// ============================================================================

/// Arguments for a single transfer
#[derive(Debug, Clone, Copy)]
pub struct TransferRequest<'a> {
    /// Expanded, absolute source directory
    pub source: &'a Path,
    /// Destination URI, passed through verbatim
    pub destination: &'a str,
    /// Remove destination entries that no longer exist at the source
    pub delete_at_destination: bool,
    /// Paths to leave untouched on both sides
    pub ignore: &'a IgnoreSet,
    /// Trigger, for logging only
    pub reason: SyncReason,
}

/// Result of a transfer that was actually attempted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    /// True when the tool reported success
    pub success: bool,
    /// Wall-clock time spent in the tool
    pub elapsed: Duration,
    /// Process exit code, when the adapter runs a process and one is available
    pub exit_code: Option<i32>,
}

impl TransferOutcome {
    pub fn succeeded(elapsed: Duration) -> Self {
        Self {
            success: true,
            elapsed,
            exit_code: Some(0),
        }
    }

    pub fn failed(elapsed: Duration, exit_code: Option<i32>) -> Self {
        Self {
            success: false,
            elapsed,
            exit_code,
        }
    }
}

// ============================================================================
// ITransferInvoker trait
// ============================================================================

/// Port for performing one complete synchronization pass
///
/// Implementations must:
/// - synchronize directories recursively,
/// - exclude every path matched by `request.ignore`,
/// - delete destination entries absent from the source when
///   `request.delete_at_destination` is set.
///
/// Implementations are shared between all rule schedulers and must be
/// safe to call concurrently.
#[async_trait::async_trait]
pub trait ITransferInvoker: Send + Sync {
    /// Synchronizes `request.source` into `request.destination`
    ///
    /// # Errors
    /// Returns an error only if the transfer could not be started.
    async fn sync(&self, request: &TransferRequest<'_>) -> anyhow::Result<TransferOutcome>;
}
