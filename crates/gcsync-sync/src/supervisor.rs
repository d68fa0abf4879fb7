//! Supervisor - runs every enabled rule and stops them together
//!
//! Startup is all-or-nothing: every enabled rule is constructed (root
//! resolved, patterns compiled, watch tree registered) before any of them is
//! spawned, so a broken rule aborts startup with nothing left running.
//!
//! Each running rule is a task on a shared [`TaskTracker`]; a single
//! [`CancellationToken`] broadcasts the stop signal to all of them.

use std::sync::Arc;
use std::time::Duration;

use gcsync_core::config::SyncRule;
use gcsync_core::ports::ITransferInvoker;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::scheduler::RuleScheduler;
use crate::SupervisorError;

/// Owns the running rule schedulers
#[derive(Debug)]
pub struct Supervisor {
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl Supervisor {
    /// Constructs and starts one scheduler per enabled rule
    ///
    /// Disabled rules are skipped silently. Must be called from within a
    /// Tokio runtime.
    ///
    /// # Errors
    /// Returns [`SupervisorError::Rule`] for the first rule that fails to
    /// construct; no scheduler is started in that case.
    pub fn start_all(
        rules: &[SyncRule],
        transfer: Arc<dyn ITransferInvoker>,
    ) -> Result<Self, SupervisorError> {
        let mut schedulers = Vec::new();
        for (index, rule) in rules.iter().enumerate() {
            if !rule.enabled {
                continue;
            }
            let scheduler = RuleScheduler::new(rule.clone(), Arc::clone(&transfer)).map_err(
                |source| SupervisorError::Rule {
                    index,
                    src: rule.src.clone(),
                    source,
                },
            )?;
            schedulers.push(scheduler);
        }

        let shutdown = CancellationToken::new();
        let tasks = TaskTracker::new();
        for scheduler in schedulers {
            let root = scheduler.root().to_path_buf();
            let token = shutdown.clone();
            tasks.spawn(async move {
                if let Err(e) = scheduler.run(token).await {
                    error!(src = %root.display(), error = %e, "Rule scheduler stopped with error");
                }
            });
        }
        tasks.close();

        info!(rules = tasks.len(), "All sync rules started");
        Ok(Self { shutdown, tasks })
    }

    /// Number of schedulers that have not returned yet
    pub fn running(&self) -> usize {
        self.tasks.len()
    }

    /// Signals every scheduler to stop and waits for them
    ///
    /// In-flight transfers are not interrupted; they count against
    /// `deadline`.
    ///
    /// # Errors
    /// Returns [`SupervisorError::ShutdownTimedOut`] if schedulers are still
    /// running when `deadline` elapses.
    pub async fn shutdown(self, deadline: Duration) -> Result<(), SupervisorError> {
        info!(running = self.tasks.len(), deadline = ?deadline, "Stopping all sync rules");
        self.shutdown.cancel();

        match tokio::time::timeout(deadline, self.tasks.wait()).await {
            Ok(()) => {
                info!("All sync rules stopped");
                Ok(())
            }
            Err(_) => {
                let remaining = self.tasks.len();
                warn!(remaining, "Shutdown deadline exceeded");
                Err(SupervisorError::ShutdownTimedOut {
                    deadline,
                    remaining,
                })
            }
        }
    }
}
