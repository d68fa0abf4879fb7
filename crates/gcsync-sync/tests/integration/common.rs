//! Shared helpers for the scheduling integration tests

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use gcsync_core::config::{SyncDirection, SyncRule, SyncRuleBuilder};
use gcsync_core::ports::{ITransferInvoker, SyncReason, TransferOutcome, TransferRequest};
use tokio::time::Instant;

/// Transfer invoker that records each call and can be slowed down
///
/// `in_flight` counts transfers currently inside `sync`; `max_in_flight`
/// keeps the highest value seen.
#[derive(Default)]
pub struct RecordingTransfer {
    pub calls: Mutex<Vec<(String, SyncReason)>>,
    pub delay: Duration,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub completed: AtomicUsize,
}

impl RecordingTransfer {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn count(&self, reason: SyncReason) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, r)| *r == reason)
            .count()
    }

    pub fn count_for(&self, destination: &str, reason: SyncReason) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(d, r)| d == destination && *r == reason)
            .count()
    }
}

#[async_trait::async_trait]
impl ITransferInvoker for RecordingTransfer {
    async fn sync(&self, request: &TransferRequest<'_>) -> anyhow::Result<TransferOutcome> {
        self.calls
            .lock()
            .unwrap()
            .push((request.destination.to_string(), request.reason));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);

        Ok(TransferOutcome::succeeded(self.delay))
    }
}

/// Enabled local-to-remote rule with a short debounce window
pub fn local_rule(src: &Path, dst: &str) -> SyncRule {
    SyncRuleBuilder::new(src.to_string_lossy(), dst)
        .direction(SyncDirection::LocalToRemote)
        .debounce_window(Duration::from_millis(200))
        .enabled(true)
        .build()
}

/// Polls `condition` every 20ms until it holds or `timeout` elapses
pub async fn wait_for(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
