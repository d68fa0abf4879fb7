//! Supervisor lifecycle: startup, isolation between rules, bounded shutdown

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use gcsync_core::config::SyncRuleBuilder;
use gcsync_core::ports::SyncReason;
use gcsync_sync::{Supervisor, SupervisorError};

use crate::common::{self, RecordingTransfer};

#[tokio::test]
async fn test_starts_only_enabled_rules() {
    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();
    let c = tempfile::tempdir().unwrap();
    let mut disabled = common::local_rule(c.path(), "gs://bucket/c");
    disabled.enabled = false;
    let rules = vec![
        common::local_rule(a.path(), "gs://bucket/a"),
        disabled,
        common::local_rule(b.path(), "gs://bucket/b"),
    ];
    let transfer = Arc::new(RecordingTransfer::default());

    let supervisor = Supervisor::start_all(&rules, transfer.clone()).unwrap();
    assert_eq!(supervisor.running(), 2);

    assert!(
        common::wait_for(
            || transfer.count(SyncReason::Initial) == 2,
            Duration::from_secs(2)
        )
        .await
    );
    assert_eq!(transfer.count_for("gs://bucket/c", SyncReason::Initial), 0);

    supervisor.shutdown(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn test_bad_rule_aborts_startup() {
    let a = tempfile::tempdir().unwrap();
    let missing = a.path().join("does-not-exist");
    let rules = vec![
        common::local_rule(a.path(), "gs://bucket/a"),
        common::local_rule(&missing, "gs://bucket/missing"),
    ];
    let transfer = Arc::new(RecordingTransfer::default());

    let err = Supervisor::start_all(&rules, transfer.clone()).unwrap_err();
    assert!(matches!(err, SupervisorError::Rule { index: 1, .. }));

    // Nothing was spawned, so the first rule never synced either.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(transfer.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_rules_debounce_independently() {
    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();
    let rules = vec![
        common::local_rule(a.path(), "gs://bucket/a"),
        common::local_rule(b.path(), "gs://bucket/b"),
    ];
    let transfer = Arc::new(RecordingTransfer::default());
    let supervisor = Supervisor::start_all(&rules, transfer.clone()).unwrap();
    assert!(
        common::wait_for(
            || transfer.count(SyncReason::Initial) == 2,
            Duration::from_secs(2)
        )
        .await
    );

    std::fs::write(a.path().join("only-a.txt"), b"a").unwrap();
    assert!(
        common::wait_for(
            || transfer.count_for("gs://bucket/a", SyncReason::Debounce) == 1,
            Duration::from_secs(3)
        )
        .await
    );
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(transfer.count_for("gs://bucket/b", SyncReason::Debounce), 0);

    supervisor.shutdown(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn test_shutdown_waits_for_in_flight_transfer() {
    let a = tempfile::tempdir().unwrap();
    let rules = vec![common::local_rule(a.path(), "gs://bucket/a")];
    let transfer = Arc::new(RecordingTransfer::slow(Duration::from_millis(400)));
    let supervisor = Supervisor::start_all(&rules, transfer.clone()).unwrap();

    // The initial sync is now in flight.
    assert!(
        common::wait_for(
            || transfer.in_flight.load(Ordering::SeqCst) == 1,
            Duration::from_secs(2)
        )
        .await
    );

    supervisor.shutdown(Duration::from_secs(3)).await.unwrap();
    assert_eq!(transfer.completed.load(Ordering::SeqCst), 1);
    assert_eq!(transfer.in_flight.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_shutdown_times_out_on_long_transfer() {
    let a = tempfile::tempdir().unwrap();
    let rules = vec![common::local_rule(a.path(), "gs://bucket/a")];
    let transfer = Arc::new(RecordingTransfer::slow(Duration::from_secs(2)));
    let supervisor = Supervisor::start_all(&rules, transfer.clone()).unwrap();
    assert!(
        common::wait_for(
            || transfer.in_flight.load(Ordering::SeqCst) == 1,
            Duration::from_secs(2)
        )
        .await
    );

    let err = supervisor
        .shutdown(Duration::from_millis(200))
        .await
        .unwrap_err();
    match err {
        SupervisorError::ShutdownTimedOut { deadline, remaining } => {
            assert_eq!(deadline, Duration::from_millis(200));
            assert_eq!(remaining, 1);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_syncs_of_one_rule_never_overlap() {
    let a = tempfile::tempdir().unwrap();
    let rule = SyncRuleBuilder::new(a.path().to_string_lossy(), "gs://bucket/a")
        .direction(gcsync_core::config::SyncDirection::Full)
        .debounce_window(Duration::from_millis(50))
        .remote_poll_window(Duration::from_millis(50))
        .enabled(true)
        .build();
    let transfer = Arc::new(RecordingTransfer::slow(Duration::from_millis(150)));
    let supervisor = Supervisor::start_all(&[rule], transfer.clone()).unwrap();

    for i in 0..5 {
        std::fs::write(a.path().join(format!("f{i}")), b"x").unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
    }
    tokio::time::sleep(Duration::from_millis(400)).await;

    supervisor.shutdown(Duration::from_secs(2)).await.unwrap();
    assert!(transfer.completed.load(Ordering::SeqCst) >= 2);
    assert_eq!(transfer.max_in_flight.load(Ordering::SeqCst), 1);
}
