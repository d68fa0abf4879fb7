//! End to end: YAML config → supervisor → `gsutil` command line
//!
//! A small shell script stands in for `gsutil` and appends its arguments to
//! a log file, one invocation per line.

#![cfg(unix)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use gcsync_core::config::Config;
use gcsync_sync::gsutil::GsutilInvoker;
use gcsync_sync::Supervisor;

use crate::common;

fn invocations(log: &Path) -> Vec<String> {
    std::fs::read_to_string(log)
        .map(|s| s.lines().map(str::to_owned).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_config_drives_gsutil_invocations() {
    let src = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let log = scratch.path().join("calls.log");

    let yaml = format!(
        r#"
sync:
  - src: {src}
    dst: gs://bucket/backup
    directions: [local_to_remote]
    ignore: ["**/*.tmp", ".cache/**"]
    enabled: true
    debounce_window: 200ms
  - src: /nowhere/at/all
    dst: gs://bucket/disabled
    directions: [full]
"#,
        src = src.path().display()
    );
    let config = Config::parse(&yaml).unwrap();
    assert!(config.validate().is_empty());

    let script = format!("printf '%s\\n' \"$*\" >> '{}'", log.display());
    let invoker = GsutilInvoker::with_command("sh", ["-c", script.as_str(), "gsutil"]);
    let supervisor = Supervisor::start_all(&config.sync, Arc::new(invoker)).unwrap();
    assert_eq!(supervisor.running(), 1);

    assert!(common::wait_for(|| invocations(&log).len() == 1, Duration::from_secs(3)).await);
    let initial = &invocations(&log)[0];
    assert!(initial.starts_with("-m -o GSUtil:parallel_process_count=1"));
    assert!(initial.contains(" rsync -r -e -d "));
    assert_eq!(initial.matches(" -x ").count(), 2);
    assert!(initial.ends_with("gs://bucket/backup"));

    std::fs::write(src.path().join("ignored.tmp"), b"x").unwrap();
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(invocations(&log).len(), 1);

    std::fs::write(src.path().join("report.txt"), b"x").unwrap();
    assert!(common::wait_for(|| invocations(&log).len() == 2, Duration::from_secs(3)).await);

    supervisor.shutdown(Duration::from_secs(2)).await.unwrap();
}
