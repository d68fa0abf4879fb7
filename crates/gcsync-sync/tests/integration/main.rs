//! Integration tests for gcsync-sync
//!
//! Runs real rule schedulers over temporary directories, with a recording
//! transfer invoker or a shell stand-in for `gsutil`.

mod common;

mod test_gsutil_pipeline;
mod test_supervisor;
