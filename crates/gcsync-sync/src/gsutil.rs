//! `gsutil rsync` transfer adapter
//!
//! Implements [`ITransferInvoker`] by running `gsutil -m rsync -r` as a child
//! process. The ignore set is passed as one `-x` exclusion per compiled
//! expression, so the tool skips exactly what the scheduler ignores.
//!
//! Tool output is forwarded to the log line by line while the tool runs; a
//! non-zero exit status is a failed [`TransferOutcome`], while a tool that
//! cannot be spawned is an `Err`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use anyhow::Context;
use async_trait::async_trait;
use gcsync_core::ports::{ITransferInvoker, TransferOutcome, TransferRequest};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{info, warn};

/// Default program looked up on `PATH`
pub const DEFAULT_PROGRAM: &str = "gsutil";

/// Transfer invoker backed by the `gsutil` command line tool
#[derive(Debug, Clone)]
pub struct GsutilInvoker {
    program: PathBuf,
    /// Arguments placed before the generated ones (wrapper scripts, `sh -c`)
    leading_args: Vec<OsString>,
}

impl Default for GsutilInvoker {
    fn default() -> Self {
        Self::new()
    }
}

impl GsutilInvoker {
    pub fn new() -> Self {
        Self::with_program(DEFAULT_PROGRAM)
    }

    /// Uses a specific `gsutil` executable
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self::with_command(program, Vec::<OsString>::new())
    }

    /// Runs `program leading_args... <generated args>`
    pub fn with_command<I, S>(program: impl Into<PathBuf>, leading_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            leading_args: leading_args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Builds the argument list for one transfer
    ///
    /// `-e` skips broken symlinks and symlinks leading out of the tree.
    pub fn build_args(request: &TransferRequest<'_>) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "-m",
            "-o",
            "GSUtil:parallel_process_count=1",
            "-o",
            "GSUtil:sliced_object_download_threshold=0",
            "rsync",
            "-r",
            "-e",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();

        if request.delete_at_destination {
            args.push("-d".into());
        }
        for expr in request.ignore.expressions() {
            args.push("-x".into());
            args.push(expr.into());
        }
        args.push(request.source.as_os_str().to_owned());
        args.push(request.destination.into());
        args
    }
}

/// Logs one output stream of the tool as lines arrive
///
/// Returns the number of non-empty lines forwarded. Invalid UTF-8 is
/// replaced rather than ending the stream.
async fn forward_lines<R>(stream: &'static str, reader: Option<R>) -> usize
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return 0;
    };

    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut forwarded = 0;
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end();
                if !line.is_empty() {
                    info!(stream, "{line}");
                    forwarded += 1;
                }
            }
            Err(e) => {
                warn!(stream, error = %e, "Failed to read tool output");
                break;
            }
        }
    }
    forwarded
}

#[async_trait]
impl ITransferInvoker for GsutilInvoker {
    async fn sync(&self, request: &TransferRequest<'_>) -> anyhow::Result<TransferOutcome> {
        let args = Self::build_args(request);
        info!(
            program = %self.program.display(),
            args = %args.iter().map(|a| a.to_string_lossy()).collect::<Vec<_>>().join(" "),
            "Running transfer"
        );

        let started = Instant::now();
        let mut child = Command::new(&self.program)
            .args(&self.leading_args)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to run {}", self.program.display()))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (status, _, _) = tokio::join!(
            child.wait(),
            forward_lines("stdout", stdout),
            forward_lines("stderr", stderr),
        );
        let status =
            status.with_context(|| format!("Failed to wait for {}", self.program.display()))?;
        let elapsed = started.elapsed();

        if status.success() {
            Ok(TransferOutcome::succeeded(elapsed))
        } else {
            Ok(TransferOutcome::failed(elapsed, status.code()))
        }
    }
}
