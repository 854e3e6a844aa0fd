//! A document whose extraction runs in a worker process.
//!
//! The header line is read eagerly on spawn, so metadata is available as soon as
//! the document exists. The remaining stdout is a forward-only text stream that
//! can be consumed once. A watchdog task owns the child: it enforces the hard
//! deadline, reacts to cancellation (explicit `close` or drop) and escalates from
//! a termination request to a kill after the grace period.

use super::command::{ForkCommand, WorkerInput};
use super::protocol::read_header;
use crate::core::io::pump;
use crate::document::{Backing, Document, Metadata};
use crate::{ExtractdError, Result};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdout};
use tokio::sync::oneshot;

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

#[derive(Debug)]
pub struct ForkedDocument {
    origin: String,
    metadata: Metadata,
    stdout: Option<BufReader<ChildStdout>>,
    cancel: Option<oneshot::Sender<()>>,
    exit: Option<oneshot::Receiver<io::Result<ExitStatus>>>,
    temp_file: Option<PathBuf>,
}

impl ForkedDocument {
    /// Start a worker for `backing`. File backings are passed by path, in-memory
    /// payloads are piped to the worker's stdin.
    pub async fn spawn(command: &ForkCommand, backing: Backing, origin: &str) -> Result<Self> {
        let input = match backing.path() {
            Some(path) => WorkerInput::Path(path.to_path_buf()),
            None if backing.bytes().is_some() => WorkerInput::Stdin,
            None => return Err(ExtractdError::validation("document payload already released")),
        };
        let temp_file = backing.temp_file().map(Path::to_path_buf);

        let mut child = command.spawn(&input)?;
        tracing::debug!(origin, program = %command.program.display(), pid = ?child.id(), "spawned worker");

        if let Some(mut stdin) = child.stdin.take() {
            let origin = origin.to_string();
            tokio::spawn(async move {
                let bytes = backing.bytes().unwrap_or_default();
                let fed = match stdin.write_all(bytes).await {
                    Ok(()) => stdin.shutdown().await,
                    Err(e) => Err(e),
                };
                if let Err(e) = fed {
                    tracing::debug!(origin = %origin, error = %e, "worker stopped reading its input");
                }
                drop(backing);
            });
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExtractdError::subprocess("worker stdout was not captured"))?;

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        tokio::spawn(watch(
            child,
            cancel_rx,
            command.deadline,
            command.grace,
            origin.to_string(),
            exit_tx,
        ));

        let mut stdout = BufReader::new(stdout);
        let metadata = match read_header(&mut stdout).await {
            Ok(metadata) => metadata,
            Err(e) => {
                let _ = cancel_tx.send(());
                return Err(e);
            }
        };

        Ok(Self {
            origin: origin.to_string(),
            metadata,
            stdout: Some(stdout),
            cancel: Some(cancel_tx),
            exit: Some(exit_rx),
            temp_file,
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Wait for the watchdog to report how the child ended.
    async fn exit_status(&mut self) -> Result<()> {
        let Some(exit) = self.exit.take() else {
            return Ok(());
        };
        match exit.await {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => Err(ExtractdError::subprocess(format!("worker exited with {}", status))),
            Ok(Err(e)) => Err(ExtractdError::subprocess_with_source("failed to wait for worker", e)),
            Err(_) => Err(ExtractdError::subprocess("worker watchdog ended without a status")),
        }
    }
}

#[async_trait]
impl Document for ForkedDocument {
    fn mime_type(&self) -> &str {
        self.metadata
            .get("content-type")
            .map(String::as_str)
            .unwrap_or(DEFAULT_MIME_TYPE)
    }

    async fn stream_text(&mut self, out: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<()> {
        let mut stdout = self.stdout.take().ok_or(ExtractdError::StreamConsumed)?;
        let copied = pump(&mut stdout, out).await?;
        drop(stdout);
        self.exit_status().await?;
        tracing::debug!(origin = %self.origin, bytes = copied, "worker output consumed");
        Ok(())
    }

    fn raw_data(&self) -> Option<&[u8]> {
        None
    }

    /// The payload belongs to the worker; only its text stream is readable here.
    fn source_path(&self) -> Option<&Path> {
        None
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn temp_file(&self) -> Option<&Path> {
        self.temp_file.as_deref()
    }

    fn is_dehyphenated(&self) -> bool {
        true
    }

    fn close(&mut self) {
        self.stdout = None;
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}

impl Drop for ForkedDocument {
    fn drop(&mut self) {
        self.close();
    }
}

async fn watch(
    mut child: Child,
    cancel: oneshot::Receiver<()>,
    deadline: Duration,
    grace: Duration,
    origin: String,
    exit: oneshot::Sender<io::Result<ExitStatus>>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = cancel => {
            tracing::debug!(origin = %origin, "cancelling worker");
            terminate(&mut child, grace).await
        }
        _ = tokio::time::sleep(deadline) => {
            tracing::warn!(origin = %origin, deadline_secs = deadline.as_secs(), "worker exceeded its deadline");
            terminate(&mut child, grace).await
        }
    };
    let _ = exit.send(status);
}

/// Ask the child to stop, then kill it if it is still alive after `grace`.
async fn terminate(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    if let Ok(Some(status)) = child.try_wait() {
        return Ok(status);
    }
    if let Some(pid) = child.id() {
        signal::request_termination(pid);
    }
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            tracing::warn!(pid = ?child.id(), "worker ignored termination request; killing");
            child.kill().await?;
            child.wait().await
        }
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
mod signal {
    pub(super) fn request_termination(pid: u32) {
        let Ok(pid) = libc::pid_t::try_from(pid) else {
            return;
        };
        // SAFETY: kill(2) has no memory-safety preconditions; the pid belongs to a child we have not reaped.
        let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
        if rc != 0 {
            tracing::debug!(pid, error = %std::io::Error::last_os_error(), "SIGTERM failed");
        }
    }
}

#[cfg(not(unix))]
mod signal {
    pub(super) fn request_termination(_pid: u32) {}
}
