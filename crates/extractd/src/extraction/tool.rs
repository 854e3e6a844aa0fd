//! Running external command-line extractors.

use crate::{ExtractdError, Result};
use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Run `program` with `args` and return its stdout.
///
/// A program that cannot be found is a `MissingDependency`. A timeout kills the
/// child. A nonzero exit is a parsing error quoting stderr.
pub async fn run_tool<I, S>(program: &Path, args: I, limit: Duration) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ExtractdError::MissingDependency(format!("'{}' is not installed or not in PATH", program.display()))
            } else {
                ExtractdError::parsing(format!("Failed to execute '{}': {}", program.display(), e))
            }
        })?;

    let child_id = child.id();
    let output = match timeout(limit, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(ExtractdError::parsing(format!(
                "Failed to wait for '{}': {}",
                program.display(),
                e
            )));
        }
        Err(_) => {
            return Err(ExtractdError::parsing(format!(
                "'{}' timed out after {} seconds (PID: {:?})",
                program.display(),
                limit.as_secs(),
                child_id
            )));
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ExtractdError::parsing(format!(
            "'{}' failed with return code {}: {}",
            program.display(),
            output.status.code().unwrap_or(-1),
            stderr.trim()
        )));
    }

    Ok(output.stdout)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_tool_captures_stdout() {
        let out = run_tool(Path::new("/bin/sh"), ["-c", "printf hello"], Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn test_missing_tool() {
        let result = run_tool(Path::new("extractd-no-such-tool"), ["x"], Duration::from_secs(5)).await;
        assert!(matches!(result, Err(ExtractdError::MissingDependency(_))));
    }

    #[tokio::test]
    async fn test_nonzero_exit_quotes_stderr() {
        let result = run_tool(Path::new("/bin/sh"), ["-c", "echo broken >&2; exit 2"], Duration::from_secs(5)).await;
        let message = result.unwrap_err().to_string();
        assert!(message.contains("broken"));
        assert!(message.contains("2"));
    }

    #[tokio::test]
    async fn test_timeout() {
        let result = run_tool(Path::new("/bin/sh"), ["-c", "sleep 5"], Duration::from_millis(100)).await;
        assert!(result.unwrap_err().to_string().contains("timed out"));
    }
}
