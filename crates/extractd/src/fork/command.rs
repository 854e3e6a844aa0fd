use crate::core::config::ServiceConfig;
use crate::{ExtractdError, Result};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};

/// Argument telling the worker to read its input from stdin.
pub const STDIN_ARG: &str = "-";

/// Option naming the configuration file for the worker.
pub const CONFIG_ARG: &str = "--config";

/// How to launch a worker process.
#[derive(Debug, Clone)]
pub struct ForkCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Hard limit on the child's lifetime.
    pub deadline: Duration,
    /// Time between the termination request and a forced kill.
    pub grace: Duration,
}

/// Where the child reads its document from.
#[derive(Debug, Clone)]
pub enum WorkerInput {
    Stdin,
    Path(PathBuf),
}

impl ForkCommand {
    /// Resolve the worker program, defaulting to the running executable.
    ///
    /// When the configuration came from a file, the worker is pointed at the
    /// same file with `--config` so both sides parse with the same settings.
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        let worker = &config.worker;
        let program = match &worker.program {
            Some(program) => program.clone(),
            None => std::env::current_exe().map_err(|e| ExtractdError::SelfForkUnavailable(e.to_string()))?,
        };

        let mut args = worker.args.clone();
        if let Some(source) = &config.source {
            match source.to_str() {
                Some(path) => args.extend([CONFIG_ARG.to_string(), path.to_string()]),
                None => tracing::warn!(
                    "Config path {} is not valid UTF-8, workers fall back to discovery",
                    source.display()
                ),
            }
        }

        Ok(Self {
            program,
            args,
            deadline: Duration::from_secs(worker.deadline_secs),
            grace: Duration::from_secs(worker.grace_secs),
        })
    }

    /// Spawn the child with stdout piped and, in stdin mode, stdin piped.
    pub(crate) fn spawn(&self, input: &WorkerInput) -> Result<Child> {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        match input {
            WorkerInput::Stdin => {
                command.arg(STDIN_ARG).stdin(Stdio::piped());
            }
            WorkerInput::Path(path) => {
                command.arg(path).stdin(Stdio::null());
            }
        }
        command.stdout(Stdio::piped()).stderr(Stdio::inherit()).kill_on_drop(true);

        command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ExtractdError::SelfForkUnavailable(format!("{}: {}", self.program.display(), e))
            } else {
                ExtractdError::subprocess_with_source(format!("Failed to start {}", self.program.display()), e)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::WorkerConfig;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_from_config_defaults_to_current_exe() {
        let command = ForkCommand::from_config(&ServiceConfig::default()).unwrap();
        assert_eq!(command.program, std::env::current_exe().unwrap());
        assert_eq!(command.args, vec!["worker".to_string()]);
        assert_eq!(command.deadline, Duration::from_secs(3600));
        assert_eq!(command.grace, Duration::from_secs(60));
    }

    #[test]
    fn test_from_config_explicit_program() {
        let config = ServiceConfig {
            worker: WorkerConfig {
                program: Some(PathBuf::from("/bin/sh")),
                args: vec!["-c".to_string(), "true".to_string()],
                deadline_secs: 5,
                grace_secs: 1,
            },
            ..Default::default()
        };
        let command = ForkCommand::from_config(&config).unwrap();
        assert_eq!(command.program, PathBuf::from("/bin/sh"));
        assert_eq!(command.deadline, Duration::from_secs(5));
    }

    #[test]
    fn test_from_config_forwards_config_file() {
        let config = ServiceConfig {
            source: Some(PathBuf::from("/etc/extractd/extractd.toml")),
            ..Default::default()
        };
        let command = ForkCommand::from_config(&config).unwrap();
        assert_eq!(command.args, vec!["worker", "--config", "/etc/extractd/extractd.toml"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawned_argv_carries_config_before_input() {
        let config = ServiceConfig {
            worker: WorkerConfig {
                program: Some(PathBuf::from("/bin/sh")),
                args: vec!["-c".to_string(), "printf '%s\\n' \"$@\"".to_string(), "sh".to_string()],
                deadline_secs: 5,
                grace_secs: 1,
            },
            source: Some(PathBuf::from("/srv/extractd.yaml")),
            ..Default::default()
        };
        let command = ForkCommand::from_config(&config).unwrap();

        let mut child = command.spawn(&WorkerInput::Path(PathBuf::from("/tmp/input.pdf"))).unwrap();
        let mut argv = String::new();
        child.stdout.take().unwrap().read_to_string(&mut argv).await.unwrap();
        assert!(child.wait().await.unwrap().success());

        let argv: Vec<&str> = argv.lines().collect();
        assert_eq!(argv, vec!["--config", "/srv/extractd.yaml", "/tmp/input.pdf"]);
    }

    #[tokio::test]
    async fn test_missing_program_is_self_fork_unavailable() {
        let command = ForkCommand {
            program: PathBuf::from("/nonexistent/extractd-worker"),
            args: Vec::new(),
            deadline: Duration::from_secs(1),
            grace: Duration::from_secs(1),
        };
        assert!(matches!(
            command.spawn(&WorkerInput::Stdin),
            Err(ExtractdError::SelfForkUnavailable(_))
        ));
    }
}
