use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Failure to run an external tool to completion.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} timed out after {} seconds", .timeout.as_secs())]
    Timeout { program: String, timeout: Duration },
    #[error("failed waiting for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// An external CLI (`az`, `kubectl`, `helm`, `terraform`) invoked with a
/// fixed timeout.
#[derive(Debug, Clone)]
pub struct Tool {
    program: PathBuf,
    timeout: Duration,
    current_dir: Option<PathBuf>,
}

impl Tool {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
            current_dir: None,
        }
    }

    #[must_use]
    pub fn in_dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    pub fn name(&self) -> String {
        self.program.display().to_string()
    }

    /// Runs the tool, capturing stdout and stderr.
    ///
    /// A non-zero exit is not an error here; callers decide what it means.
    ///
    /// # Errors
    /// Returns [`ToolError`] if the process cannot be spawned, waited on, or
    /// exceeds the timeout (in which case it is killed).
    pub async fn output<S: AsRef<str>>(&self, args: &[S]) -> Result<ToolOutput, ToolError> {
        let program = self.name();
        debug!(
            "Running {program} {}",
            args.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(" ")
        );
        let mut command = Command::new(&self.program);
        command
            .args(args.iter().map(AsRef::as_ref))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }

        let child = command.spawn().map_err(|source| ToolError::Spawn {
            program: program.clone(),
            source,
        })?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(ToolOutput {
                status: output.status,
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            }),
            Ok(Err(source)) => Err(ToolError::Wait { program, source }),
            // The future owning the child is dropped here, which kills it.
            Err(_) => Err(ToolError::Timeout {
                program,
                timeout: self.timeout,
            }),
        }
    }

    /// Runs the tool attached to the caller's terminal and returns its exit
    /// status. Used for interactive or long-running commands whose output the
    /// operator should see as it happens.
    ///
    /// # Errors
    /// Returns [`ToolError`] if the process cannot be spawned, waited on, or
    /// exceeds the timeout (in which case it is killed).
    pub async fn status<S: AsRef<str>>(&self, args: &[S]) -> Result<ExitStatus, ToolError> {
        let program = self.name();
        debug!(
            "Running {program} {}",
            args.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(" ")
        );
        let mut command = Command::new(&self.program);
        command
            .args(args.iter().map(AsRef::as_ref))
            .kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| ToolError::Spawn {
            program: program.clone(),
            source,
        })?;

        match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => Ok(status),
            Ok(Err(source)) => Err(ToolError::Wait { program, source }),
            Err(_) => {
                let _ = child.kill().await;
                Err(ToolError::Timeout {
                    program,
                    timeout: self.timeout,
                })
            }
        }
    }

    /// Runs the tool and requires a zero exit status, returning stdout.
    ///
    /// # Errors
    /// Returns an error carrying `context` and the tool's stderr when the tool
    /// fails to run or exits non-zero.
    pub async fn run<S: AsRef<str>>(&self, args: &[S], context: &str) -> anyhow::Result<String> {
        let output = self
            .output(args)
            .await
            .map_err(|err| anyhow::anyhow!("{context} failed: {err}"))?;
        if !output.success() {
            anyhow::bail!(
                "{context} failed with status {}: {}",
                output.status,
                output.stderr.trim()
            );
        }
        Ok(output.stdout)
    }
}
