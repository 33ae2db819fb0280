//! Workload execution through local wrapper scripts.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::collaborators::{ExecutionOutput, RemoteExecutor};
use crate::error::{BenchError, Result};

/// Environment variable carrying the target host's address to the script.
pub const HOST_ENV: &str = "BENCH_TARGET_HOST";

/// Runs `<script> <topology>` and waits for it, up to a timeout.
///
/// The scripts drive Ansible against the materialized topology, which is how
/// the workload reaches the provisioned host.
#[derive(Debug, Clone)]
pub struct ScriptExecutor {
    timeout: Duration,
}

impl ScriptExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl RemoteExecutor for ScriptExecutor {
    async fn run_remote(&self, host: &str, script: &Path, topology: &Path) -> Result<ExecutionOutput> {
        let execution_error = |exit_code: Option<i32>, message: String| BenchError::RemoteExecution {
            script: script.display().to_string(),
            exit_code,
            message,
        };

        let child = Command::new(script)
            .arg(topology)
            .env(HOST_ENV, host)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| execution_error(None, format!("failed to start: {e}")))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| execution_error(None, e.to_string()))?,
            Err(_) => {
                return Err(execution_error(
                    None,
                    format!("timed out after {}s", self.timeout.as_secs_f64()),
                ))
            },
        };

        let exit_code = output.status.code();
        tracing::debug!(
            script = %script.display(),
            host,
            ?exit_code,
            stdout_bytes = output.stdout.len(),
            "Workload script exited"
        );

        Ok(ExecutionOutput {
            success: output.status.success(),
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
