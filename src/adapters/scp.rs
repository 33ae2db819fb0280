//! File retrieval over `scp`.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use tokio::process::Command;

use crate::collaborators::RemoteTransfer;
use crate::error::{BenchError, Result};

/// Copies files off provisioned hosts with the system `scp` binary.
///
/// Host keys are not checked: every host is freshly provisioned and its key
/// is unknown ahead of time.
#[derive(Debug, Clone)]
pub struct ScpTransfer {
    program: OsString,
    user: String,
    ssh_options: Vec<String>,
}

impl Default for ScpTransfer {
    fn default() -> Self {
        Self {
            program: OsString::from("scp"),
            user: "root".to_string(),
            ssh_options: vec![
                "StrictHostKeyChecking=no".to_string(),
                "UserKnownHostsFile=/dev/null".to_string(),
                "BatchMode=yes".to_string(),
                "LogLevel=ERROR".to_string(),
            ],
        }
    }
}

impl ScpTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Replaces the copy program, e.g. with a wrapper script.
    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }

    fn args(&self, host: &str, remote_path: &str, local_path: &Path, recursive: bool) -> Vec<OsString> {
        let mut args = Vec::with_capacity(self.ssh_options.len() * 2 + 4);
        for option in &self.ssh_options {
            args.push(OsString::from("-o"));
            args.push(OsString::from(option));
        }
        args.push(OsString::from("-p"));
        if recursive {
            args.push(OsString::from("-r"));
        }
        args.push(OsString::from(format!("{}@{host}:{remote_path}", self.user)));
        args.push(local_path.as_os_str().to_os_string());
        args
    }

    async fn copy(&self, host: &str, remote_path: &str, local_path: &Path, recursive: bool) -> Result<()> {
        let transfer_error = |message: String| BenchError::Transfer {
            host: host.to_string(),
            remote_path: remote_path.to_string(),
            message,
        };

        if let Some(parent) = local_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BenchError::io(parent, e))?;
        }

        tracing::debug!(host, remote_path, local = %local_path.display(), recursive, "Copying from host");
        let output = Command::new(&self.program)
            .args(self.args(host, remote_path, local_path, recursive))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| transfer_error(format!("failed to run {:?}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(transfer_error(format!(
                "{} ({})",
                stderr.trim(),
                output.status
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteTransfer for ScpTransfer {
    async fn transfer_file(&self, host: &str, remote_path: &str, local_path: &Path) -> Result<()> {
        self.copy(host, remote_path, local_path, false).await
    }

    /// `local_path` must not exist yet; `scp -r` then creates it with the
    /// contents of `remote_path`.
    async fn transfer_directory(&self, host: &str, remote_path: &str, local_path: &Path) -> Result<()> {
        self.copy(host, remote_path, local_path, true).await
    }
}
