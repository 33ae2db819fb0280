//! Interfaces of the external systems a benchmark run depends on.
//!
//! The orchestrator only ever talks to these traits. Concrete
//! implementations live in [`crate::adapters`]; tests substitute in-memory
//! fakes. Every trait is object safe and used as `Arc<dyn Trait>`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::task::TaskReport;

/// A provisioned device: provider identifier plus reachable address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceHandle {
    pub provider_id: String,
    pub network_address: String,
}

/// A source-control reference resolved to a concrete commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedReference {
    pub commit: String,
    /// Set when the reference named a pull request rather than a commit.
    pub pull_request: Option<u64>,
}

impl ResolvedReference {
    /// A reference used verbatim, e.g. after resolution failed.
    pub fn unresolved(reference: &str) -> Self {
        Self {
            commit: reference.to_string(),
            pull_request: None,
        }
    }

    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }
}

/// Completion status and captured output of a remote workload.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Allocates and releases benchmark hosts.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Creates a device and waits until it is ready to accept work.
    ///
    /// Implementations must bound the wait; exceeding it is a
    /// [`BenchError::Provisioning`](crate::BenchError::Provisioning).
    async fn provision(&self, project_id: &str, hostname: &str) -> Result<ResourceHandle>;

    /// Releases a device previously returned by [`provision`](Self::provision).
    async fn release(&self, provider_id: &str) -> Result<()>;
}

/// Resolves commits, branches and pull request numbers.
#[async_trait]
pub trait CommitResolver: Send + Sync {
    async fn resolve_reference(&self, reference: &str) -> Result<ResolvedReference>;
}

/// Copies files off a provisioned host.
#[async_trait]
pub trait RemoteTransfer: Send + Sync {
    async fn transfer_file(&self, host: &str, remote_path: &str, local_path: &Path) -> Result<()>;

    /// Recursively copies `remote_path` into `local_path`, creating it if needed.
    async fn transfer_directory(
        &self,
        host: &str,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<()>;
}

/// Runs a workload script against a materialized topology.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn run_remote(&self, host: &str, script: &Path, topology: &Path)
        -> Result<ExecutionOutput>;
}

/// Uploads report archives and returns a retrievable link.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload_archive(&self, path: &Path) -> Result<Option<String>>;
}

/// Persists collected reports.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn store_report(&self, report: &TaskReport, table_name: &str) -> Result<()>;
}

/// Announces a finished report.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, report_path: &Path, url: Option<&str>) -> Result<()>;
}

/// The set of collaborators a [`BenchmarkRunner`](crate::BenchmarkRunner) drives.
///
/// Object storage and notification are optional; a run without them still
/// collects and stores reports.
#[derive(Clone)]
pub struct Collaborators {
    pub provisioner: Arc<dyn Provisioner>,
    pub resolver: Arc<dyn CommitResolver>,
    pub transfer: Arc<dyn RemoteTransfer>,
    pub executor: Arc<dyn RemoteExecutor>,
    pub result_store: Arc<dyn ResultStore>,
    pub notifier: Option<Arc<dyn Notifier>>,
    pub storage: Option<Arc<dyn ObjectStorage>>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("notifier", &self.notifier.is_some())
            .field("storage", &self.storage.is_some())
            .finish_non_exhaustive()
    }
}
