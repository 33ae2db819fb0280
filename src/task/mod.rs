//! The per-variant benchmark task and its lifecycle.
//!
//! A [`Task`] is created by the [`TaskFactory`](crate::TaskFactory) in
//! [`TaskStage::Created`] and is then driven forward one stage at a time:
//!
//! | Operation | Enters |
//! |-----------|--------|
//! | [`Task::provision`] | [`TaskStage::DeviceProvisioned`] |
//! | [`Task::build_topology`] | [`TaskStage::TopologyBuilt`] |
//! | [`Task::execute`] | [`TaskStage::Executed`] |
//! | [`Task::collect_report`] | [`TaskStage::ReportCollected`] |
//! | [`Task::archive`] | [`TaskStage::Archived`] (optional) |
//! | [`Task::finish`] | [`TaskStage::Done`] |
//!
//! Calling an operation out of order fails with
//! [`BenchError::InvalidTransition`] and leaves the task untouched. Every
//! failure is reported as a [`TaskFailure`] naming the stage being entered.
//!
//! [`Task::release`] and [`Task::cleanup`] are valid in any stage and are how
//! the runner gives back the device and local scratch files once a task ends,
//! successfully or not.
//!
//! Collaborators are passed to each operation instead of being stored on the
//! task, so a task only ever sees what the current step needs.

mod report;
mod stage;

pub use report::TaskReport;
pub use stage::TaskStage;

use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::archive;
use crate::collaborators::{
    CommitResolver, ExecutionOutput, ObjectStorage, Provisioner, RemoteExecutor, RemoteTransfer,
    ResolvedReference, ResourceHandle,
};
use crate::error::{BenchError, Result, TaskFailure};
use crate::ledger::{LedgerEntry, StateLedger};
use crate::profiling::ProfilingOptions;
use crate::topology::{self, TopologyVars};
use crate::variant::Variant;

/// Remote directory the workload writes profiles to.
pub const REMOTE_PPROF_DIR: &str = "/tmp/pprof";

/// Suffix of the raw result file fetched next to the report.
const RAW_REPORT_SUFFIX: &str = ".bench_report";

/// Hostname prefix of provisioned devices.
const HOSTNAME_PREFIX: &str = "benchmark-";

/// Result of [`Task::archive`].
#[derive(Debug)]
pub struct ArchiveOutcome {
    pub archive_path: PathBuf,
    /// Link returned by object storage, when an upload happened.
    pub url: Option<String>,
    /// Failure to pull profiles off the host. Not fatal to the archive.
    pub profiling_error: Option<BenchError>,
}

/// One benchmark variant run against one ephemeral device.
#[derive(Debug)]
pub struct Task {
    task_id: Uuid,
    variant: Variant,
    source: String,
    stage: TaskStage,
    profiling: Option<ProfilingOptions>,
    report_dir: PathBuf,
    report_dir_prepared: bool,
    topology_path: PathBuf,
    materialized_topology_path: PathBuf,
    resource: Option<ResourceHandle>,
    resolved: Option<ResolvedReference>,
    report: Option<TaskReport>,
}

impl Task {
    /// Creates a task in [`TaskStage::Created`].
    ///
    /// `topology_file` is resolved against `topology_dir`; an absolute path is
    /// used as is. The materialized topology lands in `<topology_dir>/build`.
    pub(crate) fn new(
        variant: Variant,
        report_dir: PathBuf,
        topology_dir: &Path,
        topology_file: &Path,
        source: String,
        profiling: Option<ProfilingOptions>,
    ) -> Self {
        let task_id = Uuid::new_v4();
        let topology_path = topology_dir.join(topology_file);
        let materialized_topology_path = topology_dir
            .join("build")
            .join(topology::materialized_file_name(&topology_path, &task_id));

        Self {
            task_id,
            variant,
            source,
            stage: TaskStage::Created,
            profiling,
            report_dir,
            report_dir_prepared: false,
            topology_path,
            materialized_topology_path,
            resource: None,
            resolved: None,
            report: None,
        }
    }

    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// Variant name, as recorded in the ledger and reports.
    pub fn name(&self) -> &'static str {
        self.variant.name()
    }

    pub fn table_name(&self) -> &'static str {
        self.variant.table_name()
    }

    pub fn stage(&self) -> TaskStage {
        self.stage
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn profiling(&self) -> Option<&ProfilingOptions> {
        self.profiling.as_ref()
    }

    pub fn resource(&self) -> Option<&ResourceHandle> {
        self.resource.as_ref()
    }

    /// Commit the topology was built with, once [`build_topology`](Self::build_topology) ran.
    pub fn resolved_reference(&self) -> Option<&ResolvedReference> {
        self.resolved.as_ref()
    }

    pub fn report(&self) -> Option<&TaskReport> {
        self.report.as_ref()
    }

    /// The task's report directory; rebased by [`prepare_report_dir`](Self::prepare_report_dir).
    pub fn report_dir(&self) -> &Path {
        &self.report_dir
    }

    /// Where the merged report is written.
    pub fn report_path(&self) -> PathBuf {
        self.report_dir.join(self.variant.report_file_name())
    }

    /// Where the raw remote result is downloaded to.
    pub fn raw_report_path(&self) -> PathBuf {
        let mut path = self.report_path().into_os_string();
        path.push(RAW_REPORT_SUFFIX);
        PathBuf::from(path)
    }

    pub fn topology_path(&self) -> &Path {
        &self.topology_path
    }

    pub fn materialized_topology_path(&self) -> &Path {
        &self.materialized_topology_path
    }

    /// Hostname requested from the provisioner.
    pub fn hostname(&self) -> String {
        format!("{HOSTNAME_PREFIX}{}", self.task_id)
    }

    /// The task's identity, as recorded in the ledger and merged into reports.
    pub fn ledger_entry(&self) -> LedgerEntry {
        let inventory_file = self
            .topology_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        LedgerEntry {
            task_name: self.name().to_string(),
            run_id: self.task_id.to_string(),
            source: self.source.clone(),
            commit: self
                .resolved
                .as_ref()
                .map(|r| r.commit.clone())
                .unwrap_or_default(),
            vps_id: self
                .resource
                .as_ref()
                .map(|r| r.provider_id.clone())
                .unwrap_or_default(),
            ip_address: self
                .resource
                .as_ref()
                .map(|r| r.network_address.clone())
                .unwrap_or_default(),
            inventory_file,
        }
    }

    /// Rebases the report directory to `<report_dir>/<variant>-<id prefix>` and creates it.
    ///
    /// Only the first call rebases; later calls just make sure the directory exists.
    pub fn prepare_report_dir(&mut self) -> Result<&Path> {
        if !self.report_dir_prepared {
            let simple = self.task_id.simple().to_string();
            let short_id = &simple[..8];
            self.report_dir = self.report_dir.join(format!("{}-{short_id}", self.name()));
            self.report_dir_prepared = true;
        }
        std::fs::create_dir_all(&self.report_dir)
            .map_err(|e| BenchError::io(&self.report_dir, e))?;
        Ok(&self.report_dir)
    }

    /// Acquires a device and records it in the ledger.
    ///
    /// The handle is kept even if the ledger append fails, so the device can
    /// still be released.
    pub async fn provision(
        &mut self,
        provisioner: &dyn Provisioner,
        ledger: &StateLedger,
        project_id: &str,
    ) -> Result<&ResourceHandle, TaskFailure> {
        let next = TaskStage::DeviceProvisioned;
        self.check(next)?;

        let hostname = self.hostname();
        tracing::info!(
            task_id = %self.task_id,
            variant = %self.variant,
            hostname = %hostname,
            "Provisioning device"
        );
        let handle = provisioner
            .provision(project_id, &hostname)
            .await
            .map_err(|e| self.fail(next, e))?;
        tracing::info!(
            task_id = %self.task_id,
            device = %handle.provider_id,
            host = %handle.network_address,
            "Device active"
        );
        self.resource = Some(handle);

        ledger
            .append_async(self.ledger_entry())
            .await
            .map_err(|e| self.fail(next, e))?;

        self.stage = next;
        self.resource_or_fail(next)
    }

    /// Writes the run-specific topology for this task's device.
    ///
    /// The reference is resolved on the first call only; a resolution failure
    /// degrades to using `reference` verbatim. Calling this again rebuilds the
    /// file with the same commit.
    pub async fn build_topology(
        &mut self,
        resolver: &dyn CommitResolver,
        reference: &str,
    ) -> Result<&Path, TaskFailure> {
        let next = TaskStage::TopologyBuilt;
        self.check(next)?;
        let address = self.resource_or_fail(next)?.network_address.clone();

        if self.resolved.is_none() {
            let resolved = match resolver.resolve_reference(reference).await {
                Ok(resolved) if !resolved.commit.is_empty() => resolved,
                Ok(_) => {
                    tracing::warn!(
                        task_id = %self.task_id,
                        reference,
                        "Resolver returned an empty commit, using the raw reference"
                    );
                    ResolvedReference::unresolved(reference)
                },
                Err(e) => {
                    tracing::warn!(
                        task_id = %self.task_id,
                        reference,
                        error = %e,
                        "Could not resolve reference, using it verbatim"
                    );
                    ResolvedReference::unresolved(reference)
                },
            };
            self.resolved = Some(resolved);
        }
        let resolved = self
            .resolved
            .clone()
            .unwrap_or_else(|| ResolvedReference::unresolved(reference));

        let template = topology::load(&self.topology_path).map_err(|e| self.fail(next, e))?;
        let mut built = topology::substitute(&template, &address);
        TopologyVars {
            git_version: &resolved.commit,
            pull_request: resolved.pull_request,
            profiling: self.profiling.as_ref(),
        }
        .apply(&mut built, &self.topology_path)
        .map_err(|e| self.fail(next, e))?;

        if let Some(build_dir) = self.materialized_topology_path.parent() {
            std::fs::create_dir_all(build_dir)
                .map_err(|e| self.fail(next, BenchError::io(build_dir, e)))?;
        }
        topology::save(&built, &self.materialized_topology_path)
            .map_err(|e| self.fail(next, e))?;

        tracing::debug!(
            task_id = %self.task_id,
            commit = %resolved.commit,
            pull_request = ?resolved.pull_request,
            path = %self.materialized_topology_path.display(),
            "Topology built"
        );
        self.stage = next;
        Ok(&self.materialized_topology_path)
    }

    /// Runs the variant's workload script against the materialized topology.
    pub async fn execute(
        &mut self,
        executor: &dyn RemoteExecutor,
        scripts_dir: &Path,
    ) -> Result<ExecutionOutput, TaskFailure> {
        let next = TaskStage::Executed;
        self.check(next)?;
        let host = self.resource_or_fail(next)?.network_address.clone();
        let script = scripts_dir.join(self.variant.script_name());

        tracing::info!(
            task_id = %self.task_id,
            variant = %self.variant,
            host = %host,
            script = %script.display(),
            "Running workload"
        );
        let output = executor
            .run_remote(&host, &script, &self.materialized_topology_path)
            .await
            .map_err(|e| self.fail(next, e))?;

        if !output.success {
            let error = BenchError::RemoteExecution {
                script: script.display().to_string(),
                exit_code: output.exit_code,
                message: last_line(&output.stderr)
                    .unwrap_or("workload reported failure")
                    .to_string(),
            };
            return Err(self.fail(next, error));
        }

        self.stage = next;
        Ok(output)
    }

    /// Fetches the workload's result and writes the merged report.
    ///
    /// Returns `Ok(None)` when the workload produced an empty result set; the
    /// task still moves to [`TaskStage::ReportCollected`].
    pub async fn collect_report(
        &mut self,
        transfer: &dyn RemoteTransfer,
    ) -> Result<Option<&TaskReport>, TaskFailure> {
        let next = TaskStage::ReportCollected;
        self.check(next)?;
        let host = self.resource_or_fail(next)?.network_address.clone();

        let prepared = self.prepare_report_dir().map(|_| ());
        prepared.map_err(|e| self.fail(next, e))?;
        let raw_path = self.raw_report_path();
        transfer
            .transfer_file(&host, &self.variant.remote_result_path(), &raw_path)
            .await
            .map_err(|e| self.fail(next, e))?;

        let raw = std::fs::read_to_string(&raw_path)
            .map_err(|e| self.fail(next, BenchError::io(&raw_path, e)))?;
        let report = TaskReport::from_remote_result(self.ledger_entry(), &raw, &raw_path)
            .map_err(|e| self.fail(next, e))?;

        match report {
            Some(report) => {
                let path = self.report_path();
                report.save(&path).map_err(|e| self.fail(next, e))?;
                tracing::info!(
                    task_id = %self.task_id,
                    report = %path.display(),
                    "Report collected"
                );
                self.report = Some(report);
            },
            None => {
                tracing::warn!(task_id = %self.task_id, variant = %self.variant, "Workload produced no data");
            },
        }

        self.stage = next;
        Ok(self.report.as_ref())
    }

    /// Compresses the report directory and uploads it when storage is given.
    ///
    /// When profiling was requested the remote profile directory is pulled in
    /// first; failing to do so is returned on the outcome, not as an error.
    pub async fn archive(
        &mut self,
        transfer: &dyn RemoteTransfer,
        storage: Option<&dyn ObjectStorage>,
    ) -> Result<ArchiveOutcome, TaskFailure> {
        let next = TaskStage::Archived;
        self.check(next)?;

        let mut profiling_error = None;
        if self.profiling.is_some() {
            let host = self.resource_or_fail(next)?.network_address.clone();
            let dest = self.report_dir.join("pprof");
            if let Err(e) = transfer.transfer_directory(&host, REMOTE_PPROF_DIR, &dest).await {
                tracing::warn!(task_id = %self.task_id, error = %e, "Could not download profiles");
                profiling_error = Some(e);
            }
        }

        let archive_path =
            archive::compress_directory(&self.report_dir).map_err(|e| self.fail(next, e))?;

        let url = match storage {
            Some(storage) => storage
                .upload_archive(&archive_path)
                .await
                .map_err(|e| self.fail(next, e))?,
            None => None,
        };

        self.stage = next;
        Ok(ArchiveOutcome {
            archive_path,
            url,
            profiling_error,
        })
    }

    /// Marks the task [`TaskStage::Done`].
    pub fn finish(&mut self) -> Result<(), TaskFailure> {
        let next = TaskStage::Done;
        self.check(next)?;
        self.stage = next;
        Ok(())
    }

    /// Gives the device back. Returns `false` when none was provisioned.
    pub async fn release(&self, provisioner: &dyn Provisioner) -> Result<bool> {
        let Some(resource) = &self.resource else {
            return Ok(false);
        };
        tracing::info!(
            task_id = %self.task_id,
            device = %resource.provider_id,
            "Releasing device"
        );
        provisioner.release(&resource.provider_id).await?;
        Ok(true)
    }

    /// Removes the materialized topology file, if it was written.
    pub fn cleanup(&self) -> Result<()> {
        match std::fs::remove_file(&self.materialized_topology_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BenchError::io(&self.materialized_topology_path, e)),
        }
    }

    fn check(&self, next: TaskStage) -> Result<(), TaskFailure> {
        self.stage
            .validate_transition(&self.task_id.to_string(), &next)
            .map_err(|e| self.fail(next, e))
    }

    fn resource_or_fail(&self, next: TaskStage) -> Result<&ResourceHandle, TaskFailure> {
        self.resource.as_ref().ok_or_else(|| {
            self.fail(
                next,
                BenchError::Provisioning {
                    message: "no device has been provisioned for this task".to_string(),
                },
            )
        })
    }

    pub(crate) fn fail(&self, stage: TaskStage, source: BenchError) -> TaskFailure {
        TaskFailure {
            task_id: self.task_id.to_string(),
            variant: self.variant,
            stage,
            source,
        }
    }
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().rev().map(str::trim).find(|l| !l.is_empty())
}
