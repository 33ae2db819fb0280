//! Drives every requested task through its lifecycle.
//!
//! Tasks run one after another, never in parallel: each one owns a single
//! device and the workload saturates it for hours. A task that fails is
//! recorded and the queue moves on; only a corrupt ledger stops the run,
//! because no further device could be tracked safely.
//!
//! Whatever happens to a task, its device is released afterwards unless the
//! configuration asks to keep devices around for inspection. A released
//! device is also dropped from the ledger; kept devices stay listed there.

use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::collaborators::Collaborators;
use crate::config::BenchConfig;
use crate::error::{BenchError, Result, TaskFailure};
use crate::factory::TaskFactory;
use crate::ledger::StateLedger;
use crate::request::RunRequest;
use crate::task::{Task, TaskStage};
use crate::variant::Variant;

/// Runner settings taken from a [`BenchConfig`].
#[derive(Debug, Clone, Default)]
pub struct RunnerSettings {
    pub project_id: String,
    pub scripts_dir: PathBuf,
    pub keep_devices: bool,
}

impl RunnerSettings {
    pub fn from_config(config: &BenchConfig) -> Self {
        Self {
            project_id: config.provisioning.project_id.clone().unwrap_or_default(),
            scripts_dir: config.paths.scripts_dir.clone(),
            keep_devices: config.execution.keep_devices,
        }
    }
}

/// How a single task ended.
#[derive(Debug)]
pub enum TaskResult {
    /// A report was collected and handed to delivery.
    Reported {
        report_path: PathBuf,
        archive_url: Option<String>,
    },
    /// The workload ran but produced no records.
    NoData,
    Failed(TaskFailure),
    /// Never started because the run was cancelled or aborted first.
    Skipped,
}

/// Per-task record in a [`RunSummary`].
#[derive(Debug)]
pub struct TaskOutcome {
    pub task_id: Uuid,
    pub variant: Variant,
    pub final_stage: TaskStage,
    pub result: TaskResult,
    /// Whether the task's device was released after it ended.
    pub released: bool,
    /// Non-fatal failures: profile download, upload, store, notify, release,
    /// ledger removal.
    pub warnings: Vec<BenchError>,
}

impl TaskOutcome {
    pub fn is_reported(&self) -> bool {
        matches!(self.result, TaskResult::Reported { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.result, TaskResult::Failed(_) | TaskResult::Skipped)
    }
}

/// Aggregate status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every task reached `Done` with a report.
    Succeeded,
    /// Some tasks failed or produced no data, and some did not.
    PartiallySucceeded,
    /// Every task completed but none produced data.
    NoData,
    /// No task completed.
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Succeeded => "succeeded",
            Self::PartiallySucceeded => "partially succeeded",
            Self::NoData => "no data",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Result of [`BenchmarkRunner::run`].
#[derive(Debug, Default)]
pub struct RunSummary {
    /// One entry per requested variant, in request order.
    pub outcomes: Vec<TaskOutcome>,
    pub cancelled: bool,
    /// Set when a run-fatal error stopped the queue.
    pub aborted: bool,
}

impl RunSummary {
    pub fn status(&self) -> RunStatus {
        let total = self.outcomes.len();
        let reported = self.outcomes.iter().filter(|o| o.is_reported()).count();
        let failed = self.outcomes.iter().filter(|o| o.is_failed()).count();

        if failed == 0 {
            if reported == total {
                RunStatus::Succeeded
            } else if reported == 0 {
                RunStatus::NoData
            } else {
                RunStatus::PartiallySucceeded
            }
        } else if failed == total {
            RunStatus::Failed
        } else {
            RunStatus::PartiallySucceeded
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &TaskFailure> {
        self.outcomes.iter().filter_map(|o| match &o.result {
            TaskResult::Failed(failure) => Some(failure),
            _ => None,
        })
    }
}

/// Sequential orchestrator for a [`RunRequest`].
#[derive(Debug)]
pub struct BenchmarkRunner {
    collaborators: Collaborators,
    ledger: StateLedger,
    settings: RunnerSettings,
    factory: TaskFactory,
}

impl BenchmarkRunner {
    pub fn new(config: &BenchConfig, collaborators: Collaborators) -> Self {
        Self::with_settings(
            RunnerSettings::from_config(config),
            StateLedger::new(&config.paths.ledger_file),
            collaborators,
        )
    }

    pub fn with_settings(
        settings: RunnerSettings,
        ledger: StateLedger,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            collaborators,
            ledger,
            settings,
            factory: TaskFactory::new(),
        }
    }

    pub fn ledger(&self) -> &StateLedger {
        &self.ledger
    }

    /// Builds one task per requested variant and runs them in order.
    ///
    /// Returns `Err` only when the tasks cannot be created at all. Everything
    /// that happens once tasks exist is reported through the summary.
    pub async fn run(&self, request: &RunRequest, cancel: &CancellationToken) -> Result<RunSummary> {
        let topology_dir = request.topology_dir();
        let topology_file = request
            .topology_file()
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| request.topology_file().to_path_buf());

        let mut tasks = request
            .variants()
            .iter()
            .map(|variant| {
                self.factory.create_for(
                    *variant,
                    request.report_dir(),
                    topology_dir,
                    &topology_file,
                    request.source(),
                    request.profiling().cloned(),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(
            tasks = tasks.len(),
            reference = request.reference(),
            source = request.source(),
            "Starting benchmark run"
        );

        let mut summary = RunSummary::default();
        for task in tasks.iter_mut() {
            if summary.aborted || cancel.is_cancelled() {
                summary.cancelled |= cancel.is_cancelled();
                summary.outcomes.push(TaskOutcome {
                    task_id: task.task_id(),
                    variant: task.variant(),
                    final_stage: task.stage(),
                    result: TaskResult::Skipped,
                    released: false,
                    warnings: Vec::new(),
                });
                continue;
            }

            let mut warnings = Vec::new();
            let result = match self.drive(task, request, cancel, &mut warnings).await {
                Ok(result) => result,
                Err(failure) => {
                    tracing::error!(
                        task_id = %task.task_id(),
                        variant = %task.variant(),
                        stage = %failure.stage,
                        category = failure.source.category(),
                        error = %failure.source,
                        "Task failed"
                    );
                    if failure.source.is_fatal_for_run() {
                        summary.aborted = true;
                    }
                    if matches!(failure.source, BenchError::Cancelled { .. }) {
                        summary.cancelled = true;
                    }
                    TaskResult::Failed(failure)
                },
            };

            let released = self.teardown(task, &mut warnings).await;
            for warning in &warnings {
                tracing::warn!(task_id = %task.task_id(), error = %warning, "Task completed with warning");
            }

            summary.outcomes.push(TaskOutcome {
                task_id: task.task_id(),
                variant: task.variant(),
                final_stage: task.stage(),
                result,
                released,
                warnings,
            });
        }

        tracing::info!(status = %summary.status(), "Benchmark run finished");
        Ok(summary)
    }

    async fn drive(
        &self,
        task: &mut Task,
        request: &RunRequest,
        cancel: &CancellationToken,
        warnings: &mut Vec<BenchError>,
    ) -> Result<TaskResult, TaskFailure> {
        let c = &self.collaborators;

        checkpoint(task, TaskStage::DeviceProvisioned, cancel)?;
        let prepared = task.prepare_report_dir().map(|_| ());
        prepared.map_err(|e| task.fail(TaskStage::DeviceProvisioned, e))?;
        task.provision(c.provisioner.as_ref(), &self.ledger, &self.settings.project_id)
            .await?;

        checkpoint(task, TaskStage::TopologyBuilt, cancel)?;
        task.build_topology(c.resolver.as_ref(), request.reference())
            .await?;

        checkpoint(task, TaskStage::Executed, cancel)?;
        let executed = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = task.execute(c.executor.as_ref(), &self.settings.scripts_dir) => Some(result),
        };
        match executed {
            Some(result) => {
                result?;
            },
            None => {
                return Err(task.fail(
                    TaskStage::Executed,
                    BenchError::Cancelled {
                        stage: TaskStage::Executed,
                    },
                ))
            },
        }

        checkpoint(task, TaskStage::ReportCollected, cancel)?;
        let has_report = task.collect_report(c.transfer.as_ref()).await?.is_some();
        if !has_report {
            task.finish()?;
            return Ok(TaskResult::NoData);
        }

        let archive_url = if cancel.is_cancelled() {
            tracing::warn!(task_id = %task.task_id(), "Run cancelled, skipping archive");
            None
        } else {
            match task.archive(c.transfer.as_ref(), c.storage.as_deref()).await {
                Ok(outcome) => {
                    warnings.extend(outcome.profiling_error);
                    outcome.url
                },
                Err(failure) => {
                    warnings.push(failure.source);
                    None
                },
            }
        };

        self.deliver(task, archive_url.as_deref(), warnings).await;
        task.finish()?;

        Ok(TaskResult::Reported {
            report_path: task.report_path(),
            archive_url,
        })
    }

    async fn deliver(&self, task: &Task, url: Option<&str>, warnings: &mut Vec<BenchError>) {
        let Some(report) = task.report() else {
            return;
        };

        if let Err(e) = self
            .collaborators
            .result_store
            .store_report(report, task.table_name())
            .await
        {
            warnings.push(e);
        }

        if let Some(notifier) = &self.collaborators.notifier {
            if let Err(e) = notifier.notify(&task.report_path(), url).await {
                warnings.push(e);
            }
        }
    }

    /// Releases the device, drops its ledger entry and removes scratch files.
    /// Returns whether a device was released.
    async fn teardown(&self, task: &Task, warnings: &mut Vec<BenchError>) -> bool {
        let released = if self.settings.keep_devices {
            if let Some(resource) = task.resource() {
                tracing::info!(
                    task_id = %task.task_id(),
                    device = %resource.provider_id,
                    "Keeping device"
                );
            }
            false
        } else {
            match task.release(self.collaborators.provisioner.as_ref()).await {
                Ok(released) => released,
                Err(e) => {
                    warnings.push(e);
                    false
                },
            }
        };

        // A released device no longer needs its ledger entry.
        if released {
            if let Err(e) = self.ledger.remove_async(&task.task_id().to_string()).await {
                warnings.push(e);
            }
        }

        if let Err(e) = task.cleanup() {
            warnings.push(e);
        }
        released
    }
}

fn checkpoint(task: &Task, next: TaskStage, cancel: &CancellationToken) -> Result<(), TaskFailure> {
    if cancel.is_cancelled() {
        return Err(task.fail(next, BenchError::Cancelled { stage: next }));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(result: TaskResult) -> TaskOutcome {
        TaskOutcome {
            task_id: Uuid::new_v4(),
            variant: Variant::Oltp,
            final_stage: TaskStage::Done,
            result,
            released: true,
            warnings: Vec::new(),
        }
    }

    fn reported() -> TaskResult {
        TaskResult::Reported {
            report_path: PathBuf::from("r.json"),
            archive_url: None,
        }
    }

    fn failed() -> TaskResult {
        TaskResult::Failed(TaskFailure {
            task_id: "t".to_string(),
            variant: Variant::Tpcc,
            stage: TaskStage::DeviceProvisioned,
            source: BenchError::Provisioning {
                message: "never active".to_string(),
            },
        })
    }

    fn summary(results: Vec<TaskResult>) -> RunSummary {
        RunSummary {
            outcomes: results.into_iter().map(outcome).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn all_reported_is_success() {
        assert_eq!(summary(vec![reported(), reported()]).status(), RunStatus::Succeeded);
    }

    #[test]
    fn one_failure_is_partial() {
        let s = summary(vec![reported(), failed()]);
        assert_eq!(s.status(), RunStatus::PartiallySucceeded);
        assert_eq!(s.failures().count(), 1);
    }

    #[test]
    fn all_failed_is_failure() {
        assert_eq!(
            summary(vec![failed(), TaskResult::Skipped]).status(),
            RunStatus::Failed
        );
    }

    #[test]
    fn no_records_is_no_data() {
        assert_eq!(
            summary(vec![TaskResult::NoData, TaskResult::NoData]).status(),
            RunStatus::NoData
        );
        assert_eq!(
            summary(vec![reported(), TaskResult::NoData]).status(),
            RunStatus::PartiallySucceeded
        );
    }

    #[test]
    fn settings_from_config() {
        let mut config = BenchConfig::default();
        config.provisioning.project_id = Some("proj".to_string());
        config.execution.keep_devices = true;
        let settings = RunnerSettings::from_config(&config);
        assert_eq!(settings.project_id, "proj");
        assert!(settings.keep_devices);
        assert_eq!(settings.scripts_dir, PathBuf::from("./scripts"));
    }
}
