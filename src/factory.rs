//! Builds tasks from variant names.

use std::path::{Path, PathBuf};

use crate::error::{BenchError, Result};
use crate::profiling::ProfilingOptions;
use crate::task::Task;
use crate::variant::Variant;

/// Creates [`Task`]s in the `Created` stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskFactory;

impl TaskFactory {
    pub fn new() -> Self {
        Self
    }

    /// Creates a task for the variant called `variant_name`.
    ///
    /// Unknown names fail with [`BenchError::UnsupportedVariant`]. The
    /// `<topology_dir>/build` directory is created if missing.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::path::Path;
    /// use vbench::{TaskFactory, TaskStage};
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let task = TaskFactory::new()
    ///     .create("tpcc", dir.path(), dir.path(), Path::new("inventory.yml"), "docs", None)
    ///     .unwrap();
    /// assert_eq!(task.name(), "tpcc");
    /// assert_eq!(task.stage(), TaskStage::Created);
    /// assert!(dir.path().join("build").is_dir());
    /// ```
    pub fn create(
        &self,
        variant_name: &str,
        report_dir: impl Into<PathBuf>,
        topology_dir: &Path,
        topology_file: &Path,
        source: &str,
        profiling: Option<ProfilingOptions>,
    ) -> Result<Task> {
        let variant: Variant = variant_name.parse()?;
        self.create_for(variant, report_dir, topology_dir, topology_file, source, profiling)
    }

    /// Same as [`create`](Self::create) for an already parsed variant.
    pub fn create_for(
        &self,
        variant: Variant,
        report_dir: impl Into<PathBuf>,
        topology_dir: &Path,
        topology_file: &Path,
        source: &str,
        profiling: Option<ProfilingOptions>,
    ) -> Result<Task> {
        let build_dir = topology_dir.join("build");
        std::fs::create_dir_all(&build_dir).map_err(|e| BenchError::io(&build_dir, e))?;

        let task = Task::new(
            variant,
            report_dir.into(),
            topology_dir,
            topology_file,
            source.to_string(),
            profiling,
        );
        tracing::debug!(task_id = %task.task_id(), variant = %variant, "Task created");
        Ok(task)
    }
}
