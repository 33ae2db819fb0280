//! Error types for benchmark orchestration.
//!
//! [`BenchError`] is the single error taxonomy of the crate. Errors raised
//! while a task is moving through its lifecycle are wrapped in a
//! [`TaskFailure`] at the task boundary so the runner can record which stage
//! failed without aborting sibling tasks.

use std::path::PathBuf;

use crate::task::TaskStage;
use crate::variant::Variant;

/// Convenience alias used throughout the crate.
pub type Result<T, E = BenchError> = std::result::Result<T, E>;

/// Errors that can occur while orchestrating a benchmark run.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    /// Device creation failed or the device never reported `active`.
    #[error("provisioning failed: {message}")]
    Provisioning { message: String },

    /// Commit or pull request lookup failed.
    ///
    /// Tasks degrade to the raw reference string when they see this error.
    #[error("could not resolve reference '{reference}': {message}")]
    ReferenceResolution { reference: String, message: String },

    /// The remote workload completed with a failure status.
    #[error("remote execution of '{script}' failed (exit code {exit_code:?}): {message}")]
    RemoteExecution {
        script: String,
        exit_code: Option<i32>,
        message: String,
    },

    /// Retrieving a file or directory from the provisioned host failed.
    #[error("transfer of '{remote_path}' from {host} failed: {message}")]
    Transfer {
        host: String,
        remote_path: String,
        message: String,
    },

    /// The ledger file exists but is not a valid ledger document.
    #[error("ledger '{path}' is corrupt: {message}")]
    LedgerCorruption { path: PathBuf, message: String },

    /// The task factory was asked for a variant it does not know.
    #[error("unsupported benchmark variant '{name}' (expected one of: oltp, tpcc)")]
    UnsupportedVariant { name: String },

    /// A lifecycle operation was invoked out of order.
    #[error("invalid transition from {from} to {to} for task {task_id}")]
    InvalidTransition {
        task_id: String,
        from: TaskStage,
        to: TaskStage,
    },

    /// The run request is missing mandatory fields.
    #[error("invalid run request: {message}")]
    InvalidRequest { message: String },

    /// A profiling option string could not be parsed.
    #[error("invalid profiling option '{value}': {message}")]
    InvalidProfiling { value: String, message: String },

    /// The topology template could not be read, parsed or written.
    #[error("topology '{path}': {message}")]
    Topology { path: PathBuf, message: String },

    /// The retrieved report could not be parsed or persisted.
    #[error("report '{path}': {message}")]
    Report { path: PathBuf, message: String },

    /// Archiving, uploading, storing or notifying failed after a report existed.
    #[error("delivery to {target} failed: {message}")]
    Delivery { target: String, message: String },

    /// The run was cancelled before the task reached this stage.
    #[error("cancelled before {stage}")]
    Cancelled { stage: TaskStage },

    /// Configuration could not be loaded or is incomplete.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Local filesystem failure.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BenchError {
    /// Builds an [`BenchError::Io`] bound to the path that failed.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns the error category as a static string for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Provisioning { .. } => "provisioning",
            Self::ReferenceResolution { .. } => "reference_resolution",
            Self::RemoteExecution { .. } => "remote_execution",
            Self::Transfer { .. } => "transfer",
            Self::LedgerCorruption { .. } => "ledger_corruption",
            Self::UnsupportedVariant { .. } => "unsupported_variant",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::InvalidProfiling { .. } => "invalid_profiling",
            Self::Topology { .. } => "topology",
            Self::Report { .. } => "report",
            Self::Delivery { .. } => "delivery",
            Self::Cancelled { .. } => "cancelled",
            Self::Config { .. } => "config",
            Self::Io { .. } => "io",
        }
    }

    /// Returns `true` if this error must abort the whole run rather than a single task.
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(self, Self::LedgerCorruption { .. })
    }
}

/// A task that stopped before reaching `Done`.
///
/// `stage` is the stage the task was trying to enter when `source` occurred.
#[derive(Debug, thiserror::Error)]
#[error("{variant} task {task_id} failed entering {stage}: {source}")]
pub struct TaskFailure {
    pub task_id: String,
    pub variant: Variant,
    pub stage: TaskStage,
    #[source]
    pub source: BenchError,
}
