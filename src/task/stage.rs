//! Lifecycle stages of a benchmark task.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::BenchError;

/// Where a [`Task`](super::Task) is in its lifecycle.
///
/// Stages are strictly ordered. A task never skips a stage (apart from the
/// optional [`Archived`](Self::Archived)) and never goes back.
///
/// # State Machine
///
/// ```text
/// Created -> DeviceProvisioned
/// DeviceProvisioned -> TopologyBuilt
/// TopologyBuilt -> TopologyBuilt (re-template), Executed
/// Executed -> ReportCollected
/// ReportCollected -> Archived, Done
/// Archived -> Done
/// Done -> (terminal)
/// ```
///
/// # Examples
///
/// ```
/// use vbench::TaskStage;
///
/// assert!(TaskStage::Created.can_transition_to(&TaskStage::DeviceProvisioned));
/// assert!(!TaskStage::Created.can_transition_to(&TaskStage::TopologyBuilt));
/// assert!(TaskStage::ReportCollected.can_transition_to(&TaskStage::Done));
/// assert!(TaskStage::Done.is_terminal());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStage {
    /// Identifier and variant fixed; nothing external allocated yet.
    Created,
    /// A device is active and recorded in the ledger.
    DeviceProvisioned,
    /// The run-specific topology has been written.
    TopologyBuilt,
    /// The remote workload finished successfully.
    Executed,
    /// The remote result was retrieved (possibly empty).
    ReportCollected,
    /// Artifacts were compressed and optionally uploaded.
    Archived,
    /// The report, if any, was handed to the result store and notifier.
    Done,
}

impl fmt::Display for TaskStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::DeviceProvisioned => "device_provisioned",
            Self::TopologyBuilt => "topology_built",
            Self::Executed => "executed",
            Self::ReportCollected => "report_collected",
            Self::Archived => "archived",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

impl TaskStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Returns `true` if moving from this stage to `next` is allowed.
    pub fn can_transition_to(&self, next: &Self) -> bool {
        match self {
            Self::Created => matches!(next, Self::DeviceProvisioned),
            Self::DeviceProvisioned => matches!(next, Self::TopologyBuilt),
            Self::TopologyBuilt => matches!(next, Self::TopologyBuilt | Self::Executed),
            Self::Executed => matches!(next, Self::ReportCollected),
            Self::ReportCollected => matches!(next, Self::Archived | Self::Done),
            Self::Archived => matches!(next, Self::Done),
            Self::Done => false,
        }
    }

    /// Validates a transition, returning [`BenchError::InvalidTransition`] when rejected.
    pub fn validate_transition(&self, task_id: &str, next: &Self) -> Result<(), BenchError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(BenchError::InvalidTransition {
                task_id: task_id.to_string(),
                from: *self,
                to: *next,
            })
        }
    }
}
