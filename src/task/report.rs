//! Collected benchmark reports.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::error::{BenchError, Result};
use crate::ledger::LedgerEntry;

/// A task's identity merged with the workload's result object.
///
/// Serialized as one flat JSON object: the ledger keys (`task_name`,
/// `run_id`, `source`, `commit`, `vps_id`, `ip_address`, `inventory_file`)
/// followed by `results`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    #[serde(flatten)]
    pub task: LedgerEntry,
    pub results: Value,
}

impl TaskReport {
    /// Parses the raw result document fetched from the host.
    ///
    /// The document must be a JSON array. An empty array means the workload
    /// produced no data and yields `Ok(None)`; otherwise the first element
    /// becomes `results`.
    pub fn from_remote_result(task: LedgerEntry, raw: &str, path: &Path) -> Result<Option<Self>> {
        let parsed: Value = serde_json::from_str(raw).map_err(|e| BenchError::Report {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let Value::Array(mut items) = parsed else {
            return Err(BenchError::Report {
                path: path.to_path_buf(),
                message: "expected a JSON array of results".to_string(),
            });
        };
        if items.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self {
            task,
            results: items.swap_remove(0),
        }))
    }

    /// Writes the report as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let rendered = serde_json::to_string_pretty(self).map_err(|e| BenchError::Report {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        std::fs::write(path, rendered).map_err(|e| BenchError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn identity() -> LedgerEntry {
        LedgerEntry {
            task_name: "tpcc".to_string(),
            run_id: "6a1d2c6e-0000-4000-8000-000000000000".to_string(),
            source: "cron".to_string(),
            commit: "deadbeef".to_string(),
            vps_id: "dev-1".to_string(),
            ip_address: "10.0.0.9".to_string(),
            inventory_file: "inventory-6a1d.yml".to_string(),
        }
    }

    #[test]
    fn empty_array_is_no_data() {
        let report = TaskReport::from_remote_result(identity(), "[]", Path::new("r")).unwrap();
        assert!(report.is_none());
    }

    #[test]
    fn first_element_becomes_results() {
        let raw = r#"[{"qps": {"total": 10.5}}, {"qps": {"total": 1.0}}]"#;
        let report = TaskReport::from_remote_result(identity(), raw, Path::new("r"))
            .unwrap()
            .unwrap();
        assert_eq!(report.results, json!({"qps": {"total": 10.5}}));
    }

    #[test]
    fn serializes_flat() {
        let report = TaskReport {
            task: identity(),
            results: json!({"tps": 3}),
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["commit"], "deadbeef");
        assert_eq!(value["results"]["tps"], 3);
        assert!(value.get("task").is_none());
    }

    #[test]
    fn object_document_is_rejected() {
        let err = TaskReport::from_remote_result(identity(), "{}", Path::new("r")).unwrap_err();
        assert!(matches!(err, BenchError::Report { .. }));
    }

    #[test]
    fn invalid_json_is_rejected() {
        assert!(TaskReport::from_remote_result(identity(), "[", Path::new("r")).is_err());
    }
}
