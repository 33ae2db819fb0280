//! Append-only JSON Lines result store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::collaborators::ResultStore;
use crate::error::{BenchError, Result};
use crate::task::TaskReport;

#[derive(Debug, Serialize)]
struct StoredReport<'a> {
    stored_at: DateTime<Utc>,
    #[serde(flatten)]
    report: &'a TaskReport,
}

/// Stores each report as one line of `<dir>/<table>.jsonl`.
#[derive(Debug, Clone)]
pub struct JsonLinesResultStore {
    dir: PathBuf,
}

impl JsonLinesResultStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn table_path(&self, table_name: &str) -> PathBuf {
        self.dir.join(format!("{table_name}.jsonl"))
    }

    fn append_line(path: &Path, line: &str) -> Result<()> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| BenchError::io(path, e))?;
        writeln!(file, "{line}").map_err(|e| BenchError::io(path, e))
    }
}

#[async_trait]
impl ResultStore for JsonLinesResultStore {
    async fn store_report(&self, report: &TaskReport, table_name: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| BenchError::io(&self.dir, e))?;

        let line = serde_json::to_string(&StoredReport {
            stored_at: Utc::now(),
            report,
        })
        .map_err(|e| BenchError::Delivery {
            target: format!("result store table {table_name}"),
            message: e.to_string(),
        })?;

        let path = self.table_path(table_name);
        Self::append_line(&path, &line)?;
        tracing::debug!(table = table_name, path = %path.display(), "Report stored");
        Ok(())
    }
}
