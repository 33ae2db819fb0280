//! The immutable description of one orchestration pass.

use std::path::{Path, PathBuf};

use crate::error::{BenchError, Result};
use crate::profiling::ProfilingOptions;
use crate::variant::Variant;

/// What to benchmark, against which reference, and where to put the output.
///
/// Built once by the invoking surface (CLI or API) and only read afterwards.
#[derive(Debug, Clone)]
pub struct RunRequest {
    variants: Vec<Variant>,
    reference: String,
    source: String,
    report_dir: PathBuf,
    topology_file: PathBuf,
    profiling: Option<ProfilingOptions>,
}

impl RunRequest {
    /// Creates a validated request.
    ///
    /// Duplicated variants are kept; the runner executes them in the given order.
    pub fn new(
        variants: Vec<Variant>,
        reference: impl Into<String>,
        source: impl Into<String>,
        report_dir: impl Into<PathBuf>,
        topology_file: impl Into<PathBuf>,
    ) -> Result<Self> {
        let request = Self {
            variants,
            reference: reference.into(),
            source: source.into(),
            report_dir: report_dir.into(),
            topology_file: topology_file.into(),
            profiling: None,
        };
        request.validate()?;
        Ok(request)
    }

    /// Attaches profiling options to the request.
    pub fn with_profiling(mut self, profiling: Option<ProfilingOptions>) -> Self {
        self.profiling = profiling;
        self
    }

    fn validate(&self) -> Result<()> {
        let missing = [
            ("reference", self.reference.trim().is_empty()),
            ("source", self.source.trim().is_empty()),
            ("topology file", self.topology_file.as_os_str().is_empty()),
        ];
        if let Some((field, _)) = missing.iter().find(|(_, empty)| *empty) {
            return Err(BenchError::InvalidRequest {
                message: format!("{field} is required"),
            });
        }
        if self.variants.is_empty() {
            return Err(BenchError::InvalidRequest {
                message: "at least one benchmark variant must be requested".to_string(),
            });
        }
        Ok(())
    }

    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn report_dir(&self) -> &Path {
        &self.report_dir
    }

    /// Full path of the topology template.
    pub fn topology_file(&self) -> &Path {
        &self.topology_file
    }

    /// Directory holding the template; materialized files go under its `build/`.
    pub fn topology_dir(&self) -> &Path {
        self.topology_file.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn profiling(&self) -> Option<&ProfilingOptions> {
        self.profiling.as_ref()
    }
}
