//! Benchmark variants and their per-variant constants.
//!
//! A [`Variant`] is the only place that knows what differs between an OLTP
//! and a TPCC run: the workload script, the result table and the report file
//! name. Everything else in the lifecycle is shared.
//!
//! # Examples
//!
//! ```
//! use vbench::Variant;
//!
//! let variant: Variant = "tpcc".parse().unwrap();
//! assert_eq!(variant.script_name(), "run-tpcc");
//! assert_eq!(variant.table_name(), "TPCC");
//! assert_eq!(variant.report_file_name(), "tpcc_v2.json");
//! assert_eq!(variant.remote_result_path(), "/tmp/tpcc.json");
//!
//! assert!("unknown".parse::<Variant>().is_err());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BenchError;

/// The kind of benchmark workload a task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Sysbench OLTP read/write workload.
    Oltp,
    /// TPC-C workload.
    Tpcc,
}

impl Variant {
    /// All variants, in the order `--run-all` requests them.
    pub const ALL: [Variant; 2] = [Variant::Oltp, Variant::Tpcc];

    /// Lower-case name used in file names, ledger entries and reports.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Oltp => "oltp",
            Self::Tpcc => "tpcc",
        }
    }

    /// Workload script invoked against the materialized topology.
    pub fn script_name(&self) -> &'static str {
        match self {
            Self::Oltp => "run-oltp",
            Self::Tpcc => "run-tpcc",
        }
    }

    /// Result-store table receiving this variant's reports.
    pub fn table_name(&self) -> &'static str {
        match self {
            Self::Oltp => "OLTP",
            Self::Tpcc => "TPCC",
        }
    }

    /// File name of the merged report inside the task's report directory.
    pub fn report_file_name(&self) -> &'static str {
        match self {
            Self::Oltp => "oltp_v2.json",
            Self::Tpcc => "tpcc_v2.json",
        }
    }

    /// Well-known path of the workload's JSON result on the provisioned host.
    pub fn remote_result_path(&self) -> String {
        format!("/tmp/{}.json", self.name())
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Variant {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "oltp" => Ok(Self::Oltp),
            "tpcc" => Ok(Self::Tpcc),
            other => Err(BenchError::UnsupportedVariant {
                name: other.to_string(),
            }),
        }
    }
}
