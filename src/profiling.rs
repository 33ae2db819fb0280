//! Profiling options passed through to the benchmark topology.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::BenchError;

/// Which Vitess components to profile and with which pprof argument.
///
/// Parsed from `"<target>[/<target>...]/<arg>"`, e.g. `"vtgate/cpu"` or
/// `"vttablet/vtgate/mem"`.
///
/// ```
/// use vbench::ProfilingOptions;
///
/// let opts: ProfilingOptions = "vttablet/vtgate/cpu".parse().unwrap();
/// assert_eq!(opts.targets, vec!["vttablet", "vtgate"]);
/// assert_eq!(opts.args, "cpu");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilingOptions {
    pub targets: Vec<String>,
    pub args: String,
}

impl FromStr for ProfilingOptions {
    type Err = BenchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut parts: Vec<&str> = value.split('/').map(str::trim).collect();
        let args = parts.pop().unwrap_or_default();

        if parts.is_empty() {
            return Err(BenchError::InvalidProfiling {
                value: value.to_string(),
                message: "profiling needs a target".to_string(),
            });
        }
        if args.is_empty() || parts.iter().any(|t| t.is_empty()) {
            return Err(BenchError::InvalidProfiling {
                value: value.to_string(),
                message: "empty profiling target or argument".to_string(),
            });
        }

        Ok(Self {
            targets: parts.into_iter().map(str::to_string).collect(),
            args: args.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn single_target() {
        let opts: ProfilingOptions = "vtgate/cpu".parse().unwrap();
        assert_eq!(opts.targets, vec!["vtgate".to_string()]);
        assert_eq!(opts.args, "cpu");
    }

    #[test]
    fn missing_target_is_rejected() {
        let err = "incorrect".parse::<ProfilingOptions>().unwrap_err();
        assert!(err.to_string().contains("profiling needs a target"));
    }

    #[test]
    fn empty_segments_are_rejected() {
        assert!("vtgate/".parse::<ProfilingOptions>().is_err());
        assert!("/cpu".parse::<ProfilingOptions>().is_err());
    }
}
