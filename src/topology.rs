//! Topology template engine.
//!
//! A topology is an Ansible inventory: a YAML tree of named roles whose
//! `hosts` collections are keyed by placeholder host identifiers, plus an
//! `all.vars` section that parameterizes the workload. Materializing a
//! topology for a task means:
//!
//! 1. rebinding every `hosts` collection, at any depth, to the address of the
//!    task's provisioned device ([`substitute`]);
//! 2. writing run metadata into `all.vars` ([`TopologyVars::apply`]);
//! 3. saving the result under a task-specific file name
//!    ([`materialized_file_name`]) so concurrent runs never collide.
//!
//! Steps 1 and 2 are pure; only [`load`] and [`save`] touch the filesystem.
//!
//! # Known simplification
//!
//! A `hosts` collection that lists more than one host collapses to a single
//! entry keyed by the new address. The value kept is the value of the **last**
//! listed host.
//!
//! # Examples
//!
//! ```
//! use vbench::topology::substitute;
//!
//! let template: serde_yaml::Value = serde_yaml::from_str(
//!     "all:\n  children:\n    vtgate:\n      hosts:\n        10.0.0.1:\n          port: 15001\n",
//! )
//! .unwrap();
//!
//! let built = substitute(&template, "147.75.1.2");
//! let hosts = &built["all"]["children"]["vtgate"]["hosts"];
//! assert_eq!(hosts["147.75.1.2"]["port"], 15001);
//! assert!(hosts.get("10.0.0.1").is_none());
//! ```

use serde_yaml::{Mapping, Value};
use std::path::Path;
use uuid::Uuid;

use crate::error::{BenchError, Result};
use crate::profiling::ProfilingOptions;

/// Mapping key naming a role's host collection.
pub const HOSTS_KEY: &str = "hosts";

/// Returns a copy of `tree` with every `hosts` mapping rebound to `address`.
///
/// Mappings and sequences are walked; scalars and `null` are copied untouched.
/// A `hosts` key whose value is not a mapping is walked like any other value.
/// Host values are carried over verbatim and are not walked further.
pub fn substitute(tree: &Value, address: &str) -> Value {
    match tree {
        Value::Mapping(map) => {
            let mut out = Mapping::with_capacity(map.len());
            for (key, value) in map {
                let rebuilt = match (key.as_str(), value) {
                    (Some(HOSTS_KEY), Value::Mapping(hosts)) => {
                        Value::Mapping(rebind_hosts(hosts, address))
                    },
                    _ => substitute(value, address),
                };
                out.insert(key.clone(), rebuilt);
            }
            Value::Mapping(out)
        },
        Value::Sequence(items) => Value::Sequence(
            items
                .iter()
                .map(|item| substitute(item, address))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn rebind_hosts(hosts: &Mapping, address: &str) -> Mapping {
    let mut rebound = Mapping::with_capacity(1);
    // Last host wins when the template lists several.
    if let Some((_, value)) = hosts.iter().last() {
        rebound.insert(Value::String(address.to_string()), value.clone());
    }
    rebound
}

/// Run metadata written into the topology's `all.vars` section.
#[derive(Debug, Clone)]
pub struct TopologyVars<'a> {
    /// Concrete commit the workload builds.
    pub git_version: &'a str,
    /// Pull request number, when the reference denoted a pull request.
    pub pull_request: Option<u64>,
    pub profiling: Option<&'a ProfilingOptions>,
}

impl TopologyVars<'_> {
    /// Writes the variables into `tree["all"]["vars"]`, creating both levels if absent.
    pub fn apply(&self, tree: &mut Value, path: &Path) -> Result<()> {
        let vars = vars_section(tree).ok_or_else(|| BenchError::Topology {
            path: path.to_path_buf(),
            message: "'all' and 'all.vars' must be mappings".to_string(),
        })?;

        vars.insert("vitess_git_version".into(), self.git_version.into());

        if let Some(pr) = self.pull_request {
            vars.insert("vitess_git_version_pr_nb".into(), pr.into());
            vars.insert(
                "vitess_git_version_fetch_pr".into(),
                format!("pull/{pr}/head:{pr}").into(),
            );
        }

        if let Some(profiling) = self.profiling {
            let targets = profiling
                .targets
                .iter()
                .map(|t| Value::String(t.clone()))
                .collect::<Vec<_>>();
            vars.insert("pprof_targets".into(), Value::Sequence(targets));
            vars.insert("pprof_args".into(), profiling.args.as_str().into());
        }

        Ok(())
    }
}

fn vars_section(tree: &mut Value) -> Option<&mut Mapping> {
    if tree.is_null() {
        *tree = Value::Mapping(Mapping::new());
    }
    let root = tree.as_mapping_mut()?;
    let all = root
        .entry("all".into())
        .or_insert_with(|| Value::Mapping(Mapping::new()));
    if all.is_null() {
        *all = Value::Mapping(Mapping::new());
    }
    let vars = all
        .as_mapping_mut()?
        .entry("vars".into())
        .or_insert_with(|| Value::Mapping(Mapping::new()));
    if vars.is_null() {
        *vars = Value::Mapping(Mapping::new());
    }
    vars.as_mapping_mut()
}

/// File name of the topology materialized for `task_id` from `template`.
///
/// The stem is everything before the first `.` of the template's file name;
/// the extension is the template's, or `yml` when it has none.
///
/// ```
/// use std::path::Path;
/// use uuid::Uuid;
/// use vbench::topology::materialized_file_name;
///
/// let id = Uuid::nil();
/// assert_eq!(
///     materialized_file_name(Path::new("ansible/inventory.yml"), &id),
///     format!("inventory-{id}.yml"),
/// );
/// assert_eq!(
///     materialized_file_name(Path::new("inv_file"), &id),
///     format!("inv_file-{id}.yml"),
/// );
/// ```
pub fn materialized_file_name(template: &Path, task_id: &Uuid) -> String {
    let file_name = template
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = file_name.split('.').next().unwrap_or_default();
    let extension = template
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "yml".to_string());
    format!("{stem}-{task_id}.{extension}")
}

/// Reads and parses a topology document.
pub fn load(path: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(path).map_err(|e| BenchError::io(path, e))?;
    serde_yaml::from_str(&raw).map_err(|e| BenchError::Topology {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Serializes `tree` to `path`, replacing any existing file.
pub fn save(tree: &Value, path: &Path) -> Result<()> {
    let rendered = serde_yaml::to_string(tree).map_err(|e| BenchError::Topology {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    std::fs::write(path, rendered).map_err(|e| BenchError::io(path, e))
}
