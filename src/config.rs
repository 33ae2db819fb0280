//! TOML configuration for benchmark runs.
//!
//! A [`BenchConfig`] is loaded once, optionally overridden from the command
//! line, and then passed by reference to whatever needs it. Every section and
//! every key is optional; missing values take the defaults shown below.
//!
//! # Example TOML
//!
//! ```toml
//! [paths]
//! topology_dir = "./ansible"
//! topology_file = "inventory.yml"
//! scripts_dir = "./scripts"
//! reports_dir = "./reports"
//! ledger_file = "config-lock.json"
//! results_dir = "./results"
//!
//! [provisioning]
//! token = "..."
//! project_id = "..."
//! plan = "m2.xlarge.x86"
//! metro = "am"
//! operating_system = "centos_8"
//! poll_interval_secs = 2
//! poll_timeout_secs = 900
//!
//! [github]
//! repository = "vitessio/vitess"
//!
//! [slack]
//! token = "xoxb-..."
//! channel = "benchmark"
//!
//! [storage]
//! bucket = "arewefastyet"
//!
//! [execution]
//! timeout_secs = 14400
//! keep_devices = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{BenchError, Result};
use crate::ledger::DEFAULT_LEDGER_FILE;
use crate::polling::PollPolicy;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct BenchConfig {
    pub paths: PathsConfig,
    pub provisioning: ProvisioningConfig,
    pub github: GithubConfig,
    /// Notifications are disabled when this section is absent.
    pub slack: Option<SlackConfig>,
    pub storage: StorageConfig,
    pub execution: ExecutionConfig,
}

/// Local directories and files.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    pub topology_dir: PathBuf,
    /// Template file name, relative to `topology_dir`.
    pub topology_file: PathBuf,
    pub scripts_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub ledger_file: PathBuf,
    pub results_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            topology_dir: PathBuf::from("./ansible"),
            topology_file: PathBuf::from("inventory.yml"),
            scripts_dir: PathBuf::from("./scripts"),
            reports_dir: PathBuf::from("./reports"),
            ledger_file: PathBuf::from(DEFAULT_LEDGER_FILE),
            results_dir: PathBuf::from("./results"),
        }
    }
}

/// Bare-metal device provisioning.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    pub token: Option<String>,
    pub project_id: Option<String>,
    pub api_url: String,
    pub plan: String,
    pub metro: String,
    pub operating_system: String,
    pub poll_interval_secs: u64,
    pub poll_timeout_secs: u64,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            token: None,
            project_id: None,
            api_url: "https://api.equinix.com/metal/v1".to_string(),
            plan: "m2.xlarge.x86".to_string(),
            metro: "am".to_string(),
            operating_system: "centos_8".to_string(),
            poll_interval_secs: 2,
            poll_timeout_secs: 15 * 60,
        }
    }
}

impl std::fmt::Debug for ProvisioningConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisioningConfig")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("project_id", &self.project_id)
            .field("api_url", &self.api_url)
            .field("plan", &self.plan)
            .field("metro", &self.metro)
            .field("operating_system", &self.operating_system)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .finish()
    }
}

impl ProvisioningConfig {
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(
            Duration::from_secs(self.poll_interval_secs),
            Duration::from_secs(self.poll_timeout_secs),
        )
    }

    /// Returns `(token, project_id)`, or a config error naming what is missing.
    pub fn credentials(&self) -> Result<(&str, &str)> {
        let token = non_empty(self.token.as_deref()).ok_or_else(|| BenchError::Config {
            message: "provisioning.token is not set".to_string(),
        })?;
        let project = non_empty(self.project_id.as_deref()).ok_or_else(|| BenchError::Config {
            message: "provisioning.project_id is not set".to_string(),
        })?;
        Ok((token, project))
    }
}

/// Source-control lookups.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GithubConfig {
    pub repository: String,
    pub api_url: String,
    pub token: Option<String>,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            repository: "vitessio/vitess".to_string(),
            api_url: "https://api.github.com".to_string(),
            token: None,
        }
    }
}

impl std::fmt::Debug for GithubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubConfig")
            .field("repository", &self.repository)
            .field("api_url", &self.api_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Clone, Deserialize, Serialize)]
pub struct SlackConfig {
    pub token: String,
    pub channel: String,
    #[serde(default = "default_slack_api_url")]
    pub api_url: String,
}

fn default_slack_api_url() -> String {
    "https://slack.com/api".to_string()
}

impl std::fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackConfig")
            .field("channel", &self.channel)
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

/// Archive upload target.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub bucket: String,
    pub region: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: "arewefastyet".to_string(),
            region: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Upper bound on a single workload run.
    pub timeout_secs: u64,
    /// Leave devices running after their task ends.
    pub keep_devices: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 4 * 60 * 60,
            keep_devices: false,
        }
    }
}

impl ExecutionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl BenchConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| BenchError::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BenchError::io(path, e))?;
        Self::from_toml(&content)
    }

    /// Full path of the topology template.
    pub fn topology_path(&self) -> PathBuf {
        self.paths.topology_dir.join(&self.paths.topology_file)
    }

    pub fn validate(&self) -> Result<()> {
        let p = &self.provisioning;
        if p.poll_interval_secs == 0 {
            return Err(BenchError::Config {
                message: "provisioning.poll_interval_secs must be greater than 0".to_string(),
            });
        }
        if p.poll_timeout_secs < p.poll_interval_secs {
            return Err(BenchError::Config {
                message: "provisioning.poll_timeout_secs must not be shorter than the poll interval"
                    .to_string(),
            });
        }
        if self.execution.timeout_secs == 0 {
            return Err(BenchError::Config {
                message: "execution.timeout_secs must be greater than 0".to_string(),
            });
        }
        if self.paths.topology_file.as_os_str().is_empty() {
            return Err(BenchError::Config {
                message: "paths.topology_file must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
