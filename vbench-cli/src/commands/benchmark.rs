use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use vbench::adapters::{
    GithubResolver, JsonLinesResultStore, MetalProvisioner, ScpTransfer, ScriptExecutor,
    SlackNotifier,
};
use vbench::config::SlackConfig;
use vbench::{
    BenchConfig, BenchmarkRunner, Collaborators, Notifier, ObjectStorage, ProfilingOptions,
    RunRequest, RunStatus, RunSummary, TaskResult, Variant,
};

/// Exit code when only some tasks produced a report.
const EXIT_PARTIAL: u8 = 2;

#[derive(Debug, Args)]
pub struct BenchmarkCommand {
    /// Run every variant (OLTP then TPCC)
    #[arg(long)]
    run_all: bool,

    /// Run the OLTP variant
    #[arg(long = "run-oltp", visible_alias = "oltp")]
    oltp: bool,

    /// Run the TPCC variant
    #[arg(long = "run-tpcc", visible_alias = "tpcc")]
    tpcc: bool,

    /// Commit hash, branch name or pull request number to benchmark
    #[arg(short, long)]
    commit: String,

    /// Who or what triggered this run (recorded with every report)
    #[arg(short, long)]
    source: String,

    /// Profile components, e.g. "vtgate/cpu" or "vttablet/vtgate/mem"
    #[arg(long)]
    pprof: Option<ProfilingOptions>,

    /// Upload report archives to object storage
    #[arg(long)]
    upload: bool,

    /// Leave devices running after their task ends
    #[arg(long)]
    keep_devices: bool,

    /// Directory holding the topology template
    #[arg(long, env = "BCLI_ANSIBLE_DIR")]
    ansible_dir: Option<PathBuf>,

    /// Topology template file name, relative to the Ansible directory
    #[arg(long, env = "BCLI_INVENTORY_FILE")]
    inventory_file: Option<PathBuf>,

    /// Directory holding the run-oltp / run-tpcc scripts
    #[arg(long, env = "BCLI_TASKS_SCRIPTS_DIR")]
    tasks_scripts_dir: Option<PathBuf>,

    /// Directory receiving per-task reports
    #[arg(long, env = "BCLI_TASKS_REPORTS_DIR")]
    tasks_reports_dir: Option<PathBuf>,

    /// Bare-metal API token
    #[arg(long, env = "BCLI_PACKET_TOKEN", hide_env_values = true)]
    packet_token: Option<String>,

    /// Bare-metal project id
    #[arg(long, env = "BCLI_PACKET_PROJECT_ID")]
    packet_project_id: Option<String>,

    /// Slack API token
    #[arg(long, env = "BCLI_SLACK_TOKEN", hide_env_values = true)]
    slack_api_token: Option<String>,

    /// Slack channel receiving reports
    #[arg(long, env = "BCLI_SLACK_CHANNEL")]
    slack_channel: Option<String>,
}

impl BenchmarkCommand {
    fn variants(&self) -> Vec<Variant> {
        let mut variants = Vec::new();
        if self.oltp || self.run_all {
            variants.push(Variant::Oltp);
        }
        if self.tpcc || self.run_all {
            variants.push(Variant::Tpcc);
        }
        variants
    }

    /// Applies command-line values over the file configuration.
    fn apply_overrides(&self, config: &mut BenchConfig) {
        if let Some(dir) = &self.ansible_dir {
            config.paths.topology_dir = dir.clone();
        }
        if let Some(file) = &self.inventory_file {
            config.paths.topology_file = file.clone();
        }
        if let Some(dir) = &self.tasks_scripts_dir {
            config.paths.scripts_dir = dir.clone();
        }
        if let Some(dir) = &self.tasks_reports_dir {
            config.paths.reports_dir = dir.clone();
        }
        if let Some(token) = &self.packet_token {
            config.provisioning.token = Some(token.clone());
        }
        if let Some(project) = &self.packet_project_id {
            config.provisioning.project_id = Some(project.clone());
        }
        if let (Some(token), Some(channel)) = (&self.slack_api_token, &self.slack_channel) {
            let api_url = config
                .slack
                .as_ref()
                .map(|s| s.api_url.clone())
                .unwrap_or_else(|| "https://slack.com/api".to_string());
            config.slack = Some(SlackConfig {
                token: token.clone(),
                channel: channel.clone(),
                api_url,
            });
        }
        if self.keep_devices {
            config.execution.keep_devices = true;
        }
    }

    pub async fn execute(self, mut config: BenchConfig) -> Result<ExitCode> {
        self.apply_overrides(&mut config);
        config.validate()?;

        let variants = self.variants();
        if variants.is_empty() {
            bail!("No benchmark selected: pass --run-all, --run-oltp or --run-tpcc");
        }

        let request = RunRequest::new(
            variants,
            &self.commit,
            &self.source,
            &config.paths.reports_dir,
            config.topology_path(),
        )?
        .with_profiling(self.pprof.clone());

        let collaborators = build_collaborators(&config, self.upload).await?;
        let runner = BenchmarkRunner::new(&config, collaborators);

        let cancel = CancellationToken::new();
        let ctrl_c = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, finishing current step and releasing devices");
                ctrl_c.cancel();
            }
        });

        let summary = runner
            .run(&request, &cancel)
            .await
            .context("Benchmark run could not start")?;
        print_summary(&summary);

        Ok(match summary.status() {
            RunStatus::Succeeded => ExitCode::SUCCESS,
            RunStatus::PartiallySucceeded | RunStatus::NoData => ExitCode::from(EXIT_PARTIAL),
            RunStatus::Failed => ExitCode::from(1),
        })
    }
}

async fn build_collaborators(config: &BenchConfig, upload: bool) -> Result<Collaborators> {
    config
        .provisioning
        .credentials()
        .context("Bare-metal provisioning is not configured")?;
    let provisioner = MetalProvisioner::from_config(&config.provisioning)
        .context("Bare-metal provisioning is not configured")?;

    let notifier = config
        .slack
        .as_ref()
        .map(|slack| Arc::new(SlackNotifier::from_config(slack)) as Arc<dyn Notifier>);

    Ok(Collaborators {
        provisioner: Arc::new(provisioner),
        resolver: Arc::new(GithubResolver::from_config(&config.github)),
        transfer: Arc::new(ScpTransfer::new()),
        executor: Arc::new(ScriptExecutor::new(config.execution.timeout())),
        result_store: Arc::new(JsonLinesResultStore::new(&config.paths.results_dir)),
        notifier,
        storage: object_storage(config, upload).await?,
    })
}

#[cfg(feature = "s3")]
async fn object_storage(config: &BenchConfig, upload: bool) -> Result<Option<Arc<dyn ObjectStorage>>> {
    if !upload {
        return Ok(None);
    }
    let storage = vbench::adapters::S3Storage::from_config(&config.storage).await;
    Ok(Some(Arc::new(storage)))
}

#[cfg(not(feature = "s3"))]
async fn object_storage(_config: &BenchConfig, upload: bool) -> Result<Option<Arc<dyn ObjectStorage>>> {
    if upload {
        bail!("--upload requires vbench-cli to be built with the `s3` feature");
    }
    Ok(None)
}

fn print_summary(summary: &RunSummary) {
    println!();
    for outcome in &summary.outcomes {
        let id = outcome.task_id.to_string();
        let line = match &outcome.result {
            TaskResult::Reported {
                report_path,
                archive_url,
            } => {
                let mut line = format!(
                    "{} {} {} report: {}",
                    "✓".green(),
                    outcome.variant,
                    id,
                    report_path.display()
                );
                if let Some(url) = archive_url {
                    line.push_str(&format!(" archive: {url}"));
                }
                line
            },
            TaskResult::NoData => {
                format!("{} {} {} produced no data", "-".yellow(), outcome.variant, id)
            },
            TaskResult::Failed(failure) => {
                format!("{} {} {} {}", "✗".red(), outcome.variant, id, failure.source)
            },
            TaskResult::Skipped => format!("{} {} skipped", "-".dimmed(), outcome.variant),
        };
        println!("{line}");
        for warning in &outcome.warnings {
            println!("    {} {warning}", "warning:".yellow());
        }
    }

    let status = summary.status();
    let text = status.to_string();
    let rendered = match status {
        RunStatus::Succeeded => text.as_str().green().bold(),
        RunStatus::PartiallySucceeded | RunStatus::NoData => text.as_str().yellow().bold(),
        RunStatus::Failed => text.as_str().red().bold(),
    };
    println!();
    println!("Run {rendered}");
}
