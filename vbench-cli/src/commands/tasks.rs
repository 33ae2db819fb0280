use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use vbench::adapters::MetalProvisioner;
use vbench::{BenchConfig, Provisioner, StateLedger};

#[derive(Debug, Subcommand)]
pub enum TasksCommand {
    /// Release the device of a run and drop it from the ledger
    Delete {
        /// Run id, as printed by `vbench ledger list`
        run_id: String,

        /// Bare-metal API token
        #[arg(long, env = "BCLI_PACKET_TOKEN", hide_env_values = true)]
        packet_token: Option<String>,
    },
}

impl TasksCommand {
    pub async fn execute(self, config: &BenchConfig) -> Result<()> {
        match self {
            TasksCommand::Delete {
                run_id,
                packet_token,
            } => delete(config, &run_id, packet_token).await,
        }
    }
}

async fn delete(config: &BenchConfig, run_id: &str, packet_token: Option<String>) -> Result<()> {
    let ledger = StateLedger::new(&config.paths.ledger_file);
    let entry = ledger
        .load()?
        .into_iter()
        .find(|e| e.run_id == run_id)
        .with_context(|| {
            format!(
                "No ledger entry for run {run_id} in {}",
                ledger.path().display()
            )
        })?;

    let mut provisioning = config.provisioning.clone();
    if packet_token.is_some() {
        provisioning.token = packet_token;
    }
    let provisioner = MetalProvisioner::from_config(&provisioning)
        .context("Bare-metal provisioning is not configured")?;

    provisioner
        .release(&entry.vps_id)
        .await
        .with_context(|| format!("Failed to release device {}", entry.vps_id))?;
    ledger.remove_async(run_id).await?;

    println!(
        "{} Released device {} ({}) of {} run {}",
        "✓".green(),
        entry.vps_id,
        entry.ip_address,
        entry.task_name,
        run_id
    );
    Ok(())
}
