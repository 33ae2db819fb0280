use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use vbench::{BenchConfig, StateLedger};

#[derive(Debug, Subcommand)]
pub enum LedgerCommand {
    /// List every device recorded in the ledger
    List {
        /// Print raw JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

impl LedgerCommand {
    pub fn execute(self, config: &BenchConfig) -> Result<()> {
        match self {
            LedgerCommand::List { json } => list(config, json),
        }
    }
}

fn list(config: &BenchConfig, json: bool) -> Result<()> {
    let ledger = StateLedger::new(&config.paths.ledger_file);
    let entries = ledger.load()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No devices recorded in {}", ledger.path().display());
        return Ok(());
    }

    println!(
        "{:<6} {:<36} {:<16} {:<38} {}",
        "TASK".bold(),
        "RUN ID".bold(),
        "ADDRESS".bold(),
        "DEVICE".bold(),
        "COMMIT".bold()
    );
    for entry in &entries {
        println!(
            "{:<6} {:<36} {:<16} {:<38} {}",
            entry.task_name, entry.run_id, entry.ip_address, entry.vps_id, entry.commit
        );
    }
    Ok(())
}
