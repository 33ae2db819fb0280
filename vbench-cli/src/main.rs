//! vbench: ephemeral-host macro benchmarks for Vitess.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use vbench::BenchConfig;

mod commands;

/// Run and manage Vitess macro benchmarks
#[derive(Parser)]
#[command(name = "vbench")]
#[command(about = "Run Vitess macro benchmarks on ephemeral hosts", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, env = "BCLI_CONFIG_FILE")]
    config_file: Option<PathBuf>,

    /// Verbose logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one or more benchmark variants against a commit or pull request
    Benchmark(commands::benchmark::BenchmarkCommand),

    /// Manage provisioned benchmark tasks
    Tasks {
        #[command(subcommand)]
        command: commands::tasks::TasksCommand,
    },

    /// Inspect the state ledger
    Ledger {
        #[command(subcommand)]
        command: commands::ledger::LedgerCommand,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match execute(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(1)
        },
    }
}

fn execute(cli: Cli) -> Result<ExitCode> {
    let config = load_config(cli.config_file.as_deref())?;
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;

    match cli.command {
        Commands::Benchmark(command) => runtime.block_on(command.execute(config)),
        Commands::Tasks { command } => {
            runtime.block_on(command.execute(&config))?;
            Ok(ExitCode::SUCCESS)
        },
        Commands::Ledger { command } => {
            command.execute(&config)?;
            Ok(ExitCode::SUCCESS)
        },
    }
}

fn load_config(path: Option<&Path>) -> Result<BenchConfig> {
    match path {
        Some(path) => BenchConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Ok(BenchConfig::default()),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
