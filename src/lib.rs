//! Ephemeral-host macro benchmarks for Vitess.
//!
//! `vbench` provisions a dedicated bare-metal host per benchmark variant,
//! binds it into an Ansible topology, runs the OLTP or TPCC workload against
//! it, collects the structured results and publishes them.
//!
//! # Overview
//!
//! A run starts from a [`RunRequest`] (which variants, which commit, where to
//! write reports). The [`BenchmarkRunner`] builds one [`Task`] per variant
//! through the [`TaskFactory`] and drives each task through its
//! [`TaskStage`]s in order, one task at a time. Every provisioned device is
//! recorded in the [`StateLedger`] so leaked hosts can be found and released
//! later.
//!
//! External systems (bare-metal API, source control, file transfer, workload
//! execution, result store, notifications, object storage) are reached only
//! through the traits in [`collaborators`]; [`adapters`] holds the production
//! implementations.
//!
//! # Module Organization
//!
//! - [`task`] - Task lifecycle state machine and collected reports
//! - [`runner`] - Sequential orchestration and run summaries
//! - [`topology`] - Topology template engine
//! - [`ledger`] - On-disk record of provisioned devices
//! - [`config`] - TOML configuration
//! - [`adapters`] - HTTP, process and storage backed collaborators

pub mod adapters;
pub mod archive;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod factory;
pub mod ledger;
pub mod polling;
pub mod profiling;
pub mod request;
pub mod runner;
pub mod task;
pub mod topology;
pub mod variant;

pub use collaborators::{
    Collaborators, CommitResolver, ExecutionOutput, Notifier, ObjectStorage, Provisioner,
    RemoteExecutor, RemoteTransfer, ResolvedReference, ResourceHandle, ResultStore,
};
pub use config::BenchConfig;
pub use error::{BenchError, Result, TaskFailure};
pub use factory::TaskFactory;
pub use ledger::{LedgerEntry, StateLedger};
pub use polling::PollPolicy;
pub use profiling::ProfilingOptions;
pub use request::RunRequest;
pub use runner::{BenchmarkRunner, RunStatus, RunSummary, RunnerSettings, TaskOutcome, TaskResult};
pub use task::{ArchiveOutcome, Task, TaskReport, TaskStage};
pub use variant::Variant;
