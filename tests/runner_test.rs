//! End-to-end runs of the `BenchmarkRunner` against in-memory collaborators.

mod common;

use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use common::{write_template, FakeExecutor, FakeProvisioner, FakeTransfer, Fakes, RecordingStore};
use vbench::{
    BenchError, BenchmarkRunner, LedgerEntry, RunRequest, RunStatus, RunnerSettings, StateLedger,
    TaskResult, TaskStage, Variant,
};

struct Harness {
    _dir: tempfile::TempDir,
    root: PathBuf,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        write_template(&root);
        Self { _dir: dir, root }
    }

    fn ledger(&self) -> StateLedger {
        StateLedger::new(self.root.join("config-lock.json"))
    }

    fn request(&self, variants: Vec<Variant>) -> RunRequest {
        RunRequest::new(
            variants,
            "HEAD",
            "integration",
            self.root.join("reports"),
            self.root.join("inventory.yml"),
        )
        .unwrap()
    }

    fn runner(&self, fakes: &Fakes, keep_devices: bool) -> BenchmarkRunner {
        let settings = RunnerSettings {
            project_id: "project".to_string(),
            scripts_dir: self.root.join("scripts"),
            keep_devices,
        };
        BenchmarkRunner::with_settings(settings, self.ledger(), fakes.collaborators())
    }

    fn build_dir_entries(&self) -> usize {
        std::fs::read_dir(self.root.join("build")).unwrap().count()
    }
}

#[tokio::test]
async fn test_run_all_executes_oltp_then_tpcc() {
    let harness = Harness::new();
    let fakes = Fakes::default();
    let runner = harness.runner(&fakes, false);

    let summary = runner
        .run(
            &harness.request(Variant::ALL.to_vec()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(summary.status(), RunStatus::Succeeded);
    assert!(!summary.cancelled);
    assert!(!summary.aborted);
    assert_eq!(summary.outcomes.len(), 2);

    let variants: Vec<Variant> = summary.outcomes.iter().map(|o| o.variant).collect();
    assert_eq!(variants, vec![Variant::Oltp, Variant::Tpcc]);
    assert_ne!(summary.outcomes[0].task_id, summary.outcomes[1].task_id);

    for outcome in &summary.outcomes {
        assert_eq!(outcome.final_stage, TaskStage::Done);
        assert!(outcome.released);
        assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);
        match &outcome.result {
            TaskResult::Reported {
                report_path,
                archive_url,
            } => {
                assert!(report_path.is_file());
                assert!(report_path.starts_with(harness.root.join("reports")));
                let dir_name = report_path
                    .parent()
                    .and_then(|p| p.file_name())
                    .unwrap()
                    .to_string_lossy()
                    .into_owned();
                assert!(dir_name.starts_with(outcome.variant.name()));
                assert!(archive_url.as_deref().unwrap().ends_with(".zip"));
            },
            other => panic!("unexpected result: {other:?}"),
        }
    }

    let scripts: Vec<String> = fakes
        .executor
        .runs()
        .iter()
        .map(|r| r.script.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(scripts, vec!["run-oltp", "run-tpcc"]);
    let runs = fakes.executor.runs();
    assert_ne!(runs[0].host, runs[1].host);
    assert_ne!(runs[0].topology, runs[1].topology);
    assert!(runs[0].topology_content.contains(&runs[0].host));
    assert!(!runs[0].topology_content.contains("10.0.0.1"));

    // Released devices are dropped from the ledger again.
    assert!(runner.ledger().load().unwrap().is_empty());

    let tables: Vec<String> = fakes.store.stored().into_iter().map(|(t, _)| t).collect();
    assert_eq!(tables, vec!["OLTP", "TPCC"]);
    assert_eq!(fakes.notifier.notified.lock().unwrap().len(), 2);
    assert_eq!(fakes.storage.uploaded.lock().unwrap().len(), 2);
    assert_eq!(fakes.provisioner.released(), vec!["dev-0", "dev-1"]);
    assert_eq!(harness.build_dir_entries(), 0);
}

#[tokio::test]
async fn test_failed_provisioning_does_not_stop_the_queue() {
    let harness = Harness::new();
    let fakes = Fakes {
        provisioner: Arc::new(FakeProvisioner::failing_on(vec![0])),
        ..Fakes::default()
    };
    let runner = harness.runner(&fakes, false);

    let summary = runner
        .run(
            &harness.request(Variant::ALL.to_vec()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(summary.status(), RunStatus::PartiallySucceeded);
    let failure = summary.failures().next().unwrap();
    assert_eq!(failure.variant, Variant::Oltp);
    assert_eq!(failure.stage, TaskStage::DeviceProvisioned);
    assert!(matches!(failure.source, BenchError::Provisioning { .. }));

    assert!(!summary.outcomes[0].released);
    assert_eq!(summary.outcomes[0].final_stage, TaskStage::Created);
    assert!(summary.outcomes[1].is_reported());

    assert_eq!(fakes.provisioner.released(), vec!["dev-1"]);
    assert!(runner.ledger().load().unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_workload_still_releases_device() {
    let harness = Harness::new();
    let fakes = Fakes {
        executor: Arc::new(FakeExecutor {
            failing_scripts: vec!["run-oltp".to_string()],
            ..Default::default()
        }),
        ..Fakes::default()
    };
    let runner = harness.runner(&fakes, false);

    let summary = runner
        .run(&harness.request(vec![Variant::Oltp]), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.status(), RunStatus::Failed);
    let outcome = &summary.outcomes[0];
    assert_eq!(outcome.final_stage, TaskStage::TopologyBuilt);
    assert!(outcome.released);
    assert_eq!(fakes.provisioner.released(), vec!["dev-0"]);
    assert!(fakes.store.stored().is_empty());
    assert_eq!(harness.build_dir_entries(), 0);
    assert!(runner.ledger().load().unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_results_are_no_data() {
    let harness = Harness::new();
    let fakes = Fakes {
        transfer: Arc::new(FakeTransfer::with_results("[]", "[]")),
        ..Fakes::default()
    };
    let runner = harness.runner(&fakes, false);

    let summary = runner
        .run(
            &harness.request(Variant::ALL.to_vec()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(summary.status(), RunStatus::NoData);
    assert!(summary
        .outcomes
        .iter()
        .all(|o| matches!(o.result, TaskResult::NoData) && o.final_stage == TaskStage::Done));
    assert!(fakes.store.stored().is_empty());
    assert!(fakes.notifier.notified.lock().unwrap().is_empty());
    assert_eq!(fakes.provisioner.released().len(), 2);
}

#[tokio::test]
async fn test_cancellation_during_workload_releases_and_skips_the_rest() {
    let harness = Harness::new();
    let cancel = CancellationToken::new();
    let fakes = Fakes {
        executor: Arc::new(FakeExecutor {
            cancel_on_run: Some(cancel.clone()),
            ..Default::default()
        }),
        ..Fakes::default()
    };
    let runner = harness.runner(&fakes, false);

    let summary = runner
        .run(&harness.request(Variant::ALL.to_vec()), &cancel)
        .await
        .unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.status(), RunStatus::Failed);

    let first = &summary.outcomes[0];
    match &first.result {
        TaskResult::Failed(failure) => assert!(matches!(
            failure.source,
            BenchError::Cancelled {
                stage: TaskStage::Executed
            }
        )),
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(first.released);
    assert!(matches!(summary.outcomes[1].result, TaskResult::Skipped));
    assert!(!summary.outcomes[1].released);

    assert_eq!(fakes.provisioner.provisioned(), vec!["dev-0"]);
    assert_eq!(fakes.provisioner.released(), vec!["dev-0"]);
}

#[tokio::test]
async fn test_cancelled_before_start_provisions_nothing() {
    let harness = Harness::new();
    let fakes = Fakes::default();
    let runner = harness.runner(&fakes, false);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = runner
        .run(&harness.request(Variant::ALL.to_vec()), &cancel)
        .await
        .unwrap();

    assert!(summary.cancelled);
    assert!(summary
        .outcomes
        .iter()
        .all(|o| matches!(o.result, TaskResult::Skipped)));
    assert!(fakes.provisioner.provisioned().is_empty());
    assert!(runner.ledger().load().unwrap().is_empty());
}

#[tokio::test]
async fn test_keep_devices_skips_release() {
    let harness = Harness::new();
    let fakes = Fakes::default();
    let runner = harness.runner(&fakes, true);

    let summary = runner
        .run(&harness.request(vec![Variant::Tpcc]), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.status(), RunStatus::Succeeded);
    assert!(!summary.outcomes[0].released);
    assert!(fakes.provisioner.released().is_empty());
    let entries = runner.ledger().load().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].run_id, summary.outcomes[0].task_id.to_string());
    assert_eq!(entries[0].vps_id, "dev-0");
}

#[tokio::test]
async fn test_release_drops_only_its_own_ledger_entry() {
    let harness = Harness::new();
    let ledger = harness.ledger();
    let leaked = LedgerEntry {
        task_name: "tpcc".to_string(),
        run_id: "earlier-run".to_string(),
        source: "integration".to_string(),
        commit: "abc123".to_string(),
        vps_id: "dev-leaked".to_string(),
        ip_address: "147.75.0.99".to_string(),
        inventory_file: "inventory.yml".to_string(),
    };
    ledger.append(leaked.clone()).unwrap();

    let fakes = Fakes::default();
    let runner = harness.runner(&fakes, false);
    let summary = runner
        .run(&harness.request(vec![Variant::Oltp]), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.status(), RunStatus::Succeeded);
    assert!(summary.outcomes[0].released);
    assert!(summary.outcomes[0].warnings.is_empty());
    assert_eq!(ledger.load().unwrap(), vec![leaked]);
}

#[tokio::test]
async fn test_corrupt_ledger_aborts_the_run() {
    let harness = Harness::new();
    let ledger_path = harness.root.join("config-lock.json");
    std::fs::write(&ledger_path, "{ not json").unwrap();

    let fakes = Fakes::default();
    let runner = harness.runner(&fakes, false);
    let summary = runner
        .run(
            &harness.request(Variant::ALL.to_vec()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(summary.aborted);
    assert_eq!(summary.status(), RunStatus::Failed);
    let failure = summary.failures().next().unwrap();
    assert_eq!(failure.stage, TaskStage::DeviceProvisioned);
    assert!(matches!(failure.source, BenchError::LedgerCorruption { .. }));
    assert!(matches!(summary.outcomes[1].result, TaskResult::Skipped));

    // The device came up before the append failed and must not leak.
    assert_eq!(fakes.provisioner.released(), vec!["dev-0"]);
    assert_eq!(
        std::fs::read_to_string(&ledger_path).unwrap(),
        "{ not json"
    );
}

#[tokio::test]
async fn test_delivery_failures_are_warnings() {
    let harness = Harness::new();
    let fakes = Fakes {
        store: Arc::new(RecordingStore {
            fail: true,
            ..Default::default()
        }),
        ..Fakes::default()
    };
    let runner = harness.runner(&fakes, false);

    let summary = runner
        .run(&harness.request(vec![Variant::Oltp]), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.status(), RunStatus::Succeeded);
    let outcome = &summary.outcomes[0];
    assert_eq!(outcome.final_stage, TaskStage::Done);
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].category(), "delivery");
    assert_eq!(fakes.notifier.notified.lock().unwrap().len(), 1);
}
