//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use vbench::{
    BenchError, Collaborators, CommitResolver, ExecutionOutput, Notifier, ObjectStorage,
    Provisioner, RemoteExecutor, RemoteTransfer, ResolvedReference, ResourceHandle, Result,
    ResultStore, TaskReport,
};

pub const TEMPLATE: &str = r#"all:
  vars:
    cell: local
  children:
    vtgate:
      hosts:
        10.0.0.1:
          port: 15001
    vttablet:
      children:
        primary:
          hosts:
            10.0.0.2:
              mysql_port: 3306
            10.0.0.3:
              mysql_port: 3307
"#;

/// Writes [`TEMPLATE`] as `inventory.yml` under `dir` and returns its path.
pub fn write_template(dir: &Path) -> PathBuf {
    let path = dir.join("inventory.yml");
    std::fs::write(&path, TEMPLATE).unwrap();
    path
}

#[derive(Default)]
pub struct FakeProvisioner {
    calls: AtomicUsize,
    /// Zero-based provision calls that fail.
    pub fail_calls: Vec<usize>,
    pub provisioned: Mutex<Vec<String>>,
    pub released: Mutex<Vec<String>>,
}

impl FakeProvisioner {
    pub fn failing_on(calls: Vec<usize>) -> Self {
        Self {
            fail_calls: calls,
            ..Default::default()
        }
    }

    pub fn released(&self) -> Vec<String> {
        self.released.lock().unwrap().clone()
    }

    pub fn provisioned(&self) -> Vec<String> {
        self.provisioned.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    async fn provision(&self, _project_id: &str, hostname: &str) -> Result<ResourceHandle> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_calls.contains(&n) {
            return Err(BenchError::Provisioning {
                message: format!("device for {hostname} never became active"),
            });
        }
        let handle = ResourceHandle {
            provider_id: format!("dev-{n}"),
            network_address: format!("147.75.0.{}", n + 10),
        };
        self.provisioned
            .lock()
            .unwrap()
            .push(handle.provider_id.clone());
        Ok(handle)
    }

    async fn release(&self, provider_id: &str) -> Result<()> {
        self.released.lock().unwrap().push(provider_id.to_string());
        Ok(())
    }
}

pub struct FakeResolver {
    pub outcome: Option<ResolvedReference>,
    pub calls: AtomicUsize,
}

impl FakeResolver {
    pub fn commit(commit: &str) -> Self {
        Self {
            outcome: Some(ResolvedReference {
                commit: commit.to_string(),
                pull_request: None,
            }),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn pull_request(commit: &str, number: u64) -> Self {
        Self {
            outcome: Some(ResolvedReference {
                commit: commit.to_string(),
                pull_request: Some(number),
            }),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            outcome: None,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CommitResolver for FakeResolver {
    async fn resolve_reference(&self, reference: &str) -> Result<ResolvedReference> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome
            .clone()
            .ok_or_else(|| BenchError::ReferenceResolution {
                reference: reference.to_string(),
                message: "404 Not Found".to_string(),
            })
    }
}

/// Serves remote files from memory. Unknown paths fail like a missing file would.
#[derive(Default)]
pub struct FakeTransfer {
    pub files: HashMap<String, String>,
    pub fail_directories: bool,
    pub fetched: Mutex<Vec<(String, String)>>,
}

impl FakeTransfer {
    pub fn with_results(oltp: &str, tpcc: &str) -> Self {
        let mut files = HashMap::new();
        files.insert("/tmp/oltp.json".to_string(), oltp.to_string());
        files.insert("/tmp/tpcc.json".to_string(), tpcc.to_string());
        Self {
            files,
            ..Default::default()
        }
    }

    pub fn fetched(&self) -> Vec<(String, String)> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteTransfer for FakeTransfer {
    async fn transfer_file(&self, host: &str, remote_path: &str, local_path: &Path) -> Result<()> {
        self.fetched
            .lock()
            .unwrap()
            .push((host.to_string(), remote_path.to_string()));
        let content = self.files.get(remote_path).ok_or_else(|| BenchError::Transfer {
            host: host.to_string(),
            remote_path: remote_path.to_string(),
            message: "No such file or directory".to_string(),
        })?;
        std::fs::write(local_path, content).map_err(|e| BenchError::io(local_path, e))
    }

    async fn transfer_directory(
        &self,
        host: &str,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<()> {
        if self.fail_directories {
            return Err(BenchError::Transfer {
                host: host.to_string(),
                remote_path: remote_path.to_string(),
                message: "connection reset".to_string(),
            });
        }
        std::fs::create_dir_all(local_path).map_err(|e| BenchError::io(local_path, e))?;
        let profile = local_path.join("vtgate-cpu.pprof");
        std::fs::write(&profile, b"profile").map_err(|e| BenchError::io(&profile, e))
    }
}

#[derive(Debug, Clone)]
pub struct ExecutedScript {
    pub host: String,
    pub script: PathBuf,
    pub topology: PathBuf,
    /// Topology content as seen when the script ran.
    pub topology_content: String,
}

#[derive(Default)]
pub struct FakeExecutor {
    pub failing_scripts: Vec<String>,
    /// Cancels this token and then never returns.
    pub cancel_on_run: Option<CancellationToken>,
    pub runs: Mutex<Vec<ExecutedScript>>,
}

impl FakeExecutor {
    pub fn runs(&self) -> Vec<ExecutedScript> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteExecutor for FakeExecutor {
    async fn run_remote(
        &self,
        host: &str,
        script: &Path,
        topology: &Path,
    ) -> Result<ExecutionOutput> {
        let topology_content = std::fs::read_to_string(topology).unwrap_or_default();
        self.runs.lock().unwrap().push(ExecutedScript {
            host: host.to_string(),
            script: script.to_path_buf(),
            topology: topology.to_path_buf(),
            topology_content,
        });

        if let Some(token) = &self.cancel_on_run {
            token.cancel();
            std::future::pending::<()>().await;
        }

        let name = script
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.failing_scripts.contains(&name) {
            return Ok(ExecutionOutput {
                success: false,
                exit_code: Some(2),
                stdout: String::new(),
                stderr: "TASK [run benchmark]\nfatal: sysbench exited with 1\n".to_string(),
            });
        }
        Ok(ExecutionOutput {
            success: true,
            exit_code: Some(0),
            ..Default::default()
        })
    }
}

#[derive(Default)]
pub struct RecordingStore {
    pub stored: Mutex<Vec<(String, TaskReport)>>,
    pub fail: bool,
}

impl RecordingStore {
    pub fn stored(&self) -> Vec<(String, TaskReport)> {
        self.stored.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResultStore for RecordingStore {
    async fn store_report(&self, report: &TaskReport, table_name: &str) -> Result<()> {
        if self.fail {
            return Err(BenchError::Delivery {
                target: "result store".to_string(),
                message: "connection refused".to_string(),
            });
        }
        self.stored
            .lock()
            .unwrap()
            .push((table_name.to_string(), report.clone()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub notified: Mutex<Vec<(PathBuf, Option<String>)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, report_path: &Path, url: Option<&str>) -> Result<()> {
        self.notified
            .lock()
            .unwrap()
            .push((report_path.to_path_buf(), url.map(str::to_string)));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingStorage {
    pub uploaded: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl ObjectStorage for RecordingStorage {
    async fn upload_archive(&self, path: &Path) -> Result<Option<String>> {
        self.uploaded.lock().unwrap().push(path.to_path_buf());
        let key = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Some(format!("https://bench.s3.amazonaws.com/{key}")))
    }
}

/// Handles on every fake wired into a [`Collaborators`] set.
pub struct Fakes {
    pub provisioner: Arc<FakeProvisioner>,
    pub resolver: Arc<FakeResolver>,
    pub transfer: Arc<FakeTransfer>,
    pub executor: Arc<FakeExecutor>,
    pub store: Arc<RecordingStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub storage: Arc<RecordingStorage>,
}

impl Default for Fakes {
    fn default() -> Self {
        Self {
            provisioner: Arc::new(FakeProvisioner::default()),
            resolver: Arc::new(FakeResolver::commit("a1b2c3d4")),
            transfer: Arc::new(FakeTransfer::with_results(
                r#"[{"tps": 1523.4, "qps": {"total": 30468.2}}]"#,
                r#"[{"tps": 812.9}]"#,
            )),
            executor: Arc::new(FakeExecutor::default()),
            store: Arc::new(RecordingStore::default()),
            notifier: Arc::new(RecordingNotifier::default()),
            storage: Arc::new(RecordingStorage::default()),
        }
    }
}

impl Fakes {
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            provisioner: self.provisioner.clone(),
            resolver: self.resolver.clone(),
            transfer: self.transfer.clone(),
            executor: self.executor.clone(),
            result_store: self.store.clone(),
            notifier: Some(self.notifier.clone()),
            storage: Some(self.storage.clone()),
        }
    }
}
