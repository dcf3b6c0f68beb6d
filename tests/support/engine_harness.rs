#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use phasegate::config::{Config, NonBlockingFailure};
use phasegate::contract::ContractParser;
use phasegate::evidence::EvidenceStore;
use phasegate::gates::{GateEngine, GateRegistry};
use phasegate::observability::NoopObserver;
use phasegate::plan::Plan;
use phasegate::report::ExecutionReport;
use phasegate::runner::CommandRunner;
use phasegate::scheduler::{Scheduler, SchedulerOptions};

/// A throwaway state dir plus a scheduler wired to real processes.
pub struct EngineHarness {
    pub dir: TempDir,
    pub evidence: Arc<EvidenceStore>,
    config: Config,
    max_workers: usize,
}

impl EngineHarness {
    pub fn new(max_workers: usize) -> Self {
        let dir = TempDir::new().expect("tempdir");
        let mut config = Config::default();
        config.storage.state_dir = dir.path().to_string_lossy().into_owned();
        config.runner.kill_grace_ms = 200;
        let evidence = Arc::new(EvidenceStore::new(config.storage.evidence_dir()));
        Self {
            dir,
            evidence,
            config,
            max_workers,
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_contract(&self, name: &str, text: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, text).expect("write contract");
        path
    }

    pub fn plan(&self, path: &Path) -> Plan {
        Plan::from_contract(ContractParser::parse_file(path).expect("valid contract"))
    }

    fn scheduler(&self) -> Scheduler {
        Scheduler::new(
            Arc::new(CommandRunner::new(
                self.evidence.clone(),
                self.config.runner.clone(),
            )),
            GateEngine::new(Arc::new(GateRegistry::with_builtins()), &self.config.gates),
            Arc::new(NoopObserver),
            SchedulerOptions {
                max_workers: self.max_workers,
                non_blocking_failure: NonBlockingFailure::Record,
                workdir: self.dir.path().to_path_buf(),
            },
        )
    }

    pub async fn run(&self, path: &Path) -> ExecutionReport {
        let plan = self.plan(path);
        self.scheduler().run(&plan, CancellationToken::new()).await
    }

    pub fn stdout_of(&self, report: &ExecutionReport, task_id: &str) -> String {
        let task = report.task(task_id).expect("task in report");
        let digest = task.stdout_digest.as_ref().expect("stdout digest");
        String::from_utf8(self.evidence.get(digest).expect("blob")).expect("utf8")
    }
}
