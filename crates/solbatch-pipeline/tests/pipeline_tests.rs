//! End-to-end batch tests over an in-memory compiler and toolchain

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use solbatch_extract::ContractExtractor;
use solbatch_jobs::{CancelSignal, CancelToken, CheckpointStore};
use solbatch_pipeline::snapshot::corpus_key;
use solbatch_pipeline::{BatchCoordinator, BatchOptions, Toolchain, ToolchainError, ToolchainSwitch};
use solbatch_scaffold::{NetworkSettings, ProjectSynthesizer};
use solbatch_test_utils::{
    write_corpus, FakeCompiler, CROWDSALE_SOL, MALFORMED_PRAGMA_SOL, PINNED_SOL, TOKEN_SOL,
};
use solbatch_version::VersionTable;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct LoggingSwitch {
    activated: Mutex<Vec<String>>,
}

#[async_trait]
impl ToolchainSwitch for LoggingSwitch {
    async fn activate(&self, version: &str) -> Result<(), ToolchainError> {
        self.activated.lock().unwrap().push(version.to_string());
        Ok(())
    }

    async fn install(&self, _version: &str) -> Result<(), ToolchainError> {
        Ok(())
    }
}

struct Fixture {
    dir: tempfile::TempDir,
    corpus: PathBuf,
    output: PathBuf,
    compiler: Arc<FakeCompiler>,
    switch: Arc<LoggingSwitch>,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let corpus = dir.path().join("corpus");
        std::fs::create_dir(&corpus).unwrap();
        std::fs::write(dir.path().join("Migrations.json"), "{\"contractName\":\"Migrations\"}").unwrap();
        write_corpus(
            &corpus,
            &[
                ("Token.sol", TOKEN_SOL),
                ("Crowdsale.sol", CROWDSALE_SOL),
                ("Pinned.sol", PINNED_SOL),
                ("Odd.sol", MALFORMED_PRAGMA_SOL),
                ("Broken.sol", "pragma solidity ^0.4.24;\ncontract Broken {"),
            ],
        )
        .unwrap();
        let compiler = FakeCompiler::new()
            .with_contracts("Token.sol", &["SafeMath", "Token"])
            .with_contracts("Crowdsale.sol", &["Crowdsale"])
            .with_constructor("Pinned.sol", "Pinned", 1)
            .failing("Broken.sol");

        Self {
            output: dir.path().join("out"),
            corpus,
            compiler: Arc::new(compiler),
            switch: Arc::new(LoggingSwitch::default()),
            dir,
        }
    }

    fn state_dir(&self) -> PathBuf {
        self.dir.path().join("state")
    }

    fn coordinator(&self, version_override: Option<&str>) -> BatchCoordinator {
        self.coordinator_with(version_override, None)
    }

    fn coordinator_with(&self, version_override: Option<&str>, resume_from: Option<PathBuf>) -> BatchCoordinator {
        BatchCoordinator::new(
            ContractExtractor::new(self.compiler.clone()),
            ProjectSynthesizer::new(NetworkSettings::default(), self.dir.path().join("Migrations.json")),
            Arc::new(Toolchain::new(self.switch.clone())),
            VersionTable::default(),
            BatchOptions {
                state_dir: self.state_dir(),
                concurrency: 2,
                flush_every: 1,
                version_override: version_override.map(String::from),
                ignored_files: Vec::new(),
                retry_failed: false,
                resume_from,
            },
        )
    }

    fn activated(&self) -> Vec<String> {
        self.switch.activated.lock().unwrap().clone()
    }
}

fn project(output: &Path, name: &str) -> PathBuf {
    output.join(name)
}

#[tokio::test]
async fn batch_scaffolds_each_bucket_in_release_order() {
    let fx = Fixture::new();
    let report = fx
        .coordinator(None)
        .run(&fx.corpus, &fx.output, CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(fx.activated(), vec!["0.4.25", "0.4.26", "0.5.16"]);
    assert_eq!(report.succeeded, 2);
    assert_eq!(
        report.failed.keys().collect::<Vec<_>>(),
        ["Broken.sol", "Pinned.sol"]
    );
    assert_eq!(report.unresolved.keys().collect::<Vec<_>>(), ["Odd.sol"]);
    assert!(report.aborted_buckets.is_empty());
    assert!(!report.cancelled);

    let token_config = std::fs::read_to_string(project(&fx.output, "Token").join("truffle-config.js")).unwrap();
    assert!(token_config.contains("version: \"0.4.26\""));
    let crowdsale_config =
        std::fs::read_to_string(project(&fx.output, "Crowdsale").join("truffle-config.js")).unwrap();
    assert!(crowdsale_config.contains("version: \"0.5.16\""));
    assert!(!project(&fx.output, "Pinned").exists());

    let failures: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&report.failures_path).unwrap()).unwrap();
    assert!(failures["Pinned.sol"].is_string());
}

#[tokio::test]
async fn rerun_dispatches_nothing_already_settled() {
    let fx = Fixture::new();
    fx.coordinator(None)
        .run(&fx.corpus, &fx.output, CancelSignal::never())
        .await
        .unwrap();
    let calls_after_first = fx.compiler.calls().len();

    let report = fx
        .coordinator(None)
        .run(&fx.corpus, &fx.output, CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(report.succeeded, 0);
    assert!(report.failed.is_empty());
    assert!(report.unresolved.is_empty(), "snapshot holds only bucketed files");
    assert_eq!(fx.compiler.calls().len(), calls_after_first);
}

#[tokio::test]
async fn cancelled_batch_records_nothing() {
    let fx = Fixture::new();
    let (token, signal) = CancelToken::new();
    token.cancel();

    let report = fx.coordinator(None).run(&fx.corpus, &fx.output, signal).await.unwrap();

    assert!(report.cancelled);
    assert_eq!(report.succeeded, 0);
    assert!(fx.activated().is_empty());
    assert!(!fx.output.exists());
}

#[tokio::test]
async fn override_uses_one_bucket_and_no_snapshot() {
    let fx = Fixture::new();
    let report = fx
        .coordinator(Some("0.5.16"))
        .run(&fx.corpus, &fx.output, CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(fx.activated(), vec!["0.5.16"]);
    assert!(report.unresolved.is_empty());
    let snapshots: Vec<_> = std::fs::read_dir(fx.state_dir())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().ends_with("_project_versions.json"))
        .collect();
    assert!(snapshots.is_empty());

    let config = std::fs::read_to_string(project(&fx.output, "Token").join("truffle-config.js")).unwrap();
    assert!(config.contains("version: \"0.5.16\""));
}

#[tokio::test]
async fn resume_file_replaces_only_the_success_set() {
    let fx = Fixture::new();
    fx.coordinator(None)
        .run(&fx.corpus, &fx.output, CancelSignal::never())
        .await
        .unwrap();
    let calls_after_first = fx.compiler.calls().len();

    let default_store = fx.coordinator(None).checkpoint_store(&fx.corpus);
    let resume = fx.dir.path().join("resume.json");
    std::fs::rename(default_store.visited_path(), &resume).unwrap();

    let coordinator = fx.coordinator_with(None, Some(resume.clone()));
    let store = coordinator.checkpoint_store(&fx.corpus);
    assert_eq!(store.visited_path(), resume.as_path());
    assert_eq!(store.failed_path(), default_store.failed_path());

    let report = coordinator
        .run(&fx.corpus, &fx.output, CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(report.succeeded, 0);
    assert!(report.failed.is_empty());
    assert_eq!(fx.compiler.calls().len(), calls_after_first);
    assert_eq!(report.failures_path, default_store.failed_path());
    assert_eq!(
        report.failures_path,
        fx.state_dir()
            .join(format!("trufflize_{}_failed.json", corpus_key(&fx.corpus)))
    );
    assert!(!default_store.visited_path().exists());

    let checkpoint = store.load().unwrap();
    assert_eq!(
        checkpoint.succeeded.iter().map(String::as_str).collect::<Vec<_>>(),
        ["Crowdsale.sol", "Token.sol"]
    );
    assert_eq!(
        checkpoint.failed.keys().map(String::as_str).collect::<Vec<_>>(),
        ["Broken.sol", "Pinned.sol"]
    );
}
