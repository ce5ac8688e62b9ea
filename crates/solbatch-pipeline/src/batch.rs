//! Corpus-to-scaffold batch coordination
//!
//! # Phases
//!
//! 1. **Bucketing**: every `.sol` file directly under the corpus directory is
//!    resolved to a release string and grouped with the files sharing it.
//!    The grouping is cached in a snapshot keyed by the corpus path.
//! 2. **Per bucket**, strictly one after another: lease the toolchain at the
//!    bucket's release, then extract and synthesize every file in the bucket
//!    through the job runner. A failed switch aborts only that bucket.
//!
//! Per-file failures are recorded in the checkpoint's failure map and never
//! stop the batch.

use crate::error::PipelineError;
use crate::snapshot::{self, Buckets};
use crate::toolchain::Toolchain;
use async_trait::async_trait;
use serde::Serialize;
use solbatch_extract::ContractExtractor;
use solbatch_jobs::{CancelSignal, CheckpointStore, JobRunner, Outcome, Worker};
use solbatch_scaffold::ProjectSynthesizer;
use solbatch_version::{SourceUnit, VersionTable};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Tunables for one batch
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Directory for checkpoints, snapshots and the report
    pub state_dir: PathBuf,
    /// Worker-pool width inside a bucket
    pub concurrency: usize,
    /// Recorded outcomes between checkpoint flushes
    pub flush_every: usize,
    /// Place every file in this release's bucket instead of resolving
    pub version_override: Option<String>,
    /// File names skipped during the scan
    pub ignored_files: Vec<String>,
    /// Clear recorded failures before starting
    pub retry_failed: bool,
    /// Success set to resume from instead of the corpus's own
    pub resume_from: Option<PathBuf>,
}

/// Result of bucketing a corpus
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bucketing {
    /// Release string to file names
    pub buckets: Buckets,
    /// Files left out of every bucket, with the reason
    pub unresolved: BTreeMap<String, String>,
}

/// Outcome of a whole batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Scaffolds written in this run
    pub succeeded: usize,
    /// Files that failed extraction or synthesis in this run
    pub failed: BTreeMap<String, String>,
    /// Files whose version could not be resolved
    pub unresolved: BTreeMap<String, String>,
    /// Buckets skipped because the toolchain switch failed
    pub aborted_buckets: BTreeMap<String, String>,
    /// Whether the batch stopped early on cancellation
    pub cancelled: bool,
    /// Accumulated failure map on disk
    pub failures_path: PathBuf,
}

/// `.sol` files directly under `corpus`, minus ignored names, sorted
///
/// # Errors
/// Returns `PipelineError` if `corpus` is not a readable directory.
pub fn scan_corpus(corpus: &Path, ignored: &[String]) -> Result<Vec<PathBuf>, PipelineError> {
    if !corpus.is_dir() {
        return Err(PipelineError::NotADirectory(corpus.to_path_buf()));
    }
    let mut sources = Vec::new();
    for entry in std::fs::read_dir(corpus).map_err(PipelineError::io("read", corpus))? {
        let path = entry.map_err(PipelineError::io("read", corpus))?.path();
        let is_source = path.is_file() && path.extension().is_some_and(|ext| ext == "sol");
        let is_ignored = path
            .file_name()
            .is_some_and(|name| ignored.iter().any(|i| name == i.as_str()));
        if is_ignored {
            tracing::debug!(file = %path.display(), "ignored");
        } else if is_source {
            sources.push(path);
        }
    }
    sources.sort();
    Ok(sources)
}

/// Group `sources` by resolved release
///
/// Unreadable files and files with malformed pragmas are left out of every
/// bucket and reported in `unresolved`. With `version_override` every file
/// goes into that bucket unread.
#[must_use]
pub fn bucket_sources(sources: &[PathBuf], table: &VersionTable, version_override: Option<&str>) -> Bucketing {
    let mut bucketing = Bucketing::default();
    for path in sources {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if let Some(release) = version_override {
            bucketing.buckets.entry(release.to_string()).or_default().push(name);
            continue;
        }

        let unit = match SourceUnit::load(path) {
            Ok(unit) => unit,
            Err(e) => {
                tracing::warn!(file = %name, error = %e, "unreadable source");
                bucketing.unresolved.insert(name, e.to_string());
                continue;
            }
        };
        match unit.resolve() {
            Ok(version) => {
                let release = table.release(version);
                tracing::debug!(file = %name, constraints = ?unit.constraints, %release, "resolved");
                bucketing.buckets.entry(release).or_default().push(name);
            }
            Err(e) => {
                tracing::warn!(file = %name, constraints = ?unit.constraints, error = %e, "unresolvable pragma");
                bucketing.unresolved.insert(name, e.to_string());
            }
        }
    }
    bucketing
}

/// Extracts and synthesizes one corpus file
struct ScaffoldWorker {
    extractor: ContractExtractor,
    synthesizer: ProjectSynthesizer,
    corpus: PathBuf,
    output: PathBuf,
    release: String,
}

#[async_trait]
impl Worker for ScaffoldWorker {
    async fn run(&self, item: &str, _slot: usize) -> Outcome {
        let source = self.corpus.join(item);
        let extraction = match self.extractor.extract(&source).await {
            Ok(extraction) => extraction,
            Err(e) => return Outcome::failed(e.to_string()),
        };
        self.synthesizer
            .synthesize(&source, &extraction, &self.release, &self.output)
            .await
            .map(|_| ())
            .into()
    }
}

/// Drives bucketing, toolchain switching and per-file scaffolding
#[derive(Debug)]
pub struct BatchCoordinator {
    extractor: ContractExtractor,
    synthesizer: ProjectSynthesizer,
    toolchain: Arc<Toolchain>,
    table: VersionTable,
    options: BatchOptions,
}

impl BatchCoordinator {
    /// Create a coordinator
    #[must_use]
    pub fn new(
        extractor: ContractExtractor,
        synthesizer: ProjectSynthesizer,
        toolchain: Arc<Toolchain>,
        table: VersionTable,
        options: BatchOptions,
    ) -> Self {
        Self {
            extractor,
            synthesizer,
            toolchain,
            table,
            options,
        }
    }

    /// Checkpoint store for `corpus`
    ///
    /// With `resume_from` set, successes are read from and written to that
    /// file; failures stay in the corpus's own failure map.
    #[must_use]
    pub fn checkpoint_store(&self, corpus: &Path) -> CheckpointStore {
        let store = CheckpointStore::new(
            &self.options.state_dir,
            &format!("trufflize_{}", snapshot::corpus_key(corpus)),
        );
        match &self.options.resume_from {
            Some(visited) => CheckpointStore::with_paths(visited.clone(), store.failed_path().to_path_buf()),
            None => store,
        }
    }

    /// Bucket `corpus`, reusing the cached snapshot when present
    ///
    /// # Errors
    /// Returns `PipelineError` if the corpus cannot be listed or the
    /// snapshot cannot be read or written.
    pub fn bucket(&self, corpus: &Path) -> Result<Bucketing, PipelineError> {
        if let Some(release) = &self.options.version_override {
            let sources = scan_corpus(corpus, &self.options.ignored_files)?;
            tracing::info!(%release, files = sources.len(), "version override; skipping resolution");
            return Ok(bucket_sources(&sources, &self.table, Some(release)));
        }

        let path = snapshot::snapshot_path(&self.options.state_dir, corpus);
        if let Some(buckets) = snapshot::load(&path)? {
            tracing::info!(snapshot = %path.display(), buckets = buckets.len(), "loaded bucket snapshot");
            return Ok(Bucketing {
                buckets,
                unresolved: BTreeMap::new(),
            });
        }

        let sources = scan_corpus(corpus, &self.options.ignored_files)?;
        let bucketing = bucket_sources(&sources, &self.table, None);
        snapshot::save(&path, &bucketing.buckets)?;
        tracing::info!(
            files = sources.len(),
            buckets = bucketing.buckets.len(),
            unresolved = bucketing.unresolved.len(),
            snapshot = %path.display(),
            "bucketed corpus"
        );
        Ok(bucketing)
    }

    /// Scaffold every file of `corpus` into `output`
    ///
    /// # Errors
    /// Returns `PipelineError` on corpus, snapshot or checkpoint I/O
    /// failure. Per-file and per-bucket failures are reported, not returned.
    pub async fn run(&self, corpus: &Path, output: &Path, cancel: CancelSignal) -> Result<BatchReport, PipelineError> {
        let bucketing = self.bucket(corpus)?;
        let store = self.checkpoint_store(corpus);
        let runner = JobRunner::new(store.clone(), self.options.concurrency)?
            .with_flush_every(self.options.flush_every);
        if self.options.retry_failed {
            runner.retry_failed()?;
        }

        let mut report = BatchReport {
            unresolved: bucketing.unresolved,
            failures_path: store.failed_path().to_path_buf(),
            ..BatchReport::default()
        };

        for (release, files) in bucketing.buckets {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let lease = match self.toolchain.lease(&release).await {
                Ok(lease) => lease,
                Err(e) => {
                    tracing::error!(%release, files = files.len(), error = %e, "toolchain switch failed; bucket aborted");
                    report.aborted_buckets.insert(release, e.to_string());
                    continue;
                }
            };

            tracing::info!(release = lease.version(), files = files.len(), "processing bucket");
            let worker = Arc::new(ScaffoldWorker {
                extractor: self.extractor.clone(),
                synthesizer: self.synthesizer.clone(),
                corpus: corpus.to_path_buf(),
                output: output.to_path_buf(),
                release: release.clone(),
            });
            let summary = runner.run_all(files, worker, cancel.clone()).await?;
            drop(lease);

            report.succeeded += summary.succeeded;
            report.failed.extend(summary.failures);
            if summary.cancelled {
                report.cancelled = true;
                break;
            }
        }

        let report_path = self
            .options
            .state_dir
            .join(format!("trufflize_{}_report.json", snapshot::corpus_key(corpus)));
        write_report(&report_path, &report)?;

        tracing::info!(
            succeeded = report.succeeded,
            failed = report.failed.len(),
            unresolved = report.unresolved.len(),
            aborted_buckets = report.aborted_buckets.len(),
            cancelled = report.cancelled,
            failures = %report.failures_path.display(),
            "batch finished"
        );
        Ok(report)
    }
}

fn write_report(path: &Path, report: &BatchReport) -> Result<(), PipelineError> {
    let bytes = serde_json::to_vec_pretty(report).map_err(|source| PipelineError::CorruptState {
        path: path.to_path_buf(),
        source,
    })?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(PipelineError::io("create", parent))?;
    }
    std::fs::write(path, bytes).map_err(PipelineError::io("write", path))
}

/// Open `path` with the configured viewer; failures are logged only
pub async fn open_failures(viewer: &[String], path: &Path) {
    let Some((program, args)) = viewer.split_first() else {
        tracing::warn!("no failure viewer configured");
        return;
    };
    let status = tokio::process::Command::new(program)
        .args(args)
        .arg(path)
        .status()
        .await;
    match status {
        Ok(status) if status.success() => {}
        Ok(status) => tracing::warn!(%program, %status, "failure viewer exited non-zero"),
        Err(e) => tracing::warn!(%program, error = %e, "cannot start failure viewer"),
    }
}
