//! Candidate ingestion orchestration: batch scheduling, per-file retry and the
//! run report.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use candor_adapters::{
    build_correlation_index, decode_json, extract_candidate_id_from_path, locate_sources,
    CorrelationIndex, CorrelationStats, DecodeError, IdentityError, LocateError, SourceDirs,
    SourceKind,
};
use candor_core::CandidateId;
use candor_storage::{upsert_by_email, CandidateStore, StoreError, UpsertOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub mod normalize;

pub use normalize::{normalize_candidate, NormalizeError};

pub const CRATE_NAME: &str = "candor-sync";

pub const DEFAULT_CONCURRENCY: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

/// Fixed-delay retry of a whole single-file pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Everything that can fail a single profile file.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("reading {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Malformed(#[from] DecodeError),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),
}

impl IngestError {
    /// Identifier extraction depends only on the filename, so retrying cannot help.
    pub fn disposition(&self) -> RetryDisposition {
        match self {
            IngestError::Identity(_) => RetryDisposition::NonRetryable,
            _ => RetryDisposition::Retryable,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub dirs: SourceDirs,
    /// Files in flight at once; batches run one after another.
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

impl IngestConfig {
    pub fn new(dirs: SourceDirs) -> Self {
        Self {
            dirs,
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryPolicy::default(),
        }
    }
}

/// File-backed settings (YAML). Every field is optional so command-line flags
/// can fill or override them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IngestSettings {
    pub profile_dir: Option<PathBuf>,
    pub summary_dir: Option<PathBuf>,
    pub linkedin_dir: Option<PathBuf>,
    pub github_dir: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub database_url: Option<String>,
}

impl IngestSettings {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("parsing ingest settings")
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn to_config(&self) -> Result<IngestConfig> {
        let profile_dir = self
            .profile_dir
            .clone()
            .context("profile_dir is required (settings file or --profile-dir)")?;
        let defaults = RetryPolicy::default();
        Ok(IngestConfig {
            dirs: SourceDirs {
                profile_dir,
                summary_dir: self.summary_dir.clone(),
                linkedin_dir: self.linkedin_dir.clone(),
                github_dir: self.github_dir.clone(),
            },
            concurrency: self.concurrency.unwrap_or(DEFAULT_CONCURRENCY).max(1),
            retry: RetryPolicy {
                max_retries: self.max_retries.unwrap_or(defaults.max_retries),
                delay: self
                    .retry_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.delay),
            },
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Discovering,
    Correlating,
    Processing,
    Reporting,
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResult {
    pub file: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
    pub candidate_id: Option<CandidateId>,
    pub email: Option<String>,
    pub outcome: Option<UpsertOutcome>,
    pub content_sha256: Option<String>,
}

impl FileResult {
    fn failed(
        file: String,
        candidate_id: Option<CandidateId>,
        attempts: u32,
        error: String,
    ) -> Self {
        Self {
            file,
            success: false,
            error: Some(error),
            attempts,
            candidate_id,
            email: None,
            outcome: None,
            content_sha256: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub total_files: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<FileResult>,
    pub correlation: BTreeMap<SourceKind, CorrelationStats>,
}

impl RunReport {
    /// `(file, error)` for every failed file.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.results
            .iter()
            .filter(|r| !r.success)
            .map(|r| (r.file.as_str(), r.error.as_deref().unwrap_or("unknown error")))
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

struct Ingested {
    email: String,
    outcome: UpsertOutcome,
    content_sha256: String,
}

#[derive(Clone)]
struct FileJob {
    path: PathBuf,
    index: Arc<CorrelationIndex>,
    store: Arc<dyn CandidateStore>,
    retry: RetryPolicy,
}

impl FileJob {
    async fn run(self) -> FileResult {
        let file = self.path.display().to_string();
        let candidate_id = match extract_candidate_id_from_path(&self.path) {
            Ok(id) => id,
            Err(err) => {
                let err = IngestError::from(err);
                warn!(error = %err, "no candidate identifier in filename; not retrying");
                return FileResult::failed(file, None, 1, err.to_string());
            }
        };

        let max_attempts = self.retry.max_attempts();
        let mut last_error = None;
        for attempt in 1..=max_attempts {
            if attempt > 1 {
                tokio::time::sleep(self.retry.delay).await;
                info!(attempt, max_attempts, "retrying file");
            }
            match self.ingest_once(&candidate_id).await {
                Ok(done) => {
                    info!(
                        candidate_id = %candidate_id,
                        outcome = ?done.outcome,
                        attempt,
                        "file ingested"
                    );
                    return FileResult {
                        file,
                        success: true,
                        error: None,
                        attempts: attempt,
                        candidate_id: Some(candidate_id),
                        email: Some(done.email),
                        outcome: Some(done.outcome),
                        content_sha256: Some(done.content_sha256),
                    };
                }
                Err(err) => {
                    let will_retry =
                        err.disposition() == RetryDisposition::Retryable && attempt < max_attempts;
                    warn!(attempt, error = %err, will_retry, "file ingestion attempt failed");
                    last_error = Some((attempt, err.to_string()));
                    if !will_retry {
                        break;
                    }
                }
            }
        }

        let (attempts, message) =
            last_error.unwrap_or_else(|| (0, "no ingestion attempt was made".to_string()));
        error!(attempts, error = %message, "giving up on file");
        FileResult::failed(file, Some(candidate_id), attempts, message)
    }

    async fn ingest_once(&self, candidate_id: &CandidateId) -> Result<Ingested, IngestError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|source| IngestError::Read {
                path: self.path.clone(),
                source,
            })?;
        let content_sha256 = sha256_hex(&bytes);
        let text = String::from_utf8(bytes).map_err(|err| IngestError::Read {
            path: self.path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, err),
        })?;
        let profile = decode_json(&text)?;

        let now = Utc::now();
        let record = normalize_candidate(&profile, self.index.docs_for(candidate_id), now)?;
        let reconciled = upsert_by_email(self.store.as_ref(), &record, now).await?;
        Ok(Ingested {
            email: record.contact_information.email,
            outcome: reconciled.outcome,
            content_sha256,
        })
    }
}

pub struct IngestPipeline {
    config: IngestConfig,
    store: Arc<dyn CandidateStore>,
}

impl IngestPipeline {
    pub fn new(config: IngestConfig, store: Arc<dyn CandidateStore>) -> Self {
        Self { config, store }
    }

    /// Runs every phase and closes the store afterwards, whatever the outcome.
    /// Only a missing profile directory is returned as an error; per-file
    /// failures end up in the report.
    pub async fn run(&self) -> Result<RunReport, LocateError> {
        let outcome = self.run_phases().await;
        self.store.close().await;
        if outcome.is_ok() {
            enter_phase(RunPhase::Done);
        }
        outcome
    }

    async fn run_phases(&self) -> Result<RunReport, LocateError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        enter_phase(RunPhase::Discovering);
        let inventory = locate_sources(&self.config.dirs).await.inspect_err(|err| {
            error!(%run_id, error = %err, "aborting run");
        })?;

        enter_phase(RunPhase::Correlating);
        let index = Arc::new(build_correlation_index(&inventory).await);

        enter_phase(RunPhase::Processing);
        let paths = inventory.profiles.paths().collect::<Vec<_>>();
        let total = paths.len();
        if total == 0 {
            warn!(dir = %inventory.profiles.dir.display(), "no profile files found");
        } else {
            info!(
                %run_id,
                total,
                concurrency = self.config.concurrency,
                "processing profile files"
            );
        }

        let mut results = Vec::with_capacity(total);
        for batch in paths.chunks(self.config.concurrency.max(1)) {
            let mut tasks = JoinSet::new();
            for (slot, path) in batch.iter().enumerate() {
                let job = FileJob {
                    path: path.clone(),
                    index: Arc::clone(&index),
                    store: Arc::clone(&self.store),
                    retry: self.config.retry,
                };
                let span = info_span!("ingest_file", %run_id, file = %path.display());
                tasks.spawn(async move { (slot, job.run().await) }.instrument(span));
            }

            let mut slots: Vec<Option<FileResult>> = (0..batch.len()).map(|_| None).collect();
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((slot, result)) => slots[slot] = Some(result),
                    Err(err) => error!(%run_id, error = %err, "ingestion task did not complete"),
                }
            }
            for (slot, path) in slots.into_iter().zip(batch) {
                results.push(slot.unwrap_or_else(|| {
                    FileResult::failed(
                        path.display().to_string(),
                        None,
                        0,
                        "ingestion task did not complete".to_string(),
                    )
                }));
            }
            info!("processed {} of {} files", results.len(), total);
        }

        enter_phase(RunPhase::Reporting);
        let successful = results.iter().filter(|r| r.success).count();
        let failed = results.len() - successful;
        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            success: failed == 0,
            total_files: total,
            successful,
            failed,
            results,
            correlation: index.stats().clone(),
        };
        for (file, error) in report.failures() {
            warn!(%run_id, file, error, "file failed");
        }
        info!(%run_id, successful, failed, "processing complete");
        Ok(report)
    }
}

fn enter_phase(phase: RunPhase) {
    info!(phase = ?phase, "ingest run phase");
}
