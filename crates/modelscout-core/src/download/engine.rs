//! Verified, resumable download engine.
//!
//! Transfers stream into a `.part` sidecar and only reach the target
//! path through an atomic rename after verification, so a crash at any
//! point leaves either resumable partial state or a fully verified file,
//! never a torn binary. Job registration goes through the store's
//! check-and-set so concurrent submitters for the same target path
//! coalesce onto one transfer.

use super::hashing::{self, ExpectedHash};
use super::retry::RetryPolicy;
use crate::cancel::CancellationToken;
use crate::config::{CacheTtlConfig, NetworkConfig};
use crate::error::{Result, ScoutError};
use crate::resolve::{ResolutionOutcome, ResolutionStatus};
use crate::store::{StateStore, NS_JOBS};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Lifecycle of a download job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    InProgress,
    Paused,
    Verified,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Verified | JobStatus::Failed)
    }
}

/// Persistent job record, keyed by target path in the job namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadJob {
    pub job_id: String,
    pub target_path: PathBuf,
    pub source_url: String,
    pub expected_size: Option<u64>,
    pub expected_hash: Option<String>,
    pub attempts: u32,
    pub status: JobStatus,
    pub updated_at: DateTime<Utc>,
}

/// Terminal result of a job, persisted alongside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadOutcome {
    pub job_id: String,
    pub success: bool,
    pub bytes_transferred: u64,
    pub duration_ms: u64,
    /// True only when a cryptographic digest was checked; a size-only
    /// check does not count as verification.
    pub verified: bool,
    pub error_kind: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct JobRecord {
    job: DownloadJob,
    outcome: Option<DownloadOutcome>,
}

/// Point-in-time view of a running job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub job_id: String,
    pub bytes_downloaded: u64,
    pub total_bytes: Option<u64>,
    pub status: JobStatus,
}

struct TransferStats {
    bytes_transferred: u64,
    verified: bool,
}

/// Downloads resolved candidates to local paths.
pub struct DownloadEngine {
    client: reqwest::Client,
    store: StateStore,
    semaphore: Arc<Semaphore>,
    retry: RetryPolicy,
    progress: Arc<Mutex<HashMap<String, ProgressSnapshot>>>,
}

fn job_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn part_path(target: &Path) -> PathBuf {
    PathBuf::from(format!(
        "{}{}",
        target.display(),
        NetworkConfig::DOWNLOAD_TEMP_SUFFIX
    ))
}

/// An active registration whose holder stopped heartbeating. A clock
/// that reads as the future counts as alive.
fn is_abandoned(job: &DownloadJob) -> bool {
    Utc::now()
        .signed_duration_since(job.updated_at)
        .to_std()
        .map(|age| age > NetworkConfig::JOB_STALE_AFTER)
        .unwrap_or(false)
}

impl DownloadEngine {
    pub fn new(store: StateStore) -> Result<Self> {
        // No total request timeout: large transfers legitimately run for
        // hours. Only the connect phase is bounded.
        let client = reqwest::Client::builder()
            .connect_timeout(NetworkConfig::CONNECT_TIMEOUT)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| ScoutError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                cause: Some(e.to_string()),
            })?;

        Ok(Self {
            client,
            store,
            semaphore: Arc::new(Semaphore::new(NetworkConfig::MAX_CONCURRENT_DOWNLOADS)),
            retry: RetryPolicy::default(),
            progress: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Override the retry schedule.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Download the chosen candidate of a resolution to `target_path`.
    ///
    /// Only `FOUND` resolutions are accepted. The returned outcome
    /// reports failures in-band; `Err` is reserved for store trouble and
    /// rejected submissions.
    pub async fn submit(
        &self,
        resolution: &ResolutionOutcome,
        target_path: impl Into<PathBuf>,
        token: &CancellationToken,
    ) -> Result<DownloadOutcome> {
        let target_path = target_path.into();
        let chosen = match (resolution.status, &resolution.chosen) {
            (ResolutionStatus::Found, Some(chosen)) => chosen,
            _ => {
                return Err(ScoutError::NotResolved {
                    name: resolution.target.raw_name.clone(),
                })
            }
        };
        let key = job_key(&target_path);

        if let Some(record) = self.store.get_json::<JobRecord>(NS_JOBS, &key)? {
            match record.job.status {
                JobStatus::Verified if target_path.exists() => {
                    if let Some(outcome) = record.outcome {
                        debug!("Replaying verified outcome for {}", key);
                        return Ok(outcome);
                    }
                    // Verified record without its outcome payload is
                    // unusable; clear it and re-run.
                    self.store.invalidate(NS_JOBS, &key)?;
                }
                // A live registration routes us to the attach path via
                // the check-and-set below, unless the holder's heartbeat
                // went silent (crashed mid-transfer).
                JobStatus::Pending | JobStatus::InProgress => {
                    if is_abandoned(&record.job) {
                        warn!("Reclaiming abandoned download job for {}", key);
                        self.store.invalidate(NS_JOBS, &key)?;
                    }
                }
                // Stale terminal record (failed, paused, or verified
                // with the file since deleted): clear it and re-run.
                _ => {
                    self.store.invalidate(NS_JOBS, &key)?;
                }
            }
        }

        let job = DownloadJob {
            job_id: uuid::Uuid::new_v4().to_string(),
            target_path: target_path.clone(),
            source_url: chosen.candidate.download_ref.clone(),
            expected_size: chosen.candidate.file_size,
            expected_hash: chosen
                .candidate
                .sha256
                .as_ref()
                .map(|h| format!("sha256:{}", h)),
            attempts: 0,
            status: JobStatus::Pending,
            updated_at: Utc::now(),
        };
        let record = JobRecord {
            job,
            outcome: None,
        };

        let claimed =
            self.store
                .register_json(NS_JOBS, &key, &record, CacheTtlConfig::JOB_TTL)?;
        if !claimed {
            return self.attach(&key).await;
        }

        self.run(record, &key, token).await
    }

    /// Submit several downloads; transfer concurrency is bounded by the
    /// engine's semaphore, not the batch size.
    pub async fn submit_batch(
        &self,
        requests: &[(ResolutionOutcome, PathBuf)],
        token: &CancellationToken,
    ) -> Vec<Result<DownloadOutcome>> {
        let futures = requests
            .iter()
            .map(|(resolution, path)| self.submit(resolution, path.clone(), token));
        futures::future::join_all(futures).await
    }

    /// Snapshot of one job's progress, if the engine has seen it.
    pub fn progress(&self, job_id: &str) -> Option<ProgressSnapshot> {
        self.progress
            .lock()
            .ok()
            .and_then(|map| map.get(job_id).cloned())
    }

    /// Snapshots of every job this engine instance has touched.
    pub fn progress_snapshots(&self) -> Vec<ProgressSnapshot> {
        self.progress
            .lock()
            .map(|map| map.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Export all live job records for inspection.
    pub fn export_jobs(&self) -> Result<Vec<(String, serde_json::Value)>> {
        self.store.export_namespace(NS_JOBS)
    }

    /// Poll a job registered by another submitter until it reaches a
    /// terminal outcome.
    async fn attach(&self, key: &str) -> Result<DownloadOutcome> {
        debug!("Attaching to existing download job for {}", key);
        loop {
            match self.store.get_json::<JobRecord>(NS_JOBS, key)? {
                Some(record) => {
                    if let Some(outcome) = record.outcome {
                        return Ok(outcome);
                    }
                    if is_abandoned(&record.job) {
                        return Err(ScoutError::DownloadFailed {
                            url: key.to_string(),
                            message: "Job holder stopped heartbeating while attached"
                                .to_string(),
                        });
                    }
                }
                None => {
                    return Err(ScoutError::DownloadFailed {
                        url: key.to_string(),
                        message: "Job record disappeared while attached".to_string(),
                    })
                }
            }
            tokio::time::sleep(NetworkConfig::ATTACH_POLL_INTERVAL).await;
        }
    }

    async fn run(
        &self,
        mut record: JobRecord,
        key: &str,
        token: &CancellationToken,
    ) -> Result<DownloadOutcome> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| ScoutError::Other(format!("Semaphore closed: {}", e)))?;

        let started = Instant::now();
        record.job.status = JobStatus::InProgress;
        record.job.updated_at = Utc::now();
        self.persist(key, &record)?;
        self.update_progress(&record.job, 0);

        // Heartbeat while transferring so a crash here is recognizable
        // to other submitters as an abandoned registration.
        let heartbeat = {
            let store = self.store.clone();
            let key = key.to_string();
            let mut snapshot = record.clone();
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(NetworkConfig::JOB_HEARTBEAT_INTERVAL).await;
                    snapshot.job.updated_at = Utc::now();
                    if store
                        .put_json(NS_JOBS, &key, &snapshot, CacheTtlConfig::JOB_TTL)
                        .is_err()
                    {
                        break;
                    }
                }
            })
        };

        let result = self.transfer(&mut record.job, token).await;

        // Join after abort so a heartbeat write in flight cannot land
        // after the terminal record below.
        heartbeat.abort();
        let _ = heartbeat.await;

        let (status, success, bytes, verified, error_kind) = match result {
            Ok(stats) => (
                JobStatus::Verified,
                true,
                stats.bytes_transferred,
                stats.verified,
                None,
            ),
            Err(e) => {
                let bytes = self
                    .progress(&record.job.job_id)
                    .map(|p| p.bytes_downloaded)
                    .unwrap_or(0);
                let status = if matches!(&e, ScoutError::DownloadPaused | ScoutError::DownloadCancelled)
                {
                    info!("Download paused for {}, partial state kept", key);
                    JobStatus::Paused
                } else {
                    warn!("Download failed for {}: {}", key, e);
                    JobStatus::Failed
                };
                (status, false, bytes, false, Some(e.kind().to_string()))
            }
        };

        let outcome = DownloadOutcome {
            job_id: record.job.job_id.clone(),
            success,
            bytes_transferred: bytes,
            duration_ms: started.elapsed().as_millis() as u64,
            verified,
            error_kind,
        };

        // The terminal record is written no matter how the transfer
        // ended; attached submitters depend on it appearing.
        record.job.status = status;
        record.job.updated_at = Utc::now();
        record.outcome = Some(outcome.clone());
        self.persist(key, &record)?;
        self.update_progress(&record.job, bytes);

        if success {
            info!(
                "Downloaded {} ({} bytes, verified={})",
                key, bytes, verified
            );
        }
        Ok(outcome)
    }

    /// Stream with retry, verify, and atomically move into place.
    async fn transfer(
        &self,
        job: &mut DownloadJob,
        token: &CancellationToken,
    ) -> Result<TransferStats> {
        let part = part_path(&job.target_path);
        if let Some(parent) = job.target_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ScoutError::io_with_path(e, parent))?;
        }

        let mut attempt: u32 = 0;
        loop {
            // Checked before every attempt, not just at chunk
            // boundaries: a job cancelled during the backoff sleep must
            // not open a fresh connection.
            if token.is_cancelled() {
                return Err(ScoutError::DownloadPaused);
            }
            attempt += 1;
            job.attempts = attempt;
            match self.stream_to_part(job, &part, token).await {
                Ok(()) => break,
                Err(e) if e.is_retryable() && !self.retry.attempts_exhausted(attempt) => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "Transfer attempt {} for {} failed ({}), retrying in {:?}",
                        attempt, job.source_url, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }

        let actual_size = tokio::fs::metadata(&part)
            .await
            .map_err(|e| ScoutError::io_with_path(e, &part))?
            .len();
        if let Some(expected) = job.expected_size {
            if actual_size != expected {
                tokio::fs::remove_file(&part).await.ok();
                return Err(ScoutError::SizeMismatch {
                    expected,
                    actual: actual_size,
                });
            }
        }

        let verified = match &job.expected_hash {
            Some(raw) => {
                let expected = ExpectedHash::parse(raw)?;
                if let Err(e) = hashing::verify_file(&part, &expected).await {
                    // A corrupt partial is worse than no partial.
                    tokio::fs::remove_file(&part).await.ok();
                    return Err(e);
                }
                true
            }
            None => false,
        };

        tokio::fs::rename(&part, &job.target_path)
            .await
            .map_err(|e| ScoutError::io_with_path(e, &job.target_path))?;

        Ok(TransferStats {
            bytes_transferred: actual_size,
            verified,
        })
    }

    /// One streaming pass into the `.part` file, resuming from its
    /// current length when the server honors range requests.
    async fn stream_to_part(
        &self,
        job: &DownloadJob,
        part: &Path,
        token: &CancellationToken,
    ) -> Result<()> {
        let mut offset = match tokio::fs::metadata(part).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };

        let mut request = self.client.get(&job.source_url);
        if offset > 0 {
            debug!("Resuming {} from byte {}", job.source_url, offset);
            request = request.header(reqwest::header::RANGE, format!("bytes={}-", offset));
        }

        let response = request.send().await.map_err(ScoutError::from)?;
        let status = response.status();

        if status.as_u16() == 416 && offset > 0 {
            // Our partial no longer lines up with the remote file.
            tokio::fs::remove_file(part).await.ok();
            return Err(ScoutError::Network {
                message: "Range no longer satisfiable, restarting transfer".to_string(),
                cause: None,
            });
        }
        if !status.is_success() {
            return Err(ScoutError::Http {
                status: status.as_u16(),
                url: job.source_url.clone(),
            });
        }
        if offset > 0 && status != reqwest::StatusCode::PARTIAL_CONTENT {
            debug!("Server ignored range request, restarting from zero");
            offset = 0;
        }

        let mut file = if offset > 0 {
            tokio::fs::OpenOptions::new()
                .append(true)
                .open(part)
                .await
        } else {
            tokio::fs::File::create(part).await
        }
        .map_err(|e| ScoutError::io_with_path(e, part))?;

        let mut written = offset;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            // Chunk boundary is the only safe interruption point: the
            // bytes on disk stay a clean prefix of the remote file.
            if token.is_cancelled() {
                file.flush()
                    .await
                    .map_err(|e| ScoutError::io_with_path(e, part))?;
                return Err(ScoutError::DownloadPaused);
            }
            let chunk = chunk.map_err(|e| ScoutError::Network {
                message: format!("Stream error: {}", e),
                cause: Some(e.to_string()),
            })?;
            file.write_all(&chunk)
                .await
                .map_err(|e| ScoutError::io_with_path(e, part))?;
            written += chunk.len() as u64;
            self.update_progress(job, written);
        }

        file.flush()
            .await
            .map_err(|e| ScoutError::io_with_path(e, part))?;
        Ok(())
    }

    fn persist(&self, key: &str, record: &JobRecord) -> Result<()> {
        self.store
            .put_json(NS_JOBS, key, record, CacheTtlConfig::JOB_TTL)
    }

    fn update_progress(&self, job: &DownloadJob, bytes: u64) {
        if let Ok(mut map) = self.progress.lock() {
            map.insert(
                job.job_id.clone(),
                ProgressSnapshot {
                    job_id: job.job_id.clone(),
                    bytes_downloaded: bytes,
                    total_bytes: job.expected_size,
                    status: job.status,
                },
            );
        }
    }
}
