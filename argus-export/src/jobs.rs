//! Background export jobs.
//!
//! Jobs queue behind a semaphore (default 5 concurrent), run the streaming
//! writer, and track progress visible through `get_job`. Cancellation is
//! cooperative: the worker checks the token at chunk boundaries, deletes any
//! partially written artifact and flips the job to `cancelled`. An hourly
//! sweeper removes expired artifacts and their job entries.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::writers::export_stream;
use crate::{ExportError, ExportFormat, ExportOptions, RecordStream};

/// Lifecycle states of an export job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ExportProgress {
    pub rows_processed: u64,
    pub bytes_written: u64,
    pub last_update: Option<DateTime<Utc>>,
}

/// Public view of one export job.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ExportJob {
    pub job_id: String,
    pub format: ExportFormat,
    pub output_path: PathBuf,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub progress: ExportProgress,
    pub error_message: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Named bundle of format + options applied beneath request options.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ExportTemplate {
    pub format: ExportFormat,
    pub options: serde_json::Value,
}

struct JobState {
    job: ExportJob,
    rows: Arc<AtomicU64>,
    token: CancellationToken,
}

/// Registry and worker pool for export jobs.
pub struct ExportJobManager {
    export_dir: PathBuf,
    retention: chrono::Duration,
    jobs: Arc<Mutex<HashMap<String, JobState>>>,
    semaphore: Arc<Semaphore>,
    templates: Mutex<HashMap<String, ExportTemplate>>,
    sweeper: Mutex<Option<tokio::task::JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl ExportJobManager {
    pub async fn new(
        export_dir: &Path,
        retention_hours: i64,
        max_concurrent: usize,
    ) -> Result<Self, ExportError> {
        tokio::fs::create_dir_all(export_dir).await?;
        info!(dir = %export_dir.display(), max_concurrent, "export job manager ready");
        Ok(Self {
            export_dir: export_dir.to_path_buf(),
            retention: chrono::Duration::hours(retention_hours.max(1)),
            jobs: Arc::new(Mutex::new(HashMap::new())),
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            templates: Mutex::new(HashMap::new()),
            sweeper: Mutex::new(None),
            shutdown: CancellationToken::new(),
        })
    }

    /// Register a named template.
    pub fn add_template(&self, name: &str, template: ExportTemplate) {
        self.templates.lock().insert(name.to_string(), template);
    }

    /// Queue an export. The returned job id can be polled with `get_job`,
    /// cancelled with `cancel` and downloaded with `download` once completed.
    pub fn create(
        &self,
        stream: RecordStream,
        format: Option<ExportFormat>,
        filename: Option<&str>,
        template: Option<&str>,
        options: &serde_json::Value,
    ) -> Result<String, ExportError> {
        let template = match template {
            Some(name) => Some(
                self.templates
                    .lock()
                    .get(name)
                    .cloned()
                    .ok_or_else(|| ExportError::UnknownTemplate(name.to_string()))?,
            ),
            None => None,
        };

        let format = format
            .or(template.as_ref().map(|t| t.format))
            .unwrap_or(ExportFormat::Csv);
        let mut merged = ExportOptions::default();
        if let Some(template) = &template {
            merged = merged.merged_with(&template.options);
        }
        let merged = merged.merged_with(options);

        let job_id = format!("exp_{}", &Uuid::new_v4().simple().to_string()[..12]);
        let file_name = match filename {
            Some(name) => format!("{name}.{}", format.extension()),
            None => format!("{job_id}.{}", format.extension()),
        };
        let output_path = self.export_dir.join(file_name);

        let now = Utc::now();
        let job = ExportJob {
            job_id: job_id.clone(),
            format,
            output_path: output_path.clone(),
            status: JobStatus::Pending,
            created_at: now,
            started_at: None,
            completed_at: None,
            progress: ExportProgress::default(),
            error_message: None,
            expires_at: now + self.retention,
        };

        let rows = Arc::new(AtomicU64::new(0));
        let token = self.shutdown.child_token();
        self.jobs.lock().insert(
            job_id.clone(),
            JobState {
                job,
                rows: Arc::clone(&rows),
                token: token.clone(),
            },
        );

        let jobs = Arc::clone(&self.jobs);
        let semaphore = Arc::clone(&self.semaphore);
        let worker_id = job_id.clone();
        tokio::spawn(async move {
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            run_job(jobs, worker_id, stream, format, output_path, merged, rows, token).await;
        });

        Ok(job_id)
    }

    /// Current state of a job.
    pub fn get_job(&self, job_id: &str) -> Option<ExportJob> {
        let jobs = self.jobs.lock();
        jobs.get(job_id).map(|state| {
            let mut job = state.job.clone();
            if !job.status.is_terminal() {
                job.progress.rows_processed = state.rows.load(Ordering::Relaxed);
            }
            job
        })
    }

    /// All jobs, newest first.
    pub fn list_jobs(&self) -> Vec<ExportJob> {
        let jobs = self.jobs.lock();
        let mut out: Vec<ExportJob> = jobs.values().map(|s| s.job.clone()).collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    /// Request cooperative cancellation. Returns false for unknown or
    /// already-terminal jobs.
    pub fn cancel(&self, job_id: &str) -> bool {
        let jobs = self.jobs.lock();
        match jobs.get(job_id) {
            Some(state) if !state.job.status.is_terminal() => {
                state.token.cancel();
                true
            }
            _ => false,
        }
    }

    /// Byte stream + size of a completed job's artifact.
    pub async fn download(
        &self,
        job_id: &str,
    ) -> Result<(ReaderStream<tokio::fs::File>, u64), ExportError> {
        let path = {
            let jobs = self.jobs.lock();
            let state = jobs
                .get(job_id)
                .ok_or_else(|| ExportError::UnknownJob(job_id.to_string()))?;
            if state.job.status != JobStatus::Completed {
                return Err(ExportError::NotDownloadable(job_id.to_string()));
            }
            state.job.output_path.clone()
        };
        let file = tokio::fs::File::open(&path).await?;
        let size = file.metadata().await?.len();
        Ok((ReaderStream::new(file), size))
    }

    /// Start the hourly TTL sweeper.
    pub fn start(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        let token = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(3600));
            loop {
                tokio::select! {
                    _ = interval.tick() => manager.sweep_expired().await,
                    _ = token.cancelled() => break,
                }
            }
        });
        *self.sweeper.lock() = Some(handle);
    }

    /// Delete artifacts and entries for expired jobs.
    pub async fn sweep_expired(&self) {
        let now = Utc::now();
        let expired: Vec<(String, PathBuf)> = {
            let jobs = self.jobs.lock();
            jobs.iter()
                .filter(|(_, state)| state.job.expires_at < now)
                .map(|(id, state)| (id.clone(), state.job.output_path.clone()))
                .collect()
        };
        for (job_id, path) in expired {
            if let Err(err) = tokio::fs::remove_file(&path).await {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(job_id, error = %err, "failed to delete expired export artifact");
                }
            }
            self.jobs.lock().remove(&job_id);
            info!(job_id, "removed expired export job");
        }
    }

    /// Cancel in-flight jobs and stop the sweeper, waiting up to `grace` for
    /// workers to observe the cancellation.
    pub async fn stop(&self, grace: Duration) {
        self.shutdown.cancel();
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
        let deadline = tokio::time::Instant::now() + grace;
        loop {
            let busy = {
                let jobs = self.jobs.lock();
                jobs.values().any(|s| !s.job.status.is_terminal())
            };
            if !busy || tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_job(
    jobs: Arc<Mutex<HashMap<String, JobState>>>,
    job_id: String,
    stream: RecordStream,
    format: ExportFormat,
    output_path: PathBuf,
    options: ExportOptions,
    rows: Arc<AtomicU64>,
    token: CancellationToken,
) {
    {
        let mut jobs = jobs.lock();
        if let Some(state) = jobs.get_mut(&job_id) {
            state.job.status = JobStatus::Running;
            state.job.started_at = Some(Utc::now());
        }
    }
    info!(job_id, ?format, "export job started");

    // Progress wrapper: rows count on every record, `last_update` refreshed
    // every 1000 rows.
    let progress_jobs = Arc::clone(&jobs);
    let progress_id = job_id.clone();
    let counted = stream
        .inspect(move |_| {
            let n = rows.fetch_add(1, Ordering::Relaxed) + 1;
            if n % 1000 == 0 {
                let mut jobs = progress_jobs.lock();
                if let Some(state) = jobs.get_mut(&progress_id) {
                    state.job.progress.rows_processed = n;
                    state.job.progress.last_update = Some(Utc::now());
                }
            }
        })
        .boxed();

    let result = tokio::select! {
        biased;
        _ = token.cancelled() => None,
        result = export_stream(counted, &output_path, format, &options) => Some(result),
    };

    let mut jobs = jobs.lock();
    let Some(state) = jobs.get_mut(&job_id) else {
        return;
    };
    state.job.completed_at = Some(Utc::now());
    match result {
        None => {
            state.job.status = JobStatus::Cancelled;
            drop(jobs);
            if let Err(err) = std::fs::remove_file(&output_path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(job_id, error = %err, "failed to delete cancelled export artifact");
                }
            }
            info!(job_id, "export job cancelled");
        }
        Some(Ok(stats)) => {
            state.job.status = JobStatus::Completed;
            state.job.progress.rows_processed = stats.rows_exported;
            state.job.progress.bytes_written = stats.bytes_written;
            state.job.progress.last_update = Some(Utc::now());
            info!(job_id, rows = stats.rows_exported, bytes = stats.bytes_written, "export job completed");
        }
        Some(Err(err)) => {
            state.job.status = JobStatus::Failed;
            state.job.error_message = Some(err.to_string());
            drop(jobs);
            if let Err(remove_err) = std::fs::remove_file(&output_path) {
                if remove_err.kind() != std::io::ErrorKind::NotFound {
                    warn!(job_id, error = %remove_err, "failed to delete failed export artifact");
                }
            }
            error!(job_id, error = %err, "export job failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use serde_json::json;

    fn rows(n: usize) -> RecordStream {
        stream::iter((0..n).map(|i| json!({"id": i}))).boxed()
    }

    async fn wait_terminal(manager: &ExportJobManager, job_id: &str) -> ExportJob {
        for _ in 0..200 {
            if let Some(job) = manager.get_job(job_id) {
                if job.status.is_terminal() {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {job_id} did not reach a terminal state");
    }

    #[tokio::test]
    async fn job_completes_and_downloads() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ExportJobManager::new(dir.path(), 24, 5).await.unwrap();
        let job_id = manager
            .create(rows(100), Some(ExportFormat::Csv), None, None, &json!({}))
            .unwrap();

        let job = wait_terminal(&manager, &job_id).await;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress.rows_processed, 100);
        assert!(job.output_path.exists());

        let (_stream, size) = manager.download(&job_id).await.unwrap();
        assert!(size > 0);
    }

    #[tokio::test]
    async fn pending_job_is_not_downloadable() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ExportJobManager::new(dir.path(), 24, 5).await.unwrap();
        let job_id = manager
            .create(rows(10), Some(ExportFormat::Json), None, None, &json!({}))
            .unwrap();
        // Either still running or completed; only assert the unknown-job path.
        let err = manager.download("exp_missing").await.unwrap_err();
        assert!(matches!(err, ExportError::UnknownJob(_)));
        wait_terminal(&manager, &job_id).await;
    }

    #[tokio::test]
    async fn cancelled_job_deletes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ExportJobManager::new(dir.path(), 24, 5).await.unwrap();

        // A stream that never ends keeps the job running until cancel.
        let endless = stream::unfold(0u64, |n| async move {
            tokio::time::sleep(Duration::from_millis(1)).await;
            Some((json!({"id": n}), n + 1))
        })
        .boxed();
        let job_id = manager
            .create(endless, Some(ExportFormat::Jsonl), None, None, &json!({}))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(manager.cancel(&job_id));

        let job = wait_terminal(&manager, &job_id).await;
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(!job.output_path.exists());
    }

    #[tokio::test]
    async fn template_options_are_overridden_by_request() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ExportJobManager::new(dir.path(), 24, 5).await.unwrap();
        manager.add_template(
            "tabs",
            ExportTemplate {
                format: ExportFormat::Tsv,
                options: json!({"include_headers": false}),
            },
        );

        let job_id = manager
            .create(rows(3), None, None, Some("tabs"), &json!({"include_headers": true}))
            .unwrap();
        let job = wait_terminal(&manager, &job_id).await;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.format, ExportFormat::Tsv);
        let text = std::fs::read_to_string(&job.output_path).unwrap();
        assert_eq!(text.lines().count(), 4);
    }

    #[tokio::test]
    async fn unknown_template_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ExportJobManager::new(dir.path(), 24, 5).await.unwrap();
        let err = manager
            .create(rows(1), None, None, Some("absent"), &json!({}))
            .unwrap_err();
        assert!(matches!(err, ExportError::UnknownTemplate(_)));
    }

    #[tokio::test]
    async fn sweeper_removes_expired_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ExportJobManager::new(dir.path(), 24, 5).await.unwrap();
        let job_id = manager
            .create(rows(5), Some(ExportFormat::Csv), None, None, &json!({}))
            .unwrap();
        let job = wait_terminal(&manager, &job_id).await;
        assert!(job.output_path.exists());

        // Force expiry, then sweep.
        {
            let mut jobs = manager.jobs.lock();
            if let Some(state) = jobs.get_mut(&job_id) {
                state.job.expires_at = Utc::now() - chrono::Duration::hours(1);
            }
        }
        manager.sweep_expired().await;
        assert!(manager.get_job(&job_id).is_none());
        assert!(!job.output_path.exists());
    }

    #[tokio::test]
    async fn custom_filename_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ExportJobManager::new(dir.path(), 24, 5).await.unwrap();
        let job_id = manager
            .create(rows(2), Some(ExportFormat::Json), Some("latest"), None, &json!({}))
            .unwrap();
        let job = wait_terminal(&manager, &job_id).await;
        assert!(job.output_path.ends_with("latest.json"));
    }
}
