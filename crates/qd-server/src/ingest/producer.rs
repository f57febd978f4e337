//! Upload producer
//!
//! Hands the upload handler a staging target per file so request
//! bodies stream straight to disk, then enqueues one parse job per
//! staged file. A delayed finalize job per session trails the batch.
//! Staging happens before enqueueing so a claimed job always finds
//! its file on disk.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use qd_common::{QdError, Result};

use crate::queue::{FinalizeJob, JobKind, JobQueue, ParseJob};

/// One upload staged on disk, ready to enqueue.
#[derive(Debug)]
pub struct StagedFile {
    /// Identity of the staged file within its session; part of the
    /// job's idempotency key
    pub file_id: Uuid,
    pub staged_path: PathBuf,
    pub original_name: String,
}

/// What made it into the queue for one upload batch.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueOutcome {
    pub queued: usize,
    pub job_ids: Vec<Uuid>,
}

#[derive(Clone)]
pub struct IngestProducer {
    queue: JobQueue,
    staging_dir: PathBuf,
    finalize_delay: Duration,
}

impl IngestProducer {
    pub fn new(queue: JobQueue, staging_dir: PathBuf, finalize_delay: Duration) -> Self {
        Self {
            queue,
            staging_dir,
            finalize_delay,
        }
    }

    /// Create the staging directory for one upload session.
    pub async fn prepare_session(&self, import_session_id: Uuid) -> Result<PathBuf> {
        let session_dir = self.staging_dir.join(import_session_id.to_string());
        tokio::fs::create_dir_all(&session_dir)
            .await
            .map_err(QdError::Io)?;
        Ok(session_dir)
    }

    /// Pick the on-disk target for one incoming file. The caller
    /// streams the request body into `staged_path` itself.
    pub fn stage_target(&self, session_dir: &Path, original_name: &str) -> StagedFile {
        let file_id = Uuid::new_v4();
        let staged_path =
            session_dir.join(format!("{}__{}", file_id, sanitize_filename(original_name)));
        StagedFile {
            file_id,
            staged_path,
            original_name: original_name.to_string(),
        }
    }

    /// Enqueue one parse job per staged file.
    ///
    /// Per-file enqueue failures are logged and skipped so one bad
    /// file never blocks the rest of the batch. The finalize job is
    /// only scheduled when at least one file was queued.
    pub async fn enqueue_staged(
        &self,
        files: Vec<StagedFile>,
        import_session_id: Uuid,
        caller_id: &str,
    ) -> Result<EnqueueOutcome> {
        let mut job_ids = Vec::with_capacity(files.len());
        for file in files {
            match self.enqueue_one(import_session_id, caller_id, &file).await {
                Ok(Some(id)) => job_ids.push(id),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(
                        import_session_id = %import_session_id,
                        staged_path = %file.staged_path.display(),
                        error = %e,
                        "Failed to enqueue staged file, skipping"
                    );
                }
            }
        }

        if !job_ids.is_empty() {
            let finalize = FinalizeJob {
                import_session_id,
                caller_id: caller_id.to_string(),
            };
            self.queue
                .enqueue_in(
                    JobKind::FinalizeSession,
                    &FinalizeJob::job_key(import_session_id),
                    &finalize,
                    self.finalize_delay,
                )
                .await
                .map_err(|e| QdError::Queue(e.to_string()))?;
        }

        tracing::info!(
            import_session_id = %import_session_id,
            caller_id = %caller_id,
            queued = job_ids.len(),
            "Upload batch enqueued"
        );

        Ok(EnqueueOutcome {
            queued: job_ids.len(),
            job_ids,
        })
    }

    async fn enqueue_one(
        &self,
        import_session_id: Uuid,
        caller_id: &str,
        file: &StagedFile,
    ) -> Result<Option<Uuid>> {
        let job = ParseJob {
            staged_path: file.staged_path.clone(),
            original_name: file.original_name.clone(),
            import_session_id,
            caller_id: caller_id.to_string(),
        };

        let queued = self
            .queue
            .enqueue(
                JobKind::ParseClaimFile,
                &ParseJob::job_key(import_session_id, file.file_id),
                &job,
            )
            .await
            .map_err(|e| QdError::Queue(e.to_string()))?;

        tracing::debug!(
            import_session_id = %import_session_id,
            staged_path = %file.staged_path.display(),
            "Enqueued staged file"
        );
        Ok(queued)
    }
}

/// Make an uploaded filename safe to use as a path component.
///
/// Keeps only the final component, replaces anything outside
/// `[A-Za-z0-9._-]`, and bounds the length.
pub fn sanitize_filename(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name);

    let mut out: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    out.truncate(120);

    if out.is_empty() || out.chars().all(|c| c == '.' || c == '_') {
        "upload.xml".to_string()
    } else {
        out
    }
}
