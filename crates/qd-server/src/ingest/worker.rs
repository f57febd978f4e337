//! Queue workers
//!
//! A small pool of identical consumers polls the ingest queue. Each
//! claimed parse job reads its staged file, decodes the envelope into
//! a [`ClaimBundle`] and submits the bundle for persistence. Failures
//! are classified: malformed client input fails the job immediately,
//! anything else goes back to the queue for a retry.

use std::path::Path;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use uuid::Uuid;

use qd_common::{QdError, Result};

use crate::bundle::{ClaimBundle, SubDocType};
use crate::events::{ProgressData, ProgressPublisher, EVENT_IMPORT_PROGRESS};
use crate::ingest::PersistHandler;
use crate::normalize::camelize_keys;
use crate::queue::{ClaimedJob, FinalizeJob, JobKind, JobQueue, ParseJob};
use crate::xml::{parse_to_value, ClaimEnvelope, FileHoSo};

/// Everything one worker needs; cheap to clone per task.
#[derive(Clone)]
pub struct WorkerContext {
    pub queue: JobQueue,
    pub persist: PersistHandler,
    pub publisher: ProgressPublisher,
    pub poll_interval: Duration,
}

/// Spawn `concurrency` consumer tasks against the shared queue.
pub fn spawn_workers(ctx: WorkerContext, concurrency: usize) {
    for i in 0..concurrency {
        let ctx = ctx.clone();
        let name = format!("qd-worker-{i}");
        tokio::spawn(async move {
            tracing::info!(worker = %name, "Ingest worker started");
            run_worker(ctx, name).await;
        });
    }
}

async fn run_worker(ctx: WorkerContext, name: String) {
    loop {
        let job = match ctx.queue.claim(&name).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tokio::time::sleep(ctx.poll_interval).await;
                continue;
            }
            Err(e) => {
                tracing::warn!(worker = %name, error = %e, "Failed to claim job");
                tokio::time::sleep(ctx.poll_interval).await;
                continue;
            }
        };

        tracing::debug!(
            worker = %name,
            job_id = %job.id,
            job_key = %job.job_key,
            kind = ?job.kind,
            attempt = job.attempts,
            "Claimed job"
        );

        match handle_job(&ctx, &job).await {
            Ok(()) => {
                if let Err(e) = ctx.queue.complete(job.id).await {
                    tracing::warn!(job_id = %job.id, error = %e, "Failed to delete completed job");
                }
            }
            Err(e) => {
                let fatal = e.is_client_input();
                if let Err(qe) = ctx.queue.fail(&job, &e.to_string(), fatal).await {
                    tracing::warn!(job_id = %job.id, error = %qe, "Failed to record job failure");
                }
            }
        }
    }
}

async fn handle_job(ctx: &WorkerContext, job: &ClaimedJob) -> Result<()> {
    match job.kind {
        JobKind::ParseClaimFile => {
            let parse: ParseJob = serde_json::from_value(job.payload.clone())?;
            handle_parse_job(ctx, parse).await
        }
        JobKind::FinalizeSession => {
            let finalize: FinalizeJob = serde_json::from_value(job.payload.clone())?;
            handle_finalize_job(ctx, finalize).await
        }
    }
}

async fn handle_parse_job(ctx: &WorkerContext, job: ParseJob) -> Result<()> {
    let result = process_staged_file(ctx, &job).await;
    remove_staged_file(&job.staged_path).await;
    result
}

async fn process_staged_file(ctx: &WorkerContext, job: &ParseJob) -> Result<()> {
    let xml = tokio::fs::read_to_string(&job.staged_path)
        .await
        .map_err(QdError::Io)?;

    let envelope = ClaimEnvelope::parse(&xml)?;
    let entries = envelope.file_entries();
    if entries.is_empty() {
        return Err(QdError::MissingElement("FILEHOSO".to_string()));
    }

    let bundle = decode_bundle(
        ctx,
        &entries,
        job.import_session_id,
        &job.caller_id,
        &job.original_name,
    )
    .await;

    let outcome = ctx
        .persist
        .create_full_record(&bundle, job.import_session_id, &job.caller_id)
        .await?;

    ctx.publisher
        .publish(
            &job.caller_id,
            EVENT_IMPORT_PROGRESS,
            ProgressData {
                success: true,
                import_session_id: Some(job.import_session_id),
                xml1_id: Some(outcome.xml1_id),
                ma_lk: outcome.ma_lk.clone(),
                message: Some(format!("Imported {}", job.original_name)),
                progress: Some(100),
                ..Default::default()
            },
        )
        .await;

    Ok(())
}

/// Decode every FILEHOSO entry into the bundle, reporting progress as
/// each entry lands. Undecodable entries are logged and skipped, they
/// never fail the file.
async fn decode_bundle(
    ctx: &WorkerContext,
    entries: &[&FileHoSo],
    import_session_id: Uuid,
    caller_id: &str,
    original_name: &str,
) -> ClaimBundle {
    let mut bundle = ClaimBundle::new();
    let total = entries.len();

    for (idx, entry) in entries.iter().enumerate() {
        match decode_entry(entry) {
            Ok((kind, payload)) => {
                bundle.insert(kind, payload);
            }
            Err(e) => {
                tracing::warn!(
                    import_session_id = %import_session_id,
                    file = %original_name,
                    entry = idx,
                    error = %e,
                    "Skipping undecodable sub-document entry"
                );
            }
        }

        // Decoding covers the first 80%; persistence takes it to 100.
        let progress = (((idx + 1) * 80) / total) as u8;
        ctx.publisher
            .publish(
                caller_id,
                EVENT_IMPORT_PROGRESS,
                ProgressData {
                    success: true,
                    import_session_id: Some(import_session_id),
                    message: Some(format!("Decoding {original_name}")),
                    progress: Some(progress),
                    ..Default::default()
                },
            )
            .await;
    }

    bundle
}

/// Decode one FILEHOSO entry into its type tag and camelized payload.
fn decode_entry(entry: &FileHoSo) -> Result<(SubDocType, serde_json::Value)> {
    let tag = entry
        .loai_ho_so
        .as_deref()
        .ok_or_else(|| QdError::MissingElement("LOAIHOSO".to_string()))?;
    let kind = SubDocType::from_code(tag)
        .ok_or_else(|| QdError::Xml(format!("unknown sub-document type '{tag}'")))?;

    let content = entry
        .noi_dung_file
        .as_deref()
        .ok_or_else(|| QdError::MissingElement("NOIDUNGFILE".to_string()))?;

    // Producers wrap base64 across lines; strip whitespace first.
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    let decoded = BASE64.decode(compact.as_bytes())?;
    let text = String::from_utf8_lossy(&decoded);

    let value = parse_to_value(&text).map_err(|e| QdError::Xml(e.to_string()))?;
    Ok((kind, camelize_keys(value)))
}

async fn handle_finalize_job(ctx: &WorkerContext, job: FinalizeJob) -> Result<()> {
    tracing::info!(
        import_session_id = %job.import_session_id,
        caller_id = %job.caller_id,
        "Import session finalized"
    );
    ctx.publisher
        .publish(
            &job.caller_id,
            EVENT_IMPORT_PROGRESS,
            ProgressData {
                success: true,
                import_session_id: Some(job.import_session_id),
                message: Some("Import session finalized".to_string()),
                progress: Some(100),
                ..Default::default()
            },
        )
        .await;
    Ok(())
}

async fn remove_staged_file(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove staged file");
        }
    }
}
