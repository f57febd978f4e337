//! Postgres-backed job queue
//!
//! Jobs live in the `ingest_jobs` table. Workers claim due rows with
//! `FOR UPDATE SKIP LOCKED`, so any number of worker tasks (and server
//! processes) can consume the same queue without double-execution. A
//! unique `job_key` makes enqueueing idempotent. Job rows are deleted
//! on success and on permanent failure; only rows awaiting a retry
//! remain.

use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

pub mod jobs;

pub use jobs::{FinalizeJob, JobKind, ParseJob};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("job payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("job {id} has unknown type '{job_type}'")]
    UnknownJobType { id: Uuid, job_type: String },
}

/// Retry policy applied to every job in the queue.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts before a job is discarded as permanently failed
    pub max_attempts: i32,
    /// First retry delay; subsequent delays double
    pub backoff_base: Duration,
    /// A claimed job whose lock is older than this is considered
    /// abandoned (worker crashed mid-job) and becomes claimable again
    pub lock_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(3),
            lock_timeout: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff before the next attempt, given how many
    /// attempts have already run.
    pub fn backoff(&self, attempts: i32) -> Duration {
        let exponent = attempts.saturating_sub(1).clamp(0, 16) as u32;
        self.backoff_base * 2u32.saturating_pow(exponent)
    }
}

/// A job currently claimed by a worker.
#[derive(Debug)]
pub struct ClaimedJob {
    pub id: Uuid,
    pub job_key: String,
    pub kind: JobKind,
    pub payload: Value,
    pub attempts: i32,
    pub max_attempts: i32,
}

/// Handle to the shared ingest queue.
#[derive(Clone)]
pub struct JobQueue {
    pool: PgPool,
    policy: RetryPolicy,
}

impl JobQueue {
    pub fn new(pool: PgPool, policy: RetryPolicy) -> Self {
        Self { pool, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Enqueue a job for immediate execution.
    ///
    /// Returns `None` when a job with the same key already exists (the
    /// enqueue is a no-op).
    pub async fn enqueue<P: Serialize>(
        &self,
        kind: JobKind,
        job_key: &str,
        payload: &P,
    ) -> Result<Option<Uuid>, QueueError> {
        self.enqueue_in(kind, job_key, payload, Duration::ZERO).await
    }

    /// Enqueue a job that becomes due after `delay`.
    pub async fn enqueue_in<P: Serialize>(
        &self,
        kind: JobKind,
        job_key: &str,
        payload: &P,
        delay: Duration,
    ) -> Result<Option<Uuid>, QueueError> {
        let id = Uuid::new_v4();
        let payload = serde_json::to_value(payload)?;

        let result = sqlx::query(
            r#"
            INSERT INTO ingest_jobs (id, job_key, job_type, payload, attempts, max_attempts, run_at)
            VALUES ($1, $2, $3, $4, 0, $5, now() + make_interval(secs => $6))
            ON CONFLICT (job_key) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(job_key)
        .bind(kind.as_str())
        .bind(&payload)
        .bind(self.policy.max_attempts)
        .bind(delay.as_secs_f64())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(job_key = %job_key, "Job already queued, enqueue skipped");
            Ok(None)
        } else {
            Ok(Some(id))
        }
    }

    /// Atomically claim the next due job, if any.
    ///
    /// The claim increments the attempt counter and locks the row so
    /// concurrent workers skip it. Rows whose lock has outlived the
    /// policy's `lock_timeout` belonged to a worker that died mid-job
    /// and are claimable again; the claim counts as a fresh attempt.
    pub async fn claim(&self, worker: &str) -> Result<Option<ClaimedJob>, QueueError> {
        let row: Option<(Uuid, String, String, Value, i32, i32)> = sqlx::query_as(
            r#"
            WITH next AS (
                SELECT id FROM ingest_jobs
                WHERE run_at <= now()
                  AND (locked_at IS NULL
                       OR locked_at < now() - make_interval(secs => $2))
                ORDER BY run_at
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE ingest_jobs j
            SET locked_at = now(), locked_by = $1, attempts = j.attempts + 1
            FROM next
            WHERE j.id = next.id
            RETURNING j.id, j.job_key, j.job_type, j.payload, j.attempts, j.max_attempts
            "#,
        )
        .bind(worker)
        .bind(self.policy.lock_timeout.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        let Some((id, job_key, job_type, payload, attempts, max_attempts)) = row else {
            return Ok(None);
        };

        let kind = JobKind::from_str(&job_type)
            .ok_or(QueueError::UnknownJobType { id, job_type })?;

        Ok(Some(ClaimedJob {
            id,
            job_key,
            kind,
            payload,
            attempts,
            max_attempts,
        }))
    }

    /// Delete a successfully completed job.
    pub async fn complete(&self, id: Uuid) -> Result<(), QueueError> {
        sqlx::query("DELETE FROM ingest_jobs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record a failed attempt.
    ///
    /// Fatal failures (client-input errors) and exhausted retries
    /// discard the job row; otherwise the row is unlocked and
    /// rescheduled with exponential backoff.
    pub async fn fail(&self, job: &ClaimedJob, error: &str, fatal: bool) -> Result<(), QueueError> {
        if fatal || job.attempts >= job.max_attempts {
            tracing::error!(
                job_id = %job.id,
                job_key = %job.job_key,
                attempts = job.attempts,
                fatal,
                error = %error,
                "Job permanently failed, discarding"
            );
            sqlx::query("DELETE FROM ingest_jobs WHERE id = $1")
                .bind(job.id)
                .execute(&self.pool)
                .await?;
            return Ok(());
        }

        let delay = self.policy.backoff(job.attempts);
        tracing::warn!(
            job_id = %job.id,
            job_key = %job.job_key,
            attempts = job.attempts,
            max_attempts = job.max_attempts,
            retry_in_secs = delay.as_secs(),
            error = %error,
            "Job failed, scheduling retry"
        );

        sqlx::query(
            r#"
            UPDATE ingest_jobs
            SET locked_at = NULL,
                locked_by = NULL,
                last_error = $2,
                run_at = now() + make_interval(secs => $3)
            WHERE id = $1
            "#,
        )
        .bind(job.id)
        .bind(error)
        .bind(delay.as_secs_f64())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::from_secs(3),
            lock_timeout: Duration::from_secs(300),
        };
        assert_eq!(policy.backoff(1), Duration::from_secs(3));
        assert_eq!(policy.backoff(2), Duration::from_secs(6));
        assert_eq!(policy.backoff(3), Duration::from_secs(12));
    }

    #[test]
    fn test_backoff_handles_zero_attempts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), policy.backoff(1));
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff_base, Duration::from_secs(3));
        assert_eq!(policy.lock_timeout, Duration::from_secs(300));
    }
}
