//! Job queue contract and PostgreSQL implementation.
//!
//! The `jobs` table is the only shared mutable resource in the engine, and
//! the atomic conditional claim in [`PostgresJobQueue::claim`] is the only
//! synchronization primitive: under N workers racing for one row, exactly one
//! `UPDATE ... WHERE status = 'pending'` succeeds and the rest move on.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};
use thiserror::Error;
use uuid::Uuid;

use crate::common::transitions::StatusMachine;

use super::job::{ErrorKind, Job, JobPriority, JobStatus};
use super::payload::{JobPayload, JobType, TriggerSource};

const JOB_COLUMNS: &str = "id, job_type, data, priority, status, scheduled_for, \
     retry_count, max_retries, retry_at, worker_id, result, \
     started_at, completed_at, failed_at, cancelled_at, created_at, updated_at";

/// A worker tried to finalize a job it does not own.
#[derive(Debug, Clone, Error)]
#[error("job {job_id} is owned by {owner:?}, not '{caller}'")]
pub struct NotOwner {
    pub job_id: Uuid,
    pub owner: Option<String>,
    pub caller: String,
}

/// Request to create a job in `pending` status.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub payload: JobPayload,
    pub priority: JobPriority,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub max_retries: i32,
}

impl NewJob {
    pub fn new(payload: JobPayload) -> Self {
        Self {
            payload,
            priority: JobPriority::Normal,
            scheduled_for: None,
            max_retries: 3,
        }
    }

    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn scheduled_for(mut self, run_at: DateTime<Utc>) -> Self {
        self.scheduled_for = Some(run_at);
        self
    }
}

/// Outcome of a `complete`/`fail` call.
#[derive(Debug, Clone, PartialEq)]
pub enum FinalizeOutcome {
    /// Result recorded, job is terminally completed.
    Completed,
    /// Attempt failed but the job returned to `pending` for a later retry.
    RetryScheduled { retry_at: DateTime<Utc> },
    /// Attempt failed terminally; the error is captured in `result`.
    Failed,
    /// The job was cancelled out from under the worker; the write was
    /// discarded and the row left untouched.
    Discarded,
}

/// Exponential backoff for retry scheduling, capped at one hour.
pub fn retry_backoff(retry_count: i32) -> chrono::Duration {
    let exponent = retry_count.clamp(0, 10) as u32;
    let secs = 60i64.saturating_mul(1i64 << exponent).min(3600);
    chrono::Duration::seconds(secs)
}

/// Storage and lifecycle operations for [`Job`] rows.
///
/// Implementations must keep the status/timestamp invariant at every commit
/// and must make `claim` safe under concurrent callers.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Insert a job in `pending` status.
    async fn enqueue(&self, new_job: NewJob) -> Result<Job>;

    /// Atomically claim up to `limit` eligible jobs for `worker_id`.
    ///
    /// Eligible means `pending` with `scheduled_for` and `retry_at` (if set)
    /// in the past, ordered by priority then age. Claimed rows come back in
    /// `processing` status with `started_at` and `worker_id` set.
    async fn claim(&self, worker_id: &str, limit: i64) -> Result<Vec<Job>>;

    /// Record a successful result. Rejects callers that do not own the row;
    /// returns [`FinalizeOutcome::Discarded`] if the job was cancelled
    /// mid-flight.
    async fn complete(
        &self,
        job_id: Uuid,
        worker_id: &str,
        result: serde_json::Value,
    ) -> Result<FinalizeOutcome>;

    /// Record a failed attempt. Retryable failures under the retry budget
    /// return the row to `pending` with a backoff `retry_at`; everything else
    /// goes terminally `failed` with the error captured in `result`.
    async fn fail(
        &self,
        job_id: Uuid,
        worker_id: &str,
        error: &str,
        kind: ErrorKind,
    ) -> Result<FinalizeOutcome>;

    /// Impose cancellation on a `pending` or `processing` job.
    ///
    /// Returns whether the row was transitioned. A terminal row is an
    /// invalid-transition error, not a silent no-op.
    async fn cancel(&self, job_id: Uuid) -> Result<bool>;

    /// Fetch a job by id.
    async fn get(&self, job_id: Uuid) -> Result<Option<Job>>;

    /// Whether a non-terminal job of `job_type` already targets the entity.
    /// This is the duplicate-suppression lookup used by trigger rules.
    async fn active_job_exists(&self, job_type: JobType, entity_key: Uuid) -> Result<bool>;

    /// `created_at` of the most recent matching job for a campaign,
    /// optionally narrowed to one provenance. Used for cooldown windows.
    async fn last_created_at(
        &self,
        job_type: JobType,
        campaign_id: Uuid,
        triggered_by: Option<TriggerSource>,
    ) -> Result<Option<DateTime<Utc>>>;
}

/// PostgreSQL-backed job queue implementation.
pub struct PostgresJobQueue {
    pool: PgPool,
}

impl PostgresJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert a job using any executor, so trigger rules can enqueue inside
    /// the same transaction as the mutation that fired them.
    pub async fn enqueue_on<'e, E>(executor: E, new_job: NewJob) -> Result<Job>
    where
        E: PgExecutor<'e>,
    {
        let data = new_job.payload.to_value()?;
        let sql = format!(
            r#"
            INSERT INTO jobs (id, job_type, data, priority, status, scheduled_for, max_retries)
            VALUES ($1, $2, $3, $4, 'pending', $5, $6)
            RETURNING {JOB_COLUMNS}
            "#
        );
        let job = sqlx::query_as::<_, Job>(&sql)
            .bind(Uuid::new_v4())
            .bind(new_job.payload.job_type())
            .bind(data)
            .bind(new_job.priority)
            .bind(new_job.scheduled_for)
            .bind(new_job.max_retries)
            .fetch_one(executor)
            .await?;

        Ok(job)
    }

    /// Duplicate-guard lookup, usable inside a mutation's transaction.
    pub async fn active_job_exists_on<'e, E>(
        executor: E,
        job_type: JobType,
        entity_key: Uuid,
    ) -> Result<bool>
    where
        E: PgExecutor<'e>,
    {
        // entity_field comes from a fixed enum, never from input.
        let sql = format!(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM jobs
                WHERE job_type = $1
                  AND status IN ('pending', 'processing')
                  AND data->>'{}' = $2
            )
            "#,
            job_type.entity_field()
        );
        let exists = sqlx::query_scalar::<_, bool>(&sql)
            .bind(job_type)
            .bind(entity_key.to_string())
            .fetch_one(executor)
            .await?;

        Ok(exists)
    }

    /// Cooldown lookup, usable inside a mutation's transaction.
    pub async fn last_created_at_on<'e, E>(
        executor: E,
        job_type: JobType,
        campaign_id: Uuid,
        triggered_by: Option<TriggerSource>,
    ) -> Result<Option<DateTime<Utc>>>
    where
        E: PgExecutor<'e>,
    {
        let last = match triggered_by {
            Some(source) => {
                sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
                    r#"
                    SELECT MAX(created_at) FROM jobs
                    WHERE job_type = $1
                      AND data->>'campaign_id' = $2
                      AND data->>'triggered_by' = $3
                    "#,
                )
                .bind(job_type)
                .bind(campaign_id.to_string())
                .bind(source.as_str())
                .fetch_one(executor)
                .await?
            }
            None => {
                sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
                    r#"
                    SELECT MAX(created_at) FROM jobs
                    WHERE job_type = $1
                      AND data->>'campaign_id' = $2
                    "#,
                )
                .bind(job_type)
                .bind(campaign_id.to_string())
                .fetch_one(executor)
                .await?
            }
        };

        Ok(last)
    }

    async fn fetch_required(&self, job_id: Uuid) -> Result<Job> {
        self.get_internal(job_id)
            .await?
            .ok_or_else(|| anyhow!("job {} not found", job_id))
    }

    async fn get_internal(&self, job_id: Uuid) -> Result<Option<Job>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1");
        let job = sqlx::query_as::<_, Job>(&sql)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    fn ensure_owner(job: &Job, caller: &str) -> Result<()> {
        match job.worker_id.as_deref() {
            Some(owner) if owner == caller => Ok(()),
            other => Err(NotOwner {
                job_id: job.id,
                owner: other.map(str::to_string),
                caller: caller.to_string(),
            }
            .into()),
        }
    }
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    async fn enqueue(&self, new_job: NewJob) -> Result<Job> {
        Self::enqueue_on(&self.pool, new_job).await
    }

    async fn claim(&self, worker_id: &str, limit: i64) -> Result<Vec<Job>> {
        // The `status = 'pending'` predicate on the UPDATE is what makes the
        // claim atomic: a row grabbed by another worker between the SELECT
        // and the UPDATE affects zero rows here.
        let sql = format!(
            r#"
            WITH eligible AS (
                SELECT id
                FROM jobs
                WHERE status = 'pending'
                  AND (scheduled_for IS NULL OR scheduled_for <= NOW())
                  AND (retry_at IS NULL OR retry_at <= NOW())
                ORDER BY priority DESC, created_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs
            SET status = 'processing',
                started_at = NOW(),
                worker_id = $1,
                updated_at = NOW()
            WHERE id IN (SELECT id FROM eligible)
              AND status = 'pending'
            RETURNING {JOB_COLUMNS}
            "#
        );
        let jobs = sqlx::query_as::<_, Job>(&sql)
            .bind(worker_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(jobs)
    }

    async fn complete(
        &self,
        job_id: Uuid,
        worker_id: &str,
        result: serde_json::Value,
    ) -> Result<FinalizeOutcome> {
        let job = self.fetch_required(job_id).await?;

        if job.status == JobStatus::Cancelled {
            return Ok(FinalizeOutcome::Discarded);
        }
        job.status.ensure_transition(JobStatus::Completed)?;
        Self::ensure_owner(&job, worker_id)?;

        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'completed',
                result = $3,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status = 'processing' AND worker_id = $2
            "#,
        )
        .bind(job_id)
        .bind(worker_id)
        .bind(result)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            // Lost a race with an external cancel; the result is dropped.
            return Ok(FinalizeOutcome::Discarded);
        }
        Ok(FinalizeOutcome::Completed)
    }

    async fn fail(
        &self,
        job_id: Uuid,
        worker_id: &str,
        error: &str,
        kind: ErrorKind,
    ) -> Result<FinalizeOutcome> {
        let job = self.fetch_required(job_id).await?;

        if job.status == JobStatus::Cancelled {
            return Ok(FinalizeOutcome::Discarded);
        }

        let should_retry = kind.should_retry() && job.retry_count < job.max_retries;
        let target = if should_retry {
            JobStatus::Pending
        } else {
            JobStatus::Failed
        };
        job.status.ensure_transition(target)?;
        Self::ensure_owner(&job, worker_id)?;

        if should_retry {
            let retry_at = Utc::now() + retry_backoff(job.retry_count);
            let updated = sqlx::query(
                r#"
                UPDATE jobs
                SET status = 'pending',
                    retry_count = retry_count + 1,
                    retry_at = $3,
                    worker_id = NULL,
                    started_at = NULL,
                    updated_at = NOW()
                WHERE id = $1 AND status = 'processing' AND worker_id = $2
                "#,
            )
            .bind(job_id)
            .bind(worker_id)
            .bind(retry_at)
            .execute(&self.pool)
            .await?
            .rows_affected();

            if updated == 0 {
                return Ok(FinalizeOutcome::Discarded);
            }
            return Ok(FinalizeOutcome::RetryScheduled { retry_at });
        }

        let result = serde_json::json!({
            "error": error,
            "error_kind": kind.as_str(),
            "attempts": job.retry_count + 1,
        });
        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed',
                result = $3,
                failed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status = 'processing' AND worker_id = $2
            "#,
        )
        .bind(job_id)
        .bind(worker_id)
        .bind(result)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Ok(FinalizeOutcome::Discarded);
        }
        Ok(FinalizeOutcome::Failed)
    }

    async fn cancel(&self, job_id: Uuid) -> Result<bool> {
        let job = self.fetch_required(job_id).await?;
        job.status.ensure_transition(JobStatus::Cancelled)?;

        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'cancelled',
                cancelled_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(job_id)
        .bind(job.status)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated > 0)
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        self.get_internal(job_id).await
    }

    async fn active_job_exists(&self, job_type: JobType, entity_key: Uuid) -> Result<bool> {
        Self::active_job_exists_on(&self.pool, job_type, entity_key).await
    }

    async fn last_created_at(
        &self,
        job_type: JobType,
        campaign_id: Uuid,
        triggered_by: Option<TriggerSource>,
    ) -> Result<Option<DateTime<Utc>>> {
        Self::last_created_at_on(&self.pool, job_type, campaign_id, triggered_by).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps_at_an_hour() {
        assert_eq!(retry_backoff(0).num_seconds(), 60);
        assert_eq!(retry_backoff(1).num_seconds(), 120);
        assert_eq!(retry_backoff(2).num_seconds(), 240);
        assert_eq!(retry_backoff(6).num_seconds(), 3600);
        assert_eq!(retry_backoff(50).num_seconds(), 3600);
    }

    #[test]
    fn new_job_defaults() {
        let payload = JobPayload::Enrichment(crate::kernel::jobs::payload::EnrichmentPayload {
            lead_id: Uuid::new_v4(),
            campaign_id: Uuid::new_v4(),
            client_id: None,
            lead_name: "Ada".into(),
            company: None,
            attempt_number: 1,
        });
        let new_job = NewJob::new(payload);
        assert_eq!(new_job.priority, JobPriority::Normal);
        assert_eq!(new_job.max_retries, 3);
        assert!(new_job.scheduled_for.is_none());
    }
}
