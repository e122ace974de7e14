//! In-memory job queue for tests.
//!
//! Mirrors the PostgreSQL queue's semantics (eligibility, claim ordering,
//! ownership checks, retry scheduling, cancellation races) behind a single
//! lock, so engine and trigger tests can run without a database.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::common::transitions::StatusMachine;

use super::job::{ErrorKind, Job, JobStatus};
use super::payload::{JobType, TriggerSource};
use super::queue::{retry_backoff, FinalizeOutcome, JobQueue, NewJob, NotOwner};

#[derive(Default)]
pub struct InMemoryJobQueue {
    jobs: Mutex<HashMap<Uuid, Job>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored jobs, in no particular order.
    pub fn jobs(&self) -> Vec<Job> {
        self.lock().values().cloned().collect()
    }

    /// Jobs of one type, oldest first.
    pub fn jobs_by_type(&self, job_type: JobType) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .lock()
            .values()
            .filter(|j| j.job_type == job_type)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    /// Rewrite a job's `created_at`, for cooldown-window tests.
    pub fn backdate(&self, job_id: Uuid, created_at: DateTime<Utc>) {
        if let Some(job) = self.lock().get_mut(&job_id) {
            job.created_at = created_at;
        }
    }

    /// Collapse a pending job's retry/schedule delay so the next poll can
    /// claim it immediately.
    pub fn make_eligible(&self, job_id: Uuid) {
        if let Some(job) = self.lock().get_mut(&job_id) {
            if job.retry_at.is_some() {
                job.retry_at = Some(Utc::now() - chrono::Duration::seconds(1));
            }
            if job.scheduled_for.is_some() {
                job.scheduled_for = Some(Utc::now() - chrono::Duration::seconds(1));
            }
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Job>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
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

    fn payload_field(job: &Job, field: &str) -> Option<String> {
        job.data.get(field).and_then(|v| v.as_str()).map(str::to_string)
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, new_job: NewJob) -> Result<Job> {
        let job = Job::builder()
            .job_type(new_job.payload.job_type())
            .data(new_job.payload.to_value()?)
            .priority(new_job.priority)
            .max_retries(new_job.max_retries)
            .build();
        let job = Job {
            scheduled_for: new_job.scheduled_for,
            ..job
        };

        debug_assert!(job.timestamps_consistent());
        self.lock().insert(job.id, job.clone());
        Ok(job)
    }

    async fn claim(&self, worker_id: &str, limit: i64) -> Result<Vec<Job>> {
        let now = Utc::now();
        let mut jobs = self.lock();

        let mut eligible: Vec<Uuid> = jobs
            .values()
            .filter(|j| j.is_eligible(now))
            .map(|j| j.id)
            .collect();
        eligible.sort_by(|a, b| {
            let ja = &jobs[a];
            let jb = &jobs[b];
            jb.priority
                .rank()
                .cmp(&ja.priority.rank())
                .then(ja.created_at.cmp(&jb.created_at))
        });
        eligible.truncate(limit.max(0) as usize);

        let mut claimed = Vec::with_capacity(eligible.len());
        for id in eligible {
            let job = jobs.get_mut(&id).expect("job present under lock");
            // Same conditional the SQL claim applies.
            if job.status != JobStatus::Pending {
                continue;
            }
            job.status = JobStatus::Processing;
            job.started_at = Some(now);
            job.worker_id = Some(worker_id.to_string());
            job.updated_at = now;
            debug_assert!(job.timestamps_consistent());
            claimed.push(job.clone());
        }
        Ok(claimed)
    }

    async fn complete(
        &self,
        job_id: Uuid,
        worker_id: &str,
        result: serde_json::Value,
    ) -> Result<FinalizeOutcome> {
        let mut jobs = self.lock();
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| anyhow!("job {} not found", job_id))?;

        if job.status == JobStatus::Cancelled {
            return Ok(FinalizeOutcome::Discarded);
        }
        job.status.ensure_transition(JobStatus::Completed)?;
        Self::ensure_owner(job, worker_id)?;

        let now = Utc::now();
        job.status = JobStatus::Completed;
        job.result = Some(result);
        job.completed_at = Some(now);
        job.updated_at = now;
        debug_assert!(job.timestamps_consistent());
        Ok(FinalizeOutcome::Completed)
    }

    async fn fail(
        &self,
        job_id: Uuid,
        worker_id: &str,
        error: &str,
        kind: ErrorKind,
    ) -> Result<FinalizeOutcome> {
        let mut jobs = self.lock();
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| anyhow!("job {} not found", job_id))?;

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
        Self::ensure_owner(job, worker_id)?;

        let now = Utc::now();
        if should_retry {
            let retry_at = now + retry_backoff(job.retry_count);
            job.status = JobStatus::Pending;
            job.retry_count += 1;
            job.retry_at = Some(retry_at);
            job.worker_id = None;
            job.started_at = None;
            job.updated_at = now;
            debug_assert!(job.timestamps_consistent());
            return Ok(FinalizeOutcome::RetryScheduled { retry_at });
        }

        job.status = JobStatus::Failed;
        job.result = Some(serde_json::json!({
            "error": error,
            "error_kind": kind.as_str(),
            "attempts": job.retry_count + 1,
        }));
        job.failed_at = Some(now);
        job.updated_at = now;
        debug_assert!(job.timestamps_consistent());
        Ok(FinalizeOutcome::Failed)
    }

    async fn cancel(&self, job_id: Uuid) -> Result<bool> {
        let mut jobs = self.lock();
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| anyhow!("job {} not found", job_id))?;

        job.status.ensure_transition(JobStatus::Cancelled)?;

        let now = Utc::now();
        job.status = JobStatus::Cancelled;
        job.cancelled_at = Some(now);
        job.updated_at = now;
        debug_assert!(job.timestamps_consistent());
        Ok(true)
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        Ok(self.lock().get(&job_id).cloned())
    }

    async fn active_job_exists(&self, job_type: JobType, entity_key: Uuid) -> Result<bool> {
        let key = entity_key.to_string();
        let field = job_type.entity_field();
        Ok(self.lock().values().any(|j| {
            j.job_type == job_type
                && matches!(j.status, JobStatus::Pending | JobStatus::Processing)
                && Self::payload_field(j, field).as_deref() == Some(key.as_str())
        }))
    }

    async fn last_created_at(
        &self,
        job_type: JobType,
        campaign_id: Uuid,
        triggered_by: Option<TriggerSource>,
    ) -> Result<Option<DateTime<Utc>>> {
        let campaign_key = campaign_id.to_string();
        let last = self
            .lock()
            .values()
            .filter(|j| j.job_type == job_type)
            .filter(|j| Self::payload_field(j, "campaign_id").as_deref() == Some(campaign_key.as_str()))
            .filter(|j| match triggered_by {
                Some(source) => {
                    Self::payload_field(j, "triggered_by").as_deref() == Some(source.as_str())
                }
                None => true,
            })
            .map(|j| j.created_at)
            .max();
        Ok(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::jobs::payload::{EnrichmentPayload, JobPayload};
    use crate::kernel::jobs::JobPriority;

    fn enrichment(lead_id: Uuid) -> JobPayload {
        JobPayload::Enrichment(EnrichmentPayload {
            lead_id,
            campaign_id: Uuid::new_v4(),
            client_id: None,
            lead_name: "Ada Lovelace".into(),
            company: Some("Analytical Engines".into()),
            attempt_number: 1,
        })
    }

    #[tokio::test]
    async fn enqueue_then_claim_sets_ownership() {
        let queue = InMemoryJobQueue::new();
        let job = queue.enqueue(NewJob::new(enrichment(Uuid::new_v4()))).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.timestamps_consistent());

        let claimed = queue.claim("worker-a", 10).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].status, JobStatus::Processing);
        assert_eq!(claimed[0].worker_id.as_deref(), Some("worker-a"));
        assert!(claimed[0].started_at.is_some());

        // Nothing left to claim.
        assert!(queue.claim("worker-b", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn high_priority_claims_before_older_normal() {
        let queue = InMemoryJobQueue::new();
        let normal = queue.enqueue(NewJob::new(enrichment(Uuid::new_v4()))).await.unwrap();
        let high = queue
            .enqueue(NewJob::new(enrichment(Uuid::new_v4())).with_priority(JobPriority::High))
            .await
            .unwrap();

        let claimed = queue.claim("w", 1).await.unwrap();
        assert_eq!(claimed[0].id, high.id);

        let claimed = queue.claim("w", 1).await.unwrap();
        assert_eq!(claimed[0].id, normal.id);
    }

    #[tokio::test]
    async fn complete_rejects_non_owner() {
        let queue = InMemoryJobQueue::new();
        let job = queue.enqueue(NewJob::new(enrichment(Uuid::new_v4()))).await.unwrap();
        queue.claim("worker-a", 1).await.unwrap();

        let err = queue
            .complete(job.id, "worker-b", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<NotOwner>().is_some());

        // The row is unchanged and the real owner can still finalize.
        let outcome = queue
            .complete(job.id, "worker-a", serde_json::json!({"ok": true}))
            .await
            .unwrap();
        assert_eq!(outcome, FinalizeOutcome::Completed);
    }

    #[tokio::test]
    async fn retryable_failure_requeues_with_backoff() {
        let queue = InMemoryJobQueue::new();
        let job = queue.enqueue(NewJob::new(enrichment(Uuid::new_v4()))).await.unwrap();
        queue.claim("w", 1).await.unwrap();

        let outcome = queue
            .fail(job.id, "w", "rate limited", ErrorKind::Retryable)
            .await
            .unwrap();
        assert!(matches!(outcome, FinalizeOutcome::RetryScheduled { .. }));

        let stored = queue.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
        assert_eq!(stored.retry_count, 1);
        assert!(stored.retry_at.unwrap() > Utc::now());
        assert!(stored.worker_id.is_none());
        assert!(stored.started_at.is_none());
        assert!(stored.timestamps_consistent());
    }

    #[tokio::test]
    async fn non_retryable_failure_is_terminal() {
        let queue = InMemoryJobQueue::new();
        let job = queue.enqueue(NewJob::new(enrichment(Uuid::new_v4()))).await.unwrap();
        queue.claim("w", 1).await.unwrap();

        let outcome = queue
            .fail(job.id, "w", "bad credentials", ErrorKind::NonRetryable)
            .await
            .unwrap();
        assert_eq!(outcome, FinalizeOutcome::Failed);

        let stored = queue.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.result.unwrap()["error"], "bad credentials");
        assert!(stored.failed_at.is_some());
    }

    #[tokio::test]
    async fn cancelled_job_discards_late_result() {
        let queue = InMemoryJobQueue::new();
        let job = queue.enqueue(NewJob::new(enrichment(Uuid::new_v4()))).await.unwrap();
        queue.claim("w", 1).await.unwrap();

        assert!(queue.cancel(job.id).await.unwrap());

        let outcome = queue
            .complete(job.id, "w", serde_json::json!({"late": true}))
            .await
            .unwrap();
        assert_eq!(outcome, FinalizeOutcome::Discarded);

        let stored = queue.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Cancelled);
        assert!(stored.result.is_none());
    }

    #[tokio::test]
    async fn cancelling_a_terminal_job_is_rejected() {
        let queue = InMemoryJobQueue::new();
        let job = queue.enqueue(NewJob::new(enrichment(Uuid::new_v4()))).await.unwrap();
        queue.claim("w", 1).await.unwrap();
        queue.complete(job.id, "w", serde_json::json!({})).await.unwrap();

        assert!(queue.cancel(job.id).await.is_err());
    }

    #[tokio::test]
    async fn duplicate_lookup_matches_entity_key() {
        let queue = InMemoryJobQueue::new();
        let lead_id = Uuid::new_v4();
        queue.enqueue(NewJob::new(enrichment(lead_id))).await.unwrap();

        assert!(queue
            .active_job_exists(JobType::Enrichment, lead_id)
            .await
            .unwrap());
        assert!(!queue
            .active_job_exists(JobType::Enrichment, Uuid::new_v4())
            .await
            .unwrap());
        assert!(!queue
            .active_job_exists(JobType::Research, lead_id)
            .await
            .unwrap());
    }
}
