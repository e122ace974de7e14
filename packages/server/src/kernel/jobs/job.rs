//! Job model for background work execution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::common::transitions::StatusMachine;

use super::payload::JobType;

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl StatusMachine for JobStatus {
    const ENTITY: &'static str = "job";

    fn transitions(self) -> &'static [Self] {
        match self {
            // Pending back to pending covers the retry path: a failed
            // attempt returns the row to a re-claimable state.
            JobStatus::Pending => &[JobStatus::Processing, JobStatus::Cancelled],
            JobStatus::Processing => &[
                JobStatus::Completed,
                JobStatus::Failed,
                JobStatus::Pending,
                JobStatus::Cancelled,
            ],
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => &[],
        }
    }
}

/// Claim ordering follows Postgres enum declaration order, so `Low` must be
/// declared first and claims sort `priority DESC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "job_priority", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    Low,
    #[default]
    Normal,
    High,
}

impl JobPriority {
    /// Integer rank for in-memory ordering (higher = claimed first).
    pub fn rank(&self) -> i16 {
        match self {
            JobPriority::Low => 0,
            JobPriority::Normal => 1,
            JobPriority::High => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transient error - will retry if attempts remain
    #[default]
    Retryable,
    /// Permanent error - will not retry
    NonRetryable,
}

impl ErrorKind {
    /// Whether this error kind should trigger a retry
    pub fn should_retry(&self) -> bool {
        matches!(self, ErrorKind::Retryable)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Retryable => "retryable",
            ErrorKind::NonRetryable => "non_retryable",
        }
    }
}

// ============================================================================
// Job Model
// ============================================================================

#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Job {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,

    pub job_type: JobType,
    pub data: serde_json::Value,

    #[builder(default)]
    pub priority: JobPriority,
    #[builder(default)]
    pub status: JobStatus,

    // Eligibility
    #[builder(default, setter(strip_option))]
    pub scheduled_for: Option<DateTime<Utc>>,

    // Retry bookkeeping
    #[builder(default = 0)]
    pub retry_count: i32,
    #[builder(default = 3)]
    pub max_retries: i32,
    #[builder(default, setter(strip_option))]
    pub retry_at: Option<DateTime<Utc>>,

    // Claim ownership
    #[builder(default, setter(strip_option))]
    pub worker_id: Option<String>,

    // Outcome
    #[builder(default, setter(strip_option))]
    pub result: Option<serde_json::Value>,

    // Status timestamps
    #[builder(default, setter(strip_option))]
    pub started_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub completed_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub failed_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub cancelled_at: Option<DateTime<Utc>>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Whether the row is eligible for claiming at `now`.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        if self.status != JobStatus::Pending {
            return false;
        }
        if let Some(scheduled_for) = self.scheduled_for {
            if scheduled_for > now {
                return false;
            }
        }
        if let Some(retry_at) = self.retry_at {
            if retry_at > now {
                return false;
            }
        }
        true
    }

    /// Whether the job has reached a state that accepts no further writes.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Check the status/timestamp co-constraint.
    ///
    /// `pending` implies no `started_at`; `processing` implies `started_at`
    /// and an owning worker; each terminal status implies its own timestamp.
    pub fn timestamps_consistent(&self) -> bool {
        match self.status {
            JobStatus::Pending => self.started_at.is_none() && self.worker_id.is_none(),
            JobStatus::Processing => self.started_at.is_some() && self.worker_id.is_some(),
            JobStatus::Completed => self.started_at.is_some() && self.completed_at.is_some(),
            JobStatus::Failed => self.failed_at.is_some(),
            JobStatus::Cancelled => self.cancelled_at.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job() -> Job {
        Job::builder()
            .job_type(JobType::Discovery)
            .data(serde_json::json!({"campaign_id": Uuid::new_v4()}))
            .build()
    }

    #[test]
    fn new_job_starts_with_pending_status() {
        let job = sample_job();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 0);
        assert_eq!(job.max_retries, 3);
    }

    #[test]
    fn new_job_has_normal_priority_by_default() {
        let job = sample_job();
        assert_eq!(job.priority, JobPriority::Normal);
    }

    #[test]
    fn pending_job_without_schedule_is_eligible() {
        let job = sample_job();
        assert!(job.is_eligible(Utc::now()));
    }

    #[test]
    fn future_scheduled_job_is_not_eligible() {
        let mut job = sample_job();
        job.scheduled_for = Some(Utc::now() + chrono::Duration::hours(1));
        assert!(!job.is_eligible(Utc::now()));
    }

    #[test]
    fn pending_retry_waits_for_retry_at() {
        let mut job = sample_job();
        job.retry_at = Some(Utc::now() + chrono::Duration::minutes(2));
        assert!(!job.is_eligible(Utc::now()));

        job.retry_at = Some(Utc::now() - chrono::Duration::minutes(2));
        assert!(job.is_eligible(Utc::now()));
    }

    #[test]
    fn processing_job_is_not_eligible() {
        let mut job = sample_job();
        job.status = JobStatus::Processing;
        assert!(!job.is_eligible(Utc::now()));
    }

    #[test]
    fn priority_rank_orders_high_first() {
        assert!(JobPriority::High.rank() > JobPriority::Normal.rank());
        assert!(JobPriority::Normal.rank() > JobPriority::Low.rank());
    }

    #[test]
    fn status_machine_allows_claim_and_retry() {
        assert!(JobStatus::Pending.can_transition(JobStatus::Processing));
        assert!(JobStatus::Processing.can_transition(JobStatus::Pending));
        assert!(JobStatus::Processing.can_transition(JobStatus::Completed));
    }

    #[test]
    fn terminal_job_statuses_accept_nothing() {
        for terminal in [JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled] {
            assert!(terminal.is_terminal());
            assert!(terminal.ensure_transition(JobStatus::Pending).is_err());
        }
    }

    #[test]
    fn pending_with_started_at_violates_invariant() {
        let mut job = sample_job();
        assert!(job.timestamps_consistent());

        job.started_at = Some(Utc::now());
        assert!(!job.timestamps_consistent());
    }

    #[test]
    fn processing_requires_owner_and_started_at() {
        let mut job = sample_job();
        job.status = JobStatus::Processing;
        assert!(!job.timestamps_consistent());

        job.started_at = Some(Utc::now());
        job.worker_id = Some("worker-1".to_string());
        assert!(job.timestamps_consistent());
    }

    #[test]
    fn retryable_error_should_retry() {
        assert!(ErrorKind::Retryable.should_retry());
        assert!(!ErrorKind::NonRetryable.should_retry());
    }
}
