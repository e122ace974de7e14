//! Job runner service for processing background jobs.
//!
//! The `JobRunner` is a background service that:
//! - Polls the queue for eligible jobs and claims a batch atomically
//! - Dispatches each claimed job to its registered handler
//! - Writes outcomes back (completed / retry-pending / failed)
//!
//! # Architecture
//!
//! ```text
//! JobRunner
//!     │
//!     ├─► Poll queue (atomic claim, priority-first)
//!     ├─► Re-check cancellation before dispatch
//!     ├─► Execute via JobRegistry (deserialize + call handler)
//!     └─► complete / fail (queue handles retry backoff)
//! ```
//!
//! Multiple runner processes may poll the same queue; correctness rests
//! entirely on the queue's conditional claim. One job's failure never aborts
//! the loop or other in-flight jobs.
//!
//! # Example
//!
//! ```ignore
//! let registry = Arc::new(build_job_registry());
//! let runner = JobRunner::new(queue, registry, deps);
//!
//! tokio::spawn(runner.run());
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::kernel::deps::ServerDeps;

use super::job::{Job, JobStatus};
use super::queue::{FinalizeOutcome, JobQueue};
use super::registry::SharedJobRegistry;

/// Configuration for the job runner.
#[derive(Debug, Clone)]
pub struct JobRunnerConfig {
    /// Maximum number of jobs to claim at once
    pub batch_size: i64,
    /// How long to wait when no jobs are available
    pub poll_interval: Duration,
    /// Worker ID for this instance
    pub worker_id: String,
}

impl Default for JobRunnerConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            poll_interval: Duration::from_secs(10),
            worker_id: format!("worker-{}", Uuid::new_v4()),
        }
    }
}

impl JobRunnerConfig {
    /// Create a new config with a specific worker ID.
    pub fn with_worker_id(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            ..Default::default()
        }
    }
}

/// Background service that claims and executes jobs from the queue.
pub struct JobRunner {
    queue: Arc<dyn JobQueue>,
    registry: SharedJobRegistry,
    deps: Arc<ServerDeps>,
    config: JobRunnerConfig,
    shutdown: Arc<AtomicBool>,
}

impl JobRunner {
    pub fn new(queue: Arc<dyn JobQueue>, registry: SharedJobRegistry, deps: Arc<ServerDeps>) -> Self {
        Self::with_config(queue, registry, deps, JobRunnerConfig::default())
    }

    pub fn with_config(
        queue: Arc<dyn JobQueue>,
        registry: SharedJobRegistry,
        deps: Arc<ServerDeps>,
        config: JobRunnerConfig,
    ) -> Self {
        Self {
            queue,
            registry,
            deps,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a shutdown handle for graceful shutdown.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Request shutdown of the runner.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Run the job runner until shutdown is requested.
    pub async fn run(self) -> Result<()> {
        info!(
            worker_id = %self.config.worker_id,
            batch_size = self.config.batch_size,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "job runner starting"
        );

        loop {
            if self.is_shutdown_requested() {
                break;
            }

            let jobs = match self
                .queue
                .claim(&self.config.worker_id, self.config.batch_size)
                .await
            {
                Ok(jobs) => jobs,
                Err(e) => {
                    error!(error = %e, "failed to claim jobs");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            if jobs.is_empty() {
                tokio::time::sleep(self.config.poll_interval).await;
                continue;
            }

            debug!(count = jobs.len(), "claimed jobs");

            // A slow handler only blocks its own job, not the batch.
            let futures: Vec<_> = jobs.into_iter().map(|job| self.process_job(job)).collect();
            futures::future::join_all(futures).await;
        }

        info!(worker_id = %self.config.worker_id, "job runner stopped");
        Ok(())
    }

    /// Run until a shutdown signal is received.
    ///
    /// Convenience method that listens for Ctrl+C.
    pub async fn run_until_shutdown(self) -> Result<()> {
        let shutdown = self.shutdown_handle();

        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("received shutdown signal");
            shutdown.store(true, Ordering::SeqCst);
        });

        self.run().await
    }

    /// Execute one claimed job and write back its outcome.
    async fn process_job(&self, job: Job) {
        let job_id = job.id;
        let job_type = job.job_type;

        // Cancellation may have landed between claim and dispatch; observe
        // it before spending money on the handler.
        match self.queue.get(job_id).await {
            Ok(Some(current)) if current.status == JobStatus::Cancelled => {
                info!(job_id = %job_id, job_type = %job_type, "job cancelled before dispatch");
                return;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "failed to re-check job before dispatch");
            }
        }

        debug!(job_id = %job_id, job_type = %job_type, "executing job");

        match self.registry.execute(&job, self.deps.clone()).await {
            Ok(result) => {
                match self
                    .queue
                    .complete(job_id, &self.config.worker_id, result)
                    .await
                {
                    Ok(FinalizeOutcome::Completed) => {
                        info!(job_id = %job_id, job_type = %job_type, "job completed");
                    }
                    Ok(FinalizeOutcome::Discarded) => {
                        info!(job_id = %job_id, job_type = %job_type, "job cancelled during execution, result discarded");
                    }
                    Ok(other) => {
                        warn!(job_id = %job_id, outcome = ?other, "unexpected finalize outcome");
                    }
                    Err(e) => {
                        error!(job_id = %job_id, error = %e, "failed to mark job as completed");
                    }
                }
            }
            Err(handler_err) => {
                warn!(job_id = %job_id, job_type = %job_type, error = %handler_err, "job failed");
                match self
                    .queue
                    .fail(
                        job_id,
                        &self.config.worker_id,
                        &handler_err.to_string(),
                        handler_err.error_kind(),
                    )
                    .await
                {
                    Ok(FinalizeOutcome::RetryScheduled { retry_at }) => {
                        info!(job_id = %job_id, retry_at = %retry_at, "job scheduled for retry");
                    }
                    Ok(FinalizeOutcome::Failed) => {
                        warn!(job_id = %job_id, job_type = %job_type, "job failed terminally");
                    }
                    Ok(FinalizeOutcome::Discarded) => {
                        info!(job_id = %job_id, "job cancelled during execution, failure discarded");
                    }
                    Ok(other) => {
                        warn!(job_id = %job_id, outcome = ?other, "unexpected finalize outcome");
                    }
                    Err(e) => {
                        error!(job_id = %job_id, error = %e, "failed to mark job as failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = JobRunnerConfig::default();
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert!(config.worker_id.starts_with("worker-"));
    }

    #[test]
    fn config_with_worker_id() {
        let config = JobRunnerConfig::with_worker_id("my-worker");
        assert_eq!(config.worker_id, "my-worker");
    }
}
