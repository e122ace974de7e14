//! Job registry for deserializing and executing jobs.
//!
//! The registry maps job types to handlers that receive the typed payload
//! and the dependency container. The runner claims rows from the queue and
//! dispatches them here without knowing any concrete payload types.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::kernel::deps::ServerDeps;

use super::job::{ErrorKind, Job};
use super::payload::JobType;

/// A handler failure, classified for the retry decision.
///
/// Handlers are adapters over external collaborators; they surface transient
/// conditions (rate limits, network) as `Recoverable` and everything that a
/// retry cannot fix (bad credentials, malformed input) as `Permanent`.
#[derive(Debug, Clone, Error)]
pub enum HandlerError {
    #[error("{message}")]
    Recoverable { message: String },
    #[error("{message}")]
    Permanent { message: String },
}

impl HandlerError {
    pub fn recoverable(message: impl std::fmt::Display) -> Self {
        HandlerError::Recoverable {
            message: message.to_string(),
        }
    }

    pub fn permanent(message: impl std::fmt::Display) -> Self {
        HandlerError::Permanent {
            message: message.to_string(),
        }
    }

    pub fn error_kind(&self) -> ErrorKind {
        match self {
            HandlerError::Recoverable { .. } => ErrorKind::Retryable,
            HandlerError::Permanent { .. } => ErrorKind::NonRetryable,
        }
    }
}

/// Result payload written into `jobs.result` on success.
pub type HandlerResult = Result<serde_json::Value, HandlerError>;

type BoxedHandler = Box<
    dyn Fn(serde_json::Value, Arc<ServerDeps>) -> Pin<Box<dyn Future<Output = HandlerResult> + Send>>
        + Send
        + Sync,
>;

/// Registry that maps job types to handlers.
///
/// Each handler is registered once at startup with the payload type it
/// expects; deserialization failures are permanent (retrying cannot fix a
/// malformed payload).
#[derive(Default)]
pub struct JobRegistry {
    registrations: HashMap<JobType, BoxedHandler>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            registrations: HashMap::new(),
        }
    }

    /// Register a handler for a job type.
    ///
    /// The handler receives the deserialized payload and the dependency
    /// container, and returns the result payload recorded on the job.
    pub fn register<P, F, Fut>(&mut self, job_type: JobType, handler: F)
    where
        P: DeserializeOwned + Send + 'static,
        F: Fn(P, Arc<ServerDeps>) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let boxed: BoxedHandler = Box::new(move |value, deps| {
            let handler = handler.clone();
            Box::pin(async move {
                let payload: P = serde_json::from_value(value).map_err(|e| {
                    HandlerError::permanent(format!(
                        "failed to deserialize {} payload: {}",
                        job_type, e
                    ))
                })?;
                handler(payload, deps).await
            })
        });

        self.registrations.insert(job_type, boxed);
    }

    /// Execute a claimed job using its registered handler.
    pub async fn execute(&self, job: &Job, deps: Arc<ServerDeps>) -> HandlerResult {
        let handler = self.registrations.get(&job.job_type).ok_or_else(|| {
            HandlerError::permanent(format!("unknown job type: {}", job.job_type))
        })?;

        handler(job.data.clone(), deps).await
    }

    pub fn is_registered(&self, job_type: JobType) -> bool {
        self.registrations.contains_key(&job_type)
    }

    pub fn registered_types(&self) -> Vec<JobType> {
        self.registrations.keys().copied().collect()
    }
}

/// Thread-safe registry wrapped in Arc.
pub type SharedJobRegistry = Arc<JobRegistry>;
