//! Job infrastructure for background work execution.
//!
//! This module provides the kernel-level job engine:
//! - [`Job`] - durable work item model and its status machine
//! - [`JobPayload`] - typed payloads, one variant per job type
//! - [`JobQueue`] / [`PostgresJobQueue`] - storage with the atomic claim
//! - [`JobRegistry`] - job_type to handler dispatch
//! - [`JobRunner`] - polling claim-and-execute loop
//!
//! # Architecture
//!
//! ```text
//! Trigger rule fires inside a mutation's transaction
//!     │
//!     └─► INSERT jobs row (status = pending)
//!
//! JobRunner (N independent processes)
//!     │
//!     ├─► claim: UPDATE ... WHERE status = 'pending'  (exactly one wins)
//!     ├─► JobRegistry.execute(payload, deps)
//!     └─► complete / fail (retry backoff) / discard on cancel
//! ```
//!
//! Business logic stays in domain handlers; this module only provides the
//! infrastructure.

mod job;
pub mod payload;
mod queue;
mod registry;
mod runner;
pub mod testing;

pub use job::{ErrorKind, Job, JobPriority, JobStatus};
pub use payload::{
    DailyLimits, DiscoveryPayload, EmailSendPayload, EnabledChannels, EnrichmentPayload,
    JobPayload, JobType, OutreachPayload, PlatformSearch, ResearchPayload, TriggerSource,
};
pub use queue::{
    retry_backoff, FinalizeOutcome, JobQueue, NewJob, NotOwner, PostgresJobQueue,
};
pub use registry::{HandlerError, HandlerResult, JobRegistry, SharedJobRegistry};
pub use runner::{JobRunner, JobRunnerConfig};
pub use testing::InMemoryJobQueue;
