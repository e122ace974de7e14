pub mod campaigns;
pub mod leads;
pub mod messages;
pub mod triggers;

use anyhow::Error;

use crate::kernel::jobs::{HandlerError, JobRegistry, JobType};

/// Map a database error from a handler to a failure kind: a missing row is
/// permanent (retrying cannot conjure it), everything else is assumed
/// transient.
pub(crate) fn classify_db_error(context: &str, error: Error) -> HandlerError {
    match error.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::RowNotFound) => {
            HandlerError::permanent(format!("{context}: row not found"))
        }
        _ => HandlerError::recoverable(format!("{context}: {error}")),
    }
}

/// Build the job registry wiring every job type to its domain handler.
pub fn build_job_registry() -> JobRegistry {
    let mut registry = JobRegistry::new();
    registry.register(JobType::Discovery, leads::handlers::handle_discovery);
    registry.register(JobType::Enrichment, leads::handlers::handle_enrichment);
    registry.register(JobType::Research, leads::handlers::handle_research);
    registry.register(JobType::Outreach, messages::handlers::handle_outreach);
    registry.register(JobType::EmailSend, messages::handlers::handle_email_send);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_covers_every_job_type() {
        let registry = build_job_registry();
        for job_type in [
            JobType::Discovery,
            JobType::Enrichment,
            JobType::Research,
            JobType::Outreach,
            JobType::EmailSend,
        ] {
            assert!(registry.is_registered(job_type), "{job_type} not registered");
        }
    }
}
