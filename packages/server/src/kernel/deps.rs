//! Server dependencies for job handlers (using traits for testability)
//!
//! This module provides the central dependency container handed to every job
//! handler. All external collaborators sit behind trait abstractions so
//! handlers can be exercised with mocks.

use std::sync::Arc;

use sqlx::PgPool;

use crate::domains::triggers::TriggerEngine;
use crate::kernel::jobs::JobQueue;
use crate::kernel::traits::{
    BaseEmailSender, BaseLeadEnricher, BaseLeadResearcher, BaseLeadSearch, BaseOutreachComposer,
};

/// Dependencies accessible to job handlers.
#[derive(Clone)]
pub struct ServerDeps {
    pub db_pool: PgPool,
    /// Job queue, for handlers that enqueue follow-up work (outreach
    /// scheduling email sends).
    pub job_queue: Arc<dyn JobQueue>,
    /// Trigger engine, so handler-driven mutations fire the same rules as
    /// API-driven ones.
    pub triggers: Arc<TriggerEngine>,
    pub lead_search: Arc<dyn BaseLeadSearch>,
    pub enricher: Arc<dyn BaseLeadEnricher>,
    pub researcher: Arc<dyn BaseLeadResearcher>,
    pub composer: Arc<dyn BaseOutreachComposer>,
    pub email_sender: Arc<dyn BaseEmailSender>,
}

impl ServerDeps {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db_pool: PgPool,
        job_queue: Arc<dyn JobQueue>,
        triggers: Arc<TriggerEngine>,
        lead_search: Arc<dyn BaseLeadSearch>,
        enricher: Arc<dyn BaseLeadEnricher>,
        researcher: Arc<dyn BaseLeadResearcher>,
        composer: Arc<dyn BaseOutreachComposer>,
        email_sender: Arc<dyn BaseEmailSender>,
    ) -> Self {
        Self {
            db_pool,
            job_queue,
            triggers,
            lead_search,
            enricher,
            researcher,
            composer,
            email_sender,
        }
    }
}
