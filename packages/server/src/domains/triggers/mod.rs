//! Event-triggered job creation.
//!
//! A registry of rules, each bound to a mutation event, decides when a job
//! must exist. The persistence layer invokes [`TriggerEngine::on_event`]
//! inside the same transaction as the watched mutation, so job creation and
//! the triggering write commit together.
//!
//! Two properties hold for every rule:
//! - evaluation failures are logged and never block the underlying mutation;
//! - duplicate suppression and cooldowns go through the shared guard in
//!   [`guard`], never ad hoc queries in the rule body.
//!
//! ```text
//! Campaign / Lead / Message mutation (in tx)
//!     │
//!     ├─► row event      (CampaignUpdated, LeadInserted, LeadUpdated)
//!     ├─► statement event (LeadsChanged, MessagesChanged)
//!     │
//!     └─► TriggerEngine::on_event
//!             ├─► rule.evaluate(event, ctx)   per registered rule
//!             └─► ctx.enqueue(draft)          inserts pending job in tx
//! ```

pub mod guard;
mod pg;
mod rules;
pub mod testing;

pub use pg::PgTriggerContext;
pub use rules::{
    default_rules, replenish_cooldown, research_cooldown, CampaignActivationRule,
    CapacityResearchRule, LowSupplyRule, OutreachRule, PlaceholderEmailRule,
    LOW_SUPPLY_THRESHOLD, RESEARCH_BURST_CAP,
};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::domains::campaigns::Campaign;
use crate::domains::leads::{Lead, LeadStatus};
use crate::kernel::jobs::{Job, JobPayload, JobPriority, JobType, TriggerSource};

/// A mutation the trigger layer watches.
#[derive(Debug, Clone)]
pub enum MutationEvent {
    CampaignUpdated {
        old: Campaign,
        new: Campaign,
    },
    LeadInserted {
        lead: Lead,
    },
    LeadUpdated {
        old: Lead,
        new: Lead,
    },
    /// Statement-level: a campaign's lead set changed (insert/update/delete).
    /// Aggregate rules key off this instead of per-row events so bulk
    /// operations evaluate once.
    LeadsChanged {
        campaign_id: Uuid,
    },
    /// Statement-level: a campaign's message set changed.
    MessagesChanged {
        campaign_id: Uuid,
    },
}

/// A job a rule has decided to create.
#[derive(Debug, Clone)]
pub struct JobDraft {
    pub payload: JobPayload,
    pub priority: JobPriority,
}

impl JobDraft {
    pub fn new(payload: JobPayload) -> Self {
        Self {
            payload,
            priority: JobPriority::Normal,
        }
    }

    pub fn high(payload: JobPayload) -> Self {
        Self {
            payload,
            priority: JobPriority::High,
        }
    }
}

/// The reads and the enqueue sink a rule needs, abstracted so rules run
/// identically inside a Postgres transaction and in unit tests.
#[async_trait]
pub trait TriggerContext: Send {
    /// Evaluation-time clock; cooldown windows measure against this.
    fn now(&self) -> DateTime<Utc>;

    async fn campaign(&mut self, id: Uuid) -> Result<Option<Campaign>>;

    async fn count_leads(&mut self, campaign_id: Uuid, status: LeadStatus) -> Result<i64>;

    /// Oldest-first leads in one status, capped.
    async fn leads_in_status(
        &mut self,
        campaign_id: Uuid,
        status: LeadStatus,
        limit: i64,
    ) -> Result<Vec<Lead>>;

    async fn messages_scheduled_today(&mut self, campaign_id: Uuid) -> Result<i64>;

    /// Whether a non-terminal job of this type already targets the entity.
    async fn active_job_exists(&mut self, job_type: JobType, entity_key: Uuid) -> Result<bool>;

    /// `created_at` of the most recent matching job, optionally narrowed to
    /// one provenance.
    async fn last_job_created_at(
        &mut self,
        job_type: JobType,
        campaign_id: Uuid,
        triggered_by: Option<TriggerSource>,
    ) -> Result<Option<DateTime<Utc>>>;

    async fn enqueue(&mut self, draft: JobDraft) -> Result<Job>;
}

/// One condition rule: a predicate over a mutation event plus a payload
/// builder.
#[async_trait]
pub trait TriggerRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Evaluate the rule against an event. Creating no job is the normal
    /// outcome; errors are reported to the engine and never propagate to
    /// the mutation.
    async fn evaluate(&self, event: &MutationEvent, ctx: &mut dyn TriggerContext) -> Result<()>;
}

/// Registry of trigger rules.
pub struct TriggerEngine {
    rules: Vec<Box<dyn TriggerRule>>,
}

impl TriggerEngine {
    pub fn new(rules: Vec<Box<dyn TriggerRule>>) -> Self {
        Self { rules }
    }

    /// Engine with the standard rule set.
    pub fn with_default_rules() -> Self {
        Self::new(default_rules())
    }

    /// Run every rule against the event.
    ///
    /// Best-effort by contract: a failing rule is logged at warn and the
    /// remaining rules still run, so condition evaluation can never fail
    /// the triggering write.
    pub async fn on_event(&self, event: &MutationEvent, ctx: &mut dyn TriggerContext) {
        for rule in &self.rules {
            if let Err(error) = rule.evaluate(event, ctx).await {
                warn!(rule = rule.name(), error = %error, "trigger rule evaluation failed");
            }
        }
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MemoryTriggerContext;
    use super::*;
    use anyhow::anyhow;

    struct FailingRule;

    #[async_trait]
    impl TriggerRule for FailingRule {
        fn name(&self) -> &'static str {
            "failing_rule"
        }

        async fn evaluate(
            &self,
            _event: &MutationEvent,
            _ctx: &mut dyn TriggerContext,
        ) -> Result<()> {
            Err(anyhow!("malformed configuration"))
        }
    }

    struct CountingRule;

    #[async_trait]
    impl TriggerRule for CountingRule {
        fn name(&self) -> &'static str {
            "counting_rule"
        }

        async fn evaluate(
            &self,
            event: &MutationEvent,
            ctx: &mut dyn TriggerContext,
        ) -> Result<()> {
            if let MutationEvent::LeadsChanged { campaign_id } = event {
                // Existence probe just to exercise the context.
                let _ = ctx.count_leads(*campaign_id, LeadStatus::Enriched).await?;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn failing_rule_does_not_stop_later_rules() {
        let engine = TriggerEngine::new(vec![Box::new(FailingRule), Box::new(CountingRule)]);
        let mut ctx = MemoryTriggerContext::new();

        // Must not panic or error out; the failure is contained.
        engine
            .on_event(
                &MutationEvent::LeadsChanged {
                    campaign_id: Uuid::new_v4(),
                },
                &mut ctx,
            )
            .await;
    }

    #[test]
    fn default_rule_set_is_complete() {
        let engine = TriggerEngine::with_default_rules();
        let names = engine.rule_names();
        assert_eq!(names.len(), 5);
        assert!(names.contains(&"campaign_activation"));
        assert!(names.contains(&"low_enriched_leads"));
        assert!(names.contains(&"placeholder_email_enrichment"));
        assert!(names.contains(&"capacity_research"));
        assert!(names.contains(&"research_complete_outreach"));
    }
}
