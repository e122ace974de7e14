//! The standard trigger rule set.
//!
//! Five rules convert entity mutations into job creation decisions. Each is
//! an independent predicate + payload builder; shared duplicate/cooldown
//! logic lives in [`super::guard`].

use anyhow::Result;
use async_trait::async_trait;
use chrono::Duration;
use tracing::{debug, info};

use crate::domains::campaigns::CampaignStatus;
use crate::domains::leads::LeadStatus;
use crate::kernel::jobs::{
    DiscoveryPayload, EnrichmentPayload, JobPayload, JobType, OutreachPayload, ResearchPayload,
    TriggerSource,
};

use super::{guard, JobDraft, MutationEvent, TriggerContext, TriggerRule};

/// Below this many enriched leads, an active campaign refires discovery.
pub const LOW_SUPPLY_THRESHOLD: i64 = 5;

/// Hard ceiling on research jobs created in one evaluation pass.
pub const RESEARCH_BURST_CAP: i64 = 10;

/// Cooldown between research bursts for one campaign.
pub fn research_cooldown() -> Duration {
    Duration::hours(1)
}

/// Cooldown between discovery refires of matching provenance.
pub fn replenish_cooldown() -> Duration {
    Duration::minutes(5)
}

/// The standard rule set, in evaluation order.
pub fn default_rules() -> Vec<Box<dyn TriggerRule>> {
    vec![
        Box::new(CampaignActivationRule),
        Box::new(LowSupplyRule),
        Box::new(PlaceholderEmailRule),
        Box::new(CapacityResearchRule),
        Box::new(OutreachRule),
    ]
}

// ============================================================================
// Rule 1: campaign activation -> discovery
// ============================================================================

/// Fires when a campaign's status transitions into `active`. Creates one
/// discovery job carrying every configured platform search with its current
/// pagination cursor.
pub struct CampaignActivationRule;

#[async_trait]
impl TriggerRule for CampaignActivationRule {
    fn name(&self) -> &'static str {
        "campaign_activation"
    }

    async fn evaluate(&self, event: &MutationEvent, ctx: &mut dyn TriggerContext) -> Result<()> {
        let MutationEvent::CampaignUpdated { old, new } = event else {
            return Ok(());
        };
        if new.status != CampaignStatus::Active || old.status == CampaignStatus::Active {
            return Ok(());
        }
        if !new.has_search_config() {
            debug!(campaign_id = %new.id, "activated without search configuration, nothing to discover");
            return Ok(());
        }

        if guard::duplicate_suppressed(ctx, self.name(), JobType::Discovery, new.id).await? {
            return Ok(());
        }
        if guard::within_cooldown(
            ctx,
            self.name(),
            JobType::Discovery,
            new.id,
            Some(TriggerSource::CampaignActivated),
            replenish_cooldown(),
        )
        .await?
        {
            return Ok(());
        }

        let payload = JobPayload::Discovery(DiscoveryPayload {
            campaign_id: new.id,
            campaign_name: new.name.clone(),
            platform_urls: new.search_url.0.clone(),
            triggered_by: Some(TriggerSource::CampaignActivated),
        });
        let job = ctx.enqueue(JobDraft::new(payload)).await?;
        info!(campaign_id = %new.id, job_id = %job.id, "discovery job created for activated campaign");
        Ok(())
    }
}

// ============================================================================
// Rule 2: low enriched-lead supply -> discovery refire
// ============================================================================

/// Fires when an active campaign's enriched-lead count drops below the
/// threshold. Produces the exact same discovery job shape as activation,
/// tagged `low_enriched_leads` for provenance.
pub struct LowSupplyRule;

#[async_trait]
impl TriggerRule for LowSupplyRule {
    fn name(&self) -> &'static str {
        "low_enriched_leads"
    }

    async fn evaluate(&self, event: &MutationEvent, ctx: &mut dyn TriggerContext) -> Result<()> {
        let MutationEvent::LeadsChanged { campaign_id } = event else {
            return Ok(());
        };
        let Some(campaign) = ctx.campaign(*campaign_id).await? else {
            // Statement fired after a campaign-cascade delete.
            return Ok(());
        };
        if campaign.status != CampaignStatus::Active || !campaign.has_search_config() {
            return Ok(());
        }

        let enriched = ctx.count_leads(campaign.id, LeadStatus::Enriched).await?;
        if enriched >= LOW_SUPPLY_THRESHOLD {
            return Ok(());
        }

        if guard::duplicate_suppressed(ctx, self.name(), JobType::Discovery, campaign.id).await? {
            return Ok(());
        }
        if guard::within_cooldown(
            ctx,
            self.name(),
            JobType::Discovery,
            campaign.id,
            Some(TriggerSource::LowEnrichedLeads),
            replenish_cooldown(),
        )
        .await?
        {
            return Ok(());
        }

        let payload = JobPayload::Discovery(DiscoveryPayload {
            campaign_id: campaign.id,
            campaign_name: campaign.name.clone(),
            platform_urls: campaign.search_url.0.clone(),
            triggered_by: Some(TriggerSource::LowEnrichedLeads),
        });
        let job = ctx.enqueue(JobDraft::new(payload)).await?;
        info!(
            campaign_id = %campaign.id,
            job_id = %job.id,
            enriched,
            threshold = LOW_SUPPLY_THRESHOLD,
            "discovery job created to replenish lead supply"
        );
        Ok(())
    }
}

// ============================================================================
// Rule 3: placeholder email on insert -> enrichment
// ============================================================================

/// Fires on lead insertion when the email is a placeholder (unset, a generic
/// domain, or the platform's locked sentinel).
pub struct PlaceholderEmailRule;

#[async_trait]
impl TriggerRule for PlaceholderEmailRule {
    fn name(&self) -> &'static str {
        "placeholder_email_enrichment"
    }

    async fn evaluate(&self, event: &MutationEvent, ctx: &mut dyn TriggerContext) -> Result<()> {
        let MutationEvent::LeadInserted { lead } = event else {
            return Ok(());
        };
        if !lead.has_placeholder_email() {
            return Ok(());
        }

        if guard::duplicate_suppressed(ctx, self.name(), JobType::Enrichment, lead.id).await? {
            return Ok(());
        }

        let payload = JobPayload::Enrichment(EnrichmentPayload {
            lead_id: lead.id,
            campaign_id: lead.campaign_id,
            client_id: lead.client_id,
            lead_name: lead.full_name(),
            company: lead.company.clone(),
            attempt_number: 1,
        });
        let job = ctx.enqueue(JobDraft::new(payload)).await?;
        info!(lead_id = %lead.id, job_id = %job.id, "enrichment job created for placeholder email");
        Ok(())
    }
}

// ============================================================================
// Rule 4: send capacity available -> research burst
// ============================================================================

/// Fires when an active campaign has spare daily send capacity and enriched
/// leads that are not yet researched. The number of jobs created per pass is
/// capped at both the message gap and a hard ceiling, and the whole rule
/// observes a rolling one-hour cooldown per campaign.
pub struct CapacityResearchRule;

#[async_trait]
impl TriggerRule for CapacityResearchRule {
    fn name(&self) -> &'static str {
        "capacity_research"
    }

    async fn evaluate(&self, event: &MutationEvent, ctx: &mut dyn TriggerContext) -> Result<()> {
        let campaign_id = match event {
            MutationEvent::LeadsChanged { campaign_id } => *campaign_id,
            MutationEvent::MessagesChanged { campaign_id } => *campaign_id,
            _ => return Ok(()),
        };
        let Some(campaign) = ctx.campaign(campaign_id).await? else {
            return Ok(());
        };
        if campaign.status != CampaignStatus::Active {
            return Ok(());
        }

        let combined_limit = campaign.combined_daily_limit() as i64;
        if combined_limit <= 0 {
            return Ok(());
        }

        if guard::within_cooldown(
            ctx,
            self.name(),
            JobType::Research,
            campaign.id,
            None,
            research_cooldown(),
        )
        .await?
        {
            return Ok(());
        }

        let scheduled_today = ctx.messages_scheduled_today(campaign.id).await?;
        let message_gap = combined_limit - scheduled_today;
        if message_gap <= 0 {
            return Ok(());
        }

        let cap = message_gap.min(RESEARCH_BURST_CAP);
        let candidates = ctx
            .leads_in_status(campaign.id, LeadStatus::Enriched, cap)
            .await?;

        let mut created = 0i64;
        for lead in candidates {
            if created >= cap {
                break;
            }
            if guard::duplicate_suppressed(ctx, self.name(), JobType::Research, lead.id).await? {
                continue;
            }
            let payload = JobPayload::Research(ResearchPayload {
                lead_id: lead.id,
                campaign_id: campaign.id,
                campaign_name: campaign.name.clone(),
                lead_name: lead.full_name(),
                company: lead.company.clone(),
                triggered_by: TriggerSource::CapacityCheck,
            });
            ctx.enqueue(JobDraft::new(payload)).await?;
            created += 1;
        }

        if created > 0 {
            info!(
                campaign_id = %campaign.id,
                created,
                message_gap,
                scheduled_today,
                "research jobs created for spare send capacity"
            );
        }
        Ok(())
    }
}

// ============================================================================
// Rule 5: research complete -> outreach
// ============================================================================

/// Fires when a lead's status reaches `researched` (by update or by direct
/// insert in that state). High priority: timely outreach is latency
/// sensitive. Skips leads that already have a pending or processing
/// outreach job, and campaigns with no outreach channel enabled.
pub struct OutreachRule;

#[async_trait]
impl TriggerRule for OutreachRule {
    fn name(&self) -> &'static str {
        "research_complete_outreach"
    }

    async fn evaluate(&self, event: &MutationEvent, ctx: &mut dyn TriggerContext) -> Result<()> {
        let lead = match event {
            MutationEvent::LeadUpdated { old, new }
                if new.status == LeadStatus::Researched && old.status != LeadStatus::Researched =>
            {
                new
            }
            MutationEvent::LeadInserted { lead } if lead.status == LeadStatus::Researched => lead,
            _ => return Ok(()),
        };

        let Some(campaign) = ctx.campaign(lead.campaign_id).await? else {
            return Ok(());
        };
        let enabled_channels = campaign.enabled_channels();
        if !enabled_channels.any() {
            debug!(
                campaign_id = %campaign.id,
                lead_id = %lead.id,
                "no outreach channel enabled, skipping"
            );
            return Ok(());
        }

        if guard::duplicate_suppressed(ctx, self.name(), JobType::Outreach, lead.id).await? {
            return Ok(());
        }

        let payload = JobPayload::Outreach(OutreachPayload {
            lead_id: lead.id,
            campaign_id: campaign.id,
            campaign_name: campaign.name.clone(),
            lead_name: lead.full_name(),
            company: lead.company.clone(),
            email: lead.email.clone(),
            enabled_channels,
            daily_limits: campaign.daily_limits(),
            triggered_by: TriggerSource::LeadResearched,
            triggered_at: ctx.now(),
        });
        let job = ctx.enqueue(JobDraft::high(payload)).await?;
        info!(lead_id = %lead.id, job_id = %job.id, "outreach job created for researched lead");
        Ok(())
    }
}
