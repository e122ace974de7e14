//! End-to-end trigger rule scenarios against the in-memory context.

use chrono::Duration;
use uuid::Uuid;

use autopilot_core::domains::campaigns::{Campaign, CampaignStatus};
use autopilot_core::domains::leads::{Lead, LeadStatus};
use autopilot_core::domains::triggers::testing::MemoryTriggerContext;
use autopilot_core::domains::triggers::{
    MutationEvent, TriggerEngine, LOW_SUPPLY_THRESHOLD, RESEARCH_BURST_CAP,
};
use autopilot_core::kernel::jobs::{
    FinalizeOutcome, JobPriority, JobQueue, JobStatus, JobType, PlatformSearch,
};

fn engine() -> TriggerEngine {
    TriggerEngine::with_default_rules()
}

fn apollo_campaign(status: CampaignStatus) -> Campaign {
    let mut campaign = Campaign::builder()
        .name("CEO Outreach")
        .status(status)
        .build();
    campaign.search_url.0.insert(
        "apollo".to_string(),
        PlatformSearch {
            search_url: "https://app.apollo.io/#/people/search?personTitles[]=CEO".to_string(),
            page_number: 1,
        },
    );
    campaign
}

fn outreach_campaign() -> Campaign {
    let mut campaign = Campaign::builder()
        .name("Test Outreach Campaign")
        .status(CampaignStatus::Active)
        .build();
    campaign.email_outreach = true;
    campaign.linkedin_outreach = true;
    campaign.daily_sending_limit_email = 5;
    campaign.daily_sending_limit_linkedin = 3;
    campaign
}

fn lead(campaign_id: Uuid, status: LeadStatus) -> Lead {
    let lead = Lead::builder()
        .campaign_id(campaign_id)
        .first_name("John")
        .last_name("TestLead")
        .status(status)
        .build();
    Lead {
        email: Some("john.testlead@example.org".to_string()),
        company: Some("Test Company Inc".to_string()),
        ..lead
    }
}

fn activation_event(campaign: &Campaign) -> MutationEvent {
    let mut old = campaign.clone();
    old.status = CampaignStatus::Draft;
    MutationEvent::CampaignUpdated {
        old,
        new: campaign.clone(),
    }
}

// ---------------------------------------------------------------------------
// Scenario A: campaign activation creates exactly one discovery job
// ---------------------------------------------------------------------------

#[tokio::test]
async fn activation_creates_one_pending_discovery_job() {
    let campaign = apollo_campaign(CampaignStatus::Active);
    let mut ctx = MemoryTriggerContext::new().with_campaign(campaign.clone());

    engine().on_event(&activation_event(&campaign), &mut ctx).await;

    let jobs = ctx.queue.jobs_by_type(JobType::Discovery);
    assert_eq!(jobs.len(), 1);
    let job = &jobs[0];
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.data["platform_urls"]["apollo"]["page_number"], 1);
    assert_eq!(job.data["campaign_id"], campaign.id.to_string());
    assert_eq!(job.data["triggered_by"], "campaign_activated");
}

#[tokio::test]
async fn repeated_activation_is_idempotent() {
    let campaign = apollo_campaign(CampaignStatus::Active);
    let mut ctx = MemoryTriggerContext::new().with_campaign(campaign.clone());
    let rules = engine();

    let event = activation_event(&campaign);
    rules.on_event(&event, &mut ctx).await;
    rules.on_event(&event, &mut ctx).await;
    rules.on_event(&event, &mut ctx).await;

    assert_eq!(ctx.queue.jobs_by_type(JobType::Discovery).len(), 1);
}

#[tokio::test]
async fn reactivation_respects_cooldown_after_completion() {
    let campaign = apollo_campaign(CampaignStatus::Active);
    let mut ctx = MemoryTriggerContext::new().with_campaign(campaign.clone());
    let rules = engine();
    let event = activation_event(&campaign);

    rules.on_event(&event, &mut ctx).await;
    let job = ctx.queue.jobs_by_type(JobType::Discovery).pop().unwrap();

    // Finish the first job so the duplicate guard no longer applies.
    ctx.queue.claim("w", 1).await.unwrap();
    let outcome = ctx
        .queue
        .complete(job.id, "w", serde_json::json!({"leads_created": 0}))
        .await
        .unwrap();
    assert_eq!(outcome, FinalizeOutcome::Completed);

    // Still inside the provenance cooldown: no second job.
    rules.on_event(&event, &mut ctx).await;
    assert_eq!(ctx.queue.jobs_by_type(JobType::Discovery).len(), 1);

    // Past the window, activation may fire again.
    ctx.advance(Duration::minutes(6));
    rules.on_event(&event, &mut ctx).await;
    assert_eq!(ctx.queue.jobs_by_type(JobType::Discovery).len(), 2);
}

#[tokio::test]
async fn activation_without_search_config_creates_nothing() {
    let campaign = Campaign::builder()
        .name("No Sources")
        .status(CampaignStatus::Active)
        .build();
    let mut ctx = MemoryTriggerContext::new().with_campaign(campaign.clone());

    engine().on_event(&activation_event(&campaign), &mut ctx).await;

    assert!(ctx.queue.jobs().is_empty());
}

// ---------------------------------------------------------------------------
// Scenario B: placeholder email on insert creates an enrichment job
// ---------------------------------------------------------------------------

#[tokio::test]
async fn placeholder_email_creates_enrichment_job() {
    let campaign_id = Uuid::new_v4();
    let inserted = Lead {
        email: Some("email_not_unlocked@domain.com".to_string()),
        ..lead(campaign_id, LeadStatus::New)
    };
    let mut ctx = MemoryTriggerContext::new();

    engine()
        .on_event(&MutationEvent::LeadInserted { lead: inserted.clone() }, &mut ctx)
        .await;

    let jobs = ctx.queue.jobs_by_type(JobType::Enrichment);
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Pending);
    assert_eq!(jobs[0].data["lead_id"], inserted.id.to_string());
    assert_eq!(jobs[0].data["attempt_number"], 1);
}

#[tokio::test]
async fn real_email_skips_enrichment() {
    let inserted = lead(Uuid::new_v4(), LeadStatus::New);
    let mut ctx = MemoryTriggerContext::new();

    engine()
        .on_event(&MutationEvent::LeadInserted { lead: inserted }, &mut ctx)
        .await;

    assert!(ctx.queue.jobs_by_type(JobType::Enrichment).is_empty());
}

// ---------------------------------------------------------------------------
// Scenario C: research completion creates one high-priority outreach job
// ---------------------------------------------------------------------------

#[tokio::test]
async fn researched_lead_gets_one_high_priority_outreach_job() {
    let campaign = outreach_campaign();
    let old = lead(campaign.id, LeadStatus::Enriched);
    let new = Lead {
        status: LeadStatus::Researched,
        ..old.clone()
    };
    let mut ctx = MemoryTriggerContext::new().with_campaign(campaign.clone());
    let rules = engine();

    let event = MutationEvent::LeadUpdated {
        old: old.clone(),
        new: new.clone(),
    };
    rules.on_event(&event, &mut ctx).await;

    let jobs = ctx.queue.jobs_by_type(JobType::Outreach);
    assert_eq!(jobs.len(), 1);
    let job = &jobs[0];
    assert_eq!(job.priority, JobPriority::High);
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.data["lead_id"], new.id.to_string());
    assert_eq!(job.data["enabled_channels"]["email"], true);
    assert_eq!(job.data["enabled_channels"]["linkedin"], true);
    assert_eq!(job.data["daily_limits"]["email"], 5);
    assert_eq!(job.data["daily_limits"]["linkedin"], 3);

    // Re-running the same transition creates no duplicate.
    rules.on_event(&event, &mut ctx).await;
    assert_eq!(ctx.queue.jobs_by_type(JobType::Outreach).len(), 1);
}

#[tokio::test]
async fn lead_inserted_directly_as_researched_triggers_outreach() {
    let campaign = outreach_campaign();
    let inserted = lead(campaign.id, LeadStatus::Researched);
    let mut ctx = MemoryTriggerContext::new().with_campaign(campaign.clone());

    engine()
        .on_event(&MutationEvent::LeadInserted { lead: inserted }, &mut ctx)
        .await;

    assert_eq!(ctx.queue.jobs_by_type(JobType::Outreach).len(), 1);
}

#[tokio::test]
async fn outreach_skipped_when_no_channel_enabled() {
    let mut campaign = outreach_campaign();
    campaign.email_outreach = false;
    campaign.linkedin_outreach = false;
    let old = lead(campaign.id, LeadStatus::Enriched);
    let new = Lead {
        status: LeadStatus::Researched,
        ..old.clone()
    };
    let mut ctx = MemoryTriggerContext::new().with_campaign(campaign);

    engine()
        .on_event(&MutationEvent::LeadUpdated { old, new }, &mut ctx)
        .await;

    assert!(ctx.queue.jobs_by_type(JobType::Outreach).is_empty());
}

#[tokio::test]
async fn non_researched_transition_does_not_trigger_outreach() {
    let campaign = outreach_campaign();
    let old = lead(campaign.id, LeadStatus::New);
    let new = Lead {
        status: LeadStatus::Enriched,
        ..old.clone()
    };
    let mut ctx = MemoryTriggerContext::new().with_campaign(campaign);

    engine()
        .on_event(&MutationEvent::LeadUpdated { old, new }, &mut ctx)
        .await;

    assert!(ctx.queue.jobs_by_type(JobType::Outreach).is_empty());
}

// ---------------------------------------------------------------------------
// Scenario E: capacity-driven research with gap, cap and cooldown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn research_burst_limited_by_available_leads() {
    let mut campaign = outreach_campaign();
    campaign.daily_sending_limit_email = 50;
    let mut ctx = MemoryTriggerContext::new()
        .with_campaign(campaign.clone())
        .with_scheduled_today(campaign.id, 10);
    for _ in 0..3 {
        ctx.leads.push(lead(campaign.id, LeadStatus::Enriched));
    }
    let rules = engine();

    let event = MutationEvent::LeadsChanged {
        campaign_id: campaign.id,
    };
    rules.on_event(&event, &mut ctx).await;

    assert_eq!(ctx.queue.jobs_by_type(JobType::Research).len(), 3);

    // Immediate re-evaluation is inside the one-hour cooldown.
    ctx.leads.push(lead(campaign.id, LeadStatus::Enriched));
    rules.on_event(&event, &mut ctx).await;
    assert_eq!(ctx.queue.jobs_by_type(JobType::Research).len(), 3);

    // After the window the remaining lead is picked up.
    ctx.advance(Duration::hours(2));
    rules.on_event(&event, &mut ctx).await;
    assert_eq!(ctx.queue.jobs_by_type(JobType::Research).len(), 4);
}

#[tokio::test]
async fn research_burst_capped_at_hard_ceiling() {
    let mut campaign = outreach_campaign();
    campaign.daily_sending_limit_email = 50;
    let mut ctx = MemoryTriggerContext::new().with_campaign(campaign.clone());
    for _ in 0..25 {
        ctx.leads.push(lead(campaign.id, LeadStatus::Enriched));
    }

    engine()
        .on_event(
            &MutationEvent::LeadsChanged {
                campaign_id: campaign.id,
            },
            &mut ctx,
        )
        .await;

    assert_eq!(
        ctx.queue.jobs_by_type(JobType::Research).len() as i64,
        RESEARCH_BURST_CAP
    );
}

#[tokio::test]
async fn no_research_when_daily_budget_spent() {
    let mut campaign = outreach_campaign();
    campaign.daily_sending_limit_email = 5;
    campaign.daily_sending_limit_linkedin = 0;
    campaign.linkedin_outreach = false;
    let mut ctx = MemoryTriggerContext::new()
        .with_campaign(campaign.clone())
        .with_scheduled_today(campaign.id, 5);
    ctx.leads.push(lead(campaign.id, LeadStatus::Enriched));

    engine()
        .on_event(
            &MutationEvent::LeadsChanged {
                campaign_id: campaign.id,
            },
            &mut ctx,
        )
        .await;

    assert!(ctx.queue.jobs_by_type(JobType::Research).is_empty());
}

// ---------------------------------------------------------------------------
// Low-supply replenishment
// ---------------------------------------------------------------------------

#[tokio::test]
async fn low_enriched_supply_refires_discovery() {
    let campaign = apollo_campaign(CampaignStatus::Active);
    let mut ctx = MemoryTriggerContext::new().with_campaign(campaign.clone());
    for _ in 0..(LOW_SUPPLY_THRESHOLD - 2) {
        ctx.leads.push(lead(campaign.id, LeadStatus::Enriched));
    }
    let rules = engine();

    let event = MutationEvent::LeadsChanged {
        campaign_id: campaign.id,
    };
    rules.on_event(&event, &mut ctx).await;

    let jobs = ctx.queue.jobs_by_type(JobType::Discovery);
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].data["triggered_by"], "low_enriched_leads");

    // A second pass while the first job is still pending is suppressed.
    rules.on_event(&event, &mut ctx).await;
    assert_eq!(ctx.queue.jobs_by_type(JobType::Discovery).len(), 1);
}

#[tokio::test]
async fn healthy_supply_does_not_refire_discovery() {
    let campaign = apollo_campaign(CampaignStatus::Active);
    let mut ctx = MemoryTriggerContext::new().with_campaign(campaign.clone());
    for _ in 0..LOW_SUPPLY_THRESHOLD {
        ctx.leads.push(lead(campaign.id, LeadStatus::Enriched));
    }

    engine()
        .on_event(
            &MutationEvent::LeadsChanged {
                campaign_id: campaign.id,
            },
            &mut ctx,
        )
        .await;

    assert!(ctx.queue.jobs_by_type(JobType::Discovery).is_empty());
}

#[tokio::test]
async fn paused_campaign_does_not_replenish() {
    let campaign = apollo_campaign(CampaignStatus::Paused);
    let mut ctx = MemoryTriggerContext::new().with_campaign(campaign.clone());

    engine()
        .on_event(
            &MutationEvent::LeadsChanged {
                campaign_id: campaign.id,
            },
            &mut ctx,
        )
        .await;

    assert!(ctx.queue.jobs_by_type(JobType::Discovery).is_empty());
}
