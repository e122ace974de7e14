//! Handlers for discovery, enrichment and research jobs.
//!
//! Handlers are thin adapters: payload in, collaborator call, downstream
//! entity mutation, result payload out. The mutations go through the same
//! trigger-firing entry points as API writes, which is what chains the
//! pipeline (discovered placeholder leads spawn enrichment, researched
//! leads spawn outreach).

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use crate::common::sql::Record;
use crate::domains::campaigns::Campaign;
use crate::domains::classify_db_error;
use crate::kernel::deps::ServerDeps;
use crate::kernel::jobs::{
    DiscoveryPayload, EnrichmentPayload, HandlerError, HandlerResult, ResearchPayload,
};
use crate::kernel::traits::{EnrichmentRequest, ResearchRequest};

use super::models::{Lead, LeadStatus};

/// Pull one page per configured platform and store the results as new leads.
pub async fn handle_discovery(payload: DiscoveryPayload, deps: Arc<ServerDeps>) -> HandlerResult {
    let campaign = Campaign::find_by_id(payload.campaign_id, &deps.db_pool)
        .await
        .map_err(|e| classify_db_error("load campaign", e))?;

    let mut platforms_searched = 0usize;
    let mut leads_created = 0usize;

    for (platform, search) in &payload.platform_urls {
        let page = deps
            .lead_search
            .search(&search.search_url, search.page_number)
            .await?;
        platforms_searched += 1;

        for discovered in page.leads {
            let lead = Lead::builder()
                .campaign_id(campaign.id)
                .first_name(discovered.first_name)
                .build();
            let lead = Lead {
                client_id: campaign.client_id,
                email: discovered.email,
                last_name: discovered.last_name,
                company: discovered.company,
                title: discovered.title,
                ..lead
            };

            // One bad row must not sink the rest of the page.
            match lead.create(&deps.db_pool, &deps.triggers).await {
                Ok(_) => leads_created += 1,
                Err(e) => {
                    warn!(campaign_id = %campaign.id, error = %e, "failed to store discovered lead")
                }
            }
        }

        if let Err(e) = Campaign::advance_search_cursor(campaign.id, platform, &deps.db_pool).await
        {
            warn!(campaign_id = %campaign.id, platform, error = %e, "failed to advance search cursor");
        }
    }

    info!(
        campaign_id = %campaign.id,
        platforms_searched,
        leads_created,
        "discovery pass finished"
    );
    Ok(json!({
        "campaign_id": campaign.id,
        "platforms_searched": platforms_searched,
        "leads_created": leads_created,
    }))
}

/// Resolve a placeholder email via the enrichment provider.
pub async fn handle_enrichment(payload: EnrichmentPayload, deps: Arc<ServerDeps>) -> HandlerResult {
    let request = EnrichmentRequest {
        lead_name: payload.lead_name.clone(),
        company: payload.company.clone(),
    };

    match deps.enricher.enrich(&request).await {
        Ok(contact) => {
            let lead =
                Lead::apply_enrichment(payload.lead_id, &contact.email, &deps.db_pool, &deps.triggers)
                    .await
                    .map_err(|e| classify_db_error("store enrichment", e))?;
            Ok(json!({
                "lead_id": lead.id,
                "email": contact.email,
                "attempt_number": payload.attempt_number,
            }))
        }
        Err(err) => {
            if matches!(err, HandlerError::Permanent { .. }) {
                // Terminal for the lead too; the failure itself is still
                // recorded on the job below.
                if let Err(e) = Lead::transition_status(
                    payload.lead_id,
                    LeadStatus::EnrichmentFailed,
                    &deps.db_pool,
                    &deps.triggers,
                )
                .await
                {
                    warn!(lead_id = %payload.lead_id, error = %e, "failed to mark lead enrichment_failed");
                }
            }
            Err(err)
        }
    }
}

/// Gather personalization context and mark the lead researched.
pub async fn handle_research(payload: ResearchPayload, deps: Arc<ServerDeps>) -> HandlerResult {
    let request = ResearchRequest {
        lead_name: payload.lead_name.clone(),
        company: payload.company.clone(),
    };
    let summary = deps.researcher.research(&request).await?;

    let lead = Lead::apply_research(payload.lead_id, &summary, &deps.db_pool, &deps.triggers)
        .await
        .map_err(|e| classify_db_error("store research", e))?;

    Ok(json!({
        "lead_id": lead.id,
        "company_insights": summary.company_insights.len(),
        "person_insights": summary.person_insights.len(),
        "potential_pain_points": summary.potential_pain_points.len(),
        "opportunities": summary.opportunities.len(),
    }))
}
