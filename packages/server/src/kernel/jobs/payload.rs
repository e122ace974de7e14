//! Typed job payloads.
//!
//! `Job.data` is stored as JSONB but constructed and consumed as a closed set
//! of variants keyed by `job_type`, so malformed payload construction fails
//! at compile time rather than at dispatch.

use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Job type and provenance tags
// ============================================================================

/// The handler a job dispatches to. Stored as text in the `jobs` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Pull new leads from a B2B search platform.
    Discovery,
    /// Resolve a placeholder email into real contact details.
    Enrichment,
    /// Gather context about a lead before outreach.
    Research,
    /// Compose and schedule outreach messages for a researched lead.
    Outreach,
    /// Deliver one scheduled email message.
    EmailSend,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Discovery => "discovery",
            JobType::Enrichment => "enrichment",
            JobType::Research => "research",
            JobType::Outreach => "outreach",
            JobType::EmailSend => "email_send",
        }
    }

    /// The payload field holding the entity this job targets.
    ///
    /// Used by the idempotency guard to find existing jobs for the same
    /// target without assuming a uniform payload shape.
    pub fn entity_field(&self) -> &'static str {
        match self {
            JobType::Discovery => "campaign_id",
            JobType::Enrichment | JobType::Research | JobType::Outreach => "lead_id",
            JobType::EmailSend => "message_id",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which trigger rule (or subsystem) created a job. Recorded in the payload
/// for observability and provenance-scoped cooldown checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    CampaignActivated,
    LowEnrichedLeads,
    LeadInserted,
    CapacityCheck,
    LeadResearched,
    OutreachScheduler,
}

impl TriggerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::CampaignActivated => "campaign_activated",
            TriggerSource::LowEnrichedLeads => "low_enriched_leads",
            TriggerSource::LeadInserted => "lead_inserted",
            TriggerSource::CapacityCheck => "capacity_check",
            TriggerSource::LeadResearched => "lead_researched",
            TriggerSource::OutreachScheduler => "outreach_scheduler",
        }
    }
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Payload shapes
// ============================================================================

/// One platform's search configuration, with its pagination cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformSearch {
    pub search_url: String,
    pub page_number: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryPayload {
    pub campaign_id: Uuid,
    pub campaign_name: String,
    /// Keyed by platform name ("apollo", ...).
    pub platform_urls: BTreeMap<String, PlatformSearch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<TriggerSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentPayload {
    pub lead_id: Uuid,
    pub campaign_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<Uuid>,
    pub lead_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    pub attempt_number: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchPayload {
    pub lead_id: Uuid,
    pub campaign_id: Uuid,
    pub campaign_name: String,
    pub lead_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    pub triggered_by: TriggerSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnabledChannels {
    pub email: bool,
    pub linkedin: bool,
}

impl EnabledChannels {
    pub fn any(&self) -> bool {
        self.email || self.linkedin
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyLimits {
    pub email: i32,
    pub linkedin: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutreachPayload {
    pub lead_id: Uuid,
    pub campaign_id: Uuid,
    pub campaign_name: String,
    pub lead_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub enabled_channels: EnabledChannels,
    pub daily_limits: DailyLimits,
    pub triggered_by: TriggerSource,
    pub triggered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailSendPayload {
    pub message_id: Uuid,
    pub lead_id: Uuid,
    pub campaign_id: Uuid,
    pub to_email: String,
}

// ============================================================================
// Tagged union
// ============================================================================

/// A job payload together with its type tag.
#[derive(Debug, Clone, PartialEq)]
pub enum JobPayload {
    Discovery(DiscoveryPayload),
    Enrichment(EnrichmentPayload),
    Research(ResearchPayload),
    Outreach(OutreachPayload),
    EmailSend(EmailSendPayload),
}

impl JobPayload {
    pub fn job_type(&self) -> JobType {
        match self {
            JobPayload::Discovery(_) => JobType::Discovery,
            JobPayload::Enrichment(_) => JobType::Enrichment,
            JobPayload::Research(_) => JobType::Research,
            JobPayload::Outreach(_) => JobType::Outreach,
            JobPayload::EmailSend(_) => JobType::EmailSend,
        }
    }

    /// The entity this job targets, used for duplicate suppression.
    pub fn entity_key(&self) -> Uuid {
        match self {
            JobPayload::Discovery(p) => p.campaign_id,
            JobPayload::Enrichment(p) => p.lead_id,
            JobPayload::Research(p) => p.lead_id,
            JobPayload::Outreach(p) => p.lead_id,
            JobPayload::EmailSend(p) => p.message_id,
        }
    }

    /// The campaign this job belongs to, used for cooldown windows.
    pub fn campaign_id(&self) -> Uuid {
        match self {
            JobPayload::Discovery(p) => p.campaign_id,
            JobPayload::Enrichment(p) => p.campaign_id,
            JobPayload::Research(p) => p.campaign_id,
            JobPayload::Outreach(p) => p.campaign_id,
            JobPayload::EmailSend(p) => p.campaign_id,
        }
    }

    pub fn triggered_by(&self) -> Option<TriggerSource> {
        match self {
            JobPayload::Discovery(p) => p.triggered_by,
            JobPayload::Enrichment(_) => Some(TriggerSource::LeadInserted),
            JobPayload::Research(p) => Some(p.triggered_by),
            JobPayload::Outreach(p) => Some(p.triggered_by),
            JobPayload::EmailSend(_) => Some(TriggerSource::OutreachScheduler),
        }
    }

    /// Serialize to the JSONB shape stored in `jobs.data`.
    pub fn to_value(&self) -> Result<serde_json::Value> {
        let value = match self {
            JobPayload::Discovery(p) => serde_json::to_value(p)?,
            JobPayload::Enrichment(p) => serde_json::to_value(p)?,
            JobPayload::Research(p) => serde_json::to_value(p)?,
            JobPayload::Outreach(p) => serde_json::to_value(p)?,
            JobPayload::EmailSend(p) => serde_json::to_value(p)?,
        };
        Ok(value)
    }

    /// Reconstruct a typed payload from a job row's type tag and data.
    pub fn from_parts(job_type: JobType, data: &serde_json::Value) -> Result<Self> {
        let payload = match job_type {
            JobType::Discovery => JobPayload::Discovery(serde_json::from_value(data.clone())?),
            JobType::Enrichment => JobPayload::Enrichment(serde_json::from_value(data.clone())?),
            JobType::Research => JobPayload::Research(serde_json::from_value(data.clone())?),
            JobType::Outreach => JobPayload::Outreach(serde_json::from_value(data.clone())?),
            JobType::EmailSend => JobPayload::EmailSend(serde_json::from_value(data.clone())?),
        };
        Ok(payload)
    }

    /// Typed accessor used by handlers after dispatch.
    pub fn into_discovery(self) -> Result<DiscoveryPayload> {
        match self {
            JobPayload::Discovery(p) => Ok(p),
            other => Err(anyhow!("expected discovery payload, got {}", other.job_type())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discovery_payload() -> DiscoveryPayload {
        let mut platform_urls = BTreeMap::new();
        platform_urls.insert(
            "apollo".to_string(),
            PlatformSearch {
                search_url: "https://app.apollo.io/#/people/search?personTitles[]=CEO".to_string(),
                page_number: 1,
            },
        );
        DiscoveryPayload {
            campaign_id: Uuid::new_v4(),
            campaign_name: "Test Campaign".to_string(),
            platform_urls,
            triggered_by: Some(TriggerSource::CampaignActivated),
        }
    }

    #[test]
    fn discovery_round_trips_through_jsonb_shape() {
        let payload = JobPayload::Discovery(discovery_payload());
        let value = payload.to_value().unwrap();

        assert_eq!(
            value["platform_urls"]["apollo"]["page_number"],
            serde_json::json!(1)
        );
        assert_eq!(value["triggered_by"], serde_json::json!("campaign_activated"));

        let restored = JobPayload::from_parts(JobType::Discovery, &value).unwrap();
        assert_eq!(restored, payload);
    }

    #[test]
    fn entity_key_targets_the_lead_for_outreach() {
        let lead_id = Uuid::new_v4();
        let payload = JobPayload::Outreach(OutreachPayload {
            lead_id,
            campaign_id: Uuid::new_v4(),
            campaign_name: "c".into(),
            lead_name: "John TestLead".into(),
            company: None,
            email: None,
            enabled_channels: EnabledChannels { email: true, linkedin: false },
            daily_limits: DailyLimits { email: 5, linkedin: 0 },
            triggered_by: TriggerSource::LeadResearched,
            triggered_at: Utc::now(),
        });
        assert_eq!(payload.entity_key(), lead_id);
        assert_eq!(payload.job_type().entity_field(), "lead_id");
    }

    #[test]
    fn wrong_shape_is_rejected() {
        let value = serde_json::json!({"campaign_id": "not-a-uuid"});
        assert!(JobPayload::from_parts(JobType::Discovery, &value).is_err());
    }

    #[test]
    fn job_type_tags_are_stable() {
        assert_eq!(JobType::Discovery.as_str(), "discovery");
        assert_eq!(JobType::EmailSend.as_str(), "email_send");
        assert_eq!(TriggerSource::LowEnrichedLeads.as_str(), "low_enriched_leads");
    }
}
