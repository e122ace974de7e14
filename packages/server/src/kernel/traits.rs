// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Each external collaborator (B2B search, enrichment, research, outreach
// composition, email delivery) is a pure function of its request payload;
// none of them know anything about the scheduler's claim/retry mechanics.
//
// Naming convention: Base* for trait names (e.g., BaseLeadSearch)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::kernel::jobs::HandlerError;

// =============================================================================
// Lead Search (B2B discovery platforms)
// =============================================================================

/// A contact returned by a discovery platform search page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredLead {
    pub first_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Often a placeholder until the contact is unlocked by enrichment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// One page of search results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchPage {
    pub leads: Vec<DiscoveredLead>,
    pub has_more: bool,
}

#[async_trait]
pub trait BaseLeadSearch: Send + Sync {
    /// Fetch one page of a saved search.
    async fn search(&self, search_url: &str, page_number: i32) -> Result<SearchPage, HandlerError>;
}

// =============================================================================
// Lead Enrichment (placeholder email resolution)
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentRequest {
    pub lead_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedContact {
    pub email: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub personal_emails: Vec<String>,
}

#[async_trait]
pub trait BaseLeadEnricher: Send + Sync {
    /// Resolve real contact details for a lead.
    async fn enrich(&self, request: &EnrichmentRequest) -> Result<EnrichedContact, HandlerError>;
}

// =============================================================================
// Lead Research (web research for personalization)
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub lead_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchSummary {
    #[serde(default)]
    pub company_insights: Vec<String>,
    #[serde(default)]
    pub person_insights: Vec<String>,
    #[serde(default)]
    pub potential_pain_points: Vec<String>,
    #[serde(default)]
    pub opportunities: Vec<String>,
}

#[async_trait]
pub trait BaseLeadResearcher: Send + Sync {
    /// Gather context about a lead and their company.
    async fn research(&self, request: &ResearchRequest) -> Result<ResearchSummary, HandlerError>;
}

// =============================================================================
// Outreach Composition
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutreachChannel {
    Email,
    Linkedin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeRequest {
    pub lead_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    pub channel: OutreachChannel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub research: Option<ResearchSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposedMessage {
    /// Subject line; unused for channels without one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub body: String,
}

#[async_trait]
pub trait BaseOutreachComposer: Send + Sync {
    /// Compose a personalized message for one channel.
    async fn compose(&self, request: &ComposeRequest) -> Result<ComposedMessage, HandlerError>;
}

// =============================================================================
// Email Delivery
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendReceipt {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_message_id: Option<String>,
}

#[async_trait]
pub trait BaseEmailSender: Send + Sync {
    /// Deliver one email.
    async fn send(&self, email: &OutgoingEmail) -> Result<SendReceipt, HandlerError>;
}
