// TestDependencies - mock implementations for testing
//
// Provides mock collaborators that can be injected into ServerDeps for
// tests, plus a bundle that wires them to an in-memory job queue.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domains::triggers::TriggerEngine;
use crate::kernel::jobs::{HandlerError, InMemoryJobQueue};
use crate::kernel::traits::{
    BaseEmailSender, BaseLeadEnricher, BaseLeadResearcher, BaseLeadSearch, BaseOutreachComposer,
    ComposeRequest, ComposedMessage, EnrichedContact, EnrichmentRequest, OutgoingEmail,
    ResearchRequest, ResearchSummary, SearchPage, SendReceipt,
};
use crate::kernel::ServerDeps;

// =============================================================================
// Mock Lead Search
// =============================================================================

#[derive(Default)]
pub struct MockLeadSearch {
    pages: Mutex<VecDeque<SearchPage>>,
    calls: Mutex<Vec<(String, i32)>>,
    failure: Mutex<Option<HandlerError>>,
}

impl MockLeadSearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a page of results to return.
    pub fn with_page(self, page: SearchPage) -> Self {
        self.pages.lock().unwrap().push_back(page);
        self
    }

    /// Make every call fail with the given error.
    pub fn set_failure(&self, failure: Option<HandlerError>) {
        *self.failure.lock().unwrap() = failure;
    }

    /// (search_url, page_number) pairs from every call.
    pub fn calls(&self) -> Vec<(String, i32)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BaseLeadSearch for MockLeadSearch {
    async fn search(&self, search_url: &str, page_number: i32) -> Result<SearchPage, HandlerError> {
        self.calls
            .lock()
            .unwrap()
            .push((search_url.to_string(), page_number));
        if let Some(failure) = self.failure.lock().unwrap().clone() {
            return Err(failure);
        }
        Ok(self.pages.lock().unwrap().pop_front().unwrap_or_default())
    }
}

// =============================================================================
// Mock Lead Enricher
// =============================================================================

#[derive(Default)]
pub struct MockLeadEnricher {
    contacts: Mutex<VecDeque<EnrichedContact>>,
    calls: Mutex<Vec<EnrichmentRequest>>,
    failure: Mutex<Option<HandlerError>>,
}

impl MockLeadEnricher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contact(self, contact: EnrichedContact) -> Self {
        self.contacts.lock().unwrap().push_back(contact);
        self
    }

    pub fn set_failure(&self, failure: Option<HandlerError>) {
        *self.failure.lock().unwrap() = failure;
    }

    pub fn calls(&self) -> Vec<EnrichmentRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BaseLeadEnricher for MockLeadEnricher {
    async fn enrich(&self, request: &EnrichmentRequest) -> Result<EnrichedContact, HandlerError> {
        self.calls.lock().unwrap().push(request.clone());
        if let Some(failure) = self.failure.lock().unwrap().clone() {
            return Err(failure);
        }
        Ok(self
            .contacts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(EnrichedContact {
                email: "resolved.lead@acme-corp.com".to_string(),
                personal_emails: Vec::new(),
            }))
    }
}

// =============================================================================
// Mock Lead Researcher
// =============================================================================

#[derive(Default)]
pub struct MockLeadResearcher {
    summaries: Mutex<VecDeque<ResearchSummary>>,
    calls: Mutex<Vec<ResearchRequest>>,
    failure: Mutex<Option<HandlerError>>,
}

impl MockLeadResearcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_summary(self, summary: ResearchSummary) -> Self {
        self.summaries.lock().unwrap().push_back(summary);
        self
    }

    pub fn set_failure(&self, failure: Option<HandlerError>) {
        *self.failure.lock().unwrap() = failure;
    }

    pub fn calls(&self) -> Vec<ResearchRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BaseLeadResearcher for MockLeadResearcher {
    async fn research(&self, request: &ResearchRequest) -> Result<ResearchSummary, HandlerError> {
        self.calls.lock().unwrap().push(request.clone());
        if let Some(failure) = self.failure.lock().unwrap().clone() {
            return Err(failure);
        }
        Ok(self
            .summaries
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ResearchSummary {
                company_insights: vec!["Recently raised a Series B".to_string()],
                person_insights: vec!["15 years in SaaS".to_string()],
                potential_pain_points: vec!["Scaling the engineering team".to_string()],
                opportunities: vec!["Evaluating productivity tooling".to_string()],
            }))
    }
}

// =============================================================================
// Mock Outreach Composer
// =============================================================================

#[derive(Default)]
pub struct MockOutreachComposer {
    calls: Mutex<Vec<ComposeRequest>>,
    failure: Mutex<Option<HandlerError>>,
}

impl MockOutreachComposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failure(&self, failure: Option<HandlerError>) {
        *self.failure.lock().unwrap() = failure;
    }

    pub fn calls(&self) -> Vec<ComposeRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BaseOutreachComposer for MockOutreachComposer {
    async fn compose(&self, request: &ComposeRequest) -> Result<ComposedMessage, HandlerError> {
        self.calls.lock().unwrap().push(request.clone());
        if let Some(failure) = self.failure.lock().unwrap().clone() {
            return Err(failure);
        }
        Ok(ComposedMessage {
            subject: Some(format!("Quick question, {}", request.lead_name)),
            body: format!("Hi {}, saw what you're building.", request.lead_name),
        })
    }
}

// =============================================================================
// Mock Email Sender
// =============================================================================

#[derive(Default)]
pub struct MockEmailSender {
    calls: Mutex<Vec<OutgoingEmail>>,
    failure: Mutex<Option<HandlerError>>,
}

impl MockEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failure(&self, failure: Option<HandlerError>) {
        *self.failure.lock().unwrap() = failure;
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BaseEmailSender for MockEmailSender {
    async fn send(&self, email: &OutgoingEmail) -> Result<SendReceipt, HandlerError> {
        self.calls.lock().unwrap().push(email.clone());
        if let Some(failure) = self.failure.lock().unwrap().clone() {
            return Err(failure);
        }
        Ok(SendReceipt {
            provider_message_id: Some(format!("mock-{}", self.calls.lock().unwrap().len())),
        })
    }
}

// =============================================================================
// TestDependencies bundle
// =============================================================================

/// Mock collaborators wired to an in-memory job queue.
///
/// The pool is lazy and never connected; tests that go through SQL paths use
/// the testcontainers suite instead.
pub struct TestDependencies {
    pub queue: Arc<InMemoryJobQueue>,
    pub lead_search: Arc<MockLeadSearch>,
    pub enricher: Arc<MockLeadEnricher>,
    pub researcher: Arc<MockLeadResearcher>,
    pub composer: Arc<MockOutreachComposer>,
    pub email_sender: Arc<MockEmailSender>,
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(InMemoryJobQueue::new()),
            lead_search: Arc::new(MockLeadSearch::new()),
            enricher: Arc::new(MockLeadEnricher::new()),
            researcher: Arc::new(MockLeadResearcher::new()),
            composer: Arc::new(MockOutreachComposer::new()),
            email_sender: Arc::new(MockEmailSender::new()),
        }
    }

    pub fn with_lead_search(mut self, lead_search: MockLeadSearch) -> Self {
        self.lead_search = Arc::new(lead_search);
        self
    }

    pub fn with_enricher(mut self, enricher: MockLeadEnricher) -> Self {
        self.enricher = Arc::new(enricher);
        self
    }

    pub fn with_researcher(mut self, researcher: MockLeadResearcher) -> Self {
        self.researcher = Arc::new(researcher);
        self
    }

    pub fn deps(&self) -> Arc<ServerDeps> {
        Arc::new(ServerDeps {
            db_pool: PgPool::connect_lazy("postgres://localhost:5432/autopilot_test")
                .expect("lazy test pool"),
            job_queue: self.queue.clone(),
            triggers: Arc::new(TriggerEngine::with_default_rules()),
            lead_search: self.lead_search.clone(),
            enricher: self.enricher.clone(),
            researcher: self.researcher.clone(),
            composer: self.composer.clone(),
            email_sender: self.email_sender.clone(),
        })
    }
}
