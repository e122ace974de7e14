//! In-memory trigger context for rule tests.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domains::campaigns::Campaign;
use crate::domains::leads::{Lead, LeadStatus};
use crate::kernel::jobs::{
    InMemoryJobQueue, Job, JobQueue, JobType, NewJob, TriggerSource,
};

use super::{JobDraft, TriggerContext};

/// Fact store + in-memory queue standing in for the mutation transaction.
///
/// Tests seed campaigns/leads/aggregates directly and inspect `queue` for
/// the jobs rules created. `advance` moves the evaluation clock for
/// cooldown-window tests.
pub struct MemoryTriggerContext {
    pub now: DateTime<Utc>,
    pub campaigns: HashMap<Uuid, Campaign>,
    pub leads: Vec<Lead>,
    pub scheduled_today: HashMap<Uuid, i64>,
    pub queue: InMemoryJobQueue,
}

impl Default for MemoryTriggerContext {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTriggerContext {
    pub fn new() -> Self {
        Self {
            now: Utc::now(),
            campaigns: HashMap::new(),
            leads: Vec::new(),
            scheduled_today: HashMap::new(),
            queue: InMemoryJobQueue::new(),
        }
    }

    pub fn with_campaign(mut self, campaign: Campaign) -> Self {
        self.campaigns.insert(campaign.id, campaign);
        self
    }

    pub fn with_lead(mut self, lead: Lead) -> Self {
        self.leads.push(lead);
        self
    }

    pub fn with_scheduled_today(mut self, campaign_id: Uuid, count: i64) -> Self {
        self.scheduled_today.insert(campaign_id, count);
        self
    }

    /// Move the evaluation clock forward.
    pub fn advance(&mut self, by: chrono::Duration) {
        self.now += by;
    }
}

#[async_trait]
impl TriggerContext for MemoryTriggerContext {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    async fn campaign(&mut self, id: Uuid) -> Result<Option<Campaign>> {
        Ok(self.campaigns.get(&id).cloned())
    }

    async fn count_leads(&mut self, campaign_id: Uuid, status: LeadStatus) -> Result<i64> {
        Ok(self
            .leads
            .iter()
            .filter(|l| l.campaign_id == campaign_id && l.status == status)
            .count() as i64)
    }

    async fn leads_in_status(
        &mut self,
        campaign_id: Uuid,
        status: LeadStatus,
        limit: i64,
    ) -> Result<Vec<Lead>> {
        let mut leads: Vec<Lead> = self
            .leads
            .iter()
            .filter(|l| l.campaign_id == campaign_id && l.status == status)
            .cloned()
            .collect();
        leads.sort_by_key(|l| l.created_at);
        leads.truncate(limit.max(0) as usize);
        Ok(leads)
    }

    async fn messages_scheduled_today(&mut self, campaign_id: Uuid) -> Result<i64> {
        Ok(*self.scheduled_today.get(&campaign_id).unwrap_or(&0))
    }

    async fn active_job_exists(&mut self, job_type: JobType, entity_key: Uuid) -> Result<bool> {
        self.queue.active_job_exists(job_type, entity_key).await
    }

    async fn last_job_created_at(
        &mut self,
        job_type: JobType,
        campaign_id: Uuid,
        triggered_by: Option<TriggerSource>,
    ) -> Result<Option<DateTime<Utc>>> {
        self.queue
            .last_created_at(job_type, campaign_id, triggered_by)
            .await
    }

    async fn enqueue(&mut self, draft: JobDraft) -> Result<Job> {
        self.queue
            .enqueue(NewJob::new(draft.payload).with_priority(draft.priority))
            .await
    }
}
