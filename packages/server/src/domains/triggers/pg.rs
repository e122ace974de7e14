//! Trigger context backed by the mutation's own transaction.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::domains::campaigns::models::CAMPAIGN_COLUMNS;
use crate::domains::campaigns::Campaign;
use crate::domains::leads::models::LEAD_COLUMNS;
use crate::domains::leads::{Lead, LeadStatus};
use crate::domains::messages::Message;
use crate::kernel::jobs::{Job, JobType, NewJob, PostgresJobQueue, TriggerSource};

use super::{JobDraft, TriggerContext};

/// Runs rule reads and job inserts on the transaction of the triggering
/// mutation, so both commit or roll back together.
pub struct PgTriggerContext<'a> {
    tx: &'a mut Transaction<'static, Postgres>,
    now: DateTime<Utc>,
}

impl<'a> PgTriggerContext<'a> {
    pub fn new(tx: &'a mut Transaction<'static, Postgres>) -> Self {
        Self {
            tx,
            now: Utc::now(),
        }
    }
}

#[async_trait]
impl TriggerContext for PgTriggerContext<'_> {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    async fn campaign(&mut self, id: Uuid) -> Result<Option<Campaign>> {
        let sql = format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = $1");
        let campaign = sqlx::query_as::<_, Campaign>(&sql)
            .bind(id)
            .fetch_optional(&mut **self.tx)
            .await?;
        Ok(campaign)
    }

    async fn count_leads(&mut self, campaign_id: Uuid, status: LeadStatus) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM leads WHERE campaign_id = $1 AND status = $2",
        )
        .bind(campaign_id)
        .bind(status)
        .fetch_one(&mut **self.tx)
        .await?;
        Ok(count)
    }

    async fn leads_in_status(
        &mut self,
        campaign_id: Uuid,
        status: LeadStatus,
        limit: i64,
    ) -> Result<Vec<Lead>> {
        let sql = format!(
            "SELECT {LEAD_COLUMNS} FROM leads \
             WHERE campaign_id = $1 AND status = $2 \
             ORDER BY created_at ASC LIMIT $3"
        );
        let leads = sqlx::query_as::<_, Lead>(&sql)
            .bind(campaign_id)
            .bind(status)
            .bind(limit)
            .fetch_all(&mut **self.tx)
            .await?;
        Ok(leads)
    }

    async fn messages_scheduled_today(&mut self, campaign_id: Uuid) -> Result<i64> {
        Message::count_scheduled_today(&mut **self.tx, campaign_id).await
    }

    async fn active_job_exists(&mut self, job_type: JobType, entity_key: Uuid) -> Result<bool> {
        PostgresJobQueue::active_job_exists_on(&mut **self.tx, job_type, entity_key).await
    }

    async fn last_job_created_at(
        &mut self,
        job_type: JobType,
        campaign_id: Uuid,
        triggered_by: Option<TriggerSource>,
    ) -> Result<Option<DateTime<Utc>>> {
        PostgresJobQueue::last_created_at_on(&mut **self.tx, job_type, campaign_id, triggered_by)
            .await
    }

    async fn enqueue(&mut self, draft: JobDraft) -> Result<Job> {
        PostgresJobQueue::enqueue_on(
            &mut **self.tx,
            NewJob::new(draft.payload).with_priority(draft.priority),
        )
        .await
    }
}
