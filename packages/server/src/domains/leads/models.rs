//! Lead model.
//!
//! Leads progress new -> enriched -> researched -> contacted. Every mutation
//! entry point here feeds the trigger engine inside its own transaction:
//! a row-level event for the mutated lead, plus a statement-level
//! `LeadsChanged` so aggregate rules (replenishment, research capacity)
//! re-evaluate once per statement rather than once per matched row.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::common::sql::Record;
use crate::domains::triggers::{MutationEvent, PgTriggerContext, TriggerEngine};
use crate::kernel::traits::ResearchSummary;

pub(crate) const LEAD_COLUMNS: &str = "id, campaign_id, client_id, email, first_name, last_name, \
     company, title, status, full_context, created_at, updated_at";

/// Sentinel the discovery platform returns for locked contacts.
const LOCKED_EMAIL_SENTINEL: &str = "email_not_unlocked@domain.com";

/// Generic placeholder domains that never hold a deliverable address.
const PLACEHOLDER_DOMAINS: &[&str] = &["domain.com", "email.com", "noemail.com"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "lead_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    #[default]
    New,
    Enriching,
    Enriched,
    EnrichmentFailed,
    Researching,
    Researched,
    Contacted,
    Unsubscribed,
}

/// Whether an email is a placeholder that needs enrichment: unset, the
/// platform's locked sentinel, or a generic throwaway domain.
pub fn is_placeholder_email(email: Option<&str>) -> bool {
    let Some(email) = email else { return true };
    let email = email.trim();
    if email.is_empty() {
        return true;
    }
    if email.eq_ignore_ascii_case(LOCKED_EMAIL_SENTINEL) {
        return true;
    }
    match email.rsplit_once('@') {
        Some((_, domain)) => PLACEHOLDER_DOMAINS
            .iter()
            .any(|d| domain.eq_ignore_ascii_case(d)),
        None => true,
    }
}

#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Lead {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,
    pub campaign_id: Uuid,
    #[builder(default, setter(strip_option))]
    pub client_id: Option<Uuid>,
    #[builder(default, setter(strip_option))]
    pub email: Option<String>,
    pub first_name: String,
    #[builder(default, setter(strip_option))]
    pub last_name: Option<String>,
    #[builder(default, setter(strip_option))]
    pub company: Option<String>,
    #[builder(default, setter(strip_option))]
    pub title: Option<String>,
    #[builder(default)]
    pub status: LeadStatus,
    #[builder(default = Json(serde_json::json!({})))]
    pub full_context: Json<serde_json::Value>,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    pub fn full_name(&self) -> String {
        match &self.last_name {
            Some(last) => format!("{} {}", self.first_name, last),
            None => self.first_name.clone(),
        }
    }

    pub fn has_placeholder_email(&self) -> bool {
        is_placeholder_email(self.email.as_deref())
    }

    /// Insert a lead and run trigger rules in the same transaction.
    pub async fn create(self, db: &PgPool, engine: &TriggerEngine) -> Result<Self> {
        let mut tx = db.begin().await?;

        let sql = format!(
            r#"
            INSERT INTO leads (
                id, campaign_id, client_id, email, first_name, last_name,
                company, title, status, full_context, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {LEAD_COLUMNS}
            "#
        );
        let inserted = sqlx::query_as::<_, Lead>(&sql)
            .bind(self.id)
            .bind(self.campaign_id)
            .bind(self.client_id)
            .bind(&self.email)
            .bind(&self.first_name)
            .bind(&self.last_name)
            .bind(&self.company)
            .bind(&self.title)
            .bind(self.status)
            .bind(&self.full_context)
            .bind(self.created_at)
            .bind(self.updated_at)
            .fetch_one(&mut *tx)
            .await?;

        {
            let mut ctx = PgTriggerContext::new(&mut tx);
            engine
                .on_event(
                    &MutationEvent::LeadInserted {
                        lead: inserted.clone(),
                    },
                    &mut ctx,
                )
                .await;
            engine
                .on_event(
                    &MutationEvent::LeadsChanged {
                        campaign_id: inserted.campaign_id,
                    },
                    &mut ctx,
                )
                .await;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Change lead status, evaluating trigger rules in the same transaction.
    pub async fn transition_status(
        id: Uuid,
        new_status: LeadStatus,
        db: &PgPool,
        engine: &TriggerEngine,
    ) -> Result<Self> {
        let mut tx = db.begin().await?;
        let old = Self::lock_current(&mut tx, id).await?;

        let sql = format!(
            "UPDATE leads SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {LEAD_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Lead>(&sql)
            .bind(id)
            .bind(new_status)
            .fetch_one(&mut *tx)
            .await?;

        Self::finish_update(tx, old, updated, engine).await
    }

    /// Record a resolved email and mark the lead enriched.
    pub async fn apply_enrichment(
        id: Uuid,
        email: &str,
        db: &PgPool,
        engine: &TriggerEngine,
    ) -> Result<Self> {
        let mut tx = db.begin().await?;
        let old = Self::lock_current(&mut tx, id).await?;

        let sql = format!(
            "UPDATE leads SET email = $2, status = 'enriched', updated_at = NOW() \
             WHERE id = $1 RETURNING {LEAD_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Lead>(&sql)
            .bind(id)
            .bind(email)
            .fetch_one(&mut *tx)
            .await?;

        Self::finish_update(tx, old, updated, engine).await
    }

    /// Store a research summary and mark the lead researched.
    pub async fn apply_research(
        id: Uuid,
        summary: &ResearchSummary,
        db: &PgPool,
        engine: &TriggerEngine,
    ) -> Result<Self> {
        let mut tx = db.begin().await?;
        let old = Self::lock_current(&mut tx, id).await?;

        let research = serde_json::json!({ "summary": summary });
        let sql = format!(
            "UPDATE leads SET full_context = full_context || jsonb_build_object('research', $2::jsonb), \
             status = 'researched', updated_at = NOW() \
             WHERE id = $1 RETURNING {LEAD_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Lead>(&sql)
            .bind(id)
            .bind(research)
            .fetch_one(&mut *tx)
            .await?;

        Self::finish_update(tx, old, updated, engine).await
    }

    /// Delete a lead; aggregate rules still re-evaluate for its campaign.
    pub async fn remove(id: Uuid, db: &PgPool, engine: &TriggerEngine) -> Result<()> {
        let mut tx = db.begin().await?;

        let campaign_id = sqlx::query_scalar::<_, Uuid>(
            "DELETE FROM leads WHERE id = $1 RETURNING campaign_id",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        {
            let mut ctx = PgTriggerContext::new(&mut tx);
            engine
                .on_event(&MutationEvent::LeadsChanged { campaign_id }, &mut ctx)
                .await;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn lock_current(
        tx: &mut sqlx::Transaction<'static, sqlx::Postgres>,
        id: Uuid,
    ) -> Result<Self> {
        let sql = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = $1 FOR UPDATE");
        let lead = sqlx::query_as::<_, Lead>(&sql)
            .bind(id)
            .fetch_one(&mut **tx)
            .await?;
        Ok(lead)
    }

    /// Fire row + statement events and commit the update transaction.
    async fn finish_update(
        mut tx: sqlx::Transaction<'static, sqlx::Postgres>,
        old: Lead,
        updated: Lead,
        engine: &TriggerEngine,
    ) -> Result<Self> {
        {
            let mut ctx = PgTriggerContext::new(&mut tx);
            engine
                .on_event(
                    &MutationEvent::LeadUpdated {
                        old,
                        new: updated.clone(),
                    },
                    &mut ctx,
                )
                .await;
            engine
                .on_event(
                    &MutationEvent::LeadsChanged {
                        campaign_id: updated.campaign_id,
                    },
                    &mut ctx,
                )
                .await;
        }

        tx.commit().await?;
        Ok(updated)
    }
}

#[async_trait]
impl Record for Lead {
    const TABLE: &'static str = "leads";
    type Id = Uuid;

    async fn find_by_id(id: Uuid, db: &PgPool) -> Result<Self> {
        let sql = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = $1");
        let lead = sqlx::query_as::<_, Self>(&sql).bind(id).fetch_one(db).await?;
        Ok(lead)
    }

    async fn insert(&self, db: &PgPool) -> Result<Self> {
        let sql = format!(
            r#"
            INSERT INTO leads (
                id, campaign_id, client_id, email, first_name, last_name,
                company, title, status, full_context, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {LEAD_COLUMNS}
            "#
        );
        let lead = sqlx::query_as::<_, Self>(&sql)
            .bind(self.id)
            .bind(self.campaign_id)
            .bind(self.client_id)
            .bind(&self.email)
            .bind(&self.first_name)
            .bind(&self.last_name)
            .bind(&self.company)
            .bind(&self.title)
            .bind(self.status)
            .bind(&self.full_context)
            .bind(self.created_at)
            .bind(self.updated_at)
            .fetch_one(db)
            .await?;
        Ok(lead)
    }

    async fn update(&self, db: &PgPool) -> Result<Self> {
        let sql = format!(
            r#"
            UPDATE leads SET
                campaign_id = $2, client_id = $3, email = $4, first_name = $5,
                last_name = $6, company = $7, title = $8, status = $9,
                full_context = $10, updated_at = NOW()
            WHERE id = $1
            RETURNING {LEAD_COLUMNS}
            "#
        );
        let lead = sqlx::query_as::<_, Self>(&sql)
            .bind(self.id)
            .bind(self.campaign_id)
            .bind(self.client_id)
            .bind(&self.email)
            .bind(&self.first_name)
            .bind(&self.last_name)
            .bind(&self.company)
            .bind(&self.title)
            .bind(self.status)
            .bind(&self.full_context)
            .fetch_one(db)
            .await?;
        Ok(lead)
    }

    async fn delete(&self, db: &PgPool) -> Result<()> {
        sqlx::query("DELETE FROM leads WHERE id = $1")
            .bind(self.id)
            .execute(db)
            .await?;
        Ok(())
    }
}
