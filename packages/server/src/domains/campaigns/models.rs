//! Campaign model.
//!
//! A campaign bundles discovery sources, outreach channels and daily sending
//! limits. Status changes run the trigger engine inside the same transaction
//! as the update, so job creation commits (or rolls back) with the mutation.

use std::collections::BTreeMap;

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
use crate::kernel::jobs::{DailyLimits, EnabledChannels, PlatformSearch};

pub(crate) const CAMPAIGN_COLUMNS: &str = "id, client_id, name, status, search_url, \
     email_outreach, linkedin_outreach, daily_sending_limit_email, daily_sending_limit_linkedin, \
     require_phone_number, created_at, updated_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "campaign_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    #[default]
    Draft,
    Active,
    Paused,
    Archived,
}

#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Campaign {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,
    #[builder(default, setter(strip_option))]
    pub client_id: Option<Uuid>,
    pub name: String,
    #[builder(default)]
    pub status: CampaignStatus,
    /// Per-platform saved searches, each with its pagination cursor.
    #[builder(default = Json(BTreeMap::new()))]
    pub search_url: Json<BTreeMap<String, PlatformSearch>>,
    #[builder(default = false)]
    pub email_outreach: bool,
    #[builder(default = false)]
    pub linkedin_outreach: bool,
    #[builder(default = 0)]
    pub daily_sending_limit_email: i32,
    #[builder(default = 0)]
    pub daily_sending_limit_linkedin: i32,
    #[builder(default = false)]
    pub require_phone_number: bool,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    pub fn enabled_channels(&self) -> EnabledChannels {
        EnabledChannels {
            email: self.email_outreach,
            linkedin: self.linkedin_outreach,
        }
    }

    pub fn daily_limits(&self) -> DailyLimits {
        DailyLimits {
            email: self.daily_sending_limit_email,
            linkedin: self.daily_sending_limit_linkedin,
        }
    }

    /// Combined daily send budget across enabled channels.
    pub fn combined_daily_limit(&self) -> i32 {
        let mut total = 0;
        if self.email_outreach {
            total += self.daily_sending_limit_email;
        }
        if self.linkedin_outreach {
            total += self.daily_sending_limit_linkedin;
        }
        total
    }

    pub fn has_search_config(&self) -> bool {
        !self.search_url.0.is_empty()
    }

    /// Change campaign status, evaluating trigger rules in the same
    /// transaction. Rule failures are logged and never block the update.
    pub async fn transition_status(
        id: Uuid,
        new_status: CampaignStatus,
        db: &PgPool,
        engine: &TriggerEngine,
    ) -> Result<Self> {
        let mut tx = db.begin().await?;

        let select = format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = $1 FOR UPDATE");
        let old = sqlx::query_as::<_, Campaign>(&select)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        let update = format!(
            "UPDATE campaigns SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {CAMPAIGN_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Campaign>(&update)
            .bind(id)
            .bind(new_status)
            .fetch_one(&mut *tx)
            .await?;

        {
            let mut ctx = PgTriggerContext::new(&mut tx);
            let event = MutationEvent::CampaignUpdated {
                old,
                new: updated.clone(),
            };
            engine.on_event(&event, &mut ctx).await;
        }

        tx.commit().await?;
        Ok(updated)
    }

    /// Advance one platform's pagination cursor after a discovery pass.
    pub async fn advance_search_cursor(id: Uuid, platform: &str, db: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE campaigns
            SET search_url = jsonb_set(
                    search_url,
                    ARRAY[$2, 'page_number'],
                    to_jsonb(COALESCE((search_url->$2->>'page_number')::int, 0) + 1)
                ),
                updated_at = NOW()
            WHERE id = $1 AND search_url ? $2
            "#,
        )
        .bind(id)
        .bind(platform)
        .execute(db)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl Record for Campaign {
    const TABLE: &'static str = "campaigns";
    type Id = Uuid;

    async fn find_by_id(id: Uuid, db: &PgPool) -> Result<Self> {
        let sql = format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = $1");
        let campaign = sqlx::query_as::<_, Self>(&sql).bind(id).fetch_one(db).await?;
        Ok(campaign)
    }

    async fn insert(&self, db: &PgPool) -> Result<Self> {
        let sql = format!(
            r#"
            INSERT INTO campaigns (
                id, client_id, name, status, search_url,
                email_outreach, linkedin_outreach,
                daily_sending_limit_email, daily_sending_limit_linkedin,
                require_phone_number, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {CAMPAIGN_COLUMNS}
            "#
        );
        let campaign = sqlx::query_as::<_, Self>(&sql)
            .bind(self.id)
            .bind(self.client_id)
            .bind(&self.name)
            .bind(self.status)
            .bind(&self.search_url)
            .bind(self.email_outreach)
            .bind(self.linkedin_outreach)
            .bind(self.daily_sending_limit_email)
            .bind(self.daily_sending_limit_linkedin)
            .bind(self.require_phone_number)
            .bind(self.created_at)
            .bind(self.updated_at)
            .fetch_one(db)
            .await?;
        Ok(campaign)
    }

    async fn update(&self, db: &PgPool) -> Result<Self> {
        let sql = format!(
            r#"
            UPDATE campaigns SET
                client_id = $2, name = $3, status = $4, search_url = $5,
                email_outreach = $6, linkedin_outreach = $7,
                daily_sending_limit_email = $8, daily_sending_limit_linkedin = $9,
                require_phone_number = $10, updated_at = NOW()
            WHERE id = $1
            RETURNING {CAMPAIGN_COLUMNS}
            "#
        );
        let campaign = sqlx::query_as::<_, Self>(&sql)
            .bind(self.id)
            .bind(self.client_id)
            .bind(&self.name)
            .bind(self.status)
            .bind(&self.search_url)
            .bind(self.email_outreach)
            .bind(self.linkedin_outreach)
            .bind(self.daily_sending_limit_email)
            .bind(self.daily_sending_limit_linkedin)
            .bind(self.require_phone_number)
            .fetch_one(db)
            .await?;
        Ok(campaign)
    }

    async fn delete(&self, db: &PgPool) -> Result<()> {
        sqlx::query("DELETE FROM campaigns WHERE id = $1")
            .bind(self.id)
            .execute(db)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn campaign() -> Campaign {
        Campaign::builder().name("Test Campaign").build()
    }

    #[test]
    fn new_campaign_defaults_to_draft() {
        let c = campaign();
        assert_eq!(c.status, CampaignStatus::Draft);
        assert!(!c.has_search_config());
    }

    #[test]
    fn combined_limit_counts_only_enabled_channels() {
        let mut c = campaign();
        c.daily_sending_limit_email = 50;
        c.daily_sending_limit_linkedin = 20;
        assert_eq!(c.combined_daily_limit(), 0);

        c.email_outreach = true;
        assert_eq!(c.combined_daily_limit(), 50);

        c.linkedin_outreach = true;
        assert_eq!(c.combined_daily_limit(), 70);
    }

    #[test]
    fn search_config_detected() {
        let mut c = campaign();
        c.search_url.0.insert(
            "apollo".into(),
            PlatformSearch {
                search_url: "https://app.apollo.io/#/people/search".into(),
                page_number: 1,
            },
        );
        assert!(c.has_search_config());
    }
}
