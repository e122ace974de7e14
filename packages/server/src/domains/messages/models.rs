//! Outbound message model and its delivery state machine.
//!
//! Message status is guarded by the shared transition validator: every write
//! goes through [`Message::transition_status`] (or [`Message::schedule`]),
//! which rejects anything outside the table. `bounced` and `unsubscribed`
//! are hard terminals.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor, PgPool};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::common::sql::Record;
use crate::common::transitions::StatusMachine;
use crate::domains::triggers::{MutationEvent, PgTriggerContext, TriggerEngine};

pub(crate) const MESSAGE_COLUMNS: &str = "id, lead_id, campaign_id, channel, subject, content, \
     status, send_at, sent_at, created_at, updated_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "message_channel", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageChannel {
    Email,
    Linkedin,
}

impl MessageChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageChannel::Email => "email",
            MessageChannel::Linkedin => "linkedin",
        }
    }
}

impl std::fmt::Display for MessageChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "message_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    #[default]
    Draft,
    Scheduled,
    Sent,
    Delivered,
    Failed,
    RetryPending,
    Bounced,
    Unsubscribed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Draft => "draft",
            MessageStatus::Scheduled => "scheduled",
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Failed => "failed",
            MessageStatus::RetryPending => "retry_pending",
            MessageStatus::Bounced => "bounced",
            MessageStatus::Unsubscribed => "unsubscribed",
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl StatusMachine for MessageStatus {
    const ENTITY: &'static str = "message";

    fn transitions(self) -> &'static [Self] {
        match self {
            MessageStatus::Draft => &[
                MessageStatus::Scheduled,
                MessageStatus::Sent,
                MessageStatus::Failed,
            ],
            MessageStatus::Scheduled => &[
                MessageStatus::Sent,
                MessageStatus::Failed,
                MessageStatus::RetryPending,
            ],
            MessageStatus::Sent => &[
                MessageStatus::Delivered,
                MessageStatus::Bounced,
                MessageStatus::Failed,
            ],
            MessageStatus::Delivered => &[MessageStatus::Bounced, MessageStatus::Unsubscribed],
            MessageStatus::Failed => &[MessageStatus::RetryPending, MessageStatus::Failed],
            MessageStatus::RetryPending => &[MessageStatus::Sent, MessageStatus::Failed],
            MessageStatus::Bounced | MessageStatus::Unsubscribed => &[],
        }
    }
}

#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Message {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,
    pub lead_id: Uuid,
    pub campaign_id: Uuid,
    pub channel: MessageChannel,
    #[builder(default, setter(strip_option))]
    pub subject: Option<String>,
    pub content: String,
    #[builder(default)]
    pub status: MessageStatus,
    #[builder(default, setter(strip_option))]
    pub send_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub sent_at: Option<DateTime<Utc>>,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// Messages scheduled for the current day in a campaign.
    pub async fn count_scheduled_today<'e, E>(executor: E, campaign_id: Uuid) -> Result<i64>
    where
        E: PgExecutor<'e>,
    {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM messages
            WHERE campaign_id = $1
              AND status = 'scheduled'
              AND send_at >= date_trunc('day', NOW())
              AND send_at < date_trunc('day', NOW()) + INTERVAL '1 day'
            "#,
        )
        .bind(campaign_id)
        .fetch_one(executor)
        .await?;
        Ok(count)
    }

    /// All pending send times for a campaign/channel, oldest first. Used to
    /// keep new slots spaced out and under the daily cap.
    pub async fn scheduled_times(
        campaign_id: Uuid,
        channel: MessageChannel,
        db: &PgPool,
    ) -> Result<Vec<DateTime<Utc>>> {
        let times = sqlx::query_scalar::<_, DateTime<Utc>>(
            r#"
            SELECT send_at FROM messages
            WHERE campaign_id = $1
              AND channel = $2
              AND status = 'scheduled'
              AND send_at IS NOT NULL
            ORDER BY send_at ASC
            "#,
        )
        .bind(campaign_id)
        .bind(channel)
        .fetch_all(db)
        .await?;
        Ok(times)
    }

    /// Move a draft into `scheduled` with a send time.
    pub async fn schedule(
        id: Uuid,
        send_at: DateTime<Utc>,
        db: &PgPool,
        engine: &TriggerEngine,
    ) -> Result<Self> {
        Self::write_status(id, MessageStatus::Scheduled, Some(send_at), db, engine).await
    }

    /// Transition a message through the delivery state machine.
    ///
    /// Illegal transitions are rejected before any write and surface as
    /// errors to the caller.
    pub async fn transition_status(
        id: Uuid,
        new_status: MessageStatus,
        db: &PgPool,
        engine: &TriggerEngine,
    ) -> Result<Self> {
        Self::write_status(id, new_status, None, db, engine).await
    }

    async fn write_status(
        id: Uuid,
        new_status: MessageStatus,
        send_at: Option<DateTime<Utc>>,
        db: &PgPool,
        engine: &TriggerEngine,
    ) -> Result<Self> {
        let mut tx = db.begin().await?;

        let select = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1 FOR UPDATE");
        let current = sqlx::query_as::<_, Message>(&select)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        current.status.ensure_transition(new_status)?;

        let update = format!(
            r#"
            UPDATE messages
            SET status = $2,
                send_at = COALESCE($3, send_at),
                sent_at = CASE WHEN $2 = 'sent'::message_status THEN NOW() ELSE sent_at END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {MESSAGE_COLUMNS}
            "#
        );
        let updated = sqlx::query_as::<_, Message>(&update)
            .bind(id)
            .bind(new_status)
            .bind(send_at)
            .fetch_one(&mut *tx)
            .await?;

        {
            let mut ctx = PgTriggerContext::new(&mut tx);
            engine
                .on_event(
                    &MutationEvent::MessagesChanged {
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
impl Record for Message {
    const TABLE: &'static str = "messages";
    type Id = Uuid;

    async fn find_by_id(id: Uuid, db: &PgPool) -> Result<Self> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1");
        let message = sqlx::query_as::<_, Self>(&sql).bind(id).fetch_one(db).await?;
        Ok(message)
    }

    async fn insert(&self, db: &PgPool) -> Result<Self> {
        let sql = format!(
            r#"
            INSERT INTO messages (
                id, lead_id, campaign_id, channel, subject, content,
                status, send_at, sent_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {MESSAGE_COLUMNS}
            "#
        );
        let message = sqlx::query_as::<_, Self>(&sql)
            .bind(self.id)
            .bind(self.lead_id)
            .bind(self.campaign_id)
            .bind(self.channel)
            .bind(&self.subject)
            .bind(&self.content)
            .bind(self.status)
            .bind(self.send_at)
            .bind(self.sent_at)
            .bind(self.created_at)
            .bind(self.updated_at)
            .fetch_one(db)
            .await?;
        Ok(message)
    }

    async fn update(&self, db: &PgPool) -> Result<Self> {
        let sql = format!(
            r#"
            UPDATE messages SET
                lead_id = $2, campaign_id = $3, channel = $4, subject = $5,
                content = $6, status = $7, send_at = $8, sent_at = $9,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {MESSAGE_COLUMNS}
            "#
        );
        let message = sqlx::query_as::<_, Self>(&sql)
            .bind(self.id)
            .bind(self.lead_id)
            .bind(self.campaign_id)
            .bind(self.channel)
            .bind(&self.subject)
            .bind(&self.content)
            .bind(self.status)
            .bind(self.send_at)
            .bind(self.sent_at)
            .fetch_one(db)
            .await?;
        Ok(message)
    }

    async fn delete(&self, db: &PgPool) -> Result<()> {
        sqlx::query("DELETE FROM messages WHERE id = $1")
            .bind(self.id)
            .execute(db)
            .await?;
        Ok(())
    }
}
