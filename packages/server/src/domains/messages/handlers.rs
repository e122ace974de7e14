//! Handlers for outreach composition and email delivery jobs.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::common::sql::Record;
use crate::domains::classify_db_error;
use crate::domains::leads::{is_placeholder_email, Lead};
use crate::kernel::deps::ServerDeps;
use crate::kernel::jobs::{
    EmailSendPayload, HandlerError, HandlerResult, JobPayload, NewJob, OutreachPayload,
};
use crate::kernel::traits::{ComposeRequest, OutgoingEmail, OutreachChannel, ResearchSummary};

use super::models::{Message, MessageChannel, MessageStatus};
use super::scheduling::next_send_slots;

/// Compose and schedule messages for a researched lead, one per enabled
/// channel, then queue the delivery job for each email message.
pub async fn handle_outreach(payload: OutreachPayload, deps: Arc<ServerDeps>) -> HandlerResult {
    let lead = Lead::find_by_id(payload.lead_id, &deps.db_pool)
        .await
        .map_err(|e| classify_db_error("load lead", e))?;

    let research: Option<ResearchSummary> = lead
        .full_context
        .0
        .get("research")
        .and_then(|r| r.get("summary"))
        .and_then(|s| serde_json::from_value(s.clone()).ok());

    let channels = [
        (
            MessageChannel::Email,
            OutreachChannel::Email,
            payload.enabled_channels.email,
            payload.daily_limits.email,
        ),
        (
            MessageChannel::Linkedin,
            OutreachChannel::Linkedin,
            payload.enabled_channels.linkedin,
            payload.daily_limits.linkedin,
        ),
    ];

    let mut scheduled = Vec::new();
    for (channel, compose_channel, enabled, daily_limit) in channels {
        if !enabled || daily_limit <= 0 {
            continue;
        }

        // Email needs a deliverable address; the payload snapshot may be
        // older than the lead row, so prefer the current one.
        let to_email = lead.email.clone().or_else(|| payload.email.clone());
        if channel == MessageChannel::Email && is_placeholder_email(to_email.as_deref()) {
            warn!(lead_id = %lead.id, "email channel enabled but lead has no deliverable address");
            continue;
        }

        let composed = deps
            .composer
            .compose(&ComposeRequest {
                lead_name: payload.lead_name.clone(),
                company: payload.company.clone(),
                channel: compose_channel,
                research: research.clone(),
            })
            .await?;

        let existing = Message::scheduled_times(payload.campaign_id, channel, &deps.db_pool)
            .await
            .map_err(|e| classify_db_error("load schedule", e))?;
        let slots = next_send_slots(&existing, daily_limit, 1, Utc::now());
        let Some(send_at) = slots.first().copied() else {
            continue;
        };

        let draft = Message::builder()
            .lead_id(lead.id)
            .campaign_id(payload.campaign_id)
            .channel(channel)
            .content(composed.body)
            .build();
        let draft = Message {
            subject: composed.subject,
            ..draft
        };
        let message = draft
            .insert(&deps.db_pool)
            .await
            .map_err(|e| classify_db_error("store message", e))?;
        Message::schedule(message.id, send_at, &deps.db_pool, &deps.triggers)
            .await
            .map_err(|e| classify_db_error("schedule message", e))?;

        if channel == MessageChannel::Email {
            if let Some(to_email) = to_email.clone() {
                let send_job = NewJob::new(JobPayload::EmailSend(EmailSendPayload {
                    message_id: message.id,
                    lead_id: lead.id,
                    campaign_id: payload.campaign_id,
                    to_email,
                }))
                .scheduled_for(send_at);
                deps.job_queue
                    .enqueue(send_job)
                    .await
                    .map_err(|e| HandlerError::recoverable(format!("queue email send: {e}")))?;
            }
        }

        scheduled.push(json!({
            "message_id": message.id,
            "channel": channel.as_str(),
            "send_at": send_at,
        }));
    }

    info!(
        lead_id = %lead.id,
        campaign_id = %payload.campaign_id,
        messages_scheduled = scheduled.len(),
        "outreach scheduled"
    );
    Ok(json!({
        "lead_id": lead.id,
        "messages_scheduled": scheduled.len(),
        "messages": scheduled,
    }))
}

/// Deliver one scheduled email and drive the message state machine.
pub async fn handle_email_send(payload: EmailSendPayload, deps: Arc<ServerDeps>) -> HandlerResult {
    let message = Message::find_by_id(payload.message_id, &deps.db_pool)
        .await
        .map_err(|e| classify_db_error("load message", e))?;

    match message.status {
        MessageStatus::Scheduled | MessageStatus::RetryPending => {}
        MessageStatus::Sent | MessageStatus::Delivered => {
            // A retried job may race an already-delivered attempt.
            return Ok(json!({"message_id": message.id, "skipped": "already sent"}));
        }
        MessageStatus::Bounced | MessageStatus::Unsubscribed => {
            return Ok(json!({"message_id": message.id, "skipped": "recipient state is terminal"}));
        }
        other => {
            return Err(HandlerError::permanent(format!(
                "message {} not sendable from status {}",
                message.id, other
            )));
        }
    }

    let email = OutgoingEmail {
        to: payload.to_email.clone(),
        subject: message.subject.clone().unwrap_or_default(),
        body: message.content.clone(),
    };

    match deps.email_sender.send(&email).await {
        Ok(receipt) => {
            Message::transition_status(message.id, MessageStatus::Sent, &deps.db_pool, &deps.triggers)
                .await
                .map_err(|e| classify_db_error("mark message sent", e))?;
            Ok(json!({
                "message_id": message.id,
                "to": payload.to_email,
                "provider_message_id": receipt.provider_message_id,
            }))
        }
        Err(err) => {
            // scheduled -> failed (-> retry_pending when the job will retry),
            // so a later attempt re-enters through retry_pending -> sent.
            if let Err(e) = Message::transition_status(
                message.id,
                MessageStatus::Failed,
                &deps.db_pool,
                &deps.triggers,
            )
            .await
            {
                warn!(message_id = %message.id, error = %e, "failed to mark message failed");
            } else if matches!(err, HandlerError::Recoverable { .. }) {
                if let Err(e) = Message::transition_status(
                    message.id,
                    MessageStatus::RetryPending,
                    &deps.db_pool,
                    &deps.triggers,
                )
                .await
                {
                    warn!(message_id = %message.id, error = %e, "failed to mark message retry_pending");
                }
            }
            Err(err)
        }
    }
}
