//! Duplicate and cooldown guards shared by every trigger rule.
//!
//! Idempotency is checked by querying existing non-terminal jobs for the
//! same (job_type, target entity) rather than by uniqueness constraint,
//! because payload shapes differ per job type. Cooldowns measure from the
//! `created_at` of the most recent matching job, not a separate timer.

use anyhow::Result;
use chrono::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::kernel::jobs::{JobType, TriggerSource};

use super::TriggerContext;

/// Whether a matching non-terminal job already exists for the target.
/// Suppression is intentional behavior, logged at debug, never an error.
pub async fn duplicate_suppressed(
    ctx: &mut dyn TriggerContext,
    rule: &'static str,
    job_type: JobType,
    entity_key: Uuid,
) -> Result<bool> {
    if ctx.active_job_exists(job_type, entity_key).await? {
        debug!(
            rule,
            job_type = %job_type,
            entity = %entity_key,
            "duplicate suppressed: matching non-terminal job exists"
        );
        return Ok(true);
    }
    Ok(false)
}

/// Whether the most recent matching job was created inside the window.
pub async fn within_cooldown(
    ctx: &mut dyn TriggerContext,
    rule: &'static str,
    job_type: JobType,
    campaign_id: Uuid,
    triggered_by: Option<TriggerSource>,
    window: Duration,
) -> Result<bool> {
    if let Some(last) = ctx
        .last_job_created_at(job_type, campaign_id, triggered_by)
        .await?
    {
        if ctx.now() - last < window {
            debug!(
                rule,
                job_type = %job_type,
                campaign_id = %campaign_id,
                last_created_at = %last,
                "cooldown window has not elapsed"
            );
            return Ok(true);
        }
    }
    Ok(false)
}
