//! Visibility rotator.

use anyhow::{Context, Result};
use chrono::{Days, NaiveDate};
use sqlx::PgPool;
use uuid::Uuid;

use regimen_db::queries::weekly_plans;

use crate::config::WorkflowConfig;

/// Plans moved by one rotator run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RotationSummary {
    pub activated: Vec<Uuid>,
    pub archived: Vec<Uuid>,
}

impl RotationSummary {
    pub fn is_empty(&self) -> bool {
        self.activated.is_empty() && self.archived.is_empty()
    }
}

/// Promote `upcoming` plans that have become active, then archive `visible`
/// plans whose active date is older than the active duration.
///
/// Activation runs first and stamps `visible_since = today`, so nothing it
/// promotes can be archived in the same run, and a second run on the same
/// day changes nothing.
pub async fn rotate_visibility(
    pool: &PgPool,
    config: &WorkflowConfig,
    today: NaiveDate,
) -> Result<RotationSummary> {
    let active_days =
        u64::try_from(config.active_duration_days).context("active duration must not be negative")?;
    let cutoff = today
        .checked_sub_days(Days::new(active_days))
        .context("archive cutoff out of range")?;

    let activated = weekly_plans::activate_due_plans(pool, today).await?;
    for id in &activated {
        tracing::debug!(plan_id = %id, "plan activated");
    }

    let archived = weekly_plans::archive_elapsed_plans(pool, today, cutoff).await?;
    for id in &archived {
        tracing::debug!(plan_id = %id, "plan archived");
    }

    tracing::info!(
        activated = activated.len(),
        archived = archived.len(),
        %today,
        %cutoff,
        "visibility rotation finished"
    );

    Ok(RotationSummary {
        activated,
        archived,
    })
}
