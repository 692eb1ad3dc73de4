//! Wall-clock scheduling of the trigger and rotator (UTC).

use std::sync::Arc;

use anyhow::{Result, anyhow};
use chrono::Utc;
use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler};

use super::{rotate_visibility, run_due_week_trigger};
use crate::config::WorkflowConfig;
use crate::worker::Dispatch;

/// Register both jobs and start the scheduler.
///
/// Job failures are logged; the scheduler keeps running. Call
/// `shutdown()` on the returned scheduler to stop it.
pub async fn start_cron_jobs(
    pool: PgPool,
    dispatcher: Arc<dyn Dispatch>,
    config: WorkflowConfig,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new()
        .await
        .map_err(|e| anyhow!("failed to create job scheduler: {e}"))?;

    let trigger_job = {
        let pool = pool.clone();
        let config = config.clone();
        let schedule = config.trigger_schedule.clone();
        Job::new_async(schedule.as_str(), move |_uuid, _l| {
            let pool = pool.clone();
            let dispatcher = Arc::clone(&dispatcher);
            let config = config.clone();
            Box::pin(async move {
                let today = Utc::now().date_naive();
                if let Err(e) =
                    run_due_week_trigger(&pool, dispatcher.as_ref(), &config, today).await
                {
                    tracing::error!(error = %format!("{e:#}"), "due-week trigger run failed");
                }
            })
        })
        .map_err(|e| anyhow!("invalid trigger schedule {schedule:?}: {e}"))?
    };

    let rotator_job = {
        let config = config.clone();
        let schedule = config.rotator_schedule.clone();
        Job::new_async(schedule.as_str(), move |_uuid, _l| {
            let pool = pool.clone();
            let config = config.clone();
            Box::pin(async move {
                let today = Utc::now().date_naive();
                if let Err(e) = rotate_visibility(&pool, &config, today).await {
                    tracing::error!(error = %format!("{e:#}"), "visibility rotation failed");
                }
            })
        })
        .map_err(|e| anyhow!("invalid rotator schedule {schedule:?}: {e}"))?
    };

    scheduler
        .add(trigger_job)
        .await
        .map_err(|e| anyhow!("failed to add trigger job: {e}"))?;
    scheduler
        .add(rotator_job)
        .await
        .map_err(|e| anyhow!("failed to add rotator job: {e}"))?;
    scheduler
        .start()
        .await
        .map_err(|e| anyhow!("failed to start job scheduler: {e}"))?;

    tracing::info!(
        trigger = %config.trigger_schedule,
        rotator = %config.rotator_schedule,
        "cron jobs scheduled"
    );

    Ok(scheduler)
}
