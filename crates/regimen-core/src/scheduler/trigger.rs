//! Due-week trigger.

use anyhow::{Context, Result};
use chrono::{Days, NaiveDate};
use sqlx::PgPool;

use regimen_db::models::{PlanRequest, Visibility};
use regimen_db::queries::{plan_requests, weekly_plans};

use crate::config::WorkflowConfig;
use crate::lifecycle::RequestLifecycle;
use crate::worker::Dispatch;

/// What one trigger run did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TriggerSummary {
    /// Requests found due.
    pub due: usize,
    /// Weeks handed to the dispatcher.
    pub dispatched: usize,
    /// Requests whose next week already existed.
    pub reconciled: usize,
    /// Requests marked fully generated because no weeks remained.
    pub completed: usize,
    /// Requests that hit an error; the run continued past them.
    pub errors: usize,
}

enum Action {
    Dispatched,
    Reconciled,
    Completed,
}

/// Dispatch the next week of every request due on or before `today`.
///
/// Requests that are finished, failed, cancelled or mid-generation are
/// never picked up. An error on one request is logged and does not stop
/// the others.
pub async fn run_due_week_trigger(
    pool: &PgPool,
    dispatcher: &dyn Dispatch,
    config: &WorkflowConfig,
    today: NaiveDate,
) -> Result<TriggerSummary> {
    let due = plan_requests::due_requests(pool, today).await?;
    let mut summary = TriggerSummary {
        due: due.len(),
        ..TriggerSummary::default()
    };

    for request in &due {
        match trigger_request(pool, dispatcher, config, request, today).await {
            Ok(Action::Dispatched) => summary.dispatched += 1,
            Ok(Action::Reconciled) => summary.reconciled += 1,
            Ok(Action::Completed) => summary.completed += 1,
            Err(e) => {
                summary.errors += 1;
                tracing::error!(
                    request_id = %request.id,
                    error = %format!("{e:#}"),
                    "due-week trigger failed for request"
                );
            }
        }
    }

    tracing::info!(
        due = summary.due,
        dispatched = summary.dispatched,
        reconciled = summary.reconciled,
        completed = summary.completed,
        errors = summary.errors,
        "due-week trigger finished"
    );

    Ok(summary)
}

async fn trigger_request(
    pool: &PgPool,
    dispatcher: &dyn Dispatch,
    config: &WorkflowConfig,
    request: &PlanRequest,
    today: NaiveDate,
) -> Result<Action> {
    let next_week = weekly_plans::highest_week(pool, request.id)
        .await?
        .map_or(1, |week| week + 1);

    if next_week > request.duration_weeks {
        tracing::info!(
            request_id = %request.id,
            duration_weeks = request.duration_weeks,
            "all weeks generated, completing request"
        );
        RequestLifecycle::finish(pool, request).await?;
        return Ok(Action::Completed);
    }

    let following_due = due_after_dispatch(request, next_week, config, today)?;

    if let Some(plan) = weekly_plans::get_plan_for_week(pool, request.id, next_week).await? {
        if plan.visibility == Visibility::Visible {
            tracing::warn!(
                request_id = %request.id,
                week = next_week,
                plan_id = %plan.id,
                "week already generated, reconciling without dispatch"
            );
            RequestLifecycle::reconcile(pool, request, next_week).await?;
            plan_requests::set_next_due(pool, request.id, following_due).await?;
            return Ok(Action::Reconciled);
        }
    }

    tracing::info!(request_id = %request.id, week = next_week, "dispatching due week");
    dispatcher.dispatch(request.id, next_week).await?;
    plan_requests::set_next_due(pool, request.id, following_due).await?;

    Ok(Action::Dispatched)
}

/// Due date to record once `week` has been handed off: one interval out,
/// or none when `week` is the last one.
pub fn due_after_dispatch(
    request: &PlanRequest,
    week: i32,
    config: &WorkflowConfig,
    today: NaiveDate,
) -> Result<Option<NaiveDate>> {
    if request.is_final_week(week) {
        return Ok(None);
    }
    advance(today, config.generation_interval_days).map(Some)
}

fn advance(today: NaiveDate, days: i64) -> Result<NaiveDate> {
    let days = u64::try_from(days).context("generation interval must not be negative")?;
    today
        .checked_add_days(Days::new(days))
        .context("next due date out of range")
}
