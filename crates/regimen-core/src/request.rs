//! User-facing plan request operations: submit, cancel, resume, list.

use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use regimen_db::models::{PlanRequest, RequestStatus};
use regimen_db::queries::plan_requests::{self, NewPlanRequest};
use regimen_db::queries::{users, weekly_plans};

use crate::config::{
    DEFAULT_DAYS_PER_WEEK, DEFAULT_WEEKS, MAX_DAYS_PER_WEEK, MAX_WEEKS, MIN_DAYS_PER_WEEK,
    MIN_WEEKS, WorkflowConfig,
};
use crate::lifecycle::RequestLifecycle;
use crate::scheduler::due_after_dispatch;
use crate::worker::Dispatch;

/// Requests per page in listings.
pub const REQUESTS_PAGE_SIZE: i64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("duration must be between 1 and 12 weeks, got {0}")]
    InvalidDuration(i32),

    #[error("days per week must be between 1 and 7, got {0}")]
    InvalidDaysPerWeek(i32),

    #[error("profile for user {0} not found")]
    ProfileNotFound(Uuid),

    #[error("plan request {0} not found")]
    NotFound(Uuid),

    #[error("cannot {action} request {id} in status {status}")]
    InvalidState {
        id: Uuid,
        action: &'static str,
        status: RequestStatus,
    },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// What a user asks for. Unset fields take defaults or the profile's values.
#[derive(Debug, Clone, Default)]
pub struct SubmitRequest {
    pub user_id: Uuid,
    pub duration_weeks: Option<i32>,
    pub days_per_week: Option<i32>,
    pub fitness_level: Option<String>,
    pub primary_goal: Option<String>,
    pub focus_areas: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Validate, snapshot the profile, store the request and hand week 1 to
/// `dispatcher`.
///
/// The request is stored due today, so a failed hand-off is picked up by
/// the next trigger run. Returns the request as it stands after dispatch.
pub async fn submit_request(
    pool: &PgPool,
    dispatcher: &dyn Dispatch,
    config: &WorkflowConfig,
    input: SubmitRequest,
    today: NaiveDate,
) -> Result<PlanRequest, RequestError> {
    let duration_weeks = input.duration_weeks.unwrap_or(DEFAULT_WEEKS);
    if !(MIN_WEEKS..=MAX_WEEKS).contains(&duration_weeks) {
        return Err(RequestError::InvalidDuration(duration_weeks));
    }
    let days_per_week = input.days_per_week.unwrap_or(DEFAULT_DAYS_PER_WEEK);
    if !(MIN_DAYS_PER_WEEK..=MAX_DAYS_PER_WEEK).contains(&days_per_week) {
        return Err(RequestError::InvalidDaysPerWeek(days_per_week));
    }

    let profile = users::get_profile(pool, input.user_id)
        .await?
        .ok_or(RequestError::ProfileNotFound(input.user_id))?;

    let new = NewPlanRequest {
        user_id: input.user_id,
        duration_weeks,
        days_per_week,
        fitness_level: non_blank(input.fitness_level).or_else(|| non_blank(profile.fitness_level)),
        primary_goal: non_blank(input.primary_goal).or_else(|| non_blank(profile.goal)),
        focus_areas: non_blank(input.focus_areas),
        next_generation_due: today,
    };
    let request = plan_requests::insert_request(pool, &new).await?;

    tracing::info!(
        request_id = %request.id,
        user_id = %request.user_id,
        duration_weeks,
        days_per_week,
        "plan request submitted"
    );

    hand_off(pool, dispatcher, config, &request, 1, today).await?;

    plan_requests::get_request(pool, request.id)
        .await?
        .ok_or(RequestError::NotFound(request.id))
}

/// Cancel a request between weeks.
pub async fn cancel_request(pool: &PgPool, id: Uuid) -> Result<PlanRequest, RequestError> {
    let request = plan_requests::get_request(pool, id)
        .await?
        .ok_or(RequestError::NotFound(id))?;

    let invalid = || RequestError::InvalidState {
        id,
        action: "cancel",
        status: request.status,
    };
    if !RequestLifecycle::is_valid_transition(request.status, RequestStatus::UserCancelled) {
        return Err(invalid());
    }
    if plan_requests::cancel_request(pool, id).await? == 0 {
        // Raced with a generation claiming the request.
        return Err(invalid());
    }

    tracing::info!(request_id = %id, "plan request cancelled");

    plan_requests::get_request(pool, id)
        .await?
        .ok_or(RequestError::NotFound(id))
}

/// Manually resume a failed request from its next missing week.
pub async fn resume_request(
    pool: &PgPool,
    dispatcher: &dyn Dispatch,
    config: &WorkflowConfig,
    id: Uuid,
    today: NaiveDate,
) -> Result<PlanRequest, RequestError> {
    let request = plan_requests::get_request(pool, id)
        .await?
        .ok_or(RequestError::NotFound(id))?;

    let invalid = |status| RequestError::InvalidState {
        id,
        action: "resume",
        status,
    };
    if request.status != RequestStatus::FailedGeneration {
        return Err(invalid(request.status));
    }

    let highest = weekly_plans::highest_week(pool, id).await?;
    let next_week = highest.map_or(1, |week| week + 1);
    let to = if highest.is_some() {
        RequestStatus::CompletedWeek
    } else {
        RequestStatus::Pending
    };

    if plan_requests::resume_request(pool, id, to, today).await? == 0 {
        return Err(invalid(request.status));
    }

    tracing::info!(request_id = %id, week = next_week, status = %to, "plan request resumed");

    if next_week > request.duration_weeks {
        // Every week exists; the trigger finishes the request on its next run.
        return plan_requests::get_request(pool, id)
            .await?
            .ok_or(RequestError::NotFound(id));
    }

    hand_off(pool, dispatcher, config, &request, next_week, today).await?;

    plan_requests::get_request(pool, id)
        .await?
        .ok_or(RequestError::NotFound(id))
}

/// A page (0-based) of a user's requests, newest first.
pub async fn list_requests(
    pool: &PgPool,
    user_id: Uuid,
    page: u32,
) -> Result<Vec<PlanRequest>, RequestError> {
    let offset = i64::from(page) * REQUESTS_PAGE_SIZE;
    let requests =
        plan_requests::list_requests_for_user(pool, user_id, REQUESTS_PAGE_SIZE, offset).await?;
    Ok(requests)
}

/// Dispatch `week` and move the due date past it. A failed dispatch leaves
/// the request due today for the trigger.
async fn hand_off(
    pool: &PgPool,
    dispatcher: &dyn Dispatch,
    config: &WorkflowConfig,
    request: &PlanRequest,
    week: i32,
    today: NaiveDate,
) -> Result<(), RequestError> {
    match dispatcher.dispatch(request.id, week).await {
        Ok(()) => {
            let due = due_after_dispatch(request, week, config, today)?;
            plan_requests::set_next_due(pool, request.id, due).await?;
        }
        Err(e) => {
            tracing::error!(
                request_id = %request.id,
                week,
                error = %format!("{e:#}"),
                "failed to dispatch week, leaving it to the due-week trigger"
            );
        }
    }
    Ok(())
}
