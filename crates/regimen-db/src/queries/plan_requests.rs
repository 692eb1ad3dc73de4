//! Database query functions for the `plan_requests` table.
//!
//! Every status write is conditional on the status (and, while generating,
//! the in-flight week) the caller expects, so concurrent writers lose
//! cleanly instead of clobbering each other. Callers inspect the returned
//! row count.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{PlanRequest, RequestStatus};

/// Fields for a new plan request.
#[derive(Debug, Clone)]
pub struct NewPlanRequest {
    pub user_id: Uuid,
    pub duration_weeks: i32,
    pub days_per_week: i32,
    pub fitness_level: Option<String>,
    pub primary_goal: Option<String>,
    pub focus_areas: Option<String>,
    pub next_generation_due: NaiveDate,
}

/// A request that was left mid-generation by a crashed worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct InterruptedWeek {
    pub request_id: Uuid,
    pub week_number: i32,
}

/// Insert a new request in `pending` state.
pub async fn insert_request(pool: &PgPool, new: &NewPlanRequest) -> Result<PlanRequest> {
    let request = sqlx::query_as::<_, PlanRequest>(
        "INSERT INTO plan_requests \
             (user_id, duration_weeks, days_per_week, fitness_level, primary_goal, \
              focus_areas, next_generation_due) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING *",
    )
    .bind(new.user_id)
    .bind(new.duration_weeks)
    .bind(new.days_per_week)
    .bind(&new.fitness_level)
    .bind(&new.primary_goal)
    .bind(&new.focus_areas)
    .bind(new.next_generation_due)
    .fetch_one(pool)
    .await
    .context("failed to insert plan request")?;

    Ok(request)
}

/// Fetch a single request by ID.
pub async fn get_request(pool: &PgPool, id: Uuid) -> Result<Option<PlanRequest>> {
    let request = sqlx::query_as::<_, PlanRequest>("SELECT * FROM plan_requests WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch plan request")?;

    Ok(request)
}

/// A user's requests, newest first.
pub async fn list_requests_for_user(
    pool: &PgPool,
    user_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<PlanRequest>> {
    let requests = sqlx::query_as::<_, PlanRequest>(
        "SELECT * FROM plan_requests \
         WHERE user_id = $1 \
         ORDER BY requested_at DESC, id \
         LIMIT $2 OFFSET $3",
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
    .context("failed to list plan requests")?;

    Ok(requests)
}

// ---------------------------------------------------------------------------
// Generation bookkeeping
// ---------------------------------------------------------------------------

/// Claim a request for generating `week`.
///
/// Succeeds only from `pending`, `completed_week` or `failed_generation`.
/// Clears any previous error. Returns `None` when the request is missing
/// or in any other state (including another week already in flight).
pub async fn start_week(pool: &PgPool, id: Uuid, week: i32) -> Result<Option<PlanRequest>> {
    let request = sqlx::query_as::<_, PlanRequest>(
        "UPDATE plan_requests \
         SET status = 'generating_week', \
             current_week = $2, \
             error_message = NULL, \
             updated_at = now() \
         WHERE id = $1 \
           AND status IN ('pending', 'completed_week', 'failed_generation') \
         RETURNING *",
    )
    .bind(id)
    .bind(week)
    .fetch_optional(pool)
    .await
    .context("failed to mark request as generating")?;

    Ok(request)
}

/// Record a successful week: `completed_week`, or `all_weeks_completed`
/// with the due date cleared when `final_week` is set.
pub async fn complete_week(pool: &PgPool, id: Uuid, week: i32, final_week: bool) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE plan_requests \
         SET status = CASE WHEN $3 THEN 'all_weeks_completed' ELSE 'completed_week' END, \
             next_generation_due = CASE WHEN $3 THEN NULL ELSE next_generation_due END, \
             current_week = NULL, \
             updated_at = now() \
         WHERE id = $1 AND status = 'generating_week' AND current_week = $2",
    )
    .bind(id)
    .bind(week)
    .bind(final_week)
    .execute(pool)
    .await
    .context("failed to mark week completed")?;

    Ok(result.rows_affected())
}

/// Record a failed week with a human-readable cause.
pub async fn fail_week(pool: &PgPool, id: Uuid, week: i32, message: &str) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE plan_requests \
         SET status = 'failed_generation', \
             error_message = $3, \
             current_week = NULL, \
             updated_at = now() \
         WHERE id = $1 AND status = 'generating_week' AND current_week = $2",
    )
    .bind(id)
    .bind(week)
    .bind(message)
    .execute(pool)
    .await
    .context("failed to mark week failed")?;

    Ok(result.rows_affected())
}

/// Clear the in-flight marker for `week` if it is still set.
///
/// A request still claiming to generate `week` is moved to
/// `failed_generation` with `message`; any other status is left alone.
pub async fn release_week(pool: &PgPool, id: Uuid, week: i32, message: &str) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE plan_requests \
         SET status = CASE WHEN status = 'generating_week' \
                           THEN 'failed_generation' ELSE status END, \
             error_message = CASE WHEN status = 'generating_week' \
                                  THEN $3 ELSE error_message END, \
             current_week = NULL, \
             updated_at = now() \
         WHERE id = $1 AND current_week = $2",
    )
    .bind(id)
    .bind(week)
    .bind(message)
    .execute(pool)
    .await
    .context("failed to release in-flight week")?;

    Ok(result.rows_affected())
}

/// Optimistic status transition used for reconciliation. Clears the
/// in-flight marker; clears the due date when `clear_due` is set. Leaving
/// `failed_generation` also drops the recorded error.
pub async fn transition_status(
    pool: &PgPool,
    id: Uuid,
    from: RequestStatus,
    to: RequestStatus,
    clear_due: bool,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE plan_requests \
         SET status = $2, \
             current_week = NULL, \
             error_message = CASE WHEN status = 'failed_generation' \
                                  THEN NULL ELSE error_message END, \
             next_generation_due = CASE WHEN $4 THEN NULL ELSE next_generation_due END, \
             updated_at = now() \
         WHERE id = $1 AND status = $3",
    )
    .bind(id)
    .bind(to)
    .bind(from)
    .bind(clear_due)
    .execute(pool)
    .await
    .context("failed to transition request status")?;

    Ok(result.rows_affected())
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

/// Requests whose next week is due on or before `today`.
///
/// Excludes finished, failed, cancelled and in-flight requests.
pub async fn due_requests(pool: &PgPool, today: NaiveDate) -> Result<Vec<PlanRequest>> {
    let requests = sqlx::query_as::<_, PlanRequest>(
        "SELECT * FROM plan_requests \
         WHERE next_generation_due IS NOT NULL \
           AND next_generation_due <= $1 \
           AND status NOT IN ('all_weeks_completed', 'failed_generation', \
                              'generating_week', 'user_cancelled') \
         ORDER BY next_generation_due ASC, requested_at ASC",
    )
    .bind(today)
    .fetch_all(pool)
    .await
    .context("failed to query due plan requests")?;

    Ok(requests)
}

/// Set (or clear) the next generation due date.
pub async fn set_next_due(pool: &PgPool, id: Uuid, due: Option<NaiveDate>) -> Result<()> {
    let result = sqlx::query(
        "UPDATE plan_requests SET next_generation_due = $2, updated_at = now() WHERE id = $1",
    )
    .bind(id)
    .bind(due)
    .execute(pool)
    .await
    .context("failed to update next generation due date")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("plan request {} not found", id);
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Operator / user actions
// ---------------------------------------------------------------------------

/// Cancel a request between weeks. Returns the number of rows changed;
/// zero when the request is missing, in flight, or already finished.
pub async fn cancel_request(pool: &PgPool, id: Uuid) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE plan_requests \
         SET status = 'user_cancelled', \
             next_generation_due = NULL, \
             updated_at = now() \
         WHERE id = $1 AND status IN ('pending', 'completed_week', 'failed_generation')",
    )
    .bind(id)
    .execute(pool)
    .await
    .context("failed to cancel plan request")?;

    Ok(result.rows_affected())
}

/// Move a failed request back to `to` (`pending` or `completed_week`) with
/// its error cleared and its next week due on `due`.
pub async fn resume_request(
    pool: &PgPool,
    id: Uuid,
    to: RequestStatus,
    due: NaiveDate,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE plan_requests \
         SET status = $2, \
             error_message = NULL, \
             next_generation_due = $3, \
             updated_at = now() \
         WHERE id = $1 AND status = 'failed_generation'",
    )
    .bind(id)
    .bind(to)
    .bind(due)
    .execute(pool)
    .await
    .context("failed to resume plan request")?;

    Ok(result.rows_affected())
}

/// Mark every request left in `generating_week` as failed and return the
/// weeks that were in flight. Used on worker startup.
pub async fn reset_interrupted(pool: &PgPool) -> Result<Vec<InterruptedWeek>> {
    let rows = sqlx::query_as::<_, InterruptedWeek>(
        "WITH stuck AS ( \
             SELECT id, current_week FROM plan_requests \
             WHERE status = 'generating_week' \
             FOR UPDATE \
         ) \
         UPDATE plan_requests p \
         SET status = 'failed_generation', \
             error_message = 'interrupted during generation of week ' \
                             || COALESCE(stuck.current_week::text, '?'), \
             current_week = NULL, \
             updated_at = now() \
         FROM stuck \
         WHERE p.id = stuck.id \
         RETURNING p.id AS request_id, COALESCE(stuck.current_week, 1) AS week_number",
    )
    .fetch_all(pool)
    .await
    .context("failed to reset interrupted requests")?;

    Ok(rows)
}
