//! Plan request lifecycle.
//!
//! Validates and applies state transitions for [`PlanRequest`]s. Every
//! write goes through an optimistic conditional update in
//! [`regimen_db::queries::plan_requests`], so a stale caller fails instead of
//! overwriting newer state.

use anyhow::{Result, bail};
use sqlx::PgPool;
use uuid::Uuid;

use regimen_db::models::{PlanRequest, RequestStatus};
use regimen_db::queries::plan_requests as db;

/// Longest error message stored on a request.
pub const MAX_ERROR_MESSAGE_CHARS: usize = 255;

/// Outcome of trying to claim a request for one week.
#[derive(Debug, Clone)]
pub enum BeginWeek {
    /// The request is now `generating_week` for the week.
    Started(PlanRequest),
    /// No such request.
    NotFound,
    /// The request is in a state that cannot start a generation.
    Unavailable(RequestStatus),
}

/// The request state machine.
///
/// ```text
/// pending           -> generating_week
/// pending           -> completed_week | all_weeks_completed  (reconcile)
/// generating_week   -> completed_week | all_weeks_completed
/// generating_week   -> failed_generation
/// completed_week    -> generating_week
/// completed_week    -> all_weeks_completed                   (reconcile)
/// failed_generation -> generating_week                       (retry)
/// failed_generation -> pending | completed_week              (resume)
/// pending | completed_week | failed_generation -> user_cancelled
/// ```
///
/// `all_weeks_completed` and `user_cancelled` are terminal.
pub struct RequestLifecycle;

impl RequestLifecycle {
    pub fn is_valid_transition(from: RequestStatus, to: RequestStatus) -> bool {
        use RequestStatus::*;
        matches!(
            (from, to),
            (Pending, GeneratingWeek)
                | (Pending, CompletedWeek)
                | (Pending, AllWeeksCompleted)
                | (Pending, UserCancelled)
                | (GeneratingWeek, CompletedWeek)
                | (GeneratingWeek, AllWeeksCompleted)
                | (GeneratingWeek, FailedGeneration)
                | (CompletedWeek, GeneratingWeek)
                | (CompletedWeek, AllWeeksCompleted)
                | (CompletedWeek, UserCancelled)
                | (FailedGeneration, GeneratingWeek)
                | (FailedGeneration, Pending)
                | (FailedGeneration, CompletedWeek)
                | (FailedGeneration, UserCancelled)
        )
    }

    /// Status a request should hold after `week` has been generated.
    pub fn status_after_week(request: &PlanRequest, week: i32) -> RequestStatus {
        if request.is_final_week(week) {
            RequestStatus::AllWeeksCompleted
        } else {
            RequestStatus::CompletedWeek
        }
    }

    /// Claim `request_id` for generating `week`.
    ///
    /// Records the week as in flight and clears any earlier error.
    pub async fn begin_week(pool: &PgPool, request_id: Uuid, week: i32) -> Result<BeginWeek> {
        if let Some(request) = db::start_week(pool, request_id, week).await? {
            return Ok(BeginWeek::Started(request));
        }
        match db::get_request(pool, request_id).await? {
            None => Ok(BeginWeek::NotFound),
            Some(request) => Ok(BeginWeek::Unavailable(request.status)),
        }
    }

    /// Mark `week` as successfully generated.
    ///
    /// Returns the new status. The final week also clears the due date.
    pub async fn complete_week(
        pool: &PgPool,
        request: &PlanRequest,
        week: i32,
    ) -> Result<RequestStatus> {
        let to = Self::status_after_week(request, week);
        let rows = db::complete_week(pool, request.id, week, request.is_final_week(week)).await?;
        if rows == 0 {
            bail!(
                "optimistic lock failed: request {} is no longer generating week {}",
                request.id,
                week
            );
        }
        Ok(to)
    }

    /// Mark `week` as failed with a (truncated) human-readable message.
    pub async fn fail_week(pool: &PgPool, request_id: Uuid, week: i32, message: &str) -> Result<()> {
        let message = truncate_message(message);
        let rows = db::fail_week(pool, request_id, week, &message).await?;
        if rows == 0 {
            bail!(
                "optimistic lock failed: request {} is no longer generating week {}",
                request_id,
                week
            );
        }
        Ok(())
    }

    /// Make sure no in-flight marker for `week` survives the task.
    ///
    /// Returns `true` when a leftover marker had to be cleared.
    pub async fn release_week(pool: &PgPool, request_id: Uuid, week: i32) -> Result<bool> {
        let message = format!("generation of week {week} ended without recording an outcome");
        Ok(db::release_week(pool, request_id, week, &message).await? > 0)
    }

    /// Bring a request in line with an already generated `week` without
    /// generating anything.
    ///
    /// No-op when the request already holds the target status or is
    /// terminal. Returns the status the request holds afterwards.
    pub async fn reconcile(
        pool: &PgPool,
        request: &PlanRequest,
        week: i32,
    ) -> Result<RequestStatus> {
        let to = Self::status_after_week(request, week);
        let from = request.status;
        if from == to || from.is_terminal() {
            return Ok(from);
        }
        if !Self::is_valid_transition(from, to) {
            bail!(
                "invalid state transition: {} -> {} for request {}",
                from,
                to,
                request.id
            );
        }
        let rows = db::transition_status(pool, request.id, from, to, request.is_final_week(week))
            .await?;
        if rows == 0 {
            bail!(
                "optimistic lock failed: request {} no longer has status {}",
                request.id,
                from
            );
        }
        Ok(to)
    }

    /// Mark a request fully generated because no weeks remain.
    pub async fn finish(pool: &PgPool, request: &PlanRequest) -> Result<()> {
        let from = request.status;
        let to = RequestStatus::AllWeeksCompleted;
        if from == to {
            return Ok(());
        }
        if !Self::is_valid_transition(from, to) {
            bail!(
                "invalid state transition: {} -> {} for request {}",
                from,
                to,
                request.id
            );
        }
        let rows = db::transition_status(pool, request.id, from, to, true).await?;
        if rows == 0 {
            bail!(
                "optimistic lock failed: request {} no longer has status {}",
                request.id,
                from
            );
        }
        Ok(())
    }
}

/// Clamp a message to [`MAX_ERROR_MESSAGE_CHARS`] characters.
pub fn truncate_message(message: &str) -> String {
    if message.chars().count() <= MAX_ERROR_MESSAGE_CHARS {
        return message.to_string();
    }
    message.chars().take(MAX_ERROR_MESSAGE_CHARS).collect()
}
