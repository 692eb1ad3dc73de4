//! Database query functions for `weekly_plans`, `planned_days` and
//! `planned_exercises`.
//!
//! Writes of generated content happen inside the generation transaction in
//! `regimen-core`; this module covers reads and the visibility rotation.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{DayDetail, PlanAudit, PlanDetail, PlannedDay, PlannedExercise, WeeklyPlan};

/// Fetch a plan by ID.
pub async fn get_plan(pool: &PgPool, id: Uuid) -> Result<Option<WeeklyPlan>> {
    let plan = sqlx::query_as::<_, WeeklyPlan>("SELECT * FROM weekly_plans WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch weekly plan")?;

    Ok(plan)
}

/// Fetch the plan for one week of a request.
pub async fn get_plan_for_week(
    pool: &PgPool,
    request_id: Uuid,
    week_number: i32,
) -> Result<Option<WeeklyPlan>> {
    let plan = sqlx::query_as::<_, WeeklyPlan>(
        "SELECT * FROM weekly_plans WHERE request_id = $1 AND week_number = $2",
    )
    .bind(request_id)
    .bind(week_number)
    .fetch_optional(pool)
    .await
    .context("failed to fetch weekly plan for week")?;

    Ok(plan)
}

/// Highest generated week number for a request, if any.
pub async fn highest_week(pool: &PgPool, request_id: Uuid) -> Result<Option<i32>> {
    let week: Option<i32> =
        sqlx::query_scalar("SELECT MAX(week_number) FROM weekly_plans WHERE request_id = $1")
            .bind(request_id)
            .fetch_one(pool)
            .await
            .context("failed to query highest week")?;

    Ok(week)
}

/// All plans of a request in week order.
pub async fn list_plans_for_request(pool: &PgPool, request_id: Uuid) -> Result<Vec<WeeklyPlan>> {
    let plans = sqlx::query_as::<_, WeeklyPlan>(
        "SELECT * FROM weekly_plans WHERE request_id = $1 ORDER BY week_number ASC",
    )
    .bind(request_id)
    .fetch_all(pool)
    .await
    .context("failed to list plans for request")?;

    Ok(plans)
}

/// The user's current plan: the most recently activated visible week.
pub async fn active_plan_for_user(pool: &PgPool, user_id: Uuid) -> Result<Option<WeeklyPlan>> {
    let plan = sqlx::query_as::<_, WeeklyPlan>(
        "SELECT * FROM weekly_plans \
         WHERE user_id = $1 AND visibility = 'visible' \
         ORDER BY active_date DESC, generated_at DESC \
         LIMIT 1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch active plan")?;

    Ok(plan)
}

/// Every plan a user owns, newest active date first.
pub async fn plan_history_for_user(
    pool: &PgPool,
    user_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<WeeklyPlan>> {
    let plans = sqlx::query_as::<_, WeeklyPlan>(
        "SELECT * FROM weekly_plans \
         WHERE user_id = $1 \
         ORDER BY active_date DESC, week_number DESC \
         LIMIT $2 OFFSET $3",
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
    .context("failed to list plan history")?;

    Ok(plans)
}

/// Days of a plan ordered by day number.
pub async fn list_days(pool: &PgPool, plan_id: Uuid) -> Result<Vec<PlannedDay>> {
    let days = sqlx::query_as::<_, PlannedDay>(
        "SELECT * FROM planned_days WHERE plan_id = $1 ORDER BY day_number ASC",
    )
    .bind(plan_id)
    .fetch_all(pool)
    .await
    .context("failed to list planned days")?;

    Ok(days)
}

/// Every exercise of a plan ordered by day then position.
pub async fn list_exercises_for_plan(pool: &PgPool, plan_id: Uuid) -> Result<Vec<PlannedExercise>> {
    let exercises = sqlx::query_as::<_, PlannedExercise>(
        "SELECT e.* FROM planned_exercises e \
         JOIN planned_days d ON d.id = e.day_id \
         WHERE d.plan_id = $1 \
         ORDER BY d.day_number ASC, e.position ASC",
    )
    .bind(plan_id)
    .fetch_all(pool)
    .await
    .context("failed to list planned exercises")?;

    Ok(exercises)
}

/// A plan with its days and exercises, or `None` when the plan is missing.
pub async fn plan_detail(pool: &PgPool, plan_id: Uuid) -> Result<Option<PlanDetail>> {
    let Some(plan) = get_plan(pool, plan_id).await? else {
        return Ok(None);
    };
    let days = list_days(pool, plan_id).await?;
    let mut exercises = list_exercises_for_plan(pool, plan_id).await?;

    let days = days
        .into_iter()
        .map(|day| {
            let (mine, rest): (Vec<_>, Vec<_>) =
                exercises.drain(..).partition(|e: &PlannedExercise| e.day_id == day.id);
            exercises = rest;
            DayDetail {
                day,
                exercises: mine,
            }
        })
        .collect();

    Ok(Some(PlanDetail { plan, days }))
}

/// Prompt and raw provider response for a plan.
pub async fn get_plan_audit(pool: &PgPool, id: Uuid) -> Result<Option<PlanAudit>> {
    let audit = sqlx::query_as::<_, PlanAudit>(
        "SELECT id, request_id, week_number, generation_prompt, provider_response, generated_at \
         FROM weekly_plans WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch plan audit")?;

    Ok(audit)
}

/// A planned exercise, only if it belongs to one of `user_id`'s plans.
pub async fn get_exercise_for_user(
    pool: &PgPool,
    exercise_id: Uuid,
    user_id: Uuid,
) -> Result<Option<PlannedExercise>> {
    let exercise = sqlx::query_as::<_, PlannedExercise>(
        "SELECT e.* FROM planned_exercises e \
         JOIN planned_days d ON d.id = e.day_id \
         JOIN weekly_plans p ON p.id = d.plan_id \
         WHERE e.id = $1 AND p.user_id = $2",
    )
    .bind(exercise_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch planned exercise")?;

    Ok(exercise)
}

/// A planned day, only if it belongs to one of `user_id`'s plans.
pub async fn get_day_for_user(
    pool: &PgPool,
    day_id: Uuid,
    user_id: Uuid,
) -> Result<Option<PlannedDay>> {
    let day = sqlx::query_as::<_, PlannedDay>(
        "SELECT d.* FROM planned_days d \
         JOIN weekly_plans p ON p.id = d.plan_id \
         WHERE d.id = $1 AND p.user_id = $2",
    )
    .bind(day_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch planned day")?;

    Ok(day)
}

// ---------------------------------------------------------------------------
// Visibility rotation
// ---------------------------------------------------------------------------

/// Promote every `upcoming` plan whose active date is on or before `today`.
///
/// Rows are locked for the duration of the transaction; rows already locked
/// by a concurrent rotation are skipped. Returns the promoted IDs.
pub async fn activate_due_plans(pool: &PgPool, today: NaiveDate) -> Result<Vec<Uuid>> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let ids: Vec<Uuid> = sqlx::query_scalar(
        "SELECT id FROM weekly_plans \
         WHERE visibility = 'upcoming' AND active_date <= $1 \
         ORDER BY active_date \
         FOR UPDATE SKIP LOCKED",
    )
    .bind(today)
    .fetch_all(&mut *tx)
    .await
    .context("failed to select plans to activate")?;

    if !ids.is_empty() {
        sqlx::query(
            "UPDATE weekly_plans \
             SET visibility = 'visible', visible_since = $2, updated_at = now() \
             WHERE id = ANY($1)",
        )
        .bind(&ids)
        .bind(today)
        .execute(&mut *tx)
        .await
        .context("failed to activate plans")?;
    }

    tx.commit().await.context("failed to commit activation")?;

    Ok(ids)
}

/// Archive every `visible` plan whose active date is before `cutoff` and
/// which was already visible before `today`.
///
/// A plan promoted during today's rotation is never archived by the same
/// day's rotation. Returns the archived IDs.
pub async fn archive_elapsed_plans(
    pool: &PgPool,
    today: NaiveDate,
    cutoff: NaiveDate,
) -> Result<Vec<Uuid>> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let ids: Vec<Uuid> = sqlx::query_scalar(
        "SELECT id FROM weekly_plans \
         WHERE visibility = 'visible' \
           AND active_date < $1 \
           AND (visible_since IS NULL OR visible_since < $2) \
         ORDER BY active_date \
         FOR UPDATE SKIP LOCKED",
    )
    .bind(cutoff)
    .bind(today)
    .fetch_all(&mut *tx)
    .await
    .context("failed to select plans to archive")?;

    if !ids.is_empty() {
        sqlx::query(
            "UPDATE weekly_plans \
             SET visibility = 'archived', updated_at = now() \
             WHERE id = ANY($1)",
        )
        .bind(&ids)
        .execute(&mut *tx)
        .await
        .context("failed to archive plans")?;
    }

    tx.commit().await.context("failed to commit archival")?;

    Ok(ids)
}
