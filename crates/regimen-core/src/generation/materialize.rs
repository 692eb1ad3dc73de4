//! Persist a parsed week.
//!
//! Inserts or replaces the weekly plan, its days and their exercises inside
//! a single database transaction. If any step fails the transaction rolls
//! back on drop and nothing of the week is left behind.

use std::collections::HashSet;

use anyhow::Context;
use chrono::{Days, NaiveDate};
use sqlx::PgPool;
use uuid::Uuid;

use regimen_db::models::{PlanRequest, Visibility, WeeklyPlan};

use super::GenerationError;
use crate::plan::StructuredWeek;

/// Days between consecutive weeks' active dates.
pub const DAYS_PER_WEEK: u64 = 7;

/// Summary of what was written for one week.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedWeek {
    pub plan_id: Uuid,
    pub active_date: NaiveDate,
    pub visibility: Visibility,
    pub days: usize,
    pub exercises: usize,
}

/// What [`materialize_week`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Materialized {
    /// The week was inserted, or an `upcoming` week was replaced.
    Written(MaterializedWeek),
    /// The week had already been surfaced (`visible` or `archived`) and was
    /// left untouched.
    AlreadySurfaced(Uuid),
}

/// Audit payload stored with the plan.
#[derive(Debug, Clone, Copy)]
pub struct Audit<'a> {
    pub prompt: &'a str,
    pub response: &'a serde_json::Value,
}

/// Write `parsed` as week `week` of `request`.
///
/// Week 1 becomes active on the submission date; later weeks seven days
/// after the previous week, which must already exist. Only a missing or
/// `upcoming` week is written; the check holds the plan row's lock for the
/// rest of the transaction.
pub async fn materialize_week(
    pool: &PgPool,
    request: &PlanRequest,
    week: i32,
    parsed: &StructuredWeek,
    audit: Audit<'_>,
    today: NaiveDate,
) -> Result<Materialized, GenerationError> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    // 1. Anchor the week on the calendar.
    let active_date = if week <= 1 {
        request.submitted_on()
    } else {
        let previous: Option<NaiveDate> = sqlx::query_scalar(
            "SELECT active_date FROM weekly_plans WHERE request_id = $1 AND week_number = $2",
        )
        .bind(request.id)
        .bind(week - 1)
        .fetch_optional(&mut *tx)
        .await
        .context("failed to look up previous week")?;

        let previous = previous.ok_or(GenerationError::MissingPreviousWeek { week })?;
        previous
            .checked_add_days(Days::new(DAYS_PER_WEEK))
            .context("active date out of range")?
    };

    let visibility = Visibility::initial(active_date, today);
    let visible_since = (visibility == Visibility::Visible).then_some(today);

    // 2. Insert the plan row, or replace it while still upcoming.
    let plan = sqlx::query_as::<_, WeeklyPlan>(
        "INSERT INTO weekly_plans \
             (request_id, user_id, week_number, active_date, visibility, visible_since, \
              theme, generation_prompt, provider_response) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         ON CONFLICT (request_id, week_number) DO UPDATE SET \
             active_date = EXCLUDED.active_date, \
             visibility = EXCLUDED.visibility, \
             visible_since = EXCLUDED.visible_since, \
             theme = EXCLUDED.theme, \
             generation_prompt = EXCLUDED.generation_prompt, \
             provider_response = EXCLUDED.provider_response, \
             generated_at = now(), \
             updated_at = now() \
         WHERE weekly_plans.visibility = 'upcoming' \
         RETURNING *",
    )
    .bind(request.id)
    .bind(request.user_id)
    .bind(week)
    .bind(active_date)
    .bind(visibility)
    .bind(visible_since)
    .bind(&parsed.theme)
    .bind(audit.prompt)
    .bind(audit.response)
    .fetch_optional(&mut *tx)
    .await
    .context("failed to upsert weekly plan")?;

    let Some(plan) = plan else {
        let plan_id: Uuid = sqlx::query_scalar(
            "SELECT id FROM weekly_plans WHERE request_id = $1 AND week_number = $2",
        )
        .bind(request.id)
        .bind(week)
        .fetch_one(&mut *tx)
        .await
        .context("failed to look up surfaced week")?;
        tracing::warn!(
            request_id = %request.id,
            week,
            plan_id = %plan_id,
            "week already surfaced, not overwriting"
        );
        return Ok(Materialized::AlreadySurfaced(plan_id));
    };

    // 3. Drop children of a previous attempt (exercises cascade).
    sqlx::query("DELETE FROM planned_days WHERE plan_id = $1")
        .bind(plan.id)
        .execute(&mut *tx)
        .await
        .context("failed to clear planned days")?;

    // 4. Insert days and exercises.
    let mut seen_days: HashSet<i64> = HashSet::new();
    let mut days = 0;
    let mut exercises = 0;

    for day in &parsed.days {
        if !(1..=7).contains(&day.day_number) {
            tracing::warn!(
                request_id = %request.id,
                week,
                day_number = day.day_number,
                "skipping day with out-of-range day number"
            );
            continue;
        }
        if !seen_days.insert(day.day_number) {
            tracing::warn!(
                request_id = %request.id,
                week,
                day_number = day.day_number,
                "skipping duplicate day number"
            );
            continue;
        }

        // Range checked above.
        let offset = (day.day_number - 1) as u64;
        let day_number = day.day_number as i32;
        let calendar_date = active_date
            .checked_add_days(Days::new(offset))
            .context("calendar date out of range")?;

        let day_id: Uuid = sqlx::query_scalar(
            "INSERT INTO planned_days \
                 (plan_id, day_number, calendar_date, title, is_rest_day, notes) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id",
        )
        .bind(plan.id)
        .bind(day_number)
        .bind(calendar_date)
        .bind(&day.title)
        .bind(day.is_rest_day)
        .bind(&day.notes)
        .fetch_one(&mut *tx)
        .await
        .with_context(|| format!("failed to insert day {day_number}"))?;
        days += 1;

        for exercise in &day.exercises {
            sqlx::query(
                "INSERT INTO planned_exercises \
                     (day_id, name, description, target_sets, target_reps, \
                      target_rest_seconds, intensity, media_url, position) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(day_id)
            .bind(&exercise.name)
            .bind(&exercise.description)
            .bind(&exercise.target_sets)
            .bind(&exercise.target_reps)
            .bind(exercise.target_rest_seconds)
            .bind(&exercise.intensity)
            .bind(&exercise.media_url)
            .bind(exercise.order)
            .execute(&mut *tx)
            .await
            .with_context(|| {
                format!("failed to insert exercise {:?} on day {day_number}", exercise.name)
            })?;
            exercises += 1;
        }
    }

    tx.commit().await.context("failed to commit weekly plan")?;

    Ok(Materialized::Written(MaterializedWeek {
        plan_id: plan.id,
        active_date,
        visibility,
        days,
        exercises,
    }))
}
