//! Database query functions for the `exercise_logs` table.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use crate::models::{ExerciseLog, SetEntry};

/// A validated log row ready for insert.
#[derive(Debug, Clone)]
pub struct NewExerciseLogRow {
    pub user_id: Uuid,
    pub planned_exercise_id: Option<Uuid>,
    pub exercise_name: String,
    pub sets: Vec<SetEntry>,
    pub log_date: NaiveDate,
    pub completed_day_id: Option<Uuid>,
    pub notes: String,
}

/// Insert a log row.
pub async fn insert_log(pool: &PgPool, row: &NewExerciseLogRow) -> Result<ExerciseLog> {
    let log = sqlx::query_as::<_, ExerciseLog>(
        "INSERT INTO exercise_logs \
             (user_id, planned_exercise_id, exercise_name, sets, log_date, completed_day_id, notes) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING *",
    )
    .bind(row.user_id)
    .bind(row.planned_exercise_id)
    .bind(&row.exercise_name)
    .bind(Json(&row.sets))
    .bind(row.log_date)
    .bind(row.completed_day_id)
    .bind(&row.notes)
    .fetch_one(pool)
    .await
    .context("failed to insert exercise log")?;

    Ok(log)
}

/// Fetch a single log by ID.
pub async fn get_log(pool: &PgPool, id: Uuid) -> Result<Option<ExerciseLog>> {
    let log = sqlx::query_as::<_, ExerciseLog>("SELECT * FROM exercise_logs WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch exercise log")?;

    Ok(log)
}

/// A user's logs, newest first, optionally bounded by an inclusive date
/// range.
pub async fn list_logs_for_user(
    pool: &PgPool,
    user_id: Uuid,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    limit: i64,
    offset: i64,
) -> Result<Vec<ExerciseLog>> {
    let logs = sqlx::query_as::<_, ExerciseLog>(
        "SELECT * FROM exercise_logs \
         WHERE user_id = $1 \
           AND ($2::date IS NULL OR log_date >= $2) \
           AND ($3::date IS NULL OR log_date <= $3) \
         ORDER BY log_date DESC, created_at DESC \
         LIMIT $4 OFFSET $5",
    )
    .bind(user_id)
    .bind(from)
    .bind(to)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
    .context("failed to list exercise logs")?;

    Ok(logs)
}
