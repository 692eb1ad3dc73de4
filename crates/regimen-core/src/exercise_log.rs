//! Recording performed exercises against (optionally) planned ones.

use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use regimen_db::models::{ExerciseLog, SetEntry};
use regimen_db::queries::exercise_logs::{self, NewExerciseLogRow};
use regimen_db::queries::weekly_plans;

/// Logs per page in listings.
pub const LOGS_PAGE_SIZE: i64 = 20;

/// Name stored when neither an explicit nor a planned name is available.
const AD_HOC_NAME: &str = "Ad-hoc Exercise";

#[derive(Debug, thiserror::Error)]
pub enum LogValidationError {
    #[error("either an exercise name or a planned exercise is required")]
    MissingExercise,

    #[error("at least one set is required")]
    NoSets,

    #[error("set {index}: set number must be at least 1, got {value}")]
    InvalidSetNumber { index: usize, value: i32 },

    #[error("set {index}: reps must not be negative, got {value}")]
    NegativeReps { index: usize, value: i32 },

    #[error("set {index}: weight must be a non-negative number, got {value}")]
    InvalidWeight { index: usize, value: f64 },

    #[error("planned exercise {0} not found")]
    PlannedExerciseNotFound(Uuid),

    #[error("planned day {0} not found")]
    DayNotFound(Uuid),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// A user's report of one performed exercise.
#[derive(Debug, Clone, Default)]
pub struct NewExerciseLog {
    pub planned_exercise_id: Option<Uuid>,
    pub exercise_name: Option<String>,
    pub sets: Vec<SetEntry>,
    /// Defaults to today.
    pub log_date: Option<NaiveDate>,
    pub completed_day_id: Option<Uuid>,
    pub notes: Option<String>,
}

impl NewExerciseLog {
    /// Checks that need no database access.
    pub fn validate(&self) -> Result<(), LogValidationError> {
        let has_name = self
            .exercise_name
            .as_deref()
            .is_some_and(|n| !n.trim().is_empty());
        if !has_name && self.planned_exercise_id.is_none() {
            return Err(LogValidationError::MissingExercise);
        }
        if self.sets.is_empty() {
            return Err(LogValidationError::NoSets);
        }
        for (index, set) in self.sets.iter().enumerate() {
            if set.set_number < 1 {
                return Err(LogValidationError::InvalidSetNumber {
                    index,
                    value: set.set_number,
                });
            }
            if set.reps < 0 {
                return Err(LogValidationError::NegativeReps {
                    index,
                    value: set.reps,
                });
            }
            if !set.weight.is_finite() || set.weight < 0.0 {
                return Err(LogValidationError::InvalidWeight {
                    index,
                    value: set.weight,
                });
            }
        }
        Ok(())
    }
}

/// Validate and store a log for `user_id`.
///
/// Referenced planned rows must belong to one of the user's plans.
pub async fn log_exercise(
    pool: &PgPool,
    user_id: Uuid,
    input: NewExerciseLog,
    today: NaiveDate,
) -> Result<ExerciseLog, LogValidationError> {
    input.validate()?;

    let planned_name = match input.planned_exercise_id {
        Some(id) => {
            let exercise = weekly_plans::get_exercise_for_user(pool, id, user_id)
                .await?
                .ok_or(LogValidationError::PlannedExerciseNotFound(id))?;
            Some(exercise.name)
        }
        None => None,
    };

    if let Some(day_id) = input.completed_day_id {
        weekly_plans::get_day_for_user(pool, day_id, user_id)
            .await?
            .ok_or(LogValidationError::DayNotFound(day_id))?;
    }

    let exercise_name = input
        .exercise_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .or(planned_name)
        .unwrap_or_else(|| AD_HOC_NAME.to_string());

    let row = NewExerciseLogRow {
        user_id,
        planned_exercise_id: input.planned_exercise_id,
        exercise_name,
        sets: input.sets,
        log_date: input.log_date.unwrap_or(today),
        completed_day_id: input.completed_day_id,
        notes: input.notes.unwrap_or_default(),
    };
    let log = exercise_logs::insert_log(pool, &row).await?;

    tracing::info!(
        log_id = %log.id,
        user_id = %user_id,
        exercise = %log.exercise_name,
        sets = log.total_sets_done(),
        reps = log.total_reps_done(),
        "exercise logged"
    );

    Ok(log)
}

/// A page (0-based) of a user's logs, newest first, optionally limited to
/// an inclusive date range.
pub async fn list_logs(
    pool: &PgPool,
    user_id: Uuid,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    page: u32,
) -> anyhow::Result<Vec<ExerciseLog>> {
    let offset = i64::from(page) * LOGS_PAGE_SIZE;
    exercise_logs::list_logs_for_user(pool, user_id, from, to, LOGS_PAGE_SIZE, offset).await
}
