use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Lifecycle state of a [`PlanRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    GeneratingWeek,
    CompletedWeek,
    AllWeeksCompleted,
    FailedGeneration,
    UserCancelled,
}

impl RequestStatus {
    /// States from which a generation may start.
    pub const STARTABLE: [RequestStatus; 3] = [
        RequestStatus::Pending,
        RequestStatus::CompletedWeek,
        RequestStatus::FailedGeneration,
    ];

    /// No further generation happens automatically or manually.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::AllWeeksCompleted | Self::UserCancelled)
    }

    /// The due-week trigger only considers requests in these states.
    pub fn is_schedulable(self) -> bool {
        matches!(self, Self::Pending | Self::CompletedWeek)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::GeneratingWeek => "generating_week",
            Self::CompletedWeek => "completed_week",
            Self::AllWeeksCompleted => "all_weeks_completed",
            Self::FailedGeneration => "failed_generation",
            Self::UserCancelled => "user_cancelled",
        };
        f.write_str(s)
    }
}

impl FromStr for RequestStatus {
    type Err = RequestStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "generating_week" => Ok(Self::GeneratingWeek),
            "completed_week" => Ok(Self::CompletedWeek),
            "all_weeks_completed" => Ok(Self::AllWeeksCompleted),
            "failed_generation" => Ok(Self::FailedGeneration),
            "user_cancelled" => Ok(Self::UserCancelled),
            other => Err(RequestStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`RequestStatus`] string.
#[derive(Debug, Clone)]
pub struct RequestStatusParseError(pub String);

impl fmt::Display for RequestStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid request status: {:?}", self.0)
    }
}

impl std::error::Error for RequestStatusParseError {}

/// Whether a [`WeeklyPlan`] is surfaced to its user.
///
/// Moves only forward: `upcoming -> visible -> archived`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Upcoming,
    Visible,
    Archived,
}

impl Visibility {
    /// Visibility of a freshly generated week that becomes active on
    /// `active_date`.
    pub fn initial(active_date: NaiveDate, today: NaiveDate) -> Self {
        if active_date <= today {
            Self::Visible
        } else {
            Self::Upcoming
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Upcoming => "upcoming",
            Self::Visible => "visible",
            Self::Archived => "archived",
        };
        f.write_str(s)
    }
}

impl FromStr for Visibility {
    type Err = VisibilityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upcoming" => Ok(Self::Upcoming),
            "visible" => Ok(Self::Visible),
            "archived" => Ok(Self::Archived),
            other => Err(VisibilityParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`Visibility`] string.
#[derive(Debug, Clone)]
pub struct VisibilityParseError(pub String);

impl fmt::Display for VisibilityParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid visibility: {:?}", self.0)
    }
}

impl std::error::Error for VisibilityParseError {}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Profile attributes used to personalise generation. Read-only to the
/// generation workflow.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub sex: Option<String>,
    pub fitness_level: Option<String>,
    pub goal: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// Age in whole years on `today`, if a birthday is recorded.
    pub fn age_on(&self, today: NaiveDate) -> Option<u32> {
        let birthday = self.birthday?;
        let mut years = today.year() - birthday.year();
        if (today.month(), today.day()) < (birthday.month(), birthday.day()) {
            years -= 1;
        }
        u32::try_from(years).ok()
    }
}

// ---------------------------------------------------------------------------
// Plan requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlanRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub requested_at: DateTime<Utc>,
    pub duration_weeks: i32,
    pub days_per_week: i32,
    /// Snapshot taken at submission; later profile edits do not apply.
    pub fitness_level: Option<String>,
    pub primary_goal: Option<String>,
    pub focus_areas: Option<String>,
    pub status: RequestStatus,
    /// Week currently in flight. `None` whenever no generation is running.
    pub current_week: Option<i32>,
    pub error_message: Option<String>,
    pub next_generation_due: Option<NaiveDate>,
    pub updated_at: DateTime<Utc>,
}

impl PlanRequest {
    /// Calendar date the request was submitted (UTC).
    pub fn submitted_on(&self) -> NaiveDate {
        self.requested_at.date_naive()
    }

    pub fn is_final_week(&self, week_number: i32) -> bool {
        week_number >= self.duration_weeks
    }
}

// ---------------------------------------------------------------------------
// Generated content
// ---------------------------------------------------------------------------

/// One generated week. The audit columns are never serialized; use
/// [`PlanAudit`] for operator inspection.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WeeklyPlan {
    pub id: Uuid,
    pub request_id: Uuid,
    pub user_id: Uuid,
    pub week_number: i32,
    pub active_date: NaiveDate,
    pub visibility: Visibility,
    pub visible_since: Option<NaiveDate>,
    pub theme: Option<String>,
    #[serde(skip_serializing, default)]
    pub generation_prompt: String,
    #[serde(skip_serializing, default)]
    pub provider_response: Option<serde_json::Value>,
    pub generated_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Operator-only view of what was sent to and received from the provider.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PlanAudit {
    pub id: Uuid,
    pub request_id: Uuid,
    pub week_number: i32,
    pub generation_prompt: String,
    pub provider_response: Option<serde_json::Value>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlannedDay {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub day_number: i32,
    pub calendar_date: NaiveDate,
    pub title: String,
    pub is_rest_day: bool,
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlannedExercise {
    pub id: Uuid,
    pub day_id: Uuid,
    pub name: String,
    pub description: String,
    /// Free-form, e.g. `"3-4"`.
    pub target_sets: String,
    /// Free-form, e.g. `"8-12"`.
    pub target_reps: String,
    pub target_rest_seconds: Option<i32>,
    pub intensity: Option<String>,
    pub media_url: Option<String>,
    pub position: i32,
}

/// User-facing view of a plan: the week with its days and their exercises.
#[derive(Debug, Clone, Serialize)]
pub struct PlanDetail {
    pub plan: WeeklyPlan,
    pub days: Vec<DayDetail>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayDetail {
    #[serde(flatten)]
    pub day: PlannedDay,
    pub exercises: Vec<PlannedExercise>,
}

// ---------------------------------------------------------------------------
// Exercise logs
// ---------------------------------------------------------------------------

/// Result of a single performed set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SetEntry {
    pub set_number: i32,
    pub reps: i32,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExerciseLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub planned_exercise_id: Option<Uuid>,
    pub exercise_name: String,
    pub sets: Json<Vec<SetEntry>>,
    pub log_date: NaiveDate,
    pub completed_day_id: Option<Uuid>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl ExerciseLog {
    pub fn total_sets_done(&self) -> usize {
        self.sets.0.len()
    }

    pub fn total_reps_done(&self) -> i64 {
        self.sets.0.iter().map(|s| i64::from(s.reps)).sum()
    }
}
