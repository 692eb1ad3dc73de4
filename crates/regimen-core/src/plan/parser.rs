//! Parser for provider output.
//!
//! Turns the provider's raw text into a [`StructuredWeek`]. The text may
//! wrap the JSON object in prose or a markdown fence; the first well-formed
//! object wins. Validation:
//! - The object (optionally under a `weekly_plan` key) has a `days` array.
//! - Every day is an object with an integer `day_number`.
//! - Every exercise is an object with a non-blank `name`.
//!
//! Range checks on `day_number` are left to materialization, which skips
//! out-of-range days with a warning. Everything this module discards is
//! logged.

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

const DEFAULT_DAY_TITLE: &str = "Workout Day";

/// How much of the offending text is quoted in error messages.
const EXCERPT_CHARS: usize = 500;

/// Errors that can occur while parsing provider output.
#[derive(Debug, Error)]
pub enum PlanParseError {
    #[error("malformed JSON: {reason} (response began: {excerpt:?})")]
    MalformedJson { reason: String, excerpt: String },

    #[error("unexpected structure: {reason} (response began: {excerpt:?})")]
    UnexpectedStructure { reason: String, excerpt: String },
}

impl PlanParseError {
    fn malformed(reason: impl Into<String>, raw: &str) -> Self {
        Self::MalformedJson {
            reason: reason.into(),
            excerpt: excerpt(raw),
        }
    }

    fn structure(reason: impl Into<String>, raw: &str) -> Self {
        Self::UnexpectedStructure {
            reason: reason.into(),
            excerpt: excerpt(raw),
        }
    }
}

fn excerpt(raw: &str) -> String {
    raw.chars().take(EXCERPT_CHARS).collect()
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// One week as returned by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredWeek {
    pub theme: Option<String>,
    pub days: Vec<DayPlan>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayPlan {
    /// As emitted; not yet range-checked.
    pub day_number: i64,
    pub title: String,
    pub is_rest_day: bool,
    pub notes: String,
    pub exercises: Vec<ExercisePlan>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExercisePlan {
    pub name: String,
    pub description: String,
    pub target_sets: String,
    pub target_reps: String,
    pub target_rest_seconds: Option<i32>,
    pub intensity: Option<String>,
    pub media_url: Option<String>,
    /// Unique within the day.
    pub order: i32,
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawDay {
    #[serde(default)]
    day_number: Option<Value>,
    #[serde(default, alias = "title")]
    day_title: Option<String>,
    #[serde(default)]
    is_rest_day: Option<bool>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    exercises: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct RawExercise {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    target_sets: Option<Value>,
    #[serde(default)]
    target_reps: Option<Value>,
    #[serde(default)]
    target_rest_seconds: Option<Value>,
    #[serde(default, alias = "intensity")]
    target_weight_or_intensity: Option<String>,
    #[serde(default, alias = "media")]
    media_url: Option<String>,
    #[serde(default)]
    order: Option<Value>,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Parse raw provider text into a [`StructuredWeek`].
///
/// Pure function of its input.
pub fn parse_week(raw: &str) -> Result<StructuredWeek, PlanParseError> {
    let object = extract_object(raw)?;

    let root = match object.get("weekly_plan") {
        Some(Value::Object(inner)) => inner,
        Some(_) => {
            return Err(PlanParseError::structure(
                "\"weekly_plan\" is not an object",
                raw,
            ));
        }
        None => &object,
    };

    let theme = match root.get("weekly_theme").or_else(|| root.get("theme")) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::String(_)) | Some(Value::Null) | None => None,
        Some(other) => {
            tracing::warn!(value = %other, "ignoring non-string weekly theme");
            None
        }
    };

    let days = match root.get("days") {
        Some(Value::Array(days)) => days,
        Some(_) => return Err(PlanParseError::structure("\"days\" is not an array", raw)),
        None => return Err(PlanParseError::structure("missing \"days\" array", raw)),
    };

    let days = days
        .iter()
        .enumerate()
        .map(|(idx, day)| parse_day(idx, day, raw))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(StructuredWeek { theme, days })
}

/// Find the first JSON object in `raw`.
///
/// Tries, in order: a ```json fenced block, the whole trimmed text, then
/// every `{` position scanning forward.
fn extract_object(raw: &str) -> Result<Map<String, Value>, PlanParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PlanParseError::malformed("response is empty", raw));
    }

    if let Some(fenced) = fenced_block(trimmed) {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(fenced) {
            return Ok(map);
        }
    }

    let whole_err = match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => return Ok(map),
        Ok(_) => "top-level JSON value is not an object".to_string(),
        Err(e) => e.to_string(),
    };

    for (pos, _) in trimmed.match_indices('{') {
        let mut stream = serde_json::Deserializer::from_str(&trimmed[pos..]).into_iter::<Value>();
        if let Some(Ok(Value::Object(map))) = stream.next() {
            return Ok(map);
        }
    }

    Err(PlanParseError::malformed(
        format!("no JSON object found ({whole_err})"),
        raw,
    ))
}

/// Contents of the first markdown code fence, preferring one tagged `json`.
fn fenced_block(text: &str) -> Option<&str> {
    let start = text
        .find("```json")
        .map(|i| i + "```json".len())
        .or_else(|| text.find("```").map(|i| i + 3))?;
    let rest = &text[start..];
    let end = rest.find("```")?;
    Some(rest[..end].trim())
}

fn parse_day(idx: usize, value: &Value, raw: &str) -> Result<DayPlan, PlanParseError> {
    if !value.is_object() {
        return Err(PlanParseError::structure(
            format!("day at index {idx} is not an object"),
            raw,
        ));
    }
    let day: RawDay = serde_json::from_value(value.clone()).map_err(|e| {
        PlanParseError::structure(format!("day at index {idx}: {e}"), raw)
    })?;

    let day_number = day.day_number.as_ref().and_then(as_integer).ok_or_else(|| {
        PlanParseError::structure(
            format!("day at index {idx} has no integer \"day_number\""),
            raw,
        )
    })?;

    let title = day
        .day_title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_DAY_TITLE.to_string());
    let is_rest_day = day.is_rest_day.unwrap_or(false);

    let raw_exercises = day.exercises.unwrap_or_default();
    let mut exercises = raw_exercises
        .iter()
        .enumerate()
        .map(|(pos, ex)| parse_exercise(day_number, pos, ex, raw))
        .collect::<Result<Vec<_>, _>>()?;

    if is_rest_day && !exercises.is_empty() {
        tracing::warn!(
            day_number,
            dropped = exercises.len(),
            "dropping exercises listed on a rest day"
        );
        exercises.clear();
    }

    normalize_order(day_number, &mut exercises);

    Ok(DayPlan {
        day_number,
        title,
        is_rest_day,
        notes: day.notes.unwrap_or_default(),
        exercises,
    })
}

fn parse_exercise(
    day_number: i64,
    pos: usize,
    value: &Value,
    raw: &str,
) -> Result<ExercisePlan, PlanParseError> {
    if !value.is_object() {
        return Err(PlanParseError::structure(
            format!("exercise {} of day {day_number} is not an object", pos + 1),
            raw,
        ));
    }
    let ex: RawExercise = serde_json::from_value(value.clone()).map_err(|e| {
        PlanParseError::structure(
            format!("exercise {} of day {day_number}: {e}", pos + 1),
            raw,
        )
    })?;

    let name = ex
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| {
            PlanParseError::structure(
                format!("exercise {} of day {day_number} has no \"name\"", pos + 1),
                raw,
            )
        })?;

    let target_rest_seconds = match ex.target_rest_seconds {
        None | Some(Value::Null) => None,
        Some(v) => {
            let secs = as_integer(&v).and_then(|n| i32::try_from(n).ok());
            if secs.is_none() {
                tracing::warn!(exercise = %name, value = %v, "ignoring non-integer rest seconds");
            }
            secs
        }
    };

    let default_order = i32::try_from(pos + 1).unwrap_or(i32::MAX);
    let order = ex
        .order
        .as_ref()
        .and_then(as_integer)
        .and_then(|n| i32::try_from(n).ok())
        .unwrap_or(default_order);

    Ok(ExercisePlan {
        name,
        description: ex.description.unwrap_or_default(),
        target_sets: ex.target_sets.map(as_text).unwrap_or_default(),
        target_reps: ex.target_reps.map(as_text).unwrap_or_default(),
        target_rest_seconds,
        intensity: ex
            .target_weight_or_intensity
            .filter(|s| !s.trim().is_empty()),
        media_url: ex.media_url.filter(|s| !s.trim().is_empty()),
        order,
    })
}

/// Replace colliding order indices with enumeration positions.
fn normalize_order(day_number: i64, exercises: &mut [ExercisePlan]) {
    let mut seen = HashSet::with_capacity(exercises.len());
    let unique = exercises.iter().all(|e| seen.insert(e.order));
    if unique {
        return;
    }
    tracing::warn!(
        day_number,
        "duplicate exercise order indices, renumbering by position"
    );
    for (pos, exercise) in exercises.iter_mut().enumerate() {
        exercise.order = i32::try_from(pos + 1).unwrap_or(i32::MAX);
    }
}

/// Integer from a JSON number or numeric string.
fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Free-form text from a string or number.
fn as_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
