//! Prompt construction for weekly plan generation.
//!
//! Pure logic: resolves the request snapshot against the user's profile
//! into a [`GenerationContext`] and renders the prompt the provider sees.

use chrono::NaiveDate;
use uuid::Uuid;

use regimen_db::models::{PlanRequest, UserProfile};

/// System message sent ahead of every prompt.
pub const SYSTEM_MESSAGE: &str =
    "You are an expert AI fitness coach designing personalized workout plans.";

const FALLBACK_FITNESS_LEVEL: &str = "Not Specified";
const FALLBACK_GOAL: &str = "General Fitness";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Everything the provider needs to generate one week.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationContext {
    pub request_id: Uuid,
    pub week_number: i32,
    pub total_weeks: i32,
    pub days_per_week: i32,
    /// Request snapshot, else profile, else "Not Specified".
    pub fitness_level: String,
    /// Request snapshot, else profile, else "General Fitness".
    pub goal: String,
    pub focus_areas: Option<String>,
    /// e.g. `Age: 32, Sex: female, Weight: 61.5 kg, Height: 168 cm`.
    pub profile_summary: String,
}

impl GenerationContext {
    /// Build the context for `week_number` of `request`.
    ///
    /// `today` is used only to derive the user's age.
    pub fn new(
        request: &PlanRequest,
        profile: &UserProfile,
        week_number: i32,
        today: NaiveDate,
    ) -> Self {
        let fitness_level = first_non_blank([
            request.fitness_level.as_deref(),
            profile.fitness_level.as_deref(),
        ])
        .unwrap_or(FALLBACK_FITNESS_LEVEL)
        .to_string();

        let goal = first_non_blank([request.primary_goal.as_deref(), profile.goal.as_deref()])
            .unwrap_or(FALLBACK_GOAL)
            .to_string();

        let focus_areas = request
            .focus_areas
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Self {
            request_id: request.id,
            week_number,
            total_weeks: request.duration_weeks,
            days_per_week: request.days_per_week,
            fitness_level,
            goal,
            focus_areas,
            profile_summary: profile_summary(profile, today),
        }
    }

    /// The rendered user prompt.
    pub fn prompt(&self) -> String {
        build_prompt(self)
    }
}

fn first_non_blank<'a, const N: usize>(candidates: [Option<&'a str>; N]) -> Option<&'a str> {
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
}

/// One-line summary of the profile; absent attributes are omitted.
pub fn profile_summary(profile: &UserProfile, today: NaiveDate) -> String {
    let mut parts = Vec::with_capacity(4);
    if let Some(age) = profile.age_on(today) {
        parts.push(format!("Age: {age}"));
    }
    if let Some(sex) = profile.sex.as_deref().filter(|s| !s.trim().is_empty()) {
        parts.push(format!("Sex: {sex}"));
    }
    if let Some(weight) = profile.weight_kg {
        parts.push(format!("Weight: {weight} kg"));
    }
    if let Some(height) = profile.height_cm {
        parts.push(format!("Height: {height} cm"));
    }
    parts.join(", ")
}

// ---------------------------------------------------------------------------
// Prompt rendering
// ---------------------------------------------------------------------------

/// Output contract included verbatim in every prompt.
const OUTPUT_FORMAT: &str = r#"## Output Format

Respond with a single JSON object and nothing else. Use this structure:

{
  "weekly_plan": {
    "weekly_theme": "Strength Foundations",
    "days": [
      {
        "day_number": 1,
        "day_title": "Lower Body Strength",
        "is_rest_day": false,
        "notes": "Warm up for 10 minutes first.",
        "exercises": [
          {
            "name": "Back Squat",
            "description": "Keep the chest up and knees tracking over toes.",
            "target_sets": "3-4",
            "target_reps": "8-12",
            "target_rest_seconds": 90,
            "target_weight_or_intensity": "RPE 7-8",
            "order": 1
          }
        ]
      },
      {
        "day_number": 2,
        "day_title": "Rest Day",
        "is_rest_day": true,
        "notes": "Light walking and mobility.",
        "exercises": []
      }
    ]
  }
}

Rules:
- "days" has exactly 7 entries, "day_number" 1 through 7, in order.
- "exercises" is empty on rest days.
- "target_sets" and "target_reps" are strings and may be ranges such as "8-12".
- "target_rest_seconds" is an integer number of seconds.
- "order" starts at 1 within each day.
"#;

/// Render the user prompt for one week.
pub fn build_prompt(ctx: &GenerationContext) -> String {
    let mut prompt = String::with_capacity(3072);

    prompt.push_str("Generate a personalized weekly workout plan.\n\n");

    // User.
    prompt.push_str("## User\n\n");
    if ctx.profile_summary.is_empty() {
        prompt.push_str("- Profile: no details provided\n");
    } else {
        prompt.push_str(&format!("- Profile: {}\n", ctx.profile_summary));
    }
    prompt.push_str(&format!("- Fitness level: {}\n", ctx.fitness_level));
    prompt.push_str(&format!("- Primary goal: {}\n\n", ctx.goal));

    // Program position.
    prompt.push_str("## Program\n\n");
    prompt.push_str(&format!(
        "This is week {} of a {}-week program.",
        ctx.week_number, ctx.total_weeks
    ));
    if ctx.week_number > 1 {
        prompt.push_str(
            " Build on the previous week with sensible progression or variation \
             rather than repeating it.",
        );
    }
    prompt.push_str("\n\n");

    // Weekly structure.
    prompt.push_str("## Structure\n\n");
    prompt.push_str(&format!(
        "The user wants to train {} day(s) this week. Spread the workout days across \
         a 7-day week and mark the remaining days as rest days.\n",
        ctx.days_per_week
    ));
    if let Some(focus) = &ctx.focus_areas {
        prompt.push_str(&format!("Prioritize these focus areas: {focus}.\n"));
    }
    prompt.push('\n');

    prompt.push_str(OUTPUT_FORMAT);

    prompt
}
