//! Weekly plan content: prompt rendering and provider-output parsing.

pub mod parser;
pub mod prompt;

pub use parser::{DayPlan, ExercisePlan, PlanParseError, StructuredWeek, parse_week};
pub use prompt::{GenerationContext, SYSTEM_MESSAGE, build_prompt, profile_summary};
