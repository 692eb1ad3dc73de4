//! Workflow and provider configuration.
//!
//! The CLI builds these from its config file and environment; library
//! callers and tests use the defaults and override fields directly.

use std::time::Duration;

/// Smallest and largest program length a request may ask for, in weeks.
pub const MIN_WEEKS: i32 = 1;
pub const MAX_WEEKS: i32 = 12;

/// Bounds on the preferred number of workout days per week.
pub const MIN_DAYS_PER_WEEK: i32 = 1;
pub const MAX_DAYS_PER_WEEK: i32 = 7;

pub const DEFAULT_WEEKS: i32 = 4;
pub const DEFAULT_DAYS_PER_WEEK: i32 = 4;

/// Knobs for scheduling, retries and worker concurrency.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Days between one week's trigger and the next.
    pub generation_interval_days: i64,
    /// How long a week stays visible after its active date before it is
    /// archived.
    pub active_duration_days: i64,
    /// Total attempts for a retryable failure, first attempt included.
    pub retry_attempts: u32,
    /// Fixed delay between attempts.
    pub retry_delay: Duration,
    /// Generations running concurrently in the worker pool.
    pub max_workers: usize,
    /// Cron expression (with seconds, UTC) for the due-week trigger.
    pub trigger_schedule: String,
    /// Cron expression (with seconds, UTC) for the visibility rotator.
    pub rotator_schedule: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            generation_interval_days: 7,
            active_duration_days: 7,
            retry_attempts: 3,
            retry_delay: Duration::from_secs(300),
            max_workers: 4,
            trigger_schedule: "0 0 1 * * *".to_string(),
            rotator_schedule: "0 0 2 * * *".to_string(),
        }
    }
}

/// Settings for the HTTP content provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL of an OpenAI-compatible API.
    pub api_base: String,
    pub model: String,
    /// Bearer token; calls fail with a provider error when absent.
    pub api_key: Option<String>,
    /// Per-request timeout. Exceeding it is a retryable failure.
    pub timeout: Duration,
    pub temperature: f32,
}

impl ProviderConfig {
    pub const DEFAULT_API_BASE: &str = "https://openrouter.ai/api/v1";
    pub const DEFAULT_MODEL: &str = "deepseek/deepseek-chat-v3-0324:free";
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base: Self::DEFAULT_API_BASE.to_string(),
            model: Self::DEFAULT_MODEL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(120),
            temperature: 0.7,
        }
    }
}
