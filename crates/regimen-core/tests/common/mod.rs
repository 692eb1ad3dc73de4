//! Shared helpers for regimen-core integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use regimen_core::plan::GenerationContext;
use regimen_core::provider::{ContentProvider, ProviderError, ProviderResponse};
use regimen_core::worker::Dispatch;
use regimen_db::models::PlanRequest;
use regimen_db::queries::plan_requests::{self, NewPlanRequest};

// ---------------------------------------------------------------------------
// Scripted provider
// ---------------------------------------------------------------------------

/// One scripted provider answer.
#[derive(Debug, Clone)]
pub enum Step {
    Reply(String),
    RateLimited,
    Timeout,
    Fail(String),
    Empty,
}

/// In-process provider that plays back a script, then repeats a fallback.
pub struct ScriptedProvider {
    steps: Mutex<VecDeque<Step>>,
    fallback: Step,
    calls: AtomicUsize,
    weeks: Mutex<Vec<i32>>,
}

impl ScriptedProvider {
    pub fn scripted(steps: Vec<Step>, fallback: Step) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            fallback,
            calls: AtomicUsize::new(0),
            weeks: Mutex::new(Vec::new()),
        }
    }

    /// Always answers with a valid week of `workout_days` training days.
    pub fn valid(workout_days: usize) -> Self {
        Self::scripted(vec![], Step::Reply(week_json(workout_days)))
    }

    pub fn always(step: Step) -> Self {
        Self::scripted(vec![], step)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Week numbers requested, in call order.
    pub fn weeks_requested(&self) -> Vec<i32> {
        self.weeks.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        context: &GenerationContext,
    ) -> Result<ProviderResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.weeks.lock().unwrap().push(context.week_number);

        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match step {
            Step::Reply(text) => Ok(ProviderResponse {
                raw: json!({ "choices": [{ "message": { "content": text } }] }),
                text,
            }),
            Step::RateLimited => Err(ProviderError::RateLimited("slow down".into())),
            Step::Timeout => Err(ProviderError::Timeout(Duration::from_secs(120))),
            Step::Fail(message) => Err(ProviderError::Provider(message)),
            Step::Empty => Err(ProviderError::EmptyResponse),
        }
    }
}

// ---------------------------------------------------------------------------
// Recording dispatcher
// ---------------------------------------------------------------------------

/// Remembers every dispatch instead of running it; optionally refuses.
#[derive(Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<(Uuid, i32)>>,
    refuse: bool,
}

impl RecordingDispatcher {
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(Uuid, i32)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Dispatch for RecordingDispatcher {
    async fn dispatch(&self, request_id: Uuid, week: i32) -> anyhow::Result<()> {
        if self.refuse {
            anyhow::bail!("queue unavailable");
        }
        self.sent.lock().unwrap().push((request_id, week));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Provider payloads
// ---------------------------------------------------------------------------

/// A 7-day week with `workout_days` training days (two exercises each)
/// followed by rest days, wrapped in prose and a code fence.
pub fn week_json(workout_days: usize) -> String {
    let days: Vec<serde_json::Value> = (1..=7)
        .map(|n| {
            if n <= workout_days {
                json!({
                    "day_number": n,
                    "day_title": format!("Training Day {n}"),
                    "is_rest_day": false,
                    "notes": "Warm up first.",
                    "exercises": [
                        {
                            "name": "Goblet Squat",
                            "description": "Chest up.",
                            "target_sets": "3",
                            "target_reps": "8-12",
                            "target_rest_seconds": 90,
                            "target_weight_or_intensity": "RPE 7",
                            "order": 1
                        },
                        {
                            "name": "Push-up",
                            "target_sets": 3,
                            "target_reps": "AMRAP",
                            "order": 2
                        }
                    ]
                })
            } else {
                json!({
                    "day_number": n,
                    "day_title": "Rest Day",
                    "is_rest_day": true,
                    "exercises": []
                })
            }
        })
        .collect();

    let body = json!({
        "weekly_plan": {
            "weekly_theme": "Foundations",
            "days": days
        }
    });
    format!("Here is your plan:\n```json\n{body:#}\n```\nEnjoy!")
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Insert a pending request due today.
pub async fn insert_request(
    pool: &PgPool,
    user_id: Uuid,
    duration_weeks: i32,
    days_per_week: i32,
) -> PlanRequest {
    plan_requests::insert_request(
        pool,
        &NewPlanRequest {
            user_id,
            duration_weeks,
            days_per_week,
            fitness_level: Some("beginner".into()),
            primary_goal: Some("general fitness".into()),
            focus_areas: None,
            next_generation_due: today(),
        },
    )
    .await
    .expect("insert request")
}

pub async fn reload(pool: &PgPool, id: Uuid) -> PlanRequest {
    plan_requests::get_request(pool, id)
        .await
        .unwrap()
        .expect("request exists")
}

pub async fn count(pool: &PgPool, sql: &str, request_id: Uuid) -> i64 {
    sqlx::query_scalar(sql)
        .bind(request_id)
        .fetch_one(pool)
        .await
        .expect("count query")
}

pub async fn plan_count(pool: &PgPool, request_id: Uuid) -> i64 {
    count(
        pool,
        "SELECT COUNT(*) FROM weekly_plans WHERE request_id = $1",
        request_id,
    )
    .await
}

pub async fn day_count(pool: &PgPool, request_id: Uuid) -> i64 {
    count(
        pool,
        "SELECT COUNT(*) FROM planned_days d \
         JOIN weekly_plans p ON p.id = d.plan_id WHERE p.request_id = $1",
        request_id,
    )
    .await
}

pub async fn exercise_count(pool: &PgPool, request_id: Uuid) -> i64 {
    count(
        pool,
        "SELECT COUNT(*) FROM planned_exercises e \
         JOIN planned_days d ON d.id = e.day_id \
         JOIN weekly_plans p ON p.id = d.plan_id WHERE p.request_id = $1",
        request_id,
    )
    .await
}

/// Poll `check` until it holds or `timeout` expires.
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}
