//! One-shot workflow commands: `regimen generate`, `regimen trigger` and
//! `regimen rotate`.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use sqlx::PgPool;

use regimen_core::generation::{GenerationOutcome, GenerationTask};
use regimen_core::provider::{ContentProvider, OpenRouterProvider};
use regimen_core::scheduler::{rotate_visibility, run_due_week_trigger};
use regimen_core::worker::InlineDispatcher;

use crate::config::{ENV_API_KEY, RegimenConfig};
use crate::resolve::{parse_date, parse_id};

/// Build the HTTP provider from resolved configuration.
pub fn build_provider(config: &RegimenConfig) -> Result<Arc<dyn ContentProvider>> {
    if config.provider.api_key.is_none() {
        tracing::warn!(
            "no provider API key configured; set {ENV_API_KEY} or provider.api_key in the config file"
        );
    }
    let provider = OpenRouterProvider::new(config.provider.clone())
        .context("failed to set up content provider")?;
    tracing::debug!(model = provider.model(), "content provider ready");
    Ok(Arc::new(provider))
}

/// `--date` when given, otherwise today (UTC).
pub fn today_or(date: Option<&str>) -> Result<NaiveDate> {
    match date {
        Some(d) => parse_date(d),
        None => Ok(Utc::now().date_naive()),
    }
}

/// Generate one week in-process, without retries.
pub async fn run_generate(
    pool: &PgPool,
    config: &RegimenConfig,
    request_id: &str,
    week: i32,
) -> Result<()> {
    let request_id = parse_id(request_id, "request")?;
    let task = GenerationTask::new(pool.clone(), build_provider(config)?);

    println!("Generating week {week} of request {request_id}...");
    match task.run(request_id, week).await {
        Ok(GenerationOutcome::Generated { week: stored, status }) => {
            println!("Week {week} generated.");
            println!("  Plan ID:     {}", stored.plan_id);
            println!("  Active date: {}", stored.active_date);
            println!("  Visibility:  {}", stored.visibility);
            println!("  Days:        {}", stored.days);
            println!("  Exercises:   {}", stored.exercises);
            println!("Request status: {status}");
        }
        Ok(GenerationOutcome::AlreadyGenerated { plan_id, status }) => {
            println!("Week {week} already exists as plan {plan_id}; nothing generated.");
            println!("Request status: {status}");
        }
        Ok(GenerationOutcome::Skipped(status)) => {
            println!("Request is {status}; nothing generated.");
        }
        Err(e) => {
            let hint = if e.is_retryable() {
                "retryable"
            } else {
                "not retryable"
            };
            anyhow::bail!("generation of week {week} failed ({hint}): {e}");
        }
    }
    Ok(())
}

/// Run the due-week trigger once, generating due weeks in-process.
pub async fn run_trigger(pool: &PgPool, config: &RegimenConfig, date: Option<&str>) -> Result<()> {
    let today = today_or(date)?;
    let dispatcher = InlineDispatcher::new(pool.clone(), build_provider(config)?).on(today);

    let summary = run_due_week_trigger(pool, &dispatcher, &config.workflow, today).await?;

    println!("Trigger run for {today}:");
    println!("  Due:        {}", summary.due);
    println!("  Dispatched: {}", summary.dispatched);
    println!("  Reconciled: {}", summary.reconciled);
    println!("  Completed:  {}", summary.completed);
    if summary.errors > 0 {
        println!("  Errors:     {} (see log)", summary.errors);
    }
    Ok(())
}

/// Run the visibility rotator once.
pub async fn run_rotate(pool: &PgPool, config: &RegimenConfig, date: Option<&str>) -> Result<()> {
    let today = today_or(date)?;
    let summary = rotate_visibility(pool, &config.workflow, today).await?;

    if summary.is_empty() {
        println!("Nothing to rotate on {today}.");
        return Ok(());
    }
    println!("Rotation for {today}:");
    println!("  Activated: {}", summary.activated.len());
    for id in &summary.activated {
        println!("    + {id}");
    }
    println!("  Archived:  {}", summary.archived.len());
    for id in &summary.archived {
        println!("    - {id}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_date_overrides_today() {
        assert_eq!(
            today_or(Some("2026-01-05")).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 5).unwrap()
        );
        assert_eq!(today_or(None).unwrap(), Utc::now().date_naive());
        assert!(today_or(Some("yesterday")).is_err());
    }
}
