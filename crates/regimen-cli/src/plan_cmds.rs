//! `regimen plan` subcommands: read-only views of generated weeks.
//!
//! Implements:
//! - `regimen plan active --user <user>`   -- the week the user is on now
//! - `regimen plan history --user <user>`  -- every week, newest first
//! - `regimen plan show <plan-id>`         -- days and exercises of one week
//! - `regimen plan audit <plan-id>`        -- prompt and raw provider output

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use regimen_db::models::{PlanDetail, PlannedExercise};
use regimen_db::queries::weekly_plans as plan_queries;

use crate::PlanCommands;
use crate::resolve::{parse_id, resolve_user};

/// Weeks per page in `plan history`.
const HISTORY_PAGE_SIZE: i64 = 10;

// -----------------------------------------------------------------------
// Public entry point
// -----------------------------------------------------------------------

/// Dispatch a `PlanCommands` variant to the appropriate handler.
pub async fn run_plan_command(command: PlanCommands, pool: &PgPool) -> Result<()> {
    match command {
        PlanCommands::Active { user } => cmd_active(pool, &user).await,
        PlanCommands::History { user, page } => cmd_history(pool, &user, page).await,
        PlanCommands::Show { plan_id, json } => {
            let plan_id = parse_id(&plan_id, "plan")?;
            cmd_show(pool, plan_id, json).await
        }
        PlanCommands::Audit { plan_id } => cmd_audit(pool, &plan_id).await,
    }
}

// -----------------------------------------------------------------------
// regimen plan active
// -----------------------------------------------------------------------

async fn cmd_active(pool: &PgPool, user: &str) -> Result<()> {
    let user_id = resolve_user(pool, user).await?;
    let Some(plan) = plan_queries::active_plan_for_user(pool, user_id).await? else {
        println!("No visible week. New weeks appear on their active date.");
        return Ok(());
    };
    cmd_show(pool, plan.id, false).await
}

// -----------------------------------------------------------------------
// regimen plan history
// -----------------------------------------------------------------------

async fn cmd_history(pool: &PgPool, user: &str, page: u32) -> Result<()> {
    let user_id = resolve_user(pool, user).await?;
    let offset = i64::from(page) * HISTORY_PAGE_SIZE;
    let plans = plan_queries::plan_history_for_user(pool, user_id, HISTORY_PAGE_SIZE, offset).await?;

    if plans.is_empty() {
        println!("No weeks found.");
        return Ok(());
    }

    println!(
        "{:<38} {:<38} {:>4}  {:<10}  {:<10}",
        "PLAN ID", "REQUEST ID", "WEEK", "ACTIVE", "STATE"
    );
    println!("{}", "-".repeat(106));
    for plan in &plans {
        println!(
            "{:<38} {:<38} {:>4}  {:<10}  {:<10}",
            plan.id, plan.request_id, plan.week_number, plan.active_date, plan.visibility
        );
    }
    Ok(())
}

// -----------------------------------------------------------------------
// regimen plan show <plan-id>
// -----------------------------------------------------------------------

async fn cmd_show(pool: &PgPool, plan_id: Uuid, json: bool) -> Result<()> {
    let detail = plan_queries::plan_detail(pool, plan_id)
        .await?
        .with_context(|| format!("plan {plan_id} not found"))?;

    if json {
        let out = serde_json::to_string_pretty(&detail).context("failed to serialize plan")?;
        println!("{out}");
        return Ok(());
    }

    print_detail(&detail);
    Ok(())
}

fn print_detail(detail: &PlanDetail) {
    let plan = &detail.plan;
    println!("Week {}: {}", plan.week_number, plan.theme.as_deref().unwrap_or("(untitled)"));
    println!("  Plan ID:     {}", plan.id);
    println!("  Request ID:  {}", plan.request_id);
    println!("  Active from: {}", plan.active_date);
    println!("  State:       {}", plan.visibility);

    for entry in &detail.days {
        let day = &entry.day;
        println!();
        let rest = if day.is_rest_day { " (rest)" } else { "" };
        println!(
            "Day {} - {} - {}{rest}",
            day.day_number,
            day.calendar_date.format("%a %Y-%m-%d"),
            day.title
        );
        if !day.notes.is_empty() {
            println!("  {}", day.notes);
        }
        for exercise in &entry.exercises {
            println!("  {}. {}", exercise.position, format_exercise(exercise));
        }
    }
}

/// "Name: 3 x 8-10, rest 90s, RPE 7"
fn format_exercise(exercise: &PlannedExercise) -> String {
    let mut line = exercise.name.clone();
    let mut parts = Vec::new();
    match (exercise.target_sets.is_empty(), exercise.target_reps.is_empty()) {
        (false, false) => parts.push(format!("{} x {}", exercise.target_sets, exercise.target_reps)),
        (false, true) => parts.push(format!("{} sets", exercise.target_sets)),
        (true, false) => parts.push(format!("{} reps", exercise.target_reps)),
        (true, true) => {}
    }
    if let Some(rest) = exercise.target_rest_seconds {
        parts.push(format!("rest {rest}s"));
    }
    if let Some(intensity) = &exercise.intensity {
        parts.push(intensity.clone());
    }
    if !parts.is_empty() {
        line.push_str(": ");
        line.push_str(&parts.join(", "));
    }
    line
}

// -----------------------------------------------------------------------
// regimen plan audit <plan-id>
// -----------------------------------------------------------------------

async fn cmd_audit(pool: &PgPool, plan_id_str: &str) -> Result<()> {
    let plan_id = parse_id(plan_id_str, "plan")?;
    let audit = plan_queries::get_plan_audit(pool, plan_id)
        .await?
        .with_context(|| format!("plan {plan_id} not found"))?;

    println!("Plan: {} (request {}, week {})", audit.id, audit.request_id, audit.week_number);
    println!("Generated: {}", audit.generated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!();
    println!("--- Prompt ---");
    println!("{}", audit.generation_prompt);
    println!();
    println!("--- Provider response ---");
    match &audit.provider_response {
        Some(value) => println!(
            "{}",
            serde_json::to_string_pretty(value).context("failed to format provider response")?
        ),
        None => println!("(not recorded)"),
    }
    Ok(())
}
