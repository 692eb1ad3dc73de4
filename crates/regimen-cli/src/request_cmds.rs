//! `regimen request` subcommands.
//!
//! `create` and `resume` generate the next week immediately in this
//! process; later weeks are picked up by the trigger.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::PgPool;

use regimen_core::request::{self, SubmitRequest};
use regimen_core::worker::InlineDispatcher;
use regimen_db::models::PlanRequest;
use regimen_db::queries::{plan_requests, weekly_plans};

use crate::RequestCommands;
use crate::config::RegimenConfig;
use crate::resolve::{parse_id, resolve_user};
use crate::run_cmds::build_provider;

/// Dispatch a `RequestCommands` variant to the appropriate handler.
pub async fn run_request_command(
    command: RequestCommands,
    pool: &PgPool,
    config: &RegimenConfig,
) -> Result<()> {
    match command {
        RequestCommands::Create {
            user,
            weeks,
            days,
            fitness_level,
            goal,
            focus,
        } => {
            let user_id = resolve_user(pool, &user).await?;
            let input = SubmitRequest {
                user_id,
                duration_weeks: weeks,
                days_per_week: days,
                fitness_level,
                primary_goal: goal,
                focus_areas: focus,
            };
            cmd_create(pool, config, input).await
        }
        RequestCommands::Show { request_id } => cmd_show(pool, &request_id).await,
        RequestCommands::List { user, page } => cmd_list(pool, &user, page).await,
        RequestCommands::Cancel { request_id } => cmd_cancel(pool, &request_id).await,
        RequestCommands::Resume { request_id } => cmd_resume(pool, config, &request_id).await,
    }
}

async fn cmd_create(pool: &PgPool, config: &RegimenConfig, input: SubmitRequest) -> Result<()> {
    let today = Utc::now().date_naive();
    let dispatcher = InlineDispatcher::new(pool.clone(), build_provider(config)?).on(today);

    let req = request::submit_request(pool, &dispatcher, &config.workflow, input, today).await?;

    println!("Request created: {}", req.id);
    print_summary(&req);
    if let Some(err) = &req.error_message {
        println!();
        println!("Week 1 failed: {err}");
        println!("Retry with: regimen request resume {}", req.id);
    }
    Ok(())
}

async fn cmd_show(pool: &PgPool, id_str: &str) -> Result<()> {
    let id = parse_id(id_str, "request")?;
    let req = plan_requests::get_request(pool, id)
        .await?
        .with_context(|| format!("plan request {id} not found"))?;

    println!("Request: {}", req.id);
    println!("User: {}", req.user_id);
    println!("Submitted: {}", req.requested_at.format("%Y-%m-%d %H:%M:%S UTC"));
    print_summary(&req);
    if let Some(focus) = &req.focus_areas {
        println!("Focus: {focus}");
    }
    if let Some(err) = &req.error_message {
        println!("Error: {err}");
    }

    let plans = weekly_plans::list_plans_for_request(pool, id).await?;
    println!();
    if plans.is_empty() {
        println!("No weeks generated yet.");
        return Ok(());
    }
    println!("{:<6} {:<12} {:<10} {:<38}", "WEEK", "ACTIVE", "STATE", "PLAN ID");
    println!("{}", "-".repeat(68));
    for plan in &plans {
        println!(
            "{:<6} {:<12} {:<10} {:<38}",
            plan.week_number, plan.active_date, plan.visibility, plan.id
        );
    }
    Ok(())
}

async fn cmd_list(pool: &PgPool, user: &str, page: u32) -> Result<()> {
    let user_id = resolve_user(pool, user).await?;
    let requests = request::list_requests(pool, user_id, page).await?;

    if requests.is_empty() {
        println!("No plan requests found.");
        return Ok(());
    }

    println!(
        "{:<38} {:<12} {:>6} {:>5} {:<18} {:<12}",
        "ID", "SUBMITTED", "WEEKS", "DAYS", "STATUS", "NEXT DUE"
    );
    println!("{}", "-".repeat(96));
    for req in &requests {
        println!(
            "{:<38} {:<12} {:>6} {:>5} {:<18} {:<12}",
            req.id,
            req.submitted_on(),
            progress(req),
            req.days_per_week,
            req.status,
            req.next_generation_due
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string()),
        );
    }
    Ok(())
}

async fn cmd_cancel(pool: &PgPool, id_str: &str) -> Result<()> {
    let id = parse_id(id_str, "request")?;
    let req = request::cancel_request(pool, id).await?;
    println!("Request {} cancelled.", req.id);
    Ok(())
}

async fn cmd_resume(pool: &PgPool, config: &RegimenConfig, id_str: &str) -> Result<()> {
    let id = parse_id(id_str, "request")?;
    let today = Utc::now().date_naive();
    let dispatcher = InlineDispatcher::new(pool.clone(), build_provider(config)?).on(today);

    let req = request::resume_request(pool, &dispatcher, &config.workflow, id, today).await?;

    println!("Request {} resumed.", req.id);
    print_summary(&req);
    if let Some(err) = &req.error_message {
        println!("Error: {err}");
    }
    Ok(())
}

fn print_summary(req: &PlanRequest) {
    println!("Status: {}", req.status);
    println!("Weeks: {}", progress(req));
    println!("Days per week: {}", req.days_per_week);
    if let Some(level) = &req.fitness_level {
        println!("Fitness level: {level}");
    }
    if let Some(goal) = &req.primary_goal {
        println!("Goal: {goal}");
    }
    if let Some(due) = req.next_generation_due {
        println!("Next week due: {due}");
    }
}

/// "current/total", with `-` before any week has started.
fn progress(req: &PlanRequest) -> String {
    match req.current_week {
        Some(week) => format!("{week}/{}", req.duration_weeks),
        None => format!("-/{}", req.duration_weeks),
    }
}
