//! `regimen log` subcommands.

use anyhow::{Context, Result, bail};
use chrono::Utc;
use sqlx::PgPool;

use regimen_core::exercise_log::{self, NewExerciseLog};
use regimen_db::models::{ExerciseLog, SetEntry};

use crate::LogCommands;
use crate::resolve::{parse_date, parse_id, resolve_user};

/// Dispatch a `LogCommands` variant to the appropriate handler.
pub async fn run_log_command(command: LogCommands, pool: &PgPool) -> Result<()> {
    match command {
        LogCommands::Add {
            user,
            exercise,
            name,
            sets,
            date,
            day,
            notes,
        } => {
            let user_id = resolve_user(pool, &user).await?;
            let input = NewExerciseLog {
                planned_exercise_id: exercise
                    .as_deref()
                    .map(|e| parse_id(e, "exercise"))
                    .transpose()?,
                exercise_name: name,
                sets: parse_sets(&sets)?,
                log_date: date.as_deref().map(parse_date).transpose()?,
                completed_day_id: day.as_deref().map(|d| parse_id(d, "day")).transpose()?,
                notes,
            };
            let log =
                exercise_log::log_exercise(pool, user_id, input, Utc::now().date_naive()).await?;
            println!("Logged {} on {}.", log.exercise_name, log.log_date);
            println!(
                "  {} set(s), {} rep(s) total",
                log.total_sets_done(),
                log.total_reps_done()
            );
            println!("  Log ID: {}", log.id);
            Ok(())
        }
        LogCommands::List {
            user,
            from,
            to,
            page,
        } => {
            let user_id = resolve_user(pool, &user).await?;
            let from = from.as_deref().map(parse_date).transpose()?;
            let to = to.as_deref().map(parse_date).transpose()?;
            let logs = exercise_log::list_logs(pool, user_id, from, to, page).await?;
            print_logs(&logs);
            Ok(())
        }
    }
}

/// Parse `--set` values: `REPS` or `REPSxWEIGHT`, numbered in order.
fn parse_sets(values: &[String]) -> Result<Vec<SetEntry>> {
    values
        .iter()
        .enumerate()
        .map(|(i, raw)| {
            let text = raw.trim().to_ascii_lowercase();
            let (reps, weight) = match text.split_once('x') {
                Some((reps, weight)) => (reps.trim(), Some(weight.trim())),
                None => (text.as_str(), None),
            };
            let reps: i32 = reps
                .parse()
                .with_context(|| format!("set {}: invalid reps in {raw:?}", i + 1))?;
            let weight: f64 = match weight {
                Some(w) => w
                    .parse()
                    .with_context(|| format!("set {}: invalid weight in {raw:?}", i + 1))?,
                None => 0.0,
            };
            let Ok(set_number) = i32::try_from(i + 1) else {
                bail!("too many sets");
            };
            Ok(SetEntry {
                set_number,
                reps,
                weight,
            })
        })
        .collect()
}

fn print_logs(logs: &[ExerciseLog]) {
    if logs.is_empty() {
        println!("No exercise logs found.");
        return;
    }

    println!(
        "{:<12} {:<30} {:>5} {:>6}  {}",
        "DATE", "EXERCISE", "SETS", "REPS", "DETAIL"
    );
    println!("{}", "-".repeat(80));
    for log in logs {
        let name = if log.exercise_name.len() > 28 {
            format!("{}...", log.exercise_name.chars().take(25).collect::<String>())
        } else {
            log.exercise_name.clone()
        };
        let detail: Vec<String> = log
            .sets
            .iter()
            .map(|s| {
                if s.weight > 0.0 {
                    format!("{}x{}", s.reps, s.weight)
                } else {
                    s.reps.to_string()
                }
            })
            .collect();
        println!(
            "{:<12} {:<30} {:>5} {:>6}  {}",
            log.log_date,
            name,
            log.total_sets_done(),
            log.total_reps_done(),
            detail.join(" ")
        );
    }
}
