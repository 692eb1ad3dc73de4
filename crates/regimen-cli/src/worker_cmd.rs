//! `regimen worker`: long-running process that owns the worker pool and
//! the cron jobs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, anyhow};
use chrono::Utc;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use regimen_core::scheduler::{rotate_visibility, run_due_week_trigger, start_cron_jobs};
use regimen_core::worker::{WorkerPool, recover_interrupted};

use crate::config::RegimenConfig;
use crate::run_cmds::build_provider;

/// Run until Ctrl+C.
pub async fn run_worker(pool: &PgPool, config: RegimenConfig, run_now: bool) -> Result<()> {
    let workflow = config.workflow.clone();
    let provider = build_provider(&config)?;

    println!("Starting regimen worker");
    println!("  Database: {}", config.db_config.redacted_url());
    println!("  Model: {}", config.provider.model);
    println!("  Max workers: {}", workflow.max_workers);
    println!("  Trigger schedule: {} (UTC)", workflow.trigger_schedule);
    println!("  Rotator schedule: {} (UTC)", workflow.rotator_schedule);

    // First signal cancels, second force-exits.
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    let got_first_signal = Arc::new(AtomicBool::new(false));
    let got_first_clone = Arc::clone(&got_first_signal);

    tokio::spawn(async move {
        loop {
            tokio::signal::ctrl_c().await.ok();
            if got_first_clone.swap(true, Ordering::SeqCst) {
                eprintln!("\nForce exit.");
                std::process::exit(130);
            }
            eprintln!("\nShutting down gracefully (Ctrl+C again to force)...");
            cancel_clone.cancel();
        }
    });

    let workers = WorkerPool::start(pool.clone(), provider, &workflow, cancel.clone());
    let handle = workers.handle();

    let recovered = recover_interrupted(pool, &handle).await?;
    if !recovered.is_empty() {
        println!("Re-dispatched {} interrupted generation(s).", recovered.len());
    }

    if run_now {
        let today = Utc::now().date_naive();
        let triggered = run_due_week_trigger(pool, &handle, &workflow, today).await?;
        let rotated = rotate_visibility(pool, &workflow, today).await?;
        println!(
            "Startup run: {} week(s) dispatched, {} activated, {} archived.",
            triggered.dispatched,
            rotated.activated.len(),
            rotated.archived.len()
        );
    }

    let mut scheduler = start_cron_jobs(pool.clone(), Arc::new(handle), workflow).await?;
    println!("Worker running. Press Ctrl+C to stop.");

    cancel.cancelled().await;

    scheduler
        .shutdown()
        .await
        .map_err(|e| anyhow!("failed to stop job scheduler: {e}"))?;
    workers.shutdown().await;

    println!("Worker stopped.");
    Ok(())
}
