//! Worker pool: asynchronous execution of generation tasks with retries.
//!
//! Jobs arrive over an mpsc channel and each runs on its own tokio task,
//! bounded by a semaphore. A retryable failure re-enqueues the job after a
//! fixed delay from a spawned timer until the attempt budget is spent.
//! Callers only enqueue; they never wait for a generation to finish.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::PgPool;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use regimen_db::queries::plan_requests::{self, InterruptedWeek};

use crate::config::WorkflowConfig;
use crate::generation::{GenerationError, GenerationOutcome, GenerationTask};
use crate::provider::ContentProvider;

/// How long shutdown waits for in-flight generations.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

const QUEUE_CAPACITY: usize = 256;

/// Hands a (request, week) pair to whatever executes generation tasks.
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn dispatch(&self, request_id: Uuid, week: i32) -> Result<()>;
}

// Compile-time assertion: Dispatch must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn Dispatch) {}
};

/// One queued generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationJob {
    pub request_id: Uuid,
    pub week: i32,
    /// 1-based.
    pub attempt: u32,
}

impl GenerationJob {
    pub fn first(request_id: Uuid, week: i32) -> Self {
        Self {
            request_id,
            week,
            attempt: 1,
        }
    }

    fn next_attempt(self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self
        }
    }
}

/// Message sent from spawned jobs back to the pool loop.
struct JobDone {
    job: GenerationJob,
    result: Result<GenerationOutcome, GenerationError>,
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

/// Enqueues jobs on a running [`WorkerPool`]. Cheap to clone.
#[derive(Clone)]
pub struct WorkerHandle {
    jobs: mpsc::Sender<GenerationJob>,
}

#[async_trait]
impl Dispatch for WorkerHandle {
    async fn dispatch(&self, request_id: Uuid, week: i32) -> Result<()> {
        self.jobs
            .send(GenerationJob::first(request_id, week))
            .await
            .context("worker pool is not running")?;
        tracing::debug!(request_id = %request_id, week, "generation job queued");
        Ok(())
    }
}

pub struct WorkerPool {
    handle: WorkerHandle,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl WorkerPool {
    /// Spawn the pool loop. It runs until `cancel` fires.
    pub fn start(
        pool: PgPool,
        provider: Arc<dyn ContentProvider>,
        config: &WorkflowConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (jobs_tx, jobs_rx) = mpsc::channel(QUEUE_CAPACITY);
        let task = GenerationTask::new(pool, provider);
        let join = tokio::spawn(run_pool(
            task,
            config.clone(),
            jobs_rx,
            jobs_tx.clone(),
            cancel.clone(),
        ));
        Self {
            handle: WorkerHandle { jobs: jobs_tx },
            cancel,
            join,
        }
    }

    pub fn handle(&self) -> WorkerHandle {
        self.handle.clone()
    }

    /// Stop accepting work and wait (bounded) for in-flight jobs.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.join.await {
            tracing::error!(error = %e, "worker pool loop panicked");
        }
    }
}

async fn run_pool(
    task: GenerationTask,
    config: WorkflowConfig,
    mut jobs: mpsc::Receiver<GenerationJob>,
    requeue: mpsc::Sender<GenerationJob>,
    cancel: CancellationToken,
) {
    let max_workers = config.max_workers.max(1);
    let semaphore = Arc::new(Semaphore::new(max_workers));
    let (done_tx, mut done_rx) = mpsc::channel::<JobDone>(max_workers * 2);
    let mut in_flight: usize = 0;

    tracing::info!(max_workers, "worker pool started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            Some(done) = done_rx.recv(), if in_flight > 0 => {
                in_flight -= 1;
                handle_done(done, &config, &requeue, &cancel);
            }
            job = jobs.recv() => {
                let Some(job) = job else { break };

                let permit = tokio::select! {
                    permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                    _ = cancel.cancelled() => break,
                };

                in_flight += 1;
                let task = task.clone();
                let done_tx = done_tx.clone();
                tokio::spawn(async move {
                    tracing::info!(
                        request_id = %job.request_id,
                        week = job.week,
                        attempt = job.attempt,
                        "running generation job"
                    );
                    let result = task.run(job.request_id, job.week).await;
                    drop(permit);
                    let _ = done_tx.send(JobDone { job, result }).await;
                });
            }
        }
    }

    tracing::info!(in_flight, "worker pool stopping, draining in-flight jobs");
    let deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
    while in_flight > 0 {
        match tokio::time::timeout_at(deadline, done_rx.recv()).await {
            Ok(Some(done)) => {
                in_flight -= 1;
                handle_done(done, &config, &requeue, &cancel);
            }
            _ => break,
        }
    }
    if in_flight > 0 {
        tracing::warn!(
            remaining = in_flight,
            "drain timeout expired, generation jobs still in flight"
        );
    }
}

/// Log a finished job and schedule its retry when eligible.
fn handle_done(
    done: JobDone,
    config: &WorkflowConfig,
    requeue: &mpsc::Sender<GenerationJob>,
    cancel: &CancellationToken,
) {
    let JobDone { job, result } = done;
    match result {
        Ok(outcome) => {
            tracing::debug!(
                request_id = %job.request_id,
                week = job.week,
                outcome = ?outcome,
                "generation job finished"
            );
        }
        Err(error) if error.is_retryable() && job.attempt < config.retry_attempts => {
            tracing::warn!(
                request_id = %job.request_id,
                week = job.week,
                attempt = job.attempt,
                max_attempts = config.retry_attempts,
                delay_secs = config.retry_delay.as_secs(),
                error = %error,
                "generation failed, retry scheduled"
            );
            schedule_retry(job.next_attempt(), config.retry_delay, requeue.clone(), cancel.clone());
        }
        Err(error) if error.is_retryable() => {
            tracing::error!(
                request_id = %job.request_id,
                week = job.week,
                attempts = job.attempt,
                error = %error,
                "generation failed, retries exhausted"
            );
        }
        Err(error) => {
            tracing::error!(
                request_id = %job.request_id,
                week = job.week,
                error = %error,
                "generation failed permanently"
            );
        }
    }
}

fn schedule_retry(
    job: GenerationJob,
    delay: Duration,
    requeue: mpsc::Sender<GenerationJob>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                if requeue.send(job).await.is_err() {
                    tracing::warn!(
                        request_id = %job.request_id,
                        week = job.week,
                        "worker pool stopped before retry could be queued"
                    );
                }
            }
            _ = cancel.cancelled() => {}
        }
    });
}

// ---------------------------------------------------------------------------
// Inline execution
// ---------------------------------------------------------------------------

/// Runs the task immediately on the caller's task, once, without retries.
#[derive(Clone)]
pub struct InlineDispatcher {
    task: GenerationTask,
    today: Option<NaiveDate>,
}

impl InlineDispatcher {
    pub fn new(pool: PgPool, provider: Arc<dyn ContentProvider>) -> Self {
        Self {
            task: GenerationTask::new(pool, provider),
            today: None,
        }
    }

    /// Generate as of `today` instead of the current UTC date.
    pub fn on(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn task(&self) -> &GenerationTask {
        &self.task
    }
}

#[async_trait]
impl Dispatch for InlineDispatcher {
    /// Failures are recorded on the request, not returned.
    async fn dispatch(&self, request_id: Uuid, week: i32) -> Result<()> {
        let today = self.today.unwrap_or_else(|| Utc::now().date_naive());
        match self.task.run_on(request_id, week, today).await {
            Ok(outcome) => {
                tracing::debug!(request_id = %request_id, week, outcome = ?outcome, "inline generation finished");
            }
            Err(error) => {
                tracing::warn!(request_id = %request_id, week, error = %error, "inline generation failed");
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Restart recovery
// ---------------------------------------------------------------------------

/// Fail every request left mid-generation by a previous process and
/// dispatch its week again.
pub async fn recover_interrupted(
    pool: &PgPool,
    dispatcher: &dyn Dispatch,
) -> Result<Vec<InterruptedWeek>> {
    let interrupted = plan_requests::reset_interrupted(pool).await?;
    for stuck in &interrupted {
        tracing::warn!(
            request_id = %stuck.request_id,
            week = stuck.week_number,
            "reset interrupted generation to failed, re-dispatching"
        );
        dispatcher
            .dispatch(stuck.request_id, stuck.week_number)
            .await?;
    }
    Ok(interrupted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempts_count_from_one() {
        let job = GenerationJob::first(Uuid::nil(), 2);
        assert_eq!(job.attempt, 1);
        let retry = job.next_attempt();
        assert_eq!(retry.attempt, 2);
        assert_eq!(retry.week, 2);
    }
}
