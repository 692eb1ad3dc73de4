//! Integration tests for the worker pool and restart recovery.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use regimen_core::config::WorkflowConfig;
use regimen_core::worker::{Dispatch, WorkerPool, recover_interrupted};
use regimen_db::models::RequestStatus;
use regimen_db::queries::plan_requests;
use regimen_test_utils::{create_test_db, create_test_user, drop_test_db};

use common::{ScriptedProvider, Step, insert_request, plan_count, reload, wait_until, week_json};

const WAIT: Duration = Duration::from_secs(15);

fn fast_config() -> WorkflowConfig {
    WorkflowConfig {
        retry_attempts: 3,
        retry_delay: Duration::from_millis(50),
        max_workers: 2,
        ..WorkflowConfig::default()
    }
}

async fn wait_for_status(
    pool: &sqlx::PgPool,
    id: uuid::Uuid,
    status: RequestStatus,
) -> bool {
    wait_until(WAIT, move || async move { reload(pool, id).await.status == status }).await
}

#[tokio::test(flavor = "multi_thread")]
async fn queued_job_generates_the_week() {
    let (pool, db_name) = create_test_db().await;
    let (user, _) = create_test_user(&pool).await;
    let provider = Arc::new(ScriptedProvider::valid(4));
    let workers = WorkerPool::start(
        pool.clone(),
        provider.clone(),
        &fast_config(),
        CancellationToken::new(),
    );

    let first = insert_request(&pool, user.id, 2, 4).await;
    let second = insert_request(&pool, user.id, 1, 4).await;
    let handle = workers.handle();
    handle.dispatch(first.id, 1).await.unwrap();
    handle.dispatch(second.id, 1).await.unwrap();

    assert!(wait_for_status(&pool, first.id, RequestStatus::CompletedWeek).await);
    assert!(wait_for_status(&pool, second.id, RequestStatus::AllWeeksCompleted).await);
    assert_eq!(plan_count(&pool, first.id).await, 1);
    assert_eq!(plan_count(&pool, second.id).await, 1);
    assert_eq!(provider.calls(), 2);

    workers.shutdown().await;
    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn transient_failures_are_retried() {
    let (pool, db_name) = create_test_db().await;
    let (user, _) = create_test_user(&pool).await;
    let provider = Arc::new(ScriptedProvider::scripted(
        vec![Step::Timeout, Step::RateLimited],
        Step::Reply(week_json(3)),
    ));
    let workers = WorkerPool::start(
        pool.clone(),
        provider.clone(),
        &fast_config(),
        CancellationToken::new(),
    );

    let request = insert_request(&pool, user.id, 2, 3).await;
    workers.handle().dispatch(request.id, 1).await.unwrap();

    assert!(wait_for_status(&pool, request.id, RequestStatus::CompletedWeek).await);
    assert_eq!(provider.calls(), 3);
    let request = reload(&pool, request.id).await;
    assert_eq!(request.error_message, None);
    assert_eq!(request.current_week, None);
    assert_eq!(plan_count(&pool, request.id).await, 1);

    workers.shutdown().await;
    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn retries_stop_at_the_attempt_budget() {
    let (pool, db_name) = create_test_db().await;
    let (user, _) = create_test_user(&pool).await;
    let provider = Arc::new(ScriptedProvider::always(Step::Timeout));
    let workers = WorkerPool::start(
        pool.clone(),
        provider.clone(),
        &fast_config(),
        CancellationToken::new(),
    );

    let request = insert_request(&pool, user.id, 2, 3).await;
    workers.handle().dispatch(request.id, 1).await.unwrap();

    let exhausted = wait_until(WAIT, || {
        let provider = Arc::clone(&provider);
        async move { provider.calls() >= 3 }
    })
    .await;
    assert!(exhausted);
    assert!(wait_for_status(&pool, request.id, RequestStatus::FailedGeneration).await);

    // Well past another retry delay.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(provider.calls(), 3);
    let request = reload(&pool, request.id).await;
    assert_eq!(request.status, RequestStatus::FailedGeneration);
    assert!(
        request
            .error_message
            .unwrap()
            .starts_with("Unexpected system error processing week 1")
    );

    workers.shutdown().await;
    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn permanent_failures_are_not_retried() {
    let (pool, db_name) = create_test_db().await;
    let (user, _) = create_test_user(&pool).await;
    let provider = Arc::new(ScriptedProvider::always(Step::Empty));
    let workers = WorkerPool::start(
        pool.clone(),
        provider.clone(),
        &fast_config(),
        CancellationToken::new(),
    );

    let request = insert_request(&pool, user.id, 2, 3).await;
    workers.handle().dispatch(request.id, 1).await.unwrap();

    assert!(wait_for_status(&pool, request.id, RequestStatus::FailedGeneration).await);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(provider.calls(), 1);

    workers.shutdown().await;
    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn stopped_pool_refuses_jobs() {
    let (pool, db_name) = create_test_db().await;
    let provider = Arc::new(ScriptedProvider::valid(3));
    let workers = WorkerPool::start(
        pool.clone(),
        provider.clone(),
        &fast_config(),
        CancellationToken::new(),
    );
    let handle = workers.handle();
    workers.shutdown().await;

    // The receiver is gone once the loop exits.
    assert!(handle.dispatch(uuid::Uuid::new_v4(), 1).await.is_err());
    assert_eq!(provider.calls(), 0);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn interrupted_generation_is_recovered() {
    let (pool, db_name) = create_test_db().await;
    let (user, _) = create_test_user(&pool).await;

    let request = insert_request(&pool, user.id, 2, 3).await;
    // A previous process claimed the week and died.
    plan_requests::start_week(&pool, request.id, 1).await.unwrap().unwrap();

    let provider = Arc::new(ScriptedProvider::valid(3));
    let workers = WorkerPool::start(
        pool.clone(),
        provider.clone(),
        &fast_config(),
        CancellationToken::new(),
    );
    let handle = workers.handle();

    let recovered = recover_interrupted(&pool, &handle).await.unwrap();
    assert_eq!(recovered.len(), 1);
    assert_eq!(recovered[0].request_id, request.id);
    assert_eq!(recovered[0].week_number, 1);

    assert!(wait_for_status(&pool, request.id, RequestStatus::CompletedWeek).await);
    assert_eq!(plan_count(&pool, request.id).await, 1);

    // Nothing left to recover.
    assert!(recover_interrupted(&pool, &handle).await.unwrap().is_empty());

    workers.shutdown().await;
    pool.close().await;
    drop_test_db(&db_name).await;
}
