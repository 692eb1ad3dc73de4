//! Integration tests for plan request bookkeeping queries.

use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use regimen_db::models::{PlanRequest, RequestStatus};
use regimen_db::queries::plan_requests::{self as db, NewPlanRequest};
use regimen_test_utils::{create_test_db, create_test_user, drop_test_db};

async fn new_request(pool: &PgPool, user_id: Uuid, weeks: i32) -> PlanRequest {
    db::insert_request(
        pool,
        &NewPlanRequest {
            user_id,
            duration_weeks: weeks,
            days_per_week: 3,
            fitness_level: Some("beginner".into()),
            primary_goal: None,
            focus_areas: Some("core".into()),
            next_generation_due: Utc::now().date_naive(),
        },
    )
    .await
    .expect("insert request")
}

async fn reload(pool: &PgPool, id: Uuid) -> PlanRequest {
    db::get_request(pool, id).await.unwrap().unwrap()
}

#[tokio::test]
async fn new_request_is_pending_and_due_today() {
    let (pool, db_name) = create_test_db().await;
    let (user, _) = create_test_user(&pool).await;

    let request = new_request(&pool, user.id, 4).await;
    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(request.current_week, None);
    assert_eq!(request.next_generation_due, Some(Utc::now().date_naive()));

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn start_week_claims_only_once() {
    let (pool, db_name) = create_test_db().await;
    let (user, _) = create_test_user(&pool).await;
    let request = new_request(&pool, user.id, 2).await;

    let claimed = db::start_week(&pool, request.id, 1).await.unwrap().unwrap();
    assert_eq!(claimed.status, RequestStatus::GeneratingWeek);
    assert_eq!(claimed.current_week, Some(1));

    // A second claim while in flight is refused.
    assert!(db::start_week(&pool, request.id, 1).await.unwrap().is_none());
    assert!(db::start_week(&pool, Uuid::new_v4(), 1).await.unwrap().is_none());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn complete_week_final_clears_due_date() {
    let (pool, db_name) = create_test_db().await;
    let (user, _) = create_test_user(&pool).await;
    let request = new_request(&pool, user.id, 1).await;

    db::start_week(&pool, request.id, 1).await.unwrap().unwrap();
    // Wrong week does not match.
    assert_eq!(db::complete_week(&pool, request.id, 2, true).await.unwrap(), 0);
    assert_eq!(db::complete_week(&pool, request.id, 1, true).await.unwrap(), 1);

    let done = reload(&pool, request.id).await;
    assert_eq!(done.status, RequestStatus::AllWeeksCompleted);
    assert_eq!(done.current_week, None);
    assert_eq!(done.next_generation_due, None);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn fail_week_records_message_and_clears_marker() {
    let (pool, db_name) = create_test_db().await;
    let (user, _) = create_test_user(&pool).await;
    let request = new_request(&pool, user.id, 3).await;

    db::start_week(&pool, request.id, 1).await.unwrap().unwrap();
    assert_eq!(
        db::fail_week(&pool, request.id, 1, "provider timed out").await.unwrap(),
        1
    );

    let failed = reload(&pool, request.id).await;
    assert_eq!(failed.status, RequestStatus::FailedGeneration);
    assert_eq!(failed.error_message.as_deref(), Some("provider timed out"));
    assert_eq!(failed.current_week, None);

    // Retrying clears the previous error.
    let retried = db::start_week(&pool, request.id, 1).await.unwrap().unwrap();
    assert_eq!(retried.error_message, None);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn release_week_only_touches_matching_marker() {
    let (pool, db_name) = create_test_db().await;
    let (user, _) = create_test_user(&pool).await;
    let request = new_request(&pool, user.id, 3).await;

    db::start_week(&pool, request.id, 2).await.unwrap().unwrap();
    assert_eq!(db::release_week(&pool, request.id, 1, "x").await.unwrap(), 0);
    assert_eq!(
        db::release_week(&pool, request.id, 2, "ended without outcome").await.unwrap(),
        1
    );

    let released = reload(&pool, request.id).await;
    assert_eq!(released.status, RequestStatus::FailedGeneration);
    assert_eq!(released.current_week, None);
    assert_eq!(
        released.error_message.as_deref(),
        Some("ended without outcome")
    );

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn due_requests_excludes_unschedulable_states() {
    let (pool, db_name) = create_test_db().await;
    let (user, _) = create_test_user(&pool).await;
    let today = Utc::now().date_naive();

    let pending = new_request(&pool, user.id, 2).await;

    let in_flight = new_request(&pool, user.id, 2).await;
    db::start_week(&pool, in_flight.id, 1).await.unwrap().unwrap();

    let failed = new_request(&pool, user.id, 2).await;
    db::start_week(&pool, failed.id, 1).await.unwrap().unwrap();
    db::fail_week(&pool, failed.id, 1, "boom").await.unwrap();

    let future = new_request(&pool, user.id, 2).await;
    db::set_next_due(&pool, future.id, Some(today + Duration::days(3)))
        .await
        .unwrap();

    let cancelled = new_request(&pool, user.id, 2).await;
    assert_eq!(db::cancel_request(&pool, cancelled.id).await.unwrap(), 1);

    let due = db::due_requests(&pool, today).await.unwrap();
    let ids: Vec<Uuid> = due.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![pending.id]);

    pool.close().await;
    drop_test_db(&db_name).await;
}

const ALL_STATUSES: [RequestStatus; 6] = [
    RequestStatus::Pending,
    RequestStatus::GeneratingWeek,
    RequestStatus::CompletedWeek,
    RequestStatus::AllWeeksCompleted,
    RequestStatus::FailedGeneration,
    RequestStatus::UserCancelled,
];

async fn force_status(pool: &PgPool, id: Uuid, status: RequestStatus) {
    sqlx::query("UPDATE plan_requests SET status = $2 WHERE id = $1")
        .bind(id)
        .bind(status)
        .execute(pool)
        .await
        .unwrap();
}

#[tokio::test]
async fn claim_and_due_queries_agree_with_status_helpers() {
    let (pool, db_name) = create_test_db().await;
    let (user, _) = create_test_user(&pool).await;
    let today = Utc::now().date_naive();

    for status in ALL_STATUSES {
        let due = new_request(&pool, user.id, 4).await;
        force_status(&pool, due.id, status).await;
        let listed = db::due_requests(&pool, today)
            .await
            .unwrap()
            .iter()
            .any(|r| r.id == due.id);
        assert_eq!(listed, status.is_schedulable(), "due_requests for {status}");

        let claimable = new_request(&pool, user.id, 4).await;
        force_status(&pool, claimable.id, status).await;
        let claimed = db::start_week(&pool, claimable.id, 1).await.unwrap().is_some();
        assert_eq!(
            claimed,
            RequestStatus::STARTABLE.contains(&status),
            "start_week for {status}"
        );
    }

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn cancel_refused_while_generating() {
    let (pool, db_name) = create_test_db().await;
    let (user, _) = create_test_user(&pool).await;
    let request = new_request(&pool, user.id, 2).await;

    db::start_week(&pool, request.id, 1).await.unwrap().unwrap();
    assert_eq!(db::cancel_request(&pool, request.id).await.unwrap(), 0);
    assert_eq!(
        reload(&pool, request.id).await.status,
        RequestStatus::GeneratingWeek
    );

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn resume_only_from_failed() {
    let (pool, db_name) = create_test_db().await;
    let (user, _) = create_test_user(&pool).await;
    let today = Utc::now().date_naive();
    let request = new_request(&pool, user.id, 2).await;

    assert_eq!(
        db::resume_request(&pool, request.id, RequestStatus::Pending, today)
            .await
            .unwrap(),
        0
    );

    db::start_week(&pool, request.id, 1).await.unwrap().unwrap();
    db::fail_week(&pool, request.id, 1, "boom").await.unwrap();
    assert_eq!(
        db::resume_request(&pool, request.id, RequestStatus::Pending, today)
            .await
            .unwrap(),
        1
    );

    let resumed = reload(&pool, request.id).await;
    assert_eq!(resumed.status, RequestStatus::Pending);
    assert_eq!(resumed.error_message, None);
    assert_eq!(resumed.next_generation_due, Some(today));

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn leaving_failed_generation_drops_the_error() {
    let (pool, db_name) = create_test_db().await;
    let (user, _) = create_test_user(&pool).await;
    let request = new_request(&pool, user.id, 2).await;

    db::start_week(&pool, request.id, 1).await.unwrap().unwrap();
    db::fail_week(&pool, request.id, 1, "boom").await.unwrap();
    assert_eq!(reload(&pool, request.id).await.error_message.as_deref(), Some("boom"));

    let moved = db::transition_status(
        &pool,
        request.id,
        RequestStatus::FailedGeneration,
        RequestStatus::CompletedWeek,
        false,
    )
    .await
    .unwrap();
    assert_eq!(moved, 1);
    let request = reload(&pool, request.id).await;
    assert_eq!(request.status, RequestStatus::CompletedWeek);
    assert_eq!(request.error_message, None);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn reset_interrupted_reports_in_flight_weeks() {
    let (pool, db_name) = create_test_db().await;
    let (user, _) = create_test_user(&pool).await;

    let stuck = new_request(&pool, user.id, 4).await;
    db::start_week(&pool, stuck.id, 3).await.unwrap().unwrap();
    let idle = new_request(&pool, user.id, 4).await;

    let interrupted = db::reset_interrupted(&pool).await.unwrap();
    assert_eq!(interrupted.len(), 1);
    assert_eq!(interrupted[0].request_id, stuck.id);
    assert_eq!(interrupted[0].week_number, 3);

    let reset = reload(&pool, stuck.id).await;
    assert_eq!(reset.status, RequestStatus::FailedGeneration);
    assert_eq!(reset.current_week, None);
    assert_eq!(
        reset.error_message.as_deref(),
        Some("interrupted during generation of week 3")
    );
    assert_eq!(reload(&pool, idle.id).await.status, RequestStatus::Pending);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn list_requests_is_user_scoped_and_paginated() {
    let (pool, db_name) = create_test_db().await;
    let (alice, _) = create_test_user(&pool).await;
    let (bob, _) = create_test_user(&pool).await;

    for _ in 0..3 {
        new_request(&pool, alice.id, 2).await;
    }
    new_request(&pool, bob.id, 2).await;

    let first = db::list_requests_for_user(&pool, alice.id, 2, 0).await.unwrap();
    let second = db::list_requests_for_user(&pool, alice.id, 2, 2).await.unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 1);
    assert!(first.iter().chain(&second).all(|r| r.user_id == alice.id));

    pool.close().await;
    drop_test_db(&db_name).await;
}
