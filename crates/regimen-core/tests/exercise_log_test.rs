//! Integration tests for exercise logging.

mod common;

use std::sync::Arc;

use chrono::Days;

use regimen_core::exercise_log::{LogValidationError, NewExerciseLog, list_logs, log_exercise};
use regimen_core::generation::{GenerationOutcome, GenerationTask};
use regimen_db::models::SetEntry;
use regimen_db::queries::{exercise_logs, weekly_plans};
use regimen_test_utils::{create_test_db, create_test_user, drop_test_db};

use common::{ScriptedProvider, insert_request, today};

fn sets(reps: &[i32]) -> Vec<SetEntry> {
    reps.iter()
        .zip(1..)
        .map(|(&reps, set_number)| SetEntry {
            set_number,
            reps,
            weight: 20.0,
        })
        .collect()
}

/// Generate one week for `user_id` and return its plan ID.
async fn generated_plan(pool: &sqlx::PgPool, user_id: uuid::Uuid) -> uuid::Uuid {
    let request = insert_request(pool, user_id, 1, 3).await;
    let task = GenerationTask::new(pool.clone(), Arc::new(ScriptedProvider::valid(3)));
    match task.run_on(request.id, 1, today()).await.unwrap() {
        GenerationOutcome::Generated { week, .. } => week.plan_id,
        other => panic!("expected a generated week, got {other:?}"),
    }
}

#[tokio::test]
async fn planned_log_takes_the_planned_name() {
    let (pool, db_name) = create_test_db().await;
    let (user, _) = create_test_user(&pool).await;
    let plan_id = generated_plan(&pool, user.id).await;

    let days = weekly_plans::list_days(&pool, plan_id).await.unwrap();
    let exercises = weekly_plans::list_exercises_for_plan(&pool, plan_id).await.unwrap();
    let squat = &exercises[0];

    let log = log_exercise(
        &pool,
        user.id,
        NewExerciseLog {
            planned_exercise_id: Some(squat.id),
            sets: sets(&[5, 5, 4]),
            completed_day_id: Some(days[0].id),
            notes: Some("felt strong".into()),
            ..NewExerciseLog::default()
        },
        today(),
    )
    .await
    .unwrap();

    assert_eq!(log.exercise_name, "Goblet Squat");
    assert_eq!(log.log_date, today());
    assert_eq!(log.total_sets_done(), 3);
    assert_eq!(log.total_reps_done(), 14);
    assert_eq!(log.completed_day_id, Some(days[0].id));

    let stored = exercise_logs::get_log(&pool, log.id).await.unwrap().unwrap();
    assert_eq!(stored.sets.0, sets(&[5, 5, 4]));
    assert_eq!(stored.notes, "felt strong");

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn explicit_and_ad_hoc_names() {
    let (pool, db_name) = create_test_db().await;
    let (user, _) = create_test_user(&pool).await;
    let plan_id = generated_plan(&pool, user.id).await;
    let exercises = weekly_plans::list_exercises_for_plan(&pool, plan_id).await.unwrap();

    let renamed = log_exercise(
        &pool,
        user.id,
        NewExerciseLog {
            planned_exercise_id: Some(exercises[1].id),
            exercise_name: Some("Incline Push-up".into()),
            sets: sets(&[12]),
            ..NewExerciseLog::default()
        },
        today(),
    )
    .await
    .unwrap();
    assert_eq!(renamed.exercise_name, "Incline Push-up");

    let ad_hoc = log_exercise(
        &pool,
        user.id,
        NewExerciseLog {
            exercise_name: Some("  Farmer Carry ".into()),
            sets: sets(&[1]),
            ..NewExerciseLog::default()
        },
        today(),
    )
    .await
    .unwrap();
    assert_eq!(ad_hoc.exercise_name, "Farmer Carry");
    assert_eq!(ad_hoc.planned_exercise_id, None);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn other_users_plans_are_not_visible() {
    let (pool, db_name) = create_test_db().await;
    let (owner, _) = create_test_user(&pool).await;
    let (intruder, _) = create_test_user(&pool).await;
    let plan_id = generated_plan(&pool, owner.id).await;
    let exercises = weekly_plans::list_exercises_for_plan(&pool, plan_id).await.unwrap();
    let days = weekly_plans::list_days(&pool, plan_id).await.unwrap();

    let err = log_exercise(
        &pool,
        intruder.id,
        NewExerciseLog {
            planned_exercise_id: Some(exercises[0].id),
            sets: sets(&[5]),
            ..NewExerciseLog::default()
        },
        today(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, LogValidationError::PlannedExerciseNotFound(id) if id == exercises[0].id));

    let err = log_exercise(
        &pool,
        intruder.id,
        NewExerciseLog {
            exercise_name: Some("Plank".into()),
            sets: sets(&[1]),
            completed_day_id: Some(days[0].id),
            ..NewExerciseLog::default()
        },
        today(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, LogValidationError::DayNotFound(_)));

    assert!(list_logs(&pool, intruder.id, None, None, 0).await.unwrap().is_empty());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn invalid_sets_are_rejected_before_storage() {
    let (pool, db_name) = create_test_db().await;
    let (user, _) = create_test_user(&pool).await;

    let err = log_exercise(
        &pool,
        user.id,
        NewExerciseLog {
            exercise_name: Some("Row".into()),
            sets: vec![SetEntry {
                set_number: 1,
                reps: -3,
                weight: 40.0,
            }],
            ..NewExerciseLog::default()
        },
        today(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, LogValidationError::NegativeReps { index: 0, value: -3 }));
    assert!(list_logs(&pool, user.id, None, None, 0).await.unwrap().is_empty());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn listing_filters_by_date_and_pages() {
    let (pool, db_name) = create_test_db().await;
    let (user, _) = create_test_user(&pool).await;
    let t = today();

    for offset in 0..25u64 {
        let date = t.checked_sub_days(Days::new(offset)).unwrap();
        log_exercise(
            &pool,
            user.id,
            NewExerciseLog {
                exercise_name: Some(format!("Walk {offset}")),
                sets: sets(&[1]),
                log_date: Some(date),
                ..NewExerciseLog::default()
            },
            t,
        )
        .await
        .unwrap();
    }

    let first = list_logs(&pool, user.id, None, None, 0).await.unwrap();
    let second = list_logs(&pool, user.id, None, None, 1).await.unwrap();
    assert_eq!(first.len(), 20);
    assert_eq!(second.len(), 5);
    assert_eq!(first[0].log_date, t);
    assert!(first.windows(2).all(|w| w[0].log_date >= w[1].log_date));

    let from = t.checked_sub_days(Days::new(6)).unwrap();
    let to = t.checked_sub_days(Days::new(2)).unwrap();
    let week = list_logs(&pool, user.id, Some(from), Some(to), 0).await.unwrap();
    assert_eq!(week.len(), 5);
    assert!(week.iter().all(|l| l.log_date >= from && l.log_date <= to));

    pool.close().await;
    drop_test_db(&db_name).await;
}
