pub mod exercise_logs;
pub mod plan_requests;
pub mod users;
pub mod weekly_plans;
