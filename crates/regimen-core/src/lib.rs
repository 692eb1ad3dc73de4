pub mod config;
pub mod exercise_log;
pub mod generation;
pub mod lifecycle;
pub mod plan;
pub mod provider;
pub mod request;
pub mod scheduler;
pub mod worker;
