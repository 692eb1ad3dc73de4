//! The generation task: produce one week of a plan request.
//!
//! A task loads the request, claims it for the week, asks the content
//! provider for the week, parses the answer and writes it in one
//! transaction. Every exit path leaves the request without an in-flight
//! week, and re-delivery of a task that already produced its week is a
//! no-op apart from status reconciliation.

pub mod materialize;

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use regimen_db::models::{PlanRequest, RequestStatus, UserProfile, Visibility};
use regimen_db::queries::{plan_requests, users, weekly_plans};

use crate::lifecycle::{BeginWeek, RequestLifecycle};
use crate::plan::{GenerationContext, PlanParseError, parse_week};
use crate::provider::{ContentProvider, ProviderError};

pub use materialize::{Audit, Materialized, MaterializedWeek, materialize_week};

// ---------------------------------------------------------------------------
// Errors and outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("plan request {0} not found")]
    RequestNotFound(Uuid),

    #[error("profile for user {0} not found")]
    ProfileNotFound(Uuid),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Parse(#[from] PlanParseError),

    #[error("week {week} cannot be generated before week {} exists", .week - 1)]
    MissingPreviousWeek { week: i32 },

    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: RequestStatus,
        to: RequestStatus,
    },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl GenerationError {
    /// Whether running the task again may succeed without intervention.
    ///
    /// Transient provider failures and unexpected storage errors are
    /// retryable. Structural problems with the data are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider(e) => e.is_retryable(),
            Self::Storage(_) => true,
            Self::RequestNotFound(_)
            | Self::ProfileNotFound(_)
            | Self::Parse(_)
            | Self::MissingPreviousWeek { .. }
            | Self::InvalidTransition { .. } => false,
        }
    }

    /// Message recorded on the request when this error fails a week.
    pub fn request_message(&self, week: i32) -> String {
        let detail = match self {
            Self::Storage(e) => format!("{e:#}"),
            other => other.to_string(),
        };
        if self.is_retryable() {
            format!("Unexpected system error processing week {week}: {detail}")
        } else {
            format!("Data integrity error for week {week}: {detail}")
        }
    }
}

/// What a task run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// The week was generated and stored.
    Generated {
        week: MaterializedWeek,
        status: RequestStatus,
    },
    /// The week already existed and had been surfaced; only the request
    /// status was reconciled.
    AlreadyGenerated {
        plan_id: Uuid,
        status: RequestStatus,
    },
    /// The request was terminal or busy with another delivery.
    Skipped(RequestStatus),
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// Runs generation for one (request, week) pair. Cheap to clone.
#[derive(Clone)]
pub struct GenerationTask {
    pool: PgPool,
    provider: Arc<dyn ContentProvider>,
}

impl GenerationTask {
    pub fn new(pool: PgPool, provider: Arc<dyn ContentProvider>) -> Self {
        Self { pool, provider }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run(
        &self,
        request_id: Uuid,
        week: i32,
    ) -> Result<GenerationOutcome, GenerationError> {
        self.run_on(request_id, week, Utc::now().date_naive()).await
    }

    /// Like [`run`](Self::run) with an explicit "today".
    pub async fn run_on(
        &self,
        request_id: Uuid,
        week: i32,
        today: NaiveDate,
    ) -> Result<GenerationOutcome, GenerationError> {
        let request = plan_requests::get_request(&self.pool, request_id)
            .await?
            .ok_or(GenerationError::RequestNotFound(request_id))?;

        if request.status.is_terminal() {
            tracing::info!(
                request_id = %request_id,
                week,
                status = %request.status,
                "request is finished, skipping generation"
            );
            return Ok(GenerationOutcome::Skipped(request.status));
        }

        // Surfaced weeks are never regenerated.
        if let Some(plan) = weekly_plans::get_plan_for_week(&self.pool, request_id, week).await? {
            if plan.visibility != Visibility::Upcoming {
                return self.reconcile_existing(&request, week, plan.id).await;
            }
        }

        let profile = users::get_profile(&self.pool, request.user_id)
            .await?
            .ok_or(GenerationError::ProfileNotFound(request.user_id))?;

        let request = match RequestLifecycle::begin_week(&self.pool, request_id, week).await? {
            BeginWeek::Started(request) => request,
            BeginWeek::NotFound => return Err(GenerationError::RequestNotFound(request_id)),
            BeginWeek::Unavailable(status) => {
                tracing::info!(
                    request_id = %request_id,
                    week,
                    status = %status,
                    "request not available for generation, skipping"
                );
                return Ok(GenerationOutcome::Skipped(status));
            }
        };

        tracing::info!(request_id = %request_id, week, "generating week");

        let result = self.generate(&request, &profile, week, today).await;
        let (outcome, recorded) = self.record_outcome(&request, week, result).await;
        if recorded {
            return outcome;
        }

        // The outcome write failed; no in-flight marker may survive the task.
        match RequestLifecycle::release_week(&self.pool, request_id, week).await {
            Ok(true) => tracing::warn!(
                request_id = %request_id,
                week,
                "cleared leftover in-flight marker"
            ),
            Ok(false) => {}
            Err(e) => tracing::error!(
                request_id = %request_id,
                week,
                error = %format!("{e:#}"),
                "failed to release in-flight marker"
            ),
        }

        outcome
    }

    async fn reconcile_existing(
        &self,
        request: &PlanRequest,
        week: i32,
        plan_id: Uuid,
    ) -> Result<GenerationOutcome, GenerationError> {
        match request.status {
            RequestStatus::GeneratingWeek => {
                tracing::info!(
                    request_id = %request.id,
                    week,
                    "week already generated and another delivery is in flight, skipping"
                );
                return Ok(GenerationOutcome::Skipped(request.status));
            }
            // Only an explicit resume moves a failed request on.
            RequestStatus::FailedGeneration => {
                tracing::info!(
                    request_id = %request.id,
                    week,
                    "week already generated but request has failed, skipping"
                );
                return Ok(GenerationOutcome::Skipped(request.status));
            }
            _ => {}
        }

        // An older week says nothing about where the request stands now.
        let latest = weekly_plans::highest_week(&self.pool, request.id).await?;
        if latest.is_some_and(|latest| latest > week) {
            tracing::info!(
                request_id = %request.id,
                week,
                plan_id = %plan_id,
                "week superseded by a later week, leaving status alone"
            );
            return Ok(GenerationOutcome::AlreadyGenerated {
                plan_id,
                status: request.status,
            });
        }

        let target = RequestLifecycle::status_after_week(request, week);
        if request.status != target && !RequestLifecycle::is_valid_transition(request.status, target)
        {
            return Err(GenerationError::InvalidTransition {
                from: request.status,
                to: target,
            });
        }

        let status = RequestLifecycle::reconcile(&self.pool, request, week).await?;
        tracing::warn!(
            request_id = %request.id,
            week,
            plan_id = %plan_id,
            status = %status,
            "week already generated, reconciled request status only"
        );
        Ok(GenerationOutcome::AlreadyGenerated { plan_id, status })
    }

    /// Provider call, parse and storage. No request status writes.
    async fn generate(
        &self,
        request: &PlanRequest,
        profile: &UserProfile,
        week: i32,
        today: NaiveDate,
    ) -> Result<Materialized, GenerationError> {
        let context = GenerationContext::new(request, profile, week, today);
        let prompt = context.prompt();

        let response = self.provider.generate(&context).await?;
        let parsed = parse_week(&response.text)?;

        let audit = Audit {
            prompt: &prompt,
            response: &response.raw,
        };
        materialize_week(&self.pool, request, week, &parsed, audit, today).await
    }

    /// Write the task result onto the request. The flag reports whether the
    /// status write succeeded.
    async fn record_outcome(
        &self,
        request: &PlanRequest,
        week: i32,
        result: Result<Materialized, GenerationError>,
    ) -> (Result<GenerationOutcome, GenerationError>, bool) {
        match result {
            Ok(Materialized::AlreadySurfaced(plan_id)) => {
                // Another delivery finished this week after our pre-check.
                let status = match RequestLifecycle::complete_week(&self.pool, request, week).await
                {
                    Ok(status) => status,
                    Err(e) => return (Err(GenerationError::Storage(e)), false),
                };
                tracing::warn!(
                    request_id = %request.id,
                    week,
                    plan_id = %plan_id,
                    status = %status,
                    "week surfaced by another delivery, reconciled request status only"
                );
                (Ok(GenerationOutcome::AlreadyGenerated { plan_id, status }), true)
            }
            Ok(Materialized::Written(materialized)) => {
                let status = match RequestLifecycle::complete_week(&self.pool, request, week).await
                {
                    Ok(status) => status,
                    Err(e) => return (Err(GenerationError::Storage(e)), false),
                };
                tracing::info!(
                    request_id = %request.id,
                    week,
                    plan_id = %materialized.plan_id,
                    days = materialized.days,
                    exercises = materialized.exercises,
                    visibility = %materialized.visibility,
                    status = %status,
                    "week generated"
                );
                let outcome = GenerationOutcome::Generated {
                    week: materialized,
                    status,
                };
                (Ok(outcome), true)
            }
            Err(error) => {
                let message = error.request_message(week);
                if error.is_retryable() {
                    tracing::warn!(request_id = %request.id, week, error = %message, "generation failed");
                } else {
                    tracing::error!(request_id = %request.id, week, error = %message, "generation failed");
                }
                let recorded =
                    match RequestLifecycle::fail_week(&self.pool, request.id, week, &message).await {
                        Ok(()) => true,
                        Err(e) => {
                            tracing::error!(
                                request_id = %request.id,
                                week,
                                error = %format!("{e:#}"),
                                "failed to record generation failure"
                            );
                            false
                        }
                    };
                (Err(error), recorded)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn retryable_classification() {
        assert!(GenerationError::Provider(ProviderError::Timeout(Duration::from_secs(1))).is_retryable());
        assert!(GenerationError::Provider(ProviderError::RateLimited("x".into())).is_retryable());
        assert!(!GenerationError::Provider(ProviderError::EmptyResponse).is_retryable());
        assert!(GenerationError::Storage(anyhow::anyhow!("connection reset")).is_retryable());
        assert!(!GenerationError::MissingPreviousWeek { week: 3 }.is_retryable());
        assert!(!GenerationError::RequestNotFound(Uuid::nil()).is_retryable());
    }

    #[test]
    fn request_messages_name_the_week_and_class() {
        let err = GenerationError::MissingPreviousWeek { week: 3 };
        assert_eq!(
            err.request_message(3),
            "Data integrity error for week 3: week 3 cannot be generated before week 2 exists"
        );

        let err = GenerationError::Provider(ProviderError::Timeout(Duration::from_secs(120)));
        assert!(
            err.request_message(1)
                .starts_with("Unexpected system error processing week 1: ")
        );
    }
}
