//! Content provider adapter.
//!
//! A [`ContentProvider`] turns a [`GenerationContext`] into raw text that
//! should contain one weekly plan as JSON. Implementations make exactly one
//! outbound attempt per call; retries and backoff belong to the worker.
//!
//! ```text
//! GenerationTask --generate(ctx)--> dyn ContentProvider
//!                                      |
//!                                      +--> Ok(ProviderResponse { text, raw })
//!                                      +--> Err(ProviderError::{RateLimited, Provider, Timeout, EmptyResponse})
//! ```

pub mod openrouter;

use async_trait::async_trait;
use thiserror::Error;

use crate::plan::GenerationContext;

pub use openrouter::OpenRouterProvider;

/// Text returned by a provider, plus the full response body for auditing.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub text: String,
    pub raw: serde_json::Value,
}

/// Why a provider call failed.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("provider request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("provider returned an empty response")]
    EmptyResponse,
}

impl ProviderError {
    /// Transient failures that may succeed on a later attempt.
    ///
    /// An empty response is treated as a content failure, not a transport
    /// one, so it is not retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_) | Self::Provider(_) | Self::Timeout(_)
        )
    }
}

/// Adapter interface for the external generation service.
///
/// Object-safe, so the worker and task hold an `Arc<dyn ContentProvider>`
/// injected at process start.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// Short identifier for logs (e.g. "openrouter").
    fn name(&self) -> &str;

    /// Make one generation attempt for `context`.
    async fn generate(&self, context: &GenerationContext)
    -> Result<ProviderResponse, ProviderError>;
}

// Compile-time assertion: ContentProvider must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn ContentProvider) {}
};
