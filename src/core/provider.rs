//! Uniform interface to translation providers

use async_trait::async_trait;

use crate::core::errors::Result;
use crate::core::models::{TranslationRequest, TranslationResult};

/// A service that turns text into translated text.
///
/// Implementations must report transient refusals as
/// [`TranslationError::QuotaExceededError`](crate::core::errors::TranslationError::QuotaExceededError)
/// or `RateLimitError`; the queue retries only those.
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Whether credentials are present. Enqueueing is refused otherwise.
    fn is_configured(&self) -> bool {
        true
    }

    async fn translate_text(&self, request: &TranslationRequest) -> Result<TranslationResult>;
}
