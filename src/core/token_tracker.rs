//! Daily token budget shared by all provider calls

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::core::errors::{Result, TranslationError};
use crate::core::models::TokenUsage;

/// Rough token estimate for a text: four bytes per token
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Token tracker for managing daily quota
#[derive(Debug, Clone)]
pub struct TokenTracker {
    usage: Arc<RwLock<TokenUsage>>,
}

impl TokenTracker {
    /// Create a new token tracker
    pub fn new(daily_limit: usize) -> Self {
        Self {
            usage: Arc::new(RwLock::new(TokenUsage::new(daily_limit))),
        }
    }

    /// Hold back `estimate` tokens of today's budget for one call.
    ///
    /// A call that would not fit is refused with a quota error so the job
    /// queue backs off and retries. Every successful reservation must end in
    /// [`settle`](Self::settle) or [`release`](Self::release).
    pub async fn reserve(&self, estimate: usize) -> Result<()> {
        let mut usage = self.usage.write().await;
        usage.reset_if_needed();
        if estimate > usage.remaining() {
            warn!(
                "Daily token budget exhausted: need ~{}, remaining {}",
                estimate,
                usage.remaining()
            );
            return Err(TranslationError::QuotaExceededError);
        }
        usage.used_today += estimate;
        Ok(())
    }

    /// Replace a reservation with the tokens actually billed by the provider
    pub async fn settle(&self, estimate: usize, actual: usize) {
        let mut usage = self.usage.write().await;
        usage.reset_if_needed();
        usage.used_today = usage.used_today.saturating_sub(estimate).saturating_add(actual);
        debug!("Used {} tokens, remaining: {}", actual, usage.remaining());
    }

    /// Give back a reservation whose call never completed
    pub async fn release(&self, estimate: usize) {
        let mut usage = self.usage.write().await;
        usage.used_today = usage.used_today.saturating_sub(estimate);
    }

    /// Get current usage statistics
    pub async fn snapshot(&self) -> TokenUsage {
        let mut usage = self.usage.write().await;
        usage.reset_if_needed();
        usage.clone()
    }

    /// Reset quota (for testing or manual reset)
    pub async fn reset(&self) {
        let mut usage = self.usage.write().await;
        usage.used_today = 0;
        usage.last_reset = chrono::Utc::now();
        info!("Token quota reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_budget_reserve_and_settle() {
        let tracker = TokenTracker::new(1000);

        assert_ok!(tracker.reserve(500).await);
        tracker.settle(500, 400).await;
        assert_eq!(tracker.snapshot().await.remaining(), 600);

        let refused = tracker.reserve(700).await;
        assert!(matches!(refused, Err(TranslationError::QuotaExceededError)));

        assert_ok!(tracker.reserve(600).await);
        tracker.settle(600, 600).await;
        assert_err!(tracker.reserve(1).await);

        tracker.reset().await;
        assert_eq!(tracker.snapshot().await.remaining(), 1000);
    }

    #[tokio::test]
    async fn test_outstanding_reservations_count_against_budget() {
        let tracker = TokenTracker::new(1000);

        assert_ok!(tracker.reserve(600).await);
        // A second caller cannot claim the same budget before the first settles
        assert_err!(tracker.reserve(600).await);

        tracker.release(600).await;
        assert_ok!(tracker.reserve(600).await);
        assert_eq!(tracker.snapshot().await.used_today, 600);
    }

    #[tokio::test]
    async fn test_concurrent_reservations_never_overshoot() {
        let tracker = TokenTracker::new(1000);
        let attempts: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                tokio::spawn(async move { tracker.reserve(300).await.is_ok() })
            })
            .collect();

        let mut granted = 0;
        for attempt in attempts {
            if attempt.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 3);
        assert_eq!(tracker.snapshot().await.used_today, 900);
    }

    #[test]
    fn test_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
    }
}
