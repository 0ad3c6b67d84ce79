//! Error taxonomy for analytics requests.

use common::{DataApiError, LimiterError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// Malformed request; never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Provider failure after the retry budget ran out.
    #[error("Upstream error for {wallet}: {message}")]
    Upstream { wallet: String, message: String },

    /// A rate-limited task overran its budget. Upstream-class failure.
    #[error("Upstream request for {wallet} timed out")]
    Timeout { wallet: String },

    /// Work discarded by `RateLimiter::clear`.
    #[error("Request for {wallet} was cancelled")]
    Cancelled { wallet: String },

    /// The FIFO engine was handed no trades. Indicates a grouping bug.
    #[error("No trades to reconstruct for market {market}")]
    EmptyInput { market: String },
}

impl AnalyticsError {
    /// Classify a fetch failure for `wallet`.
    pub fn from_fetch(wallet: &str, error: DataApiError) -> Self {
        let wallet = wallet.to_string();
        match error {
            DataApiError::Limiter(LimiterError::Timeout(_)) => AnalyticsError::Timeout { wallet },
            DataApiError::Limiter(LimiterError::Cancelled) => AnalyticsError::Cancelled { wallet },
            other => AnalyticsError::Upstream {
                wallet,
                message: other.to_string(),
            },
        }
    }

    /// Timeouts count as upstream failures.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            AnalyticsError::Upstream { .. } | AnalyticsError::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_from_fetch_classifies_limiter_errors() {
        let timeout = AnalyticsError::from_fetch(
            "0xabc",
            DataApiError::Limiter(LimiterError::Timeout(Duration::from_secs(60))),
        );
        assert!(matches!(timeout, AnalyticsError::Timeout { .. }));
        assert!(timeout.is_upstream());

        let cancelled =
            AnalyticsError::from_fetch("0xabc", DataApiError::Limiter(LimiterError::Cancelled));
        assert!(matches!(cancelled, AnalyticsError::Cancelled { .. }));
        assert!(!cancelled.is_upstream());
    }

    #[test]
    fn test_from_fetch_keeps_upstream_message() {
        let error = AnalyticsError::from_fetch(
            "0xabc",
            DataApiError::ApiError {
                status: 503,
                body: "unavailable".to_string(),
            },
        );

        match error {
            AnalyticsError::Upstream { wallet, message } => {
                assert_eq!(wallet, "0xabc");
                assert!(message.contains("503"));
            }
            other => panic!("Expected Upstream, got {:?}", other),
        }
    }
}
