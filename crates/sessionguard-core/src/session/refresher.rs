//! Refresh-credential to access-token exchange.
//!
//! `TokenRefresher` only talks to the refresh endpoint and classifies the
//! answer; writing the new token into `SessionState` is left to the caller.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::api::{ApiClient, ApiError};
use crate::utils::mask_token;

/// Result of one refresh exchange.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    Renewed { access_token: String },
    /// The refresh credential itself was rejected. Only a new login helps.
    LongTermExpired,
    /// Network trouble, server error, timeout or garbage response.
    TransientFailure { cause: Arc<ApiError> },
}

impl RefreshOutcome {
    /// Sort an endpoint result into one of the three outcomes.
    pub fn classify(result: Result<String, ApiError>) -> Self {
        match result {
            Ok(access_token) => RefreshOutcome::Renewed { access_token },
            Err(e) if e.is_credential_rejection() => RefreshOutcome::LongTermExpired,
            Err(e) => RefreshOutcome::TransientFailure { cause: Arc::new(e) },
        }
    }
}

#[derive(Clone)]
pub struct TokenRefresher {
    api: ApiClient,
    timeout: Duration,
}

impl TokenRefresher {
    pub fn new(api: ApiClient, timeout: Duration) -> Self {
        Self { api, timeout }
    }

    /// Call the refresh endpoint once.
    ///
    /// Never takes longer than the configured refresh timeout; running out
    /// of time is a `TransientFailure`.
    pub async fn refresh(&self) -> RefreshOutcome {
        let result = match tokio::time::timeout(self.timeout, self.api.refresh()).await {
            Ok(result) => result.map(|r| r.access_token),
            Err(_) => Err(ApiError::Timeout(self.timeout)),
        };

        let outcome = RefreshOutcome::classify(result);
        match &outcome {
            RefreshOutcome::Renewed { access_token } => {
                info!(token_preview = %mask_token(access_token), "Access token renewed");
            }
            RefreshOutcome::LongTermExpired => {
                warn!("Refresh credential rejected, session must log in again");
            }
            RefreshOutcome::TransientFailure { cause } => {
                warn!(error = %cause, "Token refresh failed");
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_success() {
        let outcome = RefreshOutcome::classify(Ok("T2".to_string()));
        assert!(matches!(outcome, RefreshOutcome::Renewed { ref access_token } if access_token == "T2"));
    }

    #[test]
    fn test_classify_rejections_as_long_term_expiry() {
        assert!(matches!(
            RefreshOutcome::classify(Err(ApiError::Unauthorized)),
            RefreshOutcome::LongTermExpired
        ));
        assert!(matches!(
            RefreshOutcome::classify(Err(ApiError::AccessDenied("revoked".into()))),
            RefreshOutcome::LongTermExpired
        ));
    }

    #[test]
    fn test_classify_everything_else_as_transient() {
        for err in [
            ApiError::ServerError("boom".into()),
            ApiError::RateLimited,
            ApiError::Timeout(Duration::from_secs(10)),
            ApiError::InvalidResponse("not json".into()),
        ] {
            assert!(matches!(
                RefreshOutcome::classify(Err(err)),
                RefreshOutcome::TransientFailure { .. }
            ));
        }
    }
}
