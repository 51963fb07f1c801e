//! Session client configuration.
//!
//! `SessionConfig` names the authentication endpoints, the timeouts applied
//! to them, and the status codes that signal access-token and refresh-token
//! expiry on resource responses. It deserializes from JSON with every field
//! optional, so callers can load partial config files.

use std::time::Duration;

use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::join_url;

/// Default HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default upper bound for a single refresh exchange.
const DEFAULT_REFRESH_TIMEOUT_SECS: u64 = 10;

/// Default upper bound for the best-effort logout call.
const DEFAULT_REVOKE_TIMEOUT_SECS: u64 = 5;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("Timeout '{0}' must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("Invalid status code {0}")]
    InvalidStatus(u16),

    #[error("Short-term and long-term expiry statuses must differ (both {0})")]
    AmbiguousExpiryStatus(u16),

    #[error("max_transient_refresh_failures must be at least 1 (omit it to never escalate)")]
    ZeroFailureLimit,

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub base_url: String,
    pub login_path: String,
    pub refresh_path: String,
    pub logout_path: String,
    pub request_timeout_secs: u64,
    pub refresh_timeout_secs: u64,
    pub revoke_timeout_secs: u64,
    /// Resource status meaning the access token is stale but refreshable.
    pub short_term_status: u16,
    /// Resource status meaning the refresh credential is gone too.
    pub long_term_status: u16,
    /// Consecutive transient refresh failures before the session is expired.
    /// `None` never escalates.
    pub max_transient_refresh_failures: Option<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            login_path: "/api/auth/login".to_string(),
            refresh_path: "/api/auth/refresh".to_string(),
            logout_path: "/api/auth/logout".to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            refresh_timeout_secs: DEFAULT_REFRESH_TIMEOUT_SECS,
            revoke_timeout_secs: DEFAULT_REVOKE_TIMEOUT_SECS,
            short_term_status: StatusCode::UNAUTHORIZED.as_u16(),
            long_term_status: StatusCode::FORBIDDEN.as_u16(),
            max_transient_refresh_failures: None,
        }
    }
}

impl SessionConfig {
    /// Sets the server base URL every endpoint path is resolved against.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    #[must_use]
    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    #[must_use]
    pub fn with_logout_path(mut self, path: impl Into<String>) -> Self {
        self.logout_path = path.into();
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = whole_secs(timeout);
        self
    }

    #[must_use]
    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout_secs = whole_secs(timeout);
        self
    }

    /// Sets the resource status codes for short-term and long-term expiry.
    #[must_use]
    pub fn with_expiry_statuses(mut self, short_term: u16, long_term: u16) -> Self {
        self.short_term_status = short_term;
        self.long_term_status = long_term;
        self
    }

    /// Expire the session after `limit` consecutive transient refresh failures.
    #[must_use]
    pub fn with_transient_failure_limit(mut self, limit: u32) -> Self {
        self.max_transient_refresh_failures = Some(limit);
        self
    }

    /// Check the configuration for values the client cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.base_url).map_err(|e| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidBaseUrl {
                url: self.base_url.clone(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        for (name, secs) in [
            ("request_timeout_secs", self.request_timeout_secs),
            ("refresh_timeout_secs", self.refresh_timeout_secs),
            ("revoke_timeout_secs", self.revoke_timeout_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::ZeroTimeout(name));
            }
        }

        let short_term = self.short_term_status()?;
        let long_term = self.long_term_status()?;
        if short_term == long_term {
            return Err(ConfigError::AmbiguousExpiryStatus(short_term.as_u16()));
        }

        if self.max_transient_refresh_failures == Some(0) {
            return Err(ConfigError::ZeroFailureLimit);
        }
        Ok(())
    }

    pub fn login_url(&self) -> String {
        join_url(&self.base_url, &self.login_path)
    }

    pub fn refresh_url(&self) -> String {
        join_url(&self.base_url, &self.refresh_path)
    }

    pub fn logout_url(&self) -> String {
        join_url(&self.base_url, &self.logout_path)
    }

    /// Resolve a resource path against the base URL.
    pub fn resource_url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs)
    }

    pub fn revoke_timeout(&self) -> Duration {
        Duration::from_secs(self.revoke_timeout_secs)
    }

    pub fn short_term_status(&self) -> Result<StatusCode, ConfigError> {
        StatusCode::from_u16(self.short_term_status)
            .map_err(|_| ConfigError::InvalidStatus(self.short_term_status))
    }

    pub fn long_term_status(&self) -> Result<StatusCode, ConfigError> {
        StatusCode::from_u16(self.long_term_status)
            .map_err(|_| ConfigError::InvalidStatus(self.long_term_status))
    }
}

/// Whole seconds, rounding any fraction up so short timeouts never become zero.
fn whole_secs(timeout: Duration) -> u64 {
    timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0)
}
