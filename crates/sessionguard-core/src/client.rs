//! `SessionClient`: one HTTP client, one session, all four components wired together.

use std::sync::Arc;

use reqwest::{Client, Method, RequestBuilder};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::api::{ApiClient, ApiError};
use crate::config::{ConfigError, SessionConfig};
use crate::error::LoginError;
use crate::session::{
    AuthenticatedRequestExecutor, Credentials, ExpirySignals, RequestOutcome, SessionLifecycle,
    SessionSnapshot, SessionState, TokenRefresher,
};

/// Session-aware HTTP client.
/// Clone is cheap; clones share the session, the cookie store and the refresh guard.
#[derive(Clone)]
pub struct SessionClient {
    config: SessionConfig,
    http: Client,
    state: Arc<SessionState>,
    executor: AuthenticatedRequestExecutor,
    lifecycle: SessionLifecycle,
}

impl SessionClient {
    /// Create a client with its own connection pool and cookie store.
    pub fn new(config: SessionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let http = Client::builder()
            .timeout(config.request_timeout())
            .cookie_store(true)
            .build()?;
        Self::with_http_client(config, http)
    }

    /// Create a client on top of a caller-built `reqwest::Client`.
    /// The client needs a cookie store for refresh to work.
    pub fn with_http_client(config: SessionConfig, http: Client) -> Result<Self, ConfigError> {
        config.validate()?;
        let signals = ExpirySignals {
            short_term: config.short_term_status()?,
            long_term: config.long_term_status()?,
        };

        let api = ApiClient::new(http.clone(), &config);
        let state = Arc::new(SessionState::new());
        let refresher = TokenRefresher::new(api.clone(), config.refresh_timeout());
        let executor = AuthenticatedRequestExecutor::new(Arc::clone(&state), refresher, signals)
            .with_transient_failure_limit(config.max_transient_refresh_failures);
        let lifecycle = SessionLifecycle::new(api, Arc::clone(&state), config.revoke_timeout());

        debug!(base_url = %config.base_url, "Session client created");
        Ok(Self {
            config,
            http,
            state,
            executor,
            lifecycle,
        })
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<SessionSnapshot, LoginError> {
        self.lifecycle.login(credentials).await
    }

    /// Clear the session immediately; the returned handle tracks the revoke call.
    pub fn logout(&self) -> JoinHandle<Result<(), ApiError>> {
        self.lifecycle.logout()
    }

    pub async fn execute(&self, request: RequestBuilder) -> RequestOutcome {
        self.executor.execute(request).await
    }

    /// Start a request for `path` relative to the configured base URL.
    /// Pass the builder to `execute`; the bearer token is added there.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, self.config.resource_url(path))
    }

    pub fn get(&self, path: &str) -> RequestBuilder {
        self.request(Method::GET, path)
    }

    pub fn post(&self, path: &str) -> RequestBuilder {
        self.request(Method::POST, path)
    }

    pub fn session(&self) -> SessionSnapshot {
        self.state.get()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    pub fn state(&self) -> &Arc<SessionState> {
        &self.state
    }

    pub fn executor(&self) -> &AuthenticatedRequestExecutor {
        &self.executor
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = SessionConfig::default().with_base_url("");
        assert!(matches!(
            SessionClient::new(config),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));
    }

    #[test]
    fn test_new_client_starts_anonymous() {
        let client = SessionClient::new(SessionConfig::default()).expect("valid config");
        assert!(!client.session().is_authenticated());
        assert!(!client.executor().is_refreshing());
    }

    #[test]
    fn test_request_resolves_against_base_url() {
        let config = SessionConfig::default().with_base_url("https://api.example.com/v1/");
        let client = SessionClient::new(config).expect("valid config");
        let request = client.get("/documents").build().expect("valid request");
        assert_eq!(request.url().as_str(), "https://api.example.com/v1/documents");
        assert!(request.headers().get(reqwest::header::AUTHORIZATION).is_none());
    }
}
