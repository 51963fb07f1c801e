//! API client for the authentication endpoints.
//!
//! Login, refresh and logout share one `reqwest::Client` with a cookie
//! store, which is where the server-issued refresh credential lives.

use reqwest::{header, Client};
use tracing::debug;

use crate::config::SessionConfig;
use crate::utils::mask_token;

use super::wire::{LoginRequest, LoginResponse, RefreshResponse};
use super::ApiError;

/// Client for the login, refresh and logout endpoints.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    login_url: String,
    refresh_url: String,
    logout_url: String,
}

impl ApiClient {
    pub fn new(client: Client, config: &SessionConfig) -> Self {
        Self {
            client,
            login_url: config.login_url(),
            refresh_url: config.refresh_url(),
            logout_url: config.logout_url(),
        }
    }

    /// The underlying HTTP client, shared with resource requests.
    pub fn http(&self) -> &Client {
        &self.client
    }

    /// Authenticate with username and password.
    ///
    /// On success the server also sets the refresh cookie, which the cookie
    /// store keeps for later `refresh` and `revoke` calls.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<LoginResponse, ApiError> {
        debug!(url = %self.login_url, username, "Sending login request");

        let response = self
            .client
            .post(&self.login_url)
            .header(header::ACCEPT, "application/json")
            .json(&LoginRequest { username, password })
            .send()
            .await?;

        let response = Self::check_response(response).await?;

        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse login response: {}", e)))
    }

    /// Exchange the cookie-held refresh credential for a new access token.
    /// The request carries no body of its own.
    pub async fn refresh(&self) -> Result<RefreshResponse, ApiError> {
        debug!(url = %self.refresh_url, "Sending refresh request");

        let response = self
            .client
            .post(&self.refresh_url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;

        let response = Self::check_response(response).await?;

        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse refresh response: {}", e)))
    }

    /// Ask the server to revoke the refresh credential.
    /// The last access token is attached when there was one.
    pub async fn revoke(&self, access_token: Option<&str>) -> Result<(), ApiError> {
        debug!(
            url = %self.logout_url,
            token_preview = access_token.map(mask_token).as_deref().unwrap_or("<none>"),
            "Sending logout request"
        );

        let mut request = self.client.post(&self.logout_url);
        if let Some(token) = access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        Self::check_response(response).await?;
        Ok(())
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }
}
