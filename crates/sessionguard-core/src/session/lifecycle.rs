//! Login and logout.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::api::{ApiClient, ApiError};
use crate::error::LoginError;

use super::state::{SessionSnapshot, SessionState};

/// Username and password for the login endpoint.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone)]
pub struct SessionLifecycle {
    api: ApiClient,
    state: Arc<SessionState>,
    revoke_timeout: Duration,
}

impl SessionLifecycle {
    pub fn new(api: ApiClient, state: Arc<SessionState>, revoke_timeout: Duration) -> Self {
        Self {
            api,
            state,
            revoke_timeout,
        }
    }

    /// Authenticate and install the new session.
    /// A failed login leaves the current state untouched.
    pub async fn login(&self, credentials: &Credentials) -> Result<SessionSnapshot, LoginError> {
        let auth = match self
            .api
            .authenticate(&credentials.username, &credentials.password)
            .await
        {
            Ok(auth) => auth,
            Err(e) => {
                warn!(username = %credentials.username, error = %e, "Login failed");
                return Err(e.into());
            }
        };

        let username = auth.user.username.clone();
        let snapshot = self.state.set(auth.access_token, auth.user);
        info!(username = %username, generation = snapshot.generation(), "Logged in");
        Ok(snapshot)
    }

    /// Clear the session now and revoke the refresh credential in the background.
    ///
    /// The local state is already empty when this returns. The returned
    /// handle resolves once the revoke call finishes; its outcome never
    /// touches the session. Dropping the handle does not stop the call.
    pub fn logout(&self) -> JoinHandle<Result<(), ApiError>> {
        let token = self.state.get().access_token().map(str::to_owned);
        if self.state.invalidate() {
            info!("Logged out");
        }

        let api = self.api.clone();
        let timeout = self.revoke_timeout;
        tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, api.revoke(token.as_deref())).await {
                Ok(result) => result,
                Err(_) => Err(ApiError::Timeout(timeout)),
            };
            if let Err(ref e) = result {
                warn!(error = %e, "Logout revoke call failed, local session already cleared");
            }
            result
        })
    }
}
