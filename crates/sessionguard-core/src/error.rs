use thiserror::Error;

use crate::api::ApiError;

#[derive(Error, Debug)]
pub enum LoginError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Unexpected login response: {0}")]
    InvalidResponse(String),

    #[error("Login failed: {0}")]
    Api(ApiError),
}

impl From<ApiError> for LoginError {
    fn from(e: ApiError) -> Self {
        match e {
            e if e.is_credential_rejection() => LoginError::InvalidCredentials,
            ApiError::InvalidResponse(message) => LoginError::InvalidResponse(message),
            e => LoginError::Api(e),
        }
    }
}

/// Failure side of `RequestOutcome`, for callers that want `?`.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Not logged in")]
    Unauthenticated,

    #[error("Session expired - please log in again")]
    SessionExpired,

    #[error(transparent)]
    Transport(#[from] ApiError),
}
