//! Token-based session lifecycle for HTTP clients.
//!
//! This crate provides:
//! - `SessionState`: the shared, atomically-updated access token and identity
//! - `TokenRefresher`: exchanges the cookie-held refresh credential for a new access token
//! - `AuthenticatedRequestExecutor`: attaches the bearer token to requests and
//!   recovers once from access-token expiry, coalescing concurrent refreshes
//! - `SessionLifecycle`: login and logout
//!
//! `SessionClient` wires all of them to one `reqwest::Client`.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod session;
pub mod utils;

pub use api::ApiError;
pub use client::SessionClient;
pub use config::{ConfigError, SessionConfig};
pub use error::{LoginError, SessionError};
pub use session::{
    AuthenticatedRequestExecutor, Credentials, Identity, RefreshOutcome, RequestOutcome,
    SessionData, SessionLifecycle, SessionPhase, SessionSnapshot, SessionState, TokenRefresher,
};
