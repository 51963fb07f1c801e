//! Session management: state, refresh, request execution and lifecycle.
//!
//! This module provides:
//! - `SessionState`: the shared token/identity pair with change notification
//! - `TokenRefresher`: the refresh exchange, classified into `RefreshOutcome`
//! - `AuthenticatedRequestExecutor`: bearer attachment and one-shot recovery
//! - `SessionLifecycle`: login and logout
//!
//! Access tokens live in memory only; the refresh credential stays in the
//! HTTP client's cookie store.

pub mod executor;
pub mod lifecycle;
pub mod refresher;
pub mod state;

pub use executor::{AuthenticatedRequestExecutor, ExpirySignals, RequestOutcome};
pub use lifecycle::{Credentials, SessionLifecycle};
pub use refresher::{RefreshOutcome, TokenRefresher};
pub use state::{Identity, SessionData, SessionPhase, SessionSnapshot, SessionState};
