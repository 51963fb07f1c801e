//! HTTP client module for the authentication endpoints.
//!
//! This module provides the `ApiClient` for the login, refresh and logout
//! endpoints, plus the `ApiError` type shared by every network call.
//!
//! The refresh credential lives in the client's cookie store; nothing here
//! reads or writes it directly.

pub mod client;
pub mod error;
pub mod wire;

pub use client::ApiClient;
pub use error::ApiError;
