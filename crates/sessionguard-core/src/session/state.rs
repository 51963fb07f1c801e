use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::watch;
use tracing::debug;

use crate::utils::mask_token;

/// The authenticated user, carried alongside the access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub username: String,
    pub email: String,
}

/// Accept ids sent either as JSON strings or numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    Anonymous,
    Authenticated,
    Refreshing,
    Expired,
}

/// Access token and identity. They only ever exist together.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionData {
    access_token: String,
    identity: Identity,
    pub authenticated_at: DateTime<Utc>,
    pub token_renewed_at: DateTime<Utc>,
}

impl SessionData {
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn token_age(&self) -> Duration {
        Utc::now() - self.token_renewed_at
    }

    /// Get minutes since the access token was issued (for display)
    pub fn minutes_since_renewal(&self) -> i64 {
        self.token_age().num_minutes().max(0)
    }
}

impl fmt::Debug for SessionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionData")
            .field("access_token", &mask_token(&self.access_token))
            .field("identity", &self.identity)
            .field("authenticated_at", &self.authenticated_at)
            .field("token_renewed_at", &self.token_renewed_at)
            .finish()
    }
}

/// Immutable view of the session at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    data: Option<SessionData>,
    phase: SessionPhase,
    generation: u64,
}

impl SessionSnapshot {
    fn empty() -> Self {
        Self {
            data: None,
            phase: SessionPhase::Anonymous,
            generation: 0,
        }
    }

    pub fn access_token(&self) -> Option<&str> {
        self.data.as_ref().map(|d| d.access_token())
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.data.as_ref().map(|d| d.identity())
    }

    pub fn data(&self) -> Option<&SessionData> {
        self.data.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.data.is_some()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Incremented by every login and every clear. A token renewal keeps it.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Single owner of the current session.
///
/// Every mutation replaces the whole snapshot under the channel's lock, so
/// readers see either a full token/identity pair or nothing. Subscribers
/// are notified on each change.
pub struct SessionState {
    tx: watch::Sender<SessionSnapshot>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionSnapshot::empty());
        Self { tx }
    }

    pub fn get(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    /// Receive a new snapshot after every change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    /// Install a freshly logged-in session.
    pub fn set(&self, access_token: String, identity: Identity) -> SessionSnapshot {
        let now = Utc::now();
        let mut installed = SessionSnapshot::empty();
        self.tx.send_modify(|s| {
            s.data = Some(SessionData {
                access_token,
                identity,
                authenticated_at: now,
                token_renewed_at: now,
            });
            s.phase = SessionPhase::Authenticated;
            s.generation += 1;
            installed = s.clone();
        });
        debug!(generation = installed.generation, "Session established");
        installed
    }

    /// Clear the session back to anonymous. Returns false if it already was.
    pub fn invalidate(&self) -> bool {
        self.clear(SessionPhase::Anonymous, None)
    }

    /// Clear the session and mark it expired, but only if it is still the
    /// session identified by `generation`.
    pub(crate) fn expire(&self, generation: u64) -> bool {
        self.clear(SessionPhase::Expired, Some(generation))
    }

    fn clear(&self, phase: SessionPhase, generation: Option<u64>) -> bool {
        let changed = self.tx.send_if_modified(|s| {
            if generation.is_some_and(|g| g != s.generation) {
                return false;
            }
            if s.data.is_none() && s.phase == phase {
                return false;
            }
            s.data = None;
            s.phase = phase;
            s.generation += 1;
            true
        });
        if changed {
            debug!(?phase, "Session cleared");
        }
        changed
    }

    /// Mark a refresh as in flight for the session `generation`.
    pub(crate) fn begin_refresh(&self, generation: u64) -> bool {
        self.transition(generation, SessionPhase::Authenticated, SessionPhase::Refreshing)
    }

    /// Return to `Authenticated` after a refresh that changed nothing.
    pub(crate) fn end_refresh(&self, generation: u64) -> bool {
        self.transition(generation, SessionPhase::Refreshing, SessionPhase::Authenticated)
    }

    fn transition(&self, generation: u64, from: SessionPhase, to: SessionPhase) -> bool {
        self.tx.send_if_modified(|s| {
            if s.generation != generation || s.phase != from {
                return false;
            }
            s.phase = to;
            true
        })
    }

    /// Replace the access token of session `generation`, keeping its identity.
    /// Does nothing if that session has since been cleared or replaced.
    pub(crate) fn renew(&self, generation: u64, access_token: String) -> bool {
        let now = Utc::now();
        self.tx.send_if_modified(|s| {
            if s.generation != generation {
                return false;
            }
            let Some(data) = s.data.as_mut() else {
                return false;
            };
            data.access_token = access_token;
            data.token_renewed_at = now;
            s.phase = SessionPhase::Authenticated;
            true
        })
    }
}
