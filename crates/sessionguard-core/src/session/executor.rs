//! Authenticated request execution with single-flight token refresh.
//!
//! A request that comes back with the short-term expiry status triggers at
//! most one refresh and one retry. Concurrent requests that hit the same
//! expiry share a single refresh: the first one spawns it, the rest await
//! the same shared future. The refresh runs as its own task, so dropping
//! any one waiter never cancels it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::{RequestBuilder, Response, StatusCode};
use tracing::{debug, info, warn};

use crate::api::ApiError;
use crate::error::SessionError;

use super::refresher::{RefreshOutcome, TokenRefresher};
use super::state::{SessionPhase, SessionState};

/// Result of `AuthenticatedRequestExecutor::execute`.
#[derive(Debug)]
pub enum RequestOutcome {
    /// Any response that is not an auth signal, 2xx or otherwise.
    Success { response: Response },
    /// No access token was present; nothing was sent.
    Unauthenticated,
    /// The refresh credential is gone (or recovery failed); log in again.
    SessionExpired,
    TransportError { cause: ApiError },
}

impl RequestOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RequestOutcome::Success { .. })
    }

    pub fn into_result(self) -> Result<Response, SessionError> {
        match self {
            RequestOutcome::Success { response } => Ok(response),
            RequestOutcome::Unauthenticated => Err(SessionError::Unauthenticated),
            RequestOutcome::SessionExpired => Err(SessionError::SessionExpired),
            RequestOutcome::TransportError { cause } => Err(SessionError::Transport(cause)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseSignal {
    Ordinary,
    ShortTermExpiry,
    LongTermExpiry,
}

/// Status codes a resource server uses to report credential expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpirySignals {
    pub short_term: StatusCode,
    pub long_term: StatusCode,
}

impl Default for ExpirySignals {
    fn default() -> Self {
        Self {
            short_term: StatusCode::UNAUTHORIZED,
            long_term: StatusCode::FORBIDDEN,
        }
    }
}

impl ExpirySignals {
    fn classify(&self, status: StatusCode) -> ResponseSignal {
        if status == self.short_term {
            ResponseSignal::ShortTermExpiry
        } else if status == self.long_term {
            ResponseSignal::LongTermExpiry
        } else {
            ResponseSignal::Ordinary
        }
    }
}

type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

struct InFlight {
    id: u64,
    generation: u64,
    refresh: SharedRefresh,
}

/// Result of the most recently finished refresh.
struct Completed {
    generation: u64,
    outcome: RefreshOutcome,
}

#[derive(Default)]
struct GateSlot {
    in_flight: Option<InFlight>,
    /// Number of refreshes finished so far.
    completed: u64,
    last: Option<Completed>,
}

#[derive(Default)]
struct TransientStreak {
    generation: u64,
    count: u32,
}

#[derive(Default)]
struct RefreshGate {
    slot: Mutex<GateSlot>,
    next_id: AtomicU64,
    streak: Mutex<TransientStreak>,
}

impl RefreshGate {
    fn lock(&self) -> MutexGuard<'_, GateSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the outcome of refresh `id` and release the guard, unless a
    /// newer refresh already holds it.
    fn finish(&self, id: u64, generation: u64, outcome: RefreshOutcome) {
        let mut slot = self.lock();
        if slot.in_flight.as_ref().is_some_and(|f| f.id == id) {
            slot.in_flight = None;
        }
        slot.completed += 1;
        slot.last = Some(Completed { generation, outcome });
    }

    fn completed(&self) -> u64 {
        self.lock().completed
    }

    fn is_refreshing(&self) -> bool {
        self.lock().in_flight.is_some()
    }

    /// Count one more transient failure for `generation` and return the streak.
    fn record_transient(&self, generation: u64) -> u32 {
        let mut streak = self.streak.lock().unwrap_or_else(PoisonError::into_inner);
        if streak.generation != generation {
            *streak = TransientStreak { generation, count: 0 };
        }
        streak.count += 1;
        streak.count
    }

    fn reset_streak(&self) {
        let mut streak = self.streak.lock().unwrap_or_else(PoisonError::into_inner);
        streak.count = 0;
    }
}

/// Releases the gate when the refresh task ends, even by panic.
struct FinishOnDrop {
    gate: Arc<RefreshGate>,
    id: u64,
    generation: u64,
    outcome: Option<RefreshOutcome>,
}

impl Drop for FinishOnDrop {
    fn drop(&mut self) {
        let outcome = self.outcome.take().unwrap_or_else(|| RefreshOutcome::TransientFailure {
            cause: Arc::new(ApiError::InvalidResponse(
                "Refresh task ended without a result".to_string(),
            )),
        });
        self.gate.finish(self.id, self.generation, outcome);
    }
}

/// What a request that saw short-term expiry should do next.
enum GateAction {
    /// The session no longer holds the rejected token; retry with the current one.
    TokenReplaced,
    /// A refresh for this session finished after the request was sent.
    Reuse(RefreshOutcome),
    /// Await the refresh for this session.
    Join(SharedRefresh),
    /// A refresh for an earlier session is still running; wait, then decide again.
    WaitForPrevious(SharedRefresh),
}

enum Recovery {
    TokenReplaced,
    Refreshed(RefreshOutcome),
}

/// Attaches the access token to caller-built requests and recovers once
/// from access-token expiry.
/// Clone is cheap; clones share the session and the refresh guard.
#[derive(Clone)]
pub struct AuthenticatedRequestExecutor {
    state: Arc<SessionState>,
    refresher: TokenRefresher,
    signals: ExpirySignals,
    max_transient_failures: Option<u32>,
    gate: Arc<RefreshGate>,
}

impl AuthenticatedRequestExecutor {
    pub fn new(state: Arc<SessionState>, refresher: TokenRefresher, signals: ExpirySignals) -> Self {
        Self {
            state,
            refresher,
            signals,
            max_transient_failures: None,
            gate: Arc::new(RefreshGate::default()),
        }
    }

    /// Expire the session after `limit` consecutive transient refresh failures.
    #[must_use]
    pub fn with_transient_failure_limit(mut self, limit: Option<u32>) -> Self {
        self.max_transient_failures = limit;
        self
    }

    /// True while a refresh exchange is in flight.
    pub fn is_refreshing(&self) -> bool {
        self.gate.is_refreshing()
    }

    /// Send `request` with the current access token.
    ///
    /// On short-term expiry the token is refreshed (shared with any other
    /// request that hit the same expiry) and the original request is sent
    /// once more. On long-term expiry the session is expired without a
    /// refresh.
    pub async fn execute(&self, request: RequestBuilder) -> RequestOutcome {
        let snapshot = self.state.get();
        let Some(token) = snapshot.access_token().map(str::to_owned) else {
            debug!(phase = ?snapshot.phase(), "No access token, request not sent");
            return RequestOutcome::Unauthenticated;
        };
        let seen_refreshes = self.gate.completed();

        let replay = request.try_clone();
        let response = match send(request, &token).await {
            Ok(response) => response,
            Err(cause) => return RequestOutcome::TransportError { cause },
        };

        match self.signals.classify(response.status()) {
            ResponseSignal::Ordinary => RequestOutcome::Success { response },
            ResponseSignal::LongTermExpiry => self.expire_session(snapshot.generation(), &response),
            ResponseSignal::ShortTermExpiry => {
                debug!(url = %response.url(), "Access token rejected, recovering");
                self.recover(replay, &token, snapshot.generation(), seen_refreshes)
                    .await
            }
        }
    }

    async fn recover(
        &self,
        replay: Option<RequestBuilder>,
        stale_token: &str,
        generation: u64,
        seen_refreshes: u64,
    ) -> RequestOutcome {
        match self.refresh_coalesced(stale_token, generation, seen_refreshes).await {
            Recovery::TokenReplaced => {
                debug!("Access token already replaced, retrying without refresh");
            }
            Recovery::Refreshed(RefreshOutcome::Renewed { .. }) => {}
            Recovery::Refreshed(RefreshOutcome::LongTermExpired) => {
                return RequestOutcome::SessionExpired;
            }
            Recovery::Refreshed(RefreshOutcome::TransientFailure { cause }) => {
                if self.state.get().phase() == SessionPhase::Expired {
                    return RequestOutcome::SessionExpired;
                }
                return RequestOutcome::TransportError {
                    cause: ApiError::RefreshFailed(cause),
                };
            }
        }

        // Re-read so the retry carries the token the refresh just wrote
        let current = self.state.get();
        let Some(token) = current.access_token().map(str::to_owned) else {
            return match current.phase() {
                SessionPhase::Expired => RequestOutcome::SessionExpired,
                _ => RequestOutcome::Unauthenticated,
            };
        };
        let Some(request) = replay else {
            return RequestOutcome::TransportError {
                cause: ApiError::NotRetryable,
            };
        };

        let response = match send(request, &token).await {
            Ok(response) => response,
            Err(cause) => return RequestOutcome::TransportError { cause },
        };

        match self.signals.classify(response.status()) {
            ResponseSignal::Ordinary => RequestOutcome::Success { response },
            ResponseSignal::LongTermExpiry => self.expire_session(current.generation(), &response),
            ResponseSignal::ShortTermExpiry => {
                warn!(
                    url = %response.url(),
                    status = %response.status(),
                    "Request rejected again with a freshly renewed token, clearing session"
                );
                self.state.expire(current.generation());
                RequestOutcome::SessionExpired
            }
        }
    }

    fn expire_session(&self, generation: u64, response: &Response) -> RequestOutcome {
        warn!(
            url = %response.url(),
            status = %response.status(),
            "Server reports refresh credential expired, clearing session"
        );
        self.state.expire(generation);
        RequestOutcome::SessionExpired
    }

    /// Join the refresh for this session, or start one if none is running.
    async fn refresh_coalesced(
        &self,
        stale_token: &str,
        generation: u64,
        seen_refreshes: u64,
    ) -> Recovery {
        loop {
            let action = {
                let mut slot = self.gate.lock();
                self.next_action(&mut slot, stale_token, generation, seen_refreshes)
            };
            match action {
                GateAction::TokenReplaced => return Recovery::TokenReplaced,
                GateAction::Reuse(outcome) => return Recovery::Refreshed(outcome),
                GateAction::Join(refresh) => return Recovery::Refreshed(refresh.await),
                GateAction::WaitForPrevious(refresh) => {
                    refresh.await;
                }
            }
        }
    }

    /// Decide under the gate lock, so a refresh cannot finish between the
    /// token check and the in-flight check.
    fn next_action(
        &self,
        slot: &mut GateSlot,
        stale_token: &str,
        generation: u64,
        seen_refreshes: u64,
    ) -> GateAction {
        if self.state.get().access_token() != Some(stale_token) {
            return GateAction::TokenReplaced;
        }

        if let Some(pending) = slot.in_flight.as_ref() {
            if pending.generation == generation {
                debug!(refresh_id = pending.id, "Joining in-flight token refresh");
                return GateAction::Join(pending.refresh.clone());
            }
            debug!(
                refresh_id = pending.id,
                "Waiting for refresh started by a previous session"
            );
            return GateAction::WaitForPrevious(pending.refresh.clone());
        }

        if slot.completed > seen_refreshes {
            if let Some(last) = slot.last.as_ref().filter(|l| l.generation == generation) {
                debug!("Refresh finished while the request was in flight, using its result");
                return GateAction::Reuse(last.outcome.clone());
            }
        }

        let id = self.gate.next_id.fetch_add(1, Ordering::Relaxed);
        self.state.begin_refresh(generation);
        let refresh = self.spawn_refresh(id, generation);
        slot.in_flight = Some(InFlight {
            id,
            generation,
            refresh: refresh.clone(),
        });
        GateAction::Join(refresh)
    }

    fn spawn_refresh(&self, id: u64, generation: u64) -> SharedRefresh {
        info!(refresh_id = id, "Starting token refresh");
        let this = self.clone();
        let task = tokio::spawn(async move {
            let mut release = FinishOnDrop {
                gate: Arc::clone(&this.gate),
                id,
                generation,
                outcome: None,
            };
            let outcome = this.refresher.refresh().await;
            this.apply_refresh(generation, &outcome);
            release.outcome = Some(outcome.clone());
            outcome
        });

        task.map(|joined| {
            joined.unwrap_or_else(|e| RefreshOutcome::TransientFailure {
                cause: Arc::new(ApiError::InvalidResponse(format!("Refresh task failed: {}", e))),
            })
        })
        .boxed()
        .shared()
    }

    /// Write a refresh result into the session it was started for.
    fn apply_refresh(&self, generation: u64, outcome: &RefreshOutcome) {
        match outcome {
            RefreshOutcome::Renewed { access_token } => {
                self.gate.reset_streak();
                if !self.state.renew(generation, access_token.clone()) {
                    debug!("Session changed during refresh, renewed token discarded");
                }
            }
            RefreshOutcome::LongTermExpired => {
                self.gate.reset_streak();
                self.state.expire(generation);
            }
            RefreshOutcome::TransientFailure { .. } => {
                let failures = self.gate.record_transient(generation);
                if self.max_transient_failures.is_some_and(|limit| failures >= limit) {
                    warn!(failures, "Too many consecutive refresh failures, expiring session");
                    self.gate.reset_streak();
                    self.state.expire(generation);
                } else {
                    self.state.end_refresh(generation);
                }
            }
        }
    }
}

async fn send(request: RequestBuilder, token: &str) -> Result<Response, ApiError> {
    Ok(request.bearer_auth(token).send().await?)
}
