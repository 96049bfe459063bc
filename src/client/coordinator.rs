// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Refresh Coordinator
//!
//! Serializes session refreshes across concurrently failing requests.
//!
//! ```text
//! Idle --(first 401)--> Refreshing{waiters} --(success | failure)--> Idle
//! ```
//!
//! - The first request to report a 401 starts the refresh; requests that
//!   report one while it runs join the waiter set.
//! - The refresh runs on its own task, so it always completes even if every
//!   waiting caller is dropped.
//! - The session store is updated before the state returns to `Idle`, and
//!   every waiter of a refresh receives that refresh's outcome.
//! - A request whose failed token is no longer the session's token is handed
//!   the current token without starting another refresh.
//! - The refreshed tokens are written only if the session is still the one
//!   that was refreshed. A login or logout during the refresh wins, and the
//!   waiters receive `Superseded`.
//! - On failure the session is cleared, again only if it is unchanged.
//!   Sending the user back to login is the caller's job.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::identity::{IdentityError, IdentityProvider};
use super::session::SessionStore;

/// Identifies one outbound call across its original send and replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    #[error("no session to refresh")]
    NoSession,

    #[error("refresh was refused: {0}")]
    Identity(#[from] IdentityError),

    #[error("refreshed session could not be stored: {0}")]
    Store(String),

    #[error("session was replaced while the refresh was in flight")]
    Superseded,

    #[error("refresh task ended without an outcome")]
    Abandoned,
}

type Outcome = Result<String, RefreshError>;

pub enum RefreshState {
    Idle,
    Refreshing {
        waiters: HashMap<RequestId, oneshot::Sender<Outcome>>,
    },
}

impl std::fmt::Debug for RefreshState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefreshState::Idle => f.write_str("Idle"),
            RefreshState::Refreshing { waiters } => f
                .debug_struct("Refreshing")
                .field("waiters", &waiters.len())
                .finish(),
        }
    }
}

fn lock(state: &Mutex<RefreshState>) -> MutexGuard<'_, RefreshState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct RefreshCoordinator {
    identity: Arc<dyn IdentityProvider>,
    session: Arc<dyn SessionStore>,
    state: Arc<Mutex<RefreshState>>,
    refreshes: AtomicUsize,
}

impl RefreshCoordinator {
    pub fn new(identity: Arc<dyn IdentityProvider>, session: Arc<dyn SessionStore>) -> Self {
        Self {
            identity,
            session,
            state: Arc::new(Mutex::new(RefreshState::Idle)),
            refreshes: AtomicUsize::new(0),
        }
    }

    /// Report that `request` was rejected while presenting `failed_token`,
    /// and wait for a usable access token.
    pub async fn refresh(&self, request: RequestId, failed_token: Option<&str>) -> Outcome {
        let (tx, rx) = oneshot::channel();

        let start = {
            let mut state = lock(&self.state);
            match &mut *state {
                RefreshState::Refreshing { waiters } => {
                    debug!(%request, waiters = waiters.len() + 1, "joined in-flight refresh");
                    waiters.insert(request, tx);
                    false
                }
                RefreshState::Idle => {
                    let Some(current) = self.session.get() else {
                        return Err(RefreshError::NoSession);
                    };
                    if failed_token != Some(current.access_token.as_str()) {
                        debug!(%request, "session already refreshed, reusing current token");
                        return Ok(current.access_token);
                    }
                    *state = RefreshState::Refreshing {
                        waiters: HashMap::from([(request, tx)]),
                    };
                    true
                }
            }
        };

        if start {
            self.spawn_refresh();
        }

        rx.await.unwrap_or(Err(RefreshError::Abandoned))
    }

    /// Number of refresh calls issued to the identity provider.
    pub fn refresh_calls(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*lock(&self.state), RefreshState::Refreshing { .. })
    }

    fn spawn_refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        let identity = Arc::clone(&self.identity);
        let session = Arc::clone(&self.session);
        let completion = Completion {
            state: Arc::clone(&self.state),
            released: false,
        };

        tokio::spawn(async move {
            let outcome = run_refresh(identity.as_ref(), session.as_ref()).await;
            completion.release(outcome);
        });
    }
}

async fn run_refresh(identity: &dyn IdentityProvider, session: &dyn SessionStore) -> Outcome {
    let Some(current) = session.get() else {
        return Err(RefreshError::NoSession);
    };
    info!("refreshing session");

    let outcome = match identity.refresh(&current.refresh_token).await {
        Ok(tokens) => {
            let next = tokens.into_session(&current);
            let access_token = next.access_token.clone();
            match session.replace_if_current(&current, Some(next)) {
                Ok(true) => Ok(access_token),
                Ok(false) => Err(RefreshError::Superseded),
                Err(e) => Err(RefreshError::Store(e.to_string())),
            }
        }
        Err(e) => Err(e.into()),
    };

    match &outcome {
        Ok(_) => info!("session refreshed"),
        Err(RefreshError::Superseded) => {
            info!("session changed during refresh, discarding refreshed tokens");
        }
        Err(e) => {
            warn!(error = %e, "session refresh failed, clearing session");
            match session.replace_if_current(&current, None) {
                Ok(true) => {}
                Ok(false) => debug!("session changed during refresh, leaving it in place"),
                Err(clear_err) => warn!(error = %clear_err, "failed to clear session"),
            }
        }
    }
    outcome
}

/// Returns the coordinator to `Idle` and releases the waiters exactly once,
/// with `Abandoned` if the refresh task dies first.
struct Completion {
    state: Arc<Mutex<RefreshState>>,
    released: bool,
}

impl Completion {
    fn release(mut self, outcome: Outcome) {
        self.release_with(outcome);
    }

    fn release_with(&mut self, outcome: Outcome) {
        self.released = true;
        let previous = std::mem::replace(&mut *lock(&self.state), RefreshState::Idle);
        if let RefreshState::Refreshing { waiters } = previous {
            debug!(waiters = waiters.len(), success = outcome.is_ok(), "releasing refresh waiters");
            for (_, waiter) in waiters {
                let _ = waiter.send(outcome.clone());
            }
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if !self.released {
            self.release_with(Err(RefreshError::Abandoned));
        }
    }
}
