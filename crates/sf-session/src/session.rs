//! Session state shared by the HTTP client and the session controller
//!
//! [`SessionContext`] is the one owned, injectable holder of the in-memory session.
//! Every write goes to memory and the [`CredentialStore`] together under a single
//! lock, and every replacement or destruction of the session advances a
//! generation counter. Async work captures the generation when it starts and
//! applies its result only if the generation is unchanged, which is how responses
//! that outlive their session are discarded.

use crate::storage::CredentialStore;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use sf_common::{Identity, IdentityPatch, Role};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Credentials plus the identity they resolve to
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub identity: Identity,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("identity", &self.identity)
            .finish()
    }
}

/// Lifecycle of the session as seen by the rest of the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Startup, stored credentials not yet examined
    Unknown,
    /// Login or registration in flight
    Authenticating,
    Authenticated(Identity),
    Anonymous,
}

impl SessionState {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            SessionState::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }

    pub fn role(&self) -> Option<Role> {
        self.identity().map(|identity| identity.role)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, SessionState::Unknown)
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Unknown => "unknown",
            SessionState::Authenticating => "authenticating",
            SessionState::Authenticated(_) => "authenticated",
            SessionState::Anonymous => "anonymous",
        }
    }
}

/// Performs a forced navigation, e.g. after the session is terminated.
pub trait Navigator: Send + Sync {
    fn navigate(&self, target: &str);
}

/// Navigator that remembers every target it was sent to.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    history: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<String> {
        self.history.lock().clone()
    }

    pub fn last(&self) -> Option<String> {
        self.history.lock().last().cloned()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, target: &str) {
        debug!(target, "Navigating");
        self.history.lock().push(target.to_string());
    }
}

struct Inner {
    state: SessionState,
    session: Option<Session>,
    /// Session held aside while a credential exchange is in flight
    prior: Option<Session>,
    generation: u64,
}

/// Owned session state with one writer surface.
pub struct SessionContext {
    inner: RwLock<Inner>,
    store: CredentialStore,
    navigator: Arc<dyn Navigator>,
    login_route: String,
    state_tx: watch::Sender<SessionState>,
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("SessionContext")
            .field("state", &inner.state.name())
            .field("generation", &inner.generation)
            .field("login_route", &self.login_route)
            .finish()
    }
}

impl SessionContext {
    /// Create a context in the `Unknown` state.
    ///
    /// `login_route` is where a terminated session is sent.
    pub fn new(
        store: CredentialStore,
        navigator: Arc<dyn Navigator>,
        login_route: impl Into<String>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Unknown);
        Self {
            inner: RwLock::new(Inner {
                state: SessionState::Unknown,
                session: None,
                prior: None,
                generation: 0,
            }),
            store,
            navigator,
            login_route: login_route.into(),
            state_tx,
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn state(&self) -> SessionState {
        self.inner.read().state.clone()
    }

    /// Receive every state transition
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    pub fn session(&self) -> Option<Session> {
        self.inner.read().session.clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner
            .read()
            .session
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.inner
            .read()
            .session
            .as_ref()
            .and_then(|s| s.refresh_token.clone())
    }

    /// Adopt the stored session without verifying it.
    ///
    /// Returns the generation to verify against, or `None` (and `Anonymous`) when
    /// storage holds no complete session.
    pub fn restore(&self) -> Option<u64> {
        let stored = self.store.load();
        let mut inner = self.inner.write();
        inner.generation += 1;
        inner.prior = None;

        match stored {
            Some(session) => {
                let identity = session.identity.clone();
                inner.session = Some(session);
                self.transition(&mut inner, SessionState::Authenticated(identity));
                Some(inner.generation)
            }
            None => {
                if self.store.has_any_slot() {
                    debug!("Discarding incomplete stored session");
                    self.store.clear();
                }
                inner.session = None;
                self.transition(&mut inner, SessionState::Anonymous);
                None
            }
        }
    }

    /// Enter `Authenticating`.
    ///
    /// The current session is set aside: requests stop carrying its token, but
    /// storage keeps it until [`establish`](Self::establish) replaces it or
    /// [`fail_authentication`](Self::fail_authentication) reinstates it.
    pub fn begin_authentication(&self) -> u64 {
        let mut inner = self.inner.write();
        inner.generation += 1;
        if let Some(session) = inner.session.take() {
            inner.prior = Some(session);
        }
        self.transition(&mut inner, SessionState::Authenticating);
        inner.generation
    }

    /// Install a freshly exchanged session if `ticket` is still current.
    pub fn establish(&self, ticket: u64, session: Session) -> bool {
        let mut inner = self.inner.write();
        if inner.generation != ticket {
            debug!(ticket, current = inner.generation, "Discarding stale session exchange");
            return false;
        }
        self.store.save(&session);
        let identity = session.identity.clone();
        inner.prior = None;
        inner.session = Some(session);
        self.transition(&mut inner, SessionState::Authenticated(identity));
        true
    }

    /// Leave `Authenticating` after a rejected exchange, reinstating the
    /// session that was set aside, if any.
    pub fn fail_authentication(&self, ticket: u64) -> bool {
        let mut inner = self.inner.write();
        if inner.generation != ticket {
            return false;
        }
        match inner.prior.take() {
            Some(session) => {
                let identity = session.identity.clone();
                inner.session = Some(session);
                self.transition(&mut inner, SessionState::Authenticated(identity));
            }
            None => {
                self.store.clear();
                self.transition(&mut inner, SessionState::Anonymous);
            }
        }
        true
    }

    /// Replace the identity with an authoritative copy if `ticket` is still current.
    pub fn replace_identity(&self, ticket: u64, identity: Identity) -> bool {
        let mut inner = self.inner.write();
        if inner.generation != ticket {
            debug!(ticket, current = inner.generation, "Discarding stale identity");
            return false;
        }
        let Some(mut session) = inner.session.clone() else {
            return false;
        };
        session.identity = identity.clone();
        self.store.save(&session);
        inner.session = Some(session);
        self.transition(&mut inner, SessionState::Authenticated(identity));
        true
    }

    /// Merge a patch into the current identity; tokens are untouched.
    pub fn update_identity(&self, patch: IdentityPatch) -> Option<Identity> {
        let mut inner = self.inner.write();
        let mut session = inner.session.clone()?;
        session.identity.apply(patch);
        self.store.save(&session);
        let identity = session.identity.clone();
        inner.session = Some(session);
        self.transition(&mut inner, SessionState::Authenticated(identity.clone()));
        Some(identity)
    }

    /// Swap in a refreshed access token.
    ///
    /// Applies only while the session is the one that failed (same `ticket`) and
    /// still carries `expected`, the token that was rejected.
    pub fn rotate_access_token(&self, ticket: u64, expected: &str, access_token: String) -> bool {
        let mut inner = self.inner.write();
        if inner.generation != ticket {
            return false;
        }
        let Some(mut session) = inner.session.clone() else {
            return false;
        };
        if session.access_token != expected {
            return false;
        }
        session.access_token = access_token;
        self.store.save(&session);
        inner.session = Some(session);
        true
    }

    /// Destroy the session (logout).
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        self.destroy(&mut inner);
    }

    /// Destroy the session if `ticket` is still current. Used when startup
    /// verification rejects the stored session.
    pub fn invalidate(&self, ticket: u64) -> bool {
        let mut inner = self.inner.write();
        if inner.generation != ticket {
            return false;
        }
        self.destroy(&mut inner);
        true
    }

    /// Hard termination after a failed refresh: clear everything and force the
    /// login view. Ignored if the session already moved on from `ticket`.
    pub fn terminate(&self, ticket: u64) -> bool {
        {
            let mut inner = self.inner.write();
            if inner.generation != ticket {
                return false;
            }
            self.destroy(&mut inner);
        }
        warn!("Session terminated, signing out");
        self.navigator.navigate(&self.login_route);
        true
    }

    fn destroy(&self, inner: &mut Inner) {
        inner.generation += 1;
        inner.session = None;
        inner.prior = None;
        self.store.clear();
        self.transition(inner, SessionState::Anonymous);
    }

    fn transition(&self, inner: &mut Inner, next: SessionState) {
        if inner.state.name() != next.name() {
            info!(from = inner.state.name(), to = next.name(), "Session state changed");
        }
        inner.state = next.clone();
        self.state_tx.send_replace(next);
    }
}
