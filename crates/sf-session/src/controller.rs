//! Session Controller
//!
//! Owns the login, registration, logout and identity operations. All state
//! changes go through [`SessionContext`], network calls through [`HttpClient`].

use crate::api::{
    AuthResponse, LoginRequest, RegistrationForm, LOGIN_PATH, LOGOUT_PATH, PROFILE_PATH,
    REGISTER_PATH,
};
use crate::error::{Error, Result};
use crate::http::{HttpClient, RequestOptions};
use crate::session::{Navigator, SessionContext, SessionState};
use crate::storage::{CredentialStore, KeyValueStorage};
use reqwest::Method;
use serde_json::Value;
use sf_common::{Identity, IdentityPatch};
use sf_config::ConsoleConfig;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const LOGIN_FAILED: &str = "Login failed";
const REGISTRATION_FAILED: &str = "Registration failed";

/// Login, registration, logout and identity management
#[derive(Debug, Clone)]
pub struct SessionController {
    context: Arc<SessionContext>,
    http: Arc<HttpClient>,
}

impl SessionController {
    pub fn new(context: Arc<SessionContext>, http: Arc<HttpClient>) -> Self {
        Self { context, http }
    }

    /// Assemble context, HTTP client and controller from configuration.
    pub fn from_config(
        config: &ConsoleConfig,
        storage: Arc<dyn KeyValueStorage>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self> {
        let context = Arc::new(SessionContext::new(
            CredentialStore::new(storage),
            navigator,
            config.routes.login.as_str(),
        ));
        let http = Arc::new(HttpClient::new(&config.api, context.clone())?);
        Ok(Self::new(context, http))
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.context
    }

    /// Client for application requests made under this session
    pub fn http(&self) -> &Arc<HttpClient> {
        &self.http
    }

    pub fn state(&self) -> SessionState {
        self.context.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.context.subscribe()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.context.state().identity().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.context.state().is_authenticated()
    }

    pub fn is_admin(&self) -> bool {
        self.context.state().role().is_some_and(|r| r.is_admin())
    }

    pub fn is_vendor(&self) -> bool {
        self.context.state().role().is_some_and(|r| r.is_vendor())
    }

    pub fn is_support(&self) -> bool {
        self.context.state().role().is_some_and(|r| r.is_support())
    }

    pub fn is_user(&self) -> bool {
        self.context.state().role().is_some_and(|r| r.is_user())
    }

    /// Restore the stored session and verify it before returning.
    pub async fn bootstrap(&self) -> SessionState {
        if let Some(ticket) = self.context.restore() {
            self.verify(ticket).await;
        }
        self.context.state()
    }

    /// Restore the stored session now and verify it in the background.
    ///
    /// The state is `Authenticated` or `Anonymous` as soon as this returns; the
    /// handle resolves once verification has confirmed or cleared it.
    pub fn spawn_bootstrap(&self) -> JoinHandle<SessionState> {
        let ticket = self.context.restore();
        let controller = self.clone();
        tokio::spawn(async move {
            if let Some(ticket) = ticket {
                controller.verify(ticket).await;
            }
            controller.context.state()
        })
    }

    async fn verify(&self, ticket: u64) {
        match self.fetch_profile().await {
            Ok(identity) => {
                if self.context.replace_identity(ticket, identity) {
                    debug!("Stored session verified");
                }
            }
            Err(e) => {
                warn!(error = %e, "Stored session rejected, signing out");
                self.context.invalidate(ticket);
            }
        }
    }

    /// Exchange credentials for a session.
    ///
    /// On rejection the session is left as it was and the error carries the
    /// API's message, or a generic one.
    pub async fn login(&self, email: &str, password: &str) -> Result<Identity> {
        let body = serde_json::to_value(LoginRequest { email, password })?;
        self.exchange(LOGIN_PATH, body, LOGIN_FAILED).await
    }

    /// Create an account and sign in with it.
    pub async fn register(&self, form: &RegistrationForm) -> Result<Identity> {
        let body = serde_json::to_value(form)?;
        self.exchange(REGISTER_PATH, body, REGISTRATION_FAILED).await
    }

    async fn exchange(&self, path: &str, body: Value, fallback: &str) -> Result<Identity> {
        let ticket = self.context.begin_authentication();

        let outcome = match self
            .http
            .request(Method::POST, path, Some(&body), &RequestOptions::default())
            .await
        {
            Ok(response) => response.into_json::<AuthResponse>(),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(auth) => {
                let session = auth.into_session();
                let identity = session.identity.clone();
                if !self.context.establish(ticket, session) {
                    return Err(Error::Superseded);
                }
                info!(user_id = %identity.id, role = %identity.role, "Signed in");
                Ok(identity)
            }
            Err(e) => {
                if !self.context.fail_authentication(ticket) {
                    return Err(Error::Superseded);
                }
                let message = match &e {
                    Error::Http(_) | Error::Json(_) => fallback.to_string(),
                    other => other.api_message().unwrap_or(fallback).to_string(),
                };
                debug!(path, error = %e, "Credential exchange rejected");
                Err(Error::Credentials(message))
            }
        }
    }

    /// Sign out. Never fails: the API is notified best-effort, then the session
    /// is cleared regardless.
    pub async fn logout(&self) {
        if self.context.access_token().is_some() {
            if let Err(e) = self
                .http
                .request(Method::POST, LOGOUT_PATH, None, &RequestOptions::default())
                .await
            {
                debug!(error = %e, "Logout notification failed, ignoring");
            }
        }
        self.context.clear();
        info!("Signed out");
    }

    /// Re-read the identity from the API, e.g. after an admin changed it.
    pub async fn refresh_identity(&self) -> Result<Identity> {
        if !self.context.state().is_authenticated() {
            return Err(Error::NotAuthenticated);
        }
        let ticket = self.context.generation();
        let identity = self.fetch_profile().await?;
        if self.context.replace_identity(ticket, identity.clone()) {
            Ok(identity)
        } else {
            Err(Error::Superseded)
        }
    }

    /// Merge confirmed profile changes into the session without a network call.
    pub fn update_identity(&self, patch: IdentityPatch) -> Result<Identity> {
        self.context
            .update_identity(patch)
            .ok_or(Error::NotAuthenticated)
    }

    async fn fetch_profile(&self) -> Result<Identity> {
        self.http.get_json(PROFILE_PATH).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::RecordingNavigator;
    use crate::storage::tests::session;
    use sf_common::Role;

    fn controller() -> SessionController {
        let context = Arc::new(SessionContext::new(
            CredentialStore::in_memory(),
            Arc::new(RecordingNavigator::new()),
            "/login",
        ));
        // Nothing listens here; tests below never reach the network.
        let http = Arc::new(HttpClient::with_client(
            reqwest::Client::new(),
            "http://127.0.0.1:9",
            context.clone(),
        ));
        SessionController::new(context, http)
    }

    #[test]
    fn test_role_predicates_follow_identity() {
        let controller = controller();
        assert!(!controller.is_user());

        let ticket = controller.context().begin_authentication();
        controller.context().establish(ticket, session(Role::User));
        assert!(controller.is_user());
        assert!(!controller.is_admin());

        controller
            .update_identity(IdentityPatch {
                role: Some(Role::Admin),
                ..Default::default()
            })
            .unwrap();
        assert!(controller.is_admin());
        assert!(!controller.is_user());
    }

    #[test]
    fn test_update_identity_requires_session() {
        let controller = controller();
        assert!(matches!(
            controller.update_identity(IdentityPatch::default()),
            Err(Error::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn test_bootstrap_with_empty_store_is_anonymous() {
        let controller = controller();
        assert_eq!(controller.bootstrap().await, SessionState::Anonymous);
    }

    #[tokio::test]
    async fn test_refresh_identity_requires_session() {
        let controller = controller();
        assert!(matches!(
            controller.refresh_identity().await,
            Err(Error::NotAuthenticated)
        ));
    }
}
