//! Authentication state shared by every view: credential, cached user and
//! the broadcast channel of session events.
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::alert::Notifier;
use crate::api::CloudMailingApi;
use crate::credentials::{self, CredentialStore};
use crate::error::{ApiError, ApiResult};
use crate::model::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthEvent {
    LoginSuccess,
    LoginFailed,
    LogoutSuccess,
    SessionTimeout,
    NotAuthenticated,
    NotAuthorized,
}

impl AuthEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthEvent::LoginSuccess => "auth-login-success",
            AuthEvent::LoginFailed => "auth-login-failed",
            AuthEvent::LogoutSuccess => "auth-logout-success",
            AuthEvent::SessionTimeout => "auth-session-timeout",
            AuthEvent::NotAuthenticated => "auth-not-authenticated",
            AuthEvent::NotAuthorized => "auth-not-authorized",
        }
    }

    /// Event raised for a failed HTTP response, if any.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            401 => Some(AuthEvent::NotAuthenticated),
            403 => Some(AuthEvent::NotAuthorized),
            419 | 440 => Some(AuthEvent::SessionTimeout),
            _ => None,
        }
    }
}

/// Cloneable sender side of the session event channel.
#[derive(Debug, Clone)]
pub struct AuthEvents {
    tx: broadcast::Sender<AuthEvent>,
}

impl AuthEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: AuthEvent) {
        debug!(event = event.as_str(), "auth event");
        // no subscribers is fine
        let _ = self.tx.send(event);
    }
}

impl Default for AuthEvents {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticated,
    SessionExpired,
}

pub struct SessionContext {
    api: Arc<dyn CloudMailingApi>,
    store: Arc<dyn CredentialStore>,
    notifier: Arc<dyn Notifier>,
    events: AuthEvents,
    state: StdMutex<SessionState>,
    // held across the fetch so concurrent callers share one request
    user: Mutex<Option<User>>,
}

impl SessionContext {
    pub fn new(
        api: Arc<dyn CloudMailingApi>,
        store: Arc<dyn CredentialStore>,
        notifier: Arc<dyn Notifier>,
        events: AuthEvents,
    ) -> Self {
        Self {
            api,
            store,
            notifier,
            events,
            state: StdMutex::new(SessionState::Anonymous),
            user: Mutex::new(None),
        }
    }

    pub fn api(&self) -> &Arc<dyn CloudMailingApi> {
        &self.api
    }

    pub fn events(&self) -> &AuthEvents {
        &self.events
    }

    pub fn state(&self) -> SessionState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(SessionState::Anonymous)
    }

    fn set_state(&self, state: SessionState) {
        if let Ok(mut guard) = self.state.lock() {
            *guard = state;
        }
    }

    /// Reinstall a persisted credential so a new process stays logged in.
    #[instrument(skip_all)]
    pub async fn restore(&self) -> ApiResult<bool> {
        let Some(token) = self.store.load().await? else {
            return Ok(false);
        };
        match credentials::split_token(&token) {
            Ok((username, _)) => {
                self.api.set_authorization(Some(&token));
                self.set_state(SessionState::Authenticated);
                debug!(username, "restored persisted credential");
                Ok(true)
            }
            Err(err) => {
                warn!(%err, "discarding unreadable persisted credential");
                self.store.clear().await?;
                Ok(false)
            }
        }
    }

    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> ApiResult<User> {
        match self.api.authenticate(username, password).await {
            Ok(user) => {
                info!(username, "login success");
                self.set_credentials(username, password).await?;
                *self.user.lock().await = Some(user.clone());
                self.set_state(SessionState::Authenticated);
                self.events.emit(AuthEvent::LoginSuccess);
                Ok(user)
            }
            Err(err) => {
                error!(?err, username, "login error");
                self.events.emit(AuthEvent::LoginFailed);
                let reason = match (&err, err.detail()) {
                    (_, Some(detail)) => detail.to_string(),
                    (ApiError::NotAuthenticated, None) => format!(
                        "Authentication failed for {username}: username/password rejected by server."
                    ),
                    (other, None) => other.to_string(),
                };
                self.notifier.error(&format!("Login failed: {reason}"), None);
                Err(err)
            }
        }
    }

    #[instrument(skip_all)]
    pub async fn logout(&self) -> ApiResult<()> {
        self.api.logout().await?;
        self.clear_credentials().await?;
        self.events.emit(AuthEvent::LogoutSuccess);
        Ok(())
    }

    pub async fn set_credentials(&self, username: &str, password: &str) -> ApiResult<()> {
        let token = credentials::basic_token(username, password);
        self.api.set_authorization(Some(&token));
        self.store.save(&token).await?;
        Ok(())
    }

    pub async fn clear_credentials(&self) -> ApiResult<()> {
        info!("clear credentials");
        self.store.clear().await?;
        *self.user.lock().await = None;
        self.api.set_authorization(None);
        self.set_state(SessionState::Anonymous);
        Ok(())
    }

    /// Current user, fetched on first access and memoized until invalidated.
    pub async fn current_user(&self) -> ApiResult<User> {
        let mut cached = self.user.lock().await;
        if let Some(user) = cached.as_ref() {
            return Ok(user.clone());
        }
        match self.api.current_user().await {
            Ok(user) => {
                *cached = Some(user.clone());
                drop(cached);
                self.set_state(SessionState::Authenticated);
                Ok(user)
            }
            Err(err) => {
                drop(cached);
                if let Some(status) = err.status() {
                    self.handle_status(status).await;
                }
                Err(err)
            }
        }
    }

    pub fn is_admin(user: &User) -> bool {
        user.is_superuser
    }

    /// Apply the session consequences of a failed response status.
    pub async fn handle_status(&self, status: u16) {
        let Some(event) = AuthEvent::from_status(status) else {
            return;
        };
        self.apply_event(event).await;
    }

    async fn apply_event(&self, event: AuthEvent) {
        match event {
            AuthEvent::NotAuthenticated | AuthEvent::NotAuthorized => {
                *self.user.lock().await = None;
                self.set_state(SessionState::Anonymous);
            }
            AuthEvent::SessionTimeout => {
                *self.user.lock().await = None;
                self.set_state(SessionState::SessionExpired);
            }
            _ => {}
        }
    }

    /// Follow the event channel so failures seen by any view invalidate the session.
    pub fn spawn_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let session = Arc::clone(self);
        let mut rx = self.events.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => session.apply_event(event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "session listener lagged behind auth events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
