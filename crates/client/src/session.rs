//! Session store: who is signed in.
//!
//! # States
//!
//! - `Unknown` until the startup profile request settles
//! - `Authenticated` with the identity returned by the server
//! - `Anonymous` when there is no valid session
//!
//! `Unknown` is only ever the initial state. Bootstrap moves out of it at
//! most once, and no operation publishes it again. Views and the cart
//! synchronizer observe changes through a `watch` channel.

use std::sync::Arc;

use shopfront_core::Identity;
use tokio::sync::{OnceCell, watch};
use tracing::{debug, info, instrument, warn};

use crate::api::{ApiClient, ApiError, Credentials, Registration};
use crate::error::{add_breadcrumb, clear_sentry_user, set_sentry_user};

/// Authentication state of the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Startup profile request has not settled yet.
    Unknown,
    /// Signed in.
    Authenticated(Identity),
    /// Not signed in.
    Anonymous,
}

impl SessionState {
    #[must_use]
    pub const fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    /// The signed-in identity, if any.
    #[must_use]
    pub const fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }
}

/// Holds the signed-in identity for the lifetime of the application.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<SessionStoreInner>,
}

struct SessionStoreInner {
    api: ApiClient,
    state: watch::Sender<SessionState>,
    bootstrap: OnceCell<()>,
}

impl SessionStore {
    /// Create a store in the `Unknown` state.
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        let (state, _) = watch::channel(SessionState::Unknown);
        Self {
            inner: Arc::new(SessionStoreInner {
                api,
                state,
                bootstrap: OnceCell::new(),
            }),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// Current identity, if signed in.
    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.inner.state.borrow().identity().cloned()
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Resolve the startup state from the server-side session.
    ///
    /// Only the first call makes a request; concurrent and later calls wait
    /// for it and return the state it settled on. The result is applied only
    /// if nothing signed in or out in the meantime.
    #[instrument(skip(self))]
    pub async fn bootstrap(&self) -> SessionState {
        self.inner
            .bootstrap
            .get_or_init(|| async {
                let resolved = match self.inner.api.profile().await {
                    Ok(identity) => SessionState::Authenticated(identity),
                    Err(e) => {
                        // No cookie or an expired one is the normal anonymous case.
                        debug!(error = %e, "No session to resume");
                        SessionState::Anonymous
                    }
                };

                let applied = self.inner.state.send_if_modified(|state| {
                    if state.is_unknown() {
                        *state = resolved.clone();
                        true
                    } else {
                        false
                    }
                });
                if applied && let SessionState::Authenticated(identity) = &resolved {
                    set_sentry_user(&identity.id, Some(identity.email.as_str()));
                    info!(user_id = %identity.id, "Session resumed");
                }
            })
            .await;

        self.state()
    }

    /// Wait until the state is no longer `Unknown`.
    pub async fn settled(&self) -> SessionState {
        let mut rx = self.subscribe();
        match rx.wait_for(|state| !state.is_unknown()).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        }
    }

    /// Sign in and publish the returned identity.
    ///
    /// Signing in while already signed in replaces the identity.
    ///
    /// # Errors
    ///
    /// Returns the API error unchanged; the state is left as it was.
    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    pub async fn login(&self, credentials: &Credentials) -> Result<Identity, ApiError> {
        let identity = self.inner.api.login(credentials).await?;

        set_sentry_user(&identity.id, Some(identity.email.as_str()));
        add_breadcrumb("auth", "Signed in", None);
        info!(user_id = %identity.id, "Signed in");

        self.inner
            .state
            .send_replace(SessionState::Authenticated(identity.clone()));
        Ok(identity)
    }

    /// Create an account, then sign in with the same credentials.
    ///
    /// # Errors
    ///
    /// Returns the registration error without attempting to sign in, or the
    /// sign-in error if the account was created but sign-in failed.
    #[instrument(skip(self, registration), fields(email = %registration.email))]
    pub async fn register(&self, registration: &Registration) -> Result<Identity, ApiError> {
        self.inner.api.register(registration).await?;
        add_breadcrumb("auth", "Registered", None);
        self.login(&registration.credentials()).await
    }

    /// Sign out.
    ///
    /// The local identity is cleared whether or not the server call works.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        if let Err(e) = self.inner.api.logout().await {
            warn!(error = %e, "Logout request failed, clearing local session anyway");
        }
        self.clear();
        add_breadcrumb("auth", "Signed out", None);
        info!("Signed out");
    }

    /// Drop a signed-in identity whose session the server no longer accepts.
    ///
    /// Makes no request. Does nothing unless currently authenticated.
    pub fn expire(&self) {
        if self.inner.state.borrow().is_authenticated() {
            warn!("Session expired");
            self.clear();
        }
    }

    fn clear(&self) {
        clear_sentry_user();
        self.inner.state.send_replace(SessionState::Anonymous);
    }
}
