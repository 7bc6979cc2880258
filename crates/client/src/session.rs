//! Session bootstrapping and persistence.
//!
//! Every basket mutation needs an identity before it may reach the network.
//! [`SessionManager::ensure_session`] returns the live session if one exists,
//! restores one from a persisted token, or performs exactly one remote guest
//! login no matter how many callers arrive concurrently: the session slot is
//! a fair async mutex held across the bootstrap await, so simultaneous
//! callers queue behind the single in-flight attempt and observe its result.

use std::path::PathBuf;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tableside_core::{Email, UserId};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::api::{ApiError, AuthApi};
use crate::error::ClientError;
use crate::retry::RetryPolicy;

/// How the session's identity was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentityKind {
    /// Transparent guest identity, bootstrapped on first use.
    Anonymous,
    /// Credentialed login.
    Authenticated,
}

/// An active identity. At most one is live per client instance.
#[derive(Debug, Clone)]
pub struct Session {
    /// The owning user.
    pub user_id: UserId,
    /// Anonymous or authenticated.
    pub identity: IdentityKind,
    /// Bearer credential for remote calls.
    pub token: SecretString,
}

// =============================================================================
// Token Persistence
// =============================================================================

/// Errors from the token store.
#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("token store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("token store parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Durable client-local storage for the session token, so a restart does not
/// force a fresh bootstrap while the token remains valid.
pub trait TokenStore: Send + Sync {
    /// Load the persisted token, if any.
    fn load(&self) -> Result<Option<String>, TokenStoreError>;
    /// Persist `token`, replacing any previous value.
    fn save(&self, token: &str) -> Result<(), TokenStoreError>;
    /// Remove the persisted token.
    fn clear(&self) -> Result<(), TokenStoreError>;
}

#[derive(Serialize, Deserialize)]
struct StoredToken {
    token: String,
}

/// Token store backed by a JSON file.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Create a store at `path`. The file is created on first save.
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<String>, TokenStoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => {
                let stored: StoredToken = serde_json::from_str(&raw)?;
                Ok(Some(stored.token))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, token: &str) -> Result<(), TokenStoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string(&StoredToken {
            token: token.to_string(),
        })?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), TokenStoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory token store for processes that opt out of persistence.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    slot: std::sync::Mutex<Option<String>>,
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<String>, TokenStoreError> {
        Ok(self.slot.lock().map_or(None, |slot| slot.clone()))
    }

    fn save(&self, token: &str) -> Result<(), TokenStoreError> {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(token.to_string());
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), TokenStoreError> {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = None;
        }
        Ok(())
    }
}

// =============================================================================
// SessionManager
// =============================================================================

/// Owns the single live [`Session`] and its bootstrap logic.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionManagerInner>,
}

struct SessionManagerInner {
    auth: Arc<dyn AuthApi>,
    store: Arc<dyn TokenStore>,
    retry: RetryPolicy,
    /// Fair mutex: holding it across the bootstrap await is what makes
    /// concurrent `ensure_session` calls single-flight.
    slot: Mutex<Option<Session>>,
}

impl SessionManager {
    /// Create a manager over the given auth service and token store.
    #[must_use]
    pub fn new(auth: Arc<dyn AuthApi>, store: Arc<dyn TokenStore>, retry: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(SessionManagerInner {
                auth,
                store,
                retry,
                slot: Mutex::new(None),
            }),
        }
    }

    /// The current session, if one is live. Never bootstraps.
    pub async fn current(&self) -> Option<Session> {
        self.inner.slot.lock().await.clone()
    }

    /// Return the live session, or establish one.
    ///
    /// Resolution order: live session, then a persisted token revalidated
    /// against the auth service, then a remote guest login through the retry
    /// executor.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::BootstrapFailed`] when no identity could be
    /// established; the caller must abandon its pending mutation.
    #[instrument(skip(self))]
    pub async fn ensure_session(&self) -> Result<Session, ClientError> {
        let mut slot = self.inner.slot.lock().await;

        if let Some(session) = slot.as_ref() {
            return Ok(session.clone());
        }

        if let Some(session) = self.restore_persisted(&mut slot).await {
            return Ok(session);
        }

        let auth = &self.inner.auth;
        match self.inner.retry.run(|| auth.guest_login()).await {
            Ok(session) => {
                info!(user_id = %session.user_id, "bootstrapped guest session");
                self.adopt(&mut slot, session.clone()).await;
                Ok(session)
            }
            Err(source) => {
                warn!(error = %source, "guest bootstrap failed");
                Err(ClientError::BootstrapFailed { source })
            }
        }
    }

    /// Try to rebuild a session from a persisted token.
    ///
    /// An auth-rejected token is cleared so it is not retried forever; any
    /// other failure just falls through to a guest bootstrap.
    async fn restore_persisted(&self, slot: &mut Option<Session>) -> Option<Session> {
        let raw = match self.inner.store.load() {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "could not read persisted token");
                return None;
            }
        };

        let token = SecretString::from(raw);
        let auth = &self.inner.auth;
        match self.inner.retry.run(|| auth.current_user(&token)).await {
            Ok(session) => {
                debug!(user_id = %session.user_id, "restored session from persisted token");
                self.adopt(slot, session.clone()).await;
                Some(session)
            }
            Err(ApiError::AuthExpired) => {
                debug!("persisted token rejected, discarding");
                if let Err(e) = self.inner.store.clear() {
                    warn!(error = %e, "could not clear persisted token");
                }
                None
            }
            Err(e) => {
                warn!(error = %e, "persisted token validation failed, falling back to guest");
                None
            }
        }
    }

    /// Log in with credentials, replacing any current session.
    ///
    /// Not retried: a rejected login is a terminal answer, not a transient
    /// failure.
    ///
    /// # Errors
    ///
    /// Surfaces the auth service error unchanged.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn login(&self, email: &Email, password: &SecretString) -> Result<Session, ClientError> {
        let mut slot = self.inner.slot.lock().await;
        let session = self.inner.auth.login(email, password).await?;
        info!(user_id = %session.user_id, "logged in");
        self.adopt(&mut slot, session.clone()).await;
        Ok(session)
    }

    /// Destroy the current session and persisted token.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        let mut slot = self.inner.slot.lock().await;
        if slot.take().is_some() {
            info!("logged out");
        }
        self.discard().await;
    }

    /// Invalidate the session after an authentication-rejected response.
    /// The next `ensure_session` call re-bootstraps.
    #[instrument(skip(self))]
    pub async fn invalidate(&self) {
        let mut slot = self.inner.slot.lock().await;
        if slot.take().is_some() {
            warn!("session invalidated by auth-rejected response");
        }
        self.discard().await;
    }

    /// Install `session` as the live identity and persist its token.
    async fn adopt(&self, slot: &mut Option<Session>, session: Session) {
        self.inner.auth.adopt_token(&session.token).await;
        // Persistence is best-effort; a failed write only costs a future
        // re-bootstrap.
        if let Err(e) = self.inner.store.save(session.token.expose_secret()) {
            warn!(error = %e, "could not persist session token");
        }
        *slot = Some(session);
    }

    async fn discard(&self) {
        self.inner.auth.revoke_token().await;
        if let Err(e) = self.inner.store.clear() {
            warn!(error = %e, "could not clear persisted token");
        }
    }
}
