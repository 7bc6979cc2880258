//! Auth service client.
//!
//! Issues guest and credentialed logins and validates persisted tokens. The
//! reqwest-backed implementation also owns installing/clearing the bearer
//! credential on the shared [`HttpClient`], so the session layer never
//! touches HTTP plumbing directly.

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tableside_core::{Email, UserId};
use tracing::instrument;

use crate::api::{ApiError, HttpClient};
use crate::session::{IdentityKind, Session};

/// Remote auth service operations.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Create and log in as an anonymous guest user.
    async fn guest_login(&self) -> Result<Session, ApiError>;

    /// Log in with credentials.
    async fn login(&self, email: &Email, password: &SecretString) -> Result<Session, ApiError>;

    /// Look up the user behind `token`, rebuilding a session from it.
    async fn current_user(&self, token: &SecretString) -> Result<Session, ApiError>;

    /// Make `token` the credential for subsequent service calls.
    async fn adopt_token(&self, token: &SecretString);

    /// Drop the active credential.
    async fn revoke_token(&self);
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct UserPayload {
    id: i32,
    is_guest: bool,
}

#[derive(Debug, Deserialize)]
struct AuthPayload {
    access_token: String,
    user: UserPayload,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

impl AuthPayload {
    fn into_session(self) -> Session {
        Session {
            user_id: UserId::new(self.user.id),
            identity: if self.user.is_guest {
                IdentityKind::Anonymous
            } else {
                IdentityKind::Authenticated
            },
            token: SecretString::from(self.access_token),
        }
    }
}

// =============================================================================
// HTTP Implementation
// =============================================================================

/// Auth service client backed by the shared [`HttpClient`].
#[derive(Clone)]
pub struct HttpAuthApi {
    http: HttpClient,
}

impl HttpAuthApi {
    /// Create a new auth client.
    #[must_use]
    pub const fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    #[instrument(skip(self))]
    async fn guest_login(&self) -> Result<Session, ApiError> {
        let payload: AuthPayload = self
            .http
            .post("/api/users/guest-login", &serde_json::json!({}))
            .await?;
        Ok(payload.into_session())
    }

    #[instrument(skip(self, password), fields(email = %email))]
    async fn login(&self, email: &Email, password: &SecretString) -> Result<Session, ApiError> {
        use secrecy::ExposeSecret;

        let payload: AuthPayload = self
            .http
            .post(
                "/api/users/login",
                &LoginRequest {
                    email: email.as_str(),
                    password: password.expose_secret(),
                },
            )
            .await?;
        Ok(payload.into_session())
    }

    #[instrument(skip(self, token))]
    async fn current_user(&self, token: &SecretString) -> Result<Session, ApiError> {
        let user: UserPayload = self.http.get_with_token("/api/users/me", token).await?;
        Ok(Session {
            user_id: UserId::new(user.id),
            identity: if user.is_guest {
                IdentityKind::Anonymous
            } else {
                IdentityKind::Authenticated
            },
            token: token.clone(),
        })
    }

    async fn adopt_token(&self, token: &SecretString) {
        self.http.set_bearer(token).await;
    }

    async fn revoke_token(&self) {
        self.http.clear_bearer().await;
    }
}
