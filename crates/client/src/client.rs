//! Top-level client wiring.

use std::sync::Arc;

use secrecy::SecretString;
use tableside_core::Email;
use tracing::instrument;

use crate::api::{
    ApiError, HttpAuthApi, HttpCatalogApi, HttpClient, HttpOrderApi, HttpRatingsApi, RatingsApi,
};
use crate::cart::CartSync;
use crate::catalog::CatalogResolver;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::session::{FileTokenStore, MemoryTokenStore, Session, SessionManager, TokenStore};

/// The Tableside ordering client.
///
/// Wires the HTTP transport, session bootstrapper, catalog resolver, and
/// cart engine together over one shared connection pool. Cheap to clone.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    sessions: SessionManager,
    catalog: CatalogResolver,
    cart: CartSync,
    ratings: HttpRatingsApi,
}

impl Client {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying HTTP client cannot be
    /// constructed.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let http = HttpClient::new(config).map_err(ApiError::from)?;
        let retry = config.retry_policy();

        let store: Arc<dyn TokenStore> = match &config.token_file {
            Some(path) => Arc::new(FileTokenStore::new(path.clone())),
            None => Arc::new(MemoryTokenStore::default()),
        };
        let sessions = SessionManager::new(
            Arc::new(HttpAuthApi::new(http.clone())),
            store,
            retry,
        );
        let catalog = CatalogResolver::new(Arc::new(HttpCatalogApi::new(http.clone())), retry);
        let cart = CartSync::new(
            Arc::new(HttpOrderApi::new(http.clone())),
            sessions.clone(),
            catalog.clone(),
            retry,
        );

        Ok(Self {
            inner: Arc::new(ClientInner {
                sessions,
                catalog,
                cart,
                ratings: HttpRatingsApi::new(http),
            }),
        })
    }

    /// The cart synchronization engine.
    #[must_use]
    pub fn cart(&self) -> &CartSync {
        &self.inner.cart
    }

    /// The session manager.
    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.inner.sessions
    }

    /// The catalog resolver.
    #[must_use]
    pub fn catalog(&self) -> &CatalogResolver {
        &self.inner.catalog
    }

    /// The ratings and feedback service.
    #[must_use]
    pub fn ratings(&self) -> &impl RatingsApi {
        &self.inner.ratings
    }

    /// Log in with credentials. The local cart projection is dropped; the
    /// next read fetches the authenticated user's cart.
    ///
    /// # Errors
    ///
    /// Surfaces the auth service error for rejected credentials.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn login(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<Session, ClientError> {
        let session = self.inner.sessions.login(email, password).await?;
        self.inner.cart.reset().await;
        Ok(session)
    }

    /// Log out, discarding the session, persisted token, and local cart
    /// projection.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        self.inner.sessions.logout().await;
        self.inner.cart.reset().await;
    }
}
