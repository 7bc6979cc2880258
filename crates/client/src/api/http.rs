//! Shared HTTP plumbing for the service clients.
//!
//! One `HttpClient` is built per [`crate::Client`] and cloned into each
//! service. It owns the base URL, the bearer-token slot, and the mapping from
//! HTTP status codes to [`ApiError`] kinds.

use std::sync::Arc;

use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::error;

use crate::api::ApiError;
use crate::config::ClientConfig;

/// HTTP client shared by all Tableside service clients.
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<HttpClientInner>,
}

struct HttpClientInner {
    client: reqwest::Client,
    /// Base URL with any trailing slash trimmed.
    base: String,
    /// In-memory bearer credential, installed by the auth client.
    bearer: RwLock<Option<SecretString>>,
}

impl HttpClient {
    /// Create a new client from configuration.
    ///
    /// # Errors
    ///
    /// Returns the underlying builder error if the TLS backend cannot be
    /// initialized.
    pub fn new(config: &ClientConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(HttpClientInner {
                client,
                base: config.api_url.as_str().trim_end_matches('/').to_string(),
                bearer: RwLock::new(None),
            }),
        })
    }

    /// Install a bearer credential for subsequent requests.
    pub async fn set_bearer(&self, token: &SecretString) {
        *self.inner.bearer.write().await = Some(token.clone());
    }

    /// Drop the active bearer credential.
    pub async fn clear_bearer(&self) {
        *self.inner.bearer.write().await = None;
    }

    /// GET a JSON resource.
    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request(Method::GET, path, None::<&()>, None).await
    }

    /// GET a JSON resource with an explicit token instead of the installed
    /// bearer (used to validate a persisted token before adopting it).
    pub(crate) async fn get_with_token<T: DeserializeOwned>(
        &self,
        path: &str,
        token: &SecretString,
    ) -> Result<T, ApiError> {
        self.request(Method::GET, path, None::<&()>, Some(token))
            .await
    }

    /// POST a JSON body, expecting a JSON response.
    pub(crate) async fn post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.request(Method::POST, path, Some(body), None).await
    }

    /// PUT a JSON body, expecting a JSON response.
    pub(crate) async fn put<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.request(Method::PUT, path, Some(body), None).await
    }

    /// DELETE, expecting a JSON response.
    pub(crate) async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request(Method::DELETE, path, None::<&()>, None).await
    }

    /// DELETE, ignoring any response body.
    pub(crate) async fn delete_no_content(&self, path: &str) -> Result<(), ApiError> {
        let response = self.send(Method::DELETE, path, None::<&()>, None).await?;
        check_status(response).await.map(|_| ())
    }

    async fn request<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        token_override: Option<&SecretString>,
    ) -> Result<T, ApiError> {
        let response = self.send(method, path, body, token_override).await?;
        let response = check_status(response).await?;

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            error!(
                error = %e,
                body = %text.chars().take(500).collect::<String>(),
                "failed to parse response body"
            );
            ApiError::Parse(e)
        })
    }

    async fn send<B: Serialize + Sync>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        token_override: Option<&SecretString>,
    ) -> Result<reqwest::Response, ApiError> {
        let url = format!("{}{}", self.inner.base, path);
        let mut builder = self.inner.client.request(method, url);

        if let Some(token) = token_override {
            builder = builder.bearer_auth(token.expose_secret());
        } else if let Some(token) = self.inner.bearer.read().await.as_ref() {
            builder = builder.bearer_auth(token.expose_secret());
        }

        if let Some(body) = body {
            builder = builder.json(body);
        }

        Ok(builder.send().await?)
    }
}

/// Map a non-success status to the error taxonomy.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = error_detail(&body);

    Err(match status.as_u16() {
        401 | 403 => ApiError::AuthExpired,
        404 => ApiError::NotFound(message),
        s if s >= 500 => ApiError::Server { status: s, message },
        s => ApiError::Validation { status: s, message },
    })
}

/// Extract the `detail` field the API puts in error bodies, falling back to
/// the (truncated) raw body.
fn error_detail(body: &str) -> String {
    #[derive(serde::Deserialize)]
    struct Detail {
        detail: String,
    }

    serde_json::from_str::<Detail>(body).map_or_else(
        |_| body.chars().take(200).collect(),
        |parsed| parsed.detail,
    )
}
