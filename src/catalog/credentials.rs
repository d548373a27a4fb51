//! App access token caching for catalog requests.

use std::sync::Arc;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use log::debug;
use log::info;
use serde::Deserialize;

use crate::catalog::error::CatalogError;

/// Tokens this close to expiry are treated as expired.
const REFRESH_MARGIN_SECS: i64 = 60;

/// A bearer token together with the instant it stops being valid.
#[derive(Clone, Debug, PartialEq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(REFRESH_MARGIN_SECS) < self.expires_at
    }
}

/// Somewhere new access tokens can be obtained from.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> Result<AccessToken, CatalogError>;
}

/// Lazily refreshed, shareable access token.
///
/// Readers only hold the lock long enough to clone the current `Arc`; a
/// refresh swaps in a new immutable token. Concurrent refreshes are collapsed
/// into one request.
pub struct CredentialCache {
    client_id: String,
    source: Arc<dyn TokenSource>,
    current: RwLock<Option<Arc<AccessToken>>>,
    refresh: tokio::sync::Mutex<()>,
}

impl CredentialCache {
    pub fn new(client_id: impl Into<String>, source: Arc<dyn TokenSource>) -> Self {
        Self {
            client_id: client_id.into(),
            source,
            current: RwLock::new(None),
            refresh: tokio::sync::Mutex::new(()),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns a fresh token, fetching a new one if the cached one expired.
    pub async fn token(&self) -> Result<Arc<AccessToken>, CatalogError> {
        if let Some(token) = self.cached()
            && token.is_fresh_at(Utc::now())
        {
            return Ok(token);
        }

        let _guard = self.refresh.lock().await;
        // Another caller may have refreshed while we waited.
        if let Some(token) = self.cached()
            && token.is_fresh_at(Utc::now())
        {
            return Ok(token);
        }

        debug!("Refreshing catalog access token.");
        let token = Arc::new(self.source.fetch_token().await?);
        self.swap(Some(token.clone()));
        info!("Refreshed catalog access token (expires {}).", token.expires_at);
        Ok(token)
    }

    /// Drops the cached token so the next [`token`](Self::token) call refreshes.
    pub fn invalidate(&self) {
        debug!("Invalidating cached catalog access token.");
        self.swap(None);
    }

    fn cached(&self) -> Option<Arc<AccessToken>> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn swap(&self, token: Option<Arc<AccessToken>>) {
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = token;
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// OAuth client-credentials grant against the platform's token endpoint.
pub struct ClientCredentials {
    client: wreq::Client,
    auth_url: String,
    client_id: String,
    client_secret: String,
}

impl ClientCredentials {
    pub fn new(
        auth_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self, CatalogError> {
        Ok(Self {
            client: wreq::Client::builder().build()?,
            auth_url: auth_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        })
    }
}

#[async_trait]
impl TokenSource for ClientCredentials {
    async fn fetch_token(&self) -> Result<AccessToken, CatalogError> {
        let requested_at = Utc::now();
        let url = wreq::Url::parse_with_params(
            &self.auth_url,
            &[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ],
        )
        .map_err(|e| CatalogError::RequestFailed(Box::new(e)))?;
        let response = self.client.post(url).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(CatalogError::Unauthorized {
                message: format!("token endpoint returned {status}: {body}"),
            });
        }

        let resp: TokenResponse = serde_json::from_str(&body)?;
        Ok(AccessToken {
            value: resp.access_token,
            expires_at: requested_at + Duration::seconds(resp.expires_in),
        })
    }
}
