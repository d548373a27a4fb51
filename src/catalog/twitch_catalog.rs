//! Twitch Helix catalog integration.

use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use governor::Quota;
use governor::RateLimiter;
use governor::clock::QuantaClock;
use governor::state::InMemoryState;
use governor::state::direct::NotKeyed;
use log::debug;
use log::info;
use log::warn;
use serde_json::Value;
use wreq::StatusCode;
use wreq::header::AUTHORIZATION;

use crate::catalog::BaseCatalog;
use crate::catalog::Catalog;
use crate::catalog::CatalogInfo;
use crate::catalog::LiveItem;
use crate::catalog::credentials::CredentialCache;
use crate::catalog::error::CatalogError;

// See https://dev.twitch.tv/docs/api/guide/#twitch-rate-limits
// App access tokens get a bucket of 800 points per minute, one point per request.
const HELIX_POINTS_PER_MINUTE: NonZeroU32 = NonZeroU32::new(800).unwrap();

/// Live streams of a game/category, read from `GET /streams`.
pub struct TwitchCatalog {
    pub base: BaseCatalog,
    client: wreq::Client,
    credentials: Arc<CredentialCache>,
    limiter: RateLimiter<NotKeyed, InMemoryState, QuantaClock>,
}

impl TwitchCatalog {
    pub fn new(
        api_url: impl Into<String>,
        page_size: u32,
        credentials: Arc<CredentialCache>,
    ) -> Result<Self, CatalogError> {
        let info = CatalogInfo {
            name: "Twitch".to_string(),
            api_url: api_url.into(),
            site_url: "https://www.twitch.tv".to_string(),
            page_size,
        };
        info!(
            "Initializing {} catalog at {} (page size {}).",
            info.name, info.api_url, info.page_size
        );

        Ok(Self {
            base: BaseCatalog::new(info),
            client: wreq::Client::builder().build()?,
            credentials,
            limiter: RateLimiter::direct(Quota::per_minute(HELIX_POINTS_PER_MINUTE)),
        })
    }

    async fn send(&self, request: wreq::RequestBuilder) -> Result<wreq::Response, wreq::Error> {
        if self.limiter.check().is_err() {
            info!("Catalog {} is ratelimited. Waiting...", self.base.info.name);
        }
        self.limiter.until_ready().await;

        let req = request.build()?;
        debug!("Making request to: {}", req.url());
        self.client.execute(req).await
    }

    /// Helix category ids are numeric; anything else would just yield an API error.
    fn validate_category_id(category_id: &str) -> Result<(), CatalogError> {
        if category_id.is_empty() || !category_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(CatalogError::InvalidCategoryId {
                category_id: category_id.to_string(),
            });
        }
        Ok(())
    }

    fn extract_error_message(body: &str) -> String {
        serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
            .unwrap_or_else(|| body.to_string())
    }

    fn get_str(stream: &Value, field: &str) -> Result<String, CatalogError> {
        stream
            .get(field)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| CatalogError::MissingField {
                field: format!("data[].{field}"),
            })
    }

    fn get_tags(stream: &Value) -> Vec<String> {
        // `tags` is null for streams without any.
        stream
            .get("tags")
            .and_then(|v| v.as_array())
            .map(|tags| {
                tags.iter()
                    .filter_map(|t| t.as_str())
                    .map(|t| t.to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn parse_stream(&self, stream: &Value) -> Result<LiveItem, CatalogError> {
        let started_at_str = Self::get_str(stream, "started_at")?;
        let started_at = DateTime::parse_from_rfc3339(&started_at_str)
            .map_err(|_| CatalogError::InvalidTime {
                time: started_at_str.clone(),
            })?
            .with_timezone(&Utc);

        let viewer_count = stream
            .get("viewer_count")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| CatalogError::MissingField {
                field: "data[].viewer_count".to_string(),
            })?;

        let broadcaster_login = Self::get_str(stream, "user_login")?;
        let url = format!("{}/{}", self.base.info.site_url, broadcaster_login);

        Ok(LiveItem {
            id: Self::get_str(stream, "id")?,
            broadcaster_id: Self::get_str(stream, "user_id")?,
            broadcaster_name: Self::get_str(stream, "user_name")?,
            broadcaster_login,
            category_id: Self::get_str(stream, "game_id")?,
            category_name: Self::get_str(stream, "game_name").unwrap_or_default(),
            title: Self::get_str(stream, "title").unwrap_or_default(),
            viewer_count,
            tags: Self::get_tags(stream),
            language: Self::get_str(stream, "language").unwrap_or_default(),
            started_at,
            thumbnail_url: Self::get_str(stream, "thumbnail_url").unwrap_or_default(),
            url,
        })
    }
}

#[async_trait]
impl Catalog for TwitchCatalog {
    async fn fetch_live_items(&self, category_id: &str) -> Result<Vec<LiveItem>, CatalogError> {
        debug!(
            "Fetching live items from {} for category_id: {category_id}",
            self.base.info.name
        );
        Self::validate_category_id(category_id)?;

        let token = self.credentials.token().await?;
        let request = self
            .client
            .get(format!(
                "{}/streams?game_id={category_id}&first={}&type=live",
                self.base.info.api_url, self.base.info.page_size
            ))
            .header("Client-Id", self.credentials.client_id())
            .header(AUTHORIZATION, format!("Bearer {}", token.value));

        let response = self.send(request).await?;
        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::UNAUTHORIZED {
            warn!("Catalog rejected the access token, it will be refreshed on next use.");
            self.credentials.invalidate();
        }
        if !status.is_success() {
            return Err(CatalogError::ApiError {
                status: status.as_u16(),
                message: Self::extract_error_message(&body),
            });
        }

        let resp: Value = serde_json::from_str(&body)?;
        let streams = resp
            .get("data")
            .and_then(|v| v.as_array())
            .ok_or_else(|| CatalogError::MissingField {
                field: "data".to_string(),
            })?;

        let items: Vec<LiveItem> = streams
            .iter()
            .filter_map(|stream| match self.parse_stream(stream) {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!("Skipping malformed stream in category_id {category_id}: {e}");
                    None
                }
            })
            .collect();
        debug!(
            "Fetched {} live items for category_id: {category_id}",
            items.len()
        );
        Ok(items)
    }

    fn get_base(&self) -> &BaseCatalog {
        &self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_category_id() {
        assert!(TwitchCatalog::validate_category_id("509658").is_ok());
        assert!(TwitchCatalog::validate_category_id("").is_err());
        assert!(TwitchCatalog::validate_category_id("50&first=1").is_err());
    }

    #[test]
    fn test_extract_error_message() {
        assert_eq!(
            TwitchCatalog::extract_error_message(
                r#"{"error":"Unauthorized","status":401,"message":"Invalid OAuth token"}"#
            ),
            "Invalid OAuth token"
        );
        assert_eq!(TwitchCatalog::extract_error_message("oops"), "oops");
    }

    #[test]
    fn test_get_tags_null() {
        let stream = serde_json::json!({ "tags": null });
        assert!(TwitchCatalog::get_tags(&stream).is_empty());
    }
}
