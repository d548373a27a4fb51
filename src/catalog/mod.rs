//! Content catalog clients: where live items come from.

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::catalog::error::CatalogError;

pub mod credentials;
pub mod error;
pub mod twitch_catalog;

/// Static description of a catalog backend.
#[derive(Clone, Debug)]
pub struct CatalogInfo {
    /// Human readable name, e.g. "Twitch".
    pub name: String,
    /// Base URL of the API, e.g. `https://api.twitch.tv/helix`.
    pub api_url: String,
    /// Public site the item links point to.
    pub site_url: String,
    /// Maximum number of live items requested per category.
    pub page_size: u32,
}

/// State shared by every catalog implementation.
#[derive(Clone)]
pub struct BaseCatalog {
    pub info: CatalogInfo,
}

impl BaseCatalog {
    pub fn new(info: CatalogInfo) -> Self {
        Self { info }
    }
}

/// Snapshot of a live item as returned by a catalog query.
///
/// Transient: lives for a single discovery cycle.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveItem {
    pub id: String,
    pub broadcaster_id: String,
    pub broadcaster_login: String,
    pub broadcaster_name: String,
    pub category_id: String,
    pub category_name: String,
    pub title: String,
    pub viewer_count: u64,
    pub tags: Vec<String>,
    pub language: String,
    pub started_at: DateTime<Utc>,
    /// URL template containing `{width}` and `{height}` placeholders.
    pub thumbnail_url: String,
    /// Link to watch the item.
    pub url: String,
}

impl LiveItem {
    /// Thumbnail URL rendered at the given size.
    pub fn thumbnail(&self, width: u32, height: u32) -> String {
        self.thumbnail_url
            .replace("{width}", &width.to_string())
            .replace("{height}", &height.to_string())
    }
}

/// A source of live items grouped by category.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Fetches up to one page of live items for a category.
    async fn fetch_live_items(&self, category_id: &str) -> Result<Vec<LiveItem>, CatalogError>;

    fn get_base(&self) -> &BaseCatalog;

    fn get_info(&self) -> &CatalogInfo {
        &self.get_base().info
    }
}
