//! Persistent records handled by the discovery engine.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::DateTime;
use chrono::Utc;
use derive_builder::Builder;
use serde::Deserialize;
use serde::Serialize;
use sqlx::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

/// Conjunctive rule set gating whether a live item is worth notifying about.
///
/// Every condition that is set must hold. An empty filter still requires at
/// least one viewer.
#[derive(Builder, Serialize, Deserialize, Default, Clone, Debug, PartialEq, Eq)]
#[builder(pattern = "immutable", default)]
pub struct MatchFilter {
    /// Tags that must all be present on the item (case-insensitive).
    #[serde(default)]
    #[builder(setter(into))]
    pub required_tags: Vec<String>,
    /// Language code the item must be broadcast in (case-insensitive).
    #[serde(default)]
    #[builder(setter(into, strip_option))]
    pub required_language: Option<String>,
    /// Minimum concurrent viewers. Unset means 1.
    #[serde(default)]
    #[builder(setter(strip_option))]
    pub minimum_viewers: Option<u64>,
}

/// A subscriber's binding of a webhook endpoint to a category and a filter.
///
/// Identity is `(owner_scope, id)`; the owner scope is derived from the
/// endpoint with [`owner_scope_for`].
#[derive(FromRow, Serialize, Default, Clone, Debug)]
pub struct SubscriptionEntity {
    pub id: String,
    pub owner_scope: String,
    /// Destination webhook URL.
    pub endpoint: String,
    /// Platform category (game) id this subscription tracks.
    pub category_id: String,
    pub category_name: String,
    pub filter: Json<MatchFilter>,
    pub created_at: DateTime<Utc>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    /// Consecutive failed deliveries. Reset to 0 by any successful delivery.
    pub failure_count: i32,
}

impl SubscriptionEntity {
    /// Creates a fresh subscription with a random id and no delivery history.
    pub fn new(
        endpoint: impl Into<String>,
        category_id: impl Into<String>,
        category_name: impl Into<String>,
        filter: MatchFilter,
    ) -> Self {
        let endpoint = endpoint.into();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            owner_scope: owner_scope_for(&endpoint),
            endpoint,
            category_id: category_id.into(),
            category_name: category_name.into(),
            filter: Json(filter),
            created_at: now,
            last_success_at: None,
            updated_at: now,
            failure_count: 0,
        }
    }

    /// Last successful delivery, or creation time if there never was one.
    pub fn last_alive_at(&self) -> DateTime<Utc> {
        self.last_success_at.unwrap_or(self.created_at)
    }
}

/// Derives the owner scope key of a destination endpoint.
///
/// Discord webhook URLs (`.../webhooks/{id}/{token}`) are scoped by their
/// webhook id so a rotated token keeps the same owner. Anything else is scoped
/// by the URL-safe base64 of the whole endpoint.
pub fn owner_scope_for(endpoint: &str) -> String {
    const MARKER: &str = "/webhooks/";

    if let Some(idx) = endpoint.find(MARKER)
        && let Some(id) = endpoint[idx + MARKER.len()..].split('/').next()
        && !id.is_empty()
        && id.chars().all(|c| c.is_ascii_digit())
    {
        return id.to_string();
    }

    URL_SAFE_NO_PAD.encode(endpoint.as_bytes())
}

/// Dedup marker: an item that already triggered notifications.
///
/// While `expires_at` (unix seconds) is in the future the item must not be
/// evaluated again.
#[derive(FromRow, Serialize, Default, Clone, Debug)]
pub struct DiscoveredEntity {
    /// Marker key, see [`DedupScope::marker_key`].
    pub item_key: String,
    pub item_id: String,
    pub category_id: String,
    pub broadcaster_id: String,
    pub discovered_at: DateTime<Utc>,
    pub expires_at: i64,
}

/// Granularity of dedup markers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupScope {
    /// One marker per item, shared by every subscription.
    #[default]
    Global,
    /// One marker per item and owner scope, so a subscription added later is
    /// still notified about an item others already saw.
    Subscription,
}

impl DedupScope {
    pub fn marker_key(&self, item_id: &str, owner_scope: &str) -> String {
        match self {
            DedupScope::Global => item_id.to_string(),
            DedupScope::Subscription => format!("{item_id}:{owner_scope}"),
        }
    }
}

impl FromStr for DedupScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "global" => Ok(DedupScope::Global),
            "subscription" => Ok(DedupScope::Subscription),
            other => Err(format!("unknown dedup scope `{other}`")),
        }
    }
}

impl fmt::Display for DedupScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DedupScope::Global => write!(f, "global"),
            DedupScope::Subscription => write!(f, "subscription"),
        }
    }
}

/// Metric tracked by the daily counters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, Default, PartialEq, Eq)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CounterKind {
    #[default]
    Success,
    Failure,
}

/// Per-day delivery outcome count.
#[derive(FromRow, Serialize, Default, Clone, Debug)]
pub struct DailyCounterEntity {
    pub kind: CounterKind,
    /// UTC date, `YYYY-MM-DD`.
    pub date: String,
    pub count: i64,
    pub updated_at: DateTime<Utc>,
    pub expires_at: i64,
}

/// Formats the counter date key of a timestamp.
pub fn counter_date(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}
