//! Common test utilities and mock implementations.

use std::collections::HashMap;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::TimeZone;
use chrono::Utc;
use livewatch::catalog::BaseCatalog;
use livewatch::catalog::Catalog;
use livewatch::catalog::CatalogInfo;
use livewatch::catalog::LiveItem;
use livewatch::catalog::error::CatalogError;
use livewatch::entity::DedupScope;
use livewatch::entity::MatchFilter;
use livewatch::entity::SubscriptionEntity;
use livewatch::repository::Repository;
use livewatch::repository::table::Table;
use livewatch::service::discovery_service::DiscoveryOptions;
use livewatch::service::discovery_service::DiscoveryService;
use livewatch::sink::DeliveryError;
use livewatch::sink::NotificationSink;
use uuid::Uuid;

/// Sets up a temporary test database.
pub async fn setup_db() -> (Arc<Repository>, PathBuf) {
    let uuid = Uuid::new_v4();
    let db_path = std::env::temp_dir().join(format!("livewatch-test-{}.db", uuid));
    let db_url = format!("sqlite://{}", db_path.to_str().unwrap());

    let db = Repository::new(&db_url, db_path.to_str().unwrap())
        .await
        .expect("Failed to create database");

    db.run_migrations().await.expect("Failed to run migrations");

    (Arc::new(db), db_path)
}

/// Cleans up the test database file.
pub async fn teardown_db(db_path: PathBuf) {
    if db_path.exists() {
        let _ = std::fs::remove_file(db_path);
    }
}

// FIXTURES

/// A live item with 100 viewers, English, tagged `English` and `Speedrun`.
#[allow(dead_code)]
pub fn live_item(id: &str, category_id: &str) -> LiveItem {
    LiveItem {
        id: id.to_string(),
        broadcaster_id: format!("user-{id}"),
        broadcaster_login: format!("streamer{id}"),
        broadcaster_name: format!("Streamer{id}"),
        category_id: category_id.to_string(),
        category_name: "Minecraft".to_string(),
        title: "Any% attempts".to_string(),
        viewer_count: 100,
        tags: vec!["English".to_string(), "Speedrun".to_string()],
        language: "en".to_string(),
        started_at: Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap(),
        thumbnail_url: format!(
            "https://static-cdn.jtvnw.net/previews-ttv/live_user_streamer{id}-{{width}}x{{height}}.jpg"
        ),
        url: format!("https://www.twitch.tv/streamer{id}"),
    }
}

/// Discord webhook URL with the given webhook id.
#[allow(dead_code)]
pub fn webhook(id: u64) -> String {
    format!("https://discord.com/api/webhooks/{id}/token-{id}")
}

/// Inserts a subscription and returns it as stored.
#[allow(dead_code)]
pub async fn create_subscription(
    db: &Repository,
    endpoint: &str,
    category_id: &str,
    filter: MatchFilter,
) -> SubscriptionEntity {
    let sub = SubscriptionEntity::new(endpoint, category_id, "Minecraft", filter);
    db.subscription
        .insert(&sub)
        .await
        .expect("Failed to insert subscription");
    sub
}

#[allow(dead_code)]
pub fn discovery_service(
    db: Arc<Repository>,
    catalog: Arc<dyn Catalog>,
    sink: Arc<dyn NotificationSink>,
    dedup_scope: DedupScope,
) -> DiscoveryService {
    DiscoveryService::new(
        db,
        catalog,
        sink,
        DiscoveryOptions {
            dedup_scope,
            ..Default::default()
        },
    )
}

// MOCK CATALOG

#[derive(Clone)]
#[allow(dead_code)]
pub struct MockCatalog {
    pub base: BaseCatalog,
    pub state: Arc<RwLock<MockCatalogState>>,
}

#[derive(Default)]
#[allow(dead_code)]
pub struct MockCatalogState {
    pub items: HashMap<String, Vec<LiveItem>>,
    pub failing: HashSet<String>,
    pub fetches: Vec<String>,
}

#[allow(dead_code)]
impl MockCatalog {
    pub fn new() -> Self {
        let info = CatalogInfo {
            name: "MockCatalog".to_string(),
            api_url: "https://api.example.com".to_string(),
            site_url: "https://example.com".to_string(),
            page_size: 100,
        };
        Self {
            base: BaseCatalog::new(info),
            state: Arc::new(RwLock::new(MockCatalogState::default())),
        }
    }

    pub fn set_items(&self, category_id: &str, items: Vec<LiveItem>) {
        self.state
            .write()
            .unwrap()
            .items
            .insert(category_id.to_string(), items);
    }

    pub fn fail_category(&self, category_id: &str) {
        self.state
            .write()
            .unwrap()
            .failing
            .insert(category_id.to_string());
    }

    pub fn fetches(&self) -> Vec<String> {
        self.state.read().unwrap().fetches.clone()
    }
}

#[async_trait]
impl Catalog for MockCatalog {
    async fn fetch_live_items(&self, category_id: &str) -> Result<Vec<LiveItem>, CatalogError> {
        let mut state = self.state.write().unwrap();
        state.fetches.push(category_id.to_string());
        if state.failing.contains(category_id) {
            return Err(CatalogError::ApiError {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }
        Ok(state.items.get(category_id).cloned().unwrap_or_default())
    }

    fn get_base(&self) -> &BaseCatalog {
        &self.base
    }
}

// RECORDING SINK

#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct RecordingSink {
    pub state: Arc<RwLock<RecordingSinkState>>,
}

#[derive(Default)]
#[allow(dead_code)]
pub struct RecordingSinkState {
    /// `(endpoint, item id)` of every successful delivery.
    pub delivered: Vec<(String, String)>,
    pub failing: HashSet<String>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_endpoint(&self, endpoint: &str) {
        self.state
            .write()
            .unwrap()
            .failing
            .insert(endpoint.to_string());
    }

    pub fn delivered(&self) -> Vec<(String, String)> {
        self.state.read().unwrap().delivered.clone()
    }

    pub fn delivered_to(&self, endpoint: &str) -> Vec<String> {
        self.delivered()
            .into_iter()
            .filter(|(e, _)| e == endpoint)
            .map(|(_, item)| item)
            .collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, endpoint: &str, item: &LiveItem) -> Result<(), DeliveryError> {
        let mut state = self.state.write().unwrap();
        if state.failing.contains(endpoint) {
            return Err(DeliveryError::Rejected {
                status: 404,
                body: r#"{"message": "Unknown Webhook", "code": 10015}"#.to_string(),
            });
        }
        state
            .delivered
            .push((endpoint.to_string(), item.id.clone()));
        Ok(())
    }

    async fn validate(&self, endpoint: &str) -> bool {
        !self.state.read().unwrap().failing.contains(endpoint)
    }
}
