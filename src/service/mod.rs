use std::sync::Arc;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::repository::Repository;
use crate::service::cleanup_service::CleanupOptions;
use crate::service::cleanup_service::CleanupService;
use crate::service::discovery_service::DiscoveryOptions;
use crate::service::discovery_service::DiscoveryService;
use crate::service::stats_service::StatsService;
use crate::sink::NotificationSink;

pub mod cleanup_service;
pub mod discovery_service;
pub mod error;
pub mod stats_service;

pub struct Services {
    pub discovery: Arc<DiscoveryService>,
    pub cleanup: Arc<CleanupService>,
    pub stats: Arc<StatsService>,
}

impl Services {
    pub fn new(
        config: &Config,
        db: Arc<Repository>,
        catalog: Arc<dyn Catalog>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let discovery_options = DiscoveryOptions {
            marker_retention: config.marker_retention,
            dedup_scope: config.dedup_scope,
            counter_retention: config.counter_retention,
        };
        let cleanup_options = CleanupOptions {
            max_failure_count: config.max_failure_count,
            prune_after: config.prune_after,
        };

        Self {
            discovery: Arc::new(DiscoveryService::new(
                db.clone(),
                catalog,
                sink,
                discovery_options,
            )),
            cleanup: Arc::new(CleanupService::new(db.clone(), cleanup_options)),
            stats: Arc::new(StatsService::new(db)),
        }
    }
}
