//! Environment-driven configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::entity::DedupScope;
use crate::error::AppError;

/// Runtime configuration for livewatch.
///
/// [`Config::new`] yields defaults for everything that has one; [`Config::load`]
/// overlays values from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    pub db_url: String,
    pub db_path: String,
    pub logs_path: PathBuf,

    pub twitch_client_id: String,
    pub twitch_client_secret: String,
    pub twitch_api_url: String,
    pub twitch_auth_url: String,
    pub catalog_page_size: u32,

    pub discovery_interval: Duration,
    pub cleanup_interval: Duration,
    pub cycle_timeout: Duration,

    pub marker_retention: chrono::Duration,
    pub dedup_scope: DedupScope,
    pub max_failure_count: i32,
    pub prune_after: chrono::Duration,
    pub counter_retention: chrono::Duration,
}

impl Config {
    pub fn new() -> Self {
        Self {
            db_url: "sqlite://data/livewatch.db".to_string(),
            db_path: "data/livewatch.db".to_string(),
            logs_path: PathBuf::from("logs"),
            twitch_client_id: String::new(),
            twitch_client_secret: String::new(),
            twitch_api_url: "https://api.twitch.tv/helix".to_string(),
            twitch_auth_url: "https://id.twitch.tv/oauth2/token".to_string(),
            catalog_page_size: 100,
            discovery_interval: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(6 * 60 * 60),
            cycle_timeout: Duration::from_secs(240),
            marker_retention: chrono::Duration::days(7),
            dedup_scope: DedupScope::Global,
            max_failure_count: 10,
            prune_after: chrono::Duration::days(7),
            counter_retention: chrono::Duration::days(30),
        }
    }

    /// Reads configuration from the environment.
    pub fn load(&mut self) -> Result<(), AppError> {
        self.db_url = env_or("DB_URL", &self.db_url);
        self.db_path = env_or("DB_PATH", &self.db_path);
        self.logs_path = PathBuf::from(env_or("LOGS_PATH", &self.logs_path.to_string_lossy()));

        self.twitch_client_id = env_required("TWITCH_CLIENT_ID")?;
        self.twitch_client_secret = env_required("TWITCH_CLIENT_SECRET")?;
        self.twitch_api_url = env_or("TWITCH_API_URL", &self.twitch_api_url);
        self.twitch_auth_url = env_or("TWITCH_AUTH_URL", &self.twitch_auth_url);
        self.catalog_page_size = env_parse("CATALOG_PAGE_SIZE", self.catalog_page_size)?;

        self.discovery_interval = Duration::from_secs(env_parse(
            "DISCOVERY_INTERVAL",
            self.discovery_interval.as_secs(),
        )?);
        self.cleanup_interval =
            Duration::from_secs(env_parse("CLEANUP_INTERVAL", self.cleanup_interval.as_secs())?);
        self.cycle_timeout =
            Duration::from_secs(env_parse("CYCLE_TIMEOUT", self.cycle_timeout.as_secs())?);

        self.marker_retention = chrono::Duration::days(env_parse(
            "MARKER_RETENTION_DAYS",
            self.marker_retention.num_days(),
        )?);
        self.dedup_scope = env_parse("DEDUP_SCOPE", self.dedup_scope)?;
        self.max_failure_count = env_parse("MAX_FAILURE_COUNT", self.max_failure_count)?;
        self.prune_after =
            chrono::Duration::days(env_parse("PRUNE_AFTER_DAYS", self.prune_after.num_days())?);
        self.counter_retention = chrono::Duration::days(env_parse(
            "COUNTER_RETENTION_DAYS",
            self.counter_retention.num_days(),
        )?);

        for (key, value) in [
            ("DISCOVERY_INTERVAL", self.discovery_interval),
            ("CLEANUP_INTERVAL", self.cleanup_interval),
            ("CYCLE_TIMEOUT", self.cycle_timeout),
        ] {
            if value.is_zero() {
                return Err(AppError::InvalidConfig {
                    key: key.to_string(),
                    value: "0".to_string(),
                });
            }
        }
        for (key, value) in [
            ("MARKER_RETENTION_DAYS", self.marker_retention.num_days()),
            ("PRUNE_AFTER_DAYS", self.prune_after.num_days()),
            ("COUNTER_RETENTION_DAYS", self.counter_retention.num_days()),
            ("MAX_FAILURE_COUNT", i64::from(self.max_failure_count)),
        ] {
            if value <= 0 {
                return Err(AppError::InvalidConfig {
                    key: key.to_string(),
                    value: value.to_string(),
                });
            }
        }
        if self.catalog_page_size == 0 || self.catalog_page_size > 100 {
            return Err(AppError::InvalidConfig {
                key: "CATALOG_PAGE_SIZE".to_string(),
                value: self.catalog_page_size.to_string(),
            });
        }

        Ok(())
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_required(key: &str) -> Result<String, AppError> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(AppError::MissingConfig {
            key: key.to_string(),
        }),
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match std::env::var(key) {
        Ok(value) => value.trim().parse::<T>().map_err(|_| AppError::InvalidConfig {
            key: key.to_string(),
            value,
        }),
        Err(_) => Ok(default),
    }
}
