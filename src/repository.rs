//! Database module with SQLite storage and SQLx.

use std::str::FromStr;

use log::debug;
use log::info;
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;

use crate::repository::error::DatabaseError;
use crate::repository::table::DailyCounterTable;
use crate::repository::table::DiscoveredTable;
use crate::repository::table::SubscriptionTable;
use crate::repository::table::TableBase;

pub mod error;
pub mod table;

/// Main database struct containing all table handlers.
pub struct Repository {
    pub pool: SqlitePool,
    pub subscription: SubscriptionTable,
    pub discovered: DiscoveredTable,
    pub daily_counter: DailyCounterTable,
}

impl Repository {
    /// Creates a new database connection and initializes table handlers.
    pub async fn new(db_url: &str, db_path: &str) -> anyhow::Result<Self> {
        let path = std::path::Path::new(db_path);
        if !path.exists() {
            debug!("Database path {db_path} does not exist. Creating...");
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, "")?;
            info!("Created {db_path}");
        }

        debug!("Connecting to db...");
        let opts = SqliteConnectOptions::from_str(db_url)?.foreign_keys(true);
        let pool = SqlitePool::connect_with(opts).await?;
        info!("Connected to db.");

        Ok(Self {
            subscription: SubscriptionTable::new(pool.clone()),
            discovered: DiscoveredTable::new(pool.clone()),
            daily_counter: DailyCounterTable::new(pool.clone()),
            pool,
        })
    }

    /// Creates every table that does not exist yet.
    pub async fn run_migrations(&self) -> Result<(), DatabaseError> {
        self.subscription.create_table().await?;
        self.discovered.create_table().await?;
        self.daily_counter.create_table().await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_subscriptions_category ON subscriptions (category_id)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_subscriptions_owner ON subscriptions (owner_scope)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Drops all tables. Use with caution!
    pub async fn drop_all_tables(&self) -> Result<(), DatabaseError> {
        self.subscription.drop_table().await?;
        self.discovered.drop_table().await?;
        self.daily_counter.drop_table().await?;
        Ok(())
    }

    /// Deletes all data from all tables. Use with caution!
    pub async fn delete_all_tables(&self) -> Result<(), DatabaseError> {
        self.subscription.delete_all().await?;
        self.discovered.delete_all().await?;
        self.daily_counter.delete_all().await?;
        Ok(())
    }
}
