//! Database table operations and implementations.

use chrono::DateTime;
use chrono::Utc;
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteArguments;

use crate::entity::CounterKind;
use crate::entity::DailyCounterEntity;
use crate::entity::DiscoveredEntity;
use crate::entity::SubscriptionEntity;
use crate::repository::error::DatabaseError;

/// Base table struct providing database pool access.
#[derive(Clone)]
pub struct BaseTable {
    pub pool: SqlitePool,
}

impl BaseTable {
    /// Creates a new base table with the given pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Base trait for table operations.
#[async_trait::async_trait]
pub trait TableBase {
    /// Creates the table if it doesn't exist.
    async fn create_table(&self) -> Result<(), DatabaseError>;
    /// Drops the table.
    async fn drop_table(&self) -> Result<(), DatabaseError>;
    /// Deletes all rows from the table.
    async fn delete_all(&self) -> Result<(), DatabaseError>;
}

/// Trait for tables with CRUD operations.
#[async_trait::async_trait]
pub trait Table<T, ID>: TableBase {
    async fn select_all(&self) -> Result<Vec<T>, DatabaseError>;
    async fn insert(&self, model: &T) -> Result<ID, DatabaseError>;
    async fn select(&self, id: &ID) -> Result<Option<T>, DatabaseError>;
    async fn update(&self, model: &T) -> Result<(), DatabaseError>;
    async fn delete(&self, id: &ID) -> Result<(), DatabaseError>;
    async fn replace(&self, model: &T) -> Result<ID, DatabaseError>;
}

/// Helper trait to bind model fields of heterogeneous types through one macro.
pub trait BindParam<'q> {
    fn bind_param<O>(
        self,
        query: sqlx::query::QueryAs<'q, sqlx::Sqlite, O, SqliteArguments<'q>>,
    ) -> sqlx::query::QueryAs<'q, sqlx::Sqlite, O, SqliteArguments<'q>>;
    fn bind_param_q(
        self,
        query: sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>>,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>>;
}

macro_rules! impl_bind_param {
    ($t:ty) => {
        impl<'q> BindParam<'q> for $t {
            fn bind_param<O>(
                self,
                query: sqlx::query::QueryAs<'q, sqlx::Sqlite, O, SqliteArguments<'q>>,
            ) -> sqlx::query::QueryAs<'q, sqlx::Sqlite, O, SqliteArguments<'q>> {
                query.bind(self)
            }
            fn bind_param_q(
                self,
                query: sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>>,
            ) -> sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>> {
                query.bind(self)
            }
        }
    };
}

impl_bind_param!(&'q i32);
impl_bind_param!(&'q i64);
impl_bind_param!(&'q String);
impl_bind_param!(&'q DateTime<Utc>);
impl_bind_param!(&'q Option<DateTime<Utc>>);

impl<'q, T: serde::Serialize + for<'a> serde::Deserialize<'a> + Send + Sync + 'static> BindParam<'q>
    for &'q sqlx::types::Json<T>
{
    fn bind_param<O>(
        self,
        query: sqlx::query::QueryAs<'q, sqlx::Sqlite, O, SqliteArguments<'q>>,
    ) -> sqlx::query::QueryAs<'q, sqlx::Sqlite, O, SqliteArguments<'q>> {
        query.bind(self)
    }
    fn bind_param_q(
        self,
        query: sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>>,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>> {
        query.bind(self)
    }
}

/// Generates a table handler keyed by a caller-supplied primary key.
///
/// `$cols`, `$vals`, `$update_set` and the field list cover every column
/// except the primary key, which is always bound first on insert/replace and
/// last on update.
macro_rules! impl_table {
    (
        $struct_name:ident,
        $model:ty,
        $table:expr,
        $pk:ident,
        $id_type:ty,
        $create_sql:expr,
        $cols:expr,
        $vals:expr,
        $update_set:expr,
        [ $( $field:ident ),+ ]
    ) => {
        #[derive(Clone)]
        pub struct $struct_name {
            base: BaseTable,
        }

        impl $struct_name {
            pub fn new(pool: SqlitePool) -> Self {
                Self {
                    base: BaseTable::new(pool),
                }
            }
        }

        #[async_trait::async_trait]
        impl TableBase for $struct_name {
            async fn create_table(&self) -> Result<(), DatabaseError> {
                sqlx::query($create_sql)
                    .execute(&self.base.pool)
                    .await?;
                Ok(())
            }

            async fn drop_table(&self) -> Result<(), DatabaseError> {
                sqlx::query(concat!("DROP TABLE IF EXISTS ", $table))
                    .execute(&self.base.pool)
                    .await?;
                Ok(())
            }

            async fn delete_all(&self) -> Result<(), DatabaseError> {
                sqlx::query(concat!("DELETE FROM ", $table))
                    .execute(&self.base.pool)
                    .await?;
                Ok(())
            }
        }

        #[async_trait::async_trait]
        impl Table<$model, $id_type> for $struct_name {
            async fn select_all(&self) -> Result<Vec<$model>, DatabaseError> {
                Ok(sqlx::query_as::<_, $model>(concat!("SELECT * FROM ", $table))
                    .fetch_all(&self.base.pool)
                    .await?)
            }

            async fn select(&self, id: &$id_type) -> Result<Option<$model>, DatabaseError> {
                let query = sqlx::query_as::<_, $model>(concat!("SELECT * FROM ", $table, " WHERE ", stringify!($pk), " = ?"));
                let query = BindParam::bind_param(id, query);
                Ok(query.fetch_optional(&self.base.pool).await?)
            }

            async fn insert(&self, model: &$model) -> Result<$id_type, DatabaseError> {
                let mut query = sqlx::query_as(concat!(
                        "INSERT INTO ", $table, " (", stringify!($pk), ", ", $cols, ") VALUES (?, ", $vals, ") RETURNING ", stringify!($pk)
                    ));

                query = BindParam::bind_param(&model.$pk, query);
                $(
                    query = BindParam::bind_param(&model.$field, query);
                )+

                let row: ($id_type,) = query.fetch_one(&self.base.pool).await?;
                Ok(row.0)
            }

            async fn update(&self, model: &$model) -> Result<(), DatabaseError> {
                let mut query = sqlx::query(concat!(
                        "UPDATE ", $table, " SET ", $update_set, " WHERE ", stringify!($pk), " = ?"
                    ));

                $(
                    query = BindParam::bind_param_q(&model.$field, query);
                )+
                query = BindParam::bind_param_q(&model.$pk, query);

                query.execute(&self.base.pool).await?;
                Ok(())
            }

            async fn delete(&self, id: &$id_type) -> Result<(), DatabaseError> {
                let query = sqlx::query(concat!("DELETE FROM ", $table, " WHERE ", stringify!($pk), " = ?"));
                let query = BindParam::bind_param_q(id, query);
                query.execute(&self.base.pool).await?;
                Ok(())
            }

            async fn replace(&self, model: &$model) -> Result<$id_type, DatabaseError> {
                let mut query = sqlx::query_as(concat!(
                        "REPLACE INTO ", $table, " (", stringify!($pk), ", ", $cols, ") VALUES (?, ", $vals, ") RETURNING ", stringify!($pk)
                    ));

                query = BindParam::bind_param(&model.$pk, query);
                $(
                    query = BindParam::bind_param(&model.$field, query);
                )+

                let row: ($id_type,) = query.fetch_one(&self.base.pool).await?;
                Ok(row.0)
            }
        }
    };
}

// ============================================================================
// SubscriptionTable
// ============================================================================

impl_table!(
    SubscriptionTable,
    SubscriptionEntity,
    "subscriptions",
    id,
    String,
    r#"CREATE TABLE IF NOT EXISTS subscriptions (
        id TEXT PRIMARY KEY NOT NULL,
        owner_scope TEXT NOT NULL,
        endpoint TEXT NOT NULL,
        category_id TEXT NOT NULL,
        category_name TEXT NOT NULL DEFAULT '',
        filter TEXT NOT NULL DEFAULT '{}',
        created_at TIMESTAMP NOT NULL,
        last_success_at TIMESTAMP DEFAULT NULL,
        updated_at TIMESTAMP NOT NULL,
        failure_count INTEGER NOT NULL DEFAULT 0
    )"#,
    "owner_scope, endpoint, category_id, category_name, filter, created_at, last_success_at, updated_at, failure_count",
    "?, ?, ?, ?, ?, ?, ?, ?, ?",
    "owner_scope = ?, endpoint = ?, category_id = ?, category_name = ?, filter = ?, created_at = ?, last_success_at = ?, updated_at = ?, failure_count = ?",
    [
        owner_scope,
        endpoint,
        category_id,
        category_name,
        filter,
        created_at,
        last_success_at,
        updated_at,
        failure_count
    ]
);

impl SubscriptionTable {
    pub async fn select_all_by_owner_scope(
        &self,
        owner_scope: &str,
    ) -> Result<Vec<SubscriptionEntity>, DatabaseError> {
        Ok(sqlx::query_as::<_, SubscriptionEntity>(
            "SELECT * FROM subscriptions WHERE owner_scope = ? ORDER BY created_at",
        )
        .bind(owner_scope)
        .fetch_all(&self.base.pool)
        .await?)
    }

    pub async fn select_all_by_category(
        &self,
        category_id: &str,
    ) -> Result<Vec<SubscriptionEntity>, DatabaseError> {
        Ok(sqlx::query_as::<_, SubscriptionEntity>(
            "SELECT * FROM subscriptions WHERE category_id = ? ORDER BY created_at",
        )
        .bind(category_id)
        .fetch_all(&self.base.pool)
        .await?)
    }

    pub async fn select_distinct_category_ids(&self) -> Result<Vec<String>, DatabaseError> {
        Ok(sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT category_id FROM subscriptions ORDER BY category_id",
        )
        .fetch_all(&self.base.pool)
        .await?)
    }

    pub async fn count(&self) -> Result<i64, DatabaseError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM subscriptions")
            .fetch_one(&self.base.pool)
            .await?;
        Ok(count.0)
    }

    /// Marks a delivery as successful and clears the failure streak.
    ///
    /// Returns `false` if the subscription no longer exists.
    pub async fn record_success(
        &self,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let res = sqlx::query(
            "UPDATE subscriptions SET last_success_at = ?, updated_at = ?, failure_count = 0 WHERE id = ?",
        )
        .bind(at)
        .bind(at)
        .bind(id)
        .execute(&self.base.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Atomically bumps the failure streak of a subscription.
    ///
    /// Returns `false` if the subscription no longer exists.
    pub async fn record_failure(
        &self,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let res = sqlx::query(
            "UPDATE subscriptions SET failure_count = failure_count + 1, updated_at = ? WHERE id = ?",
        )
        .bind(at)
        .bind(id)
        .execute(&self.base.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }
}

// ============================================================================
// DiscoveredTable
// ============================================================================

impl_table!(
    DiscoveredTable,
    DiscoveredEntity,
    "discovered_items",
    item_key,
    String,
    r#"CREATE TABLE IF NOT EXISTS discovered_items (
        item_key TEXT PRIMARY KEY NOT NULL,
        item_id TEXT NOT NULL,
        category_id TEXT NOT NULL,
        broadcaster_id TEXT NOT NULL,
        discovered_at TIMESTAMP NOT NULL,
        expires_at INTEGER NOT NULL
    )"#,
    "item_id, category_id, broadcaster_id, discovered_at, expires_at",
    "?, ?, ?, ?, ?",
    "item_id = ?, category_id = ?, broadcaster_id = ?, discovered_at = ?, expires_at = ?",
    [item_id, category_id, broadcaster_id, discovered_at, expires_at]
);

impl DiscoveredTable {
    /// Whether a marker exists for the key and has not expired at `now`.
    pub async fn exists_active(
        &self,
        item_key: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM discovered_items WHERE item_key = ? AND expires_at > ?",
        )
        .bind(item_key)
        .bind(now.timestamp())
        .fetch_one(&self.base.pool)
        .await?;
        Ok(count.0 > 0)
    }

    /// Writes a marker, overwriting an expired one with the same key.
    pub async fn put(&self, marker: &DiscoveredEntity) -> Result<(), DatabaseError> {
        self.replace(marker).await?;
        Ok(())
    }

    /// Writes several markers in one transaction: either all land or none do.
    pub async fn put_all(&self, markers: &[DiscoveredEntity]) -> Result<(), DatabaseError> {
        let mut tx = self.base.pool.begin().await?;
        for marker in markers {
            sqlx::query(
                "REPLACE INTO discovered_items (item_key, item_id, category_id, broadcaster_id, discovered_at, expires_at) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&marker.item_key)
            .bind(&marker.item_id)
            .bind(&marker.category_id)
            .bind(&marker.broadcaster_id)
            .bind(marker.discovered_at)
            .bind(marker.expires_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Purges markers whose expiry has passed. Returns the number removed.
    pub async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, DatabaseError> {
        let res = sqlx::query("DELETE FROM discovered_items WHERE expires_at <= ?")
            .bind(now.timestamp())
            .execute(&self.base.pool)
            .await?;
        Ok(res.rows_affected())
    }
}

// ============================================================================
// DailyCounterTable
// ============================================================================

#[derive(Clone)]
pub struct DailyCounterTable {
    base: BaseTable,
}

impl DailyCounterTable {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            base: BaseTable::new(pool),
        }
    }

    pub async fn select_all(&self) -> Result<Vec<DailyCounterEntity>, DatabaseError> {
        Ok(
            sqlx::query_as::<_, DailyCounterEntity>("SELECT * FROM daily_counters")
                .fetch_all(&self.base.pool)
                .await?,
        )
    }

    pub async fn select(
        &self,
        kind: CounterKind,
        date: &str,
    ) -> Result<Option<DailyCounterEntity>, DatabaseError> {
        Ok(sqlx::query_as::<_, DailyCounterEntity>(
            "SELECT * FROM daily_counters WHERE kind = ? AND date = ?",
        )
        .bind(kind)
        .bind(date)
        .fetch_optional(&self.base.pool)
        .await?)
    }

    /// Adds `by` to the counter of `(kind, date)`, creating it if needed.
    ///
    /// Returns the count after the increment.
    pub async fn increment(
        &self,
        kind: CounterKind,
        date: &str,
        by: i64,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO daily_counters (kind, date, count, updated_at, expires_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (kind, date) DO UPDATE SET
                count = count + excluded.count,
                updated_at = excluded.updated_at,
                expires_at = excluded.expires_at
            RETURNING count
            "#,
        )
        .bind(kind)
        .bind(date)
        .bind(by)
        .bind(now)
        .bind(expires_at.timestamp())
        .fetch_one(&self.base.pool)
        .await?;
        Ok(row.0)
    }

    /// Purges counters whose expiry has passed. Returns the number removed.
    pub async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, DatabaseError> {
        let res = sqlx::query("DELETE FROM daily_counters WHERE expires_at <= ?")
            .bind(now.timestamp())
            .execute(&self.base.pool)
            .await?;
        Ok(res.rows_affected())
    }
}

#[async_trait::async_trait]
impl TableBase for DailyCounterTable {
    async fn create_table(&self) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS daily_counters (
                kind TEXT NOT NULL,
                date TEXT NOT NULL,
                count INTEGER NOT NULL DEFAULT 0,
                updated_at TIMESTAMP NOT NULL,
                expires_at INTEGER NOT NULL,
                PRIMARY KEY (kind, date)
            )"#,
        )
        .execute(&self.base.pool)
        .await?;
        Ok(())
    }

    async fn drop_table(&self) -> Result<(), DatabaseError> {
        sqlx::query("DROP TABLE IF EXISTS daily_counters")
            .execute(&self.base.pool)
            .await?;
        Ok(())
    }

    async fn delete_all(&self) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM daily_counters")
            .execute(&self.base.pool)
            .await?;
        Ok(())
    }
}
