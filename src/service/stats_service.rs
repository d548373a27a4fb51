//! Read-only delivery statistics.

use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;

use crate::entity::CounterKind;
use crate::entity::counter_date;
use crate::repository::Repository;
use crate::service::error::ServiceError;

/// Delivery totals for one UTC day plus the current subscription footprint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DailySummary {
    pub date: String,
    pub sent: i64,
    pub failed: i64,
    pub subscriptions: i64,
    pub categories: usize,
}

pub struct StatsService {
    db: Arc<Repository>,
}

impl StatsService {
    pub fn new(db: Arc<Repository>) -> Self {
        Self { db }
    }

    pub async fn daily_summary(&self, at: DateTime<Utc>) -> Result<DailySummary, ServiceError> {
        let date = counter_date(at);

        let sent = self
            .db
            .daily_counter
            .select(CounterKind::Success, &date)
            .await?
            .map_or(0, |c| c.count);
        let failed = self
            .db
            .daily_counter
            .select(CounterKind::Failure, &date)
            .await?
            .map_or(0, |c| c.count);
        let subscriptions = self.db.subscription.count().await?;
        let categories = self.db.subscription.select_distinct_category_ids().await?.len();

        Ok(DailySummary {
            date,
            sent,
            failed,
            subscriptions,
            categories,
        })
    }
}
