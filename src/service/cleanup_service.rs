//! Pruning of dead subscriptions and expired bookkeeping.

use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use log::debug;
use log::error;
use log::info;

use crate::entity::SubscriptionEntity;
use crate::repository::Repository;
use crate::repository::table::Table;
use crate::service::error::ServiceError;

#[derive(Clone, Debug)]
pub struct CleanupOptions {
    /// Failure streak at which a subscription becomes a pruning candidate.
    pub max_failure_count: i32,
    /// How long a candidate must have gone without a successful delivery.
    pub prune_after: chrono::Duration,
}

impl Default for CleanupOptions {
    fn default() -> Self {
        Self {
            max_failure_count: 10,
            prune_after: chrono::Duration::days(7),
        }
    }
}

impl CleanupOptions {
    pub fn is_prunable(&self, sub: &SubscriptionEntity, now: DateTime<Utc>) -> bool {
        sub.failure_count >= self.max_failure_count && sub.last_alive_at() < now - self.prune_after
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Subscriptions deleted.
    pub removed: usize,
    pub expired_markers: u64,
    pub expired_counters: u64,
}

pub struct CleanupService {
    db: Arc<Repository>,
    options: CleanupOptions,
}

impl CleanupService {
    pub fn new(db: Arc<Repository>, options: CleanupOptions) -> Self {
        Self { db, options }
    }

    /// Deletes chronically failing subscriptions and purges expired records.
    ///
    /// Deletion is silent: the subscriber is not told.
    pub async fn run_cycle(&self) -> Result<CleanupReport, ServiceError> {
        debug!("Starting cleanup cycle.");
        let now = Utc::now();
        let mut report = CleanupReport::default();

        let subscriptions = self.db.subscription.select_all().await?;
        for sub in subscriptions
            .iter()
            .filter(|sub| self.options.is_prunable(sub, now))
        {
            match self.db.subscription.delete(&sub.id).await {
                Ok(()) => {
                    info!(
                        "Removed subscription `{}` for category `{}` after {} consecutive failures.",
                        sub.id, sub.category_id, sub.failure_count
                    );
                    report.removed += 1;
                }
                Err(e) => error!("Error removing subscription `{}`: {e}", sub.id),
            }
        }

        match self.db.discovered.delete_expired(now).await {
            Ok(n) => report.expired_markers = n,
            Err(e) => error!("Error purging expired markers: {e}"),
        }
        match self.db.daily_counter.delete_expired(now).await {
            Ok(n) => report.expired_counters = n,
            Err(e) => error!("Error purging expired counters: {e}"),
        }

        info!(
            "Cleanup cycle finished: {} subscriptions removed, {} markers and {} counters expired.",
            report.removed, report.expired_markers, report.expired_counters
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::entity::MatchFilter;

    fn sub(
        failure_count: i32,
        last_success_days_ago: Option<i64>,
        created_days_ago: i64,
    ) -> SubscriptionEntity {
        let now = Utc::now();
        let mut sub = SubscriptionEntity::new(
            "https://discord.com/api/webhooks/1/token",
            "509658",
            "Just Chatting",
            MatchFilter::default(),
        );
        sub.failure_count = failure_count;
        sub.created_at = now - Duration::days(created_days_ago);
        sub.last_success_at = last_success_days_ago.map(|d| now - Duration::days(d));
        sub
    }

    #[test]
    fn test_prunable_after_cutoff() {
        let options = CleanupOptions::default();
        let now = Utc::now();

        assert!(options.is_prunable(&sub(10, Some(8), 30), now));
        assert!(!options.is_prunable(&sub(10, Some(6), 30), now));
    }

    #[test]
    fn test_not_prunable_below_failure_threshold() {
        let options = CleanupOptions::default();
        assert!(!options.is_prunable(&sub(9, Some(30), 60), Utc::now()));
    }

    #[test]
    fn test_never_delivered_uses_creation_time() {
        let options = CleanupOptions::default();
        let now = Utc::now();

        assert!(options.is_prunable(&sub(12, None, 8), now));
        assert!(!options.is_prunable(&sub(12, None, 2), now));
    }
}
