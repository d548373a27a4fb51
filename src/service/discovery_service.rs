//! Poll, dedup, match and dispatch: one discovery cycle.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use log::debug;
use log::error;
use log::info;
use log::warn;

use crate::catalog::Catalog;
use crate::catalog::LiveItem;
use crate::entity::CounterKind;
use crate::entity::DedupScope;
use crate::entity::DiscoveredEntity;
use crate::entity::SubscriptionEntity;
use crate::entity::counter_date;
use crate::matcher::matches;
use crate::repository::Repository;
use crate::repository::table::Table;
use crate::service::error::ServiceError;
use crate::sink::NotificationSink;

/// Tunables of the discovery cycle.
#[derive(Clone, Debug)]
pub struct DiscoveryOptions {
    /// How long a dedup marker suppresses re-notification.
    pub marker_retention: chrono::Duration,
    pub dedup_scope: DedupScope,
    /// How long daily counters are kept.
    pub counter_retention: chrono::Duration,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            marker_retention: chrono::Duration::days(7),
            dedup_scope: DedupScope::Global,
            counter_retention: chrono::Duration::days(30),
        }
    }
}

/// Totals of one discovery cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Distinct categories polled.
    pub categories: usize,
    /// Categories whose fetch failed and were skipped.
    pub failed_categories: usize,
    /// Items that matched at least one subscription and got marked.
    pub new_items: usize,
    pub sent: usize,
    pub failed: usize,
}

/// What happened to a single live item.
#[derive(Debug, PartialEq, Eq)]
enum ItemOutcome {
    AlreadyDiscovered,
    NoMatch,
    Dispatched { sent: usize, failed: usize },
}

/// Drives discovery cycles over all subscriptions.
pub struct DiscoveryService {
    db: Arc<Repository>,
    catalog: Arc<dyn Catalog>,
    sink: Arc<dyn NotificationSink>,
    options: DiscoveryOptions,
}

impl DiscoveryService {
    pub fn new(
        db: Arc<Repository>,
        catalog: Arc<dyn Catalog>,
        sink: Arc<dyn NotificationSink>,
        options: DiscoveryOptions,
    ) -> Self {
        Self {
            db,
            catalog,
            sink,
            options,
        }
    }

    /// Runs one discovery cycle.
    ///
    /// Only failing to list the subscriptions is fatal. Catalog errors skip
    /// their category, per-item store errors skip the item, and delivery
    /// errors are counted against the subscription.
    pub async fn run_cycle(&self) -> Result<CycleReport, ServiceError> {
        debug!("Starting discovery cycle.");

        let subscriptions = self.db.subscription.select_all().await?;
        let categories = Self::distinct_categories(&subscriptions);
        let mut report = CycleReport {
            categories: categories.len(),
            ..Default::default()
        };

        if categories.is_empty() {
            info!("No subscriptions found, nothing to discover.");
            return Ok(report);
        }
        info!(
            "Checking {} categories on {} for {} subscriptions.",
            categories.len(),
            self.catalog.get_info().name,
            subscriptions.len()
        );

        let fetches = categories.iter().map(|category_id| async move {
            (
                category_id,
                self.catalog.fetch_live_items(category_id).await,
            )
        });
        let results = join_all(fetches).await;

        for (category_id, result) in results {
            let items = match result {
                Ok(items) => items,
                Err(e) => {
                    error!("Error fetching live items for category `{category_id}`: {e}");
                    report.failed_categories += 1;
                    continue;
                }
            };
            debug!("Category `{category_id}` has {} live items.", items.len());

            for item in &items {
                match self.process_item(item).await {
                    Ok(ItemOutcome::Dispatched { sent, failed }) => {
                        report.new_items += 1;
                        report.sent += sent;
                        report.failed += failed;
                    }
                    Ok(ItemOutcome::AlreadyDiscovered) | Ok(ItemOutcome::NoMatch) => {}
                    Err(e) => {
                        error!(
                            "Error processing live item `{}` in category `{category_id}`: {e}",
                            item.id
                        );
                    }
                }
            }
        }

        info!(
            "Discovery cycle finished: {} new items, {} sent, {} failed, {}/{} categories failed.",
            report.new_items,
            report.sent,
            report.failed,
            report.failed_categories,
            report.categories
        );
        Ok(report)
    }

    fn distinct_categories(subscriptions: &[SubscriptionEntity]) -> Vec<String> {
        subscriptions
            .iter()
            .map(|sub| sub.category_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    async fn process_item(&self, item: &LiveItem) -> Result<ItemOutcome, ServiceError> {
        let now = Utc::now();
        let scope = self.options.dedup_scope;

        if scope == DedupScope::Global && self.db.discovered.exists_active(&item.id, now).await? {
            debug!("Live item `{}` was already discovered.", item.id);
            return Ok(ItemOutcome::AlreadyDiscovered);
        }

        let subscriptions = self
            .db
            .subscription
            .select_all_by_category(&item.category_id)
            .await?;

        let mut already_marked = 0;
        let mut matched = Vec::new();
        for sub in subscriptions {
            let key = scope.marker_key(&item.id, &sub.owner_scope);
            if scope == DedupScope::Subscription
                && self.db.discovered.exists_active(&key, now).await?
            {
                already_marked += 1;
                continue;
            }
            if matches(item, &sub.filter) {
                matched.push((key, sub));
            }
        }

        if matched.is_empty() {
            if already_marked > 0 {
                return Ok(ItemOutcome::AlreadyDiscovered);
            }
            debug!("Live item `{}` matched no subscription.", item.id);
            return Ok(ItemOutcome::NoMatch);
        }

        // Markers go in before any delivery so a failed dispatch is not retried.
        // All or none: a partial write would silence owners never notified.
        let keys: BTreeSet<&String> = matched.iter().map(|(key, _)| key).collect();
        let markers: Vec<DiscoveredEntity> = keys
            .into_iter()
            .map(|key| DiscoveredEntity {
                item_key: key.clone(),
                item_id: item.id.clone(),
                category_id: item.category_id.clone(),
                broadcaster_id: item.broadcaster_id.clone(),
                discovered_at: now,
                expires_at: (now + self.options.marker_retention).timestamp(),
            })
            .collect();
        self.db.discovered.put_all(&markers).await?;

        info!(
            "New live item `{}` ({}) matched {} subscriptions.",
            item.id,
            item.broadcaster_login,
            matched.len()
        );
        let subscriptions: Vec<SubscriptionEntity> =
            matched.into_iter().map(|(_, sub)| sub).collect();
        let (sent, failed) = self.dispatch(item, &subscriptions).await;

        Ok(ItemOutcome::Dispatched { sent, failed })
    }

    /// Delivers to every subscription concurrently. Returns `(sent, failed)`.
    async fn dispatch(&self, item: &LiveItem, subscriptions: &[SubscriptionEntity]) -> (usize, usize) {
        let outcomes = join_all(subscriptions.iter().map(|sub| self.deliver_to(item, sub))).await;
        let sent = outcomes.iter().filter(|delivered| **delivered).count();
        (sent, outcomes.len() - sent)
    }

    async fn deliver_to(&self, item: &LiveItem, sub: &SubscriptionEntity) -> bool {
        match self.sink.deliver(&sub.endpoint, item).await {
            Ok(()) => {
                if let Err(e) = self.db.subscription.record_success(&sub.id, Utc::now()).await {
                    error!("Error recording success for subscription `{}`: {e}", sub.id);
                }
                self.count_outcome(CounterKind::Success).await;
                true
            }
            Err(e) => {
                warn!(
                    "Delivery of live item `{}` to subscription `{}` failed: {e}",
                    item.id, sub.id
                );
                if let Err(e) = self.db.subscription.record_failure(&sub.id, Utc::now()).await {
                    error!("Error recording failure for subscription `{}`: {e}", sub.id);
                }
                self.count_outcome(CounterKind::Failure).await;
                false
            }
        }
    }

    /// Adds one delivery outcome to today's counter.
    async fn count_outcome(&self, kind: CounterKind) {
        let now = Utc::now();
        let date = counter_date(now);
        let expires_at = now + self.options.counter_retention;

        if let Err(e) = self
            .db
            .daily_counter
            .increment(kind, &date, 1, now, expires_at)
            .await
        {
            error!("Error updating {kind:?} counter for {date}: {e}");
        }
    }
}
