//! Scheduling signals, classified once at the boundary.

use std::fmt;
use std::str::FromStr;

use crate::service::Services;
use crate::service::cleanup_service::CleanupReport;
use crate::service::discovery_service::CycleReport;
use crate::service::error::ServiceError;

/// Kind of periodic tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// Frequent tick: poll the catalog and notify.
    Discovery,
    /// Slow tick: prune dead subscriptions.
    Cleanup,
}

impl Trigger {
    /// Classifies an opaque scheduler signal (e.g. a rule name or ARN).
    ///
    /// Anything mentioning "cleanup" is a cleanup tick, everything else is a
    /// discovery tick.
    pub fn from_signal(signal: &str) -> Self {
        if signal.to_ascii_lowercase().contains("cleanup") {
            Trigger::Cleanup
        } else {
            Trigger::Discovery
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Trigger::Discovery => "discovery",
            Trigger::Cleanup => "cleanup",
        }
    }
}

impl FromStr for Trigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "discovery" => Ok(Trigger::Discovery),
            "cleanup" => Ok(Trigger::Cleanup),
            other => Err(format!("unknown trigger `{other}`")),
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of handling one trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerReport {
    Discovery(CycleReport),
    Cleanup(CleanupReport),
}

impl fmt::Display for TriggerReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerReport::Discovery(r) => write!(
                f,
                "discovery: new_items={} sent={} failed={} categories={} failed_categories={}",
                r.new_items, r.sent, r.failed, r.categories, r.failed_categories
            ),
            TriggerReport::Cleanup(r) => write!(
                f,
                "cleanup: removed={} expired_markers={} expired_counters={}",
                r.removed, r.expired_markers, r.expired_counters
            ),
        }
    }
}

/// Runs the cycle selected by `trigger`.
pub async fn handle_trigger(
    services: &Services,
    trigger: Trigger,
) -> Result<TriggerReport, ServiceError> {
    match trigger {
        Trigger::Discovery => Ok(TriggerReport::Discovery(
            services.discovery.run_cycle().await?,
        )),
        Trigger::Cleanup => Ok(TriggerReport::Cleanup(services.cleanup.run_cycle().await?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_signal() {
        assert_eq!(
            Trigger::from_signal("arn:aws:events:us-east-1:1:rule/livewatch-Cleanup"),
            Trigger::Cleanup
        );
        assert_eq!(
            Trigger::from_signal("arn:aws:events:us-east-1:1:rule/livewatch-discovery"),
            Trigger::Discovery
        );
        assert_eq!(Trigger::from_signal(""), Trigger::Discovery);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("cleanup".parse::<Trigger>(), Ok(Trigger::Cleanup));
        assert_eq!("Discovery".parse::<Trigger>(), Ok(Trigger::Discovery));
        assert!("status".parse::<Trigger>().is_err());
    }

    #[test]
    fn test_report_display() {
        let report = TriggerReport::Cleanup(CleanupReport {
            removed: 2,
            expired_markers: 3,
            expired_counters: 0,
        });
        assert_eq!(
            report.to_string(),
            "cleanup: removed=2 expired_markers=3 expired_counters=0"
        );
    }
}
