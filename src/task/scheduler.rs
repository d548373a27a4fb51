//! Background task firing discovery and cleanup ticks.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use log::debug;
use log::error;
use log::info;
use log::warn;
use tokio::time::MissedTickBehavior;
use tracing::Instrument;
use tracing::info_span;

use crate::service::Services;
use crate::task::trigger::Trigger;
use crate::task::trigger::TriggerReport;
use crate::task::trigger::handle_trigger;

/// Drives the two periodic cycles.
///
/// Each trigger kind has its own loop, so a slow cleanup never delays
/// discovery. Ticks of the same kind never overlap within one process.
pub struct Scheduler {
    services: Arc<Services>,
    discovery_interval: Duration,
    cleanup_interval: Duration,
    cycle_timeout: Duration,
    running: AtomicBool,
}

impl Scheduler {
    pub fn new(
        services: Arc<Services>,
        discovery_interval: Duration,
        cleanup_interval: Duration,
        cycle_timeout: Duration,
    ) -> Arc<Self> {
        info!(
            "Initializing Scheduler with discovery interval {:?}, cleanup interval {:?}, timeout {:?}",
            discovery_interval, cleanup_interval, cycle_timeout
        );
        Arc::new(Self {
            services,
            discovery_interval,
            cleanup_interval,
            cycle_timeout,
            running: AtomicBool::new(false),
        })
    }

    /// Starts both tick loops.
    pub fn start(self: Arc<Self>) -> anyhow::Result<()> {
        if !self.running.swap(true, Ordering::SeqCst) {
            info!("Starting Scheduler loops.");
            let (discovery, cleanup) = (self.discovery_interval, self.cleanup_interval);
            self.clone().spawn_loop(Trigger::Discovery, discovery);
            self.spawn_loop(Trigger::Cleanup, cleanup);
        }
        Ok(())
    }

    /// Stops both loops after their current tick.
    pub fn stop(&self) {
        info!("Stopping Scheduler loops.");
        self.running.store(false, Ordering::SeqCst);
    }

    /// Handles a single tick, abandoning it once the invocation deadline passes.
    ///
    /// No retry happens here; the next tick is the retry.
    pub async fn dispatch(&self, trigger: Trigger) -> anyhow::Result<TriggerReport> {
        debug!("Dispatching {trigger} tick.");
        match tokio::time::timeout(self.cycle_timeout, handle_trigger(&self.services, trigger))
            .await
        {
            Ok(result) => Ok(result?),
            Err(_) => {
                warn!(
                    "{trigger} cycle exceeded its {:?} deadline and was abandoned.",
                    self.cycle_timeout
                );
                Err(anyhow::anyhow!(
                    "{trigger} cycle timed out after {:?}",
                    self.cycle_timeout
                ))
            }
        }
    }

    fn spawn_loop(self: Arc<Self>, trigger: Trigger, period: Duration) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::spawn(async move {
            loop {
                interval.tick().await;
                if !self.running.load(Ordering::SeqCst) {
                    info!("Stopping {trigger} loop.");
                    break;
                }
                let span = info_span!("tick", trigger = %trigger);
                match self.dispatch(trigger).instrument(span).await {
                    Ok(report) => debug!("Tick finished: {report}"),
                    Err(e) => error!("Error running {trigger} cycle: {e}"),
                }
            }
        });
    }
}
