// src/tasks/roster_sync.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use clubstream_common::traits::RosterSource;

use crate::eventbus::EventBus;
use crate::services::subscription_reconciler::{ReconcileReport, SubscriptionReconciler};
use crate::Error;

/// Fetches the roster and reconciles subscriptions against it once.
pub async fn run_roster_sync(
    roster: &dyn RosterSource,
    reconciler: &SubscriptionReconciler,
    source_ids: &[String],
    is_initial_run: bool,
) -> Result<ReconcileReport, Error> {
    let desired = roster.fetch_roster(source_ids).await?;
    info!(
        "roster sync: {} account(s) from {} source(s) (initial={})",
        desired.len(),
        source_ids.len(),
        is_initial_run
    );
    reconciler.reconcile(&desired, is_initial_run).await
}

/// Spawns a background task that syncs right away and then every
/// `poll_interval` until the bus shuts down. The first successful sync is
/// the initial run that announces broadcasters already live.
///
/// Tick failures are logged and retried on the next tick. A fatal error
/// shuts the bus down and ends the task with that error.
pub fn spawn_roster_sync_task(
    roster: Arc<dyn RosterSource>,
    reconciler: Arc<SubscriptionReconciler>,
    bus: EventBus,
    source_ids: Vec<String>,
    poll_interval: Duration,
) -> JoinHandle<Result<(), Error>> {
    tokio::spawn(async move {
        let mut shutdown_rx = bus.shutdown_signal();
        let mut ticker = interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut is_initial_run = true;

        loop {
            tokio::select! {
                biased;
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("roster sync stopping");
                        return Ok(());
                    }
                }
                _ = ticker.tick() => {
                    match run_roster_sync(roster.as_ref(), &reconciler, &source_ids, is_initial_run).await {
                        Ok(report) => {
                            if !report.is_clean() {
                                warn!("roster sync finished with {} failure(s); retrying next tick", report.failures.len());
                            }
                            is_initial_run = false;
                        }
                        Err(e) if e.is_fatal() => {
                            error!("roster sync failed fatally: {}", e);
                            bus.shutdown();
                            return Err(e);
                        }
                        Err(e) => error!("roster sync failed: {}", e),
                    }
                }
            }
        }
    })
}
