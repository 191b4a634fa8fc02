// File: src/services/subscription_reconciler.rs
//
// Brings the remote online/offline subscriptions in line with the roster.
// Never touches the notification registry itself: teardown and initial
// announcements go through the event bus like any webhook event.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, error, info, warn};

use clubstream_common::models::{
    BroadcasterId, BroadcasterProfile, SubscriptionKind, SubscriptionRecord,
};
use clubstream_common::traits::EventSource;

use crate::config::TEST_ACCOUNT_MARKER;
use crate::eventbus::{EventBus, StreamEvent};
use crate::Error;

/// One per-broadcaster operation that failed during a tick.
#[derive(Debug)]
pub struct ReconcileFailure {
    pub broadcaster_id: Option<BroadcasterId>,
    pub action: &'static str,
    pub error: Error,
}

/// What a single reconciliation tick did.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub resolved: usize,
    pub unresolved: Vec<String>,
    /// Broadcasters that got a synthetic `Unsubscribed`.
    pub unsubscribed: Vec<BroadcasterId>,
    pub deleted: usize,
    pub created: usize,
    /// Broadcasters found live on an initial run.
    pub announced: Vec<BroadcasterId>,
    pub failures: Vec<ReconcileFailure>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, broadcaster_id: Option<BroadcasterId>, action: &'static str, error: Error) {
        warn!(
            "reconcile: {} failed for {}: {}",
            action,
            broadcaster_id.as_ref().map(|b| b.as_str()).unwrap_or("<none>"),
            error
        );
        self.failures.push(ReconcileFailure {
            broadcaster_id,
            action,
            error,
        });
    }
}

pub struct SubscriptionReconciler {
    events: Arc<dyn EventSource>,
    bus: EventBus,
    exclude_test_accounts: bool,
}

impl SubscriptionReconciler {
    pub fn new(events: Arc<dyn EventSource>, bus: EventBus, exclude_test_accounts: bool) -> Self {
        Self {
            events,
            bus,
            exclude_test_accounts,
        }
    }

    fn is_excluded(&self, profile: &BroadcasterProfile) -> bool {
        self.exclude_test_accounts && profile.description.contains(TEST_ACCOUNT_MARKER)
    }

    /// One tick. Errors are returned only when the directory lookup or the
    /// subscription listing fails; everything per-broadcaster ends up in
    /// the report.
    pub async fn reconcile(
        &self,
        desired: &HashSet<String>,
        is_initial_run: bool,
    ) -> Result<ReconcileReport, Error> {
        let mut report = ReconcileReport::default();

        let mut names: Vec<String> = desired.iter().cloned().collect();
        names.sort();

        let mut profiles = if names.is_empty() {
            Vec::new()
        } else {
            self.events.resolve_users(&names).await?
        };
        // Two spellings of one login resolve to the same user.
        let mut seen_ids: HashSet<BroadcasterId> = HashSet::new();
        profiles.retain(|p| seen_ids.insert(p.id.clone()));

        let found: HashSet<String> = profiles.iter().map(|p| p.login.to_lowercase()).collect();
        report.unresolved = names
            .iter()
            .filter(|n| !found.contains(&n.to_lowercase()))
            .cloned()
            .collect();
        for name in &report.unresolved {
            warn!("reconcile: no broadcaster named '{}'; skipped", name);
        }
        report.resolved = profiles.len();

        let snapshot = self.events.list_subscriptions().await?;
        let roster: HashSet<BroadcasterId> = profiles.iter().map(|p| p.id.clone()).collect();

        let kept = self.stale_pass(&snapshot, &roster, &mut report).await;
        self.desired_pass(&profiles, &kept, &mut report).await;

        if is_initial_run {
            self.announce_live(&profiles, &mut report).await;
        }

        info!(
            "reconcile: {} resolved, {} unresolved, {} unsubscribed, {} deleted, {} created, {} announced, {} failure(s)",
            report.resolved,
            report.unresolved.len(),
            report.unsubscribed.len(),
            report.deleted,
            report.created,
            report.announced.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Deletes subscriptions of broadcasters outside the roster (announcing
    /// each one once beforehand), failed subscriptions, and duplicates.
    /// Returns the subscriptions that stay.
    async fn stale_pass<'a>(
        &self,
        snapshot: &'a [SubscriptionRecord],
        roster: &HashSet<BroadcasterId>,
        report: &mut ReconcileReport,
    ) -> Vec<&'a SubscriptionRecord> {
        let mut announced: BTreeSet<BroadcasterId> = BTreeSet::new();
        let mut seen: HashSet<(BroadcasterId, SubscriptionKind)> = HashSet::new();
        let mut kept = Vec::new();

        for sub in snapshot {
            let stale = match &sub.broadcaster_id {
                None => true,
                Some(id) if !roster.contains(id) => {
                    if announced.insert(id.clone()) {
                        debug!("reconcile: {} left the roster", id);
                        match self
                            .bus
                            .publish(StreamEvent::Unsubscribed {
                                broadcaster_id: id.clone(),
                            })
                            .await
                        {
                            Ok(()) => report.unsubscribed.push(id.clone()),
                            Err(e) => report.fail(Some(id.clone()), "publish unsubscribed", e),
                        }
                    }
                    true
                }
                Some(id) if !sub.is_active() => {
                    debug!("reconcile: {} subscription {} for {} is {:?}", sub.kind, sub.handle, id, sub.status);
                    true
                }
                // channel.update subscriptions belong to the notification manager.
                Some(_) if sub.kind == SubscriptionKind::ChannelUpdate => false,
                Some(id) => !seen.insert((id.clone(), sub.kind.clone())),
            };

            if !stale {
                kept.push(sub);
                continue;
            }

            match self.events.delete_subscription(&sub.handle).await {
                Ok(()) => {
                    debug!("reconcile: deleted {} subscription {}", sub.kind, sub.handle);
                    report.deleted += 1;
                }
                Err(e) => report.fail(sub.broadcaster_id.clone(), "delete subscription", e),
            }
        }

        kept
    }

    /// Creates whichever of the online/offline subscriptions each roster
    /// member lacks. Requests run concurrently; failures are collected.
    async fn desired_pass(
        &self,
        profiles: &[BroadcasterProfile],
        kept: &[&SubscriptionRecord],
        report: &mut ReconcileReport,
    ) {
        let mut have: HashMap<&BroadcasterId, (bool, bool)> = HashMap::new();
        for sub in kept {
            if let Some(id) = &sub.broadcaster_id {
                let slot = have.entry(id).or_default();
                match sub.kind {
                    SubscriptionKind::StreamOnline => slot.0 = true,
                    SubscriptionKind::StreamOffline => slot.1 = true,
                    _ => {}
                }
            }
        }

        let mut wanted: Vec<(BroadcasterId, SubscriptionKind)> = Vec::new();
        for profile in profiles {
            let (has_online, has_offline) = have.get(&profile.id).copied().unwrap_or_default();
            if has_online && has_offline {
                continue;
            }
            debug!(
                "reconcile: subscribing {} (online: {}, offline: {})",
                profile.display_name, !has_online, !has_offline
            );
            if !has_online {
                wanted.push((profile.id.clone(), SubscriptionKind::StreamOnline));
            }
            if !has_offline {
                wanted.push((profile.id.clone(), SubscriptionKind::StreamOffline));
            }
        }

        let requests = wanted.iter().map(|(id, kind)| async move {
            let result = match kind {
                SubscriptionKind::StreamOnline => self.events.create_online_sub(id).await,
                _ => self.events.create_offline_sub(id).await,
            };
            (id.clone(), result)
        });

        for (id, result) in join_all(requests).await {
            match result {
                Ok(handle) => {
                    debug!("reconcile: created subscription {} for {}", handle, id);
                    report.created += 1;
                }
                Err(e) => report.fail(Some(id), "create subscription", e),
            }
        }
    }

    /// Publishes `Online` for roster members that are already live, since
    /// their webhook fired before we were listening.
    async fn announce_live(&self, profiles: &[BroadcasterProfile], report: &mut ReconcileReport) {
        for profile in profiles {
            if self.is_excluded(profile) {
                debug!("reconcile: {} is a test account; not checked for a live stream", profile.login);
                continue;
            }

            match self.events.current_stream(&profile.id).await {
                Ok(Some(stream)) => {
                    info!("{} is already live; announcing", profile.display_name);
                    let event = StreamEvent::Online {
                        broadcaster: profile.broadcaster(),
                        stream,
                    };
                    match self.bus.publish(event).await {
                        Ok(()) => report.announced.push(profile.id.clone()),
                        Err(e) => {
                            error!("could not publish initial online for {}: {}", profile.id, e);
                            report.fail(Some(profile.id.clone()), "publish online", e);
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => report.fail(Some(profile.id.clone()), "check live stream", e),
            }
        }
    }
}
