// File: src/services/update_subscriptions.rs

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use clubstream_common::models::{BroadcasterId, SubscriptionHandle};
use clubstream_common::traits::EventSource;

/// Tracks the `channel.update` subscription we hold for each live broadcaster.
/// At most one handle per broadcaster.
pub struct UpdateSubscriptions {
    events: Arc<dyn EventSource>,
    refs: HashMap<BroadcasterId, SubscriptionHandle>,
    /// Closed locally but the remote delete failed; retried by `retry_orphaned`.
    orphaned: Vec<(BroadcasterId, SubscriptionHandle)>,
}

impl UpdateSubscriptions {
    pub fn new(events: Arc<dyn EventSource>) -> Self {
        Self {
            events,
            refs: HashMap::new(),
            orphaned: Vec::new(),
        }
    }

    pub fn contains(&self, broadcaster_id: &BroadcasterId) -> bool {
        self.refs.contains_key(broadcaster_id)
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Handles whose remote delete is still outstanding.
    pub fn orphaned_len(&self) -> usize {
        self.orphaned.len()
    }

    /// Subscribes to metadata changes unless a subscription is already held.
    /// A failed request records nothing; the next online transition retries.
    pub async fn open(&mut self, broadcaster_id: &BroadcasterId) {
        if self.refs.contains_key(broadcaster_id) {
            debug!("update subscription for {} already held", broadcaster_id);
            return;
        }

        match self.events.create_update_sub(broadcaster_id).await {
            Ok(handle) => {
                info!("subscribed to channel.update for {} ({})", broadcaster_id, handle);
                self.refs.insert(broadcaster_id.clone(), handle);
            }
            Err(e) => {
                warn!("could not subscribe to channel.update for {}: {}", broadcaster_id, e);
            }
        }
    }

    /// Cancels the held subscription, if any. The broadcaster stops counting
    /// as subscribed right away; a failed remote delete parks the handle for
    /// `retry_orphaned`.
    pub async fn close(&mut self, broadcaster_id: &BroadcasterId) {
        let Some(handle) = self.refs.remove(broadcaster_id) else {
            return;
        };

        match self.events.delete_subscription(&handle).await {
            Ok(()) => info!("unsubscribed channel.update for {} ({})", broadcaster_id, handle),
            Err(e) => {
                warn!(
                    "could not delete channel.update subscription {} for {}: {}; will retry",
                    handle, broadcaster_id, e
                );
                self.orphaned.push((broadcaster_id.clone(), handle));
            }
        }
    }

    /// Retries the deletes that failed in `close`. Returns how many went through.
    pub async fn retry_orphaned(&mut self) -> usize {
        if self.orphaned.is_empty() {
            return 0;
        }

        let pending = std::mem::take(&mut self.orphaned);
        let total = pending.len();
        for (broadcaster_id, handle) in pending {
            match self.events.delete_subscription(&handle).await {
                Ok(()) => debug!("deleted leftover channel.update {} for {}", handle, broadcaster_id),
                Err(e) => {
                    debug!("leftover channel.update {} still not deleted: {}", handle, e);
                    self.orphaned.push((broadcaster_id, handle));
                }
            }
        }
        total - self.orphaned.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clubstream_common::models::SubscriptionKind;

    use crate::test_utils::{FakeEventSource, SourceCall};

    #[tokio::test]
    async fn open_is_idempotent() {
        let source = Arc::new(FakeEventSource::new());
        let mut subs = UpdateSubscriptions::new(source.clone());
        let id = BroadcasterId::from("42");

        subs.open(&id).await;
        subs.open(&id).await;

        assert!(subs.contains(&id));
        assert_eq!(subs.len(), 1);
        let creates = source
            .calls()
            .await
            .into_iter()
            .filter(|c| matches!(c, SourceCall::CreateUpdate(_)))
            .count();
        assert_eq!(creates, 1);
    }

    #[tokio::test]
    async fn close_without_subscription_is_a_no_op() {
        let source = Arc::new(FakeEventSource::new());
        let mut subs = UpdateSubscriptions::new(source.clone());

        subs.close(&BroadcasterId::from("42")).await;

        assert!(source.calls().await.is_empty());
    }

    #[tokio::test]
    async fn failed_open_records_nothing_and_failed_close_is_retried() {
        let source = Arc::new(FakeEventSource::new());
        let mut subs = UpdateSubscriptions::new(source.clone());
        let id = BroadcasterId::from("42");

        source.fail_creates_for(&id).await;
        subs.open(&id).await;
        assert!(!subs.contains(&id));

        source.clear_failures().await;
        subs.open(&id).await;
        assert!(subs.contains(&id));

        source.fail_deletes(true).await;
        subs.close(&id).await;
        assert!(subs.is_empty());
        assert_eq!(subs.orphaned_len(), 1);

        assert_eq!(subs.retry_orphaned().await, 0);
        assert_eq!(subs.orphaned_len(), 1);

        source.clear_failures().await;
        assert_eq!(subs.retry_orphaned().await, 1);
        assert_eq!(subs.orphaned_len(), 0);
        assert_eq!(source.count_subscriptions("42", SubscriptionKind::ChannelUpdate).await, 0);
    }
}
