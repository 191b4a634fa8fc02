//! Narrow seams to the outside world. The reconciler and the notification
//! manager only ever talk to these traits; the concrete Helix, Discord and
//! trackmania.io clients live in `clubstream-core::platforms`.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::Error;
use crate::models::{
    BroadcasterId, BroadcasterProfile, MessageContent, MessageHandle, StreamMeta,
    SubscriptionHandle, SubscriptionRecord,
};

/// Where the desired set of tracked accounts comes from.
#[async_trait]
pub trait RosterSource: Send + Sync {
    /// Returns account names (not ids) for every source id. Pagination is the
    /// implementation's business; any failure fails the whole fetch.
    async fn fetch_roster(&self, source_ids: &[String]) -> Result<HashSet<String>, Error>;
}

/// Subscription registry and directory of the streaming platform.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn list_subscriptions(&self) -> Result<Vec<SubscriptionRecord>, Error>;

    async fn create_online_sub(&self, broadcaster_id: &BroadcasterId) -> Result<SubscriptionHandle, Error>;

    async fn create_offline_sub(&self, broadcaster_id: &BroadcasterId) -> Result<SubscriptionHandle, Error>;

    /// Secondary "stream metadata changed" subscription.
    async fn create_update_sub(&self, broadcaster_id: &BroadcasterId) -> Result<SubscriptionHandle, Error>;

    async fn delete_subscription(&self, handle: &SubscriptionHandle) -> Result<(), Error>;

    /// Unknown names are simply missing from the result.
    async fn resolve_users(&self, names: &[String]) -> Result<Vec<BroadcasterProfile>, Error>;

    /// `Ok(None)` when the broadcaster is not live right now.
    async fn current_stream(&self, broadcaster_id: &BroadcasterId) -> Result<Option<StreamMeta>, Error>;
}

/// The chat channel the status messages end up in.
#[async_trait]
pub trait PresentationSink: Send + Sync {
    async fn post(&self, content: &MessageContent) -> Result<MessageHandle, Error>;

    async fn edit(&self, handle: &MessageHandle, content: &MessageContent) -> Result<(), Error>;

    async fn delete(&self, handle: &MessageHandle) -> Result<(), Error>;
}
