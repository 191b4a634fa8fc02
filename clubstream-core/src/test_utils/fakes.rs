// File: clubstream-core/src/test_utils/fakes.rs

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use clubstream_common::models::{
    BroadcasterId, BroadcasterProfile, MessageContent, MessageHandle, StreamMeta,
    SubscriptionHandle, SubscriptionKind, SubscriptionRecord, SubscriptionStatus,
};
use clubstream_common::traits::{EventSource, PresentationSink, RosterSource};

use crate::Error;

pub fn profile(id: &str, login: &str, description: &str) -> BroadcasterProfile {
    BroadcasterProfile {
        id: BroadcasterId::from(id),
        login: login.to_string(),
        display_name: login.to_string(),
        description: description.to_string(),
    }
}

pub fn subscription(handle: &str, broadcaster_id: &str, kind: SubscriptionKind) -> SubscriptionRecord {
    SubscriptionRecord {
        handle: SubscriptionHandle(handle.to_string()),
        broadcaster_id: Some(BroadcasterId::from(broadcaster_id)),
        kind,
        status: SubscriptionStatus::Enabled,
    }
}

// ---------------------------------------------------------------------------
// EventSource
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum SourceCall {
    List,
    CreateOnline(BroadcasterId),
    CreateOffline(BroadcasterId),
    CreateUpdate(BroadcasterId),
    Delete(SubscriptionHandle),
    Resolve(Vec<String>),
    CurrentStream(BroadcasterId),
}

impl SourceCall {
    pub fn is_create(&self) -> bool {
        matches!(
            self,
            SourceCall::CreateOnline(_) | SourceCall::CreateOffline(_) | SourceCall::CreateUpdate(_)
        )
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, SourceCall::Delete(_))
    }
}

#[derive(Default)]
struct SourceFailures {
    creates_for: HashSet<BroadcasterId>,
    deletes: bool,
    listing: bool,
    resolving: bool,
    probing: bool,
}

/// Subscription registry and user directory kept in memory. Created
/// subscriptions show up in the next listing, deletes of unknown handles
/// succeed (like a 404 that the Helix client treats as already gone).
#[derive(Default)]
pub struct FakeEventSource {
    users: Mutex<Vec<BroadcasterProfile>>,
    live: Mutex<HashMap<BroadcasterId, StreamMeta>>,
    subs: Mutex<Vec<SubscriptionRecord>>,
    calls: Mutex<Vec<SourceCall>>,
    failures: Mutex<SourceFailures>,
    next_id: AtomicU64,
}

impl FakeEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, profile: BroadcasterProfile) {
        self.users.lock().await.push(profile);
    }

    pub async fn set_live(&self, id: &str, stream: StreamMeta) {
        self.live.lock().await.insert(BroadcasterId::from(id), stream);
    }

    pub async fn set_offline(&self, id: &str) {
        self.live.lock().await.remove(&BroadcasterId::from(id));
    }

    pub async fn add_subscription(&self, record: SubscriptionRecord) {
        self.subs.lock().await.push(record);
    }

    pub async fn subscriptions(&self) -> Vec<SubscriptionRecord> {
        self.subs.lock().await.clone()
    }

    /// Active subscriptions of one kind held for a broadcaster.
    pub async fn count_subscriptions(&self, id: &str, kind: SubscriptionKind) -> usize {
        let id = BroadcasterId::from(id);
        self.subs
            .lock()
            .await
            .iter()
            .filter(|s| s.belongs_to(&id) && s.kind == kind)
            .count()
    }

    pub async fn calls(&self) -> Vec<SourceCall> {
        self.calls.lock().await.clone()
    }

    pub async fn reset_calls(&self) {
        self.calls.lock().await.clear();
    }

    pub async fn fail_creates_for(&self, id: &BroadcasterId) {
        self.failures.lock().await.creates_for.insert(id.clone());
    }

    pub async fn fail_deletes(&self, fail: bool) {
        self.failures.lock().await.deletes = fail;
    }

    pub async fn fail_listing(&self, fail: bool) {
        self.failures.lock().await.listing = fail;
    }

    pub async fn fail_resolving(&self, fail: bool) {
        self.failures.lock().await.resolving = fail;
    }

    pub async fn fail_probing(&self, fail: bool) {
        self.failures.lock().await.probing = fail;
    }

    pub async fn clear_failures(&self) {
        *self.failures.lock().await = SourceFailures::default();
    }

    async fn create(&self, id: &BroadcasterId, kind: SubscriptionKind) -> Result<SubscriptionHandle, Error> {
        let call = match kind {
            SubscriptionKind::StreamOnline => SourceCall::CreateOnline(id.clone()),
            SubscriptionKind::StreamOffline => SourceCall::CreateOffline(id.clone()),
            _ => SourceCall::CreateUpdate(id.clone()),
        };
        self.calls.lock().await.push(call);

        if self.failures.lock().await.creates_for.contains(id) {
            return Err(Error::Platform(format!("HTTP 429 creating {} for {}", kind, id)));
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let handle = SubscriptionHandle(format!("sub-{}", n));
        self.subs.lock().await.push(SubscriptionRecord {
            handle: handle.clone(),
            broadcaster_id: Some(id.clone()),
            kind,
            status: SubscriptionStatus::Enabled,
        });
        Ok(handle)
    }
}

#[async_trait]
impl EventSource for FakeEventSource {
    async fn list_subscriptions(&self) -> Result<Vec<SubscriptionRecord>, Error> {
        self.calls.lock().await.push(SourceCall::List);
        if self.failures.lock().await.listing {
            return Err(Error::Platform("HTTP 503 listing subscriptions".into()));
        }
        Ok(self.subs.lock().await.clone())
    }

    async fn create_online_sub(&self, broadcaster_id: &BroadcasterId) -> Result<SubscriptionHandle, Error> {
        self.create(broadcaster_id, SubscriptionKind::StreamOnline).await
    }

    async fn create_offline_sub(&self, broadcaster_id: &BroadcasterId) -> Result<SubscriptionHandle, Error> {
        self.create(broadcaster_id, SubscriptionKind::StreamOffline).await
    }

    async fn create_update_sub(&self, broadcaster_id: &BroadcasterId) -> Result<SubscriptionHandle, Error> {
        self.create(broadcaster_id, SubscriptionKind::ChannelUpdate).await
    }

    async fn delete_subscription(&self, handle: &SubscriptionHandle) -> Result<(), Error> {
        self.calls.lock().await.push(SourceCall::Delete(handle.clone()));
        if self.failures.lock().await.deletes {
            return Err(Error::Platform(format!("HTTP 500 deleting {}", handle)));
        }
        self.subs.lock().await.retain(|s| &s.handle != handle);
        Ok(())
    }

    async fn resolve_users(&self, names: &[String]) -> Result<Vec<BroadcasterProfile>, Error> {
        self.calls.lock().await.push(SourceCall::Resolve(names.to_vec()));
        if self.failures.lock().await.resolving {
            return Err(Error::Platform("HTTP 503 resolving users".into()));
        }
        let wanted: HashSet<String> = names.iter().map(|n| n.to_lowercase()).collect();
        Ok(self
            .users
            .lock()
            .await
            .iter()
            .filter(|u| wanted.contains(&u.login.to_lowercase()))
            .cloned()
            .collect())
    }

    async fn current_stream(&self, broadcaster_id: &BroadcasterId) -> Result<Option<StreamMeta>, Error> {
        self.calls.lock().await.push(SourceCall::CurrentStream(broadcaster_id.clone()));
        if self.failures.lock().await.probing {
            return Err(Error::Platform("HTTP 500 fetching stream".into()));
        }
        Ok(self.live.lock().await.get(broadcaster_id).cloned())
    }
}

// ---------------------------------------------------------------------------
// PresentationSink
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    Post(MessageContent),
    Edit(MessageHandle, MessageContent),
    Delete(MessageHandle),
}

#[derive(Default)]
struct SinkFailures {
    posts: bool,
    posts_fatally: bool,
    edits: bool,
    deletes: bool,
}

/// Records every call (including failed attempts) and keeps the set of
/// messages that would still be visible in the channel.
#[derive(Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<SinkCall>>,
    visible: Mutex<HashMap<MessageHandle, MessageContent>>,
    failures: Mutex<SinkFailures>,
    next_id: AtomicU64,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().await.clone()
    }

    pub async fn reset_calls(&self) {
        self.calls.lock().await.clear();
    }

    pub async fn posts(&self) -> usize {
        self.calls.lock().await.iter().filter(|c| matches!(c, SinkCall::Post(_))).count()
    }

    pub async fn edits(&self) -> usize {
        self.calls.lock().await.iter().filter(|c| matches!(c, SinkCall::Edit(..))).count()
    }

    pub async fn deletes(&self) -> usize {
        self.calls.lock().await.iter().filter(|c| matches!(c, SinkCall::Delete(_))).count()
    }

    /// Messages posted and not (successfully) deleted.
    pub async fn visible(&self) -> HashMap<MessageHandle, MessageContent> {
        self.visible.lock().await.clone()
    }

    pub async fn fail_posts(&self, fail: bool) {
        self.failures.lock().await.posts = fail;
    }

    pub async fn fail_posts_fatally(&self, fail: bool) {
        self.failures.lock().await.posts_fatally = fail;
    }

    pub async fn fail_edits(&self, fail: bool) {
        self.failures.lock().await.edits = fail;
    }

    pub async fn fail_deletes(&self, fail: bool) {
        self.failures.lock().await.deletes = fail;
    }
}

#[async_trait]
impl PresentationSink for RecordingSink {
    async fn post(&self, content: &MessageContent) -> Result<MessageHandle, Error> {
        self.calls.lock().await.push(SinkCall::Post(content.clone()));
        {
            let failures = self.failures.lock().await;
            if failures.posts_fatally {
                return Err(Error::Config("channel could not be found".into()));
            }
            if failures.posts {
                return Err(Error::Platform("HTTP 502 posting message".into()));
            }
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let handle = MessageHandle(format!("msg-{}", n));
        self.visible.lock().await.insert(handle.clone(), content.clone());
        Ok(handle)
    }

    async fn edit(&self, handle: &MessageHandle, content: &MessageContent) -> Result<(), Error> {
        self.calls.lock().await.push(SinkCall::Edit(handle.clone(), content.clone()));
        if self.failures.lock().await.edits {
            return Err(Error::Platform("HTTP 502 editing message".into()));
        }
        if let Some(shown) = self.visible.lock().await.get_mut(handle) {
            *shown = content.clone();
        }
        Ok(())
    }

    async fn delete(&self, handle: &MessageHandle) -> Result<(), Error> {
        self.calls.lock().await.push(SinkCall::Delete(handle.clone()));
        if self.failures.lock().await.deletes {
            return Err(Error::Platform("HTTP 502 deleting message".into()));
        }
        self.visible.lock().await.remove(handle);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RosterSource
// ---------------------------------------------------------------------------

/// Roster that returns whatever was last set.
#[derive(Default)]
pub struct StaticRoster {
    names: Mutex<HashSet<String>>,
    fail: Mutex<bool>,
    fetches: AtomicU64,
}

impl StaticRoster {
    pub fn new(names: &[&str]) -> Self {
        Self {
            names: Mutex::new(names.iter().map(|n| n.to_string()).collect()),
            ..Self::default()
        }
    }

    pub async fn set(&self, names: &[&str]) {
        *self.names.lock().await = names.iter().map(|n| n.to_string()).collect();
    }

    pub async fn fail(&self, fail: bool) {
        *self.fail.lock().await = fail;
    }

    pub fn fetches(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RosterSource for StaticRoster {
    async fn fetch_roster(&self, _source_ids: &[String]) -> Result<HashSet<String>, Error> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if *self.fail.lock().await {
            return Err(Error::Platform("trackmania.io timed out".into()));
        }
        Ok(self.names.lock().await.clone())
    }
}
