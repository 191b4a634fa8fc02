// File: src/services/notification_manager.rs
//
// One status message per broadcaster. Going live always gets a fresh message;
// every other transition edits the existing one in place.
//
// Known limitation: webhook delivery can be out of order. An `offline` that
// arrives after a newer `online` for the same broadcaster marks the entry
// offline. Provider message timestamps could be used to reject such events,
// but that changes product behavior and is left alone here.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use clubstream_common::models::{Broadcaster, BroadcasterId, MessageHandle, StreamMeta};
use clubstream_common::traits::{EventSource, PresentationSink};

use crate::config::ExpiryPolicy;
use crate::eventbus::StreamEvent;
use crate::services::formatter::{offline_content, online_content};
use crate::services::update_subscriptions::UpdateSubscriptions;
use crate::Error;

/// The message we currently hold for one broadcaster.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationState {
    pub broadcaster: Broadcaster,
    pub message: MessageHandle,
    pub is_online: bool,
    /// Set when the broadcaster goes live; kept across edits.
    pub session_started_at: DateTime<Utc>,
    pub last_changed_at: DateTime<Utc>,
}

pub struct NotificationManager {
    sink: Arc<dyn PresentationSink>,
    update_subs: UpdateSubscriptions,
    expiry: ExpiryPolicy,
    entries: HashMap<BroadcasterId, NotificationState>,
}

/// Webhook start times carry milliseconds, Helix ones whole seconds.
fn same_second(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a.timestamp() == b.timestamp()
}

/// Logs and swallows a non-fatal sink error; fatal ones bubble up.
fn absorb<T>(result: Result<T, Error>, what: &str, id: &BroadcasterId) -> Result<Option<T>, Error> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.is_fatal() => {
            error!("{} for {} failed fatally: {}", what, id, e);
            Err(e)
        }
        Err(e) => {
            warn!("{} for {} failed: {}", what, id, e);
            Ok(None)
        }
    }
}

impl NotificationManager {
    pub fn new(
        sink: Arc<dyn PresentationSink>,
        events: Arc<dyn EventSource>,
        expiry: ExpiryPolicy,
    ) -> Self {
        Self {
            sink,
            update_subs: UpdateSubscriptions::new(events),
            expiry,
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, broadcaster_id: &BroadcasterId) -> Option<&NotificationState> {
        self.entries.get(broadcaster_id)
    }

    pub fn has_update_subscription(&self, broadcaster_id: &BroadcasterId) -> bool {
        self.update_subs.contains(broadcaster_id)
    }

    /// Routes one event to its handler. Only fatal errors are returned.
    pub async fn handle(&mut self, event: StreamEvent, now: DateTime<Utc>) -> Result<(), Error> {
        debug!("handling {} for {}", event.event_type(), event.broadcaster_id());
        match event {
            StreamEvent::Online { broadcaster, stream } => self.on_online(broadcaster, stream, now).await,
            StreamEvent::Offline { broadcaster } => self.on_offline(broadcaster, now).await,
            StreamEvent::Update { broadcaster, stream } => self.on_update(broadcaster, stream, now).await,
            StreamEvent::Unsubscribed { broadcaster_id } => self.on_unsubscribed(&broadcaster_id).await,
        }
    }

    pub async fn on_online(
        &mut self,
        broadcaster: Broadcaster,
        stream: StreamMeta,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        let id = broadcaster.id.clone();

        if let Some(entry) = self.entries.get_mut(&id) {
            let new_session = stream
                .started_at
                .is_some_and(|started| !same_second(started, entry.session_started_at));

            if entry.is_online && !new_session {
                // Redundant delivery of the same online event.
                debug!("{} already announced for this session; refreshing in place", id);
                let content = online_content(&broadcaster, &stream, entry.session_started_at);
                absorb(self.sink.edit(&entry.message, &content).await, "edit", &id)?;
                entry.broadcaster = broadcaster;
                entry.last_changed_at = now;
                return Ok(());
            }
        }

        // Absent, offline, or a new session: old context must not linger.
        if let Some(old) = self.entries.remove(&id) {
            absorb(self.sink.delete(&old.message).await, "delete", &id)?;
        }

        let session_started_at = stream.started_at.unwrap_or(now);
        let content = online_content(&broadcaster, &stream, session_started_at);
        let Some(message) = absorb(self.sink.post(&content).await, "post", &id)? else {
            return Ok(());
        };

        info!("{} is online; posted {}", broadcaster.display_name, message);
        self.entries.insert(
            id.clone(),
            NotificationState {
                broadcaster,
                message,
                is_online: true,
                session_started_at,
                last_changed_at: now,
            },
        );
        self.update_subs.open(&id).await;
        Ok(())
    }

    pub async fn on_offline(&mut self, broadcaster: Broadcaster, now: DateTime<Utc>) -> Result<(), Error> {
        let id = broadcaster.id.clone();
        let content = offline_content(&broadcaster, now);

        match self.entries.get_mut(&id) {
            Some(entry) => {
                absorb(self.sink.edit(&entry.message, &content).await, "edit", &id)?;
                if entry.is_online {
                    info!("{} went offline", broadcaster.display_name);
                }
                entry.broadcaster = broadcaster;
                entry.is_online = false;
                entry.last_changed_at = now;
            }
            None => {
                if let Some(message) = absorb(self.sink.post(&content).await, "post", &id)? {
                    info!("{} is offline; posted ended notice {}", broadcaster.display_name, message);
                    self.entries.insert(
                        id.clone(),
                        NotificationState {
                            broadcaster,
                            message,
                            is_online: false,
                            session_started_at: now,
                            last_changed_at: now,
                        },
                    );
                }
            }
        }

        self.update_subs.close(&id).await;
        Ok(())
    }

    pub async fn on_update(
        &mut self,
        broadcaster: Broadcaster,
        stream: StreamMeta,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        let id = broadcaster.id.clone();
        let Some(entry) = self.entries.get_mut(&id) else {
            debug!("update for {} without a message; ignored", id);
            return Ok(());
        };
        if !entry.is_online {
            debug!("update for offline {}; ignored", id);
            return Ok(());
        }

        let content = online_content(&broadcaster, &stream, entry.session_started_at);
        absorb(self.sink.edit(&entry.message, &content).await, "edit", &id)?;
        entry.broadcaster = broadcaster;
        entry.last_changed_at = now;
        Ok(())
    }

    pub async fn on_unsubscribed(&mut self, broadcaster_id: &BroadcasterId) -> Result<(), Error> {
        self.remove(broadcaster_id).await;
        Ok(())
    }

    /// Drops expired entries, or every entry when `force_all` is set, and
    /// retries `channel.update` deletes that failed earlier.
    /// Returns how many entries were removed.
    pub async fn sweep(&mut self, now: DateTime<Utc>, force_all: bool) -> usize {
        let retried = self.update_subs.retry_orphaned().await;
        if retried > 0 {
            debug!("sweep deleted {} leftover channel.update subscription(s)", retried);
        }

        let mut expired: Vec<BroadcasterId> = self
            .entries
            .iter()
            .filter(|(_, entry)| force_all || self.is_expired(entry, now))
            .map(|(id, _)| id.clone())
            .collect();
        expired.sort();

        for id in &expired {
            self.remove(id).await;
        }

        if !expired.is_empty() {
            info!("sweep removed {} message(s) (force_all={})", expired.len(), force_all);
        }
        expired.len()
    }

    fn is_expired(&self, entry: &NotificationState, now: DateTime<Utc>) -> bool {
        let age = now - entry.last_changed_at;
        age > self.expiry.max_age || (!entry.is_online && age > self.expiry.offline_max_age)
    }

    /// Removes the entry and its message. The message delete is best-effort;
    /// the entry goes away regardless.
    async fn remove(&mut self, broadcaster_id: &BroadcasterId) {
        if let Some(entry) = self.entries.remove(broadcaster_id) {
            match self.sink.delete(&entry.message).await {
                Ok(()) => debug!("deleted message {} for {}", entry.message, broadcaster_id),
                Err(e) => warn!(
                    "could not delete message {} for {}: {}",
                    entry.message, broadcaster_id, e
                ),
            }
        }
        self.update_subs.close(broadcaster_id).await;
    }
}
