// File: clubstream-common/src/models/twitch.rs

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable Twitch user id of a tracked broadcaster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BroadcasterId(pub String);

impl BroadcasterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BroadcasterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BroadcasterId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for BroadcasterId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The bits of a broadcaster that every event carries; enough to render a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Broadcaster {
    pub id: BroadcasterId,
    pub login: String,
    pub display_name: String,
}

impl Broadcaster {
    pub fn new(id: impl Into<String>, login: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: BroadcasterId(id.into()),
            login: login.into(),
            display_name: display_name.into(),
        }
    }
}

/// A resolved Helix user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcasterProfile {
    pub id: BroadcasterId,
    pub login: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
}

impl BroadcasterProfile {
    pub fn broadcaster(&self) -> Broadcaster {
        Broadcaster {
            id: self.id.clone(),
            login: self.login.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

/// What we know about a running stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMeta {
    pub title: String,
    pub game_name: String,
    pub started_at: Option<DateTime<Utc>>,
}

impl StreamMeta {
    /// Title and game on separate lines, skipping whichever is empty.
    pub fn description(&self) -> String {
        [self.title.as_str(), self.game_name.as_str()]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Opaque id of a remote EventSub subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionHandle(pub String);

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubscriptionKind {
    StreamOnline,
    StreamOffline,
    ChannelUpdate,
    /// Any subscription type we never create ourselves.
    Other(String),
}

impl SubscriptionKind {
    pub fn as_str(&self) -> &str {
        match self {
            SubscriptionKind::StreamOnline => "stream.online",
            SubscriptionKind::StreamOffline => "stream.offline",
            SubscriptionKind::ChannelUpdate => "channel.update",
            SubscriptionKind::Other(s) => s.as_str(),
        }
    }

    /// EventSub version string used when creating a subscription of this kind.
    pub fn version(&self) -> &'static str {
        match self {
            SubscriptionKind::ChannelUpdate => "2",
            _ => "1",
        }
    }
}

impl fmt::Display for SubscriptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "stream.online" => SubscriptionKind::StreamOnline,
            "stream.offline" => SubscriptionKind::StreamOffline,
            "channel.update" => SubscriptionKind::ChannelUpdate,
            other => SubscriptionKind::Other(other.to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Enabled,
    VerificationPending,
    /// Revoked, failed verification, too many failures... carries the raw status.
    Failed(String),
}

impl SubscriptionStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "enabled" => SubscriptionStatus::Enabled,
            "webhook_callback_verification_pending" => SubscriptionStatus::VerificationPending,
            other => SubscriptionStatus::Failed(other.to_string()),
        }
    }
}

/// Remote-side subscription as listed by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRecord {
    pub handle: SubscriptionHandle,
    /// `None` when the condition carries no `broadcaster_user_id`.
    pub broadcaster_id: Option<BroadcasterId>,
    pub kind: SubscriptionKind,
    pub status: SubscriptionStatus,
}

impl SubscriptionRecord {
    pub fn is_active(&self) -> bool {
        !matches!(self.status, SubscriptionStatus::Failed(_))
    }

    pub fn belongs_to(&self, id: &BroadcasterId) -> bool {
        self.broadcaster_id.as_ref() == Some(id)
    }
}
