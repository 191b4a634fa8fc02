// File: clubstream-core/src/platforms/twitch_eventsub/events/base.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use clubstream_common::models::{
    BroadcasterId, SubscriptionHandle, SubscriptionKind, SubscriptionRecord, SubscriptionStatus,
};

/// Subscription metadata as Twitch sends it, both in listings and in every
/// webhook body.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubscriptionData {
    pub id: String,
    #[serde(rename = "type")]
    pub sub_type: String,
    pub version: String,
    pub status: String,
    #[serde(default)]
    pub cost: u32,

    #[serde(default)]
    pub condition: serde_json::Value,

    #[serde(default)]
    pub transport: serde_json::Value,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl SubscriptionData {
    /// `None` when the condition has no (or an empty) `broadcaster_user_id`.
    pub fn broadcaster_id(&self) -> Option<BroadcasterId> {
        self.condition
            .get("broadcaster_user_id")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(BroadcasterId::from)
    }

    pub fn to_record(&self) -> SubscriptionRecord {
        SubscriptionRecord {
            handle: SubscriptionHandle(self.id.clone()),
            broadcaster_id: self.broadcaster_id(),
            kind: self.kind(),
            status: SubscriptionStatus::parse(&self.status),
        }
    }

    pub fn kind(&self) -> SubscriptionKind {
        match self.sub_type.parse() {
            Ok(kind) => kind,
            Err(never) => match never {},
        }
    }
}

/// Body of a webhook `notification`: `{ "subscription": { ... }, "event": { ... } }`
#[derive(Debug, Clone, Deserialize)]
pub struct EventSubNotificationEnvelope {
    pub subscription: SubscriptionData,
    pub event: serde_json::Value,
}

/// Body of a `webhook_callback_verification` request.
#[derive(Debug, Clone, Deserialize)]
pub struct EventSubVerification {
    pub challenge: String,
    pub subscription: SubscriptionData,
}

/// Body of a `revocation` request.
#[derive(Debug, Clone, Deserialize)]
pub struct EventSubRevocation {
    pub subscription: SubscriptionData,
}
