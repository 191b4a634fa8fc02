// File: clubstream-core/src/platforms/twitch_eventsub/events/mod.rs

pub mod base;
pub mod stream_online_offline;
pub mod update;

pub use base::*;
pub use stream_online_offline::*;
pub use update::*;

use crate::Error;

/// Value of the `Twitch-Eventsub-Message-Type` header.
pub const MESSAGE_TYPE_VERIFICATION: &str = "webhook_callback_verification";
pub const MESSAGE_TYPE_NOTIFICATION: &str = "notification";
pub const MESSAGE_TYPE_REVOCATION: &str = "revocation";

/// A decoded webhook request.
#[derive(Debug, Clone)]
pub enum EventSubMessage {
    Verification(EventSubVerification),
    Notification(Notification),
    Revocation(EventSubRevocation),
}

/// The notifications we subscribe to. Anything else decodes to `Unsupported`
/// so the caller can drop it explicitly.
#[derive(Debug, Clone)]
pub enum Notification {
    Online(StreamOnline),
    Offline(StreamOffline),
    Update(ChannelUpdate),
    Unsupported(String),
}

/// Parses one `event` payload by subscription type.
pub fn parse_twitch_notification(sub_type: &str, event_json: &serde_json::Value) -> Result<Notification, Error> {
    let notification = match sub_type {
        "stream.online" => Notification::Online(serde_json::from_value(event_json.clone())?),
        "stream.offline" => Notification::Offline(serde_json::from_value(event_json.clone())?),
        "channel.update" => Notification::Update(serde_json::from_value(event_json.clone())?),
        other => Notification::Unsupported(other.to_string()),
    };
    Ok(notification)
}

/// Decodes a webhook body according to its message-type header. Malformed
/// bodies and unknown message types are errors.
pub fn parse_eventsub_message(message_type: &str, body: &[u8]) -> Result<EventSubMessage, Error> {
    match message_type {
        MESSAGE_TYPE_VERIFICATION => Ok(EventSubMessage::Verification(serde_json::from_slice(body)?)),
        MESSAGE_TYPE_REVOCATION => Ok(EventSubMessage::Revocation(serde_json::from_slice(body)?)),
        MESSAGE_TYPE_NOTIFICATION => {
            let env: EventSubNotificationEnvelope = serde_json::from_slice(body)?;
            let notification = parse_twitch_notification(&env.subscription.sub_type, &env.event)?;
            Ok(EventSubMessage::Notification(notification))
        }
        other => Err(Error::Parse(format!("unknown EventSub message type '{}'", other))),
    }
}
