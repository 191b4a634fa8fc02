// File: clubstream-common/src/models/mod.rs
pub mod discord;
pub mod twitch;

pub use discord::{DiscordColor, MessageContent, MessageHandle};
pub use twitch::{
    Broadcaster, BroadcasterId, BroadcasterProfile, StreamMeta, SubscriptionHandle,
    SubscriptionKind, SubscriptionRecord, SubscriptionStatus,
};
