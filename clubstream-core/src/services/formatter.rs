// File: src/services/formatter.rs

use chrono::{DateTime, Utc};

use clubstream_common::models::{Broadcaster, DiscordColor, MessageContent, StreamMeta};

fn channel_url(broadcaster: &Broadcaster) -> String {
    let name = if broadcaster.login.is_empty() {
        broadcaster.display_name.to_lowercase()
    } else {
        broadcaster.login.to_lowercase()
    };
    format!("https://twitch.tv/{}", name)
}

/// Green "started" card. The timestamp is the session start, so it stays
/// put across title/category edits.
pub fn online_content(
    broadcaster: &Broadcaster,
    stream: &StreamMeta,
    session_started_at: DateTime<Utc>,
) -> MessageContent {
    let description = stream.description();
    MessageContent {
        title: broadcaster.display_name.clone(),
        url: Some(channel_url(broadcaster)),
        description: (!description.is_empty()).then_some(description),
        color: DiscordColor::GREEN,
        footer: "started".to_string(),
        timestamp: session_started_at,
    }
}

/// Red "ended" card stamped with the time the offline event was handled.
pub fn offline_content(broadcaster: &Broadcaster, now: DateTime<Utc>) -> MessageContent {
    MessageContent {
        title: broadcaster.display_name.clone(),
        url: Some(channel_url(broadcaster)),
        description: None,
        color: DiscordColor::RED,
        footer: "ended".to_string(),
        timestamp: now,
    }
}
