use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Id of a message we posted into the notification channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageHandle(pub String);

impl fmt::Display for MessageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Embed colors (Discord brand green and red).
pub struct DiscordColor;

impl DiscordColor {
    pub const GREEN: u32 = 0x57F287;
    pub const RED: u32 = 0xED4245;
}

/// Everything a sink needs to render one status message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
    pub title: String,
    pub url: Option<String>,
    pub description: Option<String>,
    pub color: u32,
    pub footer: String,
    pub timestamp: DateTime<Utc>,
}
