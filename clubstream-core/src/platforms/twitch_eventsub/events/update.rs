use serde::Deserialize;

use clubstream_common::models::{Broadcaster, StreamMeta};

/// "channel.update" event (version 2)
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelUpdate {
    pub broadcaster_user_id: String,
    pub broadcaster_user_login: String,
    pub broadcaster_user_name: String,
    pub title: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub category_id: String,
    #[serde(default)]
    pub category_name: String,
    #[serde(default)]
    pub content_classification_labels: Vec<String>,
}

impl ChannelUpdate {
    pub fn broadcaster(&self) -> Broadcaster {
        Broadcaster::new(
            self.broadcaster_user_id.clone(),
            self.broadcaster_user_login.clone(),
            self.broadcaster_user_name.clone(),
        )
    }

    /// No start time here; the notification manager keeps the session's.
    pub fn stream_meta(&self) -> StreamMeta {
        StreamMeta {
            title: self.title.clone(),
            game_name: self.category_name.clone(),
            started_at: None,
        }
    }
}
