// ========================================================
// File: clubstream-core/src/platforms/twitch/requests/stream.rs
// ========================================================
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use clubstream_common::models::{BroadcasterId, StreamMeta};

use crate::platforms::twitch::client::{check_status, TwitchHelixClient};
use crate::Error;

/// Response from "Get Streams" endpoint.
#[derive(Debug, Deserialize)]
pub struct StreamsResponse {
    pub data: Vec<StreamData>,
}

/// Single stream data record.
#[derive(Debug, Deserialize)]
pub struct StreamData {
    pub id: String,
    pub user_id: String,
    pub user_login: String,
    pub user_name: String,
    #[serde(default)]
    pub game_name: String,
    #[serde(rename = "type", default)]
    pub type_field: String, // "live", or "" on errors
    #[serde(default)]
    pub title: String,
    pub started_at: String,
}

impl StreamData {
    pub fn to_meta(&self) -> Result<StreamMeta, Error> {
        let started_at = DateTime::parse_from_rfc3339(&self.started_at)?.with_timezone(&Utc);
        Ok(StreamMeta {
            title: self.title.clone(),
            game_name: self.game_name.clone(),
            started_at: Some(started_at),
        })
    }
}

/// `Ok(None)` when the user is not live.
pub fn parse_streams(body: &str) -> Result<Option<StreamMeta>, Error> {
    let parsed: StreamsResponse = serde_json::from_str(body)
        .map_err(|e| Error::Platform(format!("fetch_current_stream parse error: {}", e)))?;

    parsed
        .data
        .iter()
        .find(|s| s.type_field == "live")
        .map(StreamData::to_meta)
        .transpose()
}

pub async fn fetch_current_stream(
    client: &TwitchHelixClient,
    broadcaster_id: &BroadcasterId,
) -> Result<Option<StreamMeta>, Error> {
    let url = client.url("streams");
    let resp = client
        .send(|http| http.get(&url).query(&[("user_id", broadcaster_id.as_str())]))
        .await?;
    let body = check_status(resp, "fetch_current_stream").await?.text().await?;

    let meta = parse_streams(&body)?;
    debug!("stream lookup for {}: live={}", broadcaster_id, meta.is_some());
    Ok(meta)
}
