// ========================================================
// File: clubstream-core/src/platforms/twitch/requests/users.rs
// ========================================================
use serde::Deserialize;
use tracing::debug;

use clubstream_common::models::{BroadcasterId, BroadcasterProfile};

use crate::platforms::twitch::client::{check_status, TwitchHelixClient};
use crate::Error;

/// "Get Users" accepts at most this many `login` parameters per request.
pub const MAX_LOGINS_PER_REQUEST: usize = 100;

/// Response from "Get Users" endpoint.
#[derive(Debug, Deserialize)]
pub struct UsersResponse {
    pub data: Vec<UserData>,
}

/// Single user record.
#[derive(Debug, Deserialize)]
pub struct UserData {
    pub id: String,
    pub login: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
}

impl From<UserData> for BroadcasterProfile {
    fn from(u: UserData) -> Self {
        BroadcasterProfile {
            id: BroadcasterId(u.id),
            login: u.login,
            display_name: u.display_name,
            description: u.description,
        }
    }
}

pub fn parse_users(body: &str) -> Result<Vec<BroadcasterProfile>, Error> {
    let parsed: UsersResponse = serde_json::from_str(body)
        .map_err(|e| Error::Platform(format!("fetch_users parse error: {}", e)))?;
    Ok(parsed.data.into_iter().map(BroadcasterProfile::from).collect())
}

/// Resolves login names to profiles. Names Twitch does not know are simply
/// absent from the result.
pub async fn fetch_users_by_login(
    client: &TwitchHelixClient,
    logins: &[String],
) -> Result<Vec<BroadcasterProfile>, Error> {
    let url = client.url("users");
    let mut profiles = Vec::with_capacity(logins.len());

    for chunk in logins.chunks(MAX_LOGINS_PER_REQUEST) {
        let query: Vec<(&str, &str)> = chunk.iter().map(|l| ("login", l.as_str())).collect();
        let resp = client.send(|http| http.get(&url).query(&query)).await?;
        let body = check_status(resp, "fetch_users").await?.text().await?;
        profiles.extend(parse_users(&body)?);
    }

    debug!("resolved {}/{} login(s)", profiles.len(), logins.len());
    Ok(profiles)
}
