// File: clubstream-core/src/platforms/trackmania/client.rs
//
// Club member lists from trackmania.io. Members who linked a Twitch account
// make up the roster.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use clubstream_common::traits::RosterSource;

use crate::Error;

pub const TRACKMANIA_IO_BASE_URL: &str = "https://trackmania.io/api";

/// trackmania.io allows 30 requests per minute.
pub const MIN_REQUEST_GAP: Duration = Duration::from_secs(2);
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

/// One page of `club/{id}/members/{page}`.
#[derive(Debug, Deserialize)]
pub struct ClubMembersPage {
    #[serde(default)]
    pub page_max: u32,
    /// Kept untyped so one odd member cannot fail the whole page.
    #[serde(default)]
    pub members: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct ClubMember {
    player: Player,
}

#[derive(Debug, Deserialize)]
struct Player {
    #[serde(default)]
    name: String,
    #[serde(default)]
    meta: Option<PlayerMeta>,
}

#[derive(Debug, Deserialize)]
struct PlayerMeta {
    #[serde(default)]
    twitch: Option<String>,
}

/// What a member record tells us about the roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterEntry {
    Twitch(String),
    NoTwitch,
    Unparseable,
}

impl RosterEntry {
    pub fn from_member(value: &serde_json::Value) -> Self {
        match serde_json::from_value::<ClubMember>(value.clone()) {
            Ok(member) => match member.player.meta.and_then(|m| m.twitch) {
                Some(name) if !name.trim().is_empty() => RosterEntry::Twitch(name.trim().to_string()),
                _ => {
                    debug!("club member '{}' has no Twitch account", member.player.name);
                    RosterEntry::NoTwitch
                }
            },
            Err(e) => {
                warn!("unparseable club member record: {}", e);
                RosterEntry::Unparseable
            }
        }
    }
}

pub fn parse_members_page(body: &str) -> Result<ClubMembersPage, Error> {
    serde_json::from_str(body).map_err(|e| Error::Platform(format!("club members parse error: {}", e)))
}

/// Twitch names from a list of member records.
pub fn twitch_names(members: &[serde_json::Value]) -> impl Iterator<Item = String> + '_ {
    members.iter().filter_map(|m| match RosterEntry::from_member(m) {
        RosterEntry::Twitch(name) => Some(name),
        _ => None,
    })
}

/// Spaces requests at least `gap` apart.
pub struct RateLimiter {
    gap: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(gap: Duration) -> Self {
        Self {
            gap,
            next_slot: Mutex::new(None),
        }
    }

    pub async fn wait(&self) {
        let mut next = self.next_slot.lock().await;
        if let Some(at) = *next {
            sleep_until(at).await;
        }
        *next = Some(Instant::now() + self.gap);
    }
}

pub struct TrackmaniaClient {
    http: ReqwestClient,
    base_url: String,
    limiter: RateLimiter,
}

impl TrackmaniaClient {
    pub fn new(user_agent: &str) -> Result<Self, Error> {
        let http = ReqwestClient::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(user_agent.to_string())
            .build()?;
        Ok(Self {
            http,
            base_url: TRACKMANIA_IO_BASE_URL.to_string(),
            limiter: RateLimiter::new(MIN_REQUEST_GAP),
        })
    }

    async fn fetch_page(&self, club_id: &str, page: u32) -> Result<ClubMembersPage, Error> {
        self.limiter.wait().await;

        let url = format!("{}/club/{}/members/{}", self.base_url, club_id, page);
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body_text = resp.text().await.unwrap_or_default();
            return Err(Error::Platform(format!(
                "trackmania.io club {} page {}: HTTP {} => {}",
                club_id, page, status, body_text
            )));
        }
        parse_members_page(&resp.text().await?)
    }

    /// All member records of one club, page by page until `page_max`.
    pub async fn club_members(&self, club_id: &str) -> Result<Vec<serde_json::Value>, Error> {
        let mut members = Vec::new();
        let mut page = 0;

        loop {
            let data = self.fetch_page(club_id, page).await?;
            let Some(batch) = data.members else { break };
            if data.page_max == 0 {
                break;
            }
            members.extend(batch);

            page += 1;
            if page >= data.page_max {
                break;
            }
        }

        debug!("club {}: {} member(s) over {} page(s)", club_id, members.len(), page);
        Ok(members)
    }
}

#[async_trait]
impl RosterSource for TrackmaniaClient {
    async fn fetch_roster(&self, source_ids: &[String]) -> Result<HashSet<String>, Error> {
        let mut roster = HashSet::new();
        for club_id in source_ids {
            let members = self.club_members(club_id).await?;
            let before = roster.len();
            roster.extend(twitch_names(&members));
            info!("club {}: {} Twitch account(s)", club_id, roster.len() - before);
        }
        Ok(roster)
    }
}
