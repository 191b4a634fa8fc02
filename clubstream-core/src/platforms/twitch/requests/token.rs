// App access token for Helix, via the client-credentials grant.
//
// EventSub webhook subscriptions and the read-only endpoints we use all work
// with an app token, so there is no user login and no refresh token: when the
// cached token is about to expire we simply ask for a new one.

use chrono::{DateTime, Duration, Utc};
use reqwest::{Client as ReqwestClient, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::Error;

pub const TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";

/// Seconds before `expires_at` at which a cached token is replaced.
pub const REFRESH_MARGIN_SECS: i64 = 600;

/// Matches Twitch's JSON from the token endpoint
#[derive(Debug, Deserialize)]
struct AppTokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct AppToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl AppToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - now > Duration::seconds(REFRESH_MARGIN_SECS)
    }
}

pub struct AppTokenProvider {
    client_id: String,
    client_secret: String,
    cached: Mutex<Option<AppToken>>,
}

impl AppTokenProvider {
    pub fn new(client_id: &str, client_secret: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            cached: Mutex::new(None),
        }
    }

    /// Returns a token valid for at least `REFRESH_MARGIN_SECS`, fetching a
    /// new one if needed. Concurrent callers wait for the same fetch.
    pub async fn token(&self, http: &ReqwestClient) -> Result<String, Error> {
        let mut cached = self.cached.lock().await;
        if let Some(tok) = cached.as_ref() {
            if tok.is_fresh(Utc::now()) {
                return Ok(tok.access_token.clone());
            }
            debug!("Twitch app token expires at {}; refreshing", tok.expires_at);
        }

        let fresh = self.request(http).await?;
        let access_token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(access_token)
    }

    /// Drops the cached token, e.g. after Helix answered 401.
    pub async fn invalidate(&self) {
        if self.cached.lock().await.take().is_some() {
            warn!("Twitch app token rejected; will fetch a new one");
        }
    }

    async fn request(&self, http: &ReqwestClient) -> Result<AppToken, Error> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "client_credentials"),
        ];

        let resp = http
            .post(TOKEN_URL)
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::Auth(format!("HTTP error requesting app token: {e}")))?;

        let status = resp.status();
        if matches!(
            status,
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Config(format!(
                "Twitch rejected the client credentials: HTTP {status} => {body}"
            )));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Auth(format!("Twitch token endpoint: HTTP {status} => {body}")));
        }

        let parsed = resp
            .json::<AppTokenResponse>()
            .await
            .map_err(|e| Error::Auth(format!("Parse error on token JSON: {e}")))?;

        info!("obtained Twitch app token (expires in {}s)", parsed.expires_in);
        Ok(AppToken {
            access_token: parsed.access_token,
            expires_at: Utc::now() + Duration::seconds(parsed.expires_in),
        })
    }
}
