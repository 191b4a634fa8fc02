// File: clubstream-core/src/platforms/twitch/client.rs

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, RequestBuilder, Response, StatusCode};
use tracing::{debug, warn};

use clubstream_common::models::{
    BroadcasterId, BroadcasterProfile, StreamMeta, SubscriptionHandle, SubscriptionKind,
    SubscriptionRecord,
};
use clubstream_common::traits::EventSource;

use crate::platforms::twitch::requests::token::AppTokenProvider;
use crate::platforms::twitch::requests::{stream, subscriptions, users};
use crate::Error;

pub const HELIX_BASE_URL: &str = "https://api.twitch.tv/helix";

/// Entry point for all Helix calls. Holds the app token and the webhook
/// transport settings that every new subscription is created with.
pub struct TwitchHelixClient {
    http: Arc<ReqwestClient>,
    client_id: String,
    tokens: AppTokenProvider,
    callback_url: String,
    webhook_secret: String,
}

impl TwitchHelixClient {
    /// - `callback_url`: public URL of the EventSub webhook listener
    /// - `webhook_secret`: sent with every subscription as the transport secret.
    ///   Delivery signatures are not verified by the listener.
    pub fn new(client_id: &str, client_secret: &str, callback_url: &str, webhook_secret: &str) -> Self {
        Self {
            http: Arc::new(ReqwestClient::new()),
            client_id: client_id.to_string(),
            tokens: AppTokenProvider::new(client_id, client_secret),
            callback_url: callback_url.to_string(),
            webhook_secret: webhook_secret.to_string(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    pub fn webhook_secret(&self) -> &str {
        &self.webhook_secret
    }

    pub fn http_client(&self) -> Arc<ReqwestClient> {
        self.http.clone()
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", HELIX_BASE_URL, path.trim_start_matches('/'))
    }

    /// Sends a Helix request with Client-Id and Bearer headers. A 401 drops
    /// the cached app token and the request is retried once with a new one.
    pub async fn send<F>(&self, make: F) -> Result<Response, Error>
    where
        F: Fn(&ReqwestClient) -> RequestBuilder + Send + Sync,
    {
        let mut retried = false;
        loop {
            let token = self.tokens.token(&self.http).await?;
            let resp = make(&self.http)
                .header("Client-Id", &self.client_id)
                .header("Authorization", format!("Bearer {}", token))
                .send()
                .await?;

            if resp.status() == StatusCode::UNAUTHORIZED && !retried {
                self.tokens.invalidate().await;
                retried = true;
                continue;
            }
            return Ok(resp);
        }
    }

    /// Deletes every EventSub subscription the application owns. Run at
    /// startup so leftovers from earlier runs cannot pile up.
    pub async fn purge_subscriptions(&self) -> Result<usize, Error> {
        let all = subscriptions::list_subscriptions(self).await?;
        let mut deleted = 0;
        for sub in &all {
            match subscriptions::delete_subscription(self, &sub.handle).await {
                Ok(()) => deleted += 1,
                Err(e) => warn!("could not purge {} subscription {}: {}", sub.kind, sub.handle, e),
            }
        }
        debug!("purged {}/{} EventSub subscription(s)", deleted, all.len());
        Ok(deleted)
    }
}

/// Turns a non-2xx response into an error carrying status and body.
pub async fn check_status(resp: Response, what: &str) -> Result<Response, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED {
        return Err(Error::Auth(format!("{what}: HTTP {status} => {body}")));
    }
    Err(Error::Platform(format!("{what}: HTTP {status} => {body}")))
}

#[async_trait]
impl EventSource for TwitchHelixClient {
    async fn list_subscriptions(&self) -> Result<Vec<SubscriptionRecord>, Error> {
        subscriptions::list_subscriptions(self).await
    }

    async fn create_online_sub(&self, broadcaster_id: &BroadcasterId) -> Result<SubscriptionHandle, Error> {
        subscriptions::create_subscription(self, &SubscriptionKind::StreamOnline, broadcaster_id).await
    }

    async fn create_offline_sub(&self, broadcaster_id: &BroadcasterId) -> Result<SubscriptionHandle, Error> {
        subscriptions::create_subscription(self, &SubscriptionKind::StreamOffline, broadcaster_id).await
    }

    async fn create_update_sub(&self, broadcaster_id: &BroadcasterId) -> Result<SubscriptionHandle, Error> {
        subscriptions::create_subscription(self, &SubscriptionKind::ChannelUpdate, broadcaster_id).await
    }

    async fn delete_subscription(&self, handle: &SubscriptionHandle) -> Result<(), Error> {
        subscriptions::delete_subscription(self, handle).await
    }

    async fn resolve_users(&self, names: &[String]) -> Result<Vec<BroadcasterProfile>, Error> {
        users::fetch_users_by_login(self, names).await
    }

    async fn current_stream(&self, broadcaster_id: &BroadcasterId) -> Result<Option<StreamMeta>, Error> {
        stream::fetch_current_stream(self, broadcaster_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_paths() {
        let client = TwitchHelixClient::new("cid", "secret", "https://example.org/eventsub", "s3cr3t");
        assert_eq!(client.url("users"), "https://api.twitch.tv/helix/users");
        assert_eq!(
            client.url("/eventsub/subscriptions"),
            "https://api.twitch.tv/helix/eventsub/subscriptions"
        );
        assert_eq!(client.callback_url(), "https://example.org/eventsub");
    }
}
