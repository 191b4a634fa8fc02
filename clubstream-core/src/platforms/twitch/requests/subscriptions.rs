// ========================================================
// File: clubstream-core/src/platforms/twitch/requests/subscriptions.rs
// ========================================================
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use clubstream_common::models::{
    BroadcasterId, SubscriptionHandle, SubscriptionKind, SubscriptionRecord,
};

use crate::platforms::twitch::client::{check_status, TwitchHelixClient};
use crate::platforms::twitch_eventsub::events::SubscriptionData;
use crate::Error;

/// Response from "Get EventSub Subscriptions" and "Create EventSub Subscription".
#[derive(Debug, Deserialize)]
pub struct SubscriptionsResponse {
    pub data: Vec<SubscriptionData>,
    #[serde(default)]
    pub pagination: Pagination,
}

#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateSubscriptionBody<'a> {
    #[serde(rename = "type")]
    sub_type: &'a str,
    version: &'a str,
    condition: serde_json::Value,
    transport: WebhookTransport<'a>,
}

#[derive(Debug, Serialize)]
struct WebhookTransport<'a> {
    method: &'static str,
    callback: &'a str,
    secret: &'a str,
}

pub fn parse_subscriptions_page(body: &str) -> Result<(Vec<SubscriptionRecord>, Option<String>), Error> {
    let page: SubscriptionsResponse = serde_json::from_str(body)
        .map_err(|e| Error::Platform(format!("list_subscriptions parse error: {}", e)))?;
    let records = page.data.iter().map(SubscriptionData::to_record).collect();
    let cursor = page.pagination.cursor.filter(|c| !c.is_empty());
    Ok((records, cursor))
}

/// Every subscription the application owns, following the pagination cursor.
pub async fn list_subscriptions(client: &TwitchHelixClient) -> Result<Vec<SubscriptionRecord>, Error> {
    let url = client.url("eventsub/subscriptions");
    let mut all = Vec::new();
    let mut after: Option<String> = None;

    loop {
        let resp = client
            .send(|http| {
                let req = http.get(&url);
                match &after {
                    Some(cursor) => req.query(&[("after", cursor.as_str())]),
                    None => req,
                }
            })
            .await?;
        let body = check_status(resp, "list_subscriptions").await?.text().await?;
        let (records, cursor) = parse_subscriptions_page(&body)?;
        all.extend(records);

        match cursor {
            Some(c) => after = Some(c),
            None => break,
        }
    }

    debug!("listed {} EventSub subscription(s)", all.len());
    Ok(all)
}

/// Creates a webhook subscription of `kind` for one broadcaster.
pub async fn create_subscription(
    client: &TwitchHelixClient,
    kind: &SubscriptionKind,
    broadcaster_id: &BroadcasterId,
) -> Result<SubscriptionHandle, Error> {
    let url = client.url("eventsub/subscriptions");
    let body = CreateSubscriptionBody {
        sub_type: kind.as_str(),
        version: kind.version(),
        condition: json!({ "broadcaster_user_id": broadcaster_id.as_str() }),
        transport: WebhookTransport {
            method: "webhook",
            callback: client.callback_url(),
            secret: client.webhook_secret(),
        },
    };

    let resp = client.send(|http| http.post(&url).json(&body)).await?;
    let what = format!("create {} subscription for {}", kind, broadcaster_id);
    let text = check_status(resp, &what).await?.text().await?;

    let (records, _) = parse_subscriptions_page(&text)?;
    let created = records
        .into_iter()
        .next()
        .ok_or_else(|| Error::Platform(format!("{what}: empty response")))?;

    info!("created {} subscription {} for {}", kind, created.handle, broadcaster_id);
    Ok(created.handle)
}

/// Deletes one subscription. An unknown id counts as already deleted.
pub async fn delete_subscription(client: &TwitchHelixClient, handle: &SubscriptionHandle) -> Result<(), Error> {
    let url = client.url("eventsub/subscriptions");
    let resp = client
        .send(|http| http.delete(&url).query(&[("id", handle.0.as_str())]))
        .await?;

    if resp.status() == StatusCode::NOT_FOUND {
        debug!("subscription {} was already gone", handle);
        return Ok(());
    }
    check_status(resp, &format!("delete subscription {}", handle)).await?;
    Ok(())
}
