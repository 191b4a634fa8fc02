// File: clubstream-core/src/platforms/twitch_eventsub/listener.rs
//
// HTTP endpoint Twitch delivers EventSub webhooks to. Decodes each request
// and publishes the matching `StreamEvent` onto the bus; it never touches
// notification state itself.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use axum_server::{Handle, Server};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use clubstream_common::models::StreamMeta;
use clubstream_common::traits::EventSource;

use crate::eventbus::{EventBus, StreamEvent};
use crate::platforms::twitch_eventsub::events::{
    parse_eventsub_message, EventSubMessage, Notification, StreamOnline,
};

pub const EVENTSUB_PATH: &str = "/eventsub";
pub const MESSAGE_TYPE_HEADER: &str = "twitch-eventsub-message-type";

/// Upper bound on the stream lookup done for `stream.online`. Twitch expects
/// an answer within a few seconds.
const ENRICH_TIMEOUT: Duration = Duration::from_secs(2);

/// Shared state for the webhook route.
#[derive(Clone)]
pub struct ListenerState {
    pub bus: EventBus,
    pub events: Arc<dyn EventSource>,
}

pub fn eventsub_router(state: ListenerState) -> Router {
    Router::new()
        .route(EVENTSUB_PATH, post(handle_eventsub))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

/// Binds the listener and serves until the bus shuts down. If serving fails
/// the bus is shut down as well.
pub fn spawn_eventsub_listener(addr: SocketAddr, state: ListenerState) -> JoinHandle<()> {
    let mut shutdown_rx = state.bus.shutdown_signal();
    let bus = state.bus.clone();
    let app = eventsub_router(state);

    let handle = Handle::new();
    let handle_clone = handle.clone();
    tokio::spawn(async move {
        while !*shutdown_rx.borrow() {
            if shutdown_rx.changed().await.is_err() {
                break;
            }
        }
        handle_clone.graceful_shutdown(Some(Duration::from_secs(5)));
    });

    info!("EventSub webhook listener on http://{}{}", addr, EVENTSUB_PATH);
    let server = Server::bind(addr).handle(handle).serve(app.into_make_service());

    tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("EventSub listener error: {}", e);
            bus.shutdown();
        }
        info!("EventSub listener shut down.");
    })
}

async fn handle_eventsub(
    State(state): State<ListenerState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(message_type) = headers.get(MESSAGE_TYPE_HEADER).and_then(|v| v.to_str().ok()) else {
        warn!("EventSub request without {} header; dropped", MESSAGE_TYPE_HEADER);
        return StatusCode::BAD_REQUEST.into_response();
    };

    let message = match parse_eventsub_message(message_type, &body) {
        Ok(m) => m,
        Err(e) => {
            warn!("undecodable EventSub {} dropped: {}", message_type, e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let event = match message {
        EventSubMessage::Verification(v) => {
            info!(
                "verifying {} subscription {} for {:?}",
                v.subscription.sub_type,
                v.subscription.id,
                v.subscription.broadcaster_id()
            );
            return (StatusCode::OK, [("content-type", "text/plain")], v.challenge).into_response();
        }
        EventSubMessage::Revocation(r) => {
            warn!(
                "{} subscription {} revoked: {}",
                r.subscription.sub_type, r.subscription.id, r.subscription.status
            );
            return StatusCode::NO_CONTENT.into_response();
        }
        EventSubMessage::Notification(Notification::Unsupported(sub_type)) => {
            debug!("ignoring {} notification", sub_type);
            return StatusCode::NO_CONTENT.into_response();
        }
        EventSubMessage::Notification(Notification::Online(online)) => {
            let stream = enrich_online(state.events.as_ref(), &online).await;
            StreamEvent::Online {
                broadcaster: online.broadcaster(),
                stream,
            }
        }
        EventSubMessage::Notification(Notification::Offline(offline)) => StreamEvent::Offline {
            broadcaster: offline.broadcaster(),
        },
        EventSubMessage::Notification(Notification::Update(update)) => StreamEvent::Update {
            broadcaster: update.broadcaster(),
            stream: update.stream_meta(),
        },
    };

    match state.bus.publish(event).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            error!("could not queue EventSub notification: {}", e);
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

/// `stream.online` carries no title or category, so look them up. The start
/// time always comes from the notification.
async fn enrich_online(events: &dyn EventSource, online: &StreamOnline) -> StreamMeta {
    let id = online.broadcaster().id;
    let mut meta = match timeout(ENRICH_TIMEOUT, events.current_stream(&id)).await {
        Ok(Ok(Some(meta))) => meta,
        Ok(Ok(None)) => {
            debug!("{} not listed as live yet; announcing without title", id);
            StreamMeta::default()
        }
        Ok(Err(e)) => {
            warn!("stream lookup for {} failed: {}", id, e);
            StreamMeta::default()
        }
        Err(_) => {
            warn!("stream lookup for {} timed out", id);
            StreamMeta::default()
        }
    };
    meta.started_at = Some(online.started_at);
    meta
}
