use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{ArgAction, Parser};
use dotenv::dotenv;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use clubstream_core::platforms::discord::DiscordSink;
use clubstream_core::platforms::trackmania::TrackmaniaClient;
use clubstream_core::platforms::twitch::TwitchHelixClient;
use clubstream_core::platforms::twitch_eventsub::{spawn_eventsub_listener, ListenerState, EVENTSUB_PATH};
use clubstream_core::services::{spawn_event_router, EventRouter, NotificationManager, SubscriptionReconciler};
use clubstream_core::tasks::spawn_roster_sync_task;
use clubstream_core::{BridgeConfig, EventBus, ExpiryPolicy};

#[derive(Parser, Debug, Clone)]
#[command(name = "clubstream")]
#[command(author, version, about = "Announces Twitch streams of Trackmania club members in a Discord channel")]
struct Args {
    /// Comma separated trackmania.io club ids
    #[arg(long, env = "TRACKMANIA_CLUB_ID", default_value = "0")]
    trackmania_club_id: String,

    #[arg(long, env = "TRACKMANIA_IO_USER_AGENT", default_value = "")]
    trackmania_io_user_agent: String,

    #[arg(long, env = "TWITCH_CLIENT_ID")]
    twitch_client_id: String,

    #[arg(long, env = "TWITCH_CLIENT_SECRET", hide_env_values = true)]
    twitch_client_secret: String,

    /// Public host name Twitch delivers webhooks to (https is assumed)
    #[arg(long, env = "WEBHOOK_HOSTNAME")]
    webhook_hostname: String,

    #[arg(long, env = "WEBHOOK_SECRET", hide_env_values = true)]
    webhook_secret: String,

    #[arg(long, env = "WEBHOOK_PORT", default_value_t = 3000)]
    webhook_port: u16,

    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
    discord_token: String,

    #[arg(long, env = "DISCORD_CHANNEL_ID")]
    discord_channel_id: u64,

    /// "production" turns on test-account exclusion
    #[arg(long, env = "ENVIRONMENT", default_value = "development")]
    environment: String,

    #[arg(long, env = "ROSTER_POLL_INTERVAL_SECS", default_value_t = 3600)]
    roster_poll_interval_secs: u64,

    #[arg(long, env = "SWEEP_INTERVAL_SECS", default_value_t = 60)]
    sweep_interval_secs: u64,

    #[arg(long, env = "MESSAGE_MAX_AGE_HOURS", default_value_t = 48)]
    message_max_age_hours: i64,

    #[arg(long, env = "OFFLINE_MESSAGE_MAX_AGE_HOURS", default_value_t = 6)]
    offline_message_max_age_hours: i64,

    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 10)]
    shutdown_timeout_secs: u64,

    #[arg(long, env = "PURGE_SUBSCRIPTIONS_ON_START", default_value_t = true, action = ArgAction::Set)]
    purge_subscriptions_on_start: bool,
}

impl Args {
    fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            roster_source_ids: BridgeConfig::parse_source_ids(&self.trackmania_club_id),
            roster_poll_interval: Duration::from_secs(self.roster_poll_interval_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            expiry: ExpiryPolicy {
                max_age: chrono::Duration::hours(self.message_max_age_hours),
                offline_max_age: chrono::Duration::hours(self.offline_message_max_age_hours),
            },
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_secs),
            exclude_test_accounts: BridgeConfig::exclusion_for_environment(&self.environment),
            purge_subscriptions_on_start: self.purge_subscriptions_on_start,
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::from_default_env()
        .add_directive("clubstream=info".parse().unwrap_or_default());
    let sub = fmt().with_env_filter(filter).finish();
    if let Err(e) = tracing::subscriber::set_global_default(sub) {
        eprintln!("Failed to set global subscriber: {e}");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    init_tracing();
    let args = Args::parse();

    match run(args).await {
        Ok(()) => {
            info!("clubstream finished. Goodbye!");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("clubstream stopped: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = args.bridge_config();
    info!(
        "clubstream starting. environment={}, clubs={:?}, exclude_test_accounts={}",
        args.environment, config.roster_source_ids, config.exclude_test_accounts
    );

    // 1) Collaborators. A bad Discord target is fatal before anything is posted.
    let callback_url = format!("https://{}{}", args.webhook_hostname, EVENTSUB_PATH);
    let twitch = Arc::new(TwitchHelixClient::new(
        &args.twitch_client_id,
        &args.twitch_client_secret,
        &callback_url,
        &args.webhook_secret,
    ));
    let discord = Arc::new(DiscordSink::new(&args.discord_token, args.discord_channel_id)?);
    discord
        .verify_channel()
        .await
        .context("Discord channel check failed")?;
    let trackmania = Arc::new(TrackmaniaClient::new(&args.trackmania_io_user_agent)?);

    // 2) Start from a clean slate on the Twitch side.
    if config.purge_subscriptions_on_start {
        match twitch.purge_subscriptions().await {
            Ok(n) => info!("purged {} EventSub subscription(s) from earlier runs", n),
            Err(e) if e.is_fatal() => return Err(e).context("Twitch credentials rejected"),
            Err(e) => warn!("could not purge EventSub subscriptions: {}", e),
        }
    }

    // 3) Event bus and its single consumer.
    let bus = EventBus::new();
    let manager = NotificationManager::new(discord.clone(), twitch.clone(), config.expiry);
    let router = spawn_event_router(EventRouter::new(
        bus.clone(),
        manager,
        config.sweep_interval,
        config.shutdown_timeout,
    ));

    // 4) Webhook listener and roster reconciliation.
    let addr = SocketAddr::from(([0, 0, 0, 0], args.webhook_port));
    let listener = spawn_eventsub_listener(
        addr,
        ListenerState {
            bus: bus.clone(),
            events: twitch.clone(),
        },
    );

    let reconciler = Arc::new(SubscriptionReconciler::new(
        twitch.clone(),
        bus.clone(),
        config.exclude_test_accounts,
    ));
    let roster = spawn_roster_sync_task(
        trackmania,
        reconciler,
        bus.clone(),
        config.roster_source_ids.clone(),
        config.roster_poll_interval,
    );

    // 5) Signals flip the shutdown flag; everything else follows it.
    spawn_signal_handler(bus.clone());

    let router_result = router.await.context("event router task panicked")?;
    let roster_result = roster.await.context("roster sync task panicked")?;
    if let Err(e) = listener.await {
        warn!("EventSub listener task ended abnormally: {:?}", e);
    }

    router_result.context("event router stopped on a fatal error")?;
    roster_result.context("roster sync stopped on a fatal error")?;
    Ok(())
}

fn spawn_signal_handler(bus: EventBus) {
    tokio::spawn(async move {
        wait_for_signal().await;
        bus.shutdown();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigquit) = match (signal(SignalKind::terminate()), signal(SignalKind::quit())) {
        (Ok(term), Ok(quit)) => (term, quit),
        (Err(e), _) | (_, Err(e)) => {
            error!("Failed to install SIGTERM/SIGQUIT handlers: {:?}", e);
            wait_for_ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = wait_for_ctrl_c() => {}
        _ = sigterm.recv() => info!("SIGTERM received; shutting down..."),
        _ = sigquit.recv() => info!("SIGQUIT received; shutting down..."),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl-C detected; shutting down..."),
        Err(e) => {
            error!("Failed to listen for Ctrl-C: {:?}", e);
            std::future::pending::<()>().await;
        }
    }
}
