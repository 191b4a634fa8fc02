use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use twilight_http::api_error::ApiError;
use twilight_http::error::ErrorType;
use twilight_http::Client as HttpClient;
use twilight_model::channel::message::Embed;
use twilight_model::channel::ChannelType;
use twilight_model::id::marker::{ChannelMarker, MessageMarker};
use twilight_model::id::Id;
use twilight_model::util::Timestamp;
use twilight_util::builder::embed::{EmbedBuilder, EmbedFooterBuilder};

use clubstream_common::models::{MessageContent, MessageHandle};
use clubstream_common::traits::PresentationSink;

use crate::Error;

/// Discord JSON error codes we treat specially.
pub const UNKNOWN_CHANNEL: u64 = 10003;
pub const UNKNOWN_MESSAGE: u64 = 10008;
pub const MISSING_ACCESS: u64 = 50001;

/// Posts, edits and deletes status embeds in one channel over the REST API.
/// No gateway connection is needed for that.
pub struct DiscordSink {
    http: Arc<HttpClient>,
    channel_id: Id<ChannelMarker>,
}

impl DiscordSink {
    pub fn new(token: &str, channel_id: u64) -> Result<Self, Error> {
        let channel_id = Id::new_checked(channel_id)
            .ok_or_else(|| Error::Config("DISCORD_CHANNEL_ID must be a non-zero snowflake".into()))?;
        Ok(Self {
            http: Arc::new(HttpClient::new(token.to_string())),
            channel_id,
        })
    }

    pub fn channel_id(&self) -> Id<ChannelMarker> {
        self.channel_id
    }

    /// Makes sure the configured channel exists, is visible to the bot and
    /// can hold messages. Any failure here is a configuration error.
    pub async fn verify_channel(&self) -> Result<(), Error> {
        let channel = self
            .http
            .channel(self.channel_id)
            .await
            .map_err(|e| classify(&e, "fetch channel"))?
            .model()
            .await
            .map_err(|e| Error::Platform(format!("Error parsing channel => {e:?}")))?;

        match channel.kind {
            ChannelType::GuildText | ChannelType::GuildAnnouncement | ChannelType::Private | ChannelType::Group => {
                info!(
                    "(DiscordSink) posting to #{} ({})",
                    channel.name.as_deref().unwrap_or("?"),
                    self.channel_id
                );
                Ok(())
            }
            other => Err(Error::Config(format!(
                "channel {} is not a text channel ({:?})",
                self.channel_id, other
            ))),
        }
    }

    fn message_id(&self, handle: &MessageHandle) -> Result<Id<MessageMarker>, Error> {
        handle
            .0
            .parse::<u64>()
            .ok()
            .and_then(Id::new_checked)
            .ok_or_else(|| Error::Parse(format!("invalid message id: {}", handle)))
    }
}

/// Renders the formatter's content as a Discord embed.
pub fn build_embed(content: &MessageContent) -> Result<Embed, Error> {
    let timestamp = Timestamp::from_micros(content.timestamp.timestamp_micros())
        .map_err(|e| Error::Parse(format!("embed timestamp: {e}")))?;

    let mut builder = EmbedBuilder::new()
        .title(content.title.as_str())
        .color(content.color)
        .footer(EmbedFooterBuilder::new(content.footer.as_str()))
        .timestamp(timestamp);
    if let Some(url) = &content.url {
        builder = builder.url(url.as_str());
    }
    if let Some(description) = &content.description {
        builder = builder.description(description.as_str());
    }

    builder
        .validate()
        .map(EmbedBuilder::build)
        .map_err(|e| Error::Platform(format!("invalid embed: {e}")))
}

/// Maps an HTTP status and Discord error code to our error kinds.
/// Bad credentials and a missing or forbidden channel are fatal.
pub fn classify_response(status: u16, code: Option<u64>, detail: &str) -> Error {
    match (status, code) {
        (_, Some(UNKNOWN_CHANNEL)) | (_, Some(MISSING_ACCESS)) | (401, _) => {
            Error::Config(format!("Discord refused access: HTTP {status} => {detail}"))
        }
        (_, Some(UNKNOWN_MESSAGE)) | (404, _) => Error::NotFound(format!("Discord: {detail}")),
        _ => Error::Platform(format!("Discord: HTTP {status} => {detail}")),
    }
}

fn classify(e: &twilight_http::Error, what: &str) -> Error {
    match e.kind() {
        ErrorType::Unauthorized => Error::Config(format!("{what}: Discord token rejected")),
        ErrorType::Response { error, status, .. } => {
            let code = match error {
                ApiError::General(general) => Some(general.code),
                _ => None,
            };
            classify_response(status.get(), code, &format!("{what}: {error}"))
        }
        _ => Error::Platform(format!("{what}: {e}")),
    }
}

#[async_trait]
impl PresentationSink for DiscordSink {
    async fn post(&self, content: &MessageContent) -> Result<MessageHandle, Error> {
        let embed = build_embed(content)?;
        let message = self
            .http
            .create_message(self.channel_id)
            .embeds(&[embed])
            .await
            .map_err(|e| classify(&e, "create message"))?
            .model()
            .await
            .map_err(|e| Error::Platform(format!("Error parsing message => {e:?}")))?;

        debug!("(DiscordSink) posted {} '{}'", message.id, content.title);
        Ok(MessageHandle(message.id.to_string()))
    }

    async fn edit(&self, handle: &MessageHandle, content: &MessageContent) -> Result<(), Error> {
        let message_id = self.message_id(handle)?;
        let embeds = [build_embed(content)?];
        self.http
            .update_message(self.channel_id, message_id)
            .embeds(Some(&embeds[..]))
            .await
            .map_err(|e| classify(&e, "update message"))?;

        debug!("(DiscordSink) edited {} '{}'", handle, content.title);
        Ok(())
    }

    async fn delete(&self, handle: &MessageHandle) -> Result<(), Error> {
        let message_id = self.message_id(handle)?;
        match self.http.delete_message(self.channel_id, message_id).await {
            Ok(_) => {
                debug!("(DiscordSink) deleted {}", handle);
                Ok(())
            }
            Err(e) => match classify(&e, "delete message") {
                Error::NotFound(_) => {
                    warn!("(DiscordSink) message {} was already gone", handle);
                    Ok(())
                }
                other => Err(other),
            },
        }
    }
}
