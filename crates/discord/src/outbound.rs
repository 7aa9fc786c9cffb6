use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use {
    secrecy::ExposeSecret,
    serenity::{
        all::{
            ChannelId, CreateAllowedMentions, CreateAttachment, CreateMessage, CreateWebhook,
            EditMessage, EditWebhookMessage, ExecuteWebhook, Http, MessageId, Webhook,
            WebhookId,
        },
        async_trait,
    },
    tgdc_channels::{
        Attachment, Capabilities, Identity, Markup, OutboundFile, OutboundMessage, Persona,
        Platform, PlatformClient,
    },
    tracing::{debug, info},
};

#[cfg(feature = "metrics")]
use tgdc_metrics::{counter, discord as dc_metrics};

use crate::{
    config::DiscordConfig,
    error::{Error, Result},
};

pub const DISCORD_MAX_MESSAGE_LEN: usize = 2000;

/// Outbound side of the Discord bot.
pub struct DiscordClient {
    http: Arc<Http>,
    config: DiscordConfig,
    /// Webhooks resolved or created by this process, with their tokens.
    webhooks: Mutex<HashMap<WebhookId, Webhook>>,
    downloads: reqwest::Client,
}

impl DiscordClient {
    #[must_use]
    pub fn new(config: DiscordConfig) -> Self {
        let http = Arc::new(Http::new(config.token.expose_secret()));
        Self {
            http,
            config,
            webhooks: Mutex::new(HashMap::new()),
            downloads: reqwest::Client::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &DiscordConfig {
        &self.config
    }

    fn cached_webhook(&self, id: WebhookId) -> Option<Webhook> {
        let webhooks = self.webhooks.lock().unwrap_or_else(|e| e.into_inner());
        webhooks.get(&id).cloned()
    }

    fn remember_webhook(&self, webhook: &Webhook) {
        let mut webhooks = self.webhooks.lock().unwrap_or_else(|e| e.into_inner());
        webhooks.insert(webhook.id, webhook.clone());
    }

    fn forget_webhook(&self, id: WebhookId) {
        let mut webhooks = self.webhooks.lock().unwrap_or_else(|e| e.into_inner());
        webhooks.remove(&id);
    }

    /// Webhook behind `identity`, with a token the bridge can execute.
    async fn webhook(&self, identity: &Identity) -> Result<Webhook> {
        let id = WebhookId::new(parse_id("webhook", &identity.id)?);
        if let Some(webhook) = self.cached_webhook(id) {
            return Ok(webhook);
        }
        let webhook = self.http.get_webhook(id).await?;
        if webhook.token.is_none() {
            return Err(tgdc_channels::Error::not_found(format!(
                "webhook {} has no token",
                identity.id
            ))
            .into());
        }
        self.remember_webhook(&webhook);
        Ok(webhook)
    }

    async fn deliver(&self, to: &str, message: &OutboundMessage) -> Result<String> {
        let channel = ChannelId::new(parse_id("channel", to)?);
        let mut builder = CreateMessage::new()
            .content(message.text.as_str())
            .allowed_mentions(CreateAllowedMentions::new());
        if let Some(reply_to) = &message.reply_to {
            let reply_id = MessageId::new(parse_id("message", reply_to)?);
            builder = builder.reference_message((channel, reply_id));
        }
        if let Some(file) = &message.attachment {
            builder = builder.add_file(upload(file).await?);
        }
        let sent = channel.send_message(&self.http, builder).await?;
        Ok(sent.id.to_string())
    }

    async fn deliver_as(
        &self,
        identity: &Identity,
        persona: &Persona,
        message: &OutboundMessage,
    ) -> Result<String> {
        let webhook = self.webhook(identity).await?;
        let mut builder = ExecuteWebhook::new()
            .content(message.text.as_str())
            .username(persona.display_name.as_str())
            .allowed_mentions(CreateAllowedMentions::new());
        if let Some(avatar) = &persona.avatar_url {
            builder = builder.avatar_url(avatar.as_str());
        }
        if let Some(file) = &message.attachment {
            builder = builder.add_file(upload(file).await?);
        }
        match webhook.execute(&self.http, true, builder).await {
            Ok(Some(sent)) => Ok(sent.id.to_string()),
            Ok(None) => Err(Error::message("webhook execution returned no message")),
            Err(e) => {
                let err = Error::from(e);
                if err.is_not_found() {
                    self.forget_webhook(webhook.id);
                }
                Err(err)
            },
        }
    }

    async fn find_or_create_webhook(&self, chat_id: &str, name: &str) -> Result<Webhook> {
        let channel = ChannelId::new(parse_id("channel", chat_id)?);
        let existing = channel
            .webhooks(&self.http)
            .await?
            .into_iter()
            .find(|w| w.name.as_deref() == Some(name) && w.token.is_some());
        if let Some(webhook) = existing {
            debug!(chat_id, webhook_id = %webhook.id, "reusing discord webhook");
            return Ok(webhook);
        }

        let webhook = channel
            .create_webhook(&self.http, CreateWebhook::new(name))
            .await?;
        #[cfg(feature = "metrics")]
        counter!(dc_metrics::WEBHOOKS_CREATED_TOTAL).increment(1);
        info!(chat_id, webhook_id = %webhook.id, "created discord webhook");
        Ok(webhook)
    }

    async fn edit(
        &self,
        chat_id: &str,
        message_id: &str,
        text: &str,
        identity: Option<&Identity>,
    ) -> Result<()> {
        let message = MessageId::new(parse_id("message", message_id)?);
        match identity {
            Some(identity) => {
                let webhook = self.webhook(identity).await?;
                webhook
                    .edit_message(
                        &self.http,
                        message,
                        EditWebhookMessage::new()
                            .content(text)
                            .allowed_mentions(CreateAllowedMentions::new()),
                    )
                    .await?;
            },
            None => {
                let channel = ChannelId::new(parse_id("channel", chat_id)?);
                channel
                    .edit_message(&self.http, message, EditMessage::new().content(text))
                    .await?;
            },
        }
        Ok(())
    }

    async fn delete(
        &self,
        chat_id: &str,
        message_id: &str,
        identity: Option<&Identity>,
    ) -> Result<()> {
        let message = MessageId::new(parse_id("message", message_id)?);
        match identity {
            Some(identity) => {
                let webhook = self.webhook(identity).await?;
                webhook.delete_message(&self.http, None, message).await?;
            },
            None => {
                let channel = ChannelId::new(parse_id("channel", chat_id)?);
                channel.delete_message(&self.http, message).await?;
            },
        }
        Ok(())
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .downloads
            .get(url)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl PlatformClient for DiscordClient {
    fn platform(&self) -> Platform {
        Platform::Discord
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            max_message_len: DISCORD_MAX_MESSAGE_LEN,
            max_upload_bytes: self.config.max_upload_bytes,
            impersonation: true,
            live_polls: true,
            markup: Markup::Markdown,
        }
    }

    async fn send_message(
        &self,
        chat_id: &str,
        message: &OutboundMessage,
    ) -> tgdc_channels::Result<String> {
        let result = self.deliver(chat_id, message).await;
        record_send(&result);
        Ok(result?)
    }

    async fn send_message_as(
        &self,
        chat_id: &str,
        identity: &Identity,
        persona: &Persona,
        message: &OutboundMessage,
    ) -> tgdc_channels::Result<String> {
        debug!(chat_id, webhook_id = %identity.id, "sending through webhook");
        let result = self.deliver_as(identity, persona, message).await;
        record_send(&result);
        Ok(result?)
    }

    async fn edit_message(
        &self,
        chat_id: &str,
        message_id: &str,
        text: &str,
        identity: Option<&Identity>,
    ) -> tgdc_channels::Result<()> {
        Ok(self.edit(chat_id, message_id, text, identity).await?)
    }

    async fn delete_message(
        &self,
        chat_id: &str,
        message_id: &str,
        identity: Option<&Identity>,
    ) -> tgdc_channels::Result<()> {
        Ok(self.delete(chat_id, message_id, identity).await?)
    }

    async fn fetch_file(&self, attachment: &Attachment) -> tgdc_channels::Result<Vec<u8>> {
        let url = attachment.url.as_deref().unwrap_or(&attachment.file_ref);
        Ok(self.download(url).await?)
    }

    async fn resolve_or_create_identity(
        &self,
        chat_id: &str,
        name: &str,
    ) -> tgdc_channels::Result<Identity> {
        let webhook = self
            .find_or_create_webhook(chat_id, name)
            .await
            .map_err(|e| tgdc_channels::Error::identity_unavailable(chat_id, e))?;
        self.remember_webhook(&webhook);
        Ok(Identity {
            id: webhook.id.to_string(),
            channel_id: chat_id.to_string(),
            name: name.to_string(),
        })
    }

    fn message_link(&self, chat_id: &str, message_id: &str) -> Option<String> {
        message_link(self.config.guild_id, chat_id, message_id)
    }
}

fn record_send<T>(result: &Result<T>) {
    #[cfg(feature = "metrics")]
    let name = if result.is_ok() {
        dc_metrics::MESSAGES_SENT_TOTAL
    } else {
        dc_metrics::MESSAGE_SEND_ERRORS_TOTAL
    };
    #[cfg(feature = "metrics")]
    counter!(name).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = result;
}

async fn upload(file: &OutboundFile) -> Result<CreateAttachment> {
    let data = tokio::fs::read(&file.path).await?;
    Ok(CreateAttachment::bytes(data, file.file_name.clone()))
}

/// Discord snowflakes are non-zero u64s.
fn parse_id(what: &str, raw: &str) -> Result<u64> {
    match raw.parse::<u64>() {
        Ok(id) if id != 0 => Ok(id),
        _ => Err(
            tgdc_channels::Error::invalid_input(format!("invalid discord {what} id {raw:?}"))
                .into(),
        ),
    }
}

fn message_link(guild_id: Option<u64>, chat_id: &str, message_id: &str) -> Option<String> {
    guild_id.map(|guild| format!("https://discord.com/channels/{guild}/{chat_id}/{message_id}"))
}
