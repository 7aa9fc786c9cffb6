//! Discord event handler for serenity.
//!
//! Implements the EventHandler trait and forwards normalized events to the
//! relay.

use std::sync::Arc;

use {
    serenity::{
        all::{
            Attachment as DiscordAttachment, ChannelId, Context, EventHandler, GatewayIntents,
            GuildId, Message, MessageId, MessagePollVoteAddEvent, MessagePollVoteRemoveEvent,
            MessageUpdateEvent, Poll, Ready, StickerFormatType, StickerItem, User,
        },
        async_trait,
        cache::Cache,
        utils::{ContentSafeOptions, content_safe},
    },
    tgdc_channels::{
        Attachment, AttachmentKind, InboundEvent, InboundMessage, MessageContent, Platform,
        PollOption, PollSnapshot, Sender, StickerFormat,
    },
    tokio::sync::mpsc,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use tgdc_metrics::{counter, discord as dc_metrics};

/// Handler for Discord gateway events.
pub struct DiscordHandler {
    events: mpsc::Sender<InboundEvent>,
    /// Events from other guilds (and DMs) are dropped when set.
    guild_id: Option<GuildId>,
}

impl DiscordHandler {
    pub fn new(events: mpsc::Sender<InboundEvent>, guild_id: Option<u64>) -> Self {
        Self {
            events,
            guild_id: guild_id.filter(|id| *id != 0).map(GuildId::new),
        }
    }

    /// Required gateway intents for the bot.
    pub fn intents() -> GatewayIntents {
        GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT
            | GatewayIntents::GUILD_MESSAGE_POLLS
    }

    fn accepts(&self, guild_id: Option<GuildId>) -> bool {
        match self.guild_id {
            Some(expected) => guild_id == Some(expected),
            None => guild_id.is_some(),
        }
    }

    async fn emit(&self, event: InboundEvent) {
        #[cfg(feature = "metrics")]
        counter!(dc_metrics::EVENTS_RECEIVED_TOTAL).increment(1);
        if self.events.send(event).await.is_err() {
            warn!("relay stopped, dropping discord event");
        }
    }

    async fn poll_changed(
        &self,
        ctx: &Context,
        guild_id: Option<GuildId>,
        channel_id: ChannelId,
        message_id: MessageId,
    ) {
        if !self.accepts(guild_id) {
            return;
        }
        // Vote events carry no totals; the message has the current results.
        let msg = match channel_id.message(&ctx.http, message_id).await {
            Ok(msg) => msg,
            Err(e) => {
                warn!(
                    channel_id = %channel_id,
                    message_id = %message_id,
                    error = %e,
                    "failed to fetch poll message"
                );
                return;
            },
        };
        let Some(poll) = msg.poll.as_ref().map(|p| poll_snapshot(p)) else {
            return;
        };
        self.emit(InboundEvent::PollVoteChanged {
            platform: Platform::Discord,
            chat_id: channel_id.to_string(),
            message_id: message_id.to_string(),
            poll,
        })
        .await;
    }
}

#[async_trait]
impl EventHandler for DiscordHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(
            bot_name = %ready.user.name,
            guilds = ready.guilds.len(),
            "discord bot ready"
        );
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if !self.accepts(msg.guild_id) {
            return;
        }
        debug!(
            channel_id = %msg.channel_id,
            message_id = %msg.id,
            "received discord message"
        );
        self.emit(InboundEvent::NewMessage(normalize(&ctx.cache, &msg)))
            .await;
    }

    async fn message_update(
        &self,
        ctx: Context,
        _old_if_available: Option<Message>,
        new: Option<Message>,
        event: MessageUpdateEvent,
    ) {
        if !self.accepts(event.guild_id) {
            return;
        }
        let edited = match new {
            Some(msg) => Some(normalize(&ctx.cache, &msg)),
            None => from_update(&ctx.cache, &event),
        };
        // Embed-only updates carry no content.
        let Some(edited) = edited else {
            return;
        };
        self.emit(InboundEvent::Edited(edited)).await;
    }

    async fn message_delete(
        &self,
        _ctx: Context,
        channel_id: ChannelId,
        deleted_message_id: MessageId,
        guild_id: Option<GuildId>,
    ) {
        if !self.accepts(guild_id) {
            return;
        }
        self.emit(InboundEvent::Deleted {
            platform: Platform::Discord,
            chat_id: channel_id.to_string(),
            message_id: deleted_message_id.to_string(),
        })
        .await;
    }

    async fn poll_vote_add(&self, ctx: Context, event: MessagePollVoteAddEvent) {
        self.poll_changed(&ctx, event.guild_id, event.channel_id, event.message_id)
            .await;
    }

    async fn poll_vote_remove(&self, ctx: Context, event: MessagePollVoteRemoveEvent) {
        self.poll_changed(&ctx, event.guild_id, event.channel_id, event.message_id)
            .await;
    }
}

/// Platform-neutral view of a Discord message.
///
/// Mention tokens in the text are resolved to readable names.
pub fn normalize(cache: &Arc<Cache>, msg: &Message) -> InboundMessage {
    let display_name = msg
        .member
        .as_ref()
        .and_then(|m| m.nick.clone())
        .unwrap_or_else(|| author_name(&msg.author));

    let content = if let Some(poll) = msg.poll.as_ref() {
        MessageContent::Poll(poll_snapshot(poll))
    } else {
        let attachments: Vec<Attachment> = msg
            .attachments
            .iter()
            .map(attachment)
            .chain(msg.sticker_items.iter().map(sticker))
            .collect();
        if attachments.is_empty() {
            MessageContent::Text
        } else {
            MessageContent::Media(attachments)
        }
    };

    InboundMessage {
        platform: Platform::Discord,
        chat_id: msg.channel_id.to_string(),
        message_id: msg.id.to_string(),
        sender: Sender {
            id: msg.author.id.to_string(),
            display_name,
            // Webhook posts are the bridge's own mirrors.
            is_bot: msg.author.bot || msg.webhook_id.is_some(),
        },
        text: clean_content(cache, &msg.content, &msg.mentions),
        caption: None,
        reply_to: msg
            .message_reference
            .as_ref()
            .and_then(|r| r.message_id)
            .map(|id| id.to_string()),
        content,
    }
}

fn from_update(cache: &Arc<Cache>, event: &MessageUpdateEvent) -> Option<InboundMessage> {
    let content = event.content.as_deref()?;
    let text = clean_content(
        cache,
        content,
        event.mentions.as_deref().unwrap_or_default(),
    );
    let sender = match &event.author {
        Some(author) => Sender {
            id: author.id.to_string(),
            display_name: author_name(author),
            is_bot: author.bot,
        },
        None => Sender {
            id: String::new(),
            display_name: "Unknown".to_string(),
            is_bot: false,
        },
    };
    let attachments: Vec<Attachment> = event
        .attachments
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(attachment)
        .collect();
    Some(InboundMessage {
        platform: Platform::Discord,
        chat_id: event.channel_id.to_string(),
        message_id: event.id.to_string(),
        sender,
        text,
        caption: None,
        reply_to: None,
        content: if attachments.is_empty() {
            MessageContent::Text
        } else {
            MessageContent::Media(attachments)
        },
    })
}

/// `<@id>`, `<#id>` and `<@&id>` become `@name`, `#channel` and `@role`;
/// `@everyone` and `@here` are defused.
fn clean_content(cache: &Arc<Cache>, content: &str, mentions: &[User]) -> Option<String> {
    if content.is_empty() {
        return None;
    }
    let options = ContentSafeOptions::default().show_discriminator(false);
    Some(content_safe(cache, content, &options, mentions))
}

fn author_name(user: &User) -> String {
    user.global_name.clone().unwrap_or_else(|| user.name.clone())
}

fn attachment(att: &DiscordAttachment) -> Attachment {
    let content_type = att.content_type.clone();
    Attachment {
        file_ref: att.url.clone(),
        unique_id: att.id.to_string(),
        kind: kind_for(content_type.as_deref(), &att.filename),
        size: Some(u64::from(att.size)),
        file_name: Some(att.filename.clone()),
        mime_type: content_type,
        url: Some(att.url.clone()),
    }
}

/// Attachment kind from the content type, falling back to the extension.
fn kind_for(content_type: Option<&str>, filename: &str) -> AttachmentKind {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match content_type.unwrap_or_default() {
        "image/gif" => AttachmentKind::Animation,
        ct if ct.starts_with("image/") => AttachmentKind::Photo,
        ct if ct.starts_with("video/") => AttachmentKind::Video,
        "audio/ogg" if ext == "ogg" => AttachmentKind::Voice,
        ct if ct.starts_with("audio/") => AttachmentKind::Audio,
        "" => match ext.as_str() {
            "jpg" | "jpeg" | "png" | "webp" => AttachmentKind::Photo,
            "gif" => AttachmentKind::Animation,
            "mp4" | "mov" | "webm" => AttachmentKind::Video,
            "mp3" | "m4a" | "wav" | "flac" => AttachmentKind::Audio,
            "ogg" => AttachmentKind::Voice,
            _ => AttachmentKind::Document,
        },
        _ => AttachmentKind::Document,
    }
}

fn sticker(item: &StickerItem) -> Attachment {
    let (format, ext, mime) = match item.format_type {
        StickerFormatType::Png => (StickerFormat::Png, "png", "image/png"),
        StickerFormatType::Apng => (StickerFormat::Apng, "png", "image/apng"),
        StickerFormatType::Gif => (StickerFormat::Gif, "gif", "image/gif"),
        StickerFormatType::Lottie => (StickerFormat::Lottie, "json", "application/json"),
        _ => (StickerFormat::Png, "png", "image/png"),
    };
    let url = format!("https://media.discordapp.net/stickers/{}.{ext}", item.id);
    Attachment {
        file_ref: url.clone(),
        unique_id: item.id.to_string(),
        kind: AttachmentKind::Sticker(format),
        size: None,
        file_name: Some(format!("{}.{ext}", item.id)),
        mime_type: Some(mime.to_string()),
        url: Some(url),
    }
}

fn poll_snapshot(poll: &Poll) -> PollSnapshot {
    let counts = poll.results.as_ref().map(|r| r.answer_counts.as_slice());
    PollSnapshot {
        question: poll.question.text.clone().unwrap_or_default(),
        options: poll
            .answers
            .iter()
            .map(|answer| PollOption {
                text: answer.poll_media.text.clone().unwrap_or_default(),
                votes: counts
                    .unwrap_or_default()
                    .iter()
                    .find(|c| c.id == answer.answer_id)
                    .map_or(0, |c| u32::try_from(c.count).unwrap_or(u32::MAX)),
            })
            .collect(),
        // Discord shows who voted for what.
        anonymous: false,
        closed: poll.results.as_ref().is_some_and(|r| r.is_finalized),
    }
}
