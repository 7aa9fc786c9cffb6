use std::{future::Future, time::Duration};

use {
    async_trait::async_trait,
    secrecy::ExposeSecret,
    teloxide::{
        ApiError, RequestError,
        prelude::*,
        types::{ChatId, InputFile, MessageId, ParseMode, ReplyParameters},
    },
    tgdc_channels::{
        Attachment, AttachmentKind, Capabilities, Identity, Markup, OutboundFile,
        OutboundMessage, Persona, Platform, PlatformClient, StickerFormat,
    },
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use tgdc_metrics::{counter, telegram as tg_metrics};

use crate::{
    config::TelegramConfig,
    error::{Error, Result, is_gone},
    html::html_to_plain,
};

pub const TELEGRAM_MAX_MESSAGE_LEN: usize = 4096;
pub const TELEGRAM_MAX_CAPTION_LEN: usize = 1024;

const TELEGRAM_RETRY_AFTER_MAX_RETRIES: usize = 4;

/// Bot API endpoint used for each outbound attachment kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UploadMethod {
    Photo,
    Video,
    Animation,
    Audio,
    Voice,
    VideoNote,
    Sticker,
    Document,
}

impl UploadMethod {
    fn for_kind(kind: AttachmentKind) -> Self {
        match kind {
            AttachmentKind::Photo => Self::Photo,
            AttachmentKind::Video => Self::Video,
            AttachmentKind::Animation => Self::Animation,
            AttachmentKind::Audio => Self::Audio,
            AttachmentKind::Voice => Self::Voice,
            AttachmentKind::VideoNote => Self::VideoNote,
            AttachmentKind::Sticker(
                StickerFormat::Raster | StickerFormat::Video | StickerFormat::Animated,
            ) => Self::Sticker,
            // Discord stickers are not valid Telegram sticker files.
            AttachmentKind::Sticker(StickerFormat::Png) => Self::Photo,
            AttachmentKind::Sticker(StickerFormat::Gif) => Self::Animation,
            AttachmentKind::Sticker(StickerFormat::Apng | StickerFormat::Lottie)
            | AttachmentKind::Document => Self::Document,
        }
    }

    fn supports_caption(self) -> bool {
        !matches!(self, Self::Sticker | Self::VideoNote)
    }

    fn name(self) -> &'static str {
        match self {
            Self::Photo => "send photo",
            Self::Video => "send video",
            Self::Animation => "send animation",
            Self::Audio => "send audio",
            Self::Voice => "send voice",
            Self::VideoNote => "send video note",
            Self::Sticker => "send sticker",
            Self::Document => "send document",
        }
    }
}

/// Outbound side of the Telegram bot.
pub struct TelegramClient {
    bot: Bot,
    config: TelegramConfig,
}

impl TelegramClient {
    /// Build the bot with a client timeout longer than the long-polling
    /// timeout so the HTTP client doesn't abort `getUpdates` early.
    pub fn from_config(config: TelegramConfig) -> Result<Self> {
        let client = teloxide::net::default_reqwest_settings()
            .timeout(Duration::from_secs(
                u64::from(config.poll_timeout_secs) + 15,
            ))
            .build()
            .map_err(|e| Error::external("build telegram http client", e))?;
        let bot = Bot::with_client(config.token.expose_secret(), client);
        Ok(Self { bot, config })
    }

    #[must_use]
    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    #[must_use]
    pub fn config(&self) -> &TelegramConfig {
        &self.config
    }

    async fn send_text(
        &self,
        to: &str,
        chat_id: ChatId,
        text: &str,
        reply_params: Option<&ReplyParameters>,
    ) -> Result<MessageId> {
        let bot = &self.bot;
        match self
            .run_telegram_request_with_retry(to, "send message (html)", || {
                let mut html_req = bot.send_message(chat_id, text).parse_mode(ParseMode::Html);
                if let Some(rp) = reply_params {
                    html_req = html_req.reply_parameters(rp.clone());
                }
                async move { html_req.await }
            })
            .await
        {
            Ok(message) => Ok(message.id),
            Err(e) => {
                warn!(
                    chat_id = to,
                    error = %e,
                    "telegram HTML send failed, retrying as plain text"
                );
                let plain = html_to_plain(text);
                let message = self
                    .run_telegram_request_with_retry(to, "send message (plain)", || {
                        let mut plain_req = bot.send_message(chat_id, plain.as_str());
                        if let Some(rp) = reply_params {
                            plain_req = plain_req.reply_parameters(rp.clone());
                        }
                        async move { plain_req.await }
                    })
                    .await?;
                Ok(message.id)
            },
        }
    }

    /// Upload `file`, with `caption` as HTML first and as plain text if the
    /// markup is rejected.
    async fn send_file(
        &self,
        to: &str,
        chat_id: ChatId,
        file: &OutboundFile,
        caption: Option<&str>,
        reply_params: Option<&ReplyParameters>,
    ) -> Result<MessageId> {
        let html = caption.map(|c| (c.to_string(), Some(ParseMode::Html)));
        match self.upload(to, chat_id, file, html, reply_params).await {
            Err(e) if caption.is_some() && is_entity_error(&e) => {
                warn!(
                    chat_id = to,
                    error = %e,
                    "telegram HTML caption rejected, retrying as plain text"
                );
                let plain = caption.map(|c| (html_to_plain(c), None));
                Ok(self.upload(to, chat_id, file, plain, reply_params).await?)
            },
            other => Ok(other?),
        }
    }

    async fn upload(
        &self,
        to: &str,
        chat_id: ChatId,
        file: &OutboundFile,
        caption: Option<(String, Option<ParseMode>)>,
        reply_params: Option<&ReplyParameters>,
    ) -> std::result::Result<MessageId, RequestError> {
        let bot = &self.bot;
        let method = UploadMethod::for_kind(file.kind);
        let input = || InputFile::file(file.path.clone()).file_name(file.file_name.clone());

        macro_rules! captioned {
            ($this:expr, $send:ident) => {
                $this.run_telegram_request_with_retry(to, method.name(), || {
                    let mut req = bot.$send(chat_id, input());
                    if let Some((text, mode)) = &caption {
                        req = req.caption(text.clone());
                        if let Some(mode) = mode {
                            req = req.parse_mode(*mode);
                        }
                    }
                    if let Some(rp) = reply_params {
                        req = req.reply_parameters(rp.clone());
                    }
                    async move { req.await }
                })
                .await?
            };
        }

        macro_rules! bare {
            ($this:expr, $send:ident) => {
                $this.run_telegram_request_with_retry(to, method.name(), || {
                    let mut req = bot.$send(chat_id, input());
                    if let Some(rp) = reply_params {
                        req = req.reply_parameters(rp.clone());
                    }
                    async move { req.await }
                })
                .await?
            };
        }

        let message = match method {
            UploadMethod::Photo => captioned!(self, send_photo),
            UploadMethod::Video => captioned!(self, send_video),
            UploadMethod::Animation => captioned!(self, send_animation),
            UploadMethod::Audio => captioned!(self, send_audio),
            UploadMethod::Voice => captioned!(self, send_voice),
            UploadMethod::Document => captioned!(self, send_document),
            UploadMethod::VideoNote => bare!(self, send_video_note),
            UploadMethod::Sticker => bare!(self, send_sticker),
        };
        Ok(message.id)
    }

    async fn edit_text(
        &self,
        to: &str,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        parse_mode: Option<ParseMode>,
    ) -> std::result::Result<(), RequestError> {
        let bot = &self.bot;
        let result = self
            .run_telegram_request_with_retry(to, "edit message", || {
                let mut req = bot.edit_message_text(chat_id, message_id, text);
                if let Some(mode) = parse_mode {
                    req = req.parse_mode(mode);
                }
                async move { req.await }
            })
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_message_not_modified_error(&e) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn edit_caption(
        &self,
        to: &str,
        chat_id: ChatId,
        message_id: MessageId,
        caption: &str,
    ) -> std::result::Result<(), RequestError> {
        let bot = &self.bot;
        let result = self
            .run_telegram_request_with_retry(to, "edit caption", || {
                let req = bot
                    .edit_message_caption(chat_id, message_id)
                    .caption(caption)
                    .parse_mode(ParseMode::Html);
                async move { req.await }
            })
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_message_not_modified_error(&e) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        let bot = &self.bot;
        let file = self
            .run_telegram_request_with_retry(file_id, "get file", || {
                let req = bot.get_file(file_id);
                async move { req.await }
            })
            .await?;

        // Telegram file URL format: https://api.telegram.org/file/bot<token>/<file_path>
        let url = format!(
            "https://api.telegram.org/file/bot{}/{}",
            bot.token(),
            file.path
        );
        let response = reqwest::get(&url).await?;
        if !response.status().is_success() {
            return Err(Error::message(format!(
                "failed to download file: HTTP {}",
                response.status()
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn run_telegram_request_with_retry<T, F, Fut>(
        &self,
        to: &str,
        operation: &'static str,
        mut request: F,
    ) -> std::result::Result<T, RequestError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, RequestError>>,
    {
        let mut retries = 0usize;

        loop {
            match request().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let Some(wait) = retry_after_duration(&err) else {
                        return Err(err);
                    };

                    if retries >= TELEGRAM_RETRY_AFTER_MAX_RETRIES {
                        warn!(
                            chat_id = to,
                            operation,
                            retries,
                            max_retries = TELEGRAM_RETRY_AFTER_MAX_RETRIES,
                            retry_after_secs = wait.as_secs(),
                            "telegram rate limit persisted after retries"
                        );
                        return Err(err);
                    }

                    retries += 1;
                    #[cfg(feature = "metrics")]
                    counter!(tg_metrics::RETRY_AFTER_TOTAL).increment(1);
                    warn!(
                        chat_id = to,
                        operation,
                        retries,
                        max_retries = TELEGRAM_RETRY_AFTER_MAX_RETRIES,
                        retry_after_secs = wait.as_secs(),
                        "telegram rate limited, waiting before retry"
                    );
                    tokio::time::sleep(wait).await;
                },
            }
        }
    }

    async fn deliver(&self, to: &str, message: &OutboundMessage) -> Result<String> {
        let chat_id = parse_chat_id(to)?;
        let reply_params = parse_reply_params(message.reply_to.as_deref());
        let text = message.text.trim();

        let Some(file) = &message.attachment else {
            let id = self
                .send_text(to, chat_id, &message.text, reply_params.as_ref())
                .await?;
            return Ok(id.0.to_string());
        };

        let method = UploadMethod::for_kind(file.kind);
        if text.is_empty() {
            let id = self
                .send_file(to, chat_id, file, None, reply_params.as_ref())
                .await?;
            return Ok(id.0.to_string());
        }
        if method.supports_caption() && text.chars().count() <= TELEGRAM_MAX_CAPTION_LEN {
            let id = self
                .send_file(to, chat_id, file, Some(&message.text), reply_params.as_ref())
                .await?;
            return Ok(id.0.to_string());
        }

        // Text goes first and is the message that gets correlated, so
        // later edits land on something with editable text.
        debug!(chat_id = to, kind = method.name(), "sending text ahead of media");
        let text_id = self
            .send_text(to, chat_id, &message.text, reply_params.as_ref())
            .await?;
        let follow_reply = ReplyParameters::new(text_id).allow_sending_without_reply();
        self.send_file(to, chat_id, file, None, Some(&follow_reply))
            .await?;
        Ok(text_id.0.to_string())
    }
}

#[async_trait]
impl PlatformClient for TelegramClient {
    fn platform(&self) -> Platform {
        Platform::Telegram
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            max_message_len: TELEGRAM_MAX_MESSAGE_LEN,
            max_upload_bytes: self.config.max_upload_bytes,
            impersonation: false,
            live_polls: true,
            markup: Markup::Html,
        }
    }

    async fn send_message(
        &self,
        chat_id: &str,
        message: &OutboundMessage,
    ) -> tgdc_channels::Result<String> {
        match self.deliver(chat_id, message).await {
            Ok(id) => {
                #[cfg(feature = "metrics")]
                counter!(tg_metrics::MESSAGES_SENT_TOTAL).increment(1);
                Ok(id)
            },
            Err(e) => {
                #[cfg(feature = "metrics")]
                counter!(tg_metrics::MESSAGE_SEND_ERRORS_TOTAL).increment(1);
                Err(e.into())
            },
        }
    }

    async fn send_message_as(
        &self,
        chat_id: &str,
        _identity: &Identity,
        _persona: &Persona,
        _message: &OutboundMessage,
    ) -> tgdc_channels::Result<String> {
        Err(tgdc_channels::Error::unsupported(format!(
            "telegram chat {chat_id} cannot post under another name"
        )))
    }

    async fn edit_message(
        &self,
        chat_id: &str,
        message_id: &str,
        text: &str,
        _identity: Option<&Identity>,
    ) -> tgdc_channels::Result<()> {
        let chat = parse_chat_id(chat_id)?;
        let id = MessageId(message_id.parse::<i32>()?);

        let Err(e) = self
            .edit_text(chat_id, chat, id, text, Some(ParseMode::Html))
            .await
        else {
            return Ok(());
        };
        if is_gone(&e) {
            return Err(Error::from(e).into());
        }

        // Media messages only have a caption.
        debug!(chat_id, message_id, error = %e, "text edit failed, trying caption");
        if self.edit_caption(chat_id, chat, id, text).await.is_ok() {
            return Ok(());
        }

        warn!(
            chat_id,
            message_id, "telegram HTML edit failed, retrying as plain text"
        );
        self.edit_text(chat_id, chat, id, &html_to_plain(text), None)
            .await
            .map_err(|e| Error::from(e).into())
    }

    async fn delete_message(
        &self,
        chat_id: &str,
        message_id: &str,
        _identity: Option<&Identity>,
    ) -> tgdc_channels::Result<()> {
        let chat = parse_chat_id(chat_id)?;
        let id = MessageId(message_id.parse::<i32>()?);
        let bot = &self.bot;
        self.run_telegram_request_with_retry(chat_id, "delete message", || {
            let req = bot.delete_message(chat, id);
            async move { req.await }
        })
        .await
        .map(|_| ())
        .map_err(|e| Error::from(e).into())
    }

    async fn fetch_file(&self, attachment: &Attachment) -> tgdc_channels::Result<Vec<u8>> {
        Ok(self.download(&attachment.file_ref).await?)
    }

    async fn resolve_or_create_identity(
        &self,
        chat_id: &str,
        _name: &str,
    ) -> tgdc_channels::Result<Identity> {
        Err(tgdc_channels::Error::identity_unavailable(
            chat_id,
            "telegram has no webhooks",
        ))
    }

    async fn sender_avatar(&self, sender_id: &str) -> Option<String> {
        self.config.avatar_url(sender_id)
    }
}

fn parse_chat_id(chat_id: &str) -> Result<ChatId> {
    chat_id
        .parse::<i64>()
        .map(ChatId)
        .map_err(|e| Error::external(format!("invalid telegram chat id {chat_id:?}"), e))
}

/// Parse a platform message ID string into Telegram `ReplyParameters`.
/// Returns `None` if the string is not a valid i32 (Telegram message IDs are i32).
fn parse_reply_params(reply_to: Option<&str>) -> Option<ReplyParameters> {
    reply_to
        .and_then(|id| id.parse::<i32>().ok())
        .map(|id| ReplyParameters::new(MessageId(id)).allow_sending_without_reply())
}

fn retry_after_duration(error: &RequestError) -> Option<Duration> {
    match error {
        RequestError::RetryAfter(wait) => Some(wait.duration()),
        _ => None,
    }
}

fn is_message_not_modified_error(error: &RequestError) -> bool {
    matches!(error, RequestError::Api(ApiError::MessageNotModified))
}

fn is_entity_error(error: &RequestError) -> bool {
    matches!(error, RequestError::Api(ApiError::CantParseEntities(_)))
}
