//! Normalized inbound events.
//!
//! Both adapters translate their native update types into these shapes
//! before anything reaches the relay.

use serde::{Deserialize, Serialize};

/// The two sides of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Telegram,
    Discord,
}

impl Platform {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Telegram => "telegram",
            Self::Discord => "discord",
        }
    }

    /// Short tag used in author headers (`[TG | name]`).
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Telegram => "TG",
            Self::Discord => "DC",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Author of an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub id: String,
    pub display_name: String,
    /// Set for bots and for webhook-authored messages (the relay's own output).
    pub is_bot: bool,
}

/// Sticker wire formats seen on either platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StickerFormat {
    /// Telegram static sticker (webp).
    Raster,
    /// Telegram video sticker (webm).
    Video,
    /// Telegram animated sticker (gzipped Lottie, `.tgs`).
    Animated,
    Png,
    Apng,
    Gif,
    /// Discord Lottie sticker; only reachable as a URL.
    Lottie,
}

/// Closed set of attachment kinds the relay distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Photo,
    Document,
    Video,
    Animation,
    Audio,
    Voice,
    VideoNote,
    Sticker(StickerFormat),
}

impl AttachmentKind {
    /// Human label used in placeholder texts.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Document => "file",
            Self::Video => "video",
            Self::Animation => "animation",
            Self::Audio => "audio",
            Self::Voice => "voice message",
            Self::VideoNote => "video note",
            Self::Sticker(_) => "sticker",
        }
    }

    /// Whether the binary can be downloaded and re-uploaded at all.
    #[must_use]
    pub fn is_transferable(&self) -> bool {
        !matches!(self, Self::Sticker(StickerFormat::Lottie))
    }
}

/// Descriptor of a binary attachment on the source platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Platform handle used to fetch the file (Telegram file id, Discord URL).
    pub file_ref: String,
    /// Stable content id, unique per file; used for local file names.
    pub unique_id: String,
    pub kind: AttachmentKind,
    /// Declared size in bytes, when the platform reports one.
    pub size: Option<u64>,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    /// Public URL, when the platform exposes one.
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOption {
    pub text: String,
    pub votes: u32,
}

/// Current state of a poll: question, options and their vote counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSnapshot {
    pub question: String,
    pub options: Vec<PollOption>,
    pub anonymous: bool,
    pub closed: bool,
}

/// What a message carries besides its text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MessageContent {
    #[default]
    Text,
    Media(Vec<Attachment>),
    Poll(PollSnapshot),
}

/// A message as seen by the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub platform: Platform,
    pub chat_id: String,
    pub message_id: String,
    pub sender: Sender,
    pub text: Option<String>,
    pub caption: Option<String>,
    /// Message id this one replies to, in the same chat.
    pub reply_to: Option<String>,
    pub content: MessageContent,
}

impl InboundMessage {
    /// Primary text, falling back to the caption. Whitespace-only is `None`.
    #[must_use]
    pub fn body(&self) -> Option<&str> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .or_else(|| {
                self.caption
                    .as_deref()
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
            })
    }

    #[must_use]
    pub fn attachments(&self) -> &[Attachment] {
        match &self.content {
            MessageContent::Media(items) => items,
            _ => &[],
        }
    }

    #[must_use]
    pub fn poll(&self) -> Option<&PollSnapshot> {
        match &self.content {
            MessageContent::Poll(poll) => Some(poll),
            _ => None,
        }
    }
}

/// Everything an adapter can report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    NewMessage(InboundMessage),
    Edited(InboundMessage),
    Deleted {
        platform: Platform,
        chat_id: String,
        message_id: String,
    },
    PollVoteChanged {
        platform: Platform,
        chat_id: String,
        message_id: String,
        poll: PollSnapshot,
    },
}

impl InboundEvent {
    #[must_use]
    pub fn platform(&self) -> Platform {
        match self {
            Self::NewMessage(msg) | Self::Edited(msg) => msg.platform,
            Self::Deleted { platform, .. } | Self::PollVoteChanged { platform, .. } => *platform,
        }
    }

    #[must_use]
    pub fn message_id(&self) -> &str {
        match self {
            Self::NewMessage(msg) | Self::Edited(msg) => &msg.message_id,
            Self::Deleted { message_id, .. } | Self::PollVoteChanged { message_id, .. } => {
                message_id
            },
        }
    }

    /// Short name for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NewMessage(_) => "new_message",
            Self::Edited(_) => "edited",
            Self::Deleted { .. } => "deleted",
            Self::PollVoteChanged { .. } => "poll_vote_changed",
        }
    }
}
