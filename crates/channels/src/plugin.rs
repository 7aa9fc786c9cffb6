use std::path::PathBuf;

use async_trait::async_trait;

use crate::{
    Result,
    event::{Attachment, AttachmentKind, Platform},
};

/// Text markup understood by a platform's send endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Markup {
    /// Telegram-style HTML (`<b>`, `<a href>`); user text must be escaped.
    Html,
    /// Discord-flavoured markdown.
    Markdown,
}

/// Static facts about a platform that shape how content is rendered for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub max_message_len: usize,
    /// Largest attachment the platform accepts from the bridge.
    pub max_upload_bytes: u64,
    /// Whether `send_message_as` is supported.
    pub impersonation: bool,
    /// Whether a relayed poll can be kept up to date by editing it.
    pub live_polls: bool,
    pub markup: Markup,
}

/// A channel-scoped "send as anyone" resource (a Discord webhook).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub channel_id: String,
    pub name: String,
}

/// Who a message should appear to come from when impersonating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// A file on local disk ready to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFile {
    pub path: PathBuf,
    /// Name the destination should see; its extension drives rendering.
    pub file_name: String,
    pub kind: AttachmentKind,
}

/// Fully rendered outbound content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundMessage {
    pub text: String,
    pub attachment: Option<OutboundFile>,
    /// Native reply target in the destination chat.
    pub reply_to: Option<String>,
}

impl OutboundMessage {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Outbound side of one chat platform, as consumed by the relay.
///
/// Transport, retry and rate-limit handling live behind this trait.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    fn platform(&self) -> Platform;

    fn capabilities(&self) -> Capabilities;

    /// Send content as the bridge account. Returns the new message id.
    async fn send_message(&self, chat_id: &str, message: &OutboundMessage) -> Result<String>;

    /// Send content under an arbitrary display name through `identity`.
    async fn send_message_as(
        &self,
        chat_id: &str,
        identity: &Identity,
        persona: &Persona,
        message: &OutboundMessage,
    ) -> Result<String>;

    /// Replace the text of a message. `identity` is set when the message
    /// was produced through [`PlatformClient::send_message_as`].
    async fn edit_message(
        &self,
        chat_id: &str,
        message_id: &str,
        text: &str,
        identity: Option<&Identity>,
    ) -> Result<()>;

    async fn delete_message(
        &self,
        chat_id: &str,
        message_id: &str,
        identity: Option<&Identity>,
    ) -> Result<()>;

    /// Download the binary behind an attachment.
    async fn fetch_file(&self, attachment: &Attachment) -> Result<Vec<u8>>;

    /// Find the identity named `name` in `chat_id`, creating it if missing.
    async fn resolve_or_create_identity(&self, chat_id: &str, name: &str) -> Result<Identity>;

    /// Deep link to a message, when the platform has a URL scheme for it.
    fn message_link(&self, _chat_id: &str, _message_id: &str) -> Option<String> {
        None
    }

    /// Public avatar URL for a user of this platform. None by default.
    async fn sender_avatar(&self, _sender_id: &str) -> Option<String> {
        None
    }
}
