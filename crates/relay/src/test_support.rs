//! In-memory platform client and relay harness for the scenario tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use {
    async_trait::async_trait,
    tgdc_channels::{
        Attachment, AttachmentKind, Capabilities, Error, Identity, InboundEvent, InboundMessage,
        Markup, MessageContent, OutboundMessage, Persona, Platform, PlatformClient, Result,
        Sender,
    },
};

use crate::{
    engine::{Relay, RelayOptions},
    media::MediaPipeline,
    store::{Store, StoreOptions},
    subscribers::SubscriberRegistry,
};

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub chat_id: String,
    pub text: String,
    pub reply_to: Option<String>,
    /// Upload name of the attached file.
    pub file: Option<String>,
    /// Display name when sent through an identity.
    pub persona: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EditRecord {
    pub chat_id: String,
    pub message_id: String,
    pub text: String,
    pub via_identity: bool,
}

#[derive(Default)]
struct MockState {
    next_id: u64,
    next_identity: u64,
    sent: Vec<SentMessage>,
    edits: Vec<EditRecord>,
    deletes: Vec<String>,
    fetches: usize,
    files: HashMap<String, Vec<u8>>,
    failing_chats: HashSet<String>,
    missing: HashSet<String>,
    fail_identities: bool,
    identities_created: usize,
    live_identities: HashSet<String>,
}

pub struct MockClient {
    platform: Platform,
    prefix: String,
    caps: Capabilities,
    link_base: Option<String>,
    state: Mutex<MockState>,
}

impl MockClient {
    /// Message ids are `prefix` followed by a counter starting at 1.
    pub fn new(platform: Platform, prefix: &str) -> Self {
        let (caps, link_base) = match platform {
            Platform::Telegram => (
                Capabilities {
                    max_message_len: 4096,
                    max_upload_bytes: 50 * 1024 * 1024,
                    impersonation: false,
                    live_polls: true,
                    markup: Markup::Html,
                },
                None,
            ),
            Platform::Discord => (
                Capabilities {
                    max_message_len: 2000,
                    max_upload_bytes: 8 * 1024 * 1024,
                    impersonation: true,
                    live_polls: true,
                    markup: Markup::Markdown,
                },
                Some("https://chat.example".to_string()),
            ),
        };
        Self {
            platform,
            prefix: prefix.to_string(),
            caps,
            link_base,
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn with_live_polls(mut self, live: bool) -> Self {
        self.caps.live_polls = live;
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn put_file(&self, file_ref: &str, bytes: Vec<u8>) {
        self.state().files.insert(file_ref.to_string(), bytes);
    }

    pub fn fail_chat(&self, chat_id: &str) {
        self.state().failing_chats.insert(chat_id.to_string());
    }

    pub fn fail_identities(&self, fail: bool) {
        self.state().fail_identities = fail;
    }

    /// Every identity created so far stops working, as if deleted remotely.
    pub fn drop_identities(&self) {
        self.state().live_identities.clear();
    }

    /// Edits and deletes of `message_id` report it as gone.
    pub fn forget_message(&self, message_id: &str) {
        self.state().missing.insert(message_id.to_string());
    }

    pub fn clear(&self) {
        let mut state = self.state();
        state.sent.clear();
        state.edits.clear();
        state.deletes.clear();
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.state().sent.clone()
    }

    pub fn sent_to(&self) -> Vec<String> {
        self.state().sent.iter().map(|m| m.chat_id.clone()).collect()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.state().sent.iter().map(|m| m.text.clone()).collect()
    }

    pub fn edits(&self) -> Vec<EditRecord> {
        self.state().edits.clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.state().deletes.clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.state().fetches
    }

    pub fn identities_created(&self) -> usize {
        self.state().identities_created
    }

    fn record_send(
        &self,
        chat_id: &str,
        message: &OutboundMessage,
        persona: Option<&Persona>,
    ) -> Result<String> {
        let mut state = self.state();
        if state.failing_chats.contains(chat_id) {
            return Err(Error::invalid_input(format!("chat {chat_id} is unreachable")));
        }
        if let Some(file) = &message.attachment {
            assert!(file.path.exists(), "attachment removed before upload");
        }
        state.next_id += 1;
        let id = format!("{}{}", self.prefix, state.next_id);
        state.sent.push(SentMessage {
            chat_id: chat_id.to_string(),
            text: message.text.clone(),
            reply_to: message.reply_to.clone(),
            file: message.attachment.as_ref().map(|f| f.file_name.clone()),
            persona: persona.map(|p| p.display_name.clone()),
        });
        Ok(id)
    }
}

#[async_trait]
impl PlatformClient for MockClient {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    async fn send_message(&self, chat_id: &str, message: &OutboundMessage) -> Result<String> {
        self.record_send(chat_id, message, None)
    }

    async fn send_message_as(
        &self,
        chat_id: &str,
        identity: &Identity,
        persona: &Persona,
        message: &OutboundMessage,
    ) -> Result<String> {
        if !self.state().live_identities.contains(&identity.id) {
            return Err(Error::not_found(format!("identity {}", identity.id)));
        }
        self.record_send(chat_id, message, Some(persona))
    }

    async fn edit_message(
        &self,
        chat_id: &str,
        message_id: &str,
        text: &str,
        identity: Option<&Identity>,
    ) -> Result<()> {
        let mut state = self.state();
        if state.missing.contains(message_id) {
            return Err(Error::not_found(format!("message {message_id}")));
        }
        state.edits.push(EditRecord {
            chat_id: chat_id.to_string(),
            message_id: message_id.to_string(),
            text: text.to_string(),
            via_identity: identity.is_some(),
        });
        Ok(())
    }

    async fn delete_message(
        &self,
        _chat_id: &str,
        message_id: &str,
        _identity: Option<&Identity>,
    ) -> Result<()> {
        let mut state = self.state();
        if state.missing.contains(message_id) {
            return Err(Error::not_found(format!("message {message_id}")));
        }
        state.deletes.push(message_id.to_string());
        Ok(())
    }

    async fn fetch_file(&self, attachment: &Attachment) -> Result<Vec<u8>> {
        let mut state = self.state();
        state.fetches += 1;
        state
            .files
            .get(&attachment.file_ref)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("file {}", attachment.file_ref)))
    }

    async fn resolve_or_create_identity(&self, chat_id: &str, name: &str) -> Result<Identity> {
        tokio::task::yield_now().await;
        let mut state = self.state();
        if state.fail_identities {
            return Err(Error::identity_unavailable(chat_id, "missing permission"));
        }
        state.next_identity += 1;
        state.identities_created += 1;
        let id = format!("W{}", state.next_identity);
        state.live_identities.insert(id.clone());
        Ok(Identity {
            id,
            channel_id: chat_id.to_string(),
            name: name.to_string(),
        })
    }

    fn message_link(&self, chat_id: &str, message_id: &str) -> Option<String> {
        self.link_base
            .as_ref()
            .map(|base| format!("{base}/{chat_id}/{message_id}"))
    }
}

/// Unwrap the message of a new-message or edit event.
pub trait EventExt {
    fn into_message(self) -> InboundMessage;
}

impl EventExt for InboundEvent {
    fn into_message(self) -> InboundMessage {
        match self {
            Self::NewMessage(msg) | Self::Edited(msg) => msg,
            other => panic!("not a message event: {other:?}"),
        }
    }
}

fn message(platform: Platform, chat_id: &str, message_id: &str, text: &str) -> InboundEvent {
    let (sender_id, name) = match platform {
        Platform::Telegram => ("1", "Ann"),
        Platform::Discord => ("2", "Bob"),
    };
    InboundEvent::NewMessage(InboundMessage {
        platform,
        chat_id: chat_id.to_string(),
        message_id: message_id.to_string(),
        sender: Sender {
            id: sender_id.to_string(),
            display_name: name.to_string(),
            is_bot: false,
        },
        text: Some(text.to_string()),
        caption: None,
        reply_to: None,
        content: MessageContent::Text,
    })
}

/// Telegram message from "Ann".
pub fn tg_message(chat_id: &str, message_id: &str, text: &str) -> InboundEvent {
    message(Platform::Telegram, chat_id, message_id, text)
}

/// Discord message from "Bob".
pub fn dc_message(chat_id: &str, message_id: &str, text: &str) -> InboundEvent {
    message(Platform::Discord, chat_id, message_id, text)
}

/// Attachment whose file ref and unique id are both `id`.
pub fn attachment(id: &str, kind: AttachmentKind) -> Attachment {
    Attachment {
        file_ref: id.to_string(),
        unique_id: id.to_string(),
        kind,
        size: None,
        file_name: None,
        mime_type: None,
        url: None,
    }
}

/// Telegram origin with the given subscribers, Discord destination with
/// target channel `900`.
pub struct Harness {
    pub relay: Relay,
    pub store: Arc<Store>,
    pub subscribers: Arc<SubscriberRegistry>,
    pub telegram: Arc<MockClient>,
    pub discord: Arc<MockClient>,
    pub media: Arc<MediaPipeline>,
}

impl Harness {
    pub async fn new(subscribers: &[&str]) -> Self {
        Self::build(subscribers, Some("900"), true).await
    }

    pub async fn without_target(subscribers: &[&str]) -> Self {
        Self::build(subscribers, None, true).await
    }

    pub async fn with_static_polls(subscribers: &[&str]) -> Self {
        Self::build(subscribers, Some("900"), false).await
    }

    async fn build(subscribers: &[&str], target: Option<&str>, live_polls: bool) -> Self {
        let telegram = Arc::new(MockClient::new(Platform::Telegram, "T"));
        let discord =
            Arc::new(MockClient::new(Platform::Discord, "D").with_live_polls(live_polls));
        let store = Arc::new(Store::in_memory(StoreOptions::default()));
        let registry = Arc::new(SubscriberRegistry::in_memory(
            subscribers.iter().map(|s| s.to_string()),
        ));
        let media = Arc::new(MediaPipeline::new().unwrap());
        let options = RelayOptions {
            target_channel: target.map(str::to_string),
            ..RelayOptions::default()
        };
        let relay = Relay::new(
            telegram.clone(),
            discord.clone(),
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&media),
            options,
        );
        Self {
            relay,
            store,
            subscribers: registry,
            telegram,
            discord,
            media,
        }
    }
}
