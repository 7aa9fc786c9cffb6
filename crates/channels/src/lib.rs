//! Platform-neutral types shared by the relay and the platform adapters.
//!
//! Adapters (Telegram, Discord) normalize their native updates into
//! [`InboundEvent`]s and implement [`PlatformClient`] for everything the
//! relay sends back out.

pub mod error;
pub mod event;
pub mod plugin;

pub use {
    error::{Error, Result},
    event::{
        Attachment, AttachmentKind, InboundEvent, InboundMessage, MessageContent, Platform,
        PollOption, PollSnapshot, Sender, StickerFormat,
    },
    plugin::{
        Capabilities, Identity, Markup, OutboundFile, OutboundMessage, Persona, PlatformClient,
    },
};
