//! Telegram side of the bridge, built on teloxide.
//!
//! [`bot::start_polling`] turns Bot API updates into
//! [`tgdc_channels::InboundEvent`]s; [`TelegramClient`] implements
//! [`tgdc_channels::PlatformClient`] for everything the relay sends.

pub mod bot;
pub mod config;
pub mod error;
pub mod handlers;
pub mod html;
pub mod outbound;
pub mod state;

pub use {
    bot::start_polling,
    config::TelegramConfig,
    error::{Error, Result},
    outbound::TelegramClient,
    state::PollIndex,
};
