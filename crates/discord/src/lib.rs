//! Discord side of the bridge, built on serenity.
//!
//! [`gateway::start_gateway`] connects to the gateway and turns message,
//! edit, delete and poll-vote events into [`tgdc_channels::InboundEvent`]s.
//! [`DiscordClient`] implements [`tgdc_channels::PlatformClient`], posting
//! under other names through channel webhooks.

pub mod config;
pub mod error;
pub mod gateway;
pub mod handler;
pub mod outbound;

pub use {
    config::DiscordConfig,
    error::{Error, Result},
    gateway::start_gateway,
    outbound::DiscordClient,
};
