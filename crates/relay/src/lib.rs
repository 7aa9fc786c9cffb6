//! Relay core: keeps a Telegram side and a Discord side of a conversation
//! in sync.
//!
//! - [`store`]: correlation pairs, bridge settings and poll tags, persisted
//! - [`identity`]: per-channel send-as identities (webhooks)
//! - [`media`]: attachment download with size ceilings and local cleanup
//! - [`engine`]: admission, rendering, dispatch and correlation of new messages
//! - [`mirror`]: edit, delete and poll-vote propagation
//! - [`broadcast`]: best-effort delivery to every subscriber chat

pub mod broadcast;
pub mod correlation;
pub mod engine;
pub mod error;
pub mod identity;
pub mod media;
mod mirror;
pub mod render;
pub mod store;
pub mod subscribers;

#[cfg(test)]
mod test_support;

pub use {
    broadcast::{BroadcastReport, DeliveryFailure, fan_out},
    correlation::{Correlation, MessageRef, Role},
    engine::{Outcome, Relay, RelayOptions, Suppressed},
    error::{Error, Result},
    identity::IdentityCache,
    media::{LocalBlob, MediaPipeline},
    store::{BridgeSettings, DEFAULT_CEILING, PollMirror, Store, StoreOptions},
    subscribers::SubscriberRegistry,
};
