use std::error::Error as StdError;

use thiserror::Error;

/// Failure taxonomy of the relay.
///
/// None of these is fatal to the process: size and identity problems
/// degrade the relayed content, the rest abort a single event.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{kind} is {size} bytes, above the {cap} byte limit")]
    SizeExceeded {
        kind: &'static str,
        size: u64,
        cap: u64,
    },

    #[error("media transfer failed: {context}: {source}")]
    TransferFailed {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("identity unavailable for channel {channel_id}: {reason}")]
    IdentityUnavailable { channel_id: String, reason: String },

    #[error("correlation snapshot is corrupt: {source}")]
    StoreCorrupt {
        #[source]
        source: serde_json::Error,
    },

    #[error("message {key} is already linked")]
    DuplicateLink { key: String },

    #[error(transparent)]
    Channel(#[from] tgdc_channels::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    #[must_use]
    pub fn transfer_failed(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::TransferFailed {
            context: context.into(),
            source: Box::new(source),
        }
    }

    #[must_use]
    pub fn identity_unavailable(
        channel_id: impl Into<String>,
        reason: impl std::fmt::Display,
    ) -> Self {
        Self::IdentityUnavailable {
            channel_id: channel_id.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
