use std::error::Error as StdError;

/// Crate-wide result type for platform client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed errors surfaced by platform clients.
///
/// The relay only branches on [`Error::NotFound`] and
/// [`Error::IdentityUnavailable`]; everything else is treated as an
/// event-level failure.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The remote message (or other resource) no longer exists.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// The channel cannot provide a send-as identity.
    #[error("identity unavailable for channel {channel_id}: {reason}")]
    IdentityUnavailable { channel_id: String, reason: String },

    /// The platform cannot perform the requested operation.
    #[error("unsupported operation: {message}")]
    Unsupported { message: String },

    /// Input payload or parameter is invalid.
    #[error("invalid channel input: {message}")]
    InvalidInput { message: String },

    /// Wrapped source error from the platform library.
    #[error("channel operation failed: {context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Integer parsing failed (platform ids are numeric on both sides).
    #[error(transparent)]
    ParseInt(#[from] std::num::ParseIntError),
}

impl Error {
    #[must_use]
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound {
            what: what.to_string(),
        }
    }

    #[must_use]
    pub fn identity_unavailable(
        channel_id: impl std::fmt::Display,
        reason: impl std::fmt::Display,
    ) -> Self {
        Self::IdentityUnavailable {
            channel_id: channel_id.to_string(),
            reason: reason.to_string(),
        }
    }

    #[must_use]
    pub fn unsupported(message: impl std::fmt::Display) -> Self {
        Self::Unsupported {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn invalid_input(message: impl std::fmt::Display) -> Self {
        Self::InvalidInput {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Whether this error means the remote target is gone.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
