use {
    teloxide::{ApiError, RequestError},
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Telegram(#[from] RequestError),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Channel(#[from] tgdc_channels::Error),

    #[error("{message}")]
    Message { message: String },

    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

/// Whether the Bot API reports the target message or chat as gone.
#[must_use]
pub fn is_gone(error: &RequestError) -> bool {
    matches!(
        error,
        RequestError::Api(
            ApiError::MessageToEditNotFound
                | ApiError::MessageToDeleteNotFound
                | ApiError::MessageIdInvalid
                | ApiError::ChatNotFound
        )
    )
}

impl From<Error> for tgdc_channels::Error {
    fn from(error: Error) -> Self {
        match error {
            Error::Telegram(err) if is_gone(&err) => Self::not_found(err),
            Error::Channel(err) => err,
            other => Self::external("telegram", other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
