use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Discord(#[from] serenity::Error),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Channel(#[from] tgdc_channels::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    /// Whether Discord answered 404 for the target.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Discord(serenity::Error::Http(e)) => {
                e.status_code().map(|s| s.as_u16()) == Some(404)
            },
            Self::Reqwest(e) => e.status().map(|s| s.as_u16()) == Some(404),
            Self::Channel(e) => e.is_not_found(),
            _ => false,
        }
    }
}

impl From<Error> for tgdc_channels::Error {
    fn from(error: Error) -> Self {
        if error.is_not_found() {
            return Self::not_found(error);
        }
        match error {
            Error::Channel(err) => err,
            Error::Io(err) => Self::Io(err),
            other => Self::external("discord", other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
