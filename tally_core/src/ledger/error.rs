use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("unknown ingest status: {0}")]
    UnknownStatus(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[tracing::instrument(level = "debug")]
    pub fn message(message: impl Into<String> + std::fmt::Debug) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}
