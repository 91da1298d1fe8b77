use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Two concurrent inserts for one owner were assigned the same next
    /// display id. Expected under contention and retried by the
    /// [`InsertRetrier`](super::InsertRetrier); never a data defect.
    #[error("display id collision")]
    DisplayIdCollision,

    /// The retrier gave up. Distinct from a store rejection: the writes
    /// themselves were fine, the owner's sequence was just too contended.
    #[error("display id contention not resolved after {attempts} attempts")]
    ContentionExhausted { attempts: u32 },

    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

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
