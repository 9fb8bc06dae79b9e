use thiserror::Error;

/// Failures a chat request can surface to its caller.
///
/// Retrieval, moderation and titling failures never appear here; they are
/// logged and the turn continues without them.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("persistence failed: {0:#}")]
    Persistence(eyre::Report),
}

impl ChatError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

impl From<eyre::Report> for ChatError {
    fn from(err: eyre::Report) -> Self {
        Self::Persistence(err)
    }
}
