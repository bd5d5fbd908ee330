//! Errors surfaced by the delivery path.
//!
//! Soft platform failures (error payload, missing message id, unresolved DM
//! channel) are not errors: they come back as `Ok(false)`.

use pingcord_core::FormatError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SendError {
    /// Network failure, unreadable response, or a closed client.
    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Format(#[from] FormatError),

    /// `add_message` was called after `flush`.
    #[error("message sender was already flushed")]
    Flushed,
}

impl From<reqwest::Error> for SendError {
    fn from(e: reqwest::Error) -> Self {
        SendError::Transport(e.to_string())
    }
}

impl SendError {
    pub fn is_transport(&self) -> bool {
        matches!(self, SendError::Transport(_))
    }
}
