use thiserror::Error;

use crate::domain::TransitionError;

/// Failures surfaced to the user. None of them is retried automatically.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The local snapshot already rules the action out.
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
    /// The server rejected the request; `message` is shown verbatim.
    #[error("{message}")]
    Api { status: u16, code: String, message: String },
    /// Local form state fails the reception rules; fix and resubmit.
    #[error("{0}")]
    Validation(String),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("a {0} request is already in flight")]
    Busy(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Precondition,
    Validation,
    Transport,
    Rejected,
    Busy,
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::InvalidTransition(_) => ErrorKind::Precondition,
            ClientError::Api { code, .. } => match code.as_str() {
                "invalid_transition" => ErrorKind::Precondition,
                "validation_error" => ErrorKind::Validation,
                _ => ErrorKind::Rejected,
            },
            ClientError::Validation(_) => ErrorKind::Validation,
            ClientError::Transport(_) => ErrorKind::Transport,
            ClientError::Busy(_) => ErrorKind::Busy,
        }
    }
}
