use std::time::Duration;

use parley_types::IdentityError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("malformed identity: {0}")]
    MalformedIdentity(#[from] IdentityError),

    #[error("invalid credentials for {0}")]
    InvalidCredentials(String),

    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    #[error("no reply from server within {0:?}")]
    Timeout(Duration),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("unexpected session failure: {0}")]
    Other(String),
}

impl SessionError {
    /// Network and protocol failures may succeed on a later attempt;
    /// bad identities and bad credentials never will.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_) | Self::Protocol(_))
    }

    /// Short stable label for logs and API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedIdentity(_) => "malformed_identity",
            Self::InvalidCredentials(_) => "invalid_credentials",
            Self::Network(_) => "network",
            Self::Timeout(_) => "timeout",
            Self::Protocol(_) => "protocol",
            Self::Other(_) => "other",
        }
    }
}
