//! Server-level errors.
//!
//! Everything here is reported before the tick loop starts or returned to the
//! caller of a single operation; none of it tears down running sessions.

use protocol::CodecError;
use thiserror::Error;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server is already started")]
    AlreadyStarted,

    /// Key generation or curve validation failed while encryption is enabled.
    #[error("encryption setup failed: {0}")]
    EncryptionSetupFailure(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("chunk storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<bincode::Error> for ServerError {
    fn from(err: bincode::Error) -> Self {
        ServerError::Storage(err.to_string())
    }
}

impl From<toml::de::Error> for ServerError {
    fn from(err: toml::de::Error) -> Self {
        ServerError::Config(err.to_string())
    }
}
