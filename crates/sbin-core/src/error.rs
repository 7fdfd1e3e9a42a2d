use sbin_crypto::CryptoError;
use thiserror::Error;

pub type SbinResult<T> = Result<T, SbinError>;

#[derive(Debug, Error)]
pub enum SbinError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("secret not found: {0}")]
    NotFound(String),

    #[error("secret expired: {0}")]
    Expired(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SbinError {
    /// The secret is gone: never existed, expired, or already burned.
    pub fn is_gone(&self) -> bool {
        matches!(self, SbinError::NotFound(_) | SbinError::Expired(_))
    }
}
