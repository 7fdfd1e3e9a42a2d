use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

/// Failures of the envelope/link protocol.
///
/// Messages name the failure kind only. They never carry key bytes,
/// passwords or plaintext.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("weak input: {0}")]
    WeakInput(&'static str),

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Tag verification failed: wrong key, wrong password or tampered data.
    #[error("authentication failed: wrong key or tampered data")]
    Authentication,

    #[error("unsupported cipher suite id {0}")]
    UnsupportedSuite(u8),

    #[error("unsupported envelope version {0}")]
    UnsupportedVersion(u8),

    #[error("invalid link: {0}")]
    InvalidLink(String),

    #[error("secret too large: {size} bytes (max {max})")]
    SizeLimitExceeded { size: usize, max: usize },

    #[error("secret is password protected but no password was supplied")]
    PasswordRequired,

    #[error("key derivation failed: {0}")]
    Kdf(String),
}

impl CryptoError {
    /// True for errors that mean "wrong key or tampered data".
    pub fn is_authentication(&self) -> bool {
        matches!(self, CryptoError::Authentication)
    }
}
