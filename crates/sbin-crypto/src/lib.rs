//! sbin-crypto: client-side encryption for secretbin
//!
//! Pipeline: Secret → frame → AES-256-GCM (AAD = envelope header) → envelope bytes → upload
//!
//! Key handling:
//! ```text
//! Link Key (256-bit random, travels only in the URL fragment)
//!   ├── raw mode:      content key = link key
//!   └── password mode: content key = KDF(link key || password, salt)
//!                      KDF = Argon2id (default) | PBKDF2-HMAC-SHA512
//! ```
//!
//! The server only ever sees the envelope. The link fragment is never sent to
//! it, and in password mode the fragment alone is not enough to decrypt.

pub mod cipher;
pub mod envelope;
pub mod error;
pub mod frame;
pub mod kdf;
pub mod link;
pub mod secret;
mod wire;

pub use cipher::{decrypt, encrypt, CipherSuite};
pub use envelope::{Envelope, EnvelopeBuilder, ENVELOPE_VERSION};
pub use error::{CryptoError, CryptoResult};
pub use frame::{decode_frame, encode_frame, encoded_len};
pub use kdf::{derive, Argon2Params, ContentKey, KdfAlgorithm, KdfParams, KdfRecord, KeyMaterial};
pub use link::Link;
pub use secret::{Attachment, Secret};

/// Size of a content or link key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of a password KDF salt in bytes
pub const SALT_SIZE: usize = 16;

/// Default upper bound for a serialized frame (10 MiB)
pub const DEFAULT_MAX_FRAME_BYTES: usize = 10 * 1024 * 1024;
