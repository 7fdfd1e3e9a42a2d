//! Versioned, self-describing envelope: the only thing uploaded to the server.
//!
//! Envelope format (binary):
//! ```text
//! [4 bytes: "SBIN"][1: version][1: suite id][1: kdf id]
//! [kdf id != 0: 16-byte salt][kdf params]
//! [nonce (suite nonce length)]
//! [ciphertext || tag]
//! AAD = everything before the nonce
//! ```
//!
//! Using the header as AAD binds the version, suite and KDF record to the
//! ciphertext, so none of them can be swapped without failing authentication.

use rand::{CryptoRng, RngCore};
use secrecy::SecretString;
use zeroize::Zeroizing;

use crate::cipher::{self, CipherSuite};
use crate::error::{CryptoError, CryptoResult};
use crate::frame::{decode_frame, encode_frame, encoded_len};
use crate::kdf::{KdfAlgorithm, KdfParams, KdfRecord, KeyMaterial, KDF_ID_NONE};
use crate::secret::Secret;
use crate::wire::Reader;
use crate::DEFAULT_MAX_FRAME_BYTES;

pub const ENVELOPE_MAGIC: &[u8; 4] = b"SBIN";
pub const ENVELOPE_VERSION: u8 = 1;

/// An encrypted secret, immutable once built.
#[derive(Clone, PartialEq, Eq)]
pub struct Envelope {
    pub version: u8,
    pub suite: CipherSuite,
    /// Present in password mode.
    pub kdf: Option<KdfRecord>,
    pub nonce: Vec<u8>,
    /// Ciphertext with the authentication tag appended.
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    /// Header bytes: magic, version, suite, KDF id and record. Used as AAD.
    pub fn header(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(7 + KdfRecord::encoded_len(KdfAlgorithm::Argon2id));
        write_header(&mut out, self.version, self.suite, self.kdf.as_ref());
        out
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.header();
        out.reserve(self.nonce.len() + self.ciphertext.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parse envelope bytes as fetched from the server.
    ///
    /// The suite id is resolved here, so an unknown suite is rejected before
    /// any decryption is attempted.
    pub fn from_bytes(data: &[u8]) -> CryptoResult<Self> {
        let mut r = Reader::new(data);

        let magic = r.take(ENVELOPE_MAGIC.len()).ok_or_else(|| malformed("truncated header"))?;
        if magic != ENVELOPE_MAGIC {
            return Err(malformed("invalid magic"));
        }

        let version = r.u8().ok_or_else(|| malformed("truncated header"))?;
        if version != ENVELOPE_VERSION {
            return Err(CryptoError::UnsupportedVersion(version));
        }

        let suite = CipherSuite::try_from(r.u8().ok_or_else(|| malformed("truncated header"))?)?;

        let kdf_id = r.u8().ok_or_else(|| malformed("truncated header"))?;
        let kdf = match kdf_id {
            KDF_ID_NONE => None,
            id => {
                let algorithm = KdfAlgorithm::from_id(id)
                    .ok_or_else(|| malformed(format!("unknown kdf id {id}")))?;
                Some(
                    KdfRecord::read(algorithm, &mut r)
                        .ok_or_else(|| malformed("truncated or out-of-range kdf record"))?,
                )
            }
        };

        let nonce = r
            .take(suite.nonce_len())
            .ok_or_else(|| malformed("truncated nonce"))?
            .to_vec();

        let ciphertext = r.rest().to_vec();
        if ciphertext.len() < suite.tag_len() {
            return Err(malformed(format!(
                "ciphertext too short: {} bytes (minimum {})",
                ciphertext.len(),
                suite.tag_len()
            )));
        }

        Ok(Self {
            version,
            suite,
            kdf,
            nonce,
            ciphertext,
        })
    }

    pub fn requires_password(&self) -> bool {
        self.kdf.is_some()
    }

    /// Total serialized size in bytes.
    pub fn byte_len(&self) -> usize {
        self.header().len() + self.nonce.len() + self.ciphertext.len()
    }
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope")
            .field("version", &self.version)
            .field("suite", &self.suite)
            .field("kdf", &self.kdf)
            .field("ciphertext_len", &self.ciphertext.len())
            .finish()
    }
}

fn write_header(out: &mut Vec<u8>, version: u8, suite: CipherSuite, kdf: Option<&KdfRecord>) {
    out.extend_from_slice(ENVELOPE_MAGIC);
    out.push(version);
    out.push(suite.id());
    match kdf {
        None => out.push(KDF_ID_NONE),
        Some(record) => {
            out.push(record.algorithm().id());
            record.write(out);
        }
    }
}

fn malformed(msg: impl Into<String>) -> CryptoError {
    CryptoError::MalformedEnvelope(msg.into())
}

/// Seals secrets into envelopes and opens them again.
///
/// Holds no key state: every `build` draws a fresh link key, salt and nonce,
/// so one builder can be shared across threads.
#[derive(Debug, Clone)]
pub struct EnvelopeBuilder {
    suite: CipherSuite,
    kdf_params: KdfParams,
    max_frame_bytes: usize,
}

impl Default for EnvelopeBuilder {
    fn default() -> Self {
        Self {
            suite: CipherSuite::Aes256Gcm,
            kdf_params: KdfParams::default(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

impl EnvelopeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kdf_params(mut self, params: KdfParams) -> Self {
        self.kdf_params = params;
        self
    }

    pub fn with_max_frame_bytes(mut self, max: usize) -> Self {
        self.max_frame_bytes = max;
        self
    }

    pub fn kdf_params(&self) -> &KdfParams {
        &self.kdf_params
    }

    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    /// Encrypt `secret`, using the thread-local CSPRNG.
    pub fn build(
        &self,
        secret: &Secret,
        password: Option<&SecretString>,
    ) -> CryptoResult<(Envelope, KeyMaterial)> {
        self.build_with_rng(secret, password, &mut rand::thread_rng())
    }

    /// Encrypt `secret` with randomness from `rng`.
    ///
    /// The size limit is checked before any key derivation or cipher work.
    pub fn build_with_rng<R>(
        &self,
        secret: &Secret,
        password: Option<&SecretString>,
        rng: &mut R,
    ) -> CryptoResult<(Envelope, KeyMaterial)>
    where
        R: RngCore + CryptoRng + ?Sized,
    {
        let size = encoded_len(secret);
        if size > self.max_frame_bytes {
            return Err(CryptoError::SizeLimitExceeded {
                size,
                max: self.max_frame_bytes,
            });
        }

        let material = KeyMaterial::generate(password, &self.kdf_params, rng)?;
        let key = material.content_key(password)?;
        let frame = encode_frame(secret)?;

        let mut header = Vec::new();
        write_header(&mut header, ENVELOPE_VERSION, self.suite, material.kdf());
        let (nonce, ciphertext) = cipher::encrypt(self.suite, &key, &header, &frame, rng)?;

        tracing::debug!(
            suite = ?self.suite,
            frame_bytes = size,
            attachments = secret.attachments.len(),
            password = material.is_password_protected(),
            "sealed envelope"
        );

        let envelope = Envelope {
            version: ENVELOPE_VERSION,
            suite: self.suite,
            kdf: material.kdf().cloned(),
            nonce,
            ciphertext,
        };
        Ok((envelope, material))
    }

    /// Decrypt an envelope with the key material from its link.
    pub fn open(
        &self,
        envelope: &Envelope,
        material: &KeyMaterial,
        password: Option<&SecretString>,
    ) -> CryptoResult<Secret> {
        if envelope.version != ENVELOPE_VERSION {
            return Err(CryptoError::UnsupportedVersion(envelope.version));
        }
        if envelope.kdf.as_ref() != material.kdf() {
            return Err(CryptoError::InvalidLink(
                "key material does not match the envelope's kdf record".into(),
            ));
        }

        let key = material.content_key(password)?;
        let plaintext = Zeroizing::new(cipher::decrypt(
            envelope.suite,
            &key,
            &envelope.nonce,
            &envelope.header(),
            &envelope.ciphertext,
        )?);
        let secret = decode_frame(&plaintext)?;

        tracing::debug!(
            suite = ?envelope.suite,
            frame_bytes = plaintext.len(),
            attachments = secret.attachments.len(),
            "opened envelope"
        );
        Ok(secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::fast_params;
    use crate::SALT_SIZE;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn builder() -> EnvelopeBuilder {
        EnvelopeBuilder::new().with_kdf_params(fast_params())
    }

    fn sample() -> Secret {
        let mut secret = Secret::new("Hello, world!");
        secret.add_attachment("README.md", "text/markdown", b"# secretbin\n".to_vec());
        secret
    }

    #[test]
    fn test_build_open_raw_mode() {
        let b = builder();
        let (env, material) = b.build(&sample(), None).unwrap();

        assert!(!env.requires_password());
        assert_eq!(b.open(&env, &material, None).unwrap(), sample());
    }

    #[test]
    fn test_build_open_password_mode() {
        let b = builder();
        let pw = SecretString::from("secret");
        let (env, material) = b.build(&sample(), Some(&pw)).unwrap();

        assert!(env.requires_password());
        assert_eq!(b.open(&env, &material, Some(&pw)).unwrap(), sample());

        let wrong = SecretString::from("wrong");
        assert!(b.open(&env, &material, Some(&wrong)).unwrap_err().is_authentication());
        assert!(matches!(
            b.open(&env, &material, None),
            Err(CryptoError::PasswordRequired)
        ));
    }

    #[test]
    fn test_bytes_roundtrip() {
        let pw = SecretString::from("pw");
        let (env, _) = builder().build(&sample(), Some(&pw)).unwrap();
        let bytes = env.to_bytes();

        assert_eq!(&bytes[..4], ENVELOPE_MAGIC);
        assert_eq!(bytes.len(), env.byte_len());
        assert_eq!(Envelope::from_bytes(&bytes).unwrap(), env);
    }

    #[test]
    fn test_layout_raw_mode() {
        let (env, _) = builder().build(&Secret::new("x"), None).unwrap();
        let bytes = env.to_bytes();

        assert_eq!(bytes[4], ENVELOPE_VERSION);
        assert_eq!(bytes[5], CipherSuite::Aes256Gcm.id());
        assert_eq!(bytes[6], KDF_ID_NONE);
        // header (7) + nonce (12) + frame (4 + 1 + 4) + tag (16)
        assert_eq!(bytes.len(), 7 + 12 + 9 + 16);
    }

    #[test]
    fn test_deterministic_with_seeded_rng() {
        let b = builder();
        let (e1, m1) = b.build_with_rng(&sample(), None, &mut StdRng::seed_from_u64(1)).unwrap();
        let (e2, m2) = b.build_with_rng(&sample(), None, &mut StdRng::seed_from_u64(1)).unwrap();

        assert_eq!(e1, e2);
        assert_eq!(m1.key(), m2.key());
    }

    #[test]
    fn test_unknown_suite_rejected_on_parse() {
        let (env, _) = builder().build(&sample(), None).unwrap();
        let mut bytes = env.to_bytes();
        bytes[5] = 0x02;
        assert!(matches!(
            Envelope::from_bytes(&bytes),
            Err(CryptoError::UnsupportedSuite(2))
        ));
    }

    #[test]
    fn test_unknown_version_rejected() {
        let (env, _) = builder().build(&sample(), None).unwrap();
        let mut bytes = env.to_bytes();
        bytes[4] = 9;
        assert!(matches!(
            Envelope::from_bytes(&bytes),
            Err(CryptoError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn test_garbage_is_malformed() {
        for data in [&b""[..], b"SBI", b"NOPE\x01\x01\x00", b"SBIN\x01\x01\x07", b"SBIN\x01\x01\x00short"] {
            assert!(
                matches!(Envelope::from_bytes(data), Err(CryptoError::MalformedEnvelope(_))),
                "{data:?} must be malformed"
            );
        }
    }

    #[test]
    fn test_out_of_range_kdf_params_are_malformed() {
        let pw = SecretString::from("pw");
        let (env, _) = builder().build(&sample(), Some(&pw)).unwrap();
        let mut bytes = env.to_bytes();
        // magic + version + suite + kdf id + salt
        let mem_at = 4 + 3 + SALT_SIZE;
        bytes[mem_at..mem_at + 4].copy_from_slice(&u32::MAX.to_le_bytes());

        assert!(matches!(
            Envelope::from_bytes(&bytes),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_kdf_record_mismatch_is_invalid_link() {
        let b = builder();
        let pw = SecretString::from("pw");
        let (env, _) = b.build(&sample(), Some(&pw)).unwrap();
        let (_, other) = b.build(&sample(), Some(&pw)).unwrap();

        assert!(matches!(
            b.open(&env, &other, Some(&pw)),
            Err(CryptoError::InvalidLink(_))
        ));
    }

    #[test]
    fn test_size_limit() {
        let b = builder().with_max_frame_bytes(64);
        let secret = Secret::new("a".repeat(100));
        assert!(matches!(
            b.build(&secret, None),
            Err(CryptoError::SizeLimitExceeded { size: 108, max: 64 })
        ));
    }
}
