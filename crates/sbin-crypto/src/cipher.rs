//! Authenticated encryption, dispatched on the envelope's cipher suite id.
//!
//! Output layout per suite: `ciphertext || tag` with a separately stored
//! random nonce. Adding a suite means adding one variant and one arm in
//! [`encrypt`] and [`decrypt`].

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::{CryptoRng, RngCore};

use crate::error::{CryptoError, CryptoResult};
use crate::kdf::ContentKey;

/// AEAD suite recorded in the envelope header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CipherSuite {
    Aes256Gcm = 1,
}

impl CipherSuite {
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn nonce_len(self) -> usize {
        match self {
            CipherSuite::Aes256Gcm => 12,
        }
    }

    pub fn tag_len(self) -> usize {
        match self {
            CipherSuite::Aes256Gcm => 16,
        }
    }
}

impl TryFrom<u8> for CipherSuite {
    type Error = CryptoError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        match id {
            1 => Ok(CipherSuite::Aes256Gcm),
            other => Err(CryptoError::UnsupportedSuite(other)),
        }
    }
}

/// Encrypt `plaintext` under a fresh random nonce.
///
/// Returns `(nonce, ciphertext || tag)`. `aad` is authenticated but not
/// encrypted.
pub fn encrypt<R>(
    suite: CipherSuite,
    key: &ContentKey,
    aad: &[u8],
    plaintext: &[u8],
    rng: &mut R,
) -> CryptoResult<(Vec<u8>, Vec<u8>)>
where
    R: RngCore + CryptoRng + ?Sized,
{
    let mut nonce = vec![0u8; suite.nonce_len()];
    rng.fill_bytes(&mut nonce);

    let ciphertext = match suite {
        CipherSuite::Aes256Gcm => {
            let cipher = Aes256Gcm::new(key.as_bytes().into());
            cipher
                .encrypt(
                    Nonce::from_slice(&nonce),
                    Payload {
                        msg: plaintext,
                        aad,
                    },
                )
                .map_err(|e| CryptoError::MalformedEnvelope(format!("encryption failed: {e}")))?
        }
    };

    Ok((nonce, ciphertext))
}

/// Decrypt and verify `ciphertext || tag`.
///
/// Any tag mismatch is reported as [`CryptoError::Authentication`]; no
/// partial plaintext is ever returned.
pub fn decrypt(
    suite: CipherSuite,
    key: &ContentKey,
    nonce: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
) -> CryptoResult<Vec<u8>> {
    if nonce.len() != suite.nonce_len() {
        return Err(CryptoError::MalformedEnvelope(format!(
            "nonce must be {} bytes, got {}",
            suite.nonce_len(),
            nonce.len()
        )));
    }
    if ciphertext.len() < suite.tag_len() {
        return Err(CryptoError::MalformedEnvelope(format!(
            "ciphertext too short: {} bytes (minimum {})",
            ciphertext.len(),
            suite.tag_len()
        )));
    }

    match suite {
        CipherSuite::Aes256Gcm => {
            let cipher = Aes256Gcm::new(key.as_bytes().into());
            cipher
                .decrypt(
                    Nonce::from_slice(nonce),
                    Payload {
                        msg: ciphertext,
                        aad,
                    },
                )
                .map_err(|_| CryptoError::Authentication)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KEY_SIZE;

    fn key(byte: u8) -> ContentKey {
        ContentKey::from_bytes([byte; KEY_SIZE])
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let k = key(42);
        let (nonce, ct) =
            encrypt(CipherSuite::Aes256Gcm, &k, b"hdr", b"hello", &mut rand::thread_rng()).unwrap();
        let pt = decrypt(CipherSuite::Aes256Gcm, &k, &nonce, b"hdr", &ct).unwrap();

        assert_eq!(pt, b"hello");
        assert_eq!(nonce.len(), 12);
        // plaintext (5) + tag (16)
        assert_eq!(ct.len(), 5 + 16);
    }

    #[test]
    fn test_encrypt_decrypt_empty() {
        let k = key(1);
        let (nonce, ct) =
            encrypt(CipherSuite::Aes256Gcm, &k, b"", b"", &mut rand::thread_rng()).unwrap();
        assert_eq!(decrypt(CipherSuite::Aes256Gcm, &k, &nonce, b"", &ct).unwrap(), b"");
    }

    #[test]
    fn test_fresh_nonce_per_call() {
        let k = key(3);
        let mut rng = rand::thread_rng();
        let (n1, c1) = encrypt(CipherSuite::Aes256Gcm, &k, b"", b"same", &mut rng).unwrap();
        let (n2, c2) = encrypt(CipherSuite::Aes256Gcm, &k, b"", b"same", &mut rng).unwrap();
        assert_ne!(n1, n2);
        assert_ne!(c1, c2);
    }

    #[test]
    fn test_wrong_key_is_authentication_error() {
        let (nonce, ct) =
            encrypt(CipherSuite::Aes256Gcm, &key(1), b"", b"secret", &mut rand::thread_rng()).unwrap();
        let err = decrypt(CipherSuite::Aes256Gcm, &key(2), &nonce, b"", &ct).unwrap_err();
        assert!(err.is_authentication());
    }

    #[test]
    fn test_wrong_aad_is_authentication_error() {
        let k = key(1);
        let (nonce, ct) =
            encrypt(CipherSuite::Aes256Gcm, &k, b"v1", b"secret", &mut rand::thread_rng()).unwrap();
        let err = decrypt(CipherSuite::Aes256Gcm, &k, &nonce, b"v2", &ct).unwrap_err();
        assert!(err.is_authentication());
    }

    #[test]
    fn test_tampered_ciphertext() {
        let k = key(1);
        let (nonce, mut ct) =
            encrypt(CipherSuite::Aes256Gcm, &k, b"", b"secret data", &mut rand::thread_rng()).unwrap();
        ct[0] ^= 0x01;
        assert!(decrypt(CipherSuite::Aes256Gcm, &k, &nonce, b"", &ct)
            .unwrap_err()
            .is_authentication());
    }

    #[test]
    fn test_short_inputs_are_malformed() {
        let k = key(1);
        assert!(matches!(
            decrypt(CipherSuite::Aes256Gcm, &k, &[0u8; 11], b"", &[0u8; 32]),
            Err(CryptoError::MalformedEnvelope(_))
        ));
        assert!(matches!(
            decrypt(CipherSuite::Aes256Gcm, &k, &[0u8; 12], b"", &[0u8; 15]),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_unknown_suite_id() {
        assert_eq!(CipherSuite::try_from(1).unwrap(), CipherSuite::Aes256Gcm);
        assert!(matches!(
            CipherSuite::try_from(2),
            Err(CryptoError::UnsupportedSuite(2))
        ));
    }
}
