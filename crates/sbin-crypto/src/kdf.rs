//! Key derivation: link key (+ optional password) → content key
//!
//! Raw mode: the 32-byte random link key is used directly.
//! Password mode: `content_key = KDF(link_key || password, salt, params)`,
//! with a fresh 16-byte salt per submission.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::{CryptoRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha512;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{CryptoError, CryptoResult};
use crate::wire::Reader;
use crate::{KEY_SIZE, SALT_SIZE};

pub const ARGON2_MEM_COST_MAX_KIB: u32 = 1024 * 1024;
pub const ARGON2_TIME_COST_MAX: u32 = 16;
pub const ARGON2_PARALLELISM_MAX: u32 = 16;

pub const PBKDF2_ITERATIONS_DEFAULT: u32 = 210_000;
pub const PBKDF2_ITERATIONS_MIN: u32 = 1_000;
pub const PBKDF2_ITERATIONS_MAX: u32 = 10_000_000;

/// Wire id for "no KDF" (raw link key).
pub const KDF_ID_NONE: u8 = 0;

/// Password KDF algorithm, tagged by its wire id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KdfAlgorithm {
    Argon2id = 1,
    Pbkdf2Sha512 = 2,
}

impl KdfAlgorithm {
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(KdfAlgorithm::Argon2id),
            2 => Some(KdfAlgorithm::Pbkdf2Sha512),
            _ => None,
        }
    }

    /// Size of the encoded params block for this algorithm.
    pub(crate) fn params_len(self) -> usize {
        match self {
            KdfAlgorithm::Argon2id => 12,
            KdfAlgorithm::Pbkdf2Sha512 => 4,
        }
    }
}

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Argon2Params {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub mem_cost_kib: u32,
    /// Time cost / iterations (default: 3)
    pub time_cost: u32,
    /// Parallelism (default: 4)
    pub parallelism: u32,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            mem_cost_kib: 65536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

/// Versioned KDF parameters recorded alongside the salt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KdfParams {
    Argon2id(Argon2Params),
    Pbkdf2Sha512 { iterations: u32 },
}

impl Default for KdfParams {
    fn default() -> Self {
        KdfParams::Argon2id(Argon2Params::default())
    }
}

impl KdfParams {
    pub fn pbkdf2_default() -> Self {
        KdfParams::Pbkdf2Sha512 {
            iterations: PBKDF2_ITERATIONS_DEFAULT,
        }
    }

    pub fn algorithm(&self) -> KdfAlgorithm {
        match self {
            KdfParams::Argon2id(_) => KdfAlgorithm::Argon2id,
            KdfParams::Pbkdf2Sha512 { .. } => KdfAlgorithm::Pbkdf2Sha512,
        }
    }

    /// Range-check parameters. Applied to both configured and parsed values
    /// so a crafted envelope cannot demand unbounded memory or time.
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            KdfParams::Argon2id(p) => {
                if !(1..=ARGON2_PARALLELISM_MAX).contains(&p.parallelism) {
                    return Err(format!(
                        "argon2id parallelism must be in 1..={ARGON2_PARALLELISM_MAX}"
                    ));
                }
                if !(1..=ARGON2_TIME_COST_MAX).contains(&p.time_cost) {
                    return Err(format!(
                        "argon2id time cost must be in 1..={ARGON2_TIME_COST_MAX}"
                    ));
                }
                let min_mem = 8 * p.parallelism;
                if !(min_mem..=ARGON2_MEM_COST_MAX_KIB).contains(&p.mem_cost_kib) {
                    return Err(format!(
                        "argon2id memory cost must be in {min_mem}..={ARGON2_MEM_COST_MAX_KIB} KiB"
                    ));
                }
                Ok(())
            }
            KdfParams::Pbkdf2Sha512 { iterations } => {
                if !(PBKDF2_ITERATIONS_MIN..=PBKDF2_ITERATIONS_MAX).contains(&iterations) {
                    return Err(format!(
                        "pbkdf2 iterations must be in {PBKDF2_ITERATIONS_MIN}..={PBKDF2_ITERATIONS_MAX}"
                    ));
                }
                Ok(())
            }
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        match *self {
            KdfParams::Argon2id(p) => {
                out.extend_from_slice(&p.mem_cost_kib.to_le_bytes());
                out.extend_from_slice(&p.time_cost.to_le_bytes());
                out.extend_from_slice(&p.parallelism.to_le_bytes());
            }
            KdfParams::Pbkdf2Sha512 { iterations } => {
                out.extend_from_slice(&iterations.to_le_bytes());
            }
        }
    }

    fn read(algorithm: KdfAlgorithm, r: &mut Reader<'_>) -> Option<Self> {
        Some(match algorithm {
            KdfAlgorithm::Argon2id => KdfParams::Argon2id(Argon2Params {
                mem_cost_kib: r.u32_le()?,
                time_cost: r.u32_le()?,
                parallelism: r.u32_le()?,
            }),
            KdfAlgorithm::Pbkdf2Sha512 => KdfParams::Pbkdf2Sha512 {
                iterations: r.u32_le()?,
            },
        })
    }
}

/// Salt plus parameters: everything needed to repeat a password derivation.
/// Neither part is secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdfRecord {
    pub salt: [u8; SALT_SIZE],
    pub params: KdfParams,
}

impl KdfRecord {
    pub fn algorithm(&self) -> KdfAlgorithm {
        self.params.algorithm()
    }

    /// Append `[salt][params]` (the algorithm id is written by the caller).
    pub(crate) fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.salt);
        self.params.write(out);
    }

    /// Read `[salt][params]` for `algorithm`. Returns `None` on truncation or
    /// out-of-range params; the caller picks the error kind.
    pub(crate) fn read(algorithm: KdfAlgorithm, r: &mut Reader<'_>) -> Option<Self> {
        let salt = r.take_array::<SALT_SIZE>()?;
        let params = KdfParams::read(algorithm, r)?;
        params.validate().ok()?;
        Some(Self { salt, params })
    }

    pub(crate) fn encoded_len(algorithm: KdfAlgorithm) -> usize {
        SALT_SIZE + algorithm.params_len()
    }
}

/// The 256-bit AEAD key actually used for encryption. Zeroized on drop.
pub struct ContentKey {
    bytes: [u8; KEY_SIZE],
}

impl ContentKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for ContentKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Link key plus, in password mode, the KDF record.
///
/// This is what the share link carries. It never goes to the server.
#[derive(Clone)]
pub struct KeyMaterial {
    key: [u8; KEY_SIZE],
    kdf: Option<KdfRecord>,
}

impl KeyMaterial {
    pub fn from_parts(key: [u8; KEY_SIZE], kdf: Option<KdfRecord>) -> Self {
        Self { key, kdf }
    }

    /// Raw link key bytes.
    pub fn key(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }

    pub fn kdf(&self) -> Option<&KdfRecord> {
        self.kdf.as_ref()
    }

    pub fn is_password_protected(&self) -> bool {
        self.kdf.is_some()
    }

    /// Fresh key material: a random link key and, when `password` is given,
    /// a random salt recorded with `params`.
    pub fn generate<R>(
        password: Option<&SecretString>,
        params: &KdfParams,
        rng: &mut R,
    ) -> CryptoResult<Self>
    where
        R: RngCore + CryptoRng + ?Sized,
    {
        let kdf = match password {
            None => None,
            Some(p) if p.expose_secret().is_empty() => {
                return Err(CryptoError::WeakInput(
                    "empty password in password mode",
                ));
            }
            Some(_) => {
                params.validate().map_err(CryptoError::Kdf)?;
                let mut salt = [0u8; SALT_SIZE];
                rng.fill_bytes(&mut salt);
                Some(KdfRecord {
                    salt,
                    params: *params,
                })
            }
        };

        let mut key = [0u8; KEY_SIZE];
        rng.fill_bytes(&mut key);
        Ok(Self { key, kdf })
    }

    /// Compute the content key. Deterministic for the same link key,
    /// password and record.
    ///
    /// In raw mode any password is ignored.
    pub fn content_key(&self, password: Option<&SecretString>) -> CryptoResult<ContentKey> {
        let Some(record) = &self.kdf else {
            return Ok(ContentKey::from_bytes(self.key));
        };

        let password = password
            .map(|p| p.expose_secret().as_bytes())
            .filter(|p| !p.is_empty())
            .ok_or(CryptoError::PasswordRequired)?;

        let mut input = Zeroizing::new(Vec::with_capacity(KEY_SIZE + password.len()));
        input.extend_from_slice(&self.key);
        input.extend_from_slice(password);

        let mut out = [0u8; KEY_SIZE];
        match record.params {
            KdfParams::Argon2id(p) => {
                let params = Params::new(p.mem_cost_kib, p.time_cost, p.parallelism, Some(KEY_SIZE))
                    .map_err(|e| CryptoError::Kdf(format!("invalid Argon2id params: {e}")))?;
                Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
                    .hash_password_into(&input, &record.salt, &mut out)
                    .map_err(|e| CryptoError::Kdf(format!("Argon2id KDF failed: {e}")))?;
            }
            KdfParams::Pbkdf2Sha512 { iterations } => {
                pbkdf2::pbkdf2_hmac::<Sha512>(&input, &record.salt, iterations, &mut out);
            }
        }

        let key = ContentKey::from_bytes(out);
        out.zeroize();
        Ok(key)
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("key", &"[REDACTED]")
            .field("kdf", &self.kdf)
            .finish()
    }
}

/// Generate key material for one submission and compute its content key.
pub fn derive<R>(
    password: Option<&SecretString>,
    params: &KdfParams,
    rng: &mut R,
) -> CryptoResult<(KeyMaterial, ContentKey)>
where
    R: RngCore + CryptoRng + ?Sized,
{
    let material = KeyMaterial::generate(password, params, rng)?;
    let key = material.content_key(password)?;
    Ok((material, key))
}

#[cfg(test)]
pub(crate) fn fast_params() -> KdfParams {
    KdfParams::Argon2id(Argon2Params {
        mem_cost_kib: 1024,
        time_cost: 1,
        parallelism: 1,
    })
}
