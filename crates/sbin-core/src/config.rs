use sbin_crypto::{Argon2Params, KdfParams};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{SbinError, SbinResult};
use crate::types::{Expires, DEFAULT_EXPIRES};

/// Top-level client configuration (loaded from sbin.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SbinConfig {
    pub client: ClientConfig,
    pub storage: StorageConfig,
    pub crypto: CryptoConfig,
    pub log: LogConfig,
}

impl SbinConfig {
    pub fn from_toml_str(s: &str) -> SbinResult<Self> {
        toml::from_str(s).map_err(|e| SbinError::Config(format!("parsing config: {e}")))
    }

    /// Read and parse a config file. A missing file is an I/O error; the
    /// caller decides whether to fall back to defaults.
    pub fn load(path: &Path) -> SbinResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> SbinResult<String> {
        toml::to_string_pretty(self).map_err(|e| SbinError::Config(format!("serializing config: {e}")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Public base URL of the secretbin service
    pub endpoint: String,
    /// Path under `endpoint` that share links point at (default: secret)
    pub link_path: String,
    /// Expiry used when a submission does not name one (default: 1w)
    pub default_expires: String,
    /// Offered expiry labels. Empty means any expiry up to `max_expires`.
    pub expires_options: Vec<String>,
    /// Upper bound when `expires_options` is empty (default: 1y)
    pub max_expires: String,
    /// Maximum serialized secret size in bytes (default: 10 MiB)
    pub max_secret_bytes: usize,
}

impl ClientConfig {
    /// `<endpoint>/<link_path>`, the prefix of every share link.
    pub fn base_url(&self) -> String {
        let endpoint = self.endpoint.trim_end_matches('/');
        let path = self.link_path.trim_matches('/');
        if path.is_empty() {
            endpoint.to_string()
        } else {
            format!("{endpoint}/{path}")
        }
    }

    pub fn default_expiry(&self) -> SbinResult<Expires> {
        self.default_expires
            .parse()
            .map_err(|e| SbinError::Config(format!("client.default_expires: {e}")))
    }

    pub fn max_expiry(&self) -> SbinResult<Expires> {
        self.max_expires
            .parse()
            .map_err(|e| SbinError::Config(format!("client.max_expires: {e}")))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000".into(),
            link_path: "secret".into(),
            default_expires: DEFAULT_EXPIRES.into(),
            expires_options: Vec::new(),
            max_expires: "1y".into(),
            max_secret_bytes: sbin_crypto::DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Fs,
    S3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// memory, fs, or s3 (default: fs)
    pub backend: StorageBackend,
    /// Root directory for the fs backend
    pub root: PathBuf,
    /// S3 endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// S3 bucket name
    pub bucket: String,
    /// Key prefix for stored secrets
    pub prefix: String,
    /// Enforce HTTPS for S3 connections (warn/error on HTTP endpoints)
    pub enforce_tls: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Fs,
            root: PathBuf::from("~/.local/share/sbin"),
            endpoint: "http://localhost:8333".into(),
            region: "us-east-1".into(),
            bucket: "sbin".into(),
            prefix: "secrets".into(),
            enforce_tls: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KdfKind {
    #[serde(rename = "argon2id")]
    Argon2id,
    #[serde(rename = "pbkdf2-sha512")]
    Pbkdf2Sha512,
}

/// Password KDF configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// argon2id or pbkdf2-sha512 (default: argon2id)
    pub kdf: KdfKind,
    /// Argon2id memory cost in KiB (default: 65536 = 64 MiB)
    pub argon2_mem_cost_kib: u32,
    /// Argon2id time cost (iterations, default: 3)
    pub argon2_time_cost: u32,
    /// Argon2id parallelism (default: 4)
    pub argon2_parallelism: u32,
    /// PBKDF2-HMAC-SHA512 iterations (default: 210000)
    pub pbkdf2_iterations: u32,
}

impl CryptoConfig {
    /// Validated KDF parameters for new password-protected secrets.
    pub fn kdf_params(&self) -> SbinResult<KdfParams> {
        let params = match self.kdf {
            KdfKind::Argon2id => KdfParams::Argon2id(Argon2Params {
                mem_cost_kib: self.argon2_mem_cost_kib,
                time_cost: self.argon2_time_cost,
                parallelism: self.argon2_parallelism,
            }),
            KdfKind::Pbkdf2Sha512 => KdfParams::Pbkdf2Sha512 {
                iterations: self.pbkdf2_iterations,
            },
        };
        params
            .validate()
            .map_err(|e| SbinError::Config(format!("crypto: {e}")))?;
        Ok(params)
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        let argon2 = Argon2Params::default();
        Self {
            kdf: KdfKind::Argon2id,
            argon2_mem_cost_kib: argon2.mem_cost_kib,
            argon2_time_cost: argon2.time_cost,
            argon2_parallelism: argon2.parallelism,
            pbkdf2_iterations: sbin_crypto::kdf::PBKDF2_ITERATIONS_DEFAULT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}
