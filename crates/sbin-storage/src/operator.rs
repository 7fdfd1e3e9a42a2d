//! OpenDAL Operator factory for secretbin storage backends

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use opendal::Operator;
use sbin_core::config::{StorageBackend, StorageConfig};

/// Minimal config needed to build an S3 operator
/// (full config lives in sbin-core's StorageConfig)
#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Build an OpenDAL Operator for any S3-compatible endpoint
///
/// Uses path-style addressing (default in opendal 0.55), which MinIO and
/// SeaweedFS require.
pub fn build_s3_operator(cfg: &S3Config) -> Result<Operator> {
    let builder = opendal::services::S3::default()
        .endpoint(&cfg.endpoint)
        .region(&cfg.region)
        .bucket(&cfg.bucket)
        .access_key_id(&cfg.access_key_id)
        .secret_access_key(&cfg.secret_access_key);

    let op = Operator::new(builder)
        .context("creating OpenDAL S3 operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(5)
                .with_jitter(),
        )
        .finish();

    Ok(op)
}

/// Build an S3 operator from sbin-core config + loaded credentials.
///
/// If `enforce_tls` is true and the endpoint uses HTTP, this returns an error.
/// Otherwise, a warning is logged for non-HTTPS endpoints.
pub fn build_s3_from_config(
    storage: &StorageConfig,
    access_key_id: &str,
    secret_access_key: &str,
) -> Result<Operator> {
    if storage.endpoint.starts_with("http://") {
        if storage.enforce_tls {
            anyhow::bail!(
                "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                 Use an HTTPS endpoint or set storage.enforce_tls = false for local development.",
                storage.endpoint
            );
        }
        tracing::warn!(
            endpoint = %storage.endpoint,
            "S3 endpoint uses plaintext HTTP; envelopes and credentials travel unencrypted. \
             Set storage.enforce_tls = true and use HTTPS in production."
        );
    }

    build_s3_operator(&S3Config {
        endpoint: storage.endpoint.clone(),
        region: storage.region.clone(),
        bucket: storage.bucket.clone(),
        access_key_id: access_key_id.to_string(),
        secret_access_key: secret_access_key.to_string(),
    })
}

/// Build the operator selected by `storage.backend`.
///
/// S3 credentials come from `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`.
pub fn build_from_config(storage: &StorageConfig) -> Result<Operator> {
    match storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("memory storage backend: secrets are lost when the process exits");
            let op = Operator::new(opendal::services::Memory::default())
                .context("creating OpenDAL memory operator")?
                .layer(opendal::layers::LoggingLayer::default())
                .finish();
            Ok(op)
        }
        StorageBackend::Fs => {
            let root = expand_home(&storage.root);
            let op = Operator::new(opendal::services::Fs::default().root(&root.to_string_lossy()))
                .with_context(|| format!("creating OpenDAL fs operator at {}", root.display()))?
                .layer(opendal::layers::LoggingLayer::default())
                .finish();
            Ok(op)
        }
        StorageBackend::S3 => {
            let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
                .context("AWS_ACCESS_KEY_ID must be set for the s3 backend")?;
            let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
                .context("AWS_SECRET_ACCESS_KEY must be set for the s3 backend")?;
            build_s3_from_config(storage, &access_key_id, &secret_access_key)
        }
    }
}

/// Expand a leading `~/` using `$HOME`.
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}
