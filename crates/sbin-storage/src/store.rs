//! Secret store: envelope bytes in, opaque id out, with expiry and
//! burn-after-read enforced on every fetch.
//!
//! Layout under `<prefix>/<id>/`:
//! - `envelope`: the envelope bytes, exactly as uploaded
//! - `meta.json`: [`StoredMeta`]

use std::future::Future;
use std::time::{SystemTime, UNIX_EPOCH};

use opendal::{ErrorKind, Operator};
use sbin_core::{ResolvedOptions, SbinError, SbinResult};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Retention metadata stored next to each envelope. Carries nothing secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMeta {
    /// Unix seconds
    pub created_at: u64,
    /// Unix seconds; the entry is gone at or after this instant
    pub expires_at: u64,
    /// Reads left before the entry is deleted. `None` = unlimited.
    pub remaining_reads: Option<u32>,
    pub password_protected: bool,
    pub slowdown_secs: Option<u32>,
    pub envelope_bytes: u64,
}

impl StoredMeta {
    pub fn new(options: &ResolvedOptions, envelope_bytes: usize, now: u64) -> Self {
        Self {
            created_at: now,
            expires_at: now.saturating_add(options.expires.seconds()),
            remaining_reads: options.burn_after,
            password_protected: options.password_protected,
            slowdown_secs: options.slowdown,
            envelope_bytes: envelope_bytes as u64,
        }
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

/// Current time in unix seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Where envelopes go. Implementations own expiry and burn semantics.
pub trait SecretStore: Send + Sync {
    /// Store an envelope and return its newly issued id.
    fn put(
        &self,
        envelope: Vec<u8>,
        meta: &StoredMeta,
    ) -> impl Future<Output = SbinResult<String>> + Send;

    /// Fetch an envelope, counting one read against its burn limit.
    ///
    /// Burn accounting is exact only within one process: [`OpendalStore`]
    /// serializes reads with an in-process lock, so two processes reading
    /// the same entry through a shared fs or S3 backend can both succeed on
    /// its last permitted read.
    fn get(&self, id: &str) -> impl Future<Output = SbinResult<Vec<u8>>> + Send;

    /// Remove an entry. Removing a missing entry is not an error.
    fn delete(&self, id: &str) -> impl Future<Output = SbinResult<()>> + Send;
}

/// [`SecretStore`] over any OpenDAL operator (memory, fs, S3).
pub struct OpendalStore {
    op: Operator,
    prefix: String,
    // serializes read-modify-write of meta.json within this process
    read_lock: Mutex<()>,
}

impl OpendalStore {
    pub fn new(op: Operator, prefix: &str) -> Self {
        Self {
            op,
            prefix: prefix.trim_matches('/').to_string(),
            read_lock: Mutex::new(()),
        }
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    fn entry_dir(&self, id: &str) -> String {
        if self.prefix.is_empty() {
            format!("{id}/")
        } else {
            format!("{}/{id}/", self.prefix)
        }
    }

    fn envelope_path(&self, id: &str) -> String {
        format!("{}envelope", self.entry_dir(id))
    }

    fn meta_path(&self, id: &str) -> String {
        format!("{}meta.json", self.entry_dir(id))
    }

    /// Read the metadata of an entry without counting a read.
    pub async fn meta(&self, id: &str) -> SbinResult<StoredMeta> {
        check_id(id)?;
        let buf = self
            .op
            .read(&self.meta_path(id))
            .await
            .map_err(|e| storage_error(id, "reading metadata", e))?;
        serde_json::from_slice(&buf.to_vec())
            .map_err(|e| SbinError::Storage(format!("corrupt metadata for {id}: {e}")))
    }

    async fn write_meta(&self, id: &str, meta: &StoredMeta) -> SbinResult<()> {
        let bytes = serde_json::to_vec(meta)
            .map_err(|e| SbinError::Storage(format!("encoding metadata for {id}: {e}")))?;
        self.op
            .write(&self.meta_path(id), bytes)
            .await
            .map_err(|e| storage_error(id, "writing metadata", e))?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> SbinResult<()> {
        // envelope first: a half-removed entry must not be readable
        for path in [self.envelope_path(id), self.meta_path(id)] {
            self.op
                .delete(&path)
                .await
                .map_err(|e| storage_error(id, "deleting entry", e))?;
        }
        if let Err(e) = self.op.delete(&self.entry_dir(id)).await {
            debug!(secret_id = %id, error = %e, "leaving empty entry directory");
        }
        Ok(())
    }
}

impl SecretStore for OpendalStore {
    async fn put(&self, envelope: Vec<u8>, meta: &StoredMeta) -> SbinResult<String> {
        let id = uuid::Uuid::new_v4().simple().to_string();

        // envelope first: an entry is only readable once its meta exists
        let size = envelope.len();
        self.op
            .write(&self.envelope_path(&id), envelope)
            .await
            .map_err(|e| storage_error(&id, "writing envelope", e))?;
        if let Err(e) = self.write_meta(&id, meta).await {
            if let Err(cleanup) = self.remove(&id).await {
                warn!(secret_id = %id, error = %cleanup, "failed to clean up partial entry");
            }
            return Err(e);
        }

        debug!(
            secret_id = %id,
            bytes = size,
            expires_at = meta.expires_at,
            remaining_reads = ?meta.remaining_reads,
            "stored envelope"
        );
        Ok(id)
    }

    async fn get(&self, id: &str) -> SbinResult<Vec<u8>> {
        let _guard = self.read_lock.lock().await;

        let mut meta = self.meta(id).await?;
        if meta.is_expired(unix_now()) {
            self.remove(id).await?;
            info!(secret_id = %id, "secret expired, deleted");
            return Err(SbinError::Expired(id.to_string()));
        }

        let envelope = self
            .op
            .read(&self.envelope_path(id))
            .await
            .map_err(|e| storage_error(id, "reading envelope", e))?
            .to_vec();

        match meta.remaining_reads {
            Some(n) if n <= 1 => {
                self.remove(id).await?;
                info!(secret_id = %id, "last permitted read, secret burned");
            }
            Some(n) => {
                meta.remaining_reads = Some(n - 1);
                self.write_meta(id, &meta).await?;
                debug!(secret_id = %id, remaining_reads = n - 1, "read counted");
            }
            None => {}
        }

        Ok(envelope)
    }

    async fn delete(&self, id: &str) -> SbinResult<()> {
        check_id(id)?;
        self.remove(id).await
    }
}

/// Ids are issued by `put`; anything that could escape the prefix is
/// treated as unknown.
fn check_id(id: &str) -> SbinResult<()> {
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(SbinError::NotFound(id.to_string()));
    }
    Ok(())
}

fn storage_error(id: &str, action: &str, e: opendal::Error) -> SbinError {
    if e.kind() == ErrorKind::NotFound {
        SbinError::NotFound(id.to_string())
    } else {
        SbinError::Storage(format!("{action} for {id}: {e}"))
    }
}
