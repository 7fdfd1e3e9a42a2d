//! Storage health check

use anyhow::Result;
use opendal::Operator;

/// Verify the storage backend is reachable by listing the root
pub async fn check_health(op: &Operator) -> Result<()> {
    op.list("/")
        .await
        .map(|_| ())
        .map_err(|e| anyhow::anyhow!("storage health check failed: {e}"))
}

/// Returns true if storage is reachable, false otherwise (non-panicking)
pub async fn is_healthy(op: &Operator) -> bool {
    check_health(op).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_backend_is_healthy() {
        let op = Operator::new(opendal::services::Memory::default())
            .unwrap()
            .finish();
        assert!(tokio_test::block_on(is_healthy(&op)));
    }

    #[test]
    fn test_fs_backend_is_healthy() {
        let dir = tempfile::tempdir().unwrap();
        let op = Operator::new(opendal::services::Fs::default().root(&dir.path().to_string_lossy()))
            .unwrap()
            .finish();
        tokio_test::block_on(check_health(&op)).unwrap();
    }
}
