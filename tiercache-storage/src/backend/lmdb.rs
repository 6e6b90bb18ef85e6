//! LMDB-backed store for disk tiers.
//!
//! Uses the heed crate (Rust bindings for LMDB): a single unnamed
//! `Database<Bytes, Bytes>` keyed by the UTF-8 cache key.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. Reads use read transactions, every
//! mutation commits its own write transaction.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use super::{BackendResult, KvBackend};

/// Map sizes are rounded up to this granularity (a multiple of every
/// common page size).
const MAP_SIZE_ALIGN: u64 = 64 * 1024;

/// Smallest map size LMDB is opened with.
const MIN_MAP_SIZE: u64 = 10 * 1024 * 1024;

/// Error type for LMDB backend operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbBackendError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Stored key is not valid UTF-8.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Disk store over a memory-mapped LMDB environment.
pub struct LmdbBackend {
    env: Env,
    db: Database<Bytes, Bytes>,
    path: PathBuf,
}

impl std::fmt::Debug for LmdbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbBackend").field("path", &self.path).finish()
    }
}

impl LmdbBackend {
    /// Open (or create) an environment in `path` sized for `capacity` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - Database cannot be created
    pub fn open<P: AsRef<Path>>(path: P, capacity: u64) -> Result<Self, LmdbBackendError> {
        std::fs::create_dir_all(&path)?;

        let map_size = capacity.max(MIN_MAP_SIZE).div_ceil(MAP_SIZE_ALIGN) * MAP_SIZE_ALIGN;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size as usize)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbBackendError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbBackendError::Transaction(e.to_string()))?;

        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbBackendError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbBackendError::Transaction(e.to_string()))?;

        tracing::debug!(path = %path.as_ref().display(), map_size, "Opened LMDB environment");

        Ok(Self {
            env,
            db,
            path: path.as_ref().to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn txn_error(e: heed::Error) -> LmdbBackendError {
    LmdbBackendError::Transaction(e.to_string())
}

#[async_trait]
impl KvBackend for LmdbBackend {
    async fn get(&self, key: &str) -> BackendResult<Option<Vec<u8>>> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        let value = self
            .db
            .get(&rtxn, key.as_bytes())
            .map_err(txn_error)?
            .map(|bytes| bytes.to_vec());
        Ok(value)
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> BackendResult<()> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        self.db
            .put(&mut wtxn, key.as_bytes(), &value)
            .map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> BackendResult<bool> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let deleted = self
            .db
            .delete(&mut wtxn, key.as_bytes())
            .map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(deleted)
    }

    async fn clear(&self) -> BackendResult<u64> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let removed = self.db.len(&wtxn).map_err(txn_error)?;
        self.db.clear(&mut wtxn).map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(removed)
    }

    async fn keys(&self) -> BackendResult<Vec<String>> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        let mut keys = Vec::new();
        for result in self.db.iter(&rtxn).map_err(txn_error)? {
            let (key, _) = result.map_err(txn_error)?;
            let key = std::str::from_utf8(key)
                .map_err(|e| LmdbBackendError::InvalidKey(e.to_string()))?;
            keys.push(key.to_string());
        }
        Ok(keys)
    }

    async fn len(&self) -> BackendResult<u64> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        Ok(self.db.len(&rtxn).map_err(txn_error)?)
    }

    async fn close(&self) -> BackendResult<()> {
        self.env.force_sync().map_err(txn_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_backend() -> (LmdbBackend, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let backend =
            LmdbBackend::open(temp_dir.path(), 1024).expect("backend creation should succeed");
        (backend, temp_dir)
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let (backend, _temp_dir) = create_test_backend();
        backend
            .put("user:1", b"alice".to_vec())
            .await
            .expect("put should succeed");
        let value = backend.get("user:1").await.expect("get should succeed");
        assert_eq!(value, Some(b"alice".to_vec()));
        assert_eq!(backend.get("user:2").await.expect("get should succeed"), None);
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let (backend, _temp_dir) = create_test_backend();
        backend.put("k", vec![1]).await.expect("put should succeed");
        assert!(backend.delete("k").await.expect("delete should succeed"));
        assert!(!backend.delete("k").await.expect("delete should succeed"));
    }

    #[tokio::test]
    async fn test_keys_len_and_clear() {
        let (backend, _temp_dir) = create_test_backend();
        for key in ["a", "b", "c"] {
            backend.put(key, vec![0]).await.expect("put should succeed");
        }
        let mut keys = backend.keys().await.expect("keys should succeed");
        keys.sort();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(backend.len().await.expect("len should succeed"), 3);
        assert_eq!(backend.clear().await.expect("clear should succeed"), 3);
        assert_eq!(backend.len().await.expect("len should succeed"), 0);
    }

    #[tokio::test]
    async fn test_reopen_keeps_data() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        {
            let backend = LmdbBackend::open(temp_dir.path(), 0).expect("open");
            backend.put("durable", b"yes".to_vec()).await.expect("put");
            backend.close().await.expect("close");
        }
        let backend = LmdbBackend::open(temp_dir.path(), 0).expect("reopen");
        assert_eq!(
            backend.get("durable").await.expect("get"),
            Some(b"yes".to_vec())
        );
    }
}
