//! Raw key/value backends behind non-memory tiers.
//!
//! A backend stores opaque bytes; [`crate::BackendTier`] owns entry encoding.

use async_trait::async_trait;

mod lmdb;
mod memory;

pub use lmdb::{LmdbBackend, LmdbBackendError};
pub use memory::InMemoryBackend;

/// Backend failures. Tiers report these as transport errors.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backing store cannot be reached.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Lmdb(#[from] LmdbBackendError),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Byte-oriented store contract.
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn get(&self, key: &str) -> BackendResult<Option<Vec<u8>>>;

    async fn put(&self, key: &str, value: Vec<u8>) -> BackendResult<()>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> BackendResult<bool>;

    /// Returns the number of keys removed.
    async fn clear(&self) -> BackendResult<u64>;

    async fn keys(&self) -> BackendResult<Vec<String>>;

    async fn len(&self) -> BackendResult<u64>;

    async fn close(&self) -> BackendResult<()> {
        Ok(())
    }
}
