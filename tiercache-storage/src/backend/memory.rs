//! In-process stand-in for remote and disk stores.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BackendError, BackendResult, KvBackend};

/// Map-backed store with optional simulated latency and an availability
/// switch. While unavailable every call fails with
/// [`BackendError::Unavailable`].
#[derive(Debug)]
pub struct InMemoryBackend {
    data: RwLock<HashMap<String, Vec<u8>>>,
    latency: Option<Duration>,
    available: AtomicBool,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            latency: None,
            available: AtomicBool::new(true),
        }
    }

    /// Sleep this long before every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn round_trip(&self) -> BackendResult<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.is_available() {
            Ok(())
        } else {
            Err(BackendError::Unavailable("connection refused".to_string()))
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> BackendResult<Option<Vec<u8>>> {
        self.round_trip().await?;
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> BackendResult<()> {
        self.round_trip().await?;
        self.data.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> BackendResult<bool> {
        self.round_trip().await?;
        Ok(self.data.write().await.remove(key).is_some())
    }

    async fn clear(&self) -> BackendResult<u64> {
        self.round_trip().await?;
        let mut data = self.data.write().await;
        let removed = data.len() as u64;
        data.clear();
        Ok(removed)
    }

    async fn keys(&self) -> BackendResult<Vec<String>> {
        self.round_trip().await?;
        Ok(self.data.read().await.keys().cloned().collect())
    }

    async fn len(&self) -> BackendResult<u64> {
        self.round_trip().await?;
        Ok(self.data.read().await.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let backend = InMemoryBackend::new();
        backend.put("k", b"v".to_vec()).await.unwrap();
        assert_eq!(backend.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(backend.len().await.unwrap(), 1);
        assert!(backend.delete("k").await.unwrap());
        assert!(!backend.delete("k").await.unwrap());
        assert_eq!(backend.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unavailable_fails_every_call() {
        let backend = InMemoryBackend::new();
        backend.put("k", b"v".to_vec()).await.unwrap();
        backend.set_available(false);

        assert!(matches!(
            backend.get("k").await,
            Err(BackendError::Unavailable(_))
        ));
        assert!(backend.put("k2", vec![]).await.is_err());
        assert!(backend.keys().await.is_err());

        backend.set_available(true);
        assert_eq!(backend.get("k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn test_latency_is_applied() {
        let backend = InMemoryBackend::new().with_latency(Duration::from_millis(20));
        let started = std::time::Instant::now();
        backend.get("missing").await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_clear_counts() {
        let backend = InMemoryBackend::new();
        backend.put("a", vec![1]).await.unwrap();
        backend.put("b", vec![2]).await.unwrap();
        assert_eq!(backend.clear().await.unwrap(), 2);
        assert!(backend.keys().await.unwrap().is_empty());
    }
}
