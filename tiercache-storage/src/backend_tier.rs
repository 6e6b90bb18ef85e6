//! Tier adapter over a raw [`KvBackend`].
//!
//! Entries are stored as JSON documents. Tag lookups and usage stats decode
//! every stored entry, which is acceptable for the stand-in backends and for
//! modest disk tiers.

use async_trait::async_trait;
use tiercache_core::{CacheEntry, CacheError, CacheResult, TierDescriptor, TierStats};

use crate::backend::{BackendError, KvBackend};
use crate::tier::Tier;

/// A tier that persists entries through a byte-oriented backend.
pub struct BackendTier<B: KvBackend> {
    descriptor: TierDescriptor,
    backend: B,
}

impl<B: KvBackend> BackendTier<B> {
    pub fn new(descriptor: TierDescriptor, backend: B) -> Self {
        Self {
            descriptor,
            backend,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn transport(&self, e: BackendError) -> CacheError {
        CacheError::transport(self.descriptor.name.clone(), e.to_string())
    }

    fn decode(&self, bytes: &[u8]) -> CacheResult<CacheEntry> {
        serde_json::from_slice(bytes).map_err(|e| CacheError::serialization(e.to_string()))
    }

    /// Decode every stored entry, skipping ones that vanish or fail to decode.
    async fn entries(&self) -> CacheResult<Vec<CacheEntry>> {
        let keys = self.backend.keys().await.map_err(|e| self.transport(e))?;
        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(bytes) = self.backend.get(&key).await.map_err(|e| self.transport(e))? else {
                continue;
            };
            match self.decode(&bytes) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!(tier = %self.descriptor.name, key = %key, error = %e, "Skipping undecodable entry");
                }
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl<B: KvBackend> Tier for BackendTier<B> {
    fn descriptor(&self) -> &TierDescriptor {
        &self.descriptor
    }

    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        match self.backend.get(key).await.map_err(|e| self.transport(e))? {
            Some(bytes) => self.decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    async fn set(&self, entry: CacheEntry) -> CacheResult<()> {
        let bytes =
            serde_json::to_vec(&entry).map_err(|e| CacheError::serialization(e.to_string()))?;
        self.backend
            .put(&entry.key, bytes)
            .await
            .map_err(|e| self.transport(e))
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        self.backend.delete(key).await.map_err(|e| self.transport(e))
    }

    async fn clear(&self) -> CacheResult<u64> {
        self.backend.clear().await.map_err(|e| self.transport(e))
    }

    async fn keys(&self) -> CacheResult<Vec<String>> {
        self.backend.keys().await.map_err(|e| self.transport(e))
    }

    async fn keys_by_tag(&self, tags: &[String]) -> CacheResult<Vec<String>> {
        Ok(self
            .entries()
            .await?
            .into_iter()
            .filter(|entry| entry.metadata.has_any_tag(tags))
            .map(|entry| entry.key)
            .collect())
    }

    async fn stats(&self) -> CacheResult<TierStats> {
        let entries = self.entries().await?;
        Ok(TierStats {
            size_bytes: entries.iter().map(|e| e.metadata.size as u64).sum(),
            entry_count: entries.len() as u64,
            evictions: 0,
        })
    }

    async fn shutdown(&self) -> CacheResult<()> {
        self.backend.close().await.map_err(|e| self.transport(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{InMemoryBackend, LmdbBackend};
    use std::time::Duration;
    use tempfile::TempDir;
    use tiercache_core::{TierError, TierKind};

    fn remote_tier() -> BackendTier<InMemoryBackend> {
        BackendTier::new(
            TierDescriptor::new("remote", TierKind::Remote, 2, 1 << 20),
            InMemoryBackend::new(),
        )
    }

    #[tokio::test]
    async fn test_entry_survives_encoding() {
        let tier = remote_tier();
        let entry = CacheEntry::new("k", vec![0, 159, 146, 150], Some(Duration::from_secs(5)))
            .with_tags(["t"]);
        tier.set(entry.clone()).await.unwrap();
        assert_eq!(tier.get("k").await.unwrap(), Some(entry));
    }

    #[tokio::test]
    async fn test_unavailable_backend_is_transport_error() {
        let tier = remote_tier();
        tier.backend().set_available(false);
        let err = tier.get("k").await.unwrap_err();
        assert!(err.is_transport());
        assert!(matches!(
            err,
            CacheError::Tier(TierError::Transport { ref tier, .. }) if tier == "remote"
        ));
        assert!(tier.set(CacheEntry::new("k", vec![], None)).await.is_err());
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_serialization_error() {
        let tier = remote_tier();
        tier.backend().put("bad", b"not json".to_vec()).await.unwrap();
        let err = tier.get("bad").await.unwrap_err();
        assert!(!err.is_transport());

        // Stats skip what they cannot decode
        tier.set(CacheEntry::new("good", vec![1, 2], None)).await.unwrap();
        let stats = tier.stats().await.unwrap();
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.size_bytes, 2);
    }

    #[tokio::test]
    async fn test_keys_by_tag() {
        let tier = remote_tier();
        tier.set(CacheEntry::new("a", vec![], None).with_tags(["x"]))
            .await
            .unwrap();
        tier.set(CacheEntry::new("b", vec![], None).with_tags(["y"]))
            .await
            .unwrap();
        assert_eq!(
            tier.keys_by_tag(&["y".to_string()]).await.unwrap(),
            vec!["b".to_string()]
        );
    }

    #[tokio::test]
    async fn test_lmdb_backed_tier() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let backend = LmdbBackend::open(temp_dir.path(), 1 << 20).expect("open");
        let tier = BackendTier::new(
            TierDescriptor::new("disk", TierKind::Disk, 3, 1 << 20)
                .with_location(temp_dir.path()),
            backend,
        );
        tier.set(CacheEntry::new("k", b"v".to_vec(), None)).await.unwrap();
        assert!(tier.delete("k").await.unwrap());
        assert_eq!(tier.get("k").await.unwrap(), None);
        tier.shutdown().await.unwrap();
    }
}
