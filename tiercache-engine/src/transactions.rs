//! Transaction table.
//!
//! Stores transactions by id and enforces the pending-only rules. Replay of
//! the operations is done by the coordinator. Finished transactions keep only
//! their status, and the oldest finished records are dropped once more than
//! the retention limit are held.

use std::collections::{HashMap, VecDeque};

use tiercache_core::{
    CacheResult, EntityId, Transaction, TransactionError, TransactionOp, TransactionStatus,
};
use tokio::sync::Mutex;

/// Finished transactions kept for status queries.
pub const FINISHED_RETENTION: usize = 1024;

#[derive(Default)]
struct LogState {
    transactions: HashMap<EntityId, Transaction>,
    finished: VecDeque<EntityId>,
}

pub struct TransactionLog {
    state: Mutex<LogState>,
    retention: usize,
}

impl Default for TransactionLog {
    fn default() -> Self {
        Self::with_retention(FINISHED_RETENTION)
    }
}

impl TransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: usize) -> Self {
        Self {
            state: Mutex::new(LogState::default()),
            retention,
        }
    }

    /// Create a pending transaction.
    pub async fn begin(&self) -> EntityId {
        let tx = Transaction::new();
        let id = tx.id;
        self.state.lock().await.transactions.insert(id, tx);
        tracing::debug!(transaction_id = %id, "Transaction started");
        id
    }

    /// Append an operation to a pending transaction.
    pub async fn add(&self, id: EntityId, op: TransactionOp) -> CacheResult<()> {
        let mut state = self.state.lock().await;
        let tx = state
            .transactions
            .get_mut(&id)
            .ok_or(TransactionError::NotFound { id })?;
        tx.push(op)?;
        Ok(())
    }

    /// Snapshot of the operations of a pending transaction, in append order.
    pub async fn operations(&self, id: EntityId) -> CacheResult<Vec<TransactionOp>> {
        let state = self.state.lock().await;
        let tx = state
            .transactions
            .get(&id)
            .ok_or(TransactionError::NotFound { id })?;
        tx.ensure_pending()?;
        Ok(tx.operations.clone())
    }

    /// Move a pending transaction to a terminal status.
    pub async fn finish(&self, id: EntityId, status: TransactionStatus) -> CacheResult<()> {
        let mut state = self.state.lock().await;
        let tx = state
            .transactions
            .get_mut(&id)
            .ok_or(TransactionError::NotFound { id })?;
        tx.finish(status)?;

        state.finished.push_back(id);
        while state.finished.len() > self.retention {
            if let Some(oldest) = state.finished.pop_front() {
                state.transactions.remove(&oldest);
                tracing::trace!(transaction_id = %oldest, "Finished transaction pruned");
            }
        }
        Ok(())
    }

    pub async fn status(&self, id: EntityId) -> CacheResult<TransactionStatus> {
        self.state
            .lock()
            .await
            .transactions
            .get(&id)
            .map(|tx| tx.status)
            .ok_or_else(|| TransactionError::NotFound { id }.into())
    }

    pub async fn pending_count(&self) -> usize {
        self.state
            .lock()
            .await
            .transactions
            .values()
            .filter(|tx| tx.status == TransactionStatus::Pending)
            .count()
    }

    /// Number of transactions held, pending or finished.
    pub async fn len(&self) -> usize {
        self.state.lock().await.transactions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.transactions.clear();
        state.finished.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiercache_core::CacheError;

    #[tokio::test]
    async fn test_begin_add_operations() {
        let log = TransactionLog::new();
        let id = log.begin().await;
        log.add(id, TransactionOp::set("k1", b"a".to_vec())).await.unwrap();
        log.add(id, TransactionOp::delete("k2")).await.unwrap();

        let ops = log.operations(id).await.unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].kind(), "set");
        assert_eq!(log.status(id).await.unwrap(), TransactionStatus::Pending);
        assert_eq!(log.pending_count().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_transaction() {
        let log = TransactionLog::new();
        let id = uuid::Uuid::now_v7();
        let err = log.add(id, TransactionOp::get("k")).await.unwrap_err();
        assert_eq!(err, CacheError::Transaction(TransactionError::NotFound { id }));
        assert!(log.status(id).await.is_err());
    }

    #[tokio::test]
    async fn test_finished_transaction_rejects_changes() {
        let log = TransactionLog::new();
        let id = log.begin().await;
        log.finish(id, TransactionStatus::RolledBack).await.unwrap();

        assert!(matches!(
            log.add(id, TransactionOp::get("k")).await,
            Err(CacheError::Transaction(TransactionError::NotPending { .. }))
        ));
        assert!(log.operations(id).await.is_err());
        assert!(log.finish(id, TransactionStatus::Committed).await.is_err());
        assert_eq!(log.status(id).await.unwrap(), TransactionStatus::RolledBack);
        assert_eq!(log.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_finished_records_are_pruned_oldest_first() {
        let log = TransactionLog::with_retention(2);
        let pending = log.begin().await;
        let mut finished = Vec::new();
        for _ in 0..3 {
            let id = log.begin().await;
            log.add(id, TransactionOp::set("k", vec![1u8; 1024])).await.unwrap();
            log.finish(id, TransactionStatus::Committed).await.unwrap();
            finished.push(id);
        }

        assert!(log.status(finished[0]).await.is_err());
        assert_eq!(log.status(finished[1]).await.unwrap(), TransactionStatus::Committed);
        assert_eq!(log.status(finished[2]).await.unwrap(), TransactionStatus::Committed);
        assert_eq!(log.status(pending).await.unwrap(), TransactionStatus::Pending);
        assert_eq!(log.len().await, 3);

        log.clear().await;
        assert!(log.is_empty().await);
    }
}
