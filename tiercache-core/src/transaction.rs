//! Transaction records.
//!
//! A transaction is an ordered operation list replayed on commit. Status only
//! moves forward: `Pending -> Committed` or `Pending -> RolledBack`.

use crate::{
    new_entity_id, EntityId, InvalidateRequest, SetOptions, Timestamp, TransactionError,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionStatus {
    Pending,
    Committed,
    RolledBack,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Committed => "committed",
            TransactionStatus::RolledBack => "rolled-back",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A queued cache operation.
#[derive(Debug, Clone)]
pub enum TransactionOp {
    Get {
        key: String,
    },
    Set {
        key: String,
        value: Vec<u8>,
        options: SetOptions,
    },
    Delete {
        keys: Vec<String>,
    },
    Invalidate {
        request: InvalidateRequest,
    },
}

impl TransactionOp {
    pub fn get(key: impl Into<String>) -> Self {
        TransactionOp::Get { key: key.into() }
    }

    pub fn set(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        TransactionOp::Set {
            key: key.into(),
            value: value.into(),
            options: SetOptions::default(),
        }
    }

    pub fn set_with(key: impl Into<String>, value: impl Into<Vec<u8>>, options: SetOptions) -> Self {
        TransactionOp::Set {
            key: key.into(),
            value: value.into(),
            options,
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        TransactionOp::Delete {
            keys: vec![key.into()],
        }
    }

    pub fn invalidate(request: InvalidateRequest) -> Self {
        TransactionOp::Invalidate { request }
    }

    /// Short operation name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TransactionOp::Get { .. } => "get",
            TransactionOp::Set { .. } => "set",
            TransactionOp::Delete { .. } => "delete",
            TransactionOp::Invalidate { .. } => "invalidate",
        }
    }
}

/// A transaction and its queued operations.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: EntityId,
    pub operations: Vec<TransactionOp>,
    pub status: TransactionStatus,
    pub created_at: Timestamp,
}

impl Transaction {
    pub fn new() -> Self {
        Self {
            id: new_entity_id(),
            operations: Vec::new(),
            status: TransactionStatus::Pending,
            created_at: Utc::now(),
        }
    }

    /// Append an operation; only allowed while pending.
    pub fn push(&mut self, op: TransactionOp) -> Result<(), TransactionError> {
        self.ensure_pending()?;
        self.operations.push(op);
        Ok(())
    }

    /// Move to a terminal status; only allowed while pending. Queued
    /// operations are released.
    pub fn finish(&mut self, status: TransactionStatus) -> Result<(), TransactionError> {
        self.ensure_pending()?;
        self.status = status;
        self.operations = Vec::new();
        Ok(())
    }

    pub fn ensure_pending(&self) -> Result<(), TransactionError> {
        if self.status == TransactionStatus::Pending {
            Ok(())
        } else {
            Err(TransactionError::NotPending {
                id: self.id,
                status: self.status,
            })
        }
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_while_pending() {
        let mut tx = Transaction::new();
        tx.push(TransactionOp::set("k", b"v".to_vec())).unwrap();
        tx.push(TransactionOp::delete("k2")).unwrap();
        assert_eq!(tx.operations.len(), 2);
        assert_eq!(tx.operations[0].kind(), "set");
        assert_eq!(tx.operations[1].kind(), "delete");
    }

    #[test]
    fn test_push_after_commit_fails() {
        let mut tx = Transaction::new();
        tx.finish(TransactionStatus::Committed).unwrap();
        let err = tx.push(TransactionOp::get("k")).unwrap_err();
        assert_eq!(
            err,
            TransactionError::NotPending {
                id: tx.id,
                status: TransactionStatus::Committed
            }
        );
    }

    #[test]
    fn test_finish_releases_operations() {
        let mut tx = Transaction::new();
        tx.push(TransactionOp::set("k", vec![0u8; 4096])).unwrap();
        tx.finish(TransactionStatus::Committed).unwrap();
        assert!(tx.operations.is_empty());
        assert_eq!(tx.operations.capacity(), 0);
        assert_eq!(tx.status, TransactionStatus::Committed);
    }

    #[test]
    fn test_status_is_monotonic() {
        let mut tx = Transaction::new();
        tx.finish(TransactionStatus::RolledBack).unwrap();
        assert!(tx.finish(TransactionStatus::Committed).is_err());
        assert!(tx.finish(TransactionStatus::Pending).is_err());
        assert_eq!(tx.status, TransactionStatus::RolledBack);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(TransactionStatus::RolledBack.to_string(), "rolled-back");
        assert!(TransactionStatus::Committed.is_terminal());
        assert!(!TransactionStatus::Pending.is_terminal());
    }
}
