//! Error types for tiercache operations

use crate::TransactionStatus;
use thiserror::Error;
use uuid::Uuid;

/// Tier lookup and backing-store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TierError {
    #[error("Tier not found: {name}")]
    NotFound { name: String },

    #[error("Transport failure on tier {tier}: {reason}")]
    Transport { tier: String, reason: String },
}

/// Transaction state errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransactionError {
    #[error("Transaction not found: {id}")]
    NotFound { id: Uuid },

    #[error("Transaction {id} is not pending (status: {status})")]
    NotPending { id: Uuid, status: TransactionStatus },
}

/// Advisory lock errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LockError {
    #[error("Key is already locked: {key}")]
    AlreadyLocked { key: String },

    #[error("Invalid lock id {lock_id} for key {key}")]
    InvalidLockId { key: String, lock_id: Uuid },
}

/// Value pipeline (compression/encryption) errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Encryption key missing")]
    EncryptionKeyMissing,

    #[error("Serialization failure: {reason}")]
    Serialization { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },

    #[error("Failed to read configuration from {path}: {reason}")]
    Io { path: String, reason: String },
}

/// Master error type for all tiercache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Tier error: {0}")]
    Tier(#[from] TierError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl CacheError {
    /// Shorthand for a transport failure on a named tier.
    pub fn transport(tier: impl Into<String>, reason: impl Into<String>) -> Self {
        CacheError::Tier(TierError::Transport {
            tier: tier.into(),
            reason: reason.into(),
        })
    }

    /// Shorthand for a serialization failure.
    pub fn serialization(reason: impl Into<String>) -> Self {
        CacheError::Codec(CodecError::Serialization {
            reason: reason.into(),
        })
    }

    /// Whether this error came from a backing store rather than caller input.
    pub fn is_transport(&self) -> bool {
        matches!(self, CacheError::Tier(TierError::Transport { .. }))
    }
}

/// Result type alias for tiercache operations.
pub type CacheResult<T> = Result<T, CacheError>;

// =============================================================================
// TESTS
// =============================================================================
