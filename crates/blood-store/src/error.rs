use thiserror::Error;

use crate::{BloodType, RequestId};

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An exclusive lock could not be acquired within the configured wait.
    #[error("Timed out after {waited_ms}ms waiting for a lock")]
    LockTimeout { waited_ms: u64 },

    /// A row held values the domain types cannot represent.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// The request referenced by a write does not exist.
    #[error("Request not found: {0}")]
    RequestNotFound(RequestId),

    /// The inventory row referenced by a write does not exist.
    #[error("No inventory record for blood type {0}")]
    InventoryNotFound(BloodType),

    /// A failure injected by the in-memory store.
    #[error("Injected storage failure: {0}")]
    Injected(&'static str),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
