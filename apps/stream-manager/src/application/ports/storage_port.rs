//! Storage Port (Driven Port)
//!
//! String-keyed durable slots, written through on every state change.

/// Storage error.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Reading or writing the underlying medium failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stored document could not be encoded or decoded.
    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Local key-value storage for persisted manager state.
///
/// Values are opaque strings (JSON documents in practice). Writes are
/// last-write-wins with no transactional guarantee across processes.
pub trait KeyValueStore: Send + Sync {
    /// Read a slot. `Ok(None)` when the slot was never written.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a slot, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}
