//! Store backend trait and types.

use crate::error::Result;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// A stored entry with metadata.
#[derive(Debug, Clone)]
pub struct StoreEntry {
    /// The stored data as bytes.
    pub value: Vec<u8>,
    /// When the entry was written.
    pub created_at: DateTime<Utc>,
    /// When the entry expires.
    pub expires_at: DateTime<Utc>,
}

/// Durable namespaced key-value storage with TTL semantics.
///
/// This layer holds no business logic: it is a dumb dictionary with expiry.
/// Expired entries are treated as absent on every read path. All operations
/// are synchronous to match rusqlite's API; callers on the async side wrap
/// them as needed.
pub trait StoreBackend: Send + Sync {
    /// Get stored data by key.
    ///
    /// Returns `None` if the key doesn't exist or has expired.
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>>;

    /// Get stored data with entry metadata.
    fn get_entry(&self, namespace: &str, key: &str) -> Result<Option<StoreEntry>>;

    /// Set data with TTL, overwriting any existing entry.
    fn set(&self, namespace: &str, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Atomically insert `value` only if no live entry exists for the key.
    ///
    /// Returns `true` if this call won the registration; `false` if a live
    /// entry was already present. This is the single primitive the
    /// one-active-job-per-path invariant rests on, so it must be one
    /// atomic statement, never a read followed by a write.
    fn register_if_absent(
        &self,
        namespace: &str,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<bool>;

    /// Invalidate (delete) a specific key.
    fn invalidate(&self, namespace: &str, key: &str) -> Result<bool>;

    /// Check if an entry exists and is not expired.
    fn is_live(&self, namespace: &str, key: &str) -> Result<bool>;

    /// Remove expired entries from all namespaces.
    ///
    /// Returns the number of entries removed.
    fn cleanup_expired(&self) -> Result<usize>;

    /// All live `(key, value)` pairs in a namespace, sorted by key.
    ///
    /// Used for bulk export to external reporting; every record must be
    /// readable without replaying any resolution logic.
    fn export_namespace(&self, namespace: &str) -> Result<Vec<(String, Vec<u8>)>>;
}
