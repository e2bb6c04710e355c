//! Durable state and cache storage.
//!
//! Three logical namespaces share one backend: resolution decisions,
//! download job records, and raw per-stage catalog query results. The
//! backend is a dumb TTL dictionary; typed access lives in [`StateStore`].

mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{StoreBackend, StoreEntry};

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Namespace for cached `ResolutionOutcome` decisions.
pub const NS_RESOLUTIONS: &str = "resolutions";
/// Namespace for download job registrations and terminal outcomes.
pub const NS_JOBS: &str = "jobs";
/// Namespace for raw per-stage catalog query results.
pub const NS_STAGE_CACHE: &str = "stage-cache";

/// Typed facade over a [`StoreBackend`].
///
/// Explicitly passed into the orchestrator and download engine so tests
/// and concurrent runs get isolated instances instead of a shared global.
#[derive(Clone)]
pub struct StateStore {
    backend: Arc<dyn StoreBackend>,
}

impl StateStore {
    pub fn new(backend: Arc<dyn StoreBackend>) -> Self {
        Self { backend }
    }

    /// Read and deserialize a live record.
    pub fn get_json<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> Result<Option<T>> {
        match self.backend.get(namespace, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Serialize and write a record with TTL.
    pub fn put_json<T: Serialize>(
        &self,
        namespace: &str,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.backend.set(namespace, key, &bytes, ttl)
    }

    /// Atomic check-and-set registration of a serialized record.
    ///
    /// Returns `true` if this call claimed the key.
    pub fn register_json<T: Serialize>(
        &self,
        namespace: &str,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<bool> {
        let bytes = serde_json::to_vec(value)?;
        self.backend.register_if_absent(namespace, key, &bytes, ttl)
    }

    /// Delete a record.
    pub fn invalidate(&self, namespace: &str, key: &str) -> Result<bool> {
        self.backend.invalidate(namespace, key)
    }

    /// Whether a live record exists.
    pub fn is_live(&self, namespace: &str, key: &str) -> Result<bool> {
        self.backend.is_live(namespace, key)
    }

    /// Drop expired entries across all namespaces.
    pub fn cleanup_expired(&self) -> Result<usize> {
        self.backend.cleanup_expired()
    }

    /// Export all live records in a namespace as structured JSON.
    pub fn export_namespace(&self, namespace: &str) -> Result<Vec<(String, serde_json::Value)>> {
        let raw = self.backend.export_namespace(namespace)?;
        let mut records = Vec::with_capacity(raw.len());
        for (key, bytes) in raw {
            records.push((key, serde_json::from_slice(&bytes)?));
        }
        Ok(records)
    }
}
