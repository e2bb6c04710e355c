//! Curated name-to-catalog-id mapping table.
//!
//! Human-maintained JSON consumed read-only by the first cascade stage.
//! A hit here bypasses free-text search entirely, which matters because
//! remote search indexes silently filter some records that a direct id
//! fetch still returns.

use super::types::normalize_name;
use crate::catalog::TypeHint;
use crate::error::{Result, ScoutError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// One curated mapping entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownMapping {
    pub catalog_source: String,
    pub catalog_id: String,
    pub type_hint: TypeHint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// The full table, keyed by normalized target name.
#[derive(Debug, Clone, Default)]
pub struct KnownMappings {
    entries: HashMap<String, KnownMapping>,
}

impl KnownMappings {
    /// Empty table; every lookup misses.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from already-normalized (or raw) name keys.
    pub fn from_entries(entries: impl IntoIterator<Item = (String, KnownMapping)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(name, entry)| (normalize_name(&name), entry))
                .collect(),
        }
    }

    /// Load the table from a JSON file. A missing file yields an empty
    /// table; a malformed file is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("No known-mapping table at {}, starting empty", path.display());
                return Ok(Self::empty());
            }
            Err(e) => return Err(ScoutError::io_with_path(e, path)),
        };

        let raw: HashMap<String, KnownMapping> = serde_json::from_str(&content)?;
        debug!("Loaded {} known mappings from {}", raw.len(), path.display());
        Ok(Self::from_entries(raw))
    }

    /// Exact lookup by normalized name.
    pub fn lookup(&self, raw_name: &str) -> Option<&KnownMapping> {
        self.entries.get(&normalize_name(raw_name))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
