//! Remote catalog adapters.
//!
//! Each catalog implements [`CatalogClient`] and converts its raw API
//! payloads to [`Candidate`] at the boundary. Nothing above this layer
//! touches untyped catalog JSON.

mod civitai;
mod huggingface;

pub use civitai::CivitaiClient;
pub use huggingface::HuggingFaceClient;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Asset category hint supplied by the caller and forwarded to catalogs
/// that support type filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeHint {
    Checkpoint,
    Lora,
    Vae,
    Embedding,
    Controlnet,
    Other,
}

impl TypeHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeHint::Checkpoint => "checkpoint",
            TypeHint::Lora => "lora",
            TypeHint::Vae => "vae",
            TypeHint::Embedding => "embedding",
            TypeHint::Controlnet => "controlnet",
            TypeHint::Other => "other",
        }
    }
}

impl std::fmt::Display for TypeHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result ordering requested from a catalog search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Relevance,
    MostDownloaded,
}

/// Query-shaping parameters common to all catalogs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchFilters {
    pub type_hint: Option<TypeHint>,
    /// Content-visibility toggle. Some catalogs under-return results
    /// depending on this flag, so the primary stage queries both ways.
    pub include_sensitive: Option<bool>,
    pub sort: SortOrder,
    pub limit: u32,
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self {
            type_hint: None,
            include_sensitive: None,
            sort: SortOrder::Relevance,
            limit: 20,
        }
    }
}

/// One catalog hit, fully typed. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// Catalog-local record id.
    pub catalog_id: String,
    /// Which catalog produced this candidate ("civitai", "huggingface").
    pub catalog_source: String,
    /// Human-facing record name.
    pub display_name: String,
    /// Primary weight file name.
    pub file_name: String,
    pub file_size: Option<u64>,
    /// Opaque token the download engine hands back to the catalog;
    /// for both current adapters this is a direct download URL.
    pub download_ref: String,
    pub tags: Vec<String>,
    pub creator: Option<String>,
    /// Popularity signal when the catalog provides one (tie-break only).
    pub download_count: Option<u64>,
    /// Known content hash from catalog metadata, when published.
    pub sha256: Option<String>,
}

/// Uniform query/fetch contract implemented once per remote catalog.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Stable catalog identifier used in provenance and candidates.
    fn source(&self) -> &'static str;

    /// Free-text search against the catalog's index.
    async fn query_by_text(&self, text: &str, filters: &SearchFilters) -> Result<Vec<Candidate>>;

    /// Direct record fetch by catalog id, never routed through the
    /// free-text index. Returns `None` for a clean not-found; a returned
    /// record whose own id differs from the requested id is a hard
    /// catalog-inconsistency error.
    async fn fetch_by_id(&self, id: &str) -> Result<Option<Candidate>>;

    /// Search by a single tag.
    async fn query_by_tag(&self, tag: &str, filters: &SearchFilters) -> Result<Vec<Candidate>>;

    /// Search restricted to a creator/author identity.
    async fn query_by_creator(
        &self,
        creator_id: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<Candidate>>;
}

/// File extensions recognized as binary model weights.
pub const WEIGHT_EXTENSIONS: &[&str] = &[
    ".safetensors",
    ".ckpt",
    ".pt",
    ".pth",
    ".bin",
    ".gguf",
    ".onnx",
];

/// Whether a file name carries a recognized weight extension.
pub fn has_weight_extension(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    WEIGHT_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}
