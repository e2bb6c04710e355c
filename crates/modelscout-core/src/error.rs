//! Error types for modelscout.
//!
//! One error enum covers the whole pipeline so the orchestrator and the
//! download engine can classify failures uniformly (transient vs. client
//! vs. verification) without string matching.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for modelscout operations.
#[derive(Debug, Error)]
pub enum ScoutError {
    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Rate limited by {service}, retry after {retry_after_secs:?} seconds")]
    RateLimited {
        service: String,
        retry_after_secs: Option<u64>,
    },

    /// Non-success HTTP status. 5xx and 429 are retryable, other 4xx are not.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    // Catalog errors
    #[error("Catalog returned record '{returned}' for requested id '{requested}'")]
    CatalogMismatch { requested: String, returned: String },

    #[error("Catalog record not found: {id}")]
    RecordNotFound { id: String },

    // Database errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Download errors
    #[error("Download failed for {url}: {message}")]
    DownloadFailed { url: String, message: String },

    #[error("Download cancelled")]
    DownloadCancelled,

    #[error("Download paused")]
    DownloadPaused,

    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("Size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("Target was not resolved: {name}")]
    NotResolved { name: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for modelscout operations.
pub type Result<T> = std::result::Result<T, ScoutError>;

// Conversion implementations for common error types

impl From<std::io::Error> for ScoutError {
    fn from(err: std::io::Error) -> Self {
        ScoutError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for ScoutError {
    fn from(err: serde_json::Error) -> Self {
        ScoutError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for ScoutError {
    fn from(err: rusqlite::Error) -> Self {
        ScoutError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for ScoutError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ScoutError::Timeout(std::time::Duration::from_secs(0))
        } else {
            ScoutError::Network {
                message: err.to_string(),
                cause: Some(err.to_string()),
            }
        }
    }
}

impl ScoutError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        ScoutError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Check if this error should trigger a retry.
    ///
    /// Transient transport failures (timeouts, resets, 5xx, rate limits)
    /// are retryable. Client errors (4xx) and verification failures never are.
    pub fn is_retryable(&self) -> bool {
        match self {
            ScoutError::Network { .. }
            | ScoutError::Timeout(_)
            | ScoutError::RateLimited { .. } => true,
            ScoutError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Check if this is a client-side request error (4xx class).
    pub fn is_client_error(&self) -> bool {
        matches!(self, ScoutError::Http { status, .. } if (400..500).contains(status) && *status != 429)
    }

    /// Short stable identifier for terminal outcome records.
    pub fn kind(&self) -> &'static str {
        match self {
            ScoutError::Network { .. } => "network",
            ScoutError::Timeout(_) => "timeout",
            ScoutError::RateLimited { .. } => "rate_limited",
            // 429 is transient like RateLimited, not a caller mistake.
            ScoutError::Http { status: 429, .. } => "rate_limited",
            ScoutError::Http { status, .. } if (400..500).contains(status) => "client_error",
            ScoutError::Http { .. } => "server_error",
            ScoutError::CatalogMismatch { .. } => "catalog_mismatch",
            ScoutError::RecordNotFound { .. } => "record_not_found",
            ScoutError::Database { .. } => "database",
            ScoutError::Io { .. } => "io",
            ScoutError::Json { .. } => "json",
            ScoutError::DownloadFailed { .. } => "download_failed",
            ScoutError::DownloadCancelled => "cancelled",
            ScoutError::DownloadPaused => "paused",
            ScoutError::HashMismatch { .. } => "hash_mismatch",
            ScoutError::SizeMismatch { .. } => "size_mismatch",
            ScoutError::NotResolved { .. } => "not_resolved",
            ScoutError::Config { .. } => "config",
            ScoutError::Other(_) => "other",
        }
    }
}
