//! Centralized configuration for modelscout.
//!
//! Network and cache parameters are compile-time constants in the same
//! style as the rest of the tunables. Scoring weights live in a runtime
//! struct because they are heuristics tuned against specific catalog
//! failure cases, not contracts.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
    /// Download streams have no total timeout, only a connect timeout.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
    pub const USER_AGENT: &'static str = "modelscout/0.3";

    pub const DOWNLOAD_MAX_RETRIES: u32 = 4;
    pub const DOWNLOAD_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
    pub const DOWNLOAD_RETRY_MAX_DELAY: Duration = Duration::from_secs(60);
    pub const DOWNLOAD_TEMP_SUFFIX: &'static str = ".part";

    /// Concurrent transfer ceiling; jobs beyond it queue.
    pub const MAX_CONCURRENT_DOWNLOADS: usize = 3;
    /// Poll interval while attached to another caller's in-progress job.
    pub const ATTACH_POLL_INTERVAL: Duration = Duration::from_millis(250);
    /// Cadence at which a running transfer refreshes its job record's
    /// `updated_at` so other submitters can tell it is still alive.
    pub const JOB_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
    /// An active registration whose last heartbeat is older than this
    /// belongs to a crashed holder and may be reclaimed.
    pub const JOB_STALE_AFTER: Duration = Duration::from_secs(5 * 60);

    /// Concurrent target resolutions.
    pub const MAX_CONCURRENT_RESOLUTIONS: usize = 4;
}

/// TTLs for the persistent store namespaces.
pub struct CacheTtlConfig;

impl CacheTtlConfig {
    /// Resolution decisions are stable for hours.
    pub const DECISION_TTL: Duration = Duration::from_secs(6 * 3600);
    /// Raw per-stage query results expire sooner so a re-decision sees
    /// reasonably fresh catalog data without re-querying every stage.
    pub const STAGE_TTL: Duration = Duration::from_secs(30 * 60);
    /// Terminal download outcomes never expire on their own.
    pub const JOB_TTL: Duration = Duration::from_secs(365 * 24 * 3600);
}

/// Result caps per cascade stage (diminishing-returns budgets).
pub struct CascadeConfig;

impl CascadeConfig {
    pub const PRIMARY_QUERY_LIMIT: u32 = 20;
    pub const SORTED_QUERY_LIMIT: u32 = 10;
    pub const MAX_TAGS: usize = 3;
    pub const PER_TAG_LIMIT: u32 = 10;
    pub const CREATOR_QUERY_LIMIT: u32 = 20;
    pub const PER_KEYWORD_LIMIT: u32 = 5;
    pub const MAX_KEYWORDS: usize = 5;
}

/// Scoring weights and thresholds.
///
/// Defaults reproduce the tuned values; callers may override any of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ScoringConfig {
    /// Exact normalized full-name match.
    pub exact_match_bonus: i32,
    /// One name is a substring of the other (exact wins over this).
    pub substring_bonus: i32,
    /// Per shared significant keyword token.
    pub keyword_bonus: i32,
    /// Candidate came from a direct-ID / known-mapping fetch.
    pub direct_id_bonus: i32,
    /// File name carries a recognized binary-weight extension.
    pub weight_extension_bonus: i32,
    /// Score at or above this is high confidence.
    pub high_threshold: i32,
    /// Score at or above this (but below high) is medium confidence.
    pub medium_threshold: i32,
    /// Candidates within this many points of the best make the result
    /// ambiguous even when the best clears the high threshold.
    pub tie_window: i32,
    /// Alternates retained on an uncertain outcome.
    pub max_alternates: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            exact_match_bonus: 100,
            substring_bonus: 50,
            keyword_bonus: 25,
            direct_id_bonus: 50,
            weight_extension_bonus: 5,
            high_threshold: 100,
            medium_threshold: 50,
            tie_window: 10,
            max_alternates: 5,
        }
    }
}
