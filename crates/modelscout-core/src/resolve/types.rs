//! Resolution data model and name normalization.

use crate::catalog::{Candidate, TypeHint};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What the caller wants resolved. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSpec {
    pub raw_name: String,
    pub type_hint: TypeHint,
    /// Free-form caller context; recognized keys: `creator`.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl TargetSpec {
    pub fn new(raw_name: impl Into<String>, type_hint: TypeHint) -> Self {
        Self {
            raw_name: raw_name.into(),
            type_hint,
            context: HashMap::new(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Store key for the cached resolution decision.
    pub fn decision_key(&self) -> String {
        format!("{}::{}", normalize_name(&self.raw_name), self.type_hint)
    }
}

/// Which cascade stage discovered a candidate.
///
/// Ordering doubles as the tie-break: a more specific strategy beats a
/// noisier one at equal score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    KnownMapping,
    PrimaryQuery,
    SortedQuery,
    TagSearch,
    CreatorSearch,
    KeywordSearch,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::KnownMapping => "known_mapping",
            StrategyKind::PrimaryQuery => "primary_query",
            StrategyKind::SortedQuery => "sorted_query",
            StrategyKind::TagSearch => "tag_search",
            StrategyKind::CreatorSearch => "creator_search",
            StrategyKind::KeywordSearch => "keyword_search",
        }
    }

    /// Higher wins ties; direct-ID lookups are pre-vetted, keyword
    /// decomposition is the noisiest.
    pub fn specificity(&self) -> u8 {
        match self {
            StrategyKind::KnownMapping => 6,
            StrategyKind::PrimaryQuery => 5,
            StrategyKind::SortedQuery => 4,
            StrategyKind::TagSearch => 3,
            StrategyKind::CreatorSearch => 2,
            StrategyKind::KeywordSearch => 1,
        }
    }

    /// Whether this strategy fetched the record directly by id rather
    /// than through a free-text index.
    pub fn is_direct_id(&self) -> bool {
        matches!(self, StrategyKind::KnownMapping)
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A candidate plus the strategy that found it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredCandidate {
    pub candidate: Candidate,
    pub strategy: StrategyKind,
}

/// Coarse confidence bucket derived from the numeric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

/// A scored candidate, recomputed per resolution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub strategy: StrategyKind,
    pub score: i32,
    pub confidence_tier: ConfidenceTier,
    pub match_reasons: Vec<String>,
}

/// Terminal resolution status. Closed enumeration so downstream code
/// cannot mishandle an unrecognized status string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionStatus {
    Found,
    Uncertain,
    NotFound,
    Error,
}

/// Per-stage audit record. Cascade behavior must be independently
/// verifiable from this trail, not reconstructed from logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTrace {
    pub stage: String,
    pub candidates: usize,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The result of resolving one target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionOutcome {
    pub target: TargetSpec,
    pub status: ResolutionStatus,
    pub chosen: Option<ScoredCandidate>,
    pub alternates: Vec<ScoredCandidate>,
    pub strategy_trail: Vec<StageTrace>,
    pub resolved_at: DateTime<Utc>,
}

/// Connective and version words ignored during keyword extraction.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "this", "that", "ver", "version", "new", "final",
    "model", "pruned", "full",
];

/// Normalize a model name for comparison: lowercase, weight extension
/// stripped, separator runs collapsed to single spaces.
pub fn normalize_name(name: &str) -> String {
    let mut lower = name.to_lowercase();
    for ext in crate::catalog::WEIGHT_EXTENSIONS {
        if let Some(stripped) = lower.strip_suffix(ext) {
            lower = stripped.to_string();
            break;
        }
    }
    lower
        .split(|c: char| c.is_whitespace() || c == '_' || c == '-' || c == '.')
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Significant keyword tokens of a name: longer than two characters,
/// not connective words, not bare version markers like `v3` or `1.5`.
pub fn keywords(name: &str) -> Vec<String> {
    normalize_name(name)
        .split(' ')
        .filter(|t| t.len() > 2)
        .filter(|t| !STOP_WORDS.contains(t))
        .filter(|t| !is_version_token(t))
        .map(str::to_string)
        .collect()
}

fn is_version_token(token: &str) -> bool {
    let digits = token.strip_prefix('v').unwrap_or(token);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(
            normalize_name("Better_Detailed-Example  v3.safetensors"),
            "better detailed example v3"
        );
        assert_eq!(normalize_name("epicRealism.ckpt"), "epicrealism");
    }

    #[test]
    fn test_keywords_filter_stop_and_version_words() {
        let kw = keywords("Better Detailed Example v3 for the win");
        assert_eq!(kw, vec!["better", "detailed", "example", "win"]);
    }

    #[test]
    fn test_decision_key_normalizes() {
        let a = TargetSpec::new("My_Model.safetensors", TypeHint::Lora);
        let b = TargetSpec::new("my model", TypeHint::Lora);
        assert_eq!(a.decision_key(), b.decision_key());

        let c = TargetSpec::new("my model", TypeHint::Vae);
        assert_ne!(a.decision_key(), c.decision_key());
    }

    #[test]
    fn test_specificity_ordering_matches_cascade() {
        assert!(StrategyKind::KnownMapping.specificity() > StrategyKind::PrimaryQuery.specificity());
        assert!(StrategyKind::TagSearch.specificity() > StrategyKind::CreatorSearch.specificity());
        assert!(StrategyKind::CreatorSearch.specificity() > StrategyKind::KeywordSearch.specificity());
        assert!(StrategyKind::KnownMapping.is_direct_id());
        assert!(!StrategyKind::PrimaryQuery.is_direct_id());
    }
}
