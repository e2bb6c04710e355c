//! Cascade search strategies.
//!
//! Each stage implements one common interface and is iterated by the
//! orchestrator in a fixed order, most specific first. Replacing the
//! old-style nested fallback conditionals with strategy objects keeps
//! every stage independently testable.

use super::mappings::KnownMappings;
use super::types::{keywords, StrategyKind, TargetSpec};
use crate::catalog::{Candidate, CatalogClient, SearchFilters, SortOrder};
use crate::config::CascadeConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// One stage of the resolution cascade.
#[async_trait]
pub trait SearchStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Query the catalogs for this target. An error means the whole
    /// stage produced nothing usable; partial catalog failures inside a
    /// stage are tolerated as long as any catalog answered.
    async fn attempt(&self, target: &TargetSpec) -> Result<Vec<Candidate>>;
}

type Catalogs = Vec<Arc<dyn CatalogClient>>;

/// Build the full cascade in execution order.
pub fn build_cascade(catalogs: Catalogs, mappings: KnownMappings) -> Vec<Box<dyn SearchStrategy>> {
    vec![
        Box::new(KnownMappingStrategy {
            catalogs: catalogs.clone(),
            mappings,
        }),
        Box::new(PrimaryQueryStrategy {
            catalogs: catalogs.clone(),
        }),
        Box::new(SortedQueryStrategy {
            catalogs: catalogs.clone(),
        }),
        Box::new(TagSearchStrategy {
            catalogs: catalogs.clone(),
        }),
        Box::new(CreatorSearchStrategy {
            catalogs: catalogs.clone(),
        }),
        Box::new(KeywordSearchStrategy { catalogs }),
    ]
}

/// Deduplicate candidates by `(catalog_source, catalog_id)`, first
/// occurrence wins.
fn dedup(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert((c.catalog_source.clone(), c.catalog_id.clone())))
        .collect()
}

/// Merge per-catalog query results, tolerating partial failures.
///
/// Returns the first error only when every query failed and nothing was
/// collected.
fn merge_results(
    stage: StrategyKind,
    results: Vec<Result<Vec<Candidate>>>,
) -> Result<Vec<Candidate>> {
    let mut merged = Vec::new();
    let mut first_error = None;
    let attempted = results.len();

    for result in results {
        match result {
            Ok(candidates) => merged.extend(candidates),
            Err(e) => {
                warn!("{} query failed: {}", stage, e);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    if merged.is_empty() {
        if let Some(e) = first_error {
            if attempted > 0 {
                return Err(e);
            }
        }
    }

    Ok(dedup(merged))
}

/// Stage 1: curated name-to-id table, fetched directly by id.
///
/// This path sidesteps whatever filtering the remote free-text index
/// applies, so it can reach a confident result in one round trip.
pub struct KnownMappingStrategy {
    catalogs: Catalogs,
    mappings: KnownMappings,
}

#[async_trait]
impl SearchStrategy for KnownMappingStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::KnownMapping
    }

    async fn attempt(&self, target: &TargetSpec) -> Result<Vec<Candidate>> {
        let Some(mapping) = self.mappings.lookup(&target.raw_name) else {
            return Ok(vec![]);
        };

        let Some(catalog) = self
            .catalogs
            .iter()
            .find(|c| c.source() == mapping.catalog_source)
        else {
            warn!(
                "Known mapping for '{}' points at unconfigured catalog '{}'",
                target.raw_name, mapping.catalog_source
            );
            return Ok(vec![]);
        };

        debug!(
            "Known mapping hit: '{}' -> {}:{}",
            target.raw_name, mapping.catalog_source, mapping.catalog_id
        );

        match catalog.fetch_by_id(&mapping.catalog_id).await? {
            Some(candidate) => Ok(vec![candidate]),
            None => Ok(vec![]),
        }
    }
}

/// Stage 2: free-text query with the raw name, attempted both with and
/// without the content-visibility toggle and merged. Some catalogs
/// under-return when the flag is set one way, so both answers count.
pub struct PrimaryQueryStrategy {
    catalogs: Catalogs,
}

#[async_trait]
impl SearchStrategy for PrimaryQueryStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::PrimaryQuery
    }

    async fn attempt(&self, target: &TargetSpec) -> Result<Vec<Candidate>> {
        let mut results = Vec::new();
        for catalog in &self.catalogs {
            for sensitive in [None, Some(true)] {
                let filters = SearchFilters {
                    type_hint: Some(target.type_hint),
                    include_sensitive: sensitive,
                    sort: SortOrder::Relevance,
                    limit: CascadeConfig::PRIMARY_QUERY_LIMIT,
                };
                results.push(catalog.query_by_text(&target.raw_name, &filters).await);
            }
        }
        merge_results(self.kind(), results)
    }
}

/// Stage 3: the same query under a popularity ordering, with a lower
/// result budget. Surfaces records the default ordering suppresses.
pub struct SortedQueryStrategy {
    catalogs: Catalogs,
}

#[async_trait]
impl SearchStrategy for SortedQueryStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::SortedQuery
    }

    async fn attempt(&self, target: &TargetSpec) -> Result<Vec<Candidate>> {
        let mut results = Vec::new();
        for catalog in &self.catalogs {
            let filters = SearchFilters {
                type_hint: Some(target.type_hint),
                include_sensitive: Some(true),
                sort: SortOrder::MostDownloaded,
                limit: CascadeConfig::SORTED_QUERY_LIMIT,
            };
            results.push(catalog.query_by_text(&target.raw_name, &filters).await);
        }
        merge_results(self.kind(), results)
    }
}

/// Domain vocabulary promoted to tags ahead of leftover keywords.
const DOMAIN_TAGS: &[&str] = &[
    "anime", "realistic", "photorealistic", "style", "detail", "portrait", "landscape",
    "character", "concept",
];

/// Derive search tags from a target name: recognized domain vocabulary
/// first, then remaining significant keywords, bounded.
pub fn derive_tags(raw_name: &str) -> Vec<String> {
    let kws = keywords(raw_name);
    let mut tags: Vec<String> = kws
        .iter()
        .filter(|k| DOMAIN_TAGS.contains(&k.as_str()))
        .cloned()
        .collect();
    for kw in &kws {
        if !tags.contains(kw) {
            tags.push(kw.clone());
        }
    }
    tags.truncate(CascadeConfig::MAX_TAGS);
    tags
}

/// Stage 4: tag queries derived from the target name, request count
/// bounded by the tag cap.
pub struct TagSearchStrategy {
    catalogs: Catalogs,
}

#[async_trait]
impl SearchStrategy for TagSearchStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::TagSearch
    }

    async fn attempt(&self, target: &TargetSpec) -> Result<Vec<Candidate>> {
        let tags = derive_tags(&target.raw_name);
        if tags.is_empty() {
            return Ok(vec![]);
        }

        let mut results = Vec::new();
        for catalog in &self.catalogs {
            for tag in &tags {
                let filters = SearchFilters {
                    type_hint: Some(target.type_hint),
                    include_sensitive: Some(true),
                    sort: SortOrder::Relevance,
                    limit: CascadeConfig::PER_TAG_LIMIT,
                };
                results.push(catalog.query_by_tag(tag, &filters).await);
            }
        }
        merge_results(self.kind(), results)
    }
}

/// Stage 5: creator-scoped search. Only runs when the caller's context
/// names a creator identity.
pub struct CreatorSearchStrategy {
    catalogs: Catalogs,
}

#[async_trait]
impl SearchStrategy for CreatorSearchStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::CreatorSearch
    }

    async fn attempt(&self, target: &TargetSpec) -> Result<Vec<Candidate>> {
        let Some(creator) = target.context.get("creator") else {
            return Ok(vec![]);
        };

        let mut results = Vec::new();
        for catalog in &self.catalogs {
            let filters = SearchFilters {
                type_hint: Some(target.type_hint),
                include_sensitive: Some(true),
                sort: SortOrder::Relevance,
                limit: CascadeConfig::CREATOR_QUERY_LIMIT,
            };
            results.push(catalog.query_by_creator(creator, &filters).await);
        }
        merge_results(self.kind(), results)
    }
}

/// Stage 6: per-word queries merged into one pool. Full-phrase search
/// silently drops results for queries containing certain blocked terms;
/// single-word queries against the same index often still succeed.
pub struct KeywordSearchStrategy {
    catalogs: Catalogs,
}

#[async_trait]
impl SearchStrategy for KeywordSearchStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::KeywordSearch
    }

    async fn attempt(&self, target: &TargetSpec) -> Result<Vec<Candidate>> {
        let mut words = keywords(&target.raw_name);
        words.truncate(CascadeConfig::MAX_KEYWORDS);
        if words.is_empty() {
            return Ok(vec![]);
        }

        let mut results = Vec::new();
        for catalog in &self.catalogs {
            for word in &words {
                let filters = SearchFilters {
                    type_hint: Some(target.type_hint),
                    include_sensitive: Some(true),
                    sort: SortOrder::Relevance,
                    limit: CascadeConfig::PER_KEYWORD_LIMIT,
                };
                results.push(catalog.query_by_text(word, &filters).await);
            }
        }
        merge_results(self.kind(), results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TypeHint;
    use crate::error::ScoutError;
    use crate::resolve::mappings::KnownMapping;
    use crate::resolve::testing::MockCatalog;

    fn target(name: &str) -> TargetSpec {
        TargetSpec::new(name, TypeHint::Checkpoint)
    }

    #[test]
    fn test_derive_tags_prefers_domain_vocabulary() {
        let tags = derive_tags("Hyper Realistic Portrait Helper v2");
        assert_eq!(tags.len(), CascadeConfig::MAX_TAGS);
        assert_eq!(tags[0], "realistic");
        assert_eq!(tags[1], "portrait");
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let a = MockCatalog::candidate("1", "one");
        let mut dup = MockCatalog::candidate("1", "one again");
        dup.catalog_source = a.catalog_source.clone();
        let b = MockCatalog::candidate("2", "two");

        let out = dedup(vec![a.clone(), dup, b]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].display_name, "one");
    }

    #[test]
    fn test_merge_results_partial_failure_is_tolerated() {
        let ok = vec![MockCatalog::candidate("1", "one")];
        let merged = merge_results(
            StrategyKind::PrimaryQuery,
            vec![
                Ok(ok),
                Err(ScoutError::Http {
                    status: 500,
                    url: "http://x".into(),
                }),
            ],
        )
        .unwrap();
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn test_merge_results_total_failure_is_error() {
        let result = merge_results(
            StrategyKind::PrimaryQuery,
            vec![Err(ScoutError::Http {
                status: 500,
                url: "http://x".into(),
            })],
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_known_mapping_strategy_fetches_by_id() {
        let catalog = Arc::new(MockCatalog::new("civitai").with_record(
            "1091495",
            MockCatalog::candidate("1091495", "Better Detailed Example v3"),
        ));
        let mappings = KnownMappings::from_entries([(
            "Better Detailed Example v3".to_string(),
            KnownMapping {
                catalog_source: "civitai".to_string(),
                catalog_id: "1091495".to_string(),
                type_hint: TypeHint::Checkpoint,
                notes: None,
            },
        )]);

        let strategy = KnownMappingStrategy {
            catalogs: vec![catalog.clone() as Arc<dyn CatalogClient>],
            mappings,
        };

        let hits = strategy
            .attempt(&target("Better Detailed Example v3"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].catalog_id, "1091495");
        // Direct fetch, not routed through the free-text index
        assert_eq!(catalog.text_queries(), 0);
    }

    #[tokio::test]
    async fn test_known_mapping_miss_is_empty_not_error() {
        let strategy = KnownMappingStrategy {
            catalogs: vec![Arc::new(MockCatalog::new("civitai")) as Arc<dyn CatalogClient>],
            mappings: KnownMappings::empty(),
        };
        let hits = strategy.attempt(&target("unknown")).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_creator_strategy_skips_without_context() {
        let catalog = Arc::new(MockCatalog::new("civitai"));
        let strategy = CreatorSearchStrategy {
            catalogs: vec![catalog.clone() as Arc<dyn CatalogClient>],
        };
        let hits = strategy.attempt(&target("anything")).await.unwrap();
        assert!(hits.is_empty());
        assert_eq!(catalog.creator_queries(), 0);
    }

    #[tokio::test]
    async fn test_primary_query_merges_sensitive_toggle_variants() {
        let catalog = Arc::new(
            MockCatalog::new("civitai")
                .with_text_hit("epicrealism", MockCatalog::candidate("7", "epicRealism")),
        );
        let strategy = PrimaryQueryStrategy {
            catalogs: vec![catalog.clone() as Arc<dyn CatalogClient>],
        };

        let hits = strategy.attempt(&target("epicrealism")).await.unwrap();
        // Two variant queries, one deduped hit
        assert_eq!(catalog.text_queries(), 2);
        assert_eq!(hits.len(), 1);
    }
}
