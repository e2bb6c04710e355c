//! Cascade orchestration: run stages in order, score the pool, decide.
//!
//! The orchestrator owns the control flow only. Discovery belongs to the
//! strategies, ranking to the scoring module, persistence to the store.
//! Every attempt leaves a stage trail in the outcome so cascade behavior
//! can be audited from the record itself.

use super::mappings::KnownMappings;
use super::scoring;
use super::strategy::{build_cascade, SearchStrategy};
use super::types::{
    normalize_name, ConfidenceTier, DiscoveredCandidate, ResolutionOutcome, ResolutionStatus,
    ScoredCandidate, StageTrace, TargetSpec,
};
use crate::catalog::{Candidate, CatalogClient};
use crate::config::{CacheTtlConfig, NetworkConfig, ScoringConfig};
use crate::error::Result;
use crate::store::{StateStore, NS_RESOLUTIONS, NS_STAGE_CACHE};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Drives the resolution cascade for one or more targets.
pub struct ResolutionOrchestrator {
    strategies: Vec<Box<dyn SearchStrategy>>,
    store: StateStore,
    scoring: ScoringConfig,
}

impl ResolutionOrchestrator {
    pub fn new(
        catalogs: Vec<Arc<dyn CatalogClient>>,
        mappings: KnownMappings,
        store: StateStore,
    ) -> Self {
        Self {
            strategies: build_cascade(catalogs, mappings),
            store,
            scoring: ScoringConfig::default(),
        }
    }

    /// Override the default scoring weights.
    pub fn with_scoring(mut self, scoring: ScoringConfig) -> Self {
        self.scoring = scoring;
        self
    }

    /// Resolve one target, consulting the decision cache first.
    ///
    /// `Err` means infrastructure trouble (store failures); catalog
    /// trouble is reported in-band as a status on the outcome.
    pub async fn resolve(&self, target: &TargetSpec) -> Result<ResolutionOutcome> {
        let decision_key = target.decision_key();
        if let Some(cached) = self
            .store
            .get_json::<ResolutionOutcome>(NS_RESOLUTIONS, &decision_key)?
        {
            debug!("Decision cache hit for '{}'", target.raw_name);
            return Ok(cached);
        }

        let mut pool: Vec<DiscoveredCandidate> = Vec::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut trail: Vec<StageTrace> = Vec::new();
        let mut stage_errored = false;

        for strategy in &self.strategies {
            let stage = strategy.kind();
            let started = Instant::now();

            let result = match self.cached_stage(stage.as_str(), target)? {
                Some(candidates) => {
                    debug!("Stage cache hit: {} for '{}'", stage, target.raw_name);
                    Ok(candidates)
                }
                None => {
                    let attempt = strategy.attempt(target).await;
                    if let Ok(candidates) = &attempt {
                        self.cache_stage(stage.as_str(), target, candidates)?;
                    }
                    attempt
                }
            };

            let elapsed_ms = started.elapsed().as_millis() as u64;
            match result {
                Ok(candidates) => {
                    trail.push(StageTrace {
                        stage: stage.as_str().to_string(),
                        candidates: candidates.len(),
                        elapsed_ms,
                        error: None,
                    });
                    // First discovery wins: a record found again by a
                    // noisier stage keeps its original attribution.
                    for candidate in candidates {
                        let id = (candidate.catalog_source.clone(), candidate.catalog_id.clone());
                        if seen.insert(id) {
                            pool.push(DiscoveredCandidate {
                                candidate,
                                strategy: stage,
                            });
                        }
                    }
                }
                Err(e) => {
                    warn!("Stage {} failed for '{}': {}", stage, target.raw_name, e);
                    stage_errored = true;
                    trail.push(StageTrace {
                        stage: stage.as_str().to_string(),
                        candidates: 0,
                        elapsed_ms,
                        error: Some(e.to_string()),
                    });
                }
            }

            // A high-confidence leader ends the cascade early; later
            // stages only add noise below it.
            let ranked = scoring::score(target, &pool, &self.scoring);
            if ranked
                .first()
                .is_some_and(|best| best.confidence_tier == ConfidenceTier::High)
            {
                debug!("Cascade stopped after {} for '{}'", stage, target.raw_name);
                break;
            }
        }

        let ranked = scoring::score(target, &pool, &self.scoring);
        let outcome = self.decide(target, ranked, trail, stage_errored);

        // Error outcomes stay uncached so a transient catalog outage
        // does not poison hours of lookups.
        if outcome.status != ResolutionStatus::Error {
            self.store.put_json(
                NS_RESOLUTIONS,
                &decision_key,
                &outcome,
                CacheTtlConfig::DECISION_TTL,
            )?;
        }

        info!(
            "Resolved '{}': {:?} ({} candidates across {} stages)",
            target.raw_name,
            outcome.status,
            pool.len(),
            outcome.strategy_trail.len()
        );
        Ok(outcome)
    }

    /// Resolve many targets concurrently, bounded by a fixed ceiling.
    pub async fn resolve_many(&self, targets: &[TargetSpec]) -> Vec<Result<ResolutionOutcome>> {
        let semaphore = Arc::new(Semaphore::new(NetworkConfig::MAX_CONCURRENT_RESOLUTIONS));
        let futures = targets.iter().map(|target| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                // Semaphore lives for the whole call; acquire cannot fail.
                let _permit = semaphore.acquire().await.map_err(|e| {
                    crate::error::ScoutError::Other(format!("Semaphore closed: {}", e))
                })?;
                self.resolve(target).await
            }
        });
        futures::future::join_all(futures).await
    }

    /// Turn the ranked pool into a terminal status.
    fn decide(
        &self,
        target: &TargetSpec,
        ranked: Vec<ScoredCandidate>,
        trail: Vec<StageTrace>,
        stage_errored: bool,
    ) -> ResolutionOutcome {
        let (status, chosen, alternates) = match ranked.first() {
            None if stage_errored => (ResolutionStatus::Error, None, vec![]),
            None => (ResolutionStatus::NotFound, None, vec![]),
            Some(best) => {
                let ambiguous = ranked
                    .get(1)
                    .is_some_and(|second| best.score - second.score <= self.scoring.tie_window);

                if best.confidence_tier == ConfidenceTier::High && !ambiguous {
                    let alternates: Vec<ScoredCandidate> = ranked
                        .iter()
                        .skip(1)
                        .take(self.scoring.max_alternates)
                        .cloned()
                        .collect();
                    (ResolutionStatus::Found, Some(best.clone()), alternates)
                } else {
                    // Ambiguous or weak leader: surface the options and
                    // let the caller pick rather than guessing for them.
                    let alternates: Vec<ScoredCandidate> = ranked
                        .iter()
                        .take(self.scoring.max_alternates)
                        .cloned()
                        .collect();
                    (ResolutionStatus::Uncertain, None, alternates)
                }
            }
        };

        ResolutionOutcome {
            target: target.clone(),
            status,
            chosen,
            alternates,
            strategy_trail: trail,
            resolved_at: Utc::now(),
        }
    }

    /// Stage cache key: stage name plus a fingerprint of the query
    /// parameters, so two targets that normalize identically share a slot.
    fn stage_key(stage: &str, target: &TargetSpec) -> String {
        let params = serde_json::json!({
            "name": normalize_name(&target.raw_name),
            "hint": target.type_hint.as_str(),
            "creator": target.context.get("creator"),
        });
        let digest = Sha256::digest(params.to_string().as_bytes());
        format!("{}:{}", stage, hex::encode(digest))
    }

    fn cached_stage(&self, stage: &str, target: &TargetSpec) -> Result<Option<Vec<Candidate>>> {
        self.store
            .get_json(NS_STAGE_CACHE, &Self::stage_key(stage, target))
    }

    fn cache_stage(&self, stage: &str, target: &TargetSpec, candidates: &[Candidate]) -> Result<()> {
        self.store.put_json(
            NS_STAGE_CACHE,
            &Self::stage_key(stage, target),
            &candidates.to_vec(),
            CacheTtlConfig::STAGE_TTL,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TypeHint;
    use crate::resolve::testing::MockCatalog;
    use crate::store::SqliteStore;

    fn make_store() -> StateStore {
        StateStore::new(Arc::new(SqliteStore::in_memory().unwrap()))
    }

    fn target(name: &str) -> TargetSpec {
        TargetSpec::new(name, TypeHint::Checkpoint)
    }

    fn orchestrator(catalog: Arc<MockCatalog>, store: StateStore) -> ResolutionOrchestrator {
        ResolutionOrchestrator::new(
            vec![catalog as Arc<dyn CatalogClient>],
            KnownMappings::empty(),
            store,
        )
    }

    #[tokio::test]
    async fn test_exact_hit_found_and_cascade_stops() {
        let catalog = Arc::new(
            MockCatalog::new("civitai")
                .with_text_hit("epicrealism", MockCatalog::candidate("7", "epicRealism")),
        );
        let orch = orchestrator(catalog.clone(), make_store());

        let outcome = orch.resolve(&target("epicRealism")).await.unwrap();
        assert_eq!(outcome.status, ResolutionStatus::Found);
        assert_eq!(outcome.chosen.as_ref().unwrap().candidate.catalog_id, "7");

        // Known-mapping miss plus one primary stage; nothing deeper ran.
        assert_eq!(outcome.strategy_trail.len(), 2);
        assert_eq!(outcome.strategy_trail[1].stage, "primary_query");
        assert_eq!(catalog.tag_queries(), 0);
        assert_eq!(catalog.creator_queries(), 0);
    }

    #[tokio::test]
    async fn test_known_mapping_resolves_in_one_stage() {
        let catalog = Arc::new(MockCatalog::new("civitai").with_record(
            "1091495",
            MockCatalog::candidate("1091495", "Better Detailed Example v3"),
        ));
        let mappings = KnownMappings::from_entries([(
            "Better Detailed Example v3".to_string(),
            crate::resolve::KnownMapping {
                catalog_source: "civitai".to_string(),
                catalog_id: "1091495".to_string(),
                type_hint: TypeHint::Checkpoint,
                notes: None,
            },
        )]);
        let orch = ResolutionOrchestrator::new(
            vec![catalog.clone() as Arc<dyn CatalogClient>],
            mappings,
            make_store(),
        );

        let outcome = orch
            .resolve(&target("Better Detailed Example v3"))
            .await
            .unwrap();
        assert_eq!(outcome.status, ResolutionStatus::Found);
        let chosen = outcome.chosen.unwrap();
        assert_eq!(chosen.candidate.catalog_id, "1091495");
        assert_eq!(chosen.strategy, crate::resolve::StrategyKind::KnownMapping);

        // One direct fetch decided it; the free-text index never ran.
        assert_eq!(outcome.strategy_trail.len(), 1);
        assert_eq!(catalog.id_fetches(), 1);
        assert_eq!(catalog.text_queries(), 0);
    }

    #[tokio::test]
    async fn test_tag_stage_supplies_hit_when_text_queries_miss() {
        let catalog = Arc::new(
            MockCatalog::new("civitai")
                .with_tag_hit("anime", MockCatalog::candidate("42", "anime portrait master")),
        );
        let orch = orchestrator(catalog.clone(), make_store());

        let outcome = orch
            .resolve(&target("anime portrait master"))
            .await
            .unwrap();
        assert_eq!(outcome.status, ResolutionStatus::Found);
        let chosen = outcome.chosen.unwrap();
        assert_eq!(chosen.candidate.catalog_id, "42");
        assert_eq!(chosen.strategy, crate::resolve::StrategyKind::TagSearch);

        // The first three stages came back empty; the trail shows the
        // tag stage deciding it and the cascade stopping there.
        assert_eq!(outcome.strategy_trail.len(), 4);
        assert_eq!(outcome.strategy_trail[3].stage, "tag_search");
        assert!(outcome.strategy_trail[..3]
            .iter()
            .all(|stage| stage.candidates == 0));
        assert!(catalog.tag_queries() > 0);
        assert_eq!(catalog.creator_queries(), 0);
    }

    #[tokio::test]
    async fn test_creator_stage_uses_caller_context() {
        let catalog = Arc::new(
            MockCatalog::new("civitai")
                .with_creator_hit("greatmixer", MockCatalog::candidate("77", "obscure custom mix")),
        );
        let orch = orchestrator(catalog.clone(), make_store());

        let t = target("obscure custom mix").with_context("creator", "greatmixer");
        let outcome = orch.resolve(&t).await.unwrap();

        assert_eq!(outcome.status, ResolutionStatus::Found);
        let chosen = outcome.chosen.unwrap();
        assert_eq!(chosen.candidate.catalog_id, "77");
        assert_eq!(
            chosen.strategy,
            crate::resolve::StrategyKind::CreatorSearch
        );
        assert_eq!(outcome.strategy_trail.len(), 5);
        assert_eq!(outcome.strategy_trail[4].stage, "creator_search");
        assert_eq!(catalog.creator_queries(), 1);
    }

    #[tokio::test]
    async fn test_decision_cache_skips_network_on_second_call() {
        let catalog = Arc::new(
            MockCatalog::new("civitai")
                .with_text_hit("epicrealism", MockCatalog::candidate("7", "epicRealism")),
        );
        let orch = orchestrator(catalog.clone(), make_store());

        orch.resolve(&target("epicRealism")).await.unwrap();
        let queries_after_first = catalog.text_queries();

        let second = orch.resolve(&target("epicRealism")).await.unwrap();
        assert_eq!(second.status, ResolutionStatus::Found);
        assert_eq!(catalog.text_queries(), queries_after_first);
    }

    #[tokio::test]
    async fn test_no_candidates_is_not_found() {
        let catalog = Arc::new(MockCatalog::new("civitai"));
        let orch = orchestrator(catalog, make_store());

        let outcome = orch.resolve(&target("does not exist anywhere")).await.unwrap();
        assert_eq!(outcome.status, ResolutionStatus::NotFound);
        assert!(outcome.chosen.is_none());
        assert!(outcome.alternates.is_empty());
        // All six stages were attempted before giving up.
        assert_eq!(outcome.strategy_trail.len(), 6);
    }

    #[tokio::test]
    async fn test_all_stages_failing_is_error_and_uncached() {
        let catalog = Arc::new(MockCatalog::failing("civitai"));
        let store = make_store();
        let orch = orchestrator(catalog.clone(), store.clone());

        let outcome = orch.resolve(&target("anything valid")).await.unwrap();
        assert_eq!(outcome.status, ResolutionStatus::Error);
        assert!(outcome
            .strategy_trail
            .iter()
            .any(|stage| stage.error.is_some()));

        // Error decisions are not cached; a retry goes back out.
        let queries_after_first = catalog.text_queries();
        orch.resolve(&target("anything valid")).await.unwrap();
        assert!(catalog.text_queries() > queries_after_first);
    }

    #[tokio::test]
    async fn test_tie_within_window_is_uncertain() {
        let catalog = Arc::new(
            MockCatalog::new("civitai")
                .with_text_hit("dreamshaper", MockCatalog::candidate("1", "DreamShaper"))
                .with_text_hit("dreamshaper", MockCatalog::candidate("2", "DreamShaper")),
        );
        let orch = orchestrator(catalog, make_store());

        let outcome = orch.resolve(&target("DreamShaper")).await.unwrap();
        assert_eq!(outcome.status, ResolutionStatus::Uncertain);
        assert!(outcome.chosen.is_none());
        assert_eq!(outcome.alternates.len(), 2);
    }

    #[tokio::test]
    async fn test_weak_leader_is_uncertain() {
        // Substring-only match: medium tier, no exact hit anywhere.
        let catalog = Arc::new(MockCatalog::new("civitai").with_text_hit(
            "dream",
            MockCatalog::candidate("9", "dream weaver extended edition"),
        ));
        let orch = orchestrator(catalog, make_store());

        let outcome = orch.resolve(&target("dream")).await.unwrap();
        assert_eq!(outcome.status, ResolutionStatus::Uncertain);
        assert_eq!(outcome.alternates.len(), 1);
    }

    #[tokio::test]
    async fn test_stage_cache_reused_after_decision_invalidation() {
        let catalog = Arc::new(MockCatalog::new("civitai"));
        let store = make_store();
        let orch = orchestrator(catalog.clone(), store.clone());
        let t = target("nothing here");

        let first = orch.resolve(&t).await.unwrap();
        assert_eq!(first.status, ResolutionStatus::NotFound);
        let queries_after_first = catalog.text_queries();

        // Drop the decision but keep the stage cache: the re-decision
        // should replay cached stage results instead of re-querying.
        store
            .invalidate(NS_RESOLUTIONS, &t.decision_key())
            .unwrap();
        let second = orch.resolve(&t).await.unwrap();
        assert_eq!(second.status, ResolutionStatus::NotFound);
        assert_eq!(catalog.text_queries(), queries_after_first);
    }

    #[tokio::test]
    async fn test_resolve_many_preserves_order() {
        let catalog = Arc::new(
            MockCatalog::new("civitai")
                .with_text_hit("alpha model", MockCatalog::candidate("1", "alpha model")),
        );
        let orch = orchestrator(catalog, make_store());

        let targets = vec![target("alpha model"), target("missing thing entirely")];
        let outcomes = orch.resolve_many(&targets).await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(
            outcomes[0].as_ref().unwrap().status,
            ResolutionStatus::Found
        );
        assert_eq!(
            outcomes[1].as_ref().unwrap().status,
            ResolutionStatus::NotFound
        );
    }
}
