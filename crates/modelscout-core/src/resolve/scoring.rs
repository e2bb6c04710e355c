//! Pure candidate scoring.
//!
//! No I/O, no clock, no randomness: the same target and candidate list
//! always produce the same ranked output. Weights come from
//! [`ScoringConfig`] so catalogs with different naming cultures can tune
//! them without touching this logic.

use super::types::{
    keywords, normalize_name, ConfidenceTier, DiscoveredCandidate, ScoredCandidate, TargetSpec,
};
use crate::catalog::has_weight_extension;
use crate::config::ScoringConfig;
use std::collections::HashSet;

/// Score and rank candidates for a target, best first.
///
/// Callers read element 0 as the leading candidate.
pub fn score(
    target: &TargetSpec,
    candidates: &[DiscoveredCandidate],
    config: &ScoringConfig,
) -> Vec<ScoredCandidate> {
    let target_norm = normalize_name(&target.raw_name);
    let target_keywords: HashSet<String> = keywords(&target.raw_name).into_iter().collect();

    let mut scored: Vec<ScoredCandidate> = candidates
        .iter()
        .map(|d| score_one(d, &target_norm, &target_keywords, config))
        .collect();

    // Descending score; ties broken by strategy specificity, then
    // popularity, then catalog id for a stable, deterministic order.
    scored.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| b.strategy.specificity().cmp(&a.strategy.specificity()))
            .then_with(|| b.candidate.download_count.cmp(&a.candidate.download_count))
            .then_with(|| a.candidate.catalog_id.cmp(&b.candidate.catalog_id))
    });

    scored
}

fn score_one(
    discovered: &DiscoveredCandidate,
    target_norm: &str,
    target_keywords: &HashSet<String>,
    config: &ScoringConfig,
) -> ScoredCandidate {
    let candidate = &discovered.candidate;
    let mut score = 0;
    let mut reasons = Vec::new();

    let display_norm = normalize_name(&candidate.display_name);
    let file_norm = normalize_name(&candidate.file_name);

    // Exact wins over substring; only one of the two applies.
    if display_norm == target_norm || file_norm == target_norm {
        score += config.exact_match_bonus;
        reasons.push("exact_name_match".to_string());
    } else if is_substring_match(&display_norm, target_norm)
        || is_substring_match(&file_norm, target_norm)
    {
        score += config.substring_bonus;
        reasons.push("substring_match".to_string());
    }

    let shared = shared_keyword_count(candidate, target_keywords);
    if shared > 0 {
        let bonus = (shared as i32 * config.keyword_bonus).min(config.exact_match_bonus);
        score += bonus;
        reasons.push(format!("shared_keywords:{}", shared));
    }

    if discovered.strategy.is_direct_id() {
        score += config.direct_id_bonus;
        reasons.push("direct_id_fetch".to_string());
    }

    if has_weight_extension(&candidate.file_name) {
        score += config.weight_extension_bonus;
        reasons.push("weight_extension".to_string());
    }

    let tier = if score >= config.high_threshold {
        ConfidenceTier::High
    } else if score >= config.medium_threshold {
        ConfidenceTier::Medium
    } else {
        ConfidenceTier::Low
    };

    ScoredCandidate {
        candidate: candidate.clone(),
        strategy: discovered.strategy,
        score,
        confidence_tier: tier,
        match_reasons: reasons,
    }
}

fn is_substring_match(candidate_norm: &str, target_norm: &str) -> bool {
    if candidate_norm.is_empty() || target_norm.is_empty() {
        return false;
    }
    candidate_norm.contains(target_norm) || target_norm.contains(candidate_norm)
}

fn shared_keyword_count(
    candidate: &crate::catalog::Candidate,
    target_keywords: &HashSet<String>,
) -> usize {
    let candidate_keywords: HashSet<String> = keywords(&candidate.display_name)
        .into_iter()
        .chain(keywords(&candidate.file_name))
        .collect();
    candidate_keywords
        .iter()
        .filter(|k| target_keywords.contains(*k))
        .count()
}
