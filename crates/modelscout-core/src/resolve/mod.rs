//! Name-to-catalog resolution.
//!
//! Turns a bare model name into a concrete, downloadable catalog record
//! through a cascade of search strategies plus deterministic scoring.

pub mod mappings;
pub mod orchestrator;
pub mod scoring;
pub mod strategy;
#[cfg(test)]
pub(crate) mod testing;
pub mod types;

pub use mappings::{KnownMapping, KnownMappings};
pub use orchestrator::ResolutionOrchestrator;
pub use types::{
    ConfidenceTier, DiscoveredCandidate, ResolutionOutcome, ResolutionStatus, ScoredCandidate,
    StageTrace, StrategyKind, TargetSpec,
};
