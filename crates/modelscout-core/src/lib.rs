//! modelscout: resolve named model binaries against remote catalogs and
//! download them with verification and crash-safe resume.
//!
//! The crate is split along the two halves of that job:
//!
//! - [`resolve`] turns a bare model name into a concrete catalog record
//!   through a cascade of search strategies and deterministic scoring.
//! - [`download`] transfers the chosen record to disk with resumable
//!   partials, digest verification, and an atomic final rename.
//!
//! Both halves share the [`store`] layer, a namespaced TTL store that
//! holds cached decisions, per-stage query results, and download job
//! records.
//!
//! ```no_run
//! use modelscout_core::catalog::{CivitaiClient, CatalogClient, TypeHint};
//! use modelscout_core::download::DownloadEngine;
//! use modelscout_core::resolve::{KnownMappings, ResolutionOrchestrator, TargetSpec};
//! use modelscout_core::store::{SqliteStore, StateStore};
//! use modelscout_core::CancellationToken;
//! use std::sync::Arc;
//!
//! # async fn demo() -> modelscout_core::Result<()> {
//! let store = StateStore::new(Arc::new(SqliteStore::new("scout.db")?));
//! let catalogs: Vec<Arc<dyn CatalogClient>> = vec![Arc::new(CivitaiClient::new()?)];
//! let orchestrator =
//!     ResolutionOrchestrator::new(catalogs, KnownMappings::empty(), store.clone());
//!
//! let target = TargetSpec::new("epicRealism", TypeHint::Checkpoint);
//! let resolution = orchestrator.resolve(&target).await?;
//!
//! let engine = DownloadEngine::new(store)?;
//! let outcome = engine
//!     .submit(&resolution, "models/epicrealism.safetensors", &CancellationToken::new())
//!     .await?;
//! println!("downloaded: {} verified: {}", outcome.success, outcome.verified);
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod catalog;
pub mod config;
pub mod download;
pub mod error;
pub mod resolve;
pub mod store;

pub use cancel::CancellationToken;
pub use error::{Result, ScoutError};
