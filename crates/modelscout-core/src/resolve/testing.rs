//! In-memory catalog double for cascade and orchestrator tests.

use crate::catalog::{Candidate, CatalogClient, SearchFilters};
use crate::error::{Result, ScoutError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Scripted catalog: canned answers keyed by lowercased query text, plus
/// per-method call counters so tests can assert which stages actually
/// reached the network.
pub struct MockCatalog {
    source: &'static str,
    records: HashMap<String, Candidate>,
    text_hits: HashMap<String, Vec<Candidate>>,
    tag_hits: HashMap<String, Vec<Candidate>>,
    creator_hits: HashMap<String, Vec<Candidate>>,
    fail_all: bool,
    text_queries: AtomicUsize,
    tag_queries: AtomicUsize,
    creator_queries: AtomicUsize,
    id_fetches: AtomicUsize,
}

impl MockCatalog {
    pub fn new(source: &'static str) -> Self {
        Self {
            source,
            records: HashMap::new(),
            text_hits: HashMap::new(),
            tag_hits: HashMap::new(),
            creator_hits: HashMap::new(),
            fail_all: false,
            text_queries: AtomicUsize::new(0),
            tag_queries: AtomicUsize::new(0),
            creator_queries: AtomicUsize::new(0),
            id_fetches: AtomicUsize::new(0),
        }
    }

    /// Every query fails with a server error.
    pub fn failing(source: &'static str) -> Self {
        let mut mock = Self::new(source);
        mock.fail_all = true;
        mock
    }

    /// Minimal plausible candidate.
    pub fn candidate(id: &str, name: &str) -> Candidate {
        Candidate {
            catalog_id: id.to_string(),
            catalog_source: "civitai".to_string(),
            display_name: name.to_string(),
            file_name: format!("{}.safetensors", name.to_lowercase().replace(' ', "_")),
            file_size: Some(4096),
            download_ref: format!("https://example.test/dl/{}", id),
            tags: vec![],
            creator: None,
            download_count: None,
            sha256: None,
        }
    }

    pub fn with_record(mut self, id: &str, mut candidate: Candidate) -> Self {
        candidate.catalog_source = self.source.to_string();
        self.records.insert(id.to_string(), candidate);
        self
    }

    pub fn with_text_hit(mut self, query: &str, mut candidate: Candidate) -> Self {
        candidate.catalog_source = self.source.to_string();
        self.text_hits
            .entry(query.to_lowercase())
            .or_default()
            .push(candidate);
        self
    }

    pub fn with_tag_hit(mut self, tag: &str, mut candidate: Candidate) -> Self {
        candidate.catalog_source = self.source.to_string();
        self.tag_hits
            .entry(tag.to_lowercase())
            .or_default()
            .push(candidate);
        self
    }

    pub fn with_creator_hit(mut self, creator: &str, mut candidate: Candidate) -> Self {
        candidate.catalog_source = self.source.to_string();
        self.creator_hits
            .entry(creator.to_lowercase())
            .or_default()
            .push(candidate);
        self
    }

    pub fn text_queries(&self) -> usize {
        self.text_queries.load(Ordering::SeqCst)
    }

    pub fn tag_queries(&self) -> usize {
        self.tag_queries.load(Ordering::SeqCst)
    }

    pub fn creator_queries(&self) -> usize {
        self.creator_queries.load(Ordering::SeqCst)
    }

    pub fn id_fetches(&self) -> usize {
        self.id_fetches.load(Ordering::SeqCst)
    }

    fn fail(&self) -> ScoutError {
        ScoutError::Http {
            status: 500,
            url: format!("https://{}.test", self.source),
        }
    }
}

#[async_trait]
impl CatalogClient for MockCatalog {
    fn source(&self) -> &'static str {
        self.source
    }

    async fn query_by_text(&self, text: &str, _filters: &SearchFilters) -> Result<Vec<Candidate>> {
        self.text_queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_all {
            return Err(self.fail());
        }
        Ok(self
            .text_hits
            .get(&text.to_lowercase())
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_by_id(&self, id: &str) -> Result<Option<Candidate>> {
        self.id_fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_all {
            return Err(self.fail());
        }
        Ok(self.records.get(id).cloned())
    }

    async fn query_by_tag(&self, tag: &str, _filters: &SearchFilters) -> Result<Vec<Candidate>> {
        self.tag_queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_all {
            return Err(self.fail());
        }
        Ok(self
            .tag_hits
            .get(&tag.to_lowercase())
            .cloned()
            .unwrap_or_default())
    }

    async fn query_by_creator(
        &self,
        creator_id: &str,
        _filters: &SearchFilters,
    ) -> Result<Vec<Candidate>> {
        self.creator_queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_all {
            return Err(self.fail());
        }
        Ok(self
            .creator_hits
            .get(&creator_id.to_lowercase())
            .cloned()
            .unwrap_or_default())
    }
}
