//! HuggingFace-style catalog adapter.
//!
//! Queries the Hub `/api/models` index and maps repos to [`Candidate`]s.
//! The primary weight file is picked from the repo's sibling list and the
//! download ref points at the `resolve/main` endpoint for that file.

use super::{Candidate, CatalogClient, SearchFilters, SortOrder, TypeHint};
use crate::config::NetworkConfig;
use crate::error::{Result, ScoutError};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

const HF_API_BASE: &str = "https://huggingface.co/api";
const HF_HUB_BASE: &str = "https://huggingface.co";

/// Client for a HuggingFace-compatible registry.
pub struct HuggingFaceClient {
    client: reqwest::Client,
    api_base: String,
    hub_base: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepoPayload {
    #[serde(rename = "modelId", alias = "id")]
    model_id: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    downloads: Option<u64>,
    #[serde(default)]
    siblings: Vec<SiblingPayload>,
}

#[derive(Debug, Deserialize)]
struct SiblingPayload {
    rfilename: String,
    #[serde(default)]
    size: Option<u64>,
}

impl HuggingFaceClient {
    /// Create a client against the public Hub.
    pub fn new() -> Result<Self> {
        Self::with_base_urls(HF_API_BASE, HF_HUB_BASE)
    }

    /// Create a client against custom endpoints (test servers, mirrors).
    pub fn with_base_urls(
        api_base: impl Into<String>,
        hub_base: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(NetworkConfig::REQUEST_TIMEOUT)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| ScoutError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                cause: Some(e.to_string()),
            })?;

        Ok(Self {
            client,
            api_base: api_base.into(),
            hub_base: hub_base.into(),
        })
    }

    fn filter_params(filters: &SearchFilters) -> String {
        let mut params = format!("&limit={}&full=true", filters.limit);
        if let Some(hint) = filters.type_hint {
            // The Hub has no first-class asset-type facet; the closest
            // signal is a tag filter on the community vocabulary.
            let tag = match hint {
                TypeHint::Lora => Some("lora"),
                TypeHint::Controlnet => Some("controlnet"),
                TypeHint::Vae => Some("vae"),
                TypeHint::Embedding => Some("textual-inversion"),
                TypeHint::Checkpoint | TypeHint::Other => None,
            };
            if let Some(tag) = tag {
                params.push_str(&format!("&filter={}", tag));
            }
        }
        if filters.sort == SortOrder::MostDownloaded {
            params.push_str("&sort=downloads&direction=-1");
        }
        params
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!("HuggingFace request: {}", url);
        let response = self.client.get(url).send().await.map_err(|e| ScoutError::Network {
            message: format!("HuggingFace API request failed: {}", e),
            cause: Some(e.to_string()),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScoutError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response.json().await.map_err(|e| ScoutError::Json {
            message: format!("Failed to parse HuggingFace response: {}", e),
            source: None,
        })
    }

    /// Convert a repo payload to a candidate.
    ///
    /// Repos without a recognizable weight file are dropped.
    fn convert_repo(&self, payload: RepoPayload) -> Option<Candidate> {
        let weight = payload
            .siblings
            .iter()
            .filter(|s| super::has_weight_extension(&s.rfilename))
            .max_by_key(|s| s.size.unwrap_or(0))?;

        let display_name = payload
            .model_id
            .split('/')
            .next_back()
            .unwrap_or(&payload.model_id)
            .to_string();
        let creator = payload
            .model_id
            .split('/')
            .next()
            .filter(|owner| *owner != payload.model_id)
            .map(str::to_string);

        let download_ref = format!(
            "{}/{}/resolve/main/{}",
            self.hub_base, payload.model_id, weight.rfilename
        );

        Some(Candidate {
            catalog_id: payload.model_id,
            catalog_source: "huggingface".to_string(),
            display_name,
            file_name: weight.rfilename.clone(),
            file_size: weight.size,
            download_ref,
            tags: payload.tags,
            creator,
            download_count: payload.downloads,
            sha256: None,
        })
    }

    fn convert_repos(&self, repos: Vec<RepoPayload>) -> Vec<Candidate> {
        repos
            .into_iter()
            .filter_map(|r| self.convert_repo(r))
            .collect()
    }
}

#[async_trait]
impl CatalogClient for HuggingFaceClient {
    fn source(&self) -> &'static str {
        "huggingface"
    }

    async fn query_by_text(&self, text: &str, filters: &SearchFilters) -> Result<Vec<Candidate>> {
        let url = format!(
            "{}/models?search={}{}",
            self.api_base,
            urlencoding::encode(text),
            Self::filter_params(filters)
        );
        let repos: Vec<RepoPayload> = self.get_json(&url).await?;
        Ok(self.convert_repos(repos))
    }

    async fn fetch_by_id(&self, id: &str) -> Result<Option<Candidate>> {
        // Repo ids contain a slash; only the path inside each segment is
        // encoded, the separator stays.
        let url = format!("{}/models/{}", self.api_base, id);

        let payload: RepoPayload = match self.get_json(&url).await {
            Ok(p) => p,
            Err(ScoutError::Http { status: 404, .. }) => return Ok(None),
            Err(e) => return Err(e),
        };

        if payload.model_id != id {
            return Err(ScoutError::CatalogMismatch {
                requested: id.to_string(),
                returned: payload.model_id,
            });
        }

        Ok(self.convert_repo(payload))
    }

    async fn query_by_tag(&self, tag: &str, filters: &SearchFilters) -> Result<Vec<Candidate>> {
        let url = format!(
            "{}/models?filter={}{}",
            self.api_base,
            urlencoding::encode(tag),
            Self::filter_params(filters)
        );
        let repos: Vec<RepoPayload> = self.get_json(&url).await?;
        Ok(self.convert_repos(repos))
    }

    async fn query_by_creator(
        &self,
        creator_id: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<Candidate>> {
        let url = format!(
            "{}/models?author={}{}",
            self.api_base,
            urlencoding::encode(creator_id),
            Self::filter_params(filters)
        );
        let repos: Vec<RepoPayload> = self.get_json(&url).await?;
        Ok(self.convert_repos(repos))
    }
}
