//! Civitai-style catalog adapter.
//!
//! Wraps the `/api/v1/models` surface. Responses are parsed into bounded
//! DTOs and converted to [`Candidate`] here; the rest of the crate never
//! sees Civitai JSON.

use super::{Candidate, CatalogClient, SearchFilters, SortOrder, TypeHint};
use crate::config::NetworkConfig;
use crate::error::{Result, ScoutError};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

const CIVITAI_API_BASE: &str = "https://civitai.com/api/v1";

/// Client for a Civitai-compatible registry.
pub struct CivitaiClient {
    client: reqwest::Client,
    base_url: String,
}

// Raw API payload shapes. Only the fields we consume.

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<ModelPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelPayload {
    id: u64,
    name: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    creator: Option<CreatorPayload>,
    #[serde(default)]
    stats: Option<StatsPayload>,
    #[serde(default)]
    model_versions: Vec<VersionPayload>,
}

#[derive(Debug, Deserialize)]
struct CreatorPayload {
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsPayload {
    #[serde(default)]
    download_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct VersionPayload {
    #[serde(default)]
    files: Vec<FilePayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilePayload {
    name: String,
    #[serde(default, rename = "sizeKB")]
    size_kb: Option<f64>,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    hashes: Option<HashesPayload>,
}

#[derive(Debug, Deserialize)]
struct HashesPayload {
    #[serde(default, rename = "SHA256")]
    sha256: Option<String>,
}

impl CivitaiClient {
    /// Create a client against the public Civitai API.
    pub fn new() -> Result<Self> {
        Self::with_base_url(CIVITAI_API_BASE)
    }

    /// Create a client against a custom base URL (test servers, mirrors).
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
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
            base_url: base_url.into(),
        })
    }

    /// Map a type hint to Civitai's `types` query value.
    fn type_param(hint: TypeHint) -> Option<&'static str> {
        match hint {
            TypeHint::Checkpoint => Some("Checkpoint"),
            TypeHint::Lora => Some("LORA"),
            TypeHint::Vae => Some("VAE"),
            TypeHint::Embedding => Some("TextualInversion"),
            TypeHint::Controlnet => Some("Controlnet"),
            TypeHint::Other => None,
        }
    }

    fn filter_params(filters: &SearchFilters) -> String {
        let mut params = format!("&limit={}", filters.limit);
        if let Some(hint) = filters.type_hint {
            if let Some(t) = Self::type_param(hint) {
                params.push_str(&format!("&types={}", t));
            }
        }
        if let Some(nsfw) = filters.include_sensitive {
            params.push_str(&format!("&nsfw={}", nsfw));
        }
        if filters.sort == SortOrder::MostDownloaded {
            params.push_str("&sort=Most%20Downloaded");
        }
        params
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!("Civitai request: {}", url);
        let response = self.client.get(url).send().await.map_err(|e| ScoutError::Network {
            message: format!("Civitai request failed: {}", e),
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
            message: format!("Failed to parse Civitai response: {}", e),
            source: None,
        })
    }

    /// Convert one model payload to a candidate.
    ///
    /// The primary file is the first weight file of the newest version;
    /// records without any downloadable file are skipped by callers.
    fn convert_model(payload: ModelPayload) -> Option<Candidate> {
        let file = payload
            .model_versions
            .iter()
            .flat_map(|v| v.files.iter())
            .find(|f| super::has_weight_extension(&f.name))
            .or_else(|| {
                payload
                    .model_versions
                    .iter()
                    .flat_map(|v| v.files.iter())
                    .next()
            })?;

        let download_ref = file.download_url.clone()?;

        Some(Candidate {
            catalog_id: payload.id.to_string(),
            catalog_source: "civitai".to_string(),
            display_name: payload.name,
            file_name: file.name.clone(),
            file_size: file.size_kb.map(|kb| (kb * 1024.0) as u64),
            download_ref,
            tags: payload.tags,
            creator: payload.creator.and_then(|c| c.username),
            download_count: payload.stats.and_then(|s| s.download_count),
            sha256: file
                .hashes
                .as_ref()
                .and_then(|h| h.sha256.as_ref())
                .map(|h| h.to_lowercase()),
        })
    }

    fn convert_items(response: SearchResponse) -> Vec<Candidate> {
        response
            .items
            .into_iter()
            .filter_map(Self::convert_model)
            .collect()
    }
}

/// Catalogs have been observed substituting an unrelated record instead
/// of signaling not-found. Never accept a mismatched id.
fn ensure_id_matches(requested: &str, returned: u64) -> Result<()> {
    if returned.to_string() != requested {
        return Err(ScoutError::CatalogMismatch {
            requested: requested.to_string(),
            returned: returned.to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl CatalogClient for CivitaiClient {
    fn source(&self) -> &'static str {
        "civitai"
    }

    async fn query_by_text(&self, text: &str, filters: &SearchFilters) -> Result<Vec<Candidate>> {
        let url = format!(
            "{}/models?query={}{}",
            self.base_url,
            urlencoding::encode(text),
            Self::filter_params(filters)
        );
        let response: SearchResponse = self.get_json(&url).await?;
        Ok(Self::convert_items(response))
    }

    async fn fetch_by_id(&self, id: &str) -> Result<Option<Candidate>> {
        let url = format!("{}/models/{}", self.base_url, urlencoding::encode(id));

        let payload: ModelPayload = match self.get_json(&url).await {
            Ok(p) => p,
            Err(ScoutError::Http { status: 404, .. }) => return Ok(None),
            Err(e) => return Err(e),
        };

        ensure_id_matches(id, payload.id)?;
        Ok(Self::convert_model(payload))
    }

    async fn query_by_tag(&self, tag: &str, filters: &SearchFilters) -> Result<Vec<Candidate>> {
        let url = format!(
            "{}/models?tag={}{}",
            self.base_url,
            urlencoding::encode(tag),
            Self::filter_params(filters)
        );
        let response: SearchResponse = self.get_json(&url).await?;
        Ok(Self::convert_items(response))
    }

    async fn query_by_creator(
        &self,
        creator_id: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<Candidate>> {
        let url = format!(
            "{}/models?username={}{}",
            self.base_url,
            urlencoding::encode(creator_id),
            Self::filter_params(filters)
        );
        let response: SearchResponse = self.get_json(&url).await?;
        Ok(Self::convert_items(response))
    }
}
