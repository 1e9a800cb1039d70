//! Vector-similarity channel
//!
//! The embedding index lives outside this crate. It is reached through the
//! [`VectorSearch`] trait, which answers a query with knowledge ids and
//! their similarity.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::VectorConfig;
use crate::error::RecollectError;

/// One similarity hit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VectorHit {
    pub id: Uuid,
    pub similarity: f32,
}

/// Vector search errors
#[derive(Debug, thiserror::Error)]
pub enum VectorSearchError {
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

impl From<VectorSearchError> for RecollectError {
    fn from(e: VectorSearchError) -> Self {
        match e {
            VectorSearchError::Timeout(d) => RecollectError::RetrievalTimeout(d),
            VectorSearchError::ConfigError(msg) => RecollectError::Config(msg),
            VectorSearchError::ParseError(msg) => RecollectError::Serialization(msg),
            VectorSearchError::ApiError(msg) => {
                RecollectError::InvalidOperation(format!("vector search failed: {msg}"))
            }
        }
    }
}

/// Trait for vector-similarity backends
#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Up to `top_k` hits with similarity of at least `min_similarity`
    async fn search(
        &self,
        text: &str,
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<VectorHit>, VectorSearchError>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    top_k: usize,
    min_similarity: f32,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<VectorHit>,
}

/// HTTP client for a remote similarity service
#[derive(Debug)]
pub struct RemoteVectorSearch {
    client: Client,
    endpoint: String,
}

impl RemoteVectorSearch {
    pub fn new(config: &VectorConfig) -> Result<Self, VectorSearchError> {
        if config.endpoint.is_empty() {
            return Err(VectorSearchError::ConfigError(
                "vector endpoint is not set".to_string(),
            ));
        }
        url::Url::parse(&config.endpoint)
            .map_err(|e| VectorSearchError::ConfigError(format!("invalid endpoint: {e}")))?;

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| VectorSearchError::ApiError(e.to_string()))?;

        info!("RemoteVectorSearch initialized with endpoint: {}", config.endpoint);

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl VectorSearch for RemoteVectorSearch {
    async fn search(
        &self,
        text: &str,
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<VectorHit>, VectorSearchError> {
        let request = SearchRequest {
            query: text,
            top_k,
            min_similarity,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| VectorSearchError::ApiError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(VectorSearchError::ApiError(format!(
                "API returned {status}: {error_text}"
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| VectorSearchError::ParseError(e.to_string()))?;

        let hits: Vec<VectorHit> = body
            .results
            .into_iter()
            .filter(|h| h.similarity >= min_similarity)
            .take(top_k)
            .collect();

        debug!(hits = hits.len(), "Vector search complete");
        Ok(hits)
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}
