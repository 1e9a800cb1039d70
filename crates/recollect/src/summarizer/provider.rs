//! Summarizer provider trait
//!
//! Abstracts the external service that rewrites an aggregated archive
//! entry into a natural-language summary.

use async_trait::async_trait;

use crate::summarizer::types::{SummarizerError, SummaryRequest};

/// Trait for summarization backends
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize the archived entries of one batch.
    ///
    /// An empty string is treated by callers as a failure.
    async fn summarize(&self, request: &SummaryRequest) -> Result<String, SummarizerError>;

    /// Check if the provider can take requests
    async fn is_available(&self) -> bool;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}
