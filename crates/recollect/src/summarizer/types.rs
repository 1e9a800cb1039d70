//! Summarizer types
//!
//! A [`SummaryJob`] is queued by the memory store whenever archival creates
//! an aggregated entry and a summarizer is configured. The dispatcher turns
//! it into a [`SummaryRequest`] for the provider and reports back with a
//! [`SummaryOutcome`] keyed by the batch hash.

use uuid::Uuid;

use crate::error::RecollectError;
use crate::memory::agent::AgentId;
use crate::memory::types::{MemoryKind, MemoryTier};

/// Background summary work for one aggregated entry
#[derive(Debug, Clone)]
pub struct SummaryJob {
    /// Owner of the aggregated entry
    pub agent: AgentId,
    /// Placeholder entry that receives the summary
    pub entry_id: Uuid,
    /// Content hash of the archived batch
    pub batch_hash: u64,
    /// Kind shared by every entry of the batch
    pub kind: MemoryKind,
    /// Tier the aggregated entry was placed in
    pub tier: MemoryTier,
    /// Contents of the archived entries, oldest first
    pub contents: Vec<String>,
}

impl SummaryJob {
    /// Build the provider request using `prompt_template`
    pub fn to_request(&self, prompt_template: &str) -> SummaryRequest {
        SummaryRequest {
            agent: self.agent.to_string(),
            kind: self.kind,
            tier: self.tier,
            entries: self.contents.clone(),
            prompt_template: prompt_template.to_string(),
        }
    }
}

/// Input to a [`Summarizer`](crate::summarizer::Summarizer)
#[derive(Debug, Clone)]
pub struct SummaryRequest {
    pub agent: String,
    pub kind: MemoryKind,
    pub tier: MemoryTier,
    pub entries: Vec<String>,
    pub prompt_template: String,
}

/// Finished background summary
#[derive(Debug)]
pub struct SummaryOutcome {
    pub agent: AgentId,
    pub entry_id: Uuid,
    pub batch_hash: u64,
    pub result: Result<String>,
}

/// Summarizer-specific errors
#[derive(Debug, thiserror::Error)]
pub enum SummarizerError {
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Summarizer returned an empty summary")]
    EmptyResponse,
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Summarizer unavailable: {0}")]
    Unavailable(String),
}

impl From<SummarizerError> for RecollectError {
    fn from(e: SummarizerError) -> Self {
        RecollectError::SummarizationFailure(e.to_string())
    }
}

/// Result type alias for summarizer operations
pub type Result<T> = std::result::Result<T, SummarizerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_to_request() {
        let job = SummaryJob {
            agent: AgentId::try_from("pawn_1").unwrap(),
            entry_id: Uuid::new_v4(),
            batch_hash: 7,
            kind: MemoryKind::Conversation,
            tier: MemoryTier::Archive,
            contents: vec!["a".to_string(), "b".to_string()],
        };

        let request = job.to_request("{entries}");
        assert_eq!(request.agent, "pawn_1");
        assert_eq!(request.entries.len(), 2);
        assert_eq!(request.prompt_template, "{entries}");
    }

    #[test]
    fn test_error_conversion() {
        let err: RecollectError = SummarizerError::EmptyResponse.into();
        assert!(matches!(err, RecollectError::SummarizationFailure(_)));
        assert_eq!(
            err.to_string(),
            "Summarization failed: Summarizer returned an empty summary"
        );
    }
}
