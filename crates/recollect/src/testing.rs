//! Test utilities for recollect - mock backends and fixtures
//!
//! The mocks stand in for the remote summarizer and vector service so the
//! archival and retrieval paths can be exercised without a network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::knowledge::base::KnowledgeBase;
use crate::knowledge::types::KnowledgeEntry;
use crate::memory::agent::AgentId;
use crate::memory::types::{MemoryEntry, MemoryKind};
use crate::retrieval::vector::{VectorHit, VectorSearch, VectorSearchError};
use crate::summarizer::provider::Summarizer;
use crate::summarizer::types::{SummarizerError, SummaryRequest};

/// Summarizer returning a canned reply, optionally after a delay
#[derive(Debug, Default)]
pub struct MockSummarizer {
    reply: Option<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockSummarizer {
    pub fn with_reply(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            ..Self::default()
        }
    }

    /// Every call fails with an API error
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of summarize calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Summarizer for MockSummarizer {
    async fn summarize(&self, _request: &SummaryRequest) -> Result<String, SummarizerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply
            .clone()
            .ok_or_else(|| SummarizerError::ApiError("mock failure".to_string()))
    }

    async fn is_available(&self) -> bool {
        self.reply.is_some()
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Vector backend returning fixed hits, optionally slow or failing
#[derive(Debug, Default)]
pub struct MockVectorSearch {
    hits: Vec<VectorHit>,
    delay: Option<Duration>,
    fail: bool,
    calls: AtomicUsize,
}

impl MockVectorSearch {
    pub fn with_hits(hits: Vec<VectorHit>) -> Self {
        Self {
            hits,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorSearch for MockVectorSearch {
    async fn search(
        &self,
        _text: &str,
        top_k: usize,
        _min_similarity: f32,
    ) -> Result<Vec<VectorHit>, VectorSearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(VectorSearchError::ApiError("mock failure".to_string()));
        }
        Ok(self.hits.iter().take(top_k).copied().collect())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Agent id for fixtures; panics on an invalid id
pub fn agent(id: &str) -> AgentId {
    AgentId::try_from(id).expect("invalid fixture agent id")
}

/// `count` conversation entries with timestamps `first..first + count`
pub fn conversation_entries(first: u64, count: u64) -> Vec<MemoryEntry> {
    (first..first + count)
        .map(|ts| {
            MemoryEntry::new(format!("chat {ts}"), MemoryKind::Conversation, ts)
                .with_importance(0.5)
        })
        .collect()
}

/// A small settlement knowledge base
pub fn sample_knowledge() -> KnowledgeBase {
    KnowledgeBase::from_entries(vec![
        KnowledgeEntry::new("raid,raiders", "Raiders usually attack from the north road.")
            .with_importance(0.7),
        KnowledgeEntry::new("fire", "The kitchen has a fire extinguisher by the door."),
        KnowledgeEntry::new("medicine|herbal", "Healroot grows near the river.")
            .with_importance(0.4),
    ])
}
