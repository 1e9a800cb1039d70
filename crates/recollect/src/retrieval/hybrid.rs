//! Hybrid knowledge retrieval
//!
//! Combines the keyword matcher with the vector channel. Keyword matches
//! are authoritative: under [`FusionPolicy::Exclude`] a vector hit for an
//! entry already matched by keyword is dropped, under
//! [`FusionPolicy::Merge`] its weighted similarity is added to the keyword
//! score and the entry is relabelled [`MatchKind::Mixed`]. Vector-only hits
//! score `importance + similarity_weight * similarity`.
//!
//! The vector channel never fails a turn. On error or timeout the result
//! is exactly what the keyword channel alone would have produced.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{FusionPolicy, KnowledgeConfig, VectorConfig};
use crate::error::RecollectError;
use crate::knowledge::base::{KnowledgeBase, finalize_selection};
use crate::knowledge::types::{MatchKind, ScoredKnowledge};
use crate::memory::agent::AgentId;
use crate::retrieval::vector::{VectorHit, VectorSearch, VectorSearchError};
use crate::scoring::SelectionOutcome;

/// One knowledge lookup
#[derive(Debug, Clone, Copy)]
pub struct KnowledgeQuery<'a> {
    pub text: &'a str,
    pub speaker: Option<&'a AgentId>,
    pub listener: Option<&'a AgentId>,
    pub budget: usize,
}

/// Keyword plus vector knowledge retrieval
#[derive(Clone)]
pub struct HybridRetriever {
    knowledge: KnowledgeConfig,
    vector_config: VectorConfig,
    vector: Option<Arc<dyn VectorSearch>>,
    handle: Option<Handle>,
}

impl HybridRetriever {
    pub fn new(knowledge: KnowledgeConfig, vector_config: VectorConfig) -> Self {
        Self {
            knowledge,
            vector_config,
            vector: None,
            handle: None,
        }
    }

    /// Attach a vector backend. Ignored unless the vector channel is enabled.
    pub fn with_vector_search(mut self, vector: Arc<dyn VectorSearch>) -> Self {
        self.vector = Some(vector);
        self
    }

    /// Runtime used by the blocking path; defaults to the current one
    pub fn with_runtime(mut self, handle: Handle) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn fusion_policy(&self) -> FusionPolicy {
        self.vector_config.fusion
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.vector_config.timeout_ms)
    }

    fn active_vector(&self) -> Option<&Arc<dyn VectorSearch>> {
        if self.vector_config.enabled {
            self.vector.as_ref()
        } else {
            None
        }
    }

    /// Keyword channel alone, finalized
    pub fn keyword_only(&self, kb: &KnowledgeBase, query: &KnowledgeQuery<'_>) -> Vec<ScoredKnowledge> {
        kb.match_keywords(
            query.text,
            query.speaker,
            query.listener,
            &self.knowledge,
            query.budget,
        )
    }

    /// Merge vector hits into keyword candidates and finalize the selection
    pub fn fuse(
        &self,
        kb: &KnowledgeBase,
        query: &KnowledgeQuery<'_>,
        mut candidates: Vec<ScoredKnowledge>,
        hits: &[VectorHit],
    ) -> Vec<ScoredKnowledge> {
        let weight = self.vector_config.similarity_weight;
        let threshold = self.knowledge.knowledge_score_threshold;

        // Best similarity per id
        let mut best: Vec<VectorHit> = Vec::new();
        for hit in hits
            .iter()
            .filter(|h| h.similarity >= self.vector_config.min_similarity)
        {
            match best.iter_mut().find(|b| b.id == hit.id) {
                Some(existing) if existing.similarity < hit.similarity => *existing = *hit,
                Some(_) => {}
                None => best.push(*hit),
            }
        }

        let keyword_index: HashMap<Uuid, usize> = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id(), i))
            .collect();

        for hit in best {
            let Some(entry) = kb.retrievable(hit.id, query.speaker, query.listener) else {
                debug!(id = %hit.id, "Vector hit not retrievable, skipping");
                continue;
            };

            let boost = weight * hit.similarity;

            if let Some(&idx) = keyword_index.get(&hit.id) {
                match self.vector_config.fusion {
                    FusionPolicy::Exclude => {}
                    FusionPolicy::Merge => {
                        let candidate = &mut candidates[idx];
                        candidate.match_type_score += boost;
                        candidate.total_score += boost;
                        candidate.match_kind = MatchKind::Mixed;
                        candidate.similarity = Some(hit.similarity);
                        if candidate.outcome == SelectionOutcome::LowScore
                            && candidate.total_score >= threshold
                        {
                            candidate.outcome = SelectionOutcome::Selected;
                        }
                    }
                }
                continue;
            }

            let total_score = entry.importance + boost;
            candidates.push(ScoredKnowledge {
                entry: entry.clone(),
                total_score,
                base_score: entry.importance,
                match_type_score: boost,
                match_kind: MatchKind::Vector,
                similarity: Some(hit.similarity),
                outcome: if total_score < threshold {
                    SelectionOutcome::LowScore
                } else {
                    SelectionOutcome::Selected
                },
            });
        }

        finalize_selection(&mut candidates, query.budget, self.knowledge.confidence_margin);
        candidates
    }

    /// Retrieve knowledge, awaiting the vector channel with a timeout
    pub async fn retrieve_async(
        &self,
        kb: &KnowledgeBase,
        query: &KnowledgeQuery<'_>,
    ) -> Vec<ScoredKnowledge> {
        let Some(vector) = self.active_vector() else {
            return self.keyword_only(kb, query);
        };

        let candidates = self.keyword_candidates(kb, query);
        let search = vector.search(
            query.text,
            self.vector_config.top_k,
            self.vector_config.min_similarity,
        );

        let outcome = match tokio::time::timeout(self.timeout(), search).await {
            Ok(result) => result,
            Err(_) => Err(VectorSearchError::Timeout(self.timeout())),
        };

        self.finish(kb, query, candidates, outcome)
    }

    /// Retrieve knowledge from a synchronous caller.
    ///
    /// The vector search runs on the tokio runtime while this thread waits
    /// at most the configured timeout. Must not be called from inside an
    /// async task; use [`retrieve_async`](Self::retrieve_async) there.
    pub fn retrieve_blocking(
        &self,
        kb: &KnowledgeBase,
        query: &KnowledgeQuery<'_>,
    ) -> Vec<ScoredKnowledge> {
        let Some(vector) = self.active_vector() else {
            return self.keyword_only(kb, query);
        };

        let Some(handle) = self.handle.clone().or_else(|| Handle::try_current().ok()) else {
            warn!("No tokio runtime for vector search, using keyword results");
            return self.keyword_only(kb, query);
        };

        let candidates = self.keyword_candidates(kb, query);
        let (tx, rx) = mpsc::channel();
        let vector = Arc::clone(vector);
        let text = query.text.to_string();
        let top_k = self.vector_config.top_k;
        let min_similarity = self.vector_config.min_similarity;

        handle.spawn(async move {
            let result = vector.search(&text, top_k, min_similarity).await;
            // Receiver is gone when the caller already timed out
            let _ = tx.send(result);
        });

        let outcome = match rx.recv_timeout(self.timeout()) {
            Ok(result) => result,
            Err(_) => Err(VectorSearchError::Timeout(self.timeout())),
        };

        self.finish(kb, query, candidates, outcome)
    }

    fn keyword_candidates(&self, kb: &KnowledgeBase, query: &KnowledgeQuery<'_>) -> Vec<ScoredKnowledge> {
        kb.keyword_candidates(query.text, query.speaker, query.listener, &self.knowledge)
    }

    fn finish(
        &self,
        kb: &KnowledgeBase,
        query: &KnowledgeQuery<'_>,
        mut candidates: Vec<ScoredKnowledge>,
        outcome: Result<Vec<VectorHit>, VectorSearchError>,
    ) -> Vec<ScoredKnowledge> {
        match outcome {
            Ok(hits) => {
                debug!(hits = hits.len(), "Fusing vector hits");
                self.fuse(kb, query, candidates, &hits)
            }
            Err(e) => {
                let err: RecollectError = e.into();
                warn!(error = %err, "Vector channel failed, using keyword results");
                finalize_selection(&mut candidates, query.budget, self.knowledge.confidence_margin);
                candidates
            }
        }
    }
}

impl std::fmt::Debug for HybridRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridRetriever")
            .field("vector_enabled", &self.vector_config.enabled)
            .field("backend", &self.vector.as_ref().map(|v| v.name()))
            .field("fusion", &self.vector_config.fusion)
            .finish()
    }
}
