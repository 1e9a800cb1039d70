//! Turn context assembly
//!
//! Orchestrates one turn for an agent:
//! 1. Build the match text from the configured sources
//! 2. Classify the scene and pick scoring weights
//! 3. Rank the agent's memories
//! 4. Retrieve knowledge through the keyword and vector channels
//! 5. Render both sections under their headers
//!
//! Results are memoized per agent in a [`TurnCache`]; a hit skips every
//! step above.

pub mod cache;

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{Config, InjectionConfig};
use crate::error::RecollectError;
use crate::knowledge::base::{KnowledgeBase, selected_entries};
use crate::knowledge::match_text::MatchTextBuilder;
use crate::knowledge::types::ScoredKnowledge;
use crate::memory::agent::AgentId;
use crate::memory::store::MemoryStore;
use crate::retrieval::hybrid::{HybridRetriever, KnowledgeQuery};
use crate::scene::{DynamicWeights, SceneClassification, SceneClassifier};
use crate::scoring::{MemoryScorer, ScoredMemory, ScoringContext, selected};

pub use cache::{CachedTurn, TurnCache, context_hash};

/// A ranked memory or knowledge candidate, for diagnostics
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum ScoredCandidate {
    Memory(ScoredMemory),
    Knowledge(ScoredKnowledge),
}

impl ScoredCandidate {
    pub fn total_score(&self) -> f32 {
        match self {
            ScoredCandidate::Memory(m) => m.total_score,
            ScoredCandidate::Knowledge(k) => k.total_score,
        }
    }
}

/// Inputs of one turn
#[derive(Debug, Clone, Copy)]
pub struct TurnRequest<'a> {
    /// Agent whose memories are injected
    pub agent: &'a AgentId,
    pub base_context: &'a str,
    pub speaker: Option<&'a AgentId>,
    pub listener: Option<&'a AgentId>,
    /// Everyone in the conversation, for per-agent sources and relationships
    pub participants: &'a [AgentId],
    /// Named shared sources besides the base context
    pub extra_sources: &'a BTreeMap<String, String>,
    /// Current game tick
    pub now: u64,
}

/// Output of one turn
#[derive(Debug, Clone, Serialize)]
pub struct TurnContext {
    /// `None` on a cache hit
    pub classification: Option<SceneClassification>,
    pub match_text: String,
    pub memory_text: Option<String>,
    pub knowledge_text: Option<String>,
    /// Both sections joined, empty when nothing is injected
    pub full_prompt: String,
    /// Every candidate considered, best first per source
    pub candidates: Vec<ScoredCandidate>,
    pub from_cache: bool,
}

impl TurnContext {
    fn from_cache(turn: CachedTurn) -> Self {
        Self {
            classification: None,
            match_text: String::new(),
            memory_text: turn.memory_text,
            knowledge_text: turn.knowledge_text,
            full_prompt: turn.full_prompt,
            candidates: Vec::new(),
            from_cache: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.full_prompt.is_empty()
    }
}

/// Memory half of a turn, computed before the knowledge channels run
struct PreparedTurn {
    hash: u64,
    match_text: String,
    classification: SceneClassification,
    memories: Vec<ScoredMemory>,
}

/// Render selected memories under `header`
pub fn format_memory_section(header: &str, memories: &[&ScoredMemory]) -> Option<String> {
    if memories.is_empty() {
        return None;
    }
    let mut block = String::from(header);
    for m in memories {
        block.push_str("\n- ");
        block.push_str(m.entry.content.trim());
    }
    Some(block)
}

/// Render selected knowledge under `header`
pub fn format_knowledge_section(header: &str, knowledge: &[&ScoredKnowledge]) -> Option<String> {
    if knowledge.is_empty() {
        return None;
    }
    let mut block = String::from(header);
    for k in knowledge {
        block.push_str("\n- ");
        block.push_str(k.entry.content.trim());
    }
    Some(block)
}

/// Builds the injected text for a turn
#[derive(Debug)]
pub struct TurnAssembler {
    classifier: SceneClassifier,
    scorer: MemoryScorer,
    retriever: HybridRetriever,
    match_text: MatchTextBuilder,
    cache: TurnCache,
    injection: InjectionConfig,
    memory_budget: usize,
    knowledge_budget: usize,
}

impl TurnAssembler {
    pub fn new(config: &Config, retriever: HybridRetriever, match_text: MatchTextBuilder) -> Self {
        Self {
            classifier: SceneClassifier::default(),
            scorer: MemoryScorer::new(config.scoring.clone()),
            retriever,
            match_text,
            cache: TurnCache::new(&config.cache),
            injection: config.injection.clone(),
            memory_budget: config.scoring.max_injected_memories,
            knowledge_budget: config.knowledge.max_injected_knowledge,
        }
    }

    pub fn with_classifier(mut self, classifier: SceneClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn classifier(&self) -> &SceneClassifier {
        &self.classifier
    }

    pub fn retriever(&self) -> &HybridRetriever {
        &self.retriever
    }

    pub fn match_text_builder(&self) -> &MatchTextBuilder {
        &self.match_text
    }

    pub fn cache(&self) -> &TurnCache {
        &self.cache
    }

    /// Participant ids plus their rendered names, for relationship bonuses
    fn participant_names(&self, participants: &[AgentId]) -> Vec<String> {
        let renderer = self.match_text.renderer();
        let mut names = Vec::with_capacity(participants.len() * 2);
        for agent in participants {
            names.push(agent.to_string());
            if let Some(name) = renderer.render("name", agent) {
                names.push(name);
            }
        }
        names
    }

    /// Classify `context` and rank the agent's memories against it.
    ///
    /// Returns `None` when the agent has no memory store.
    pub fn score_memories(
        &self,
        store: &MemoryStore,
        agent: &AgentId,
        context: &str,
        participants: &[AgentId],
        now: u64,
        budget: usize,
    ) -> Option<(SceneClassification, Vec<ScoredMemory>)> {
        let (classification, weights) = self.classifier.weights_for_text(context);
        let memories = self.rank_memories(store, agent, context, participants, now, budget, &weights)?;
        Some((classification, memories))
    }

    #[allow(clippy::too_many_arguments)]
    fn rank_memories(
        &self,
        store: &MemoryStore,
        agent: &AgentId,
        text: &str,
        participants: &[AgentId],
        now: u64,
        budget: usize,
        weights: &DynamicWeights,
    ) -> Option<Vec<ScoredMemory>> {
        let Some(memory) = store.agent(agent) else {
            let err = RecollectError::MissingComponent(agent.to_string());
            warn!(agent = %agent, error = %err, "Skipping memory injection");
            return None;
        };

        let names = self.participant_names(participants);
        let context = ScoringContext::new(text, store.extractor().as_ref(), now, &names);
        Some(self.scorer.rank(memory.scored_entries(), &context, weights, budget))
    }

    /// Render the best memories of `agent` for `context`, or `None`
    pub fn inject_memories(
        &self,
        store: &MemoryStore,
        agent: &AgentId,
        context: &str,
        max_count: usize,
        now: u64,
    ) -> Option<String> {
        let (_, ranked) = self.score_memories(store, agent, context, &[], now, max_count)?;
        format_memory_section(&self.injection.memory_header, &selected(&ranked))
    }

    /// Scored knowledge for `text`, blocking on the vector channel
    pub fn knowledge_detailed(
        &self,
        kb: &KnowledgeBase,
        text: &str,
        speaker: Option<&AgentId>,
        listener: Option<&AgentId>,
        max_count: usize,
    ) -> Vec<ScoredKnowledge> {
        let query = KnowledgeQuery {
            text,
            speaker,
            listener,
            budget: max_count,
        };
        self.retriever.retrieve_blocking(kb, &query)
    }

    pub async fn knowledge_detailed_async(
        &self,
        kb: &KnowledgeBase,
        text: &str,
        speaker: Option<&AgentId>,
        listener: Option<&AgentId>,
        max_count: usize,
    ) -> Vec<ScoredKnowledge> {
        let query = KnowledgeQuery {
            text,
            speaker,
            listener,
            budget: max_count,
        };
        self.retriever.retrieve_async(kb, &query).await
    }

    /// Render the matching knowledge for `text`, or `None`
    pub fn inject_knowledge(
        &self,
        kb: &KnowledgeBase,
        text: &str,
        speaker: Option<&AgentId>,
        listener: Option<&AgentId>,
        max_count: usize,
    ) -> Option<String> {
        let scored = self.knowledge_detailed(kb, text, speaker, listener, max_count);
        format_knowledge_section(&self.injection.knowledge_header, &selected_entries(&scored))
    }

    pub async fn inject_knowledge_async(
        &self,
        kb: &KnowledgeBase,
        text: &str,
        speaker: Option<&AgentId>,
        listener: Option<&AgentId>,
        max_count: usize,
    ) -> Option<String> {
        let scored = self
            .knowledge_detailed_async(kb, text, speaker, listener, max_count)
            .await;
        format_knowledge_section(&self.injection.knowledge_header, &selected_entries(&scored))
    }

    fn cached(&self, request: &TurnRequest<'_>) -> (u64, Option<TurnContext>) {
        let hash = context_hash(
            request.base_context,
            request.speaker,
            request.listener,
            request.participants,
            request.extra_sources.iter(),
        );
        let hit = self.cache.get(request.agent, hash, request.now).map(|turn| {
            debug!(agent = %request.agent, "Turn cache hit");
            TurnContext::from_cache(turn)
        });
        (hash, hit)
    }

    fn prepare(&self, store: &MemoryStore, request: &TurnRequest<'_>, hash: u64) -> PreparedTurn {
        let match_text =
            self.match_text
                .build(request.base_context, request.extra_sources, request.participants);
        let (classification, weights) = self.classifier.weights_for_text(request.base_context);
        let memories = self
            .rank_memories(
                store,
                request.agent,
                &match_text,
                request.participants,
                request.now,
                self.memory_budget,
                &weights,
            )
            .unwrap_or_default();

        debug!(
            agent = %request.agent,
            scene = %classification.primary,
            confidence = classification.confidence,
            "Prepared turn"
        );

        PreparedTurn {
            hash,
            match_text,
            classification,
            memories,
        }
    }

    fn query<'a>(&self, prepared: &'a PreparedTurn, request: &TurnRequest<'a>) -> KnowledgeQuery<'a> {
        KnowledgeQuery {
            text: &prepared.match_text,
            speaker: request.speaker,
            listener: request.listener,
            budget: self.knowledge_budget,
        }
    }

    fn complete(
        &self,
        request: &TurnRequest<'_>,
        prepared: PreparedTurn,
        knowledge: Vec<ScoredKnowledge>,
    ) -> TurnContext {
        let memory_text =
            format_memory_section(&self.injection.memory_header, &selected(&prepared.memories));
        let knowledge_text = format_knowledge_section(
            &self.injection.knowledge_header,
            &selected_entries(&knowledge),
        );
        let full_prompt = [memory_text.as_deref(), knowledge_text.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join("\n\n");

        self.cache.put(
            request.agent,
            CachedTurn {
                context_hash: prepared.hash,
                computed_at: request.now,
                memory_text: memory_text.clone(),
                knowledge_text: knowledge_text.clone(),
                full_prompt: full_prompt.clone(),
            },
        );

        let candidates = prepared
            .memories
            .into_iter()
            .map(ScoredCandidate::Memory)
            .chain(knowledge.into_iter().map(ScoredCandidate::Knowledge))
            .collect();

        TurnContext {
            classification: Some(prepared.classification),
            match_text: prepared.match_text,
            memory_text,
            knowledge_text,
            full_prompt,
            candidates,
            from_cache: false,
        }
    }

    /// Assemble a turn from a synchronous caller
    pub fn assemble(
        &self,
        store: &MemoryStore,
        kb: &KnowledgeBase,
        request: &TurnRequest<'_>,
    ) -> TurnContext {
        let (hash, hit) = self.cached(request);
        if let Some(hit) = hit {
            return hit;
        }

        let prepared = self.prepare(store, request, hash);
        let knowledge = self
            .retriever
            .retrieve_blocking(kb, &self.query(&prepared, request));
        self.complete(request, prepared, knowledge)
    }

    pub async fn assemble_async(
        &self,
        store: &MemoryStore,
        kb: &KnowledgeBase,
        request: &TurnRequest<'_>,
    ) -> TurnContext {
        let (hash, hit) = self.cached(request);
        if let Some(hit) = hit {
            return hit;
        }

        let prepared = self.prepare(store, request, hash);
        let knowledge = self
            .retriever
            .retrieve_async(kb, &self.query(&prepared, request))
            .await;
        self.complete(request, prepared, knowledge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::knowledge::match_text::StaticPropertyRenderer;
    use crate::knowledge::types::KnowledgeEntry;
    use crate::memory::types::{MemoryEntry, MemoryKind, MemoryTier};
    use std::sync::Arc;

    fn assembler(config: &Config) -> TurnAssembler {
        let retriever = HybridRetriever::new(config.knowledge.clone(), config.vector.clone());
        let builder = MatchTextBuilder::new(
            config.knowledge.match_sources.clone(),
            Arc::new(StaticPropertyRenderer::new()),
        );
        TurnAssembler::new(config, retriever, builder)
    }

    fn agent() -> AgentId {
        AgentId::try_from("pawn_1").unwrap()
    }

    fn fixture() -> (MemoryStore, KnowledgeBase) {
        let config = Config::default();
        let mut store = MemoryStore::new(config.memory.clone());
        store.insert(
            &agent(),
            MemoryEntry::new("Lost a friend in the last raid", MemoryKind::Event, 100)
                .with_importance(0.8),
            MemoryTier::EventLog,
        );
        let mut kb = KnowledgeBase::new();
        kb.add(KnowledgeEntry::new("raid", "Raiders come from the north"));
        (store, kb)
    }

    #[test]
    fn test_format_sections() {
        assert!(format_memory_section("[Memories]", &[]).is_none());
        assert!(format_knowledge_section("[Knowledge]", &[]).is_none());
    }

    #[test]
    fn test_assemble_renders_both_sections() {
        let config = Config::default();
        let (store, kb) = fixture();
        let assembler = assembler(&config);
        let a = agent();
        let extra = BTreeMap::new();
        let request = TurnRequest {
            agent: &a,
            base_context: "Another raid is coming",
            speaker: Some(&a),
            listener: None,
            participants: &[],
            extra_sources: &extra,
            now: 200,
        };

        let turn = assembler.assemble(&store, &kb, &request);

        assert!(!turn.from_cache);
        assert_eq!(
            turn.full_prompt,
            "[Memories]\n- Lost a friend in the last raid\n\n[Knowledge]\n- Raiders come from the north"
        );
        assert_eq!(turn.candidates.len(), 2);

        let again = assembler.assemble(&store, &kb, &request);
        assert!(again.from_cache);
        assert_eq!(again.full_prompt, turn.full_prompt);
    }

    #[test]
    fn test_unknown_agent_gets_no_memories() {
        let config = Config::default();
        let (store, _) = fixture();
        let assembler = assembler(&config);
        let stranger = AgentId::try_from("stranger").unwrap();

        assert!(assembler
            .inject_memories(&store, &stranger, "raid", 5, 200)
            .is_none());
    }
}
