//! Engine facade
//!
//! [`ContextEngine`] wires the memory store, knowledge base and turn
//! assembler together and exposes the operations a host calls each turn,
//! plus the operator mutations. It is owned by the host's main thread; the
//! only background work is vector search and summarization, whose results
//! come back through [`ContextEngine::pump_summaries`].

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::assembler::{TurnAssembler, TurnContext, TurnRequest};
use crate::config::Config;
use crate::error::Result;
use crate::knowledge::base::KnowledgeBase;
use crate::knowledge::match_text::{MatchTextBuilder, PropertyRenderer, StaticPropertyRenderer};
use crate::knowledge::types::{KnowledgeEntry, ScoredKnowledge};
use crate::memory::agent::AgentId;
use crate::memory::filter::EntryFilter;
use crate::memory::keywords::KeywordExtractor;
use crate::memory::store::{ArchivalReport, MemoryStore, TierStats};
use crate::memory::types::{MemoryEntry, MemoryTier};
use crate::retrieval::hybrid::HybridRetriever;
use crate::retrieval::vector::{RemoteVectorSearch, VectorSearch};
use crate::scene::SceneClassification;
use crate::summarizer::provider::Summarizer;
use crate::summarizer::remote::RemoteSummarizer;
use crate::summarizer::worker::SummaryDispatcher;

/// Memory and knowledge injection for a set of agents
pub struct ContextEngine {
    config: Config,
    store: MemoryStore,
    knowledge: KnowledgeBase,
    assembler: TurnAssembler,
    renderer: Arc<dyn PropertyRenderer>,
    vector: Option<Arc<dyn VectorSearch>>,
    runtime: Option<Handle>,
    dispatcher: Option<SummaryDispatcher>,
    tick: u64,
}

impl ContextEngine {
    /// Engine with keyword-only retrieval and simple summaries
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let renderer: Arc<dyn PropertyRenderer> = Arc::new(StaticPropertyRenderer::new());
        let store = MemoryStore::new(config.memory.clone());
        let assembler = build_assembler(&config, &renderer, None, None);

        Ok(Self {
            config,
            store,
            knowledge: KnowledgeBase::new(),
            assembler,
            renderer,
            vector: None,
            runtime: None,
            dispatcher: None,
            tick: 0,
        })
    }

    /// Engine with the remote collaborators enabled in `config`.
    ///
    /// Background work runs on `handle`.
    pub fn from_config(config: Config, handle: Handle) -> Result<Self> {
        let mut engine = Self::new(config)?.with_runtime(handle.clone());

        if engine.config.vector.enabled {
            let vector = RemoteVectorSearch::new(&engine.config.vector)?;
            engine = engine.with_vector_search(Arc::new(vector));
        }

        if engine.config.summarizer.enabled {
            let summarizer = RemoteSummarizer::new(&engine.config.summarizer)?;
            engine = engine.with_summarizer(Arc::new(summarizer), handle);
        }

        info!(
            vector = engine.vector.is_some(),
            summarizer = engine.dispatcher.is_some(),
            "Context engine ready"
        );
        Ok(engine)
    }

    pub fn with_vector_search(mut self, vector: Arc<dyn VectorSearch>) -> Self {
        self.vector = Some(vector);
        self.rebuild_assembler();
        self
    }

    /// Runtime for the blocking vector wait
    pub fn with_runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self.rebuild_assembler();
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn PropertyRenderer>) -> Self {
        self.renderer = renderer;
        self.rebuild_assembler();
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn KeywordExtractor>) -> Self {
        self.store = self.store.with_extractor(extractor);
        self
    }

    /// Send new aggregated entries to `summarizer` in the background
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>, handle: Handle) -> Self {
        self.dispatcher = Some(SummaryDispatcher::new(
            summarizer,
            handle,
            &self.config.summarizer.prompt_template,
        ));
        self.store = self.store.with_summaries(true);
        self
    }

    pub fn with_knowledge(mut self, knowledge: KnowledgeBase) -> Self {
        self.knowledge = knowledge;
        self
    }

    fn rebuild_assembler(&mut self) {
        self.assembler = build_assembler(
            &self.config,
            &self.renderer,
            self.vector.clone(),
            self.runtime.clone(),
        );
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Direct store access, e.g. for restoring saved entries
    pub fn store_mut(&mut self) -> &mut MemoryStore {
        self.assembler.cache().clear();
        &mut self.store
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    pub fn assembler(&self) -> &TurnAssembler {
        &self.assembler
    }

    /// Current game tick
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn set_tick(&mut self, tick: u64) {
        self.tick = tick;
    }

    // Turn API

    /// Rendered memories for `agent`, or `None` when nothing qualifies
    pub fn inject_memories(&self, agent: &AgentId, context: &str, max_count: usize) -> Option<String> {
        self.assembler
            .inject_memories(&self.store, agent, context, max_count, self.tick)
    }

    pub fn inject_knowledge(
        &self,
        context: &str,
        max_count: usize,
        speaker: Option<&AgentId>,
        listener: Option<&AgentId>,
    ) -> Option<String> {
        self.assembler
            .inject_knowledge(&self.knowledge, context, speaker, listener, max_count)
    }

    /// Every knowledge candidate with its score breakdown and outcome
    pub fn inject_knowledge_detailed(
        &self,
        context: &str,
        max_count: usize,
        speaker: Option<&AgentId>,
        listener: Option<&AgentId>,
    ) -> Vec<ScoredKnowledge> {
        self.assembler
            .knowledge_detailed(&self.knowledge, context, speaker, listener, max_count)
    }

    pub async fn inject_knowledge_async(
        &self,
        context: &str,
        max_count: usize,
        speaker: Option<&AgentId>,
        listener: Option<&AgentId>,
    ) -> Option<String> {
        self.assembler
            .inject_knowledge_async(&self.knowledge, context, speaker, listener, max_count)
            .await
    }

    pub async fn inject_knowledge_detailed_async(
        &self,
        context: &str,
        max_count: usize,
        speaker: Option<&AgentId>,
        listener: Option<&AgentId>,
    ) -> Vec<ScoredKnowledge> {
        self.assembler
            .knowledge_detailed_async(&self.knowledge, context, speaker, listener, max_count)
            .await
    }

    /// Assemble the full injected text for one turn
    pub fn assemble_turn(&self, request: &TurnRequest<'_>) -> TurnContext {
        self.assembler.assemble(&self.store, &self.knowledge, request)
    }

    pub async fn assemble_turn_async(&self, request: &TurnRequest<'_>) -> TurnContext {
        self.assembler
            .assemble_async(&self.store, &self.knowledge, request)
            .await
    }

    /// Turn for `agent` at the current tick with no extra sources
    pub fn assemble_simple(
        &self,
        agent: &AgentId,
        base_context: &str,
        participants: &[AgentId],
    ) -> TurnContext {
        let extra = BTreeMap::new();
        let request = TurnRequest {
            agent,
            base_context,
            speaker: Some(agent),
            listener: participants.iter().find(|p| *p != agent),
            participants,
            extra_sources: &extra,
            now: self.tick,
        };
        self.assemble_turn(&request)
    }

    pub fn classify(&self, text: &str) -> SceneClassification {
        self.assembler.classifier().classify(text)
    }

    pub fn filtered_entries(&self, agent: &AgentId, filter: &EntryFilter) -> Vec<&MemoryEntry> {
        self.store.filtered_entries(agent, filter)
    }

    pub fn stats(&self, agent: &AgentId) -> Option<Vec<TierStats>> {
        self.store.stats(agent)
    }

    // Memory mutations

    pub fn insert_memory(
        &mut self,
        agent: &AgentId,
        entry: MemoryEntry,
        tier: MemoryTier,
    ) -> ArchivalReport {
        self.assembler.cache().invalidate(agent);
        self.store.insert(agent, entry, tier)
    }

    pub fn delete_memory(&mut self, agent: &AgentId, id: Uuid) -> Result<MemoryEntry> {
        self.assembler.cache().invalidate(agent);
        self.store.delete(agent, id)
    }

    pub fn pin_memory(&mut self, agent: &AgentId, id: Uuid, pinned: bool) -> Result<()> {
        self.assembler.cache().invalidate(agent);
        self.store.pin(agent, id, pinned)
    }

    pub fn edit_memory(
        &mut self,
        agent: &AgentId,
        id: Uuid,
        content: Option<String>,
        notes: Option<String>,
    ) -> Result<()> {
        self.assembler.cache().invalidate(agent);
        self.store.edit(agent, id, content, notes)
    }

    pub fn move_memory(
        &mut self,
        agent: &AgentId,
        id: Uuid,
        target: MemoryTier,
    ) -> Result<ArchivalReport> {
        self.assembler.cache().invalidate(agent);
        self.store.move_entry(agent, id, target)
    }

    pub fn archive_batch(
        &mut self,
        agent: &AgentId,
        ids: &[Uuid],
        target: MemoryTier,
    ) -> Result<ArchivalReport> {
        self.assembler.cache().invalidate(agent);
        self.store.archive_batch(agent, ids, target)
    }

    // Knowledge mutations; these affect every agent's cached turn

    pub fn add_knowledge(&mut self, entry: KnowledgeEntry) -> Uuid {
        self.assembler.cache().clear();
        self.knowledge.add(entry)
    }

    pub fn remove_knowledge(&mut self, id: Uuid) -> Result<KnowledgeEntry> {
        self.assembler.cache().clear();
        self.knowledge.remove(id)
    }

    pub fn edit_knowledge(
        &mut self,
        id: Uuid,
        tag: Option<String>,
        content: Option<String>,
    ) -> Result<()> {
        self.assembler.cache().clear();
        self.knowledge.edit(id, tag, content)
    }

    pub fn set_knowledge_enabled(&mut self, id: Uuid, enabled: bool) -> Result<()> {
        self.assembler.cache().clear();
        self.knowledge.set_enabled(id, enabled)
    }

    // Background summaries

    /// Dispatch queued summary jobs and apply the ones that finished.
    ///
    /// Never blocks. Returns the number of summaries applied.
    pub fn pump_summaries(&mut self) -> usize {
        let Some(dispatcher) = self.dispatcher.as_mut() else {
            return 0;
        };

        dispatcher.dispatch_all(self.store.take_jobs());

        let mut applied = 0;
        for outcome in dispatcher.drain() {
            let agent = outcome.agent.clone();
            if self.store.apply_summary(outcome) {
                self.assembler.cache().invalidate(&agent);
                applied += 1;
            }
        }
        if applied > 0 {
            debug!(applied, "Applied background summaries");
        }
        applied
    }

    /// Dispatch queued jobs and wait until every in-flight summary is applied
    pub async fn flush_summaries(&mut self) -> usize {
        let Some(dispatcher) = self.dispatcher.as_mut() else {
            return 0;
        };

        dispatcher.dispatch_all(self.store.take_jobs());

        let mut applied = 0;
        while let Some(outcome) = dispatcher.next_outcome().await {
            let agent = outcome.agent.clone();
            if self.store.apply_summary(outcome) {
                self.assembler.cache().invalidate(&agent);
                applied += 1;
            }
        }
        applied
    }

    /// Summaries dispatched but not yet applied
    pub fn summaries_in_flight(&self) -> usize {
        self.dispatcher.as_ref().map_or(0, SummaryDispatcher::in_flight)
    }
}

fn build_assembler(
    config: &Config,
    renderer: &Arc<dyn PropertyRenderer>,
    vector: Option<Arc<dyn VectorSearch>>,
    runtime: Option<Handle>,
) -> TurnAssembler {
    let mut retriever = HybridRetriever::new(config.knowledge.clone(), config.vector.clone());
    if let Some(vector) = vector {
        retriever = retriever.with_vector_search(vector);
    }
    if let Some(handle) = runtime {
        retriever = retriever.with_runtime(handle);
    }
    let match_text =
        MatchTextBuilder::new(config.knowledge.match_sources.clone(), Arc::clone(renderer));
    TurnAssembler::new(config, retriever, match_text)
}

impl std::fmt::Debug for ContextEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextEngine")
            .field("store", &self.store)
            .field("knowledge", &self.knowledge.len())
            .field("assembler", &self.assembler)
            .field("dispatcher", &self.dispatcher)
            .field("tick", &self.tick)
            .finish()
    }
}
