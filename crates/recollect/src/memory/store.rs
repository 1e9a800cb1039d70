//! Tiered per-agent memory store
//!
//! Each agent owns four newest-first tiers. Every mutation runs to
//! completion under `&mut self`, including the overflow cascade, so callers
//! never observe a tier above capacity unless only protected entries remain.

use std::collections::{HashMap, VecDeque};
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::MemoryConfig;
use crate::error::{RecollectError, Result};
use crate::memory::agent::AgentId;
use crate::memory::archive::{
    ArchivalPhase, aggregate_group, batch_hash, group_by_kind, insert_ordered,
    overflow_batch_size, select_oldest_unprotected,
};
use crate::memory::filter::EntryFilter;
use crate::memory::keywords::{KeywordExtractor, SimpleKeywordExtractor};
use crate::memory::types::{
    MemoryEntry, MemoryTier, TAG_SUMMARY_EXTERNAL, TAG_SUMMARY_PENDING, TAG_SUMMARY_SIMPLE,
};
use crate::summarizer::types::{SummaryJob, SummaryOutcome};

/// The four tiers of one agent
#[derive(Debug, Clone, Default)]
pub struct AgentMemory {
    tiers: [VecDeque<MemoryEntry>; 4],
}

impl AgentMemory {
    /// Entries of a tier, newest first
    pub fn tier(&self, tier: MemoryTier) -> &VecDeque<MemoryEntry> {
        &self.tiers[tier.index()]
    }

    fn tier_mut(&mut self, tier: MemoryTier) -> &mut VecDeque<MemoryEntry> {
        &mut self.tiers[tier.index()]
    }

    pub fn len(&self, tier: MemoryTier) -> usize {
        self.tiers[tier.index()].len()
    }

    pub fn total(&self) -> usize {
        self.tiers.iter().map(VecDeque::len).sum()
    }

    /// All entries, tier by tier, newest first within a tier
    pub fn iter(&self) -> impl Iterator<Item = &MemoryEntry> {
        self.tiers.iter().flat_map(|t| t.iter())
    }

    /// Entries eligible for scoring-based injection
    pub fn scored_entries(&self) -> impl Iterator<Item = &MemoryEntry> {
        MemoryTier::ALL
            .into_iter()
            .filter(MemoryTier::is_scored)
            .flat_map(move |t| self.tier(t).iter())
    }

    pub fn get(&self, id: Uuid) -> Option<&MemoryEntry> {
        self.iter().find(|e| e.id == id)
    }

    fn locate(&self, id: Uuid) -> Option<(MemoryTier, usize)> {
        MemoryTier::ALL.into_iter().find_map(|tier| {
            self.tier(tier)
                .iter()
                .position(|e| e.id == id)
                .map(|idx| (tier, idx))
        })
    }

    fn get_mut(&mut self, id: Uuid) -> Option<&mut MemoryEntry> {
        self.tiers
            .iter_mut()
            .flat_map(|t| t.iter_mut())
            .find(|e| e.id == id)
    }

    fn remove(&mut self, id: Uuid) -> Option<MemoryEntry> {
        let (tier, idx) = self.locate(id)?;
        self.tier_mut(tier).remove(idx)
    }
}

/// What a mutation did to the tiers
#[derive(Debug, Clone, Default)]
pub struct ArchivalReport {
    /// State transitions in the order they happened
    pub phases: Vec<ArchivalPhase>,
    /// Ids of entries fed into aggregation
    pub consumed: Vec<Uuid>,
    /// Ids of aggregated entries created
    pub created: Vec<Uuid>,
    /// Ids of entries removed by archive eviction
    pub evicted: Vec<Uuid>,
}

impl ArchivalReport {
    /// Whether the mutation caused any archival work
    pub fn is_empty(&self) -> bool {
        self.consumed.is_empty() && self.evicted.is_empty()
    }
}

/// Size of a tier next to its limit
#[derive(Debug, Clone, PartialEq)]
pub struct TierStats {
    pub tier: MemoryTier,
    pub len: usize,
    pub capacity: usize,
    pub pinned: usize,
    pub edited: usize,
    pub pending_summaries: usize,
}

#[derive(Debug, Clone)]
struct PendingSummary {
    agent: AgentId,
    entry_id: Uuid,
}

/// Per-agent tiered memory with archival
pub struct MemoryStore {
    config: MemoryConfig,
    agents: HashMap<AgentId, AgentMemory>,
    extractor: Arc<dyn KeywordExtractor>,
    summaries_enabled: bool,
    queued_jobs: Vec<SummaryJob>,
    pending: LruCache<u64, PendingSummary>,
}

impl MemoryStore {
    pub fn new(config: MemoryConfig) -> Self {
        let cap = NonZeroUsize::new(config.max_pending_summaries).unwrap_or(NonZeroUsize::MIN);
        Self {
            config,
            agents: HashMap::new(),
            extractor: Arc::new(SimpleKeywordExtractor::default()),
            summaries_enabled: false,
            queued_jobs: Vec::new(),
            pending: LruCache::new(cap),
        }
    }

    /// Use a host-provided keyword extractor
    pub fn with_extractor(mut self, extractor: Arc<dyn KeywordExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Queue background summary jobs for new aggregated entries
    pub fn with_summaries(mut self, enabled: bool) -> Self {
        self.summaries_enabled = enabled;
        self
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn capacity(&self, tier: MemoryTier) -> usize {
        self.config.capacity(tier)
    }

    pub fn extractor(&self) -> &Arc<dyn KeywordExtractor> {
        &self.extractor
    }

    /// Attach an empty store to an agent; no-op if one exists
    pub fn register_agent(&mut self, agent: &AgentId) {
        self.agents.entry(agent.clone()).or_default();
    }

    pub fn has_agent(&self, agent: &AgentId) -> bool {
        self.agents.contains_key(agent)
    }

    pub fn agent(&self, agent: &AgentId) -> Option<&AgentMemory> {
        self.agents.get(agent)
    }

    /// Registered agents in id order
    pub fn agent_ids(&self) -> Vec<&AgentId> {
        let mut ids: Vec<&AgentId> = self.agents.keys().collect();
        ids.sort();
        ids
    }

    pub fn remove_agent(&mut self, agent: &AgentId) -> Option<AgentMemory> {
        self.agents.remove(agent)
    }

    /// Find which agent owns an entry
    pub fn owner_of(&self, id: Uuid) -> Option<&AgentId> {
        self.agents
            .iter()
            .find(|(_, memory)| memory.get(id).is_some())
            .map(|(agent, _)| agent)
    }

    /// Insert an entry into a tier and settle any overflow it causes.
    ///
    /// Keywords are extracted from the content when the entry has none.
    pub fn insert(
        &mut self,
        agent: &AgentId,
        mut entry: MemoryEntry,
        tier: MemoryTier,
    ) -> ArchivalReport {
        entry.tier = tier;
        if entry.keywords.is_empty() {
            entry.keywords = self.extractor.extract(&entry.content);
        }

        let memory = self.agents.entry(agent.clone()).or_default();
        insert_ordered(memory.tier_mut(tier), entry);

        let mut report = ArchivalReport::default();
        self.settle(agent, tier, &mut report);
        report
    }

    /// Restore an entry as-is, without extraction or overflow handling.
    ///
    /// Used when loading a saved store, whose tiers were already settled.
    pub fn restore(&mut self, agent: &AgentId, entry: MemoryEntry) {
        let memory = self.agents.entry(agent.clone()).or_default();
        let tier = entry.tier;
        insert_ordered(memory.tier_mut(tier), entry);
    }

    pub fn delete(&mut self, agent: &AgentId, id: Uuid) -> Result<MemoryEntry> {
        let memory = self.memory_mut(agent)?;
        let removed = memory.remove(id).ok_or(RecollectError::NotFound(id))?;
        debug!(agent = %agent, entry_id = %id, "Deleted memory entry");
        Ok(removed)
    }

    pub fn pin(&mut self, agent: &AgentId, id: Uuid, pinned: bool) -> Result<()> {
        let entry = self.entry_mut(agent, id)?;
        entry.is_pinned = pinned;
        debug!(agent = %agent, entry_id = %id, pinned, "Updated pin");
        Ok(())
    }

    /// Operator edit; always marks the entry as user-edited
    pub fn edit(
        &mut self,
        agent: &AgentId,
        id: Uuid,
        content: Option<String>,
        notes: Option<String>,
    ) -> Result<()> {
        let extractor = Arc::clone(&self.extractor);
        let entry = self.entry_mut(agent, id)?;

        if let Some(content) = content {
            entry.keywords = extractor.extract(&content);
            entry.content = content;
        }
        if notes.is_some() {
            entry.notes = notes;
        }
        entry.is_user_edited = true;

        debug!(agent = %agent, entry_id = %id, "Edited memory entry");
        Ok(())
    }

    /// Move a single entry to another tier unchanged, then settle overflow
    pub fn move_entry(
        &mut self,
        agent: &AgentId,
        id: Uuid,
        target: MemoryTier,
    ) -> Result<ArchivalReport> {
        let memory = self.memory_mut(agent)?;
        let mut entry = memory.remove(id).ok_or(RecollectError::NotFound(id))?;
        entry.tier = target;
        insert_ordered(memory.tier_mut(target), entry);

        let mut report = ArchivalReport::default();
        self.settle(agent, target, &mut report);
        Ok(report)
    }

    /// Manually archive a batch into `target`, bypassing the capacity trigger.
    ///
    /// Every entry must sit in a tier whose archival target is `target`, and
    /// none may be pinned or user-edited. The target still has its capacity
    /// enforced afterwards.
    pub fn archive_batch(
        &mut self,
        agent: &AgentId,
        ids: &[Uuid],
        target: MemoryTier,
    ) -> Result<ArchivalReport> {
        if ids.is_empty() {
            return Err(RecollectError::InvalidOperation(
                "nothing selected to archive".to_string(),
            ));
        }

        let memory = self.memory_mut(agent)?;
        for id in ids {
            let entry = memory.get(*id).ok_or(RecollectError::NotFound(*id))?;
            if entry.is_protected() {
                return Err(RecollectError::InvalidOperation(format!(
                    "entry {id} is pinned or user-edited"
                )));
            }
            if entry.tier.archival_target() != Some(target) {
                return Err(RecollectError::InvalidOperation(format!(
                    "cannot archive {} entry {id} into {target}",
                    entry.tier
                )));
            }
        }

        let batch: Vec<MemoryEntry> = ids.iter().filter_map(|id| memory.remove(*id)).collect();

        let mut report = ArchivalReport::default();
        self.aggregate_into(agent, batch, target, &mut report);
        self.settle(agent, target, &mut report);

        info!(
            agent = %agent,
            consumed = report.consumed.len(),
            created = report.created.len(),
            target = %target,
            "Manually archived batch"
        );
        Ok(report)
    }

    /// Entries passing `filter`, tier by tier, newest first
    pub fn filtered_entries(&self, agent: &AgentId, filter: &EntryFilter) -> Vec<&MemoryEntry> {
        match self.agents.get(agent) {
            Some(memory) => memory.iter().filter(|e| filter.matches(e)).collect(),
            None => Vec::new(),
        }
    }

    pub fn stats(&self, agent: &AgentId) -> Option<Vec<TierStats>> {
        let memory = self.agents.get(agent)?;
        Some(
            MemoryTier::ALL
                .into_iter()
                .map(|tier| {
                    let entries = memory.tier(tier);
                    TierStats {
                        tier,
                        len: entries.len(),
                        capacity: self.capacity(tier),
                        pinned: entries.iter().filter(|e| e.is_pinned).count(),
                        edited: entries.iter().filter(|e| e.is_user_edited).count(),
                        pending_summaries: entries
                            .iter()
                            .filter(|e| e.is_summary_pending())
                            .count(),
                    }
                })
                .collect(),
        )
    }

    /// Take the summary jobs queued since the last call
    pub fn take_jobs(&mut self) -> Vec<SummaryJob> {
        std::mem::take(&mut self.queued_jobs)
    }

    pub fn pending_summaries(&self) -> usize {
        self.pending.len()
    }

    /// Apply a finished background summary.
    ///
    /// Returns `true` when the placeholder was rewritten. Outcomes for
    /// entries that were deleted or edited in the meantime are dropped.
    pub fn apply_summary(&mut self, outcome: SummaryOutcome) -> bool {
        let Some(pending) = self.pending.pop(&outcome.batch_hash) else {
            debug!(
                batch_hash = outcome.batch_hash,
                "No pending summary for batch, ignoring"
            );
            return false;
        };

        let extractor = Arc::clone(&self.extractor);
        let Some(entry) = self
            .agents
            .get_mut(&pending.agent)
            .and_then(|m| m.get_mut(pending.entry_id))
        else {
            debug!(
                agent = %pending.agent,
                entry_id = %pending.entry_id,
                "Summary target no longer exists"
            );
            return false;
        };

        entry.tags.remove(TAG_SUMMARY_PENDING);

        if entry.is_user_edited {
            entry.tags.insert(TAG_SUMMARY_SIMPLE.to_string());
            debug!(entry_id = %entry.id, "Entry edited before summary arrived, keeping edit");
            return false;
        }

        match outcome.result {
            Ok(summary) => {
                entry.keywords.extend(extractor.extract(&summary));
                entry.content = summary;
                entry.tags.insert(TAG_SUMMARY_EXTERNAL.to_string());
                debug!(agent = %pending.agent, entry_id = %entry.id, "Applied external summary");
                true
            }
            Err(e) => {
                let err: RecollectError = e.into();
                warn!(
                    agent = %pending.agent,
                    entry_id = %entry.id,
                    error = %err,
                    "Keeping simple summary"
                );
                entry.tags.insert(TAG_SUMMARY_SIMPLE.to_string());
                false
            }
        }
    }

    fn memory_mut(&mut self, agent: &AgentId) -> Result<&mut AgentMemory> {
        self.agents
            .get_mut(agent)
            .ok_or_else(|| RecollectError::MissingComponent(agent.to_string()))
    }

    fn entry_mut(&mut self, agent: &AgentId, id: Uuid) -> Result<&mut MemoryEntry> {
        self.memory_mut(agent)?
            .get_mut(id)
            .ok_or(RecollectError::NotFound(id))
    }

    /// Drive the overflow state machine from `tier` down the cascade
    fn settle(&mut self, agent: &AgentId, tier: MemoryTier, report: &mut ArchivalReport) {
        let mut next = Some(tier);
        while let Some(tier) = next {
            next = self.step(agent, tier, report);
        }
    }

    /// One pass over a tier; returns the tier that received entries
    fn step(
        &mut self,
        agent: &AgentId,
        tier: MemoryTier,
        report: &mut ArchivalReport,
    ) -> Option<MemoryTier> {
        let capacity = self.capacity(tier);
        let fraction = self.config.archive_fraction;
        let memory = self.agents.get_mut(agent)?;
        let entries = memory.tier_mut(tier);
        let size = entries.len();

        let wanted = overflow_batch_size(size, capacity, fraction);
        if wanted == 0 {
            report.phases.push(ArchivalPhase::Normal { tier });
            return None;
        }

        let mut selected = select_oldest_unprotected(entries, wanted);
        report.phases.push(ArchivalPhase::OverflowDetected {
            tier,
            size,
            capacity,
            selected: selected.len(),
        });

        if selected.is_empty() {
            warn!(
                agent = %agent,
                tier = %tier,
                size,
                capacity,
                "Tier over capacity but every entry is protected"
            );
            return None;
        }

        selected.sort_unstable_by(|a, b| b.cmp(a));
        let batch: Vec<MemoryEntry> = selected
            .into_iter()
            .filter_map(|idx| entries.remove(idx))
            .collect();

        match tier.archival_target() {
            Some(target) => {
                self.aggregate_into(agent, batch, target, report);
                Some(target)
            }
            None => {
                let ids: Vec<Uuid> = batch.iter().map(|e| e.id).collect();
                for id in &ids {
                    self.forget_pending(*id);
                }
                debug!(agent = %agent, evicted = ids.len(), "Evicted archive overflow");
                report.evicted.extend(ids.iter().copied());
                report.phases.push(ArchivalPhase::Evicted { tier, ids });
                None
            }
        }
    }

    /// Aggregate a batch by kind into `target`
    fn aggregate_into(
        &mut self,
        agent: &AgentId,
        batch: Vec<MemoryEntry>,
        target: MemoryTier,
        report: &mut ArchivalReport,
    ) {
        let source = batch.first().map(|e| e.tier).unwrap_or(MemoryTier::Active);
        report.consumed.extend(batch.iter().map(|e| e.id));
        for entry in &batch {
            self.forget_pending(entry.id);
        }

        let groups = group_by_kind(batch);
        report.phases.push(ArchivalPhase::Aggregating {
            tier: source,
            target,
            groups: groups.len(),
        });

        let mut ids = Vec::with_capacity(groups.len());
        for (kind, group) in groups {
            let aggregated = aggregate_group(
                kind,
                &group,
                target,
                self.config.archive_importance_bonus,
                self.summaries_enabled,
            );

            if self.summaries_enabled {
                let job = SummaryJob {
                    agent: agent.clone(),
                    entry_id: aggregated.id,
                    batch_hash: batch_hash(agent.as_str(), kind, &group),
                    kind,
                    tier: target,
                    contents: group.iter().map(|e| e.content.clone()).collect(),
                };
                self.track_pending(&job);
                self.queued_jobs.push(job);
            }

            ids.push(aggregated.id);
            if let Some(memory) = self.agents.get_mut(agent) {
                insert_ordered(memory.tier_mut(target), aggregated);
            }
        }

        debug!(
            agent = %agent,
            from = %source,
            to = %target,
            created = ids.len(),
            "Archived overflow"
        );
        report.created.extend(ids.iter().copied());
        report.phases.push(ArchivalPhase::Inserted { target, ids });
    }

    fn track_pending(&mut self, job: &SummaryJob) {
        let pending = PendingSummary {
            agent: job.agent.clone(),
            entry_id: job.entry_id,
        };
        if let Some((hash, dropped)) = self.pending.push(job.batch_hash, pending) {
            if hash != job.batch_hash {
                warn!(
                    entry_id = %dropped.entry_id,
                    "Too many pending summaries, keeping simple summary"
                );
                self.queued_jobs.retain(|j| j.batch_hash != hash);
                if let Some(entry) = self
                    .agents
                    .get_mut(&dropped.agent)
                    .and_then(|m| m.get_mut(dropped.entry_id))
                {
                    entry.tags.remove(TAG_SUMMARY_PENDING);
                    entry.tags.insert(TAG_SUMMARY_SIMPLE.to_string());
                }
            }
        }
    }

    /// Drop the pending registration of an entry consumed by archival
    fn forget_pending(&mut self, entry_id: Uuid) {
        let hash = self
            .pending
            .iter()
            .find(|(_, p)| p.entry_id == entry_id)
            .map(|(hash, _)| *hash);
        if let Some(hash) = hash {
            self.pending.pop(&hash);
            self.queued_jobs.retain(|j| j.batch_hash != hash);
        }
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("agents", &self.agents.len())
            .field("summaries_enabled", &self.summaries_enabled)
            .field("pending", &self.pending.len())
            .finish()
    }
}
