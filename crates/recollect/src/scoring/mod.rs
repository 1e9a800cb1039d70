//! Dynamic memory scoring
//!
//! Ranks an agent's memories against the text of the current turn using the
//! weights picked by the scene classifier:
//!
//! ```text
//! total = importance_weight * importance
//!       + keyword_weight * keyword_overlap
//!       + time_decay * recency          (archive tier only)
//!       + bonus                         (tier, pin, edit, activity, relationship)
//! ```
//!
//! Active-tier entries never take part; they are rendered elsewhere as raw
//! recent history.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::config::ScoringConfig;
use crate::memory::keywords::KeywordExtractor;
use crate::memory::types::{MemoryEntry, MemoryTier};
use crate::scene::DynamicWeights;

/// Why a candidate did or did not make it into the injected text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionOutcome {
    Selected,
    LowScore,
    ConfidenceMarginRejected,
    ExceededBudget,
    ExcludedByFilter,
}

impl SelectionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionOutcome::Selected => "selected",
            SelectionOutcome::LowScore => "low_score",
            SelectionOutcome::ConfidenceMarginRejected => "margin_rejected",
            SelectionOutcome::ExceededBudget => "exceeded_budget",
            SelectionOutcome::ExcludedByFilter => "excluded",
        }
    }
}

impl std::fmt::Display for SelectionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A memory with its score breakdown
#[derive(Debug, Clone, Serialize)]
pub struct ScoredMemory {
    pub entry: MemoryEntry,
    pub total_score: f32,
    pub importance_score: f32,
    pub keyword_score: f32,
    pub time_score: f32,
    pub bonus_score: f32,
    pub outcome: SelectionOutcome,
}

/// Turn text prepared once for scoring many entries
#[derive(Debug, Clone)]
pub struct ScoringContext {
    text: String,
    keywords: BTreeSet<String>,
    now: u64,
    participants: Vec<String>,
}

impl ScoringContext {
    pub fn new(
        text: &str,
        extractor: &dyn KeywordExtractor,
        now: u64,
        participants: &[String],
    ) -> Self {
        Self {
            text: text.to_lowercase(),
            keywords: extractor.extract(text),
            now,
            participants: participants.iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    pub fn keywords(&self) -> &BTreeSet<String> {
        &self.keywords
    }

    fn involves(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.participants.iter().any(|p| *p == name)
    }
}

/// Fraction of the entry's keywords present in the context, 0.0-1.0.
///
/// A keyword counts when it is one of the context keywords or occurs as a
/// substring of the lowercased context text.
pub fn keyword_overlap(
    entry_keywords: &BTreeSet<String>,
    context_keywords: &BTreeSet<String>,
    context_text: &str,
) -> f32 {
    if entry_keywords.is_empty() {
        return 0.0;
    }
    let hits = entry_keywords
        .iter()
        .filter(|k| context_keywords.contains(*k) || context_text.contains(k.as_str()))
        .count();
    hits as f32 / entry_keywords.len() as f32
}

/// Exponential recency, 1.0 at `now` and ~0.37 one window later
pub fn time_decay(timestamp: u64, now: u64, recency_window: u64) -> f32 {
    let age = now.saturating_sub(timestamp) as f32;
    let window = recency_window.max(1) as f32;
    (-age / window).exp()
}

/// Scores memories for injection
#[derive(Debug, Clone)]
pub struct MemoryScorer {
    config: ScoringConfig,
}

impl MemoryScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    fn tier_bonus(&self, tier: MemoryTier) -> f32 {
        match tier {
            MemoryTier::Archive => self.config.archive_tier_bonus,
            MemoryTier::EventLog => self.config.event_log_tier_bonus,
            MemoryTier::Situational => self.config.situational_tier_bonus,
            MemoryTier::Active => 0.0,
        }
    }

    /// Score one entry; the outcome is provisional until ranking
    pub fn score_entry(
        &self,
        entry: &MemoryEntry,
        context: &ScoringContext,
        weights: &DynamicWeights,
    ) -> ScoredMemory {
        if !entry.tier.is_scored() {
            return ScoredMemory {
                entry: entry.clone(),
                total_score: 0.0,
                importance_score: 0.0,
                keyword_score: 0.0,
                time_score: 0.0,
                bonus_score: 0.0,
                outcome: SelectionOutcome::ExcludedByFilter,
            };
        }

        let importance_score = weights.importance_weight * entry.importance;
        let keyword_score = weights.keyword_weight
            * keyword_overlap(&entry.keywords, &context.keywords, &context.text);
        let time_score = if entry.tier == MemoryTier::Archive {
            weights.time_decay * time_decay(entry.timestamp, context.now, weights.recency_window)
        } else {
            0.0
        };

        let mut bonus_score = self.tier_bonus(entry.tier);
        if entry.is_pinned {
            bonus_score += self.config.pinned_bonus;
        }
        if entry.is_user_edited {
            bonus_score += self.config.user_edited_bonus;
        }
        bonus_score += entry.activity * self.config.activity_bonus;
        if entry
            .related_agent
            .as_deref()
            .is_some_and(|name| context.involves(name))
        {
            bonus_score += weights.relationship_bonus;
        }

        let total_score = importance_score + keyword_score + time_score + bonus_score;
        let outcome = if total_score < self.config.memory_score_threshold {
            SelectionOutcome::LowScore
        } else {
            SelectionOutcome::Selected
        };

        ScoredMemory {
            entry: entry.clone(),
            total_score,
            importance_score,
            keyword_score,
            time_score,
            bonus_score,
            outcome,
        }
    }

    /// Score and rank entries, marking everything past `budget` as over budget.
    ///
    /// Returns every candidate, best first, so callers can show why an entry
    /// was left out.
    pub fn rank<'a>(
        &self,
        entries: impl IntoIterator<Item = &'a MemoryEntry>,
        context: &ScoringContext,
        weights: &DynamicWeights,
        budget: usize,
    ) -> Vec<ScoredMemory> {
        let mut scored: Vec<ScoredMemory> = entries
            .into_iter()
            .map(|e| self.score_entry(e, context, weights))
            .collect();

        scored.sort_by(|a, b| {
            b.total_score
                .total_cmp(&a.total_score)
                .then_with(|| b.entry.timestamp.cmp(&a.entry.timestamp))
                .then_with(|| a.entry.id.cmp(&b.entry.id))
        });

        let mut accepted = 0;
        for candidate in scored.iter_mut() {
            if candidate.outcome != SelectionOutcome::Selected {
                continue;
            }
            if accepted < budget {
                accepted += 1;
            } else {
                candidate.outcome = SelectionOutcome::ExceededBudget;
            }
        }

        scored
    }
}

/// Selected candidates only, in rank order
pub fn selected(ranked: &[ScoredMemory]) -> Vec<&ScoredMemory> {
    ranked
        .iter()
        .filter(|c| c.outcome == SelectionOutcome::Selected)
        .collect()
}
