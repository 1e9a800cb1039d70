//! Knowledge base and keyword matching

use tracing::debug;
use uuid::Uuid;

use crate::config::KnowledgeConfig;
use crate::error::{RecollectError, Result};
use crate::knowledge::types::{KnowledgeEntry, MatchKind, ScoredKnowledge};
use crate::memory::agent::AgentId;
use crate::scoring::SelectionOutcome;

/// Global collection of knowledge entries, kept in insertion order
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    entries: Vec<KnowledgeEntry>,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<KnowledgeEntry>) -> Self {
        Self { entries }
    }

    pub fn add(&mut self, entry: KnowledgeEntry) -> Uuid {
        let id = entry.id;
        self.entries.push(entry);
        id
    }

    pub fn get(&self, id: Uuid) -> Option<&KnowledgeEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut KnowledgeEntry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    pub fn remove(&mut self, id: Uuid) -> Result<KnowledgeEntry> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or(RecollectError::NotFound(id))?;
        Ok(self.entries.remove(idx))
    }

    pub fn set_enabled(&mut self, id: Uuid, enabled: bool) -> Result<()> {
        let entry = self.get_mut(id).ok_or(RecollectError::NotFound(id))?;
        entry.is_enabled = enabled;
        Ok(())
    }

    /// Operator edit; marks the entry as user-edited
    pub fn edit(&mut self, id: Uuid, tag: Option<String>, content: Option<String>) -> Result<()> {
        let entry = self.get_mut(id).ok_or(RecollectError::NotFound(id))?;
        if let Some(tag) = tag {
            entry.tag = tag;
        }
        if let Some(content) = content {
            entry.content = content;
        }
        entry.is_user_edited = true;
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &KnowledgeEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry usable by `speaker`/`listener`, if it exists and is retrievable
    pub fn retrievable(
        &self,
        id: Uuid,
        speaker: Option<&AgentId>,
        listener: Option<&AgentId>,
    ) -> Option<&KnowledgeEntry> {
        self.get(id)
            .filter(|e| e.is_retrievable() && e.is_visible_to(speaker, listener))
    }

    /// Keyword channel: every entry whose tag matches `text`.
    ///
    /// Disabled, unmatchable and invisible entries are reported as
    /// `ExcludedByFilter` with a zero score. Outcomes of the matches are
    /// provisional until [`finalize_selection`] runs.
    pub fn keyword_candidates(
        &self,
        text: &str,
        speaker: Option<&AgentId>,
        listener: Option<&AgentId>,
        config: &KnowledgeConfig,
    ) -> Vec<ScoredKnowledge> {
        let text_lower = text.to_lowercase();
        let mut candidates = Vec::new();

        for entry in &self.entries {
            if !entry.matches_text(&text_lower) {
                continue;
            }

            if !entry.is_retrievable() || !entry.is_visible_to(speaker, listener) {
                candidates.push(ScoredKnowledge {
                    entry: entry.clone(),
                    total_score: 0.0,
                    base_score: 0.0,
                    match_type_score: 0.0,
                    match_kind: MatchKind::Keyword,
                    similarity: None,
                    outcome: SelectionOutcome::ExcludedByFilter,
                });
                continue;
            }

            let base_score = entry.importance;
            let match_type_score = config.keyword_match_bonus;
            let total_score = base_score + match_type_score;
            let outcome = if total_score < config.knowledge_score_threshold {
                SelectionOutcome::LowScore
            } else {
                SelectionOutcome::Selected
            };

            candidates.push(ScoredKnowledge {
                entry: entry.clone(),
                total_score,
                base_score,
                match_type_score,
                match_kind: MatchKind::Keyword,
                similarity: None,
                outcome,
            });
        }

        debug!(
            entries = self.entries.len(),
            matched = candidates.len(),
            "Keyword matching complete"
        );
        candidates
    }

    /// Keyword-only retrieval, sorted and cut to `budget`
    pub fn match_keywords(
        &self,
        text: &str,
        speaker: Option<&AgentId>,
        listener: Option<&AgentId>,
        config: &KnowledgeConfig,
        budget: usize,
    ) -> Vec<ScoredKnowledge> {
        let mut candidates = self.keyword_candidates(text, speaker, listener, config);
        finalize_selection(&mut candidates, budget, config.confidence_margin);
        candidates
    }
}

/// Sort candidates best first and settle their outcomes.
///
/// At most `budget` candidates stay `Selected`; the rest become
/// `ExceededBudget`. When the last accepted candidate is within `margin`
/// of the first one cut by the budget, trailing accepted candidates within
/// that margin are dropped as `ConfidenceMarginRejected`. The best
/// candidate is always kept. The sort is stable, so equal scores keep their
/// input order and the result is deterministic.
pub fn finalize_selection(candidates: &mut [ScoredKnowledge], budget: usize, margin: f32) {
    candidates.sort_by(|a, b| {
        rank_key(b.outcome)
            .cmp(&rank_key(a.outcome))
            .then_with(|| b.total_score.total_cmp(&a.total_score))
    });

    let eligible: Vec<usize> = candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| c.outcome == SelectionOutcome::Selected)
        .map(|(i, _)| i)
        .collect();

    if eligible.len() <= budget {
        return;
    }

    for &idx in &eligible[budget..] {
        candidates[idx].outcome = SelectionOutcome::ExceededBudget;
    }

    if budget == 0 {
        return;
    }

    let first_rejected = candidates[eligible[budget]].total_score;
    for &idx in eligible[1..budget].iter().rev() {
        if candidates[idx].total_score - first_rejected < margin {
            candidates[idx].outcome = SelectionOutcome::ConfidenceMarginRejected;
        } else {
            break;
        }
    }
}

/// Selected first, then scored-but-rejected, then filtered out
fn rank_key(outcome: SelectionOutcome) -> u8 {
    match outcome {
        SelectionOutcome::Selected
        | SelectionOutcome::ConfidenceMarginRejected
        | SelectionOutcome::ExceededBudget => 2,
        SelectionOutcome::LowScore => 1,
        SelectionOutcome::ExcludedByFilter => 0,
    }
}

/// Selected entries, best first
pub fn selected_entries(candidates: &[ScoredKnowledge]) -> Vec<&ScoredKnowledge> {
    candidates.iter().filter(|c| c.is_selected()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::types::MatchMode;

    fn config() -> KnowledgeConfig {
        KnowledgeConfig::default()
    }

    fn ids(candidates: &[ScoredKnowledge]) -> Vec<Uuid> {
        selected_entries(candidates).iter().map(|c| c.id()).collect()
    }

    #[test]
    fn test_crud() {
        let mut kb = KnowledgeBase::new();
        let id = kb.add(KnowledgeEntry::new("fire", "Fire spreads fast"));
        assert_eq!(kb.len(), 1);

        kb.set_enabled(id, false).unwrap();
        assert!(!kb.get(id).unwrap().is_enabled);

        kb.edit(id, None, Some("Fire spreads very fast".into())).unwrap();
        assert!(kb.get(id).unwrap().is_user_edited);

        kb.remove(id).unwrap();
        assert!(kb.is_empty());
        assert!(matches!(kb.remove(id), Err(RecollectError::NotFound(_))));
    }

    #[test]
    fn test_all_mode_scenario() {
        let mut kb = KnowledgeBase::new();
        kb.add(KnowledgeEntry::new("fire,raid", "Raiders burn crops").with_match_mode(MatchMode::All));

        assert!(ids(&kb.match_keywords("there is a fire", None, None, &config(), 6)).is_empty());
        assert_eq!(
            ids(&kb.match_keywords("fire during the raid", None, None, &config(), 6)).len(),
            1
        );
    }

    #[test]
    fn test_filtered_entries_never_selected() {
        let alice = AgentId::try_from("alice").unwrap();
        let bob = AgentId::try_from("bob").unwrap();
        let mut kb = KnowledgeBase::new();
        kb.add(KnowledgeEntry::new("fire", "disabled").disabled());
        kb.add(KnowledgeEntry::new("fire", "unmatchable").unmatchable());
        let secret = kb.add(KnowledgeEntry::new("fire", "alice only").exclusive_to(alice.clone()));

        let result = kb.match_keywords("fire", Some(&bob), None, &config(), 6);
        assert!(ids(&result).is_empty());
        assert!(result
            .iter()
            .all(|c| c.outcome == SelectionOutcome::ExcludedByFilter));

        let result = kb.match_keywords("fire", Some(&bob), Some(&alice), &config(), 6);
        assert_eq!(ids(&result), vec![secret]);
    }

    #[test]
    fn test_threshold() {
        let mut kb = KnowledgeBase::new();
        kb.add(KnowledgeEntry::new("fire", "x").with_importance(-0.45));
        let result = kb.match_keywords("fire", None, None, &config(), 6);
        assert_eq!(result[0].outcome, SelectionOutcome::LowScore);
    }

    #[test]
    fn test_sorted_by_score_and_budget() {
        let mut kb = KnowledgeBase::new();
        let low = kb.add(KnowledgeEntry::new("fire", "low").with_importance(0.1));
        let high = kb.add(KnowledgeEntry::new("fire", "high").with_importance(0.9));
        let mid = kb.add(KnowledgeEntry::new("fire", "mid").with_importance(0.5));

        let result = kb.match_keywords("fire", None, None, &config(), 2);
        assert_eq!(ids(&result), vec![high, mid]);
        let dropped = result.iter().find(|c| c.id() == low).unwrap();
        assert_eq!(dropped.outcome, SelectionOutcome::ExceededBudget);
    }

    #[test]
    fn test_confidence_margin_drops_near_ties() {
        let mut kb = KnowledgeBase::new();
        let best = kb.add(KnowledgeEntry::new("fire", "best").with_importance(0.9));
        let tied_a = kb.add(KnowledgeEntry::new("fire", "a").with_importance(0.5));
        kb.add(KnowledgeEntry::new("fire", "b").with_importance(0.49));

        let result = kb.match_keywords("fire", None, None, &config(), 2);

        assert_eq!(ids(&result), vec![best]);
        let rejected = result.iter().find(|c| c.id() == tied_a).unwrap();
        assert_eq!(rejected.outcome, SelectionOutcome::ConfidenceMarginRejected);
    }

    #[test]
    fn test_margin_never_drops_best() {
        let mut kb = KnowledgeBase::new();
        kb.add(KnowledgeEntry::new("fire", "a"));
        kb.add(KnowledgeEntry::new("fire", "b"));

        let result = kb.match_keywords("fire", None, None, &config(), 1);
        assert_eq!(ids(&result).len(), 1);
    }

    #[test]
    fn test_idempotent() {
        let mut kb = KnowledgeBase::new();
        for i in 0..10 {
            kb.add(KnowledgeEntry::new("fire|raid", format!("fact {i}")).with_importance(0.5));
        }

        let first = ids(&kb.match_keywords("raid", None, None, &config(), 4));
        let second = ids(&kb.match_keywords("raid", None, None, &config(), 4));
        assert_eq!(first, second);
    }
}
