//! Knowledge entry model
//!
//! Knowledge entries are shared facts about the world, independent of any
//! single agent's memory. Each carries a tag holding one or more match
//! keywords separated by `,` `，` `|` `;` or `/`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::memory::agent::AgentId;
use crate::scoring::SelectionOutcome;

const TAG_SEPARATORS: &[char] = &[',', '，', '|', ';', '/'];

/// Who may receive an entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityScope {
    #[default]
    Global,
    /// Only injected when this agent is the speaker or the listener
    Exclusive(AgentId),
}

/// How tag keywords must appear in the match text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// At least one keyword
    #[default]
    Any,
    /// Every keyword
    All,
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchMode::Any => f.write_str("any"),
            MatchMode::All => f.write_str("all"),
        }
    }
}

impl FromStr for MatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "any" => Ok(MatchMode::Any),
            "all" => Ok(MatchMode::All),
            _ => Err(format!("Unknown match mode: {s}. Use any or all.")),
        }
    }
}

/// A shared, tag-matched fact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: Uuid,
    /// One or more match keywords
    pub tag: String,
    pub content: String,
    pub importance: f32,
    #[serde(default = "default_true")]
    pub is_enabled: bool,
    #[serde(default)]
    pub visibility: VisibilityScope,
    #[serde(default)]
    pub match_mode: MatchMode,
    #[serde(default)]
    pub is_user_edited: bool,
    /// Automated processes may harvest facts into this entry
    #[serde(default = "default_true")]
    pub can_be_extracted: bool,
    /// Entry takes part in retrieval at all
    #[serde(default = "default_true")]
    pub can_be_matched: bool,
}

fn default_true() -> bool {
    true
}

impl KnowledgeEntry {
    pub fn new(tag: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tag: tag.into(),
            content: content.into(),
            importance: 0.5,
            is_enabled: true,
            visibility: VisibilityScope::Global,
            match_mode: MatchMode::Any,
            is_user_edited: false,
            can_be_extracted: true,
            can_be_matched: true,
        }
    }

    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = importance;
        self
    }

    pub fn with_match_mode(mut self, mode: MatchMode) -> Self {
        self.match_mode = mode;
        self
    }

    pub fn exclusive_to(mut self, agent: AgentId) -> Self {
        self.visibility = VisibilityScope::Exclusive(agent);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.is_enabled = false;
        self
    }

    pub fn unmatchable(mut self) -> Self {
        self.can_be_matched = false;
        self
    }

    /// Lowercased, deduplicated tag keywords in tag order
    pub fn keywords(&self) -> Vec<String> {
        let mut keywords: Vec<String> = Vec::new();
        for part in self.tag.split(TAG_SEPARATORS) {
            let keyword = part.trim().to_lowercase();
            if !keyword.is_empty() && !keywords.contains(&keyword) {
                keywords.push(keyword);
            }
        }
        keywords
    }

    /// Enabled and allowed to take part in matching
    pub fn is_retrievable(&self) -> bool {
        self.is_enabled && self.can_be_matched
    }

    pub fn is_visible_to(&self, speaker: Option<&AgentId>, listener: Option<&AgentId>) -> bool {
        match &self.visibility {
            VisibilityScope::Global => true,
            VisibilityScope::Exclusive(owner) => {
                speaker == Some(owner) || listener == Some(owner)
            }
        }
    }

    /// Keyword test against already-lowercased match text
    pub fn matches_text(&self, text_lower: &str) -> bool {
        let keywords = self.keywords();
        if keywords.is_empty() {
            return false;
        }
        match self.match_mode {
            MatchMode::Any => keywords.iter().any(|k| text_lower.contains(k.as_str())),
            MatchMode::All => keywords.iter().all(|k| text_lower.contains(k.as_str())),
        }
    }
}

/// Which retrieval channel produced a knowledge candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Keyword,
    Vector,
    /// Found by both channels with scores merged
    Mixed,
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchKind::Keyword => f.write_str("keyword"),
            MatchKind::Vector => f.write_str("vector"),
            MatchKind::Mixed => f.write_str("mixed"),
        }
    }
}

/// A knowledge entry with its score breakdown
#[derive(Debug, Clone, Serialize)]
pub struct ScoredKnowledge {
    pub entry: KnowledgeEntry,
    pub total_score: f32,
    /// The entry's importance
    pub base_score: f32,
    /// Keyword bonus and/or weighted similarity
    pub match_type_score: f32,
    pub match_kind: MatchKind,
    /// Similarity reported by the vector channel, if it saw the entry
    pub similarity: Option<f32>,
    pub outcome: SelectionOutcome,
}

impl ScoredKnowledge {
    pub fn id(&self) -> Uuid {
        self.entry.id
    }

    pub fn is_selected(&self) -> bool {
        self.outcome == SelectionOutcome::Selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(id: &str) -> AgentId {
        AgentId::try_from(id).unwrap()
    }

    #[test]
    fn test_keywords_split_on_all_separators() {
        let entry = KnowledgeEntry::new("Fire, RAID|mortar;siege/ambush，Fire", "x");
        assert_eq!(
            entry.keywords(),
            vec!["fire", "raid", "mortar", "siege", "ambush"]
        );
    }

    #[test]
    fn test_match_all_requires_every_keyword() {
        let entry = KnowledgeEntry::new("fire,raid", "x").with_match_mode(MatchMode::All);
        assert!(!entry.matches_text("the fire spread"));
        assert!(entry.matches_text("the raid started a fire"));
    }

    #[test]
    fn test_match_any_is_substring() {
        let entry = KnowledgeEntry::new("fire,raid", "x");
        assert!(entry.matches_text("a wildfire"));
        assert!(!entry.matches_text("quiet night"));
    }

    #[test]
    fn test_empty_tag_never_matches() {
        let entry = KnowledgeEntry::new(" , ", "x");
        assert!(!entry.matches_text("anything"));
    }

    #[test]
    fn test_visibility() {
        let alice = agent("alice");
        let bob = agent("bob");
        let entry = KnowledgeEntry::new("x", "y").exclusive_to(alice.clone());

        assert!(entry.is_visible_to(Some(&alice), None));
        assert!(entry.is_visible_to(Some(&bob), Some(&alice)));
        assert!(!entry.is_visible_to(Some(&bob), None));
        assert!(KnowledgeEntry::new("x", "y").is_visible_to(None, None));
    }

    #[test]
    fn test_retrievable_flags() {
        assert!(KnowledgeEntry::new("x", "y").is_retrievable());
        assert!(!KnowledgeEntry::new("x", "y").disabled().is_retrievable());
        assert!(!KnowledgeEntry::new("x", "y").unmatchable().is_retrievable());
    }

    #[test]
    fn test_entry_deserializes_with_defaults() {
        let json = format!(
            r#"{{"id":"{}","tag":"fire","content":"Fire spreads fast","importance":0.7}}"#,
            Uuid::new_v4()
        );
        let entry: KnowledgeEntry = serde_json::from_str(&json).unwrap();
        assert!(entry.is_enabled);
        assert!(entry.can_be_matched);
        assert_eq!(entry.match_mode, MatchMode::Any);
        assert_eq!(entry.visibility, VisibilityScope::Global);
    }

    #[test]
    fn test_exclusive_scope_serialization() {
        let entry = KnowledgeEntry::new("x", "y").exclusive_to(agent("alice"));
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["visibility"], serde_json::json!({"exclusive": "alice"}));
    }
}
