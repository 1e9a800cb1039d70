//! Memory types for the Recollect system
//!
//! Defines the record stored per agent, the event categories it is
//! classified into, and the four tiers it moves through as it ages.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tag carried by an aggregated entry while its background summary is outstanding
pub const TAG_SUMMARY_PENDING: &str = "summary:pending";
/// Tag carried by an aggregated entry whose simple summary is final
pub const TAG_SUMMARY_SIMPLE: &str = "summary:simple";
/// Tag carried by an aggregated entry rewritten by the external summarizer
pub const TAG_SUMMARY_EXTERNAL: &str = "summary:external";

/// A single remembered event belonging to one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Unique identifier for this entry
    pub id: Uuid,
    /// Rendered text of the memory
    pub content: String,
    /// What kind of event this records
    pub kind: MemoryKind,
    /// Which tier currently holds the entry
    pub tier: MemoryTier,
    /// Importance score 0.0-1.0
    pub importance: f32,
    /// Secondary salience signal 0.0-1.0
    pub activity: f32,
    /// Game tick at which the event happened
    pub timestamp: u64,
    /// Keywords extracted when the entry was created or edited
    #[serde(default)]
    pub keywords: BTreeSet<String>,
    /// Free-form annotations
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Exempt from archival and eviction
    #[serde(default)]
    pub is_pinned: bool,
    /// Edited by an operator; exempt from archival and eviction
    #[serde(default)]
    pub is_user_edited: bool,
    /// Other agent involved in the event, if any
    #[serde(default)]
    pub related_agent: Option<String>,
    /// Operator notes
    #[serde(default)]
    pub notes: Option<String>,
    /// Wall-clock time the record was created
    pub recorded_at: DateTime<Utc>,
}

impl MemoryEntry {
    /// Create a new Active-tier entry with default salience
    pub fn new(content: impl Into<String>, kind: MemoryKind, timestamp: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            kind,
            tier: MemoryTier::Active,
            importance: 0.5,
            activity: 0.0,
            timestamp,
            keywords: BTreeSet::new(),
            tags: BTreeSet::new(),
            is_pinned: false,
            is_user_edited: false,
            related_agent: None,
            notes: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_importance(mut self, importance: f32) -> Self {
        self.set_importance(importance);
        self
    }

    pub fn with_activity(mut self, activity: f32) -> Self {
        self.activity = activity.clamp(0.0, 1.0);
        self
    }

    pub fn with_related_agent(mut self, name: impl Into<String>) -> Self {
        self.related_agent = Some(name.into());
        self
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords
            .into_iter()
            .map(|k| k.into().to_lowercase())
            .collect();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn pinned(mut self) -> Self {
        self.is_pinned = true;
        self
    }

    /// Update the importance, clamped to 0.0-1.0
    pub fn set_importance(&mut self, importance: f32) {
        self.importance = importance.clamp(0.0, 1.0);
    }

    /// Pinned and user-edited entries never feed archival or eviction
    pub fn is_protected(&self) -> bool {
        self.is_pinned || self.is_user_edited
    }

    /// Whether a background summary is still outstanding for this entry
    pub fn is_summary_pending(&self) -> bool {
        self.tags.contains(TAG_SUMMARY_PENDING)
    }
}

/// Classification of what an entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MemoryKind {
    Conversation,
    Action,
    Interaction,
    Observation,
    Event,
    Emotion,
    Relationship,
    Internal,
}

impl MemoryKind {
    pub const ALL: [MemoryKind; 8] = [
        MemoryKind::Conversation,
        MemoryKind::Action,
        MemoryKind::Interaction,
        MemoryKind::Observation,
        MemoryKind::Event,
        MemoryKind::Emotion,
        MemoryKind::Relationship,
        MemoryKind::Internal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::Conversation => "conversation",
            MemoryKind::Action => "action",
            MemoryKind::Interaction => "interaction",
            MemoryKind::Observation => "observation",
            MemoryKind::Event => "event",
            MemoryKind::Emotion => "emotion",
            MemoryKind::Relationship => "relationship",
            MemoryKind::Internal => "internal",
        }
    }
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MemoryKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown memory kind: {s}"))
    }
}

/// Storage tier, ordered from most recent to most compacted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MemoryTier {
    /// Raw recent history, rendered separately and never scored
    Active,
    /// Legacy mid-term tier
    Situational,
    /// Primary mid-term tier
    EventLog,
    /// Long-term compacted tier
    Archive,
}

impl MemoryTier {
    pub const ALL: [MemoryTier; 4] = [
        MemoryTier::Active,
        MemoryTier::Situational,
        MemoryTier::EventLog,
        MemoryTier::Archive,
    ];

    /// Tier that receives aggregated entries when this tier overflows.
    /// The archive has no successor; its overflow is evicted.
    pub fn archival_target(&self) -> Option<MemoryTier> {
        match self {
            MemoryTier::Active | MemoryTier::Situational => Some(MemoryTier::EventLog),
            MemoryTier::EventLog => Some(MemoryTier::Archive),
            MemoryTier::Archive => None,
        }
    }

    /// Whether entries in this tier take part in scoring-based injection
    pub fn is_scored(&self) -> bool {
        !matches!(self, MemoryTier::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryTier::Active => "active",
            MemoryTier::Situational => "situational",
            MemoryTier::EventLog => "event_log",
            MemoryTier::Archive => "archive",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            MemoryTier::Active => 0,
            MemoryTier::Situational => 1,
            MemoryTier::EventLog => 2,
            MemoryTier::Archive => 3,
        }
    }
}

impl fmt::Display for MemoryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(MemoryTier::Active),
            "situational" => Ok(MemoryTier::Situational),
            "event_log" | "eventlog" | "event-log" => Ok(MemoryTier::EventLog),
            "archive" => Ok(MemoryTier::Archive),
            _ => Err(format!(
                "Unknown tier: {s}. Use active, situational, event_log, or archive."
            )),
        }
    }
}
