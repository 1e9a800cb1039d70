//! Filter types for listing memory entries
//!
//! Used by display and editing tooling to pick which tiers are visible and
//! to narrow the listing by kind, flags, or text. All set criteria are
//! combined with AND logic.

use crate::memory::types::{MemoryEntry, MemoryKind, MemoryTier};

/// Filter criteria for [`MemoryStore::filtered_entries`](crate::memory::MemoryStore::filtered_entries).
#[derive(Debug, Clone)]
pub struct EntryFilter {
    /// Visibility per tier, indexed in tier order
    visible_tiers: [bool; 4],
    /// Restrict to these kinds (OR logic within this filter)
    pub kinds: Option<Vec<MemoryKind>>,
    /// Only pinned entries
    pub pinned_only: bool,
    /// Only user-edited entries
    pub edited_only: bool,
    /// Case-insensitive substring of content or notes
    pub text: Option<String>,
    /// Only entries involving this agent name
    pub related_agent: Option<String>,
}

impl Default for EntryFilter {
    fn default() -> Self {
        Self {
            visible_tiers: [true; 4],
            kinds: None,
            pinned_only: false,
            edited_only: false,
            text: None,
            related_agent: None,
        }
    }
}

impl EntryFilter {
    /// Create a filter that shows everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Show only the given tiers
    pub fn with_tiers(mut self, tiers: &[MemoryTier]) -> Self {
        self.visible_tiers = [false; 4];
        for tier in tiers {
            self.visible_tiers[tier.index()] = true;
        }
        self
    }

    /// Toggle visibility of a single tier
    pub fn set_tier_visible(mut self, tier: MemoryTier, visible: bool) -> Self {
        self.visible_tiers[tier.index()] = visible;
        self
    }

    pub fn with_kinds(mut self, kinds: Vec<MemoryKind>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    pub fn pinned_only(mut self) -> Self {
        self.pinned_only = true;
        self
    }

    pub fn edited_only(mut self) -> Self {
        self.edited_only = true;
        self
    }

    pub fn containing(mut self, text: &str) -> Self {
        self.text = Some(text.to_lowercase());
        self
    }

    pub fn with_related_agent(mut self, name: &str) -> Self {
        self.related_agent = Some(name.to_string());
        self
    }

    pub fn is_tier_visible(&self, tier: MemoryTier) -> bool {
        self.visible_tiers[tier.index()]
    }

    /// Check an entry against every set criterion
    pub fn matches(&self, entry: &MemoryEntry) -> bool {
        if !self.is_tier_visible(entry.tier) {
            return false;
        }

        if let Some(ref kinds) = self.kinds {
            if !kinds.is_empty() && !kinds.contains(&entry.kind) {
                return false;
            }
        }

        if self.pinned_only && !entry.is_pinned {
            return false;
        }

        if self.edited_only && !entry.is_user_edited {
            return false;
        }

        if let Some(ref text) = self.text {
            let in_content = entry.content.to_lowercase().contains(text.as_str());
            let in_notes = entry
                .notes
                .as_deref()
                .map(|n| n.to_lowercase().contains(text.as_str()))
                .unwrap_or(false);
            if !in_content && !in_notes {
                return false;
            }
        }

        if let Some(ref name) = self.related_agent {
            if entry.related_agent.as_deref() != Some(name.as_str()) {
                return false;
            }
        }

        true
    }
}
