//! Archival of overflowing tiers
//!
//! When a tier grows past its capacity, its oldest unprotected entries are
//! grouped by kind and folded into one aggregated entry per group, which is
//! placed in the next tier at its timestamp-ordered position. The aggregated
//! content starts out as a deterministic simple summary; an external
//! summarizer may later replace it.
//!
//! The per-tier flow is modelled by [`ArchivalPhase`]:
//! `Normal -> OverflowDetected -> Aggregating -> Inserted`.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::hash::{Hash, Hasher};

use chrono::Utc;
use uuid::Uuid;

use crate::memory::types::{
    MemoryEntry, MemoryKind, MemoryTier, TAG_SUMMARY_EXTERNAL, TAG_SUMMARY_PENDING,
    TAG_SUMMARY_SIMPLE,
};

/// Length of the normalized prefix used to spot near-duplicate content
const DUPLICATE_PREFIX_CHARS: usize = 24;

/// Longest single item kept verbatim in a simple summary
const MAX_ITEM_CHARS: usize = 96;

/// One step of the overflow handling for a single tier
#[derive(Debug, Clone, PartialEq)]
pub enum ArchivalPhase {
    /// Tier is within capacity
    Normal { tier: MemoryTier },
    /// Tier exceeded capacity and a batch was selected
    OverflowDetected {
        tier: MemoryTier,
        size: usize,
        capacity: usize,
        selected: usize,
    },
    /// Batch grouped by kind into aggregated entries
    Aggregating {
        tier: MemoryTier,
        target: MemoryTier,
        groups: usize,
    },
    /// Aggregated entries placed in the target tier
    Inserted {
        target: MemoryTier,
        ids: Vec<Uuid>,
    },
    /// Archive overflow removed entries outright
    Evicted { tier: MemoryTier, ids: Vec<Uuid> },
}

/// How many entries to hand to archival for an overflowing tier.
///
/// At least `fraction` of the capacity (rounded up), and never less than
/// what is needed to bring the tier back within capacity.
pub fn overflow_batch_size(len: usize, capacity: usize, fraction: f32) -> usize {
    if len <= capacity {
        return 0;
    }
    let share = ((capacity as f32) * fraction).ceil() as usize;
    share.max(len - capacity).max(1)
}

/// Indices of the oldest unprotected entries, oldest first.
///
/// Tiers are kept newest-first, so candidates are taken from the back.
pub fn select_oldest_unprotected(entries: &VecDeque<MemoryEntry>, count: usize) -> Vec<usize> {
    entries
        .iter()
        .enumerate()
        .rev()
        .filter(|(_, e)| !e.is_protected())
        .take(count)
        .map(|(i, _)| i)
        .collect()
}

/// Insert keeping descending timestamp order; ties go after existing entries
pub fn insert_ordered(entries: &mut VecDeque<MemoryEntry>, entry: MemoryEntry) -> usize {
    let position = entries
        .iter()
        .position(|e| e.timestamp < entry.timestamp)
        .unwrap_or(entries.len());
    entries.insert(position, entry);
    position
}

/// Stable hash of an archival batch, used to route background summaries
pub fn batch_hash(agent: &str, kind: MemoryKind, batch: &[MemoryEntry]) -> u64 {
    let mut hasher = DefaultHasher::new();
    agent.hash(&mut hasher);
    kind.hash(&mut hasher);
    for entry in batch {
        entry.id.hash(&mut hasher);
        entry.timestamp.hash(&mut hasher);
        entry.content.hash(&mut hasher);
    }
    hasher.finish()
}

/// Group a batch by kind, oldest entry first inside each group
pub fn group_by_kind(mut batch: Vec<MemoryEntry>) -> BTreeMap<MemoryKind, Vec<MemoryEntry>> {
    batch.sort_by_key(|e| e.timestamp);
    let mut groups: BTreeMap<MemoryKind, Vec<MemoryEntry>> = BTreeMap::new();
    for entry in batch {
        groups.entry(entry.kind).or_default().push(entry);
    }
    groups
}

/// Fold one kind-group into a single entry for `target`.
///
/// The timestamp is the newest input's, not the aggregation time, so the
/// result sorts among its neighbours correctly.
pub fn aggregate_group(
    kind: MemoryKind,
    group: &[MemoryEntry],
    target: MemoryTier,
    importance_bonus: f32,
    summary_pending: bool,
) -> MemoryEntry {
    let count = group.len().max(1) as f32;
    let mean_importance = group.iter().map(|e| e.importance).sum::<f32>() / count;
    let activity = group.iter().map(|e| e.activity).fold(0.0_f32, f32::max);
    let timestamp = group.iter().map(|e| e.timestamp).max().unwrap_or_default();

    let keywords: BTreeSet<String> = group
        .iter()
        .flat_map(|e| e.keywords.iter().cloned())
        .collect();

    let mut tags: BTreeSet<String> = group
        .iter()
        .flat_map(|e| e.tags.iter().cloned())
        .filter(|t| !is_summary_tag(t))
        .collect();
    tags.insert(if summary_pending {
        TAG_SUMMARY_PENDING.to_string()
    } else {
        TAG_SUMMARY_SIMPLE.to_string()
    });

    let mut agents = group.iter().filter_map(|e| e.related_agent.as_deref());
    let related_agent = match agents.next() {
        Some(first) if agents.all(|a| a == first) => Some(first.to_string()),
        _ => None,
    };

    MemoryEntry {
        id: Uuid::new_v4(),
        content: simple_summary(kind, group),
        kind,
        tier: target,
        importance: (mean_importance + importance_bonus).clamp(0.0, 1.0),
        activity,
        timestamp,
        keywords,
        tags,
        is_pinned: false,
        is_user_edited: false,
        related_agent,
        notes: None,
        recorded_at: Utc::now(),
    }
}

fn is_summary_tag(tag: &str) -> bool {
    tag == TAG_SUMMARY_PENDING || tag == TAG_SUMMARY_SIMPLE || tag == TAG_SUMMARY_EXTERNAL
}

/// Deterministic placeholder summary of a kind-group.
///
/// Entries involving another agent are gathered per agent; everything else
/// is collapsed by near-duplicate prefix. Repeats are shown as `×N`.
///
/// ```text
/// conversation ×5: with Alice: talked about the raid ×2; shared a meal | complained about rain
/// ```
pub fn simple_summary(kind: MemoryKind, group: &[MemoryEntry]) -> String {
    let mut by_agent: Vec<(String, Vec<Item>)> = Vec::new();
    let mut loose: Vec<Item> = Vec::new();

    for entry in group {
        let content = entry.content.trim();
        if content.is_empty() {
            continue;
        }
        match entry.related_agent.as_deref() {
            Some(agent) => {
                let idx = match by_agent.iter().position(|(a, _)| a == agent) {
                    Some(idx) => idx,
                    None => {
                        by_agent.push((agent.to_string(), Vec::new()));
                        by_agent.len() - 1
                    }
                };
                push_item(&mut by_agent[idx].1, content);
            }
            None => push_item(&mut loose, content),
        }
    }

    let mut segments: Vec<String> = by_agent
        .iter()
        .map(|(agent, items)| format!("with {agent}: {}", render_items(items)))
        .collect();
    if !loose.is_empty() {
        segments.push(render_items(&loose));
    }

    let header = if group.len() > 1 {
        format!("{kind} ×{}", group.len())
    } else {
        kind.to_string()
    };

    if segments.is_empty() {
        header
    } else {
        format!("{header}: {}", segments.join(" | "))
    }
}

struct Item {
    key: String,
    text: String,
    count: usize,
}

fn push_item(items: &mut Vec<Item>, content: &str) {
    let key = duplicate_key(content);
    if let Some(existing) = items.iter_mut().find(|i| i.key == key) {
        existing.count += 1;
    } else {
        items.push(Item {
            key,
            text: truncate_item(content),
            count: 1,
        });
    }
}

fn render_items(items: &[Item]) -> String {
    items
        .iter()
        .map(|i| {
            if i.count > 1 {
                format!("{} ×{}", i.text, i.count)
            } else {
                i.text.clone()
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn duplicate_key(content: &str) -> String {
    content
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(DUPLICATE_PREFIX_CHARS)
        .collect()
}

fn truncate_item(content: &str) -> String {
    let trimmed = content.trim_end_matches(['.', '!', '?']);
    if trimmed.chars().count() <= MAX_ITEM_CHARS {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(MAX_ITEM_CHARS - 3).collect();
        format!("{cut}...")
    }
}
