//! Per-agent turn cache
//!
//! Remembers the last assembled turn per agent. An entry is reused only
//! while the turn inputs hash the same and fewer than `ttl_ticks` game
//! ticks have passed, so mutations surface within the TTL without explicit
//! invalidation.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::config::CacheConfig;
use crate::memory::agent::AgentId;

/// Rendered output of one turn
#[derive(Debug, Clone, PartialEq)]
pub struct CachedTurn {
    pub context_hash: u64,
    /// Tick the turn was computed at
    pub computed_at: u64,
    pub memory_text: Option<String>,
    pub knowledge_text: Option<String>,
    pub full_prompt: String,
}

/// Hash of everything that shapes a turn besides the stores themselves
///
/// Speaker and listener are included because they decide which exclusive
/// knowledge entries are visible.
pub fn context_hash<'a>(
    base_context: &str,
    speaker: Option<&AgentId>,
    listener: Option<&AgentId>,
    participants: &[AgentId],
    extra_sources: impl IntoIterator<Item = (&'a String, &'a String)>,
) -> u64 {
    let mut hasher = DefaultHasher::new();
    base_context.hash(&mut hasher);
    speaker.hash(&mut hasher);
    listener.hash(&mut hasher);
    participants.hash(&mut hasher);
    for (name, value) in extra_sources {
        name.hash(&mut hasher);
        value.hash(&mut hasher);
    }
    hasher.finish()
}

#[derive(Debug)]
pub struct TurnCache {
    entries: DashMap<AgentId, CachedTurn>,
    enabled: bool,
    ttl_ticks: u64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TurnCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            enabled: config.enabled,
            ttl_ticks: config.ttl_ticks,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Fresh cached turn for `agent`, if any
    pub fn get(&self, agent: &AgentId, context_hash: u64, now: u64) -> Option<CachedTurn> {
        if !self.enabled {
            return None;
        }

        let fresh = self.entries.get(agent).and_then(|cached| {
            let age = now.checked_sub(cached.computed_at)?;
            (cached.context_hash == context_hash && age < self.ttl_ticks).then(|| cached.clone())
        });

        match fresh {
            Some(turn) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(turn)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn put(&self, agent: &AgentId, turn: CachedTurn) {
        if self.enabled {
            self.entries.insert(agent.clone(), turn);
        }
    }

    pub fn invalidate(&self, agent: &AgentId) {
        self.entries.remove(agent);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// (hits, misses) since creation
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}
