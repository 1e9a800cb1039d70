//! Match text assembly
//!
//! The text searched by both retrieval channels is built from the configured
//! [`MatchSource`]s. Shared sources are looked up by name in the turn's
//! source map (`"context"` is always the base context). Per-agent sources
//! are rendered through the host's [`PropertyRenderer`] once for every
//! agent in the conversation.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::warn;

use crate::config::MatchSource;
use crate::error::RecollectError;
use crate::memory::agent::AgentId;

/// Name of the source holding the base context of a turn
pub const CONTEXT_SOURCE: &str = "context";

/// Renders a named property of an agent, e.g. its backstory or traits
pub trait PropertyRenderer: Send + Sync {
    fn render(&self, property: &str, agent: &AgentId) -> Option<String>;
}

/// Map-backed renderer for tests and offline tooling
#[derive(Debug, Clone, Default)]
pub struct StaticPropertyRenderer {
    values: HashMap<(String, AgentId), String>,
}

impl StaticPropertyRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, property: &str, agent: &AgentId, value: impl Into<String>) {
        self.values
            .insert((property.to_string(), agent.clone()), value.into());
    }

    pub fn with(mut self, property: &str, agent: &AgentId, value: impl Into<String>) -> Self {
        self.set(property, agent, value);
        self
    }
}

impl PropertyRenderer for StaticPropertyRenderer {
    fn render(&self, property: &str, agent: &AgentId) -> Option<String> {
        self.values
            .get(&(property.to_string(), agent.clone()))
            .cloned()
    }
}

/// Sources used when none are configured
pub fn fallback_sources() -> Vec<MatchSource> {
    vec![
        MatchSource::shared(CONTEXT_SOURCE),
        MatchSource::per_agent("name"),
    ]
}

/// Builds the match text for a turn
#[derive(Clone)]
pub struct MatchTextBuilder {
    sources: Vec<MatchSource>,
    renderer: Arc<dyn PropertyRenderer>,
}

impl MatchTextBuilder {
    /// An empty source list is replaced by [`fallback_sources`]
    pub fn new(sources: Vec<MatchSource>, renderer: Arc<dyn PropertyRenderer>) -> Self {
        let sources = if sources.is_empty() {
            let err = RecollectError::InvalidMatchConfiguration(
                "no match sources configured".to_string(),
            );
            warn!(error = %err, "Using default match sources");
            fallback_sources()
        } else {
            sources
        };
        Self { sources, renderer }
    }

    pub fn sources(&self) -> &[MatchSource] {
        &self.sources
    }

    pub fn renderer(&self) -> &Arc<dyn PropertyRenderer> {
        &self.renderer
    }

    /// Concatenate every non-empty source, one per line
    pub fn build(
        &self,
        base_context: &str,
        extra_sources: &BTreeMap<String, String>,
        participants: &[AgentId],
    ) -> String {
        let mut parts: Vec<String> = Vec::new();

        for source in &self.sources {
            if source.per_agent {
                for agent in participants {
                    if let Some(value) = self.renderer.render(&source.name, agent) {
                        push_part(&mut parts, value);
                    }
                }
            } else if source.name == CONTEXT_SOURCE {
                push_part(&mut parts, base_context.to_string());
            } else if let Some(value) = extra_sources.get(&source.name) {
                push_part(&mut parts, value.clone());
            }
        }

        parts.join("\n")
    }
}

fn push_part(parts: &mut Vec<String>, value: String) {
    let trimmed = value.trim();
    if !trimmed.is_empty() {
        parts.push(trimmed.to_string());
    }
}

impl std::fmt::Debug for MatchTextBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchTextBuilder")
            .field("sources", &self.sources)
            .finish()
    }
}
