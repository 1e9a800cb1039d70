pub mod archive;
pub mod classify;
pub mod config;
pub mod inject;
pub mod knowledge;
pub mod memory;
pub mod preview;
pub mod stats;

pub use archive::ArchiveCommand;
pub use classify::ClassifyCommand;
pub use config::ConfigCommand;
pub use inject::InjectCommand;
pub use knowledge::KnowledgeCommand;
pub use memory::MemoryCommand;
pub use preview::PreviewCommand;
pub use stats::StatsCommand;

use recollect::{AgentId, ContextEngine};
use uuid::Uuid;

use crate::error::CliResult;

pub(crate) fn parse_agent(id: &str) -> CliResult<AgentId> {
    Ok(AgentId::try_from(id)?)
}

/// Resolve a full UUID or a unique prefix of one among `candidates`
pub(crate) fn resolve_id(input: &str, candidates: impl Iterator<Item = Uuid>) -> CliResult<Uuid> {
    if let Ok(id) = Uuid::parse_str(input) {
        return Ok(id);
    }

    let prefix = input.to_ascii_lowercase();
    if prefix.len() < 4 {
        return Err(format!("Invalid UUID format: {input} (use a full UUID or at least 4 characters)").into());
    }

    let mut matches = candidates.filter(|id| id.to_string().starts_with(&prefix));
    match (matches.next(), matches.next()) {
        (Some(id), None) => Ok(id),
        (None, _) => Err(format!("No entry matches ID: {input}").into()),
        (Some(_), Some(_)) => Err(format!("ID prefix is ambiguous: {input}").into()),
    }
}

/// Resolve an entry ID within one agent's memory
pub(crate) fn resolve_memory_id(
    engine: &ContextEngine,
    agent: &AgentId,
    input: &str,
) -> CliResult<Uuid> {
    let memory = engine
        .store()
        .agent(agent)
        .ok_or_else(|| format!("Agent has no memories: {agent}"))?;
    resolve_id(input, memory.iter().map(|e| e.id))
}

pub(crate) fn resolve_knowledge_id(engine: &ContextEngine, input: &str) -> CliResult<Uuid> {
    resolve_id(input, engine.knowledge().iter().map(|e| e.id))
}
