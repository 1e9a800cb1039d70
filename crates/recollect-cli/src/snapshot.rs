//! On-disk snapshot of a context engine
//!
//! The engine keeps everything in memory. Between CLI invocations the agent
//! stores, the knowledge base and the game clock are saved as one JSON
//! document and restored verbatim, without re-running archival.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tracing::{debug, info};

use recollect::knowledge::{KnowledgeBase, KnowledgeEntry};
use recollect::{AgentId, Config, ContextEngine, MemoryEntry};

use crate::error::CliResult;

/// Current snapshot format
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Game tick the engine was at when saved
    #[serde(default)]
    pub tick: u64,
    #[serde(default)]
    pub agents: Vec<AgentSnapshot>,
    #[serde(default)]
    pub knowledge: Vec<KnowledgeEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub id: AgentId,
    #[serde(default)]
    pub entries: Vec<MemoryEntry>,
}

fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            tick: 0,
            agents: Vec::new(),
            knowledge: Vec::new(),
        }
    }
}

impl Snapshot {
    /// `~/.recollect/snapshot.json`, or the working directory without a home
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".recollect").join("snapshot.json"))
            .unwrap_or_else(|| PathBuf::from("recollect-snapshot.json"))
    }

    /// Read a snapshot; a missing file is an empty snapshot
    pub fn load(path: &Path) -> CliResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No snapshot found, starting empty");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read snapshot {}: {e}", path.display()))?;
        let snapshot: Snapshot = serde_json::from_str(&content)?;
        if snapshot.version > SNAPSHOT_VERSION {
            return Err(format!(
                "Snapshot {} has format version {}, this build reads up to {SNAPSHOT_VERSION}",
                path.display(),
                snapshot.version
            )
            .into());
        }
        Ok(snapshot)
    }

    pub fn capture(engine: &ContextEngine) -> Self {
        let store = engine.store();
        let agents = store
            .agent_ids()
            .into_iter()
            .map(|id| AgentSnapshot {
                id: id.clone(),
                entries: store
                    .agent(id)
                    .map(|memory| memory.iter().cloned().collect())
                    .unwrap_or_default(),
            })
            .collect();

        Self {
            version: SNAPSHOT_VERSION,
            tick: engine.tick(),
            agents,
            knowledge: engine.knowledge().iter().cloned().collect(),
        }
    }

    /// Write through a temporary file so a crash never leaves half a snapshot
    pub fn save(&self, path: &Path) -> CliResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        fs::rename(&tmp, path)?;

        debug!(path = %path.display(), agents = self.agents.len(), "Saved snapshot");
        Ok(())
    }

    /// Build an engine from `config` and load this snapshot into it
    pub fn into_engine(self, config: Config, handle: Handle) -> CliResult<ContextEngine> {
        let mut engine = ContextEngine::from_config(config, handle)?
            .with_knowledge(KnowledgeBase::from_entries(self.knowledge));
        engine.set_tick(self.tick);

        let agents = self.agents.len();
        let store = engine.store_mut();
        for agent in self.agents {
            store.register_agent(&agent.id);
            for entry in agent.entries {
                store.restore(&agent.id, entry);
            }
        }

        info!(agents, tick = engine.tick(), "Restored snapshot");
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recollect::{MemoryKind, MemoryTier};

    fn pawn() -> AgentId {
        AgentId::try_from("pawn_1").unwrap()
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = Snapshot::load(&dir.path().join("nope.json")).unwrap();

        assert_eq!(snapshot.version, SNAPSHOT_VERSION);
        assert!(snapshot.agents.is_empty());
        assert!(snapshot.knowledge.is_empty());
    }

    #[tokio::test]
    async fn test_round_trip_through_engine() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("snapshot.json");

        let mut engine = ContextEngine::new(Config::default()).unwrap();
        engine.set_tick(4200);
        let kept = MemoryEntry::new("Planted rice by the river", MemoryKind::Action, 4000)
            .with_importance(0.8);
        let kept_id = kept.id;
        engine.insert_memory(&pawn(), kept, MemoryTier::EventLog);
        engine.pin_memory(&pawn(), kept_id, true).unwrap();
        engine.add_knowledge(KnowledgeEntry::new("rice", "Rice needs wet soil."));

        Snapshot::capture(&engine).save(&path).unwrap();

        let restored = Snapshot::load(&path)
            .unwrap()
            .into_engine(Config::default(), Handle::current())
            .unwrap();

        assert_eq!(restored.tick(), 4200);
        assert_eq!(restored.knowledge().len(), 1);
        let memory = restored.store().agent(&pawn()).unwrap();
        let entry = memory.get(kept_id).unwrap();
        assert_eq!(entry.tier, MemoryTier::EventLog);
        assert!(entry.is_pinned);
        assert!((entry.importance - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn test_newer_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        fs::write(&path, r#"{ "version": 99 }"#).unwrap();

        let err = Snapshot::load(&path).unwrap_err();
        assert!(err.to_string().contains("format version 99"));
    }

    #[test]
    fn test_agents_without_entries_survive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let mut snapshot = Snapshot::default();
        snapshot.agents.push(AgentSnapshot {
            id: pawn(),
            entries: Vec::new(),
        });
        snapshot.save(&path).unwrap();

        let loaded = Snapshot::load(&path).unwrap();
        assert_eq!(loaded.agents.len(), 1);
        assert_eq!(loaded.agents[0].id, pawn());
    }
}
