//! Memory module for per-agent tiered storage
//!
//! Provides the entry model, keyword extraction, listing filters, and the
//! tiered store with its archival pipeline.

pub mod agent;
pub mod archive;
pub mod filter;
pub mod keywords;
pub mod store;
pub mod types;

pub use agent::{AgentId, AgentIdError};
pub use archive::ArchivalPhase;
pub use filter::EntryFilter;
pub use keywords::{KeywordExtractor, SimpleKeywordExtractor};
pub use store::{AgentMemory, ArchivalReport, MemoryStore, TierStats};
pub use types::{MemoryEntry, MemoryKind, MemoryTier};
