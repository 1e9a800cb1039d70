//! Recollect - tiered memory and knowledge injection for conversational agents
//!
//! Each agent keeps a four-tier memory that compacts itself as it fills up.
//! Every turn, the most relevant memories and knowledge entries are scored
//! against the conversation, fitted to a budget and rendered into a prompt
//! section for a language model.

pub mod assembler;
pub mod config;
pub mod engine;
pub mod error;
pub mod knowledge;
pub mod memory;
pub mod retrieval;
pub mod scene;
pub mod scoring;
pub mod summarizer;
pub mod testing;

pub use assembler::{TurnContext, TurnRequest};
pub use config::Config;
pub use engine::ContextEngine;
pub use error::{RecollectError, Result};
pub use memory::{AgentId, MemoryEntry, MemoryKind, MemoryTier};
