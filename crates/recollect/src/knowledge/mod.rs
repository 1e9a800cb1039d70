//! Knowledge module for shared, tag-matched facts

pub mod base;
pub mod match_text;
pub mod types;

pub use base::{KnowledgeBase, finalize_selection, selected_entries};
pub use match_text::{MatchTextBuilder, PropertyRenderer, StaticPropertyRenderer};
pub use types::{KnowledgeEntry, MatchKind, MatchMode, ScoredKnowledge, VisibilityScope};
