//! Summarizer module for archive compaction
//!
//! Aggregated archive entries start with a deterministic placeholder. When a
//! summarizer is configured, the placeholder is rewritten in the background
//! by an external model.

pub mod prompts;
pub mod provider;
pub mod remote;
pub mod types;
pub mod worker;

pub use provider::Summarizer;
pub use remote::RemoteSummarizer;
pub use types::{SummarizerError, SummaryJob, SummaryOutcome, SummaryRequest};
pub use worker::SummaryDispatcher;
