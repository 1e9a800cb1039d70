pub mod commands;
pub mod error;
pub mod output;
pub mod snapshot;

pub use commands::{
    ArchiveCommand, ClassifyCommand, ConfigCommand, InjectCommand, KnowledgeCommand,
    MemoryCommand, PreviewCommand, StatsCommand,
};
pub use error::{CliError, CliResult};
pub use output::{OutputFormat, format_timestamp, truncate_string};
pub use snapshot::Snapshot;
