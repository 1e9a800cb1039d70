use clap::Parser;
use recollect::{ContextEngine, MemoryTier};

use crate::commands::memory::{print_report, report_json};
use crate::commands::{parse_agent, resolve_memory_id};
use crate::error::CliResult;
use crate::output::{OutputFormat, print_json};

/// Aggregate a hand-picked batch of memories, bypassing the capacity trigger
#[derive(Parser)]
pub struct ArchiveCommand {
    #[clap(help = "Agent ID")]
    pub agent: String,

    #[clap(required = true, help = "Memory IDs to aggregate (UUID or unique prefix)")]
    pub ids: Vec<String>,

    #[clap(
        long,
        short,
        default_value = "archive",
        help = "Tier receiving the aggregate (event_log or archive)"
    )]
    pub target: MemoryTier,
}

impl ArchiveCommand {
    pub async fn execute(&self, engine: &mut ContextEngine, format: OutputFormat) -> CliResult<()> {
        let agent = parse_agent(&self.agent)?;
        let lookup: &ContextEngine = engine;
        let ids = self
            .ids
            .iter()
            .map(|id| resolve_memory_id(lookup, &agent, id))
            .collect::<CliResult<Vec<_>>>()?;

        let report = engine.archive_batch(&agent, &ids, self.target)?;

        match format {
            OutputFormat::Json => print_json(&report_json(&report))?,
            OutputFormat::Table => {
                println!("Archived {} memories into {}.", ids.len(), self.target);
                print_report(&agent, &report);
                for id in &report.created {
                    println!("Created: {id}");
                }
            }
        }

        Ok(())
    }
}
