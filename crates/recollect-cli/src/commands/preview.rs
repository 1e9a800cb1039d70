use clap::Parser;
use recollect::ContextEngine;

use crate::commands::parse_agent;
use crate::error::CliResult;
use crate::output::{OutputFormat, new_table, print_json, truncate_string};

/// Dry run of knowledge matching that shows why each entry made the cut or not
#[derive(Parser)]
pub struct PreviewCommand {
    #[clap(help = "Text to match knowledge against")]
    pub context: String,

    #[clap(long, help = "Speaking agent, for exclusive entries")]
    pub speaker: Option<String>,

    #[clap(long, help = "Listening agent, for exclusive entries")]
    pub listener: Option<String>,

    #[clap(long, short, help = "Knowledge budget (defaults to the configured maximum)")]
    pub limit: Option<usize>,
}

impl PreviewCommand {
    pub async fn execute(&self, engine: &ContextEngine, format: OutputFormat) -> CliResult<()> {
        let speaker = self.speaker.as_deref().map(parse_agent).transpose()?;
        let listener = self.listener.as_deref().map(parse_agent).transpose()?;
        let budget = self
            .limit
            .unwrap_or(engine.config().knowledge.max_injected_knowledge);

        let candidates = engine
            .inject_knowledge_detailed_async(
                &self.context,
                budget,
                speaker.as_ref(),
                listener.as_ref(),
            )
            .await;

        match format {
            OutputFormat::Json => print_json(&candidates)?,
            OutputFormat::Table => {
                if candidates.is_empty() {
                    println!("No knowledge matched.");
                    return Ok(());
                }

                let mut table = new_table([
                    "ID", "Tag", "Content", "Base", "Match", "Via", "Similarity", "Total",
                    "Outcome",
                ]);
                for c in &candidates {
                    table.add_row([
                        truncate_string(&c.id().to_string(), 8),
                        truncate_string(&c.entry.tag, 20),
                        truncate_string(&c.entry.content, 40),
                        format!("{:.2}", c.base_score),
                        format!("{:.2}", c.match_type_score),
                        c.match_kind.to_string(),
                        c.similarity.map_or_else(|| "-".to_string(), |s| format!("{s:.2}")),
                        format!("{:.3}", c.total_score),
                        c.outcome.to_string(),
                    ]);
                }

                println!("{table}");
                let selected = candidates.iter().filter(|c| c.is_selected()).count();
                println!(
                    "\nTotal: {} candidates, {selected} selected (budget {budget})",
                    candidates.len()
                );
            }
        }

        Ok(())
    }
}
