use clap::Parser;
use recollect::memory::TierStats;
use recollect::{AgentId, ContextEngine};

use crate::commands::parse_agent;
use crate::error::CliResult;
use crate::output::{OutputFormat, new_table, print_json};

#[derive(Parser)]
pub struct StatsCommand {
    #[clap(help = "Agent ID (defaults to every agent in the snapshot)")]
    pub agent: Option<String>,
}

impl StatsCommand {
    pub async fn execute(&self, engine: &ContextEngine, format: OutputFormat) -> CliResult<()> {
        let agents: Vec<AgentId> = match &self.agent {
            Some(id) => vec![parse_agent(id)?],
            None => engine.store().agent_ids().into_iter().cloned().collect(),
        };

        let mut per_agent = Vec::with_capacity(agents.len());
        for agent in agents {
            let stats = engine
                .stats(&agent)
                .ok_or_else(|| format!("Agent has no memories: {agent}"))?;
            per_agent.push((agent, stats));
        }

        match format {
            OutputFormat::Json => {
                let agents: Vec<_> = per_agent
                    .iter()
                    .map(|(agent, stats)| {
                        serde_json::json!({
                            "agent": agent,
                            "tiers": stats.iter().map(tier_json).collect::<Vec<_>>(),
                        })
                    })
                    .collect();
                let output = serde_json::json!({
                    "tick": engine.tick(),
                    "knowledge_entries": engine.knowledge().len(),
                    "agents": agents,
                });
                print_json(&output)?;
            }
            OutputFormat::Table => {
                println!("Tick: {}", engine.tick());
                println!("Knowledge entries: {}", engine.knowledge().len());

                if per_agent.is_empty() {
                    println!("\nNo agents found.");
                    return Ok(());
                }

                for (agent, stats) in &per_agent {
                    let mut table =
                        new_table(["Tier", "Entries", "Capacity", "Pinned", "Edited", "Pending"]);
                    for s in stats {
                        table.add_row([
                            s.tier.to_string(),
                            s.len.to_string(),
                            s.capacity.to_string(),
                            s.pinned.to_string(),
                            s.edited.to_string(),
                            s.pending_summaries.to_string(),
                        ]);
                    }

                    let total: usize = stats.iter().map(|s| s.len).sum();
                    println!("\n[{agent}]");
                    println!("{table}");
                    println!("Total: {total} memories");
                }
            }
        }

        Ok(())
    }
}

fn tier_json(stats: &TierStats) -> serde_json::Value {
    serde_json::json!({
        "tier": stats.tier.as_str(),
        "entries": stats.len,
        "capacity": stats.capacity,
        "pinned": stats.pinned,
        "edited": stats.edited,
        "pending_summaries": stats.pending_summaries,
    })
}
