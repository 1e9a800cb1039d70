use std::collections::BTreeMap;

use clap::Parser;
use recollect::assembler::ScoredCandidate;
use recollect::{AgentId, ContextEngine, TurnRequest};

use crate::commands::parse_agent;
use crate::error::CliResult;
use crate::output::{OutputFormat, new_table, print_json, truncate_string};

#[derive(Parser)]
pub struct InjectCommand {
    #[clap(help = "Agent taking the turn")]
    pub agent: String,

    #[clap(help = "Conversation text of the turn")]
    pub context: String,

    #[clap(long, short, help = "Other agent in the conversation (repeatable)")]
    pub participant: Vec<String>,

    #[clap(long, help = "Agent being addressed (defaults to the first participant)")]
    pub listener: Option<String>,

    #[clap(
        long = "source",
        value_parser = parse_source,
        help = "Extra shared match source as name=value (repeatable)"
    )]
    pub sources: Vec<(String, String)>,

    #[clap(long, help = "Game tick of the turn (defaults to the snapshot tick)")]
    pub tick: Option<u64>,

    #[clap(long, help = "List every scored candidate with its outcome")]
    pub explain: bool,
}

fn parse_source(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("Expected name=value, got: {s}"))?;
    if name.trim().is_empty() {
        return Err(format!("Source name is empty in: {s}"));
    }
    Ok((name.trim().to_string(), value.to_string()))
}

impl InjectCommand {
    pub async fn execute(&self, engine: &ContextEngine, format: OutputFormat) -> CliResult<()> {
        let agent = parse_agent(&self.agent)?;
        let others = self
            .participant
            .iter()
            .map(|p| parse_agent(p))
            .collect::<CliResult<Vec<AgentId>>>()?;
        let listener = match &self.listener {
            Some(l) => Some(parse_agent(l)?),
            None => others.first().cloned(),
        };

        let mut participants = vec![agent.clone()];
        participants.extend(others);
        let extra: BTreeMap<String, String> = self.sources.iter().cloned().collect();

        let request = TurnRequest {
            agent: &agent,
            base_context: &self.context,
            speaker: Some(&agent),
            listener: listener.as_ref(),
            participants: &participants,
            extra_sources: &extra,
            now: self.tick.unwrap_or_else(|| engine.tick()),
        };
        let turn = engine.assemble_turn_async(&request).await;

        match format {
            OutputFormat::Json => print_json(&turn)?,
            OutputFormat::Table => {
                if turn.is_empty() {
                    println!("Nothing to inject.");
                } else {
                    println!("{}", turn.full_prompt);
                }

                if let Some(scene) = &turn.classification {
                    println!("\nScene: {} (confidence {:.2})", scene.primary, scene.confidence);
                }

                if self.explain && !turn.candidates.is_empty() {
                    let mut table =
                        new_table(["Source", "ID", "Content", "Score", "Via", "Outcome"]);
                    for candidate in &turn.candidates {
                        let (source, id, content, via, outcome) = match candidate {
                            ScoredCandidate::Memory(m) => (
                                "memory",
                                m.entry.id,
                                &m.entry.content,
                                m.entry.tier.to_string(),
                                m.outcome,
                            ),
                            ScoredCandidate::Knowledge(k) => (
                                "knowledge",
                                k.id(),
                                &k.entry.content,
                                k.match_kind.to_string(),
                                k.outcome,
                            ),
                        };
                        table.add_row([
                            source.to_string(),
                            truncate_string(&id.to_string(), 8),
                            truncate_string(content, 50),
                            format!("{:.3}", candidate.total_score()),
                            via,
                            outcome.to_string(),
                        ]);
                    }
                    println!("\n{table}");
                    println!("\nTotal: {} candidates", turn.candidates.len());
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_source() {
        assert_eq!(
            parse_source("weather=cold and windy").unwrap(),
            ("weather".to_string(), "cold and windy".to_string())
        );
        assert_eq!(
            parse_source("note=a=b").unwrap(),
            ("note".to_string(), "a=b".to_string())
        );
        assert!(parse_source("no-separator").is_err());
        assert!(parse_source(" =value").is_err());
    }
}
