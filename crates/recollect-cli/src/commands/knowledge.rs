use clap::{Parser, Subcommand};
use recollect::ContextEngine;
use recollect::knowledge::{KnowledgeEntry, MatchMode, VisibilityScope};

use crate::commands::{parse_agent, resolve_knowledge_id};
use crate::error::CliResult;
use crate::output::{OutputFormat, new_table, print_json, truncate_string};

#[derive(Parser)]
pub struct KnowledgeCommand {
    #[clap(subcommand)]
    pub command: KnowledgeSubcommand,
}

#[derive(Subcommand)]
pub enum KnowledgeSubcommand {
    #[clap(about = "List knowledge entries")]
    List(ListArgs),

    #[clap(about = "Add a knowledge entry")]
    Add(AddArgs),

    #[clap(about = "Edit an entry's tag or content")]
    Edit(EditArgs),

    #[clap(about = "Let an entry take part in matching again")]
    Enable(IdArgs),

    #[clap(about = "Keep an entry out of matching without deleting it")]
    Disable(IdArgs),

    #[clap(about = "Delete a knowledge entry")]
    Remove(IdArgs),
}

#[derive(Parser)]
pub struct ListArgs {
    #[clap(long, help = "Only entries whose tag or content contains this text")]
    pub contains: Option<String>,

    #[clap(
        long,
        short,
        default_value = "50",
        help = "Maximum number of entries to display"
    )]
    pub limit: usize,
}

#[derive(Parser)]
pub struct AddArgs {
    #[clap(help = "Match keywords separated by , | / or ;")]
    pub tag: String,

    #[clap(help = "Text injected when the entry is selected")]
    pub content: String,

    #[clap(long, short, default_value = "0.5", help = "Importance between 0 and 1")]
    pub importance: f32,

    #[clap(long, short, default_value = "any", help = "Match mode (any or all)")]
    pub mode: MatchMode,

    #[clap(long, help = "Only inject when this agent speaks or listens")]
    pub exclusive_to: Option<String>,
}

#[derive(Parser)]
pub struct EditArgs {
    #[clap(help = "Entry ID (UUID or unique prefix)")]
    pub id: String,

    #[clap(long, help = "Replacement tag")]
    pub tag: Option<String>,

    #[clap(long, help = "Replacement content")]
    pub content: Option<String>,
}

#[derive(Parser)]
pub struct IdArgs {
    #[clap(help = "Entry ID (UUID or unique prefix)")]
    pub id: String,
}

impl KnowledgeCommand {
    pub fn modifies(&self) -> bool {
        !matches!(self.command, KnowledgeSubcommand::List(_))
    }

    pub async fn execute(&self, engine: &mut ContextEngine, format: OutputFormat) -> CliResult<()> {
        match &self.command {
            KnowledgeSubcommand::List(args) => Self::list(engine, args, format),
            KnowledgeSubcommand::Add(args) => Self::add(engine, args, format),
            KnowledgeSubcommand::Edit(args) => Self::edit(engine, args, format),
            KnowledgeSubcommand::Enable(args) => Self::set_enabled(engine, args, true, format),
            KnowledgeSubcommand::Disable(args) => Self::set_enabled(engine, args, false, format),
            KnowledgeSubcommand::Remove(args) => Self::remove(engine, args, format),
        }
    }

    fn list(engine: &ContextEngine, args: &ListArgs, format: OutputFormat) -> CliResult<()> {
        let needle = args.contains.as_deref().map(str::to_lowercase);
        let entries: Vec<&KnowledgeEntry> = engine
            .knowledge()
            .iter()
            .filter(|e| {
                needle.as_ref().is_none_or(|n| {
                    e.tag.to_lowercase().contains(n) || e.content.to_lowercase().contains(n)
                })
            })
            .take(args.limit)
            .collect();

        match format {
            OutputFormat::Json => print_json(&entries)?,
            OutputFormat::Table => {
                if entries.is_empty() {
                    println!("No knowledge entries found.");
                    return Ok(());
                }

                let mut table = new_table([
                    "ID", "Tag", "Content", "Importance", "Mode", "Visibility", "Enabled",
                ]);
                for entry in &entries {
                    table.add_row([
                        truncate_string(&entry.id.to_string(), 8),
                        truncate_string(&entry.tag, 24),
                        truncate_string(&entry.content, 50),
                        format!("{:.2}", entry.importance),
                        entry.match_mode.to_string(),
                        visibility(&entry.visibility),
                        entry.is_enabled.to_string(),
                    ]);
                }

                println!("{table}");
                println!("\nTotal: {} entries", entries.len());
            }
        }

        Ok(())
    }

    fn add(engine: &mut ContextEngine, args: &AddArgs, format: OutputFormat) -> CliResult<()> {
        if !(0.0..=1.0).contains(&args.importance) {
            return Err(format!("Importance must be between 0 and 1, got {}", args.importance).into());
        }

        let mut entry = KnowledgeEntry::new(args.tag.clone(), args.content.clone())
            .with_importance(args.importance)
            .with_match_mode(args.mode);
        if entry.keywords().is_empty() {
            return Err(format!("Tag has no keywords: {:?}", args.tag).into());
        }
        if let Some(agent) = &args.exclusive_to {
            entry = entry.exclusive_to(parse_agent(agent)?);
        }

        let id = engine.add_knowledge(entry);

        match format {
            OutputFormat::Json => {
                print_json(&serde_json::json!({ "id": id.to_string(), "created": true }))?;
            }
            OutputFormat::Table => {
                println!("Knowledge entry created successfully.");
                println!("ID: {id}");
            }
        }

        Ok(())
    }

    fn edit(engine: &mut ContextEngine, args: &EditArgs, format: OutputFormat) -> CliResult<()> {
        if args.tag.is_none() && args.content.is_none() {
            return Err("Nothing to edit: pass --tag and/or --content".into());
        }

        let id = resolve_knowledge_id(engine, &args.id)?;
        engine.edit_knowledge(id, args.tag.clone(), args.content.clone())?;

        match format {
            OutputFormat::Json => {
                print_json(&serde_json::json!({ "id": id.to_string(), "edited": true }))?;
            }
            OutputFormat::Table => println!("Knowledge entry {id} updated."),
        }

        Ok(())
    }

    fn set_enabled(
        engine: &mut ContextEngine,
        args: &IdArgs,
        enabled: bool,
        format: OutputFormat,
    ) -> CliResult<()> {
        let id = resolve_knowledge_id(engine, &args.id)?;
        engine.set_knowledge_enabled(id, enabled)?;

        match format {
            OutputFormat::Json => {
                print_json(&serde_json::json!({ "id": id.to_string(), "enabled": enabled }))?;
            }
            OutputFormat::Table => {
                let verb = if enabled { "enabled" } else { "disabled" };
                println!("Knowledge entry {id} {verb}.");
            }
        }

        Ok(())
    }

    fn remove(engine: &mut ContextEngine, args: &IdArgs, format: OutputFormat) -> CliResult<()> {
        let id = resolve_knowledge_id(engine, &args.id)?;
        engine.remove_knowledge(id)?;

        match format {
            OutputFormat::Json => {
                print_json(&serde_json::json!({ "id": id.to_string(), "deleted": true }))?;
            }
            OutputFormat::Table => println!("Knowledge entry {id} deleted successfully."),
        }

        Ok(())
    }
}

fn visibility(scope: &VisibilityScope) -> String {
    match scope {
        VisibilityScope::Global => "global".to_string(),
        VisibilityScope::Exclusive(agent) => format!("only {agent}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_labels() {
        let agent = parse_agent("pawn_3").unwrap();
        assert_eq!(visibility(&VisibilityScope::Global), "global");
        assert_eq!(visibility(&VisibilityScope::Exclusive(agent)), "only pawn_3");
    }
}
