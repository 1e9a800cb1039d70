use clap::{Parser, Subcommand};
use recollect::memory::{ArchivalReport, EntryFilter};
use recollect::{AgentId, ContextEngine, MemoryEntry, MemoryKind, MemoryTier};

use crate::commands::{parse_agent, resolve_memory_id};
use crate::error::CliResult;
use crate::output::{OutputFormat, format_timestamp, new_table, print_json, truncate_string};

#[derive(Parser)]
pub struct MemoryCommand {
    #[clap(subcommand)]
    pub command: MemorySubcommand,
}

#[derive(Subcommand)]
pub enum MemorySubcommand {
    #[clap(about = "List an agent's memories, newest first per tier")]
    List(ListArgs),

    #[clap(about = "Show memory details")]
    Show(EntryArgs),

    #[clap(about = "Manually add a memory")]
    Add(AddArgs),

    #[clap(about = "Pin a memory so archival never consumes it")]
    Pin(EntryArgs),

    #[clap(about = "Remove the pin from a memory")]
    Unpin(EntryArgs),

    #[clap(about = "Edit a memory's content or notes")]
    Edit(EditArgs),

    #[clap(about = "Move a memory to another tier")]
    Move(MoveArgs),

    #[clap(about = "Delete a memory")]
    Delete(EntryArgs),
}

#[derive(Parser)]
pub struct ListArgs {
    #[clap(help = "Agent ID")]
    pub agent: String,

    #[clap(
        long,
        short,
        help = "Only show this tier (repeatable: active, situational, event_log, archive)"
    )]
    pub tier: Vec<MemoryTier>,

    #[clap(long, help = "Hide this tier (repeatable)")]
    pub hide_tier: Vec<MemoryTier>,

    #[clap(long, short, help = "Only show this kind (repeatable)")]
    pub kind: Vec<MemoryKind>,

    #[clap(long, help = "Only pinned memories")]
    pub pinned: bool,

    #[clap(long, help = "Only memories edited by an operator")]
    pub edited: bool,

    #[clap(long, help = "Only memories whose content or notes contain this text")]
    pub contains: Option<String>,

    #[clap(long, help = "Only memories involving this agent name")]
    pub related: Option<String>,

    #[clap(
        long,
        short,
        default_value = "20",
        help = "Maximum number of memories to display"
    )]
    pub limit: usize,
}

#[derive(Parser)]
pub struct EntryArgs {
    #[clap(help = "Agent ID")]
    pub agent: String,

    #[clap(help = "Memory ID (UUID or unique prefix)")]
    pub id: String,
}

#[derive(Parser)]
pub struct AddArgs {
    #[clap(help = "Agent ID")]
    pub agent: String,

    #[clap(help = "Memory content text")]
    pub text: String,

    #[clap(long, short, default_value = "observation", help = "Memory kind")]
    pub kind: MemoryKind,

    #[clap(long, short, default_value = "event_log", help = "Tier to insert into")]
    pub tier: MemoryTier,

    #[clap(long, short, default_value = "0.5", help = "Importance between 0 and 1")]
    pub importance: f32,

    #[clap(long, help = "Name of another agent involved")]
    pub related: Option<String>,

    #[clap(long, help = "Game tick of the event (defaults to the snapshot tick)")]
    pub tick: Option<u64>,
}

#[derive(Parser)]
pub struct EditArgs {
    #[clap(help = "Agent ID")]
    pub agent: String,

    #[clap(help = "Memory ID (UUID or unique prefix)")]
    pub id: String,

    #[clap(long, help = "Replacement content")]
    pub content: Option<String>,

    #[clap(long, help = "Operator notes")]
    pub notes: Option<String>,
}

#[derive(Parser)]
pub struct MoveArgs {
    #[clap(help = "Agent ID")]
    pub agent: String,

    #[clap(help = "Memory ID (UUID or unique prefix)")]
    pub id: String,

    #[clap(help = "Target tier")]
    pub tier: MemoryTier,
}

impl MemoryCommand {
    /// Whether running this command changes the snapshot
    pub fn modifies(&self) -> bool {
        !matches!(
            self.command,
            MemorySubcommand::List(_) | MemorySubcommand::Show(_)
        )
    }

    pub async fn execute(&self, engine: &mut ContextEngine, format: OutputFormat) -> CliResult<()> {
        match &self.command {
            MemorySubcommand::List(args) => Self::list(engine, args, format),
            MemorySubcommand::Show(args) => Self::show(engine, args, format),
            MemorySubcommand::Add(args) => Self::add(engine, args, format),
            MemorySubcommand::Pin(args) => Self::pin(engine, args, true, format),
            MemorySubcommand::Unpin(args) => Self::pin(engine, args, false, format),
            MemorySubcommand::Edit(args) => Self::edit(engine, args, format),
            MemorySubcommand::Move(args) => Self::move_entry(engine, args, format),
            MemorySubcommand::Delete(args) => Self::delete(engine, args, format),
        }
    }

    fn list(engine: &ContextEngine, args: &ListArgs, format: OutputFormat) -> CliResult<()> {
        let agent = parse_agent(&args.agent)?;
        let filter = list_filter(args);

        let mut memories = engine.filtered_entries(&agent, &filter);
        memories.truncate(args.limit);

        match format {
            OutputFormat::Json => print_json(&memories)?,
            OutputFormat::Table => {
                if memories.is_empty() {
                    println!("No memories found.");
                    return Ok(());
                }

                let mut table = new_table([
                    "ID", "Content", "Kind", "Tier", "Importance", "Tick", "Flags", "Recorded",
                ]);
                for memory in &memories {
                    table.add_row([
                        truncate_string(&memory.id.to_string(), 8),
                        truncate_string(&memory.content, 50),
                        memory.kind.to_string(),
                        memory.tier.to_string(),
                        format!("{:.2}", memory.importance),
                        memory.timestamp.to_string(),
                        flags(memory),
                        format_timestamp(&memory.recorded_at),
                    ]);
                }

                println!("{table}");
                println!("\nTotal: {} memories", memories.len());
            }
        }

        Ok(())
    }

    fn show(engine: &ContextEngine, args: &EntryArgs, format: OutputFormat) -> CliResult<()> {
        let agent = parse_agent(&args.agent)?;
        let id = resolve_memory_id(engine, &agent, &args.id)?;
        let memory = engine
            .store()
            .agent(&agent)
            .and_then(|m| m.get(id))
            .ok_or_else(|| format!("Memory not found: {}", args.id))?;

        match format {
            OutputFormat::Json => print_json(memory)?,
            OutputFormat::Table => {
                let mut table = new_table(["Property", "Value"]);
                let keywords: Vec<&str> = memory.keywords.iter().map(String::as_str).collect();
                let tags: Vec<&str> = memory.tags.iter().map(String::as_str).collect();

                table.add_row(["ID", &memory.id.to_string()]);
                table.add_row(["Content", &memory.content]);
                table.add_row(["Kind", memory.kind.as_str()]);
                table.add_row(["Tier", memory.tier.as_str()]);
                table.add_row(["Importance", &format!("{:.4}", memory.importance)]);
                table.add_row(["Activity", &format!("{:.4}", memory.activity)]);
                table.add_row(["Tick", &memory.timestamp.to_string()]);
                table.add_row(["Keywords", &keywords.join(", ")]);
                table.add_row(["Tags", &tags.join(", ")]);
                table.add_row(["Pinned", &memory.is_pinned.to_string()]);
                table.add_row(["User Edited", &memory.is_user_edited.to_string()]);
                table.add_row(["Related Agent", memory.related_agent.as_deref().unwrap_or("-")]);
                table.add_row(["Notes", memory.notes.as_deref().unwrap_or("-")]);
                table.add_row(["Recorded", &memory.recorded_at.to_rfc3339()]);

                println!("{table}");
            }
        }

        Ok(())
    }

    fn add(engine: &mut ContextEngine, args: &AddArgs, format: OutputFormat) -> CliResult<()> {
        if !(0.0..=1.0).contains(&args.importance) {
            return Err(format!("Importance must be between 0 and 1, got {}", args.importance).into());
        }

        let agent = parse_agent(&args.agent)?;
        let tick = args.tick.unwrap_or_else(|| engine.tick());
        if tick > engine.tick() {
            engine.set_tick(tick);
        }

        let mut entry =
            MemoryEntry::new(args.text.clone(), args.kind, tick).with_importance(args.importance);
        if let Some(related) = &args.related {
            entry = entry.with_related_agent(related);
        }

        let id = entry.id;
        let report = engine.insert_memory(&agent, entry, args.tier);

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "id": id.to_string(),
                    "created": true,
                    "archival": report_json(&report),
                });
                print_json(&output)?;
            }
            OutputFormat::Table => {
                println!("Memory created successfully.");
                println!("ID: {id}");
                print_report(&agent, &report);
            }
        }

        Ok(())
    }

    fn pin(
        engine: &mut ContextEngine,
        args: &EntryArgs,
        pinned: bool,
        format: OutputFormat,
    ) -> CliResult<()> {
        let agent = parse_agent(&args.agent)?;
        let id = resolve_memory_id(engine, &agent, &args.id)?;
        engine.pin_memory(&agent, id, pinned)?;

        match format {
            OutputFormat::Json => {
                print_json(&serde_json::json!({ "id": id.to_string(), "pinned": pinned }))?;
            }
            OutputFormat::Table => {
                let verb = if pinned { "pinned" } else { "unpinned" };
                println!("Memory {id} {verb}.");
            }
        }

        Ok(())
    }

    fn edit(engine: &mut ContextEngine, args: &EditArgs, format: OutputFormat) -> CliResult<()> {
        if args.content.is_none() && args.notes.is_none() {
            return Err("Nothing to edit: pass --content and/or --notes".into());
        }

        let agent = parse_agent(&args.agent)?;
        let id = resolve_memory_id(engine, &agent, &args.id)?;
        engine.edit_memory(&agent, id, args.content.clone(), args.notes.clone())?;

        match format {
            OutputFormat::Json => {
                print_json(&serde_json::json!({ "id": id.to_string(), "edited": true }))?;
            }
            OutputFormat::Table => println!("Memory {id} updated."),
        }

        Ok(())
    }

    fn move_entry(engine: &mut ContextEngine, args: &MoveArgs, format: OutputFormat) -> CliResult<()> {
        let agent = parse_agent(&args.agent)?;
        let id = resolve_memory_id(engine, &agent, &args.id)?;
        let report = engine.move_memory(&agent, id, args.tier)?;

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "id": id.to_string(),
                    "tier": args.tier.as_str(),
                    "archival": report_json(&report),
                });
                print_json(&output)?;
            }
            OutputFormat::Table => {
                println!("Memory {id} moved to {}.", args.tier);
                print_report(&agent, &report);
            }
        }

        Ok(())
    }

    fn delete(engine: &mut ContextEngine, args: &EntryArgs, format: OutputFormat) -> CliResult<()> {
        let agent = parse_agent(&args.agent)?;
        let id = resolve_memory_id(engine, &agent, &args.id)?;
        let removed = engine.delete_memory(&agent, id)?;

        match format {
            OutputFormat::Json => {
                print_json(&serde_json::json!({ "id": id.to_string(), "deleted": true }))?;
            }
            OutputFormat::Table => {
                println!(
                    "Memory {id} deleted successfully ({}).",
                    truncate_string(&removed.content, 40)
                );
            }
        }

        Ok(())
    }
}

fn list_filter(args: &ListArgs) -> EntryFilter {
    let mut filter = if args.tier.is_empty() {
        EntryFilter::new()
    } else {
        EntryFilter::new().with_tiers(&args.tier)
    };
    for tier in &args.hide_tier {
        filter = filter.set_tier_visible(*tier, false);
    }
    if !args.kind.is_empty() {
        filter = filter.with_kinds(args.kind.clone());
    }
    if args.pinned {
        filter = filter.pinned_only();
    }
    if args.edited {
        filter = filter.edited_only();
    }
    if let Some(text) = &args.contains {
        filter = filter.containing(text);
    }
    if let Some(name) = &args.related {
        filter = filter.with_related_agent(name);
    }
    filter
}

fn flags(memory: &MemoryEntry) -> String {
    let mut flags = Vec::new();
    if memory.is_pinned {
        flags.push("pinned");
    }
    if memory.is_user_edited {
        flags.push("edited");
    }
    if memory.tags.iter().any(|t| t.starts_with("summary:")) {
        flags.push("summary");
    }
    flags.join(",")
}

pub(crate) fn report_json(report: &ArchivalReport) -> serde_json::Value {
    serde_json::json!({
        "consumed": report.consumed.len(),
        "created": report.created.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "evicted": report.evicted.len(),
    })
}

pub(crate) fn print_report(agent: &AgentId, report: &ArchivalReport) {
    if report.is_empty() {
        return;
    }
    println!(
        "Archival for {agent}: {} entries aggregated into {}, {} evicted.",
        report.consumed.len(),
        report.created.len(),
        report.evicted.len()
    );
}
