use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::runtime::Handle;
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use recollect::Config;
use recollect_cli::commands::{
    ArchiveCommand, ClassifyCommand, ConfigCommand, InjectCommand, KnowledgeCommand,
    MemoryCommand, PreviewCommand, StatsCommand,
};
use recollect_cli::error::CliResult;
use recollect_cli::output::OutputFormat;
use recollect_cli::snapshot::Snapshot;

#[derive(Parser)]
#[command(name = "recollect-cli")]
#[command(about = "Recollect CLI - Inspect and exercise agent memory snapshots")]
#[command(version)]
pub struct Cli {
    #[clap(long, short, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[clap(long, short = 'c', global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[clap(long, short = 's', global = true, help = "Path to the snapshot file")]
    pub snapshot: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "Assemble the injected text for one turn")]
    Inject(InjectCommand),

    #[clap(about = "Show how every knowledge entry scores against a text")]
    Preview(PreviewCommand),

    #[clap(about = "Memory management commands")]
    Memory(MemoryCommand),

    #[clap(about = "Knowledge base commands")]
    Knowledge(KnowledgeCommand),

    #[clap(about = "Manually archive a batch of memories")]
    Archive(ArchiveCommand),

    #[clap(about = "Classify a text into a scene")]
    Classify(ClassifyCommand),

    #[clap(about = "Show tier statistics")]
    Stats(StatsCommand),

    #[clap(about = "Configuration commands")]
    Config(ConfigCommand),
}

impl Command {
    fn modifies_snapshot(&self) -> bool {
        match self {
            Command::Memory(cmd) => cmd.modifies(),
            Command::Knowledge(cmd) => cmd.modifies(),
            Command::Archive(_) => true,
            _ => false,
        }
    }
}

#[tokio::main]
async fn main() {
    init_logging();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,recollect=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };

    if let Command::Config(cmd) = &cli.command {
        return cmd.execute(cli.config.as_deref(), format).await;
    }

    let config = Config::load(cli.config.as_deref())?;
    let snapshot_path = cli.snapshot.clone().unwrap_or_else(Snapshot::default_path);
    let mut engine = Snapshot::load(&snapshot_path)?.into_engine(config, Handle::current())?;

    match &cli.command {
        Command::Inject(cmd) => cmd.execute(&engine, format).await?,
        Command::Preview(cmd) => cmd.execute(&engine, format).await?,
        Command::Memory(cmd) => cmd.execute(&mut engine, format).await?,
        Command::Knowledge(cmd) => cmd.execute(&mut engine, format).await?,
        Command::Archive(cmd) => cmd.execute(&mut engine, format).await?,
        Command::Classify(cmd) => cmd.execute(&engine, format).await?,
        Command::Stats(cmd) => cmd.execute(&engine, format).await?,
        Command::Config(_) => unreachable!(),
    }

    if cli.command.modifies_snapshot() {
        let applied = engine.flush_summaries().await;
        if applied > 0 {
            debug!(applied, "Applied summaries before saving");
        }
        Snapshot::capture(&engine).save(&snapshot_path)?;
    }

    Ok(())
}
