use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use recollect::Config;

use crate::error::CliResult;
use crate::output::{OutputFormat, new_table, print_json};

#[derive(Parser)]
pub struct ConfigCommand {
    #[clap(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    #[clap(about = "Show current configuration")]
    Show,

    #[clap(about = "Write the default configuration to a file")]
    Init(InitArgs),
}

#[derive(Parser)]
pub struct InitArgs {
    #[clap(default_value = "recollect.toml", help = "Destination path")]
    pub path: PathBuf,

    #[clap(long, help = "Overwrite an existing file")]
    pub force: bool,
}

impl ConfigCommand {
    pub async fn execute(
        &self,
        config_path: Option<&Path>,
        format: OutputFormat,
    ) -> CliResult<()> {
        match &self.command {
            ConfigSubcommand::Show => Self::show(config_path, format),
            ConfigSubcommand::Init(args) => Self::init(args, format),
        }
    }

    fn show(config_path: Option<&Path>, format: OutputFormat) -> CliResult<()> {
        let config = Config::load(config_path)?;
        let value = serde_json::to_value(&config)?;

        match format {
            OutputFormat::Json => print_json(&value)?,
            OutputFormat::Table => {
                match config_path {
                    Some(path) => println!("Configuration from: {}", path.display()),
                    None => println!("Configuration: (default search path)"),
                }
                println!("==============================\n");

                let Some(sections) = value.as_object() else {
                    return Ok(());
                };
                for (section, settings) in sections {
                    println!("[{section}]");
                    let mut table = new_table(["Setting", "Value"]);
                    if let Some(settings) = settings.as_object() {
                        for (key, setting) in settings {
                            table.add_row([key.clone(), display_value(setting)]);
                        }
                    }
                    println!("{table}\n");
                }
            }
        }

        Ok(())
    }

    fn init(args: &InitArgs, format: OutputFormat) -> CliResult<()> {
        if args.path.exists() && !args.force {
            return Err(format!(
                "{} already exists (use --force to overwrite)",
                args.path.display()
            )
            .into());
        }

        let content = toml::to_string_pretty(&Config::default())?;
        std::fs::write(&args.path, content)?;

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "path": args.path.display().to_string(),
                    "written": true,
                });
                print_json(&output)?;
            }
            OutputFormat::Table => {
                println!("Default configuration written to {}", args.path.display());
            }
        }

        Ok(())
    }
}

fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) if s.is_empty() => "(not set)".to_string(),
        serde_json::Value::String(s) if s.contains('\n') => {
            format!("{}... ({} lines)", s.lines().next().unwrap_or_default(), s.lines().count())
        }
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display_value() {
        assert_eq!(display_value(&json!("")), "(not set)");
        assert_eq!(display_value(&json!("gpt-4o-mini")), "gpt-4o-mini");
        assert_eq!(display_value(&json!(120)), "120");
        assert_eq!(display_value(&json!("first\nsecond")), "first... (2 lines)");
    }

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let content = toml::to_string_pretty(&Config::default()).unwrap();
        let parsed: Config = toml::from_str(&content).unwrap();
        assert_eq!(parsed.cache.ttl_ticks, Config::default().cache.ttl_ticks);
        assert_eq!(
            parsed.knowledge.match_sources.len(),
            Config::default().knowledge.match_sources.len()
        );
    }
}
