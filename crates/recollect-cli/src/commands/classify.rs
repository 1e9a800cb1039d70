use clap::Parser;
use recollect::ContextEngine;

use crate::error::CliResult;
use crate::output::{OutputFormat, new_table, print_json};

#[derive(Parser)]
pub struct ClassifyCommand {
    #[clap(help = "Text to classify")]
    pub text: String,
}

impl ClassifyCommand {
    pub async fn execute(&self, engine: &ContextEngine, format: OutputFormat) -> CliResult<()> {
        let classification = engine.classify(&self.text);
        let weights = engine
            .assembler()
            .classifier()
            .weights_for(&classification);

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "classification": classification,
                    "weights": weights,
                });
                print_json(&output)?;
            }
            OutputFormat::Table => {
                println!(
                    "Scene: {} (confidence {:.2}{})\n",
                    classification.primary,
                    classification.confidence,
                    if classification.is_mixed() { ", mixed" } else { "" }
                );

                let mut scenes = new_table(["Scene", "Share"]);
                for (scene, share) in &classification.scene_scores {
                    scenes.add_row([scene.to_string(), format!("{share:.2}")]);
                }
                println!("{scenes}\n");

                let mut table = new_table(["Weight", "Value"]);
                table.add_row(["time_decay".to_string(), format!("{:.3}", weights.time_decay)]);
                table.add_row([
                    "importance_weight".to_string(),
                    format!("{:.3}", weights.importance_weight),
                ]);
                table.add_row([
                    "keyword_weight".to_string(),
                    format!("{:.3}", weights.keyword_weight),
                ]);
                table.add_row([
                    "relationship_bonus".to_string(),
                    format!("{:.3}", weights.relationship_bonus),
                ]);
                table.add_row([
                    "recency_window".to_string(),
                    format!("{} ticks", weights.recency_window),
                ]);
                println!("{table}");
            }
        }

        Ok(())
    }
}
