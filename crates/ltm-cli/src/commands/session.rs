use chrono::Utc;
use clap::Parser;
use ltm::Engine;
use ltm::memory::types::Project;

use crate::error::CliResult;
use crate::output::{OutputFormat, new_table, print_json};

#[derive(Parser)]
pub struct StartSessionCommand {}

impl StartSessionCommand {
    pub fn execute(&self, engine: &Engine, format: OutputFormat) -> CliResult<()> {
        let id = engine.start_session(Utc::now())?;
        match format {
            OutputFormat::Json => print_json(&serde_json::json!({ "session_id": id }))?,
            OutputFormat::Table => println!("{id}"),
        }
        Ok(())
    }
}

#[derive(Parser)]
pub struct EndSessionCommand {}

impl EndSessionCommand {
    pub fn execute(&self, engine: &Engine, project: Option<&Project>, format: OutputFormat) -> CliResult<()> {
        let summary = engine.end_session(project)?;
        match format {
            OutputFormat::Json => print_json(&summary)?,
            OutputFormat::Table => {
                println!("Decay Results");
                println!("=============\n");

                let mut table = new_table(["Scanned", "Compacted", "Faded", "Re-tiered", "Critical", "Failed"]);
                table.add_row([
                    summary.scanned.to_string(),
                    summary.compacted.to_string(),
                    summary.faded.to_string(),
                    summary.retiered.to_string(),
                    summary.critical_skipped.to_string(),
                    summary.failed.to_string(),
                ]);
                println!("{table}");
            }
        }
        Ok(())
    }
}
