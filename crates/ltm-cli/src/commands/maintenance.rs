use clap::Parser;
use ltm::Engine;
use ltm::integrity::Severity;
use ltm::memory::types::Project;

use crate::error::CliResult;
use crate::output::{OutputFormat, new_table, print_json};

#[derive(Parser)]
pub struct BackfillCommand {
    #[clap(long, short, help = "Memories embedded per transaction (defaults to embedding.batch_size)")]
    pub batch_size: Option<usize>,

    #[clap(long, help = "Only count memories that lack an embedding")]
    pub dry_run: bool,
}

impl BackfillCommand {
    pub fn execute(&self, engine: &Engine, format: OutputFormat) -> CliResult<()> {
        let report = engine.backfill(self.batch_size, self.dry_run)?;
        match format {
            OutputFormat::Json => print_json(&report)?,
            OutputFormat::Table => {
                if report.dry_run {
                    println!("{} memories without embeddings.", report.pending);
                    return Ok(());
                }
                let mut table = new_table(["Pending", "Embedded", "Linked", "Failed", "Batches"]);
                table.add_row([
                    report.pending.to_string(),
                    report.embedded.to_string(),
                    report.linked.to_string(),
                    report.failed.to_string(),
                    report.batches.to_string(),
                ]);
                println!("{table}");
                if report.failed > 0 {
                    println!("Backfill stopped early; run it again to resume.");
                }
            }
        }
        Ok(())
    }
}

#[derive(Parser)]
pub struct IntegrityCommand {}

impl IntegrityCommand {
    pub fn execute(&self, engine: &Engine, project: Option<&Project>, format: OutputFormat) -> CliResult<()> {
        let report = engine.check_integrity(project)?;
        match format {
            OutputFormat::Json => print_json(&report)?,
            OutputFormat::Table => {
                println!("Checked {} memories.", report.checked);
                if report.is_clean() {
                    println!("No issues found.");
                } else {
                    let mut table = new_table(["Severity", "Memory", "Issue", "Detail"]);
                    for issue in &report.issues {
                        table.add_row([
                            match issue.severity {
                                Severity::Error => "ERROR".to_string(),
                                Severity::Warning => "WARN".to_string(),
                            },
                            issue.memory_id.to_string()[..8].to_string(),
                            format!("{:?}", issue.kind),
                            issue.message.clone(),
                        ]);
                    }
                    println!("{table}");
                }
            }
        }
        if report.errors() > 0 {
            return Err(format!("integrity check found {} errors", report.errors()).into());
        }
        Ok(())
    }
}
