use clap::{Parser, Subcommand};
use ltm::Engine;
use ltm::dissonance::{Dissonance, DissonanceDetail};
use ltm::memory::types::Memory;

use crate::error::CliResult;
use crate::output::{OutputFormat, format_timestamp, new_table, print_json, truncate_string};

#[derive(Parser)]
pub struct DissonanceCommand {
    #[clap(subcommand)]
    pub command: DissonanceSubcommand,
}

#[derive(Subcommand)]
pub enum DissonanceSubcommand {
    #[clap(about = "List open contradictions")]
    List(DissonanceListArgs),

    #[clap(about = "Show a contradiction with both memories")]
    Show(DissonanceIdArgs),

    #[clap(about = "Queue a contradiction between two memories")]
    Add(DissonanceAddArgs),

    #[clap(about = "Mark a contradiction as resolved")]
    Resolve(DissonanceResolveArgs),

    #[clap(about = "Dismiss a contradiction as a false alarm")]
    Dismiss(DissonanceIdArgs),
}

#[derive(Parser)]
pub struct DissonanceListArgs {
    #[clap(long, short, help = "Include resolved and dismissed contradictions")]
    pub all: bool,
}

#[derive(Parser)]
pub struct DissonanceIdArgs {
    #[clap(help = "Dissonance ID or unique prefix")]
    pub id: String,
}

#[derive(Parser)]
pub struct DissonanceAddArgs {
    #[clap(help = "First memory ID or unique prefix")]
    pub memory_a: String,

    #[clap(help = "Second memory ID or unique prefix")]
    pub memory_b: String,

    #[clap(help = "Why the two memories contradict")]
    pub description: String,
}

#[derive(Parser)]
pub struct DissonanceResolveArgs {
    #[clap(help = "Dissonance ID or unique prefix")]
    pub id: String,

    #[clap(help = "How the contradiction was settled")]
    pub resolution: String,
}

impl DissonanceCommand {
    pub fn execute(&self, engine: &Engine, format: OutputFormat) -> CliResult<()> {
        match &self.command {
            DissonanceSubcommand::List(args) => Self::list(engine, args.all, format),
            DissonanceSubcommand::Show(args) => {
                let detail = engine.show_dissonance(&args.id)?;
                match format {
                    OutputFormat::Json => print_json(&detail)?,
                    OutputFormat::Table => print_detail(&detail),
                }
                Ok(())
            }
            DissonanceSubcommand::Add(args) => {
                let dissonance =
                    engine.add_dissonance(&args.memory_a, &args.memory_b, &args.description)?;
                match format {
                    OutputFormat::Json => print_json(&dissonance)?,
                    OutputFormat::Table => println!("Dissonance {} queued.", dissonance.short_id()),
                }
                Ok(())
            }
            DissonanceSubcommand::Resolve(args) => {
                let dissonance = engine.resolve_dissonance(&args.id, &args.resolution)?;
                Self::report(&dissonance, format)
            }
            DissonanceSubcommand::Dismiss(args) => {
                let dissonance = engine.dismiss_dissonance(&args.id)?;
                Self::report(&dissonance, format)
            }
        }
    }

    fn report(dissonance: &Dissonance, format: OutputFormat) -> CliResult<()> {
        match format {
            OutputFormat::Json => print_json(dissonance)?,
            OutputFormat::Table => println!(
                "Dissonance {} is now {}.",
                dissonance.short_id(),
                dissonance.status
            ),
        }
        Ok(())
    }

    fn list(engine: &Engine, all: bool, format: OutputFormat) -> CliResult<()> {
        let dissonances = engine.dissonances(all)?;
        match format {
            OutputFormat::Json => print_json(&dissonances)?,
            OutputFormat::Table => {
                if dissonances.is_empty() {
                    println!("No open contradictions.");
                    return Ok(());
                }
                let mut table = new_table(["ID", "Status", "Memory A", "Memory B", "Issue", "Detected"]);
                for d in &dissonances {
                    table.add_row([
                        d.short_id(),
                        d.status.to_string(),
                        d.memory_a.to_string()[..8].to_string(),
                        d.memory_b.to_string()[..8].to_string(),
                        truncate_string(&d.description, 50),
                        format_timestamp(&d.detected_at),
                    ]);
                }
                println!("{table}");
                println!("\nTotal: {} contradictions", dissonances.len());
            }
        }
        Ok(())
    }
}

fn print_detail(detail: &DissonanceDetail) {
    let d = &detail.dissonance;
    println!("Dissonance {} ({})", d.id, d.status);
    println!("Detected: {}", format_timestamp(&d.detected_at));
    println!("Issue: {}", d.description);
    if let Some(ref resolution) = d.resolution {
        println!("Resolution: {resolution}");
    }
    print_side("A", d.memory_a, detail.memory_a.as_ref());
    print_side("B", d.memory_b, detail.memory_b.as_ref());
}

fn print_side(label: &str, id: impl std::fmt::Display, memory: Option<&Memory>) {
    println!("\nMemory {label}: {id}");
    match memory {
        Some(m) => {
            println!("  {} {} created {}", m.kind, m.impact, format_timestamp(&m.created_at));
            for line in m.content.lines() {
                println!("  | {line}");
            }
        }
        None => println!("  (forgotten)"),
    }
}
