use clap::{Parser, Subcommand};
use ltm::Engine;
use ltm::curiosity::{CuriosityFilter, CuriosityItem};
use ltm::memory::types::{Project, Region};

use crate::error::CliResult;
use crate::output::{OutputFormat, format_timestamp, new_table, print_json, truncate_string};

#[derive(Parser)]
pub struct CuriousCommand {
    #[clap(help = "The open question")]
    pub question: String,

    #[clap(long, help = "What prompted the question")]
    pub context: Option<String>,

    #[clap(long, short, default_value = "AGENT", help = "Region (AGENT or PROJECT)")]
    pub region: Region,
}

impl CuriousCommand {
    pub fn execute(&self, engine: &Engine, project: Option<&Project>, format: OutputFormat) -> CliResult<()> {
        let item = engine.curious(&self.question, self.region, self.context.as_deref(), project)?;
        match format {
            OutputFormat::Json => print_json(&item)?,
            OutputFormat::Table => {
                if item.recurrence_count > 1 {
                    println!(
                        "Question {} seen again ({} times).",
                        item.short_id(),
                        item.recurrence_count
                    );
                } else {
                    println!("Question {} queued.", item.short_id());
                }
            }
        }
        Ok(())
    }
}

#[derive(Parser)]
pub struct ResearchCommand {
    #[clap(subcommand)]
    pub command: ResearchSubcommand,
}

#[derive(Subcommand)]
pub enum ResearchSubcommand {
    #[clap(about = "Show the highest-priority open question")]
    Pop,

    #[clap(about = "Mark a question as researched")]
    Complete(ItemArgs),

    #[clap(about = "Dismiss a question")]
    Dismiss(ItemArgs),

    #[clap(about = "List questions by priority")]
    List(ListArgs),

    #[clap(about = "Adjust a question's priority")]
    Boost(BoostArgs),

    #[clap(about = "Show when research last ran")]
    Last,
}

#[derive(Parser)]
pub struct ItemArgs {
    #[clap(help = "Question ID or unique prefix")]
    pub id: String,
}

#[derive(Parser)]
pub struct ListArgs {
    #[clap(long, short, help = "Include researched and dismissed questions")]
    pub all: bool,
}

#[derive(Parser)]
pub struct BoostArgs {
    #[clap(help = "Question ID or unique prefix")]
    pub id: String,

    #[clap(allow_hyphen_values = true, help = "Points to add; negative lowers the priority")]
    pub amount: i64,
}

impl ResearchCommand {
    pub fn execute(&self, engine: &Engine, project: Option<&Project>, format: OutputFormat) -> CliResult<()> {
        match &self.command {
            ResearchSubcommand::Pop => {
                let item = engine.research_pop(project)?;
                match format {
                    OutputFormat::Json => print_json(&item)?,
                    OutputFormat::Table => match item {
                        Some(item) => print_item(engine, &item),
                        None => println!("No open questions."),
                    },
                }
                Ok(())
            }
            ResearchSubcommand::Complete(args) => {
                let item = engine.complete_research(&args.id)?;
                Self::report(&item, format)
            }
            ResearchSubcommand::Dismiss(args) => {
                let item = engine.dismiss_research(&args.id)?;
                Self::report(&item, format)
            }
            ResearchSubcommand::Boost(args) => {
                let item = engine.boost_research(&args.id, args.amount)?;
                match format {
                    OutputFormat::Json => print_json(&item)?,
                    OutputFormat::Table => println!(
                        "Question {} now at priority {}.",
                        item.short_id(),
                        engine.curiosity_priority(&item)
                    ),
                }
                Ok(())
            }
            ResearchSubcommand::List(args) => Self::list(engine, project, args, format),
            ResearchSubcommand::Last => {
                let last = engine.last_research()?;
                match format {
                    OutputFormat::Json => print_json(&serde_json::json!({
                        "last_research": last.map(|dt| dt.to_rfc3339()),
                    }))?,
                    OutputFormat::Table => match last {
                        Some(dt) => println!("{}", format_timestamp(&dt)),
                        None => println!("Never."),
                    },
                }
                Ok(())
            }
        }
    }

    fn report(item: &CuriosityItem, format: OutputFormat) -> CliResult<()> {
        match format {
            OutputFormat::Json => print_json(item)?,
            OutputFormat::Table => println!("Question {} is now {}.", item.short_id(), item.status),
        }
        Ok(())
    }

    fn list(engine: &Engine, project: Option<&Project>, args: &ListArgs, format: OutputFormat) -> CliResult<()> {
        let mut filter = CuriosityFilter::open(&engine.agent().id, project.map(|p| p.id.as_str()));
        if args.all {
            filter = filter.all();
        }
        let items = engine.curiosity_list(&filter)?;

        match format {
            OutputFormat::Json => {
                let output: Vec<_> = items
                    .iter()
                    .map(|item| {
                        serde_json::json!({
                            "item": item,
                            "priority": engine.curiosity_priority(item),
                        })
                    })
                    .collect();
                print_json(&output)?;
            }
            OutputFormat::Table => {
                if items.is_empty() {
                    println!("No questions found.");
                    return Ok(());
                }
                let mut table = new_table(["ID", "Priority", "Seen", "Status", "Region", "Question", "Last Seen"]);
                for item in &items {
                    table.add_row([
                        item.short_id(),
                        engine.curiosity_priority(item).to_string(),
                        item.recurrence_count.to_string(),
                        item.status.to_string(),
                        item.region.to_string(),
                        truncate_string(&item.question, 60),
                        format_timestamp(&item.last_seen),
                    ]);
                }
                println!("{table}");
                println!("\nTotal: {} questions", items.len());
            }
        }
        Ok(())
    }
}

fn print_item(engine: &Engine, item: &CuriosityItem) {
    println!("{}", item.question);
    println!("ID: {}", item.id);
    println!(
        "Priority: {} (asked {} times)",
        engine.curiosity_priority(item),
        item.recurrence_count
    );
    if let Some(ref context) = item.context {
        println!("Context: {context}");
    }
}
