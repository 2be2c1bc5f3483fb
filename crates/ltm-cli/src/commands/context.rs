use clap::Parser;
use ltm::Engine;
use ltm::injection::Budget;
use ltm::memory::types::{Agent, Project};

use crate::error::CliResult;
use crate::output::{OutputFormat, print_json};

#[derive(Parser)]
pub struct LoadContextCommand {
    #[clap(long, help = "Load as this sub-agent, inheriting the primary agent's CORE memories")]
    pub subagent: Option<String>,

    #[clap(long, conflicts_with = "fraction", help = "Token budget for the block")]
    pub tokens: Option<usize>,

    #[clap(long, help = "Share of the context window to use, in (0, 1]")]
    pub fraction: Option<f64>,

    #[clap(long, requires = "fraction", help = "Host context window in tokens")]
    pub context_window: Option<usize>,

    #[clap(long, help = "Print injection statistics to stderr")]
    pub stats: bool,
}

impl LoadContextCommand {
    pub fn execute(&self, engine: &Engine, project: Option<&Project>, format: OutputFormat) -> CliResult<()> {
        let budget = match (self.tokens, self.fraction) {
            (Some(tokens), _) => Some(Budget::Tokens(tokens)),
            (None, Some(fraction)) => Some(Budget::fraction(
                self.context_window
                    .unwrap_or(engine.config().budget.context_window),
                fraction,
            )?),
            (None, None) => None,
        };
        let subagent = self.subagent.as_deref().map(subagent);

        let context = engine.load_context(project, subagent.as_ref(), budget)?;

        match format {
            OutputFormat::Json => print_json(&context)?,
            OutputFormat::Table => {
                println!("{}", context.text);
                if self.stats {
                    let s = &context.stats;
                    eprintln!(
                        "core={} active={} contextual={} inherited={} deferred={} untrusted={} tokens={}/{}",
                        s.core,
                        s.active,
                        s.contextual,
                        s.inherited,
                        s.deferred,
                        s.untrusted,
                        s.tokens_used,
                        s.budget_tokens
                    );
                }
            }
        }
        Ok(())
    }
}

#[derive(Parser)]
pub struct LoadDeferredCommand {
    #[clap(long, help = "Drain the list recorded for this sub-agent")]
    pub subagent: Option<String>,
}

impl LoadDeferredCommand {
    pub fn execute(&self, engine: &Engine, project: Option<&Project>, format: OutputFormat) -> CliResult<()> {
        let subagent = self.subagent.as_deref().map(subagent);
        let text = engine.load_deferred(project, subagent.as_ref())?;

        match format {
            OutputFormat::Json => print_json(&serde_json::json!({ "text": text }))?,
            OutputFormat::Table => {
                if !text.is_empty() {
                    println!("{text}");
                }
            }
        }
        Ok(())
    }
}

/// Sub-agents are addressed by display name; the id is its slug
fn subagent(name: &str) -> Agent {
    let id: String = name
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    Agent::new(id, name.trim())
}
