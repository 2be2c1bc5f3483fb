use clap::Parser;
use ltm::Engine;
use ltm::engine::{NewMemory, RecallQuery, Remembered};
use ltm::memory::types::{Impact, LinkType, MemoryKind, Project, Region};

use crate::error::CliResult;
use crate::output::{OutputFormat, format_timestamp, new_table, print_json, truncate_string};

#[derive(Parser)]
pub struct RememberCommand {
    #[clap(help = "Memory content text")]
    pub text: String,

    #[clap(long, short, help = "Kind (EMOTIONAL, ARCHITECTURAL, LEARNINGS, ACHIEVEMENTS, INTROSPECT, DREAM); inferred when omitted")]
    pub kind: Option<MemoryKind>,

    #[clap(long, short, help = "Impact (CRITICAL, HIGH, MEDIUM, LOW); inferred when omitted")]
    pub impact: Option<Impact>,

    #[clap(long, short, help = "Region (AGENT or PROJECT); inferred when omitted")]
    pub region: Option<Region>,

    #[clap(long, help = "Host platform tag")]
    pub platform: Option<String>,

    #[clap(long, help = "Git commit the memory relates to")]
    pub commit: Option<String>,

    #[clap(long, help = "Git branch the memory relates to")]
    pub branch: Option<String>,
}

impl RememberCommand {
    pub fn execute(&self, engine: &Engine, project: Option<&Project>, format: OutputFormat) -> CliResult<()> {
        let mut new = NewMemory::new(&self.text).git(self.commit.clone(), self.branch.clone());
        if let Some(kind) = self.kind {
            new = new.kind(kind);
        }
        if let Some(impact) = self.impact {
            new = new.impact(impact);
        }
        if let Some(region) = self.region {
            new = new.region(region);
        }
        if let Some(ref platform) = self.platform {
            new = new.platform(platform);
        }
        if let Some(project) = project {
            new = new.in_project(project.clone());
        }

        let remembered = engine.remember(new)?;
        print_remembered(&remembered, "Memory stored", format)
    }
}

#[derive(Parser)]
pub struct SupersedeCommand {
    #[clap(help = "ID or unique prefix of the memory to replace")]
    pub id: String,

    #[clap(help = "Replacement content")]
    pub text: String,
}

impl SupersedeCommand {
    pub fn execute(&self, engine: &Engine, format: OutputFormat) -> CliResult<()> {
        let remembered = engine.supersede(&self.id, &self.text)?;
        print_remembered(&remembered, "Memory superseded", format)
    }
}

fn print_remembered(remembered: &Remembered, verb: &str, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(remembered)?,
        OutputFormat::Table => {
            let memory = &remembered.memory;
            println!("{verb}.");
            println!("ID: {}", memory.id);
            println!(
                "{} {} {} (version {})",
                memory.kind, memory.impact, memory.tier, memory.version
            );
            if remembered.links.total() > 0 {
                println!(
                    "Links: {} created, {} strengthened",
                    remembered.links.created, remembered.links.strengthened
                );
            }
            if remembered.degraded {
                println!("Stored without an embedding; run `ltm backfill` once the model is available.");
            }
        }
    }
    Ok(())
}

#[derive(Parser)]
pub struct RecallCommand {
    #[clap(required_unless_present = "id", help = "Search text")]
    pub query: Option<String>,

    #[clap(long, conflicts_with = "query", help = "Fetch one memory by ID or unique prefix")]
    pub id: Option<String>,

    #[clap(long, help = "Keyword search only, skip the embedding model")]
    pub keyword: bool,

    #[clap(long, short, help = "Maximum number of memories to return")]
    pub limit: Option<usize>,

    #[clap(long, short, value_delimiter = ',', help = "Restrict to these kinds (comma separated)")]
    pub kind: Vec<MemoryKind>,
}

impl RecallCommand {
    pub fn execute(&self, engine: &Engine, project: Option<&Project>, format: OutputFormat) -> CliResult<()> {
        let mut query = match (&self.id, &self.query) {
            (Some(id), _) => RecallQuery::id(id),
            (None, Some(text)) => RecallQuery::text(text),
            (None, None) => return Err("Either a query or --id is required".into()),
        };
        if self.keyword {
            query = query.keyword_only();
        }
        if let Some(limit) = self.limit {
            query = query.limit(limit);
        }
        query = query
            .in_project(project.cloned())
            .with_kinds(self.kind.clone());

        let outcome = engine.recall(&query)?;

        match format {
            OutputFormat::Json => print_json(&outcome)?,
            OutputFormat::Table => {
                if outcome.degraded {
                    println!("(semantic search unavailable, showing keyword matches)");
                }
                if outcome.hits.is_empty() {
                    println!("No memories found.");
                    return Ok(());
                }

                let mut table = new_table(["ID", "Kind", "Impact", "Tier", "Score", "Content", "Created"]);
                for hit in &outcome.hits {
                    let memory = &hit.memory;
                    let mut content = truncate_string(&memory.content, 60);
                    if memory.superseded_by.is_some() {
                        content.push_str(" (superseded)");
                    }
                    table.add_row([
                        memory.short_id(),
                        memory.kind.to_string(),
                        memory.impact.to_string(),
                        memory.tier.to_string(),
                        hit.score.map(|s| format!("{s:.3}")).unwrap_or_else(|| "-".to_string()),
                        content,
                        format_timestamp(&memory.created_at),
                    ]);
                }
                println!("{table}");
                println!("\nTotal: {} memories ({:?})", outcome.hits.len(), outcome.mode);
            }
        }
        Ok(())
    }
}

#[derive(Parser)]
pub struct ForgetCommand {
    #[clap(help = "ID or unique prefix of the memory to delete")]
    pub id: String,
}

impl ForgetCommand {
    pub fn execute(&self, engine: &Engine, format: OutputFormat) -> CliResult<()> {
        let memory = engine.forget(&self.id)?;
        match format {
            OutputFormat::Json => print_json(&serde_json::json!({
                "id": memory.id.to_string(),
                "deleted": true,
            }))?,
            OutputFormat::Table => println!("Memory {} deleted.", memory.id),
        }
        Ok(())
    }
}

#[derive(Parser)]
pub struct HistoryCommand {
    #[clap(help = "ID or unique prefix of any version of the memory")]
    pub id: String,
}

impl HistoryCommand {
    pub fn execute(&self, engine: &Engine, format: OutputFormat) -> CliResult<()> {
        let chain = engine.supersession_chain(&self.id)?;
        match format {
            OutputFormat::Json => print_json(&chain)?,
            OutputFormat::Table => {
                let mut table = new_table(["Version", "ID", "Content", "Created", "Current"]);
                for memory in &chain {
                    table.add_row([
                        memory.version.to_string(),
                        memory.short_id(),
                        truncate_string(&memory.content, 60),
                        format_timestamp(&memory.created_at),
                        if memory.is_current() { "yes" } else { "" }.to_string(),
                    ]);
                }
                println!("{table}");
            }
        }
        Ok(())
    }
}

#[derive(Parser)]
pub struct LinkCommand {
    #[clap(help = "Source memory ID or prefix")]
    pub source: String,

    #[clap(help = "Target memory ID or prefix")]
    pub target: String,

    #[clap(
        long,
        short = 't',
        default_value = "RELATES_TO",
        help = "Link type (RELATES_TO, BUILDS_ON, CONTRADICTS, SUPERSEDES)"
    )]
    pub link_type: LinkType,
}

impl LinkCommand {
    pub fn execute(&self, engine: &Engine, format: OutputFormat) -> CliResult<()> {
        let link = engine.link(&self.source, &self.target, self.link_type)?;
        match format {
            OutputFormat::Json => print_json(&link)?,
            OutputFormat::Table => println!(
                "Linked {} -[{}]-> {}",
                link.source_id, link.link_type, link.target_id
            ),
        }
        Ok(())
    }
}

#[derive(Parser)]
pub struct RelatedCommand {
    #[clap(help = "ID or unique prefix of the starting memory")]
    pub id: String,

    #[clap(long, short, default_value = "2", help = "Maximum hops to follow")]
    pub depth: usize,

    #[clap(long, short = 't', value_delimiter = ',', help = "Only follow these link types")]
    pub link_type: Vec<LinkType>,
}

impl RelatedCommand {
    pub fn execute(&self, engine: &Engine, format: OutputFormat) -> CliResult<()> {
        let types = (!self.link_type.is_empty()).then_some(self.link_type.as_slice());
        let related = engine.linked_memories(&self.id, self.depth, types)?;

        match format {
            OutputFormat::Json => print_json(&related)?,
            OutputFormat::Table => {
                if related.is_empty() {
                    println!("No linked memories.");
                    return Ok(());
                }
                let mut table = new_table(["Depth", "ID", "Link", "Similarity", "Content"]);
                for linked in &related {
                    table.add_row([
                        linked.depth.to_string(),
                        linked.memory.short_id(),
                        linked.link_type.to_string(),
                        linked
                            .similarity
                            .map(|s| format!("{s:.3}"))
                            .unwrap_or_else(|| "-".to_string()),
                        truncate_string(&linked.memory.content, 60),
                    ]);
                }
                println!("{table}");
            }
        }
        Ok(())
    }
}
