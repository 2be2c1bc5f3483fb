use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ltm::Engine;
use ltm::config::Config;
use ltm::memory::types::Project;
use ltm_cli::commands::{
    BackfillCommand, ConfigCommand, CuriousCommand, DissonanceCommand, EndSessionCommand,
    ForgetCommand, HistoryCommand, IntegrityCommand, LinkCommand, LoadContextCommand,
    LoadDeferredCommand, RecallCommand, RelatedCommand, RememberCommand, ResearchCommand,
    StartSessionCommand, SupersedeCommand,
};
use ltm_cli::error::CliResult;
use ltm_cli::output::OutputFormat;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "ltm")]
#[command(about = "ltm - long-term memory for coding agents")]
#[command(version)]
pub struct Cli {
    #[clap(long, short, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[clap(long, short = 'c', global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[clap(long, global = true, help = "Path to the memory database")]
    pub db: Option<PathBuf>,

    #[clap(
        long,
        short = 'p',
        global = true,
        help = "Expected project name; must match the project of the working directory"
    )]
    pub project: Option<String>,

    #[clap(
        long,
        global = true,
        conflicts_with = "project",
        help = "Run outside any project (AGENT region only)"
    )]
    pub no_project: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "Store a new memory")]
    Remember(RememberCommand),

    #[clap(about = "Replace a memory with a new version")]
    Supersede(SupersedeCommand),

    #[clap(about = "Search memories, or fetch one by ID")]
    Recall(RecallCommand),

    #[clap(about = "Permanently delete a memory")]
    Forget(ForgetCommand),

    #[clap(about = "Show every version of a memory")]
    History(HistoryCommand),

    #[clap(about = "Link two memories explicitly")]
    Link(LinkCommand),

    #[clap(about = "Show memories linked to a memory")]
    Related(RelatedCommand),

    #[clap(about = "Print the context block for session start")]
    LoadContext(LoadContextCommand),

    #[clap(about = "Print memories deferred by the last load-context")]
    LoadDeferred(LoadDeferredCommand),

    #[clap(about = "Start a session and print its ID")]
    StartSession(StartSessionCommand),

    #[clap(about = "Run decay and close the current session")]
    EndSession(EndSessionCommand),

    #[clap(about = "Queue an open question")]
    Curious(CuriousCommand),

    #[clap(about = "Work the curiosity queue")]
    Research(ResearchCommand),

    #[clap(about = "Track contradictions between memories")]
    Dissonance(DissonanceCommand),

    #[clap(about = "Embed and link memories stored without an embedding")]
    Backfill(BackfillCommand),

    #[clap(about = "Check stored memories for inconsistencies")]
    Integrity(IntegrityCommand),

    #[clap(about = "Configuration commands")]
    Config(ConfigCommand),
}

fn main() {
    init_logging();
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Logs go to stderr so stdout stays clean for the context block
fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,ltm=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(ref db) = cli.db {
        config.storage.db_path = db.clone();
    }
    tracing::debug!("Using database at {}", config.storage.db_path.display());

    if let Command::Config(cmd) = &cli.command {
        return cmd.execute(&config, cli.config.as_deref(), format);
    }

    let engine = Engine::open(config)?;
    let project = current_project(&engine, &cli)?;
    let project = project.as_ref();

    match &cli.command {
        Command::Remember(cmd) => cmd.execute(&engine, project, format),
        Command::Supersede(cmd) => cmd.execute(&engine, format),
        Command::Recall(cmd) => cmd.execute(&engine, project, format),
        Command::Forget(cmd) => cmd.execute(&engine, format),
        Command::History(cmd) => cmd.execute(&engine, format),
        Command::Link(cmd) => cmd.execute(&engine, format),
        Command::Related(cmd) => cmd.execute(&engine, format),
        Command::LoadContext(cmd) => cmd.execute(&engine, project, format),
        Command::LoadDeferred(cmd) => cmd.execute(&engine, project, format),
        Command::StartSession(cmd) => cmd.execute(&engine, format),
        Command::EndSession(cmd) => cmd.execute(&engine, project, format),
        Command::Curious(cmd) => cmd.execute(&engine, project, format),
        Command::Research(cmd) => cmd.execute(&engine, project, format),
        Command::Dissonance(cmd) => cmd.execute(&engine, format),
        Command::Backfill(cmd) => cmd.execute(&engine, format),
        Command::Integrity(cmd) => cmd.execute(&engine, project, format),
        Command::Config(_) => unreachable!(),
    }
}

/// The project of the working directory, checked against `--project`
fn current_project(engine: &Engine, cli: &Cli) -> CliResult<Option<Project>> {
    if cli.no_project {
        return Ok(None);
    }
    let cwd = std::env::current_dir()?;
    let project = engine.resolve_project(&cwd)?;
    if let Some(ref declared) = cli.project {
        engine.check_project(declared, &project)?;
    }
    Ok(Some(project))
}
