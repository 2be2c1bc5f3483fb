use std::path::Path;

use clap::{Parser, Subcommand};
use ltm::config::Config;

use crate::error::CliResult;
use crate::output::{OutputFormat, print_json};

#[derive(Parser)]
pub struct ConfigCommand {
    #[clap(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    #[clap(about = "Show the effective configuration")]
    Show,
}

impl ConfigCommand {
    pub fn execute(&self, config: &Config, config_path: Option<&Path>, format: OutputFormat) -> CliResult<()> {
        match &self.command {
            ConfigSubcommand::Show => Self::show(config, config_path, format),
        }
    }

    fn show(config: &Config, config_path: Option<&Path>, format: OutputFormat) -> CliResult<()> {
        match format {
            OutputFormat::Json => print_json(config)?,
            OutputFormat::Table => {
                match config_path {
                    Some(path) => println!("# Configuration from: {}", path.display()),
                    None => println!("# Configuration (defaults or discovered file)"),
                }
                println!("{}", toml::to_string_pretty(config)?);
            }
        }
        Ok(())
    }
}
