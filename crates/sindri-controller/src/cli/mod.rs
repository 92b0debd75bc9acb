/// Command-line interface module for the Sindri controller.
pub mod commands;
use clap::{Parser, Subcommand};

/// CLI configuration structure.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Start the controller
    Start {
        /// Configuration file layered over the defaults
        #[arg(long, env = "SINDRI_CONFIG")]
        config: Option<String>,
    },
    /// Print the CustomResourceDefinitions Sindri owns as YAML
    Crds,
}

/// Parses command-line arguments into the Cli structure.
pub fn parse_cli() -> Cli {
    Cli::parse()
}
