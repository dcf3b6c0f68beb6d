use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// `phasegate` - contract-driven, gated task execution.
#[derive(Parser, Debug)]
#[command(name = "phasegate")]
#[command(version)]
#[command(about = "Run phased task contracts behind policy gates.", long_about = None)]
pub struct Cli {
    /// Config file (default: ./phasegate.toml, then ~/.phasegate/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a contract (JSON, YAML or TOML)
    Execute {
        /// Path to the contract file
        contract: PathBuf,

        /// Parse, hash and dry-run gates without executing any command
        #[arg(long)]
        plan: bool,

        /// Run even if a successful report for the same plan hash exists
        #[arg(long)]
        force: bool,

        /// Bound on concurrently running tasks within a phase
        #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
        max_workers: Option<u16>,

        /// Directory holding evidence/ and reports/ (overrides config)
        #[arg(long)]
        state_dir: Option<PathBuf>,

        /// Working directory for tasks and gates (default: current directory)
        #[arg(long)]
        workdir: Option<PathBuf>,

        /// Print the report JSON instead of the text summary
        #[arg(long)]
        json: bool,
    },

    /// Print the summary of a stored report
    Show {
        /// Path to a report JSON file
        report: PathBuf,

        /// Print the raw report JSON
        #[arg(long)]
        json: bool,

        /// Directory holding evidence/ (for output excerpts)
        #[arg(long)]
        state_dir: Option<PathBuf>,
    },

    /// Write a stored evidence blob to stdout
    Evidence {
        /// SHA-256 digest of the blob
        digest: String,

        /// Directory holding evidence/ (overrides config)
        #[arg(long)]
        state_dir: Option<PathBuf>,
    },
}
