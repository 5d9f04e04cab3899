use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "overseer", version, about = "Multi-agent controller for terminal tasks")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one task to completion
    Run {
        /// The task instruction
        #[arg(short, long)]
        instruction: String,

        /// Docker container to execute in (mutually exclusive with --root)
        #[arg(short, long, conflicts_with = "root")]
        container: Option<String>,

        /// Local directory to execute in instead of a container
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Model identifier (overrides LITELLM_MODEL)
        #[arg(short, long)]
        model: Option<String>,

        /// Directory for per-agent turn logs (overrides AGENT_LOG_DIR)
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },
}
