use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "cortex",
    version,
    about = "Unified local store for communications and AI-session history"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a one-shot sync: `all` or a single adapter by name
    Sync {
        /// `all`, or the name of a configured adapter
        target: String,
        /// Ignore watermarks and reimport everything
        #[arg(long)]
        full: bool,
    },
    /// Run the live supervisor until interrupted
    Live,
    /// Print the live status snapshot per adapter
    Status,
}
