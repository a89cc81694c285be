//! Command-line surface, following the teacher's `clap` derive layout.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "whalewatch", version, about = "Whale-trade alerting engine for a prediction-market venue")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the poll-ingest-match-deliver loop until interrupted.
    Run,
    /// Validate configuration and upstream connectivity, then exit.
    Check,
    /// Create or repair the store's indexes, then exit.
    MigrateIndexes,
}
