//! mtgdb CLI surface.

pub mod feeds;

use clap::{Parser, Subcommand};

pub use mtgdb_common::Result;

#[derive(Parser, Debug)]
#[command(
    name = "mtgdb",
    version,
    about = "Build the canonical Magic: The Gathering card database"
)]
pub struct Cli {
    /// Raise log verbosity (same as MTGDB_DEBUG=1)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the card compilation pipeline and emit artifacts
    Build {
        /// Explicit set codes to build (e.g. LEA,NEO)
        #[arg(long, value_delimiter = ',')]
        sets: Vec<String>,

        /// Build every set
        #[arg(long, conflicts_with = "sets")]
        all_sets: bool,

        /// Set codes to exclude
        #[arg(long, value_delimiter = ',')]
        skip_sets: Vec<String>,

        /// Also emit the compiled outputs (atomic cards, set list)
        #[arg(long)]
        include_compiled_outputs: bool,

        /// Skip set files that already exist
        #[arg(long)]
        resume_build: bool,

        /// Output format subset
        #[arg(long, value_delimiter = ',', default_values_t = [String::from("json")])]
        formats: Vec<String>,

        /// Pretty-print JSON outputs
        #[arg(long)]
        pretty: bool,

        /// Compress finished artifacts (handled by the release tooling;
        /// accepted here so wrapper scripts can pass it through)
        #[arg(long)]
        compress: bool,

        /// Skip the pipeline and re-assemble from cached partitions
        #[arg(long)]
        from_cache: bool,

        /// Re-download sources even when fresh
        #[arg(long)]
        force_refresh: bool,
    },

    /// Run the daily price build only
    Prices {
        /// Object-store bucket for archive sync (omit to skip sync)
        #[arg(long)]
        bucket: Option<String>,
    },

    /// Build the purchase-URL referral map only
    Referrals,
}
