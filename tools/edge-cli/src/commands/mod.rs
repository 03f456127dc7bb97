//! CLI command implementations.

pub mod config;
pub mod prerender;

use clap::{Args, Subcommand};

use edge_core::{CancelPolicy, Tier};

/// Arguments for the prerender command.
#[derive(Args)]
pub struct PrerenderArgs {
    /// Base URL of the running application.
    #[arg(long, env = "EDGE_ORIGIN")]
    pub origin: Option<String>,

    /// Plan tier (free, enterprise).
    #[arg(long)]
    pub tier: Option<Tier>,

    /// Maximum concurrent fetches (can only lower the tier limit).
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Per-request timeout in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// In-flight behavior on Ctrl-C (drain, abandon).
    #[arg(long)]
    pub cancel_policy: Option<CancelPolicy>,

    /// Directory for cache entries (default: .edge/cache).
    #[arg(long)]
    pub cache_dir: Option<String>,

    /// Where to write the run summary (default: .edge/prerender/<run-id>.json).
    #[arg(long)]
    pub summary_out: Option<String>,

    /// Exit non-zero if any path failed.
    #[arg(long)]
    pub strict: bool,
}

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration.
    Show,
    /// Validate the config file.
    Validate,
    /// Print an example config file.
    Example,
}
