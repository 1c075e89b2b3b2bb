// src/cli.rs
// =============================================================================
// Command-line interface, built with clap's derive API.
//
// Subcommands:
// - crawl:  discover lemmy/piefed servers and write the directory
// - report: print a snapshot written by an earlier crawl
//
// Every crawl knob can also come from a SCOUT_* environment variable, which
// is handy for cron jobs and containers.
// =============================================================================

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "threadiverse-scout",
    version,
    about = "Discover active lemmy and piefed servers by walking their federation peers",
    long_about = "threadiverse-scout starts from a few seed servers, follows each server's list of \
                  federated peers, and writes a sorted directory of public, active instances."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Crawl the federation graph and write instances.json
    ///
    /// Example: threadiverse-scout crawl lemmy.world --deadline-secs 300
    Crawl(CrawlArgs),

    /// Print a previously written snapshot
    ///
    /// Example: threadiverse-scout report data/instances.json
    Report {
        /// Path to instances.json or instances.min.json
        path: PathBuf,

        /// Output the snapshot as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct CrawlArgs {
    /// Servers to start from (bare domains or URLs)
    #[arg(
        env = "SCOUT_SEEDS",
        value_delimiter = ',',
        default_values_t = [
            "lemmy.world".to_string(),
            "lemmy.ml".to_string(),
            "piefed.social".to_string(),
        ]
    )]
    pub seeds: Vec<String>,

    /// Workers that stay alive for the whole crawl
    #[arg(long, env = "SCOUT_MIN_CONCURRENCY", default_value_t = 4)]
    pub min_concurrency: usize,

    /// Upper bound on servers processed at the same time
    #[arg(long, env = "SCOUT_MAX_CONCURRENCY", default_value_t = 32)]
    pub max_concurrency: usize,

    /// Timeout for a single HTTP request
    #[arg(long, env = "SCOUT_REQUEST_TIMEOUT_SECS", default_value_t = 5)]
    pub request_timeout_secs: u64,

    /// Timeout for processing one server end to end
    #[arg(long, env = "SCOUT_TASK_TIMEOUT_SECS", default_value_t = 10)]
    pub task_timeout_secs: u64,

    /// Extra attempts after a server's task times out
    #[arg(long, env = "SCOUT_MAX_RETRIES", default_value_t = 3)]
    pub max_retries: u32,

    /// Stop the whole crawl after this many seconds (default: 20 minutes)
    #[arg(long, env = "SCOUT_DEADLINE_SECS", default_value_t = 1200)]
    pub deadline_secs: u64,

    /// Write a snapshot every N seconds while crawling
    #[arg(long, env = "SCOUT_SNAPSHOT_INTERVAL_SECS", default_value_t = 60)]
    pub snapshot_interval_secs: u64,

    /// Monthly active users a server needs to be listed
    #[arg(long, env = "SCOUT_MIN_ACTIVE_USERS", default_value_t = 20)]
    pub min_active_users: u64,

    /// Only follow peers seen within this many days
    #[arg(long, env = "SCOUT_RECENCY_DAYS", default_value_t = 30)]
    pub recency_days: u32,

    /// Directory for instances.json and instances.min.json
    #[arg(long, env = "SCOUT_OUTPUT_DIR", default_value = "data")]
    pub output_dir: PathBuf,

    /// Print the final snapshot as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}
