// src/config.rs
// =============================================================================
// The validated crawl configuration.
//
// CrawlArgs (cli.rs) is what the user typed. CrawlConfig is what the crawler
// runs with: durations instead of raw seconds, and every value checked.
// =============================================================================

use crate::cli::CrawlArgs;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one seed server is required")]
    NoSeeds,
    #[error("min concurrency must be at least 1")]
    ZeroConcurrency,
    #[error("min concurrency ({min}) is larger than max concurrency ({max})")]
    ConcurrencyRange { min: usize, max: usize },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub seeds: Vec<String>,
    pub min_concurrency: usize,
    pub max_concurrency: usize,
    pub request_timeout: Duration,
    pub task_timeout: Duration,
    pub max_retries: u32,
    pub deadline: Duration,
    pub snapshot_interval: Duration,
    pub min_active_users: u64,
    pub recency_days: u32,
    pub output_dir: PathBuf,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            seeds: vec![
                "lemmy.world".to_string(),
                "lemmy.ml".to_string(),
                "piefed.social".to_string(),
            ],
            min_concurrency: 4,
            max_concurrency: 32,
            request_timeout: Duration::from_secs(5),
            task_timeout: Duration::from_secs(10),
            max_retries: 3,
            deadline: Duration::from_secs(20 * 60),
            snapshot_interval: Duration::from_secs(60),
            min_active_users: 20,
            recency_days: 30,
            output_dir: PathBuf::from("data"),
        }
    }
}

impl CrawlConfig {
    pub fn from_args(args: &CrawlArgs) -> Result<Self, ConfigError> {
        let config = Self {
            seeds: args
                .seeds
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            min_concurrency: args.min_concurrency,
            max_concurrency: args.max_concurrency,
            request_timeout: Duration::from_secs(args.request_timeout_secs),
            task_timeout: Duration::from_secs(args.task_timeout_secs),
            max_retries: args.max_retries,
            deadline: Duration::from_secs(args.deadline_secs),
            snapshot_interval: Duration::from_secs(args.snapshot_interval_secs),
            min_active_users: args.min_active_users,
            recency_days: args.recency_days,
            output_dir: args.output_dir.clone(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.seeds.is_empty() {
            return Err(ConfigError::NoSeeds);
        }
        if self.min_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.min_concurrency > self.max_concurrency {
            return Err(ConfigError::ConcurrencyRange {
                min: self.min_concurrency,
                max: self.max_concurrency,
            });
        }

        let durations = [
            ("request timeout", self.request_timeout),
            ("task timeout", self.task_timeout),
            ("deadline", self.deadline),
            ("snapshot interval", self.snapshot_interval),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, d)| d.is_zero()) {
            return Err(ConfigError::Zero(*name));
        }
        if self.recency_days == 0 {
            return Err(ConfigError::Zero("recency window"));
        }
        Ok(())
    }
}
