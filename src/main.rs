// src/main.rs
// =============================================================================
// This is the entry point of our CLI application.
//
// What happens here:
// 1. Set up logging (RUST_LOG controls the level, default "info")
// 2. Parse command-line arguments using clap
// 3. Dispatch to the appropriate subcommand handler
// 4. Print the resulting directory as a table or JSON
// 5. Exit with proper code (0 = success, 2 = error)
// =============================================================================

// Module declarations - tells Rust about our other source files
mod cli;     // src/cli.rs - command-line parsing
mod config;  // src/config.rs - validated crawl settings
mod crawl;   // src/crawl/ - frontier, dispatcher, worker pool, result store
mod net;     // src/net/ - HTTP transport and response shapes
mod output;  // src/output/ - snapshot files

use clap::Parser;
use cli::{Cli, Commands, CrawlArgs};
use config::CrawlConfig;
use crawl::{CrawlReport, Crawler, Instance};
use net::HttpTransport;
use std::collections::BTreeMap;
use std::path::Path;
use tracing_subscriber::EnvFilter;

use anyhow::{Context, Result};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let exit_code = match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Crawl(args) => handle_crawl(&args).await,
        Commands::Report { path, json } => handle_report(&path, json),
    }
}

// Handles the 'crawl' subcommand
async fn handle_crawl(args: &CrawlArgs) -> Result<i32> {
    let config = CrawlConfig::from_args(args).context("invalid crawl configuration")?;

    println!("🔍 Crawling from {} seed(s): {}", config.seeds.len(), config.seeds.join(", "));
    println!(
        "⏱️  Deadline: {}s, workers: {}-{}",
        config.deadline.as_secs(),
        config.min_concurrency,
        config.max_concurrency
    );

    let transport = HttpTransport::new().context("failed to build HTTP client")?;
    let report = Crawler::new(config, transport)
        .context("invalid crawl configuration")?
        .run()
        .await
        .context("failed to write the final snapshot")?;

    print_instances(&report.instances, args.json)?;
    if !args.json {
        print_report(&report);
    }
    Ok(0)
}

// Handles the 'report' subcommand
fn handle_report(path: &Path, json: bool) -> Result<i32> {
    let instances = output::load_snapshot(path)
        .with_context(|| format!("could not read snapshot {}", path.display()))?;

    print_instances(&instances, json)?;
    Ok(0)
}

// Prints the directory either as a table or JSON
fn print_instances(instances: &[Instance], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(instances)?);
    } else {
        print_table(instances);
    }
    Ok(())
}

fn print_table(instances: &[Instance]) {
    println!("{:<40} {:<10} {:<20}", "HOST", "SOFTWARE", "REGISTRATION");
    println!("{}", "=".repeat(70));

    for instance in instances {
        println!(
            "{:<40} {:<10} {:<20}",
            truncate(&instance.host, 40),
            instance.software,
            instance.registration_mode
        );
    }
    println!();

    // Breakdown by registration mode, in a stable order
    let mut modes: BTreeMap<&str, usize> = BTreeMap::new();
    for instance in instances {
        *modes.entry(instance.registration_mode.as_str()).or_default() += 1;
    }

    println!("📊 Instances: {}", instances.len());
    for (mode, count) in modes {
        println!("   {:<20} {}", mode, count);
    }
}

fn print_report(report: &CrawlReport) {
    let outcomes = &report.outcomes;
    println!();
    println!("🏁 Crawl {} after {:.1}s", report.finished_as, report.elapsed.as_secs_f64());
    println!("   🌐 Visited:      {}", report.visited);
    println!("   ✅ Qualified:    {}", outcomes.qualified);
    println!("   📄 Crawled:      {}", outcomes.crawled);
    println!("   ❔ Unsupported:  {}", outcomes.unsupported);
    println!("   🗄️  lemmy 1.x:    {}", outcomes.legacy);
    println!("   ❌ Failed:       {}", outcomes.failed);
    println!("   ⏱️  Timed out:    {}", outcomes.timed_out);
}

// Cuts long hosts so the table stays aligned
fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() > width {
        let kept: String = text.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        text.to_string()
    }
}
