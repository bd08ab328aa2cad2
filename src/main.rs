//! Harvester main entry point
//!
//! This is the command-line interface for the Harvester crawling engine.

use anyhow::Context;
use clap::Parser;
use harvester::config::{load_config_with_hash, Config};
use harvester::crawler::Coordinator;
use harvester::output::{export_json_lines, load_statistics, print_statistics};
use harvester::storage::open_storage;
use harvester::CrawlStatus;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Harvester: a plugin-based web crawler
///
/// Harvester crawls from seed URLs with a pool of workers, extracts links and
/// fields with a configurable extractor, and stores one record per URL in a
/// configurable backend.
#[derive(Parser, Debug)]
#[command(name = "harvester")]
#[command(version)]
#[command(about = "A plugin-based web crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Continue from stored records, even if the config is not resumable
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start a fresh crawl, discarding stored records
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Additional seed URL (repeatable)
    #[arg(long = "seed", value_name = "URL")]
    seeds: Vec<String>,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with_all = ["stats", "export", "prune"])]
    dry_run: bool,

    /// Show statistics from the storage backend and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export", "prune"])]
    stats: bool,

    /// Export stored records as JSON lines and exit
    #[arg(long, value_name = "PATH", conflicts_with_all = ["dry_run", "stats", "prune"])]
    export: Option<PathBuf>,

    /// Delete stored records with the given status and exit
    #[arg(long, value_name = "STATUS", conflicts_with_all = ["dry_run", "stats", "export"])]
    prune: Option<CrawlStatus>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    config.seeds.urls.extend(cli.seeds.iter().cloned());
    if cli.resume {
        config.crawler.resumable = true;
    }

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else if let Some(path) = &cli.export {
        handle_export(&config, path)?;
    } else if let Some(status) = cli.prune {
        handle_prune(&config, status)?;
    } else {
        handle_crawl(config, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("harvester=info,warn"),
            1 => EnvFilter::new("harvester=debug,info"),
            2 => EnvFilter::new("harvester=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== Harvester Dry Run ===\n");

    println!("Crawler:");
    println!("  Workers: {}", config.crawler.workers);
    println!("  Max depth: {}", config.crawler.max_depth);
    match config.crawler.page_budget() {
        Some(max) => println!("  Max pages: {}", max),
        None => println!("  Max pages: unlimited"),
    }
    println!("  Re-crawl policy: {:?}", config.crawler.recrawl);
    println!("  Resumable: {}", config.crawler.resumable);

    println!("\nFetcher:");
    println!("  User agent: {}", config.fetcher.user_agent);
    println!("  Timeout: {}ms", config.fetcher.timeout);
    println!("  Max retries: {}", config.fetcher.max_retries);

    println!("\nExtractor: {}", config.extractor.kind);
    for (name, pattern) in &config.extractor.fields {
        println!("  field {} = {}", name, pattern);
    }

    println!("\nFilter:");
    println!("  Rules: {}", config.filter.rules.len());
    for domain in &config.filter.allowed_domains {
        println!("  - {}", domain);
    }

    println!("\nStorage: {} ({})", config.storage.backend, config.storage.path);

    println!("\nSeeds ({}):", config.seeds.total());
    for seed in &config.seeds.urls {
        println!("  * {}", seed);
    }
    for seed in &config.seeds.forced {
        println!("  * {} (forced)", seed);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the storage backend
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Storage: {} ({})\n", config.storage.backend, config.storage.path);

    let storage = open_storage(&config.storage)?;
    let stats = load_statistics(storage.as_ref())?;
    print_statistics(&stats);
    storage.close()?;

    Ok(())
}

/// Handles the --export mode: writes stored records as JSON lines
fn handle_export(config: &Config, path: &Path) -> anyhow::Result<()> {
    let storage = open_storage(&config.storage)?;
    let written = export_json_lines(storage.as_ref(), path)
        .with_context(|| format!("failed to export to {}", path.display()))?;
    storage.close()?;

    println!("✓ Exported {} records to: {}", written, path.display());
    Ok(())
}

/// Handles the --prune mode: deletes records with one status
fn handle_prune(config: &Config, status: CrawlStatus) -> anyhow::Result<()> {
    let storage = open_storage(&config.storage)?;
    let removed = storage.prune(status)?;
    storage.close()?;

    println!("✓ Pruned {} {} records", removed, status);
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, fresh: bool) -> anyhow::Result<()> {
    tracing::info!(
        "Seeds: {}, workers: {}, storage: {}",
        config.seeds.total(),
        config.crawler.workers,
        config.storage.backend
    );

    let coordinator = Coordinator::new(config, fresh)?;

    let stop = coordinator.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight work");
            stop.stop();
        }
    });

    match coordinator.run().await {
        Ok(report) => {
            println!(
                "✓ Crawl {}: {} dispatched, {} fetched, {} failed, {} discovered in {:.1}s",
                if report.stopped { "stopped" } else { "completed" },
                report.dispatched,
                report.fetched,
                report.failed,
                report.discovered,
                report.elapsed.as_secs_f64()
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
