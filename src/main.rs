//! Docmirror main entry point
//!
//! This is the command-line interface for the docmirror documentation mirror.

use anyhow::Context;
use clap::Parser;
use docmirror::config::{load_config_with_hash, Config};
use docmirror::output::{load_statistics, print_statistics};
use docmirror::storage::open_storage;
use docmirror::{CrawlScope, Mirror, RunOptions};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Docmirror: a resumable documentation-site mirror
///
/// Docmirror crawls one product subtree of a documentation site into a
/// local Markdown tree, records every redirect it meets, and rewrites
/// internal links into relative wikilinks once the crawl is done.
#[derive(Parser, Debug)]
#[command(name = "docmirror")]
#[command(version)]
#[command(about = "A resumable documentation-site mirror", long_about = None)]
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

    /// Start a fresh crawl, discarding previous state
    #[arg(long)]
    fresh: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with_all = ["stats", "resolve_only"])]
    dry_run: bool,

    /// Show statistics from the state store and exit
    #[arg(long, conflicts_with_all = ["dry_run", "resolve_only", "fresh"])]
    stats: bool,

    /// Rebuild folder notes and resolve links without fetching
    #[arg(long, conflicts_with = "fresh")]
    resolve_only: bool,

    /// Give pages that exhausted their retries another attempt
    #[arg(long, conflicts_with = "resolve_only")]
    retry_failed: bool,

    /// Write a stub document for every redirected URL
    #[arg(long, conflicts_with = "stats")]
    create_redirect_stubs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::debug!("Configuration hash: {}", config_hash);
    if cli.create_redirect_stubs {
        config.output.create_redirect_stubs = true;
    }

    if cli.dry_run {
        return handle_dry_run(&config);
    }
    if cli.stats {
        return handle_stats(&config);
    }

    let options = RunOptions {
        fresh: cli.fresh,
        retry_failed: cli.retry_failed,
        resolve_only: cli.resolve_only,
    };
    let code = handle_mirror(config, config_hash, options).await?;
    std::process::exit(code);
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("docmirror=info,warn"),
            1 => EnvFilter::new("docmirror=debug,info"),
            2 => EnvFilter::new("docmirror=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows the crawl plan
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    let scope = CrawlScope::from_config(&config.site)?;

    println!("=== Docmirror Dry Run ===\n");

    println!("Site:");
    println!("  Crawl root: {}", scope.root());
    for seed in config.site.effective_seeds() {
        println!("  Seed: {}", seed);
    }
    println!("  Exclude patterns: {}", config.site.exclude.len());
    for pattern in &config.site.exclude {
        println!("    * {}", pattern);
    }

    let crawler = &config.crawler;
    println!("\nCrawler:");
    println!("  Workers: {}", crawler.workers);
    println!("  Request delay: {}ms", crawler.request_delay_ms);
    match crawler.max_depth {
        Some(depth) => println!("  Max depth: {}", depth),
        None => println!("  Max depth: unlimited"),
    }
    match crawler.page_limit() {
        Some(pages) => println!("  Max pages: {}", pages),
        None => println!("  Max pages: unlimited"),
    }
    match crawler.runtime_limit() {
        Some(runtime) => println!("  Max runtime: {:?}", runtime),
        None => println!("  Max runtime: unlimited"),
    }
    println!("  Max retries: {}", crawler.max_retries);
    println!(
        "  Circuit breaker threshold: {}",
        crawler.circuit_breaker_threshold
    );

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Directory: {}", config.output.directory);
    println!("  Database: {}", config.output.database_path);
    println!("  Report: {}", config.output.report_path);
    println!(
        "  Redirect stubs: {}",
        if config.output.create_redirect_stubs { "yes" } else { "no" }
    );
    println!(
        "  Probe unresolved links: {}",
        if config.resolver.probe_unresolved { "yes" } else { "no" }
    );

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the --stats mode: shows statistics from the state store
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the mirror run, returning the process exit code
async fn handle_mirror(
    config: Config,
    config_hash: String,
    options: RunOptions,
) -> anyhow::Result<i32> {
    if options.fresh {
        tracing::info!("Starting fresh mirror (ignoring previous state)");
    } else {
        tracing::info!("Starting mirror (will resume if a previous run exists)");
    }

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight pages");
            signal_token.cancel();
        }
    });

    let mirror = Mirror::new(config, config_hash);
    match mirror.run(options, shutdown).await {
        Ok(summary) => {
            if let Some(outcome) = summary.outcome {
                tracing::info!("Crawl finished: {}", outcome);
            }
            if let Some(resolution) = &summary.resolution {
                tracing::info!(
                    "Links resolved: {}, unresolved: {}",
                    resolution.links_resolved,
                    resolution.unresolved.len()
                );
            }
            Ok(summary.exit_code())
        }
        Err(e) => {
            tracing::error!("Mirror failed: {}", e);
            Err(e.into())
        }
    }
}
