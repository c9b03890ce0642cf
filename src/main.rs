//! SmartScrape main entry point
//!
//! This is the command-line interface for the SmartScrape crawl engine.

use anyhow::{bail, Context};
use clap::Parser;
use smartscrape::config::{load_config_with_hash, Config};
use smartscrape::crawler::Fetcher;
use smartscrape::extract::analyze_structure;
use smartscrape::output::{
    export_csv, export_json, load_statistics, print_progress, print_statistics,
};
use smartscrape::proxy::ProxyMonitor;
use smartscrape::storage::{open_storage, share, SharedStorage};
use smartscrape::SessionController;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// SmartScrape: a crawl and content-extraction engine
///
/// SmartScrape crawls seed URLs with a bounded worker pool, falls back to
/// relays when sites block direct requests, extracts structured content and
/// follows pagination and in-scope links.
#[derive(Parser, Debug)]
#[command(name = "smartscrape")]
#[command(version)]
#[command(about = "Crawl and content-extraction engine", long_about = None)]
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

    /// Validate config and show what would be crawled without crawling
    #[arg(
        long,
        conflicts_with_all = [
            "stats",
            "export_json",
            "export_csv",
            "test_proxies",
            "cleanup_proxies",
            "analyze"
        ]
    )]
    dry_run: bool,

    /// Show statistics of a session and exit
    #[arg(
        long,
        value_name = "SESSION_ID",
        conflicts_with_all = [
            "export_json",
            "export_csv",
            "test_proxies",
            "cleanup_proxies",
            "analyze"
        ]
    )]
    stats: Option<String>,

    /// Export a session as JSON and exit
    #[arg(
        long,
        value_name = "SESSION_ID",
        conflicts_with_all = [
            "export_csv",
            "test_proxies",
            "cleanup_proxies",
            "analyze"
        ]
    )]
    export_json: Option<String>,

    /// Export a session's URLs as CSV and exit
    #[arg(
        long,
        value_name = "SESSION_ID",
        conflicts_with_all = [
            "test_proxies",
            "cleanup_proxies",
            "analyze"
        ]
    )]
    export_csv: Option<String>,

    /// Load the configured proxies, test the whole pool and exit
    #[arg(long, conflicts_with_all = ["cleanup_proxies", "analyze"])]
    test_proxies: bool,

    /// Remove unhealthy or stale proxies and exit
    #[arg(long, conflicts_with = "analyze")]
    cleanup_proxies: bool,

    /// Fetch one page, print its structure analysis and exit
    #[arg(long, value_name = "URL")]
    analyze: Option<String>,

    /// Resume a session left running by an interrupted crawl
    #[arg(
        long,
        value_name = "SESSION_ID",
        conflicts_with_all = [
            "dry_run",
            "stats",
            "export_json",
            "export_csv",
            "test_proxies",
            "cleanup_proxies",
            "analyze"
        ]
    )]
    resume: Option<String>,

    /// Write exports to this file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
    } else if let Some(session_id) = &cli.stats {
        handle_stats(&config, session_id)?;
    } else if let Some(session_id) = &cli.export_json {
        let storage = open_storage(Path::new(&config.output.database_path))?;
        let json = export_json(&storage, session_id)?;
        write_output(cli.output.as_deref(), &json)?;
    } else if let Some(session_id) = &cli.export_csv {
        let storage = open_storage(Path::new(&config.output.database_path))?;
        let csv = export_csv(&storage, session_id)?;
        write_output(cli.output.as_deref(), &csv)?;
    } else if cli.test_proxies {
        handle_test_proxies(&config).await?;
    } else if cli.cleanup_proxies {
        let monitor = proxy_monitor(&config, open_shared(&config)?);
        let removed = monitor.cleanup(chrono::Utc::now())?;
        println!("Removed {} proxies", removed);
    } else if let Some(url) = &cli.analyze {
        handle_analyze(&config, url).await?;
    } else {
        handle_crawl(&config, cli.resume.as_deref()).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("smartscrape=info,warn"),
            1 => EnvFilter::new("smartscrape=debug,info"),
            2 => EnvFilter::new("smartscrape=trace,debug"),
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

fn open_shared(config: &Config) -> anyhow::Result<SharedStorage> {
    let storage = open_storage(Path::new(&config.output.database_path))
        .with_context(|| format!("opening database {}", config.output.database_path))?;
    Ok(share(storage))
}

fn proxy_monitor(config: &Config, storage: SharedStorage) -> ProxyMonitor {
    ProxyMonitor::with_http_probe(storage, config.proxy.clone())
}

fn write_output(path: Option<&Path>, content: &str) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("✓ Exported to: {}", path.display());
        }
        None => println!("{}", content),
    }
    Ok(())
}

/// Handles the --dry-run mode: shows the validated configuration
fn handle_dry_run(config: &Config) {
    let session = &config.session.config;

    println!("=== SmartScrape Dry Run ===\n");

    println!("Fetch:");
    println!("  Direct timeout: {}s", config.fetch.direct_timeout_secs);
    println!("  Relay timeout: {}s", config.fetch.relay_timeout_secs);
    println!("  User agents: {}", config.fetch.user_agents.len());
    println!("  Relays ({}):", config.fetch.relays.len());
    for relay in &config.fetch.relays {
        println!("    - {} ({:?}): {}", relay.name, relay.kind, relay.endpoint);
    }

    println!("\nSession:");
    println!("  Strategy: {:?}", session.strategy);
    println!("  Deep crawl: {}", session.enable_deep_crawl);
    println!("  Max depth: {}", session.max_depth);
    println!("  Max URLs: {}", session.max_urls);
    println!("  Domain strategy: {:?}", session.domain_strategy);
    println!("  Concurrency: {}", session.max_concurrent);
    println!("  Delay: {}ms + up to {}ms jitter", session.delay_ms, session.jitter_ms);
    if session.pagination.enabled {
        println!(
            "  Pagination: up to {} pages, {}ms apart",
            session.pagination.max_pages, session.pagination.delay_ms
        );
    }
    if let Some(schema) = &session.extraction_schema {
        println!(
            "  Extraction schema: {} fields{}",
            schema.fields.len(),
            if schema.container.is_some() { " + container" } else { "" }
        );
    }

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\nProxies: {}", config.proxy.proxies.len());

    println!("\nSeeds ({}):", config.session.seeds.len());
    for seed in &config.session.seeds {
        println!("  * {}", seed);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics of one session
fn handle_stats(config: &Config, session_id: &str) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage, session_id)?;
    print_statistics(&stats);

    Ok(())
}

async fn handle_test_proxies(config: &Config) -> anyhow::Result<()> {
    let monitor = proxy_monitor(config, open_shared(config)?);
    monitor.load(&config.proxy.proxies, "config")?;

    let report = monitor.test_all().await?;
    for result in &report.results {
        println!(
            "  {} {:<40} score {:>5.1} {:?}{}",
            if result.success { "✓" } else { "✗" },
            result.url,
            result.score,
            result.rating,
            result
                .latency_ms
                .map(|ms| format!(" ({} ms)", ms))
                .unwrap_or_default()
        );
    }
    println!(
        "\n{} tested, {} ok, {} failed in {} ms",
        report.tested, report.succeeded, report.failed, report.elapsed_ms
    );

    Ok(())
}

async fn handle_analyze(config: &Config, url: &str) -> anyhow::Result<()> {
    let fetcher = Fetcher::from_config(&config.fetch)?;
    let report = fetcher.fetch(url, &CancellationToken::new()).await;

    let body = match report.outcome {
        smartscrape::crawler::FetchOutcome::Success { body, .. } => body,
        other => bail!("could not fetch {}: {:?}", url, other),
    };

    let analysis = analyze_structure(&body);
    println!("{}", serde_json::to_string_pretty(&analysis)?);
    Ok(())
}

/// Handles the main crawl: creates a session from `[session]` and runs it,
/// or resumes an interrupted one
async fn handle_crawl(config: &Config, resume: Option<&str>) -> anyhow::Result<()> {
    let storage = open_shared(config)?;
    let fetcher = Fetcher::from_config(&config.fetch)?;

    let mut controller = SessionController::new(Arc::clone(&storage), fetcher);
    if config.session.config.use_proxy_pool {
        let monitor = proxy_monitor(config, Arc::clone(&storage));
        monitor.load(&config.proxy.proxies, "config")?;
        let report = monitor.test_all().await?;
        tracing::info!("{} of {} proxies usable", report.succeeded, report.tested);
        controller = controller.with_proxy_monitor(Arc::new(monitor));
    }

    let session_id = match resume {
        Some(id) => id.to_string(),
        None => {
            let session =
                controller.create_session(&config.session.config, &config.session.seeds)?;
            tracing::info!("Total seed URLs: {}", session.urls_discovered);
            session.id
        }
    };

    let stopper = controller.clone();
    let stop_id = session_id.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping session {}", stop_id);
            if let Err(e) = stopper.stop(&stop_id) {
                tracing::error!("Failed to stop session: {}", e);
            }
        }
    });

    let result = if resume.is_some() {
        controller.resume(&session_id).await
    } else {
        controller.start(&session_id).await
    };
    match result {
        Ok(finished) => {
            tracing::info!("Session {} finished: {}", finished.id, finished.status);
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            return Err(e.into());
        }
    }

    let progress = controller.progress(&session_id)?;
    print_progress(&progress);

    if progress.failed + progress.blocked > 0 {
        println!("Run with --stats {} for details", session_id);
    }

    Ok(())
}
