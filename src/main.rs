// Copyright 2026 Shelfwatch Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;

use shelfwatch::config::PipelineConfig;
use shelfwatch::coordinator::RunCoordinator;
use shelfwatch::dedup::{DedupIndex, SqliteKeyStore};
use shelfwatch::directory::{HttpDirectoryFetch, StoreDirectory};
use shelfwatch::fetch::HttpClient;
use shelfwatch::renderer::{chromium::find_chromium, pick_renderer};
use shelfwatch::retrieval::RetrievalEngine;
use shelfwatch::scheduler::Scheduler;
use shelfwatch::sink::{JsonlSink, LogNotifier};
use shelfwatch::validate::Normalizer;

#[derive(Parser)]
#[command(
    name = "shelfwatch",
    about = "Shelfwatch — recurring product-price scrape pipeline",
    version,
    after_help = "Run 'shelfwatch <command> --help' for details on each command."
)]
struct Cli {
    /// Config file path (defaults to SHELFWATCH_CONFIG, ./shelfwatch.json,
    /// then ~/.shelfwatch/config.json)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Emit logs as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one run now and exit
    Run {
        /// Restrict to one region (e.g. "FL")
        #[arg(long)]
        region: Option<String>,
        /// Period designator (week-of-month 1-4); defaults to the current one
        #[arg(long)]
        period: Option<u8>,
        /// Process only the first N sources
        #[arg(long)]
        limit: Option<usize>,
        /// Skip the browser and use static fetch only
        #[arg(long)]
        static_only: bool,
        /// Bypass the store directory cache
        #[arg(long)]
        fresh_directory: bool,
    },
    /// Run forever on the configured schedule
    Schedule {
        /// Restrict to one region
        #[arg(long)]
        region: Option<String>,
    },
    /// Check environment and diagnose issues
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json);

    let mut cfg = PipelineConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            region,
            period,
            limit,
            static_only,
            fresh_directory,
        } => {
            cfg.retrieval.static_only |= static_only;
            if limit.is_some() {
                cfg.run.source_limit = limit;
            }
            let cancel = cancellation_signal();
            let mut coordinator = build_coordinator(&cfg, region, fresh_directory, cancel).await?;
            let period = period.unwrap_or_else(shelfwatch::period::current_period);
            let stats = coordinator.run(period).await?;
            println!("{stats}");
        }
        Commands::Schedule { region } => {
            let cancel = cancellation_signal();
            let coordinator =
                build_coordinator(&cfg, region, false, cancel.clone()).await?;
            let mut scheduler = Scheduler::new(
                coordinator,
                Arc::new(LogNotifier),
                cfg.scheduler.clone(),
                cancel,
            );
            scheduler.run_forever().await;
        }
        Commands::Doctor => doctor(&cfg),
    }

    Ok(())
}

/// Wire the full pipeline from configuration.
async fn build_coordinator(
    cfg: &PipelineConfig,
    region: Option<String>,
    fresh_directory: bool,
    cancel: tokio::sync::watch::Receiver<bool>,
) -> Result<RunCoordinator> {
    let http = HttpClient::from_config(&cfg.retrieval);

    let directory = StoreDirectory::new(
        Box::new(HttpDirectoryFetch::new(
            http.clone(),
            cfg.directory.api_url.clone(),
        )),
        cfg.directory.resolved_cache_path(),
        Duration::from_secs(cfg.directory.ttl_secs),
    )
    .with_force_refresh(fresh_directory);

    let renderer = pick_renderer(&cfg.retrieval, http.clone()).await;
    let engine = RetrievalEngine::new(
        renderer,
        http,
        cfg.retrieval.clone(),
        cfg.directory.default_location.clone(),
    );

    let store = SqliteKeyStore::open(&cfg.run.resolved_keys_path())?;
    let dedup = DedupIndex::load(Box::new(store))?;

    let sink = Arc::new(JsonlSink::new(cfg.run.resolved_output_path()));

    Ok(RunCoordinator::new(
        directory,
        engine,
        Normalizer::new(cfg.validation.clone()),
        dedup,
        sink,
        cfg.run.clone(),
    )
    .with_region(region)
    .with_cancellation(cancel))
}

/// Cooperative cancellation on Ctrl-C.
fn cancellation_signal() -> tokio::sync::watch::Receiver<bool> {
    let (tx, rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested; finishing current step");
            let _ = tx.send(true);
        }
        // Keep the sender alive so the channel never closes early.
        std::future::pending::<()>().await;
    });
    rx
}

fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose {
        "shelfwatch=debug"
    } else {
        "shelfwatch=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Environment probe: what will work, what won't.
fn doctor(cfg: &PipelineConfig) {
    match find_chromium() {
        Some(path) => println!("browser: {}", path.display()),
        None => println!("browser: not found — retrieval will run in static-fetch mode"),
    }

    let cache = cfg.directory.resolved_cache_path();
    println!("directory cache: {}", cache.display());
    if let Some(parent) = cache.parent() {
        match std::fs::create_dir_all(parent) {
            Ok(()) => println!("data dir: writable"),
            Err(e) => println!("data dir: NOT writable ({e})"),
        }
    }

    println!("key store: {}", cfg.run.resolved_keys_path().display());
    println!("output: {}", cfg.run.resolved_output_path().display());
    println!(
        "schedule: {:?} (interval {}s, at {:02}:{:02} UTC)",
        cfg.scheduler.mode, cfg.scheduler.interval_secs, cfg.scheduler.hour, cfg.scheduler.minute
    );
}
