use std::path::PathBuf;
use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info};

use wattvakt_collectors::CollectorRegistry;
use wattvakt_config::WattvaktConfig;
use wattvakt_core::time::SystemClock;
use wattvakt_engine::{Aggregator, CycleRunner, EngineError, Scheduler};
use wattvakt_notify::LogNotifier;
use wattvakt_store::{open_store, SnapshotStore};
use wattvakt_telemetry::{EventLogger, MetricsRecorder};

use crate::error::CliError;

#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    /// Configuration file; defaults to config/wattvakt.yaml plus environment overrides
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the scheduler until interrupted
    Run,
    /// Run a single collection cycle and print its outcome
    Once,
    /// Validate the configuration and collector settings
    CheckConfig,
    /// Print a site's latest snapshot
    Latest(SiteArgs),
    /// Print a site's snapshots over a recent window
    History(HistoryArgs),
    /// Print alerts fired over a recent window
    Alerts(WindowArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SiteArgs {
    #[arg(short, long)]
    pub site: String,
}

#[derive(Args, Debug, Clone)]
pub struct HistoryArgs {
    #[arg(short, long)]
    pub site: String,
    #[arg(long, default_value_t = 24)]
    pub hours: i64,
}

#[derive(Args, Debug, Clone)]
pub struct WindowArgs {
    #[arg(long, default_value_t = 24)]
    pub hours: i64,
}

pub fn load_config(cli: &Cli) -> Result<WattvaktConfig, CliError> {
    let config = match &cli.config {
        Some(path) => WattvaktConfig::load_from_path(path)?,
        None => WattvaktConfig::load()?,
    };
    Ok(config)
}

pub async fn run_command(cli: Cli) -> Result<(), CliError> {
    let config = load_config(&cli)?;
    EventLogger::init(&config.telemetry);

    match cli.command {
        Commands::Run => run_scheduler(&config).await,
        Commands::Once => run_once(&config).await,
        Commands::CheckConfig => check_config(&config),
        Commands::Latest(args) => {
            ensure_site(&config, &args.site)?;
            let store = open_store(&config.store)?;
            match store.get_latest(&args.site) {
                Some(snapshot) => print_yaml(snapshot.as_ref()),
                None => {
                    println!("no snapshot committed for '{}'", args.site);
                    Ok(())
                }
            }
        }
        Commands::History(args) => {
            ensure_site(&config, &args.site)?;
            let store = open_store(&config.store)?;
            let end = Utc::now();
            let start = end - TimeDelta::hours(args.hours);
            print_yaml(&store.get_range(&args.site, start, end))
        }
        Commands::Alerts(args) => {
            let store = open_store(&config.store)?;
            print_yaml(&store.recent_alerts(Utc::now() - TimeDelta::hours(args.hours)))
        }
    }
}

fn build_runner(config: &WattvaktConfig) -> Result<Arc<CycleRunner>, CliError> {
    let store: Arc<dyn SnapshotStore> = open_store(&config.store)?;
    let metrics = Arc::new(MetricsRecorder::new().map_err(EngineError::from)?);
    let runner = CycleRunner::new(
        config,
        &CollectorRegistry::with_builtins(),
        store,
        Arc::new(LogNotifier),
        metrics,
        Arc::new(SystemClock),
    )?;
    Ok(Arc::new(runner))
}

async fn run_scheduler(config: &WattvaktConfig) -> Result<(), CliError> {
    let runner = build_runner(config)?;
    let scheduler = Scheduler::new(runner.clone(), &config.scheduler);
    scheduler.start()?;

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received");
    scheduler.stop().await?;

    if let Ok(text) = runner.metrics().gather_metrics() {
        debug!("Final metrics:\n{text}");
    }
    Ok(())
}

async fn run_once(config: &WattvaktConfig) -> Result<(), CliError> {
    let runner = build_runner(config)?;
    let report = runner.run_cycle().await;
    print_yaml(&report)
}

fn check_config(config: &WattvaktConfig) -> Result<(), CliError> {
    Aggregator::new(config, &CollectorRegistry::with_builtins())?;
    println!(
        "configuration ok: {} site(s), {} source(s), {} rule(s), cadence {}s",
        config.sites.len(),
        config.sites.iter().map(|s| s.sources.len()).sum::<usize>(),
        config.alerts.rules.len(),
        config.scheduler.cadence_secs,
    );
    Ok(())
}

fn ensure_site(config: &WattvaktConfig, site: &str) -> Result<(), CliError> {
    config
        .site(site)
        .map(|_| ())
        .ok_or_else(|| CliError::UnknownSite(site.to_string()))
}

fn print_yaml<T: serde::Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    print!("{}", serde_yaml::to_string(value)?);
    Ok(())
}
