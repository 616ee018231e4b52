//! TradeDash - headless dashboard driver
//!
//! Runs the dashboard and jobs page controllers against a backend and logs
//! every render.
//!
//! ## Usage
//!
//! ```bash
//! # Refresh every dashboard region once
//! tradedash dashboard
//!
//! # Poll the scheduler status until Ctrl-C
//! tradedash jobs
//!
//! # Pause, resume or run a job
//! tradedash job daily_snapshot run --param dry_run=true
//!
//! # Against another backend, with verbose logging
//! tradedash --base-url http://backend:8000 -v dashboard
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tracing::{error, info};
use tradedash_core::{DashboardConfig, LogGuard, init_logging};
use tradedash_refresh::{
    DashboardClient, DashboardPage, JobAction, JobsPage, LogRenderSink, MemoryGridFactory,
    PageSession, ThemeBroadcast,
};

/// TradeDash dashboard driver
#[derive(Parser, Debug)]
#[command(name = "tradedash")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging (increases log level)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Directory for log files (defaults to ~/.tradedash/logs/)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Configuration file (defaults to ~/.tradedash/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend base URL, overrides the configuration
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Refresh every dashboard region once and report failures
    Dashboard {
        /// Region filter as region.key=value (repeatable)
        #[arg(long = "filter")]
        filters: Vec<String>,
    },
    /// Poll the scheduler status until interrupted
    Jobs,
    /// Send a job action
    Job {
        /// Job id
        id: String,
        /// pause, resume or run
        action: JobAction,
        /// Action parameter as key=value (repeatable)
        #[arg(long = "param")]
        params: Vec<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match setup_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::from(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("tradedash error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

/// Set up logging based on CLI arguments.
fn setup_logging(cli: &Cli) -> tradedash_core::Result<LogGuard> {
    init_logging(cli.log_dir.clone(), cli.verbose > 0)
}

fn load_config(cli: &Cli) -> anyhow::Result<DashboardConfig> {
    let mut config = match &cli.config {
        Some(path) => DashboardConfig::load(path)?,
        None => DashboardConfig::load_default()?,
    };
    if let Some(url) = &cli.base_url {
        config = config.with_base_url(url.clone());
    }
    config.validate()?;
    Ok(config)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    info!(base_url = %config.base_url, "starting tradedash");

    let client = Arc::new(DashboardClient::from_config(&config)?);
    let broadcast = ThemeBroadcast::global();
    broadcast.publish(config.theme.clone());

    match cli.command {
        Command::Dashboard { filters } => {
            let session = Arc::new(PageSession::new(
                "dashboard",
                broadcast,
                Arc::new(MemoryGridFactory::new()),
            ));
            for filter in &filters {
                let (region, key, value) = parse_filter(filter)?;
                session.set_filter(region, key, value);
            }

            let page = DashboardPage::new(&config, client, session, Arc::new(LogRenderSink));
            let report = page.refresh_all().await;
            if let Some(banner) = report.aggregate_error() {
                bail!("{}", banner.message);
            }
            info!(regions = report.succeeded().len(), "dashboard loaded");
        }
        Command::Jobs => {
            let session = Arc::new(PageSession::new(
                "jobs",
                broadcast,
                Arc::new(MemoryGridFactory::new()),
            ));
            let page = JobsPage::new(&config, client, session, Arc::new(LogRenderSink));
            page.start()?;
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for Ctrl-C")?;
            page.stop();
            info!("polling stopped");
        }
        Command::Job { id, action, params } => {
            let parameters = parse_params(&params)?;
            let response = client
                .job_action(&id, action, (!parameters.is_empty()).then_some(&parameters))
                .await?;
            println!(
                "{}",
                response
                    .message
                    .unwrap_or_else(|| format!("{action} sent for job {id}"))
            );
        }
    }
    Ok(())
}

/// `region.key=value`
fn parse_filter(raw: &str) -> anyhow::Result<(&str, &str, &str)> {
    let (target, value) = raw
        .split_once('=')
        .with_context(|| format!("filter '{raw}' is not region.key=value"))?;
    let (region, key) = target
        .split_once('.')
        .with_context(|| format!("filter '{raw}' is not region.key=value"))?;
    Ok((region, key, value))
}

/// `key=value` pairs; values are parsed as JSON when possible.
fn parse_params(raw: &[String]) -> anyhow::Result<Map<String, Value>> {
    let mut parameters = Map::new();
    for param in raw {
        let Some((key, value)) = param.split_once('=') else {
            bail!("parameter '{param}' is not key=value");
        };
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.into()));
        parameters.insert(key.to_string(), value);
    }
    Ok(parameters)
}
