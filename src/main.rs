use std::panic;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::core::cancel::Cancellation;
use crate::core::config::ExperimentConfig;
use crate::core::factory::build_experiment;
use crate::core::objects::Role;
use crate::core::traits::launcher::Launcher;
use crate::native::launcher::NativeLauncher;
use crate::stubs::launcher::StubLauncher;

mod constants;
mod core;
mod native;
mod stubs;


const DRY_RUN_DELAY: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(
    name = "srtlab",
    version,
    about = "Runs one SRT network experiment described by a JSON config"
)]
struct Cli {
    /// Experiment config file
    config: PathBuf,
    /// Collect results here instead of the config's collect_results_path
    #[arg(long)]
    resultsdir: Option<PathBuf>,
    /// Append a _YYYYmmdd-HHMMSS suffix to the results directory
    #[arg(long)]
    timestamp: bool,
    /// Seconds between starting and stopping the experiment
    #[arg(long)]
    stop_after: Option<f64>,
    /// SRT latency set on every srt-xtransmit URI
    #[arg(long)]
    latency: Option<String>,
    /// --sendrate passed to every srt-xtransmit sender, e.g. 15Mbps
    #[arg(long)]
    sendrate: Option<String>,
    /// Log the commands instead of running them
    #[arg(long)]
    dry_run: bool,
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    set_panic_hook();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn set_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        tracing::error!(
            message = "panic occurred",
            panic = %panic_info
        );
    }));
}

fn load_config(cli: &Cli) -> Result<ExperimentConfig> {
    let mut config = ExperimentConfig::from_file(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    if let Some(dir) = &cli.resultsdir {
        config.collect_results_path = dir.clone();
    }
    if cli.timestamp {
        let mut path = config.collect_results_path.into_os_string();
        path.push(chrono::Local::now().format("_%Y%m%d-%H%M%S").to_string());
        config.collect_results_path = PathBuf::from(path);
    }
    if let Some(secs) = cli.stop_after {
        config.stop_after = Duration::try_from_secs_f64(secs)
            .with_context(|| format!("invalid --stop-after {secs}"))?;
    }
    if let Some(latency) = &cli.latency {
        let updated = config.set_uri_attribute("latency", latency);
        tracing::info!("latency={latency} set on {updated} srt-xtransmit task(s)");
    }
    if let Some(rate) = &cli.sendrate {
        let updated = config.set_option(Some(Role::Send), "--sendrate", rate);
        tracing::info!("--sendrate {rate} set on {updated} srt-xtransmit sender(s)");
    }

    Ok(config)
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let cancellation = Cancellation::new();

    let launcher: Box<dyn Launcher> = if cli.dry_run {
        tracing::info!("Dry run, no commands are executed");
        Box::new(StubLauncher::new(DRY_RUN_DELAY))
    } else {
        Box::new(NativeLauncher::new(cancellation.clone()))
    };
    let mut experiment = build_experiment(&config, launcher.as_ref(), cancellation.clone())?;
    for task in experiment.tasks() {
        tracing::info!(task = task.key(), "{}", task.object().make_command_string());
    }

    let canceller = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling the experiment");
            canceller.cancel();
        }
    });

    let outcome = experiment.run().await;
    let cleanup = experiment.clean_up().await;
    if let Err(e) = &cleanup {
        tracing::error!("Cleanup failed: {e}");
    }

    let report = outcome.context("experiment failed")?;
    cleanup.context("cleanup failed")?;

    for path in &report.collected {
        tracing::info!("Collected {}", path.display());
    }
    for failure in &report.failures {
        tracing::warn!("Not collected: {failure}");
    }
    tracing::info!(
        "Done, results are in {}",
        experiment.collection_path().display()
    );
    Ok(())
}
