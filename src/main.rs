use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use rent_price_predictor::{process_data, render_all, PipelineConfig};

/// Trains the rent-price model and renders its charts.
#[derive(Parser, Debug)]
#[command(name = "rent-price", version, about)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding bj_danke_{1..8}.csv
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Where the processing stage writes its artifacts
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Where the plotting stage writes its charts
    #[arg(long)]
    plot_dir: Option<PathBuf>,

    /// Stop after the processing stage
    #[arg(long)]
    skip_plots: bool,

    /// Log level, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(args: &Args) -> anyhow::Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(dir) = &args.plot_dir {
        config.plot_dir = dir.clone();
    }
    config.validate()?;
    Ok(config)
}

// Steps
// 1. Load configuration
// 2. Create output directories
// 3. Processing stage: load, extract, encode, train, persist
// 4. Plotting stage: render charts from the persisted artifacts

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);
    let started = Instant::now();

    // 1. load configuration
    let config = load_config(&args)?;

    // 2. create output directories
    for dir in [&config.output_dir, &config.plot_dir] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating directory {}", dir.display()))?;
    }

    // 3. processing stage
    info!(data_dir = %config.data_dir.display(), "starting processing stage");
    if !process_data(&config) {
        error!("processing stage failed, skipping plots");
        std::process::exit(1);
    }

    // 4. plotting stage
    if !args.skip_plots {
        match render_all(&config.output_dir, &config.plot_dir) {
            Ok(charts) => info!(charts = charts.len(), dir = %config.plot_dir.display(), "plots rendered"),
            Err(err) => {
                error!(error = %err, "plotting stage failed");
                std::process::exit(1);
            }
        }
    }

    info!(elapsed = ?started.elapsed(), "finished");
    Ok(())
}
