//! MindBalance Agent CLI
//!
//! Acquires EEG (or synthetic) samples and writes band-power features.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mindbalance_agent::{
    config::Config,
    export::FileSink,
    session::Session,
    transparency::{create_shared_log_with_persistence, TRANSPARENCY_FILE},
    SourceMode, VERSION,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "lsl")]
use mindbalance_agent::acquisition::LslDiscovery;

#[derive(Parser)]
#[command(name = "mindbalance")]
#[command(version = VERSION)]
#[command(about = "EEG band-power acquisition for neurofeedback", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire one session and export its features
    Run(RunArgs),

    /// Show cumulative acquisition statistics
    Status,

    /// Show the band table and how many PSD bins each band gets
    Bands {
        /// Sample rate in Hz
        #[arg(long)]
        sample_rate: Option<u32>,

        /// Window length in seconds
        #[arg(long)]
        duration: Option<f64>,
    },

    /// Show configuration
    Config,
}

#[derive(Args)]
struct RunArgs {
    /// Number of EEG channels
    #[arg(long)]
    channels: Option<usize>,

    /// Sample rate in Hz
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Session length in seconds
    #[arg(long)]
    duration: Option<f64>,

    /// Window length in seconds (defaults to the session length)
    #[arg(long)]
    window: Option<f64>,

    /// Output directory for raw and feature files
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Skip live stream discovery
    #[arg(long)]
    synthetic: bool,

    /// Seconds a live pull may block
    #[arg(long)]
    pull_timeout: Option<f64>,

    /// Seed of the synthetic generator
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => cmd_run(args),
        Commands::Status => cmd_status(),
        Commands::Bands {
            sample_rate,
            duration,
        } => cmd_bands(sample_rate, duration),
        Commands::Config => cmd_config(),
    }
}

fn load_config() -> Config {
    Config::load().unwrap_or_else(|e| {
        tracing::warn!("Could not load config, using defaults: {e}");
        Config::default()
    })
}

fn cmd_run(args: RunArgs) -> Result<()> {
    let mut config = load_config();
    if let Some(channels) = args.channels {
        config.channel_count = channels;
    }
    if let Some(rate) = args.sample_rate {
        config.sample_rate = rate;
    }
    if let Some(duration) = args.duration {
        config.duration_sec = duration;
    }
    if args.window.is_some() {
        config.window_sec = args.window;
    }
    if let Some(timeout) = args.pull_timeout {
        config.pull_timeout =
            Duration::try_from_secs_f64(timeout).context("Invalid --pull-timeout")?;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if args.synthetic {
        config.live = false;
    }
    if let Some(output) = args.output {
        config.export_path = output;
    }

    config.validate()?;
    config
        .ensure_directories()
        .context("Could not create directories")?;

    println!("MindBalance Agent v{VERSION}");
    println!();
    println!("  Channels: {}", config.channel_count);
    println!("  Sample rate: {} Hz", config.sample_rate);
    println!("  Duration: {}s", config.duration_sec);
    println!("  Window: {}s", config.window_sec());
    println!("  Output: {:?}", config.export_path);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let transparency_log =
        create_shared_log_with_persistence(config.data_path.join(TRANSPARENCY_FILE));

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;

    let mut sink = FileSink::create(&config.export_path, config.channel_count, &config.bands)
        .with_context(|| format!("Could not open output files in {:?}", config.export_path))?;

    #[cfg(feature = "lsl")]
    let discovery = LslDiscovery::default();

    let session = Session::new(config.clone())
        .with_running_flag(running)
        .with_transparency(transparency_log.clone());
    #[cfg(feature = "lsl")]
    let session = session.with_discovery(&discovery);

    let report = session.run(&mut sink)?;

    if let (SourceMode::Synthetic, Some(reason)) = (report.mode, &report.fallback_reason) {
        println!("Synthetic mode: {reason}");
    }
    if report.cancelled {
        println!("Stopped early.");
    }
    println!(
        "Acquired {} samples ({} live, {} synthetic) in {:.2}s",
        report.samples, report.live_samples, report.synthetic_samples, report.elapsed_secs
    );
    println!("Completed {} window(s)", report.windows);
    println!("Files written to {:?}", sink.dir());

    if let Err(e) = transparency_log.save() {
        eprintln!("Warning: Could not save transparency stats: {e}");
    }

    println!();
    println!("{}", transparency_log.summary());
    Ok(())
}

fn cmd_status() -> Result<()> {
    let config = load_config();

    println!("MindBalance Agent Status");
    println!("========================");
    println!();
    println!("Configuration:");
    println!("  Channels: {}", config.channel_count);
    println!("  Sample rate: {} Hz", config.sample_rate);
    println!("  Duration: {}s", config.duration_sec);
    println!(
        "  Live discovery: {}",
        if config.live { "enabled" } else { "disabled" }
    );
    println!();

    let stats_path = config.data_path.join(TRANSPARENCY_FILE);
    if stats_path.exists() {
        let log = create_shared_log_with_persistence(stats_path);
        println!("{}", log.summary());
    } else {
        println!("No previous session data found.");
    }
    Ok(())
}

fn cmd_bands(sample_rate: Option<u32>, duration: Option<f64>) -> Result<()> {
    let mut config = load_config();
    if let Some(rate) = sample_rate {
        config.sample_rate = rate;
    }
    if let Some(duration) = duration {
        config.duration_sec = duration;
        config.window_sec = None;
    }
    config.validate()?;

    let resolution = config.resolution();
    let nyquist = f64::from(config.sample_rate) / 2.0;

    println!(
        "Resolution: {resolution:.3} Hz ({} Hz, {}s window)",
        config.sample_rate,
        config.window_sec()
    );
    println!();
    println!("{:<10} {:>8} {:>8} {:>6}", "band", "low", "high", "bins");
    for band in config.bands.iter() {
        let bins = band.bin_count(resolution, nyquist);
        println!(
            "{:<10} {:>8.2} {:>8.2} {:>6}{}",
            band.name,
            band.low_hz,
            band.high_hz,
            bins,
            if bins == 0 { "  (NaN)" } else { "" }
        );
    }
    Ok(())
}

fn cmd_config() -> Result<()> {
    let config = load_config();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("Error setting Ctrl+C handler")
}
