//! DVS GCN Host CLI
//!
//! Replays recorded event samples to the accelerator and reports classifications.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dvs_gcn_host::{
    channel::SimConfig,
    config::Config,
    core::{export_records, parse_events, preview},
    session::{self, SampleSelector},
    stats::create_shared_stats_with_persistence,
    storage::{event_resource_name, DirStorage, Storage},
    VERSION,
};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dvs-gcn")]
#[command(version = VERSION)]
#[command(about = "Event replay and classification for a DVS GCN accelerator", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Clone, Default)]
struct RunOverrides {
    /// Directory holding sample and weight files
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// How long to wait for the feature vector, in milliseconds
    #[arg(long)]
    deadline_ms: Option<u64>,

    /// Wall time per recording time unit, in microseconds
    #[arg(long)]
    time_unit_us: Option<u64>,
}

impl RunOverrides {
    fn apply(&self, config: &mut Config) {
        if let Some(ref dir) = self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(ms) = self.deadline_ms {
            config.session_deadline = Duration::from_millis(ms);
        }
        if let Some(us) = self.time_unit_us {
            config.time_unit = Duration::from_micros(us);
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Classify samples selected interactively on stdin
    Run {
        #[command(flatten)]
        overrides: RunOverrides,

        /// Do not export classification records on exit
        #[arg(long)]
        no_export: bool,
    },

    /// Classify a single sample
    Classify {
        /// True class digit (0-9)
        #[arg(long, short)]
        class: u8,

        /// Sample digit (0-9)
        #[arg(long, short)]
        sample: u8,

        #[command(flatten)]
        overrides: RunOverrides,
    },

    /// Summarize an event file without classifying it
    Inspect {
        /// True class digit (0-9)
        #[arg(long, short)]
        class: u8,

        /// Sample digit (0-9)
        #[arg(long, short)]
        sample: u8,

        /// Side length of the polarity map in characters
        #[arg(long, default_value = "32")]
        side: usize,

        /// Directory holding sample files
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Show cumulative run statistics
    Status,

    /// Show configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            overrides,
            no_export,
        } => cmd_run(&overrides, no_export),
        Commands::Classify {
            class,
            sample,
            overrides,
        } => cmd_classify(class, sample, &overrides),
        Commands::Inspect {
            class,
            sample,
            side,
            data_dir,
        } => cmd_inspect(class, sample, side, data_dir),
        Commands::Status => cmd_status(),
        Commands::Config => cmd_config(),
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_config(overrides: &RunOverrides) -> Result<Config> {
    let mut config = Config::load().context("loading configuration")?;
    overrides.apply(&mut config);
    config.validate()?;
    if let Err(e) = config.ensure_directories() {
        warn!("could not create output directories: {e}");
    }
    Ok(config)
}

fn cmd_run(overrides: &RunOverrides, no_export: bool) -> Result<()> {
    let config = load_config(overrides)?;

    println!("DVS GCN Host v{VERSION}");
    println!("  Data directory: {:?}", config.data_dir);
    println!("  Session deadline: {}ms", config.session_deadline.as_millis());
    println!();

    let stats = create_shared_stats_with_persistence(config.stats_path());
    let export_path = config.export_path.clone();
    let (mut controller, mut accelerator) =
        session::simulated_controller(config, SimConfig::default(), stats.clone())?;

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    controller
        .run_interactive(&mut stdin.lock(), &mut stdout.lock(), &running)
        .context("interactive session")?;

    accelerator.stop();

    let records = controller.take_records();
    if !no_export && !records.is_empty() {
        match export_records(&export_path, &records) {
            Ok(path) => println!("Exported {} records to {:?}", records.len(), path),
            Err(e) => eprintln!("Error exporting records: {e}"),
        }
    }

    if let Err(e) = stats.save() {
        warn!("could not save run statistics: {e}");
    }

    println!();
    println!("{}", stats.summary());
    Ok(())
}

fn cmd_classify(class: u8, sample: u8, overrides: &RunOverrides) -> Result<()> {
    let Some(selector) = SampleSelector::new(class, sample) else {
        bail!("class and sample must be digits 0-9");
    };
    let config = load_config(overrides)?;

    let stats = create_shared_stats_with_persistence(config.stats_path());
    let (mut controller, mut accelerator) =
        session::simulated_controller(config, SimConfig::default(), stats.clone())?;

    let outcome = controller.run_sample(selector);
    accelerator.stop();
    if let Err(e) = stats.save() {
        warn!("could not save run statistics: {e}");
    }

    let outcome = outcome.with_context(|| format!("classifying {}", selector.resource_name()))?;
    info!(
        sent = outcome.transmit.sent,
        stopped_early = outcome.transmit.stopped_early,
        "sample transmitted"
    );
    session::write_report(&mut io::stdout().lock(), &outcome.result)?;
    Ok(())
}

fn cmd_inspect(class: u8, sample: u8, side: usize, data_dir: Option<PathBuf>) -> Result<()> {
    if class > 9 || sample > 9 {
        bail!("class and sample must be digits 0-9");
    }
    let config = Config::load().unwrap_or_default();
    let storage = DirStorage::new(data_dir.unwrap_or(config.data_dir.clone()));

    let name = event_resource_name(class, sample);
    let buf = storage.read(&name, config.max_event_bytes)?;
    let events = parse_events(&buf, config.event_capacity)?;
    let summary = preview::summarize(&events, config.time_budget);

    println!("Sample {name}");
    println!("{}", serde_json::to_string_pretty(&summary)?);
    println!();
    print!("{}", preview::render_polarity_map(&events, side));
    Ok(())
}

fn cmd_status() -> Result<()> {
    let config = Config::load().unwrap_or_default();

    println!("DVS GCN Host Status");
    println!("===================");
    println!();
    println!("Data directory: {:?}", config.data_dir);
    println!("Export directory: {:?}", config.export_path);
    println!();

    let stats_path = config.stats_path();
    if !stats_path.exists() {
        println!("No previous run data found.");
        return Ok(());
    }

    let content = std::fs::read_to_string(&stats_path)
        .with_context(|| format!("reading {stats_path:?}"))?;
    let value: serde_json::Value = serde_json::from_str(&content)?;

    println!("Cumulative Statistics:");
    for key in [
        "samples_started",
        "samples_classified",
        "correct_predictions",
        "events_transmitted",
        "chunks_received",
        "notification_overruns",
        "stalls",
        "failures",
    ] {
        if let Some(v) = value.get(key) {
            println!("  {}: {v}", key.replace('_', " "));
        }
    }

    let classified = value["samples_classified"].as_u64().unwrap_or(0);
    let correct = value["correct_predictions"].as_u64().unwrap_or(0);
    if classified > 0 {
        println!("  accuracy: {:.1}%", correct as f64 / classified as f64 * 100.0);
    }
    Ok(())
}

fn cmd_config() -> Result<()> {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Set up Ctrl+C handler. The loop stops after the current cycle; a second press exits.
fn ctrlc_handler(running: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        if !running.swap(false, Ordering::SeqCst) {
            std::process::exit(130);
        }
    })
    .context("setting Ctrl+C handler")
}
