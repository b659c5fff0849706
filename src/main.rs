//! Stress Monitor CLI
//!
//! Closed-loop physiological stress monitor driving music playback.

use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use stress_monitor::{
    config::Config,
    core::{BaselineRecord, BaselineSource, FeatureVector, StressClassifier},
    link::{ReplayTransport, SerialTransport},
    session::{Catalog, CatalogLibrary, ConsoleDisplay, SessionReport, SimulatedPlayback},
    transparency::{create_shared_telemetry, create_shared_telemetry_with_persistence},
    Monitor, DATA_NOTICE, VERSION,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stress-monitor")]
#[command(version = VERSION)]
#[command(about = "Closed-loop physiological stress monitor", long_about = None)]
struct Cli {
    /// Log filter when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitor against the serial device
    Run {
        /// Serial port of the microcontroller (overrides config)
        #[arg(long)]
        port: Option<String>,

        /// Serial port of the heart-rate bridge (overrides config)
        #[arg(long)]
        hr_port: Option<String>,

        /// Ensemble model file (overrides config)
        #[arg(long)]
        model: Option<PathBuf>,

        /// Item catalog (overrides config)
        #[arg(long)]
        catalog: Option<PathBuf>,
    },

    /// Replay a recorded serial capture through the full pipeline
    Replay {
        /// Recorded device lines
        #[arg(long)]
        device: PathBuf,

        /// Recorded heart-rate bridge lines
        #[arg(long)]
        hr: Option<PathBuf>,

        /// Delay between replayed lines in milliseconds
        #[arg(long, default_value = "100")]
        interval_ms: u64,

        /// Press START before the first recorded line
        #[arg(long)]
        autostart: bool,

        /// Classification window in seconds (overrides config)
        #[arg(long)]
        window_secs: Option<u64>,

        /// Stop after this many seconds
        #[arg(long)]
        duration_secs: Option<u64>,

        /// Ensemble model file (overrides config)
        #[arg(long)]
        model: Option<PathBuf>,

        /// Item catalog (overrides config)
        #[arg(long)]
        catalog: Option<PathBuf>,
    },

    /// Classify one feature vector from a JSON file
    Classify {
        /// JSON object mapping feature names to values
        #[arg(long)]
        features: PathBuf,

        /// Ensemble model file; rules are used without one
        #[arg(long)]
        model: Option<PathBuf>,

        /// Resting GSR baseline in µS
        #[arg(long)]
        baseline_gsr: Option<f64>,

        /// Resting heart rate in BPM
        #[arg(long)]
        baseline_hr: Option<f64>,
    },

    /// List available serial ports
    Ports,

    /// Show cumulative statistics
    Status,

    /// Combine session reports into one file
    Export {
        /// Output directory (defaults to the export path)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Export format (json or jsonl)
        #[arg(long, default_value = "json")]
        format: String,
    },

    /// Show configuration
    Config,

    /// Write the default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Commands::Run {
            port,
            hr_port,
            model,
            catalog,
        } => {
            cmd_run(port, hr_port, model, catalog);
        }
        Commands::Replay {
            device,
            hr,
            interval_ms,
            autostart,
            window_secs,
            duration_secs,
            model,
            catalog,
        } => {
            let options = ReplayOptions {
                interval: Duration::from_millis(interval_ms),
                autostart,
                window: window_secs.map(Duration::from_secs),
                duration: duration_secs.map(Duration::from_secs),
            };
            cmd_replay(&device, hr.as_deref(), options, model, catalog);
        }
        Commands::Classify {
            features,
            model,
            baseline_gsr,
            baseline_hr,
        } => {
            cmd_classify(&features, model.as_deref(), baseline_gsr, baseline_hr);
        }
        Commands::Ports => {
            cmd_ports();
        }
        Commands::Status => {
            cmd_status();
        }
        Commands::Export { output, format } => {
            cmd_export(output, &format);
        }
        Commands::Config => {
            cmd_config();
        }
        Commands::InitConfig { force } => {
            cmd_init_config(force);
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(model: Option<PathBuf>, catalog: Option<PathBuf>) -> Config {
    let mut config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config, using defaults: {e}");
        Config::default()
    });
    if model.is_some() {
        config.classifier.model_path = model;
    }
    if catalog.is_some() {
        config.library.catalog_path = catalog;
    }
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }
    config
}

fn load_library(config: &Config) -> (CatalogLibrary, SimulatedPlayback) {
    let library = match &config.library.catalog_path {
        Some(path) => CatalogLibrary::load(path).unwrap_or_else(|e| {
            eprintln!("Warning: Could not load catalog {path:?}: {e}");
            CatalogLibrary::new(Catalog::new())
        }),
        None => {
            eprintln!("Warning: No catalog configured, nothing will be played");
            CatalogLibrary::new(Catalog::new())
        }
    };
    let playback = SimulatedPlayback::from_catalog(library.catalog());
    (library, playback)
}

fn cmd_run(
    port: Option<String>,
    hr_port: Option<String>,
    model: Option<PathBuf>,
    catalog: Option<PathBuf>,
) {
    println!("Stress Monitor v{VERSION}");
    println!("{DATA_NOTICE}");

    let mut config = load_config(model, catalog);
    if let Some(port) = port {
        config.link.port = port;
    }
    if hr_port.is_some() {
        config.link.hr_port = hr_port;
    }

    println!("Starting monitor...");
    println!("  Device port: {}", config.link.port);
    println!(
        "  HR bridge: {}",
        config.link.hr_port.as_deref().unwrap_or("none")
    );
    println!("  Window: {}s", config.window.window.as_secs());
    println!();

    let device = SerialTransport::new(
        config.link.port.clone(),
        config.link.baud_rate,
        config.link.read_timeout,
    );
    let hr_bridge = config.link.hr_port.clone().map(|port| {
        SerialTransport::new(port, config.link.hr_baud_rate, config.link.read_timeout)
    });

    let (library, playback) = load_library(&config);
    let telemetry = create_shared_telemetry_with_persistence(config.telemetry_path());
    let mut monitor = Monitor::assemble(
        &config,
        device,
        hr_bridge,
        Arc::new(ConsoleDisplay),
        playback,
        library,
        telemetry.clone(),
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    ctrlc_handler(shutdown.clone());

    println!("Press Ctrl+C to stop.");
    if let Err(e) = monitor.run(&shutdown) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    println!();
    println!("{}", telemetry.summary());
}

struct ReplayOptions {
    interval: Duration,
    autostart: bool,
    window: Option<Duration>,
    duration: Option<Duration>,
}

fn replay_lines(path: &Path) -> Vec<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => content.lines().map(str::to_string).collect(),
        Err(e) => {
            eprintln!("Error reading {path:?}: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_replay(
    device: &Path,
    hr: Option<&Path>,
    options: ReplayOptions,
    model: Option<PathBuf>,
    catalog: Option<PathBuf>,
) {
    let mut config = load_config(model, catalog);
    if let Some(window) = options.window {
        config.window.window = window;
    }

    let mut lines = replay_lines(device);
    if options.autostart {
        lines.insert(0, "BUTTON:START".to_string());
    }
    println!("Replaying {} device line(s) from {device:?}", lines.len());
    let device_link = ReplayTransport::from_lines(lines).with_pace(options.interval);
    let hr_bridge =
        hr.map(|path| ReplayTransport::from_lines(replay_lines(path)).with_pace(options.interval));

    let (library, playback) = load_library(&config);
    let telemetry = create_shared_telemetry();
    let mut monitor = Monitor::assemble(
        &config,
        device_link,
        hr_bridge,
        Arc::new(ConsoleDisplay),
        playback,
        library,
        telemetry.clone(),
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    ctrlc_handler(shutdown.clone());
    if let Some(limit) = options.duration {
        let shutdown = shutdown.clone();
        thread::spawn(move || {
            thread::sleep(limit);
            info!("Replay time limit reached");
            shutdown.store(true, Ordering::SeqCst);
        });
    }

    if let Err(e) = monitor.run(&shutdown) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    if let Some(report) = monitor.machine().last_report() {
        println!();
        println!("Last session: {}", report.id);
        println!("  Predictions: {}", report.predictions.len());
        println!("  Re-evaluations: {}", report.reevaluations);
        println!("  Items played: {}", report.tracks_played);
    }
    println!();
    println!("{}", telemetry.summary());
}

fn cmd_classify(
    features: &Path,
    model: Option<&Path>,
    baseline_gsr: Option<f64>,
    baseline_hr: Option<f64>,
) {
    let vector: FeatureVector = match std::fs::read_to_string(features)
        .map_err(|e| e.to_string())
        .and_then(|content| serde_json::from_str(&content).map_err(|e| e.to_string()))
    {
        Ok(vector) => vector,
        Err(e) => {
            eprintln!("Error reading features from {features:?}: {e}");
            std::process::exit(1);
        }
    };

    let config = Config::load().unwrap_or_default();
    let mut classifier = StressClassifier::load(
        model.or(config.classifier.model_path.as_deref()),
        config.classifier.rules,
        1,
        create_shared_telemetry(),
    );

    if baseline_gsr.is_some() || baseline_hr.is_some() {
        let mut baseline = BaselineRecord::defaults(&config.calibration_config());
        if let Some(gsr) = baseline_gsr {
            baseline.gsr_baseline = gsr;
            baseline.source = BaselineSource::Computed;
        }
        if let Some(hr) = baseline_hr {
            baseline.hr_baseline = hr;
            baseline.hr_source = BaselineSource::Computed;
        }
        classifier.set_baseline(Some(baseline));
    }

    let prediction = classifier.predict(&vector);
    match serde_json::to_string_pretty(&prediction) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Error serializing prediction: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_ports() {
    let ports = SerialTransport::list_ports();
    if ports.is_empty() {
        println!("No serial ports found.");
        return;
    }
    println!("Available serial ports:");
    for port in ports {
        println!("  {port}");
    }
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();

    println!("Stress Monitor Status");
    println!("=====================");
    println!();

    println!("Configuration:");
    println!("  Device port: {}", config.link.port);
    println!(
        "  HR bridge: {}",
        config.link.hr_port.as_deref().unwrap_or("none")
    );
    println!(
        "  Classifier: {}",
        match &config.classifier.model_path {
            Some(path) => format!("ensemble ({path:?})"),
            None => "rule-based".to_string(),
        }
    );
    println!("  Window: {}s", config.window.window.as_secs());
    println!();

    let stats_path = config.telemetry_path();
    if stats_path.exists() {
        let telemetry = create_shared_telemetry_with_persistence(stats_path);
        println!("{}", telemetry.summary());
    } else {
        println!("No previous session data found.");
    }
}

fn session_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.extension().is_some_and(|e| e == "json")
                        && p.file_name()
                            .is_some_and(|n| n.to_string_lossy().starts_with("session_"))
                })
                .collect()
        })
        .unwrap_or_default();
    files.sort();
    files
}

fn cmd_export(output: Option<PathBuf>, format: &str) {
    let config = Config::load().unwrap_or_default();
    let files = session_files(&config.export_path);

    if files.is_empty() {
        println!("No session reports found in {:?}", config.export_path);
        println!("Run 'stress-monitor run' to record a session.");
        return;
    }

    println!(
        "Found {} session report(s) in {:?}",
        files.len(),
        config.export_path
    );

    let reports: Vec<SessionReport> = files
        .iter()
        .filter_map(|file| match SessionReport::load(file) {
            Ok(report) => Some(report),
            Err(e) => {
                eprintln!("Skipping {file:?}: {e}");
                None
            }
        })
        .collect();
    let predictions: usize = reports.iter().map(|r| r.predictions.len()).sum();
    println!("Total predictions: {predictions}");

    let output_dir = output.unwrap_or(config.export_path.clone());
    if let Err(e) = std::fs::create_dir_all(&output_dir) {
        eprintln!("Error creating {output_dir:?}: {e}");
        return;
    }
    let output_path = output_dir.join(format!(
        "export_{}.{}",
        Utc::now().format("%Y%m%d_%H%M%S"),
        if format == "jsonl" { "jsonl" } else { "json" }
    ));

    let result = if format == "jsonl" {
        // One report per line
        let lines: Vec<String> = reports
            .iter()
            .filter_map(|r| serde_json::to_string(r).ok())
            .collect();
        std::fs::write(&output_path, lines.join("\n"))
    } else {
        match serde_json::to_string_pretty(&reports) {
            Ok(json) => std::fs::write(&output_path, json),
            Err(e) => {
                eprintln!("Error serializing: {e}");
                return;
            }
        }
    };

    match result {
        Ok(_) => println!("Exported to {output_path:?}"),
        Err(e) => eprintln!("Error writing export: {e}"),
    }
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

fn cmd_init_config(force: bool) {
    let path = Config::config_path();
    if path.exists() && !force {
        println!("Config already exists at {path:?}. Use --force to overwrite.");
        return;
    }
    let config = Config::default();
    if let Err(e) = config.save() {
        eprintln!("Error saving config: {e}");
        std::process::exit(1);
    }
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }
    println!("Wrote default configuration to {path:?}");
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(shutdown: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        shutdown.store(true, Ordering::SeqCst);
    }) {
        error!(error = %e, "Failed to install Ctrl+C handler");
    }
}
