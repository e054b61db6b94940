//! fanin - bounded fan-in aggregator CLI
//!
//! Runs N counting producers through the fan-in aggregator and prints
//! the merged output followed by a run summary.
//!
//! Exit codes:
//!   0 - Success (run completed, or stopped early via --take)
//!   1 - Runtime error (invalid arguments, config, cancellation, etc.)
//!   2 - A producer faulted

mod cli;

use anyhow::{Context, Result};
use cli::{Args, OutputFormat};
use fanin::config::{Config, DEFAULT_CONFIG_FILE};
use fanin::report::{generate_json_report, generate_text_summary, RunReport};
use fanin::{timestamp, CancellationToken, FanIn, FanInConfig, FanInError};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Config is loaded before logging so its verbosity setting applies
    let mut config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    args.merge_into(&mut config);

    init_logging(&args, &config);

    info!("fanin v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    debug!("Config: {:?}", config);

    match run_fan_in(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\nError: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .fanin.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!("{} already exists. Remove it first or edit it manually.", DEFAULT_CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("Created {} with default settings.", DEFAULT_CONFIG_FILE);
    Ok(())
}

/// Initialize logging based on verbosity settings. `RUST_LOG` takes precedence.
fn init_logging(args: &Args, config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level(config).to_string().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run the aggregator, print what the consumer saw, and return the exit code.
async fn run_fan_in(args: Args, config: Config) -> Result<i32> {
    let format = args.output_format(&config);

    let cancel = CancellationToken::new();
    let signal_handle = spawn_signal_handler(cancel.clone());

    let fan_in = FanIn::new(FanInConfig::from(&config.aggregator)).with_cancellation(cancel);
    let mut stream = fan_in
        .run_with_fault(args.producers, args.count, args.fault_plan())
        .context("Failed to start fan-in run")?;

    let expected = args.producers.saturating_mul(args.count).max(0) as u64;
    let progress = make_progress(expected, format, args.quiet);

    let mut values = Vec::new();
    let mut terminal: Option<FanInError> = None;
    let mut truncated = false;

    while let Some(item) = stream.next().await {
        match item {
            Ok(value) => {
                if format == OutputFormat::Text {
                    progress.suspend(|| println!("[{}] {}", timestamp::now(), value));
                }
                progress.inc(1);
                values.push(value);

                if args.take.is_some_and(|take| values.len() >= take) {
                    info!(taken = values.len(), "Stopping early");
                    truncated = true;
                    break;
                }
            }
            Err(e) => {
                warn!("Run ended with error: {}", e);
                terminal = Some(e);
            }
        }
    }
    progress.finish_and_clear();

    let summary = stream
        .shutdown()
        .await
        .context("Failed to shut down fan-in run")?;
    signal_handle.abort();

    let report = RunReport {
        producers: args.producers,
        count: args.count,
        fault_policy: config.aggregator.fault_policy,
        values,
        terminal_error: terminal.as_ref().map(ToString::to_string),
        truncated,
        summary,
    };

    match format {
        OutputFormat::Json => println!("{}", generate_json_report(&report)?),
        OutputFormat::Text => {
            if !args.quiet {
                println!("\n{}", generate_text_summary(&report));
            }
        }
    }

    Ok(match terminal {
        Some(FanInError::ProducerFault { .. }) => 2,
        Some(_) => 1,
        None => 0,
    })
}

/// Cancel the run on Ctrl+C.
fn spawn_signal_handler(cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, cancelling run...");
                cancel.cancel();
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for Ctrl+C");
            }
        }
    })
}

fn make_progress(expected: u64, format: OutputFormat, quiet: bool) -> ProgressBar {
    if quiet || format == OutputFormat::Json {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(expected);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} values")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Load configuration from file or use defaults.
///
/// Runs before logging is set up, so problems go straight to stderr.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok(config),
        Ok(None) => Ok(Config::default()),
        Err(e) => {
            eprintln!("Warning: ignoring {}: {:#}", DEFAULT_CONFIG_FILE, e);
            Ok(Config::default())
        }
    }
}
