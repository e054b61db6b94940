//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and merging over the config file.

use clap::Parser;
use fanin::config::Config;
use fanin::producers::{FaultKind, FaultPlan};
use fanin::FaultPolicy;
use std::path::PathBuf;

/// fanin - bounded fan-in aggregator with coordinated shutdown
///
/// Spawns N producers that each emit 0..K into one bounded channel and
/// prints the merged output. Ctrl+C cancels the run.
///
/// Examples:
///   fanin --producers 2 --count 10
///   fanin -n 8 -k 1000 --buffer 4 --format json
///   fanin -n 3 -k 10 --fault-producer 1 --fault-after 4 --fault-kind panic
///   fanin -n 4 -k 100000 --take 5
///   fanin --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Number of producers
    #[arg(
        short = 'n',
        long,
        default_value = "2",
        allow_negative_numbers = true,
        env = "FANIN_PRODUCERS"
    )]
    pub producers: i64,

    /// Values emitted per producer (0..COUNT)
    #[arg(
        short = 'k',
        long,
        default_value = "10",
        allow_negative_numbers = true,
        env = "FANIN_COUNT"
    )]
    pub count: i64,

    /// Output channel capacity
    ///
    /// Overrides the config file setting.
    #[arg(long, value_name = "CAPACITY")]
    pub buffer: Option<usize>,

    /// Grace period for halted producers, in milliseconds
    #[arg(long, value_name = "MS")]
    pub grace_ms: Option<u64>,

    /// Reaction to the first producer fault
    #[arg(long, value_name = "POLICY")]
    pub fault_policy: Option<FaultPolicy>,

    /// Inject a fault into this producer
    #[arg(long, value_name = "ID")]
    pub fault_producer: Option<usize>,

    /// Values the faulty producer emits before failing
    #[arg(long, value_name = "COUNT", default_value = "0")]
    pub fault_after: i64,

    /// How the injected fault manifests
    #[arg(long, value_name = "KIND", default_value = "error")]
    pub fault_kind: FaultKind,

    /// Stop after reading this many values and shut the run down
    #[arg(long, value_name = "COUNT")]
    pub take: Option<usize>,

    /// Output format (text, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .fanin.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .fanin.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for values and the run summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// One value per line, then a summary (default)
    #[default]
    Text,
    /// A single JSON document
    Json,
}

impl OutputFormat {
    fn from_config(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "text" => Some(OutputFormat::Text),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    ///
    /// Producer and count signs are left to the aggregator, which rejects
    /// negatives itself.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(buffer) = self.buffer {
            if buffer == 0 {
                return Err("Buffer must be at least 1".to_string());
            }
        }

        if let Some(producer) = self.fault_producer {
            if self.producers >= 0 && producer as i64 >= self.producers {
                return Err(format!(
                    "Fault producer {} does not exist (only {} producers)",
                    producer, self.producers
                ));
            }
        }

        if self.take == Some(0) {
            return Err("--take must be at least 1".to_string());
        }

        if self.fault_after < 0 {
            return Err("Fault-after must be non-negative".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `--quiet` wins over a config file that asks for verbose output.
    pub fn log_level(&self, config: &Config) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config.general.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// The fault to inject, if any.
    pub fn fault_plan(&self) -> Option<FaultPlan> {
        self.fault_producer
            .map(|producer| FaultPlan::new(producer, self.fault_after, self.fault_kind))
    }

    /// Effective output format: CLI flag, then config file, then text.
    pub fn output_format(&self, config: &Config) -> OutputFormat {
        self.format
            .or_else(|| OutputFormat::from_config(&config.general.format))
            .unwrap_or_default()
    }

    /// Merge CLI arguments over a loaded configuration.
    ///
    /// CLI arguments take precedence; only explicitly provided values override.
    pub fn merge_into(&self, config: &mut Config) {
        if let Some(buffer) = self.buffer {
            config.aggregator.buffer = buffer;
        }
        if let Some(grace_ms) = self.grace_ms {
            config.aggregator.grace_ms = grace_ms;
        }
        if let Some(policy) = self.fault_policy {
            config.aggregator.fault_policy = policy;
        }
        if self.verbose {
            config.general.verbose = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            producers: 2,
            count: 10,
            buffer: None,
            grace_ms: None,
            fault_policy: None,
            fault_producer: None,
            fault_after: 0,
            fault_kind: FaultKind::Error,
            take: None,
            format: None,
            config: None,
            verbose: false,
            quiet: false,
            init_config: false,
        }
    }

    #[test]
    fn test_parse_flags() {
        let args = Args::try_parse_from([
            "fanin",
            "-n",
            "3",
            "-k",
            "7",
            "--fault-producer",
            "1",
            "--fault-kind",
            "panic",
            "--fault-policy",
            "drain",
        ])
        .unwrap();

        assert_eq!(args.producers, 3);
        assert_eq!(args.count, 7);
        assert_eq!(args.fault_policy, Some(FaultPolicy::Drain));
        assert_eq!(args.fault_plan(), Some(FaultPlan::new(1, 0, FaultKind::Panic)));
    }

    #[test]
    fn test_negative_values_reach_aggregator() {
        let args = Args::try_parse_from(["fanin", "-n", "-1"]).unwrap();
        assert_eq!(args.producers, -1);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_fault_producer_out_of_range() {
        let mut args = make_args();
        args.fault_producer = Some(2);
        assert!(args.validate().is_err());

        args.fault_producer = Some(1);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_zero_buffer() {
        let mut args = make_args();
        args.buffer = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_take_zero() {
        let mut args = make_args();
        args.take = Some(0);
        assert!(args.validate().is_err());

        args.take = Some(1);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_log_level() {
        let config = Config::default();
        let mut args = make_args();
        assert_eq!(args.log_level(&config), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(&config), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(&config), tracing::Level::ERROR);
    }

    #[test]
    fn test_log_level_from_config() {
        let mut config = Config::default();
        config.general.verbose = true;
        let mut args = make_args();
        assert_eq!(args.log_level(&config), tracing::Level::DEBUG);

        args.quiet = true;
        assert_eq!(args.log_level(&config), tracing::Level::ERROR);
    }

    #[test]
    fn test_merge_into_config() {
        let mut config = Config::default();
        let mut args = make_args();
        args.buffer = Some(4);
        args.fault_policy = Some(FaultPolicy::Drain);

        args.merge_into(&mut config);

        assert_eq!(config.aggregator.buffer, 4);
        assert_eq!(config.aggregator.grace_ms, 2000);
        assert_eq!(config.aggregator.fault_policy, FaultPolicy::Drain);
    }

    #[test]
    fn test_output_format_precedence() {
        let mut config = Config::default();
        config.general.format = "json".to_string();
        let mut args = make_args();
        assert_eq!(args.output_format(&config), OutputFormat::Json);

        args.format = Some(OutputFormat::Text);
        assert_eq!(args.output_format(&config), OutputFormat::Text);

        config.general.format = "yaml".to_string();
        args.format = None;
        assert_eq!(args.output_format(&config), OutputFormat::Text);
    }
}
