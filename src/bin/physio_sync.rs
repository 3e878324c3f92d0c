use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueHint};
use physio_sync::{extract, ExtractOptions, PhysioConfig, PulseOutput, TriggerPolicy, WindowOptions};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Cut physiological logs down to the span of one triggered run",
    long_about = None
)]
struct Cli {
    /// Common filename prefix of the logs (e.g. `data/session` for `data/session.ext`)
    #[arg(value_hint = ValueHint::FilePath)]
    input_prefix: PathBuf,

    /// Output prefix (defaults to the input prefix)
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// TOML file overriding the default logger constants
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Ignore the first N triggers
    #[arg(long, default_value_t = 0)]
    skip_first: usize,

    /// Ignore the last N triggers
    #[arg(long, default_value_t = 0)]
    skip_last: usize,

    /// Use only the first N triggers remaining after skipping
    #[arg(long)]
    keep_first: Option<usize>,

    /// Accept irregular trigger intervals
    #[arg(long, action = ArgAction::SetTrue)]
    no_consistency_check: bool,

    /// Ignore trigger pulses and keep the whole trigger log span
    #[arg(long, action = ArgAction::SetTrue)]
    trust_start_time: bool,

    /// Clamp the window to a whole number of repetitions
    #[arg(long, action = ArgAction::SetTrue)]
    truncate: bool,

    /// Also write the trigger pulse train
    #[arg(long, action = ArgAction::SetTrue)]
    emit_trigger: bool,

    /// Write raw pulse oximeter values instead of its trigger train
    #[arg(long, action = ArgAction::SetTrue)]
    raw_pulse: bool,

    /// Replace existing outputs
    #[arg(short = 'f', long, action = ArgAction::SetTrue)]
    overwrite: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let config = match &cli.config {
        Some(path) => PhysioConfig::from_toml_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => PhysioConfig::default(),
    };

    if cli.trust_start_time {
        info!("trust-start-time mode: trigger pulses are ignored");
    }

    let options = ExtractOptions {
        window: WindowOptions {
            policy: TriggerPolicy {
                skip_first: cli.skip_first,
                skip_last: cli.skip_last,
                keep_first: cli.keep_first,
            },
            check_consistency: !cli.no_consistency_check,
            truncate_to_tr: cli.truncate,
            trust_start_time: cli.trust_start_time,
        },
        emit_trigger: cli.emit_trigger,
        pulse_output: if cli.raw_pulse {
            PulseOutput::Raw
        } else {
            PulseOutput::Triggered
        },
        overwrite: cli.overwrite,
    };

    let output_prefix = cli.output.clone().unwrap_or_else(|| cli.input_prefix.clone());
    let paths = extract(&cli.input_prefix, &output_prefix, &options, &config)
        .with_context(|| format!("extracting {}", cli.input_prefix.display()))?;

    for path in paths {
        println!("{}", path.display());
    }
    Ok(())
}
