use std::fs::File;
use std::io::{stderr, stdout};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use udaq::telemetry::{Config, Decoded, Decoder, ErrorCounters};

#[derive(Debug, Clone)]
enum Format {
    Json,
    Text,
}

impl clap::ValueEnum for Format {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Json, Self::Text]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        match self {
            Self::Json => Some(clap::builder::PossibleValue::new("json")),
            Self::Text => Some(clap::builder::PossibleValue::new("text")),
        }
    }
}

/// Decode microDAQ telemetry captures.
///
/// Each input file is decoded independently and summarized on stdout. Hit
/// times are seconds on the device clock; the device must have reported at
/// least one PPS second for them to be absolute.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Skip this many bytes at the start of each input.
    #[arg(short, long, default_value_t = 0, value_name = "bytes")]
    skip: usize,

    /// Synthesize epochs for captures recorded without a PPS source.
    ///
    /// Each PPS-second object advances the epoch by exactly one second
    /// instead of using the device-reported value.
    #[arg(long, action)]
    no_pps: bool,

    /// Inputs are COBS-framed serial captures rather than raw word streams.
    #[arg(short, long, action)]
    cobs: bool,

    /// Drop hits recorded before the first high-voltage auto-correction.
    #[arg(long, action)]
    hv: bool,

    /// Output format.
    #[arg(short, long, default_value = "text")]
    format: Format,

    /// Input capture files.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
}

#[derive(Debug, Serialize)]
struct Report {
    filename: String,
    events: usize,
    duration_secs: f64,
    rate_hz: Option<f64>,
    hv_corrections: usize,
    threshold_corrections: usize,
    trailing_bytes: usize,
    errors: ErrorCounters,
}

impl Report {
    fn new(fpath: &Path, decoded: &Decoded) -> Self {
        Report {
            filename: fpath.to_string_lossy().to_string(),
            events: decoded.hits.len(),
            duration_secs: decoded.duration(),
            rate_hz: decoded.rate(),
            hv_corrections: decoded.high_voltage.len(),
            threshold_corrections: decoded.threshold.len(),
            trailing_bytes: decoded.trailing_bytes,
            errors: decoded.errors,
        }
    }
}

fn decode_file(fpath: &Path, config: Config) -> Result<Decoded> {
    let file = File::open(fpath).with_context(|| format!("opening {fpath:?}"))?;
    Decoder::decode_reader(config, file).with_context(|| format!("decoding {fpath:?}"))
}

fn print_text(report: &Report) {
    println!("{}", report.filename);
    match report.rate_hz {
        Some(rate) => println!(
            "{} events in {:.1} seconds = {:.1} Hz",
            report.events, report.duration_secs, rate
        ),
        None => println!("{} events", report.events),
    }
    if report.hv_corrections > 0 {
        println!("{} HV auto-corrections", report.hv_corrections);
    }
    if report.threshold_corrections > 0 {
        println!("{} threshold auto-corrections", report.threshold_corrections);
    }
    let errors = report.errors.total();
    if errors > 0 {
        println!("{errors} decode errors");
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(stderr)
        .with_ansi(false)
        .without_time()
        .with_env_filter(
            EnvFilter::try_from_env("UDAQ_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    debug!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let config = Config::builder()
        .skip_bytes(cli.skip)
        .no_pps(cli.no_pps)
        .cobs_framing(cli.cobs)
        .hv_auto_gate(cli.hv)
        .build();

    let mut reports = Vec::with_capacity(cli.inputs.len());
    for fpath in &cli.inputs {
        info!("decoding {fpath:?}");
        let decoded = decode_file(fpath, config)?;
        reports.push(Report::new(fpath, &decoded));
    }

    match cli.format {
        Format::Json => {
            serde_json::to_writer_pretty(stdout(), &reports).context("serializing to json")?;
            println!();
        }
        Format::Text => {
            for report in &reports {
                print_text(report);
            }
        }
    }

    Ok(())
}
