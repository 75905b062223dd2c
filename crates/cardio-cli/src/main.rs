use anyhow::{Context, Result};
use cardio_lib::{
    artifacts::{ArtifactCounts, Correction, CorrectionMethod, RrCorrector},
    config::{read_config, PipelineConfig},
    detectors::detect_beats,
    io::{read_csv_channels, read_rr_series, read_waveform, RrUnit},
    pipeline::run_pipeline,
    quality::{check_quality, score_quality},
    signal::{SignalKind, Waveform},
    warnings::LogSink,
};
use clap::{Args, Parser, Subcommand};
use log::info;
use serde::Serialize;
use std::path::{Path, PathBuf};

const DEFAULT_FS: f64 = 250.0;

#[derive(Parser)]
#[command(
    name = "cardio",
    version,
    about = "Heartbeat detection, signal quality and RR artifact correction"
)]
struct Cli {
    /// TOML file with detector, quality and correction settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,
    #[command(subcommand)]
    command: Commands,
}

/// One waveform from a text file (one sample per line), a CSV column, or stdin (`-`).
#[derive(Args)]
struct ChannelInput {
    #[arg(long, default_value = "-")]
    input: PathBuf,
    /// Sampling rate; CSV input may instead carry a `time` column
    #[arg(long)]
    fs: Option<f64>,
    /// CSV column to read (default: first channel column)
    #[arg(long)]
    column: Option<String>,
    #[arg(long, default_value = "ecg")]
    kind: SignalKind,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect R-peaks (ECG) or pulse onsets (PPG) in one channel
    DetectPeaks {
        #[command(flatten)]
        channel: ChannelInput,
    },
    /// Flag and correct newline-delimited RR intervals
    CorrectRr {
        #[arg(long, default_value = "-")]
        input: PathBuf,
        /// Intervals are in milliseconds instead of seconds
        #[arg(long)]
        ms: bool,
        #[arg(long)]
        method: Option<CorrectionMethod>,
        /// Keep the first interval
        #[arg(long)]
        no_trim: bool,
    },
    /// Windowed signal quality of one channel
    Sqi {
        #[command(flatten)]
        channel: ChannelInput,
    },
    /// Multi-channel CSV to the NN series of the best channel
    Pipeline {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        fs: Option<f64>,
        /// Comma-separated channel columns (default: all non-time columns)
        #[arg(long, value_delimiter = ',')]
        channels: Vec<String>,
        #[arg(long, default_value = "ecg")]
        kind: SignalKind,
        #[arg(long)]
        method: Option<CorrectionMethod>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let mut cfg = match &cli.config {
        Some(path) => read_config(path)?,
        None => PipelineConfig::default(),
    };
    match cli.command {
        Commands::DetectPeaks { channel } => cmd_detect_peaks(&channel, &cfg, cli.pretty)?,
        Commands::CorrectRr {
            input,
            ms,
            method,
            no_trim,
        } => {
            if let Some(method) = method {
                cfg.method = method;
            }
            let unit = if ms { RrUnit::Milliseconds } else { RrUnit::Seconds };
            cmd_correct_rr(&input, unit, !no_trim, &cfg, cli.pretty)?
        }
        Commands::Sqi { channel } => cmd_sqi(&channel, &cfg, cli.pretty)?,
        Commands::Pipeline {
            input,
            fs,
            channels,
            kind,
            method,
        } => {
            if let Some(method) = method {
                cfg.method = method;
            }
            cmd_pipeline(&input, fs, &channels, kind, &cfg, cli.pretty)?
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let js = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", js);
    Ok(())
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

fn load_channel(input: &ChannelInput) -> Result<Waveform> {
    if is_csv(&input.input) {
        let select: Vec<String> = input.column.iter().cloned().collect();
        let mut waves = read_csv_channels(&input.input, input.fs, &select)?;
        // Non-empty: the reader rejects files without channel columns.
        return Ok(waves.swap_remove(0));
    }
    read_waveform(&input.input, input.fs.unwrap_or(DEFAULT_FS))
}

fn cmd_detect_peaks(input: &ChannelInput, cfg: &PipelineConfig, pretty: bool) -> Result<()> {
    let ts = load_channel(input)?;
    let detection = detect_beats(&ts, input.kind, &cfg.detector)
        .with_context(|| format!("detecting beats in `{}`", ts.label))?;
    info!("{} beats in `{}`", detection.events.len(), ts.label);
    print_json(&detection, pretty)
}

#[derive(Serialize)]
struct CorrectionReport<'a> {
    #[serde(flatten)]
    correction: &'a Correction,
    artifact_count: usize,
    flagged_fraction: f64,
    artifact_counts: ArtifactCounts,
}

fn cmd_correct_rr(
    input: &Path,
    unit: RrUnit,
    trim: bool,
    cfg: &PipelineConfig,
    pretty: bool,
) -> Result<()> {
    let rr = read_rr_series(input, unit)?;
    let corrector = RrCorrector::new(cfg.artifacts, cfg.method);
    let correction = if trim {
        corrector.correct_and_trim(&rr)?
    } else {
        corrector.correct(&rr)?
    };
    let report = CorrectionReport {
        correction: &correction,
        artifact_count: correction.artifact_count(),
        flagged_fraction: correction.flagged_fraction(),
        artifact_counts: correction.counts(),
    };
    print_json(&report, pretty)
}

fn cmd_sqi(input: &ChannelInput, cfg: &PipelineConfig, pretty: bool) -> Result<()> {
    let ts = load_channel(input)?;
    let detection = detect_beats(&ts, input.kind, &cfg.detector)
        .with_context(|| format!("detecting beats in `{}`", ts.label))?;
    let report = score_quality(
        &detection.filtered,
        ts.fs,
        &detection.events.indices,
        input.kind,
        &cfg.sqi,
    );
    check_quality(&report.summary, 0, &cfg.sqi, &mut LogSink);
    print_json(&report, pretty)
}

fn cmd_pipeline(
    input: &Path,
    fs: Option<f64>,
    channels: &[String],
    kind: SignalKind,
    cfg: &PipelineConfig,
    pretty: bool,
) -> Result<()> {
    let waves = read_csv_channels(input, fs, channels)?;
    let output = run_pipeline(&waves, kind, cfg, &mut LogSink)
        .with_context(|| format!("processing {}", input.display()))?;
    print_json(&output, pretty)
}
