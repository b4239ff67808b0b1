mod aggregate;
mod analyzer;
mod config;
mod encoder;
mod error;
mod orchestrator;
mod report;
mod sampler;
mod search;
mod tools;
mod trial;
mod utils;
mod verifier;

use anyhow::{Context, bail};
use clap::Parser;
use config::AppConfig;
use orchestrator::Orchestrator;
use std::path::PathBuf;
use std::sync::Arc;
use tools::FfmpegTools;
use utils::DependencyStatus;

/// Shrink a video to the smallest visually-lossless H.265 encode by
/// searching for the weakest encoder parameters that still meet a
/// perceptual quality target.
#[derive(Debug, Parser)]
#[command(name = "hevcpress", version)]
struct Cli {
    /// Source video file
    input: PathBuf,

    /// Output file (default: source name with the configured suffix)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Config file to use instead of the default location
    #[arg(long)]
    config: Option<PathBuf>,

    /// Target VMAF score (0-100)
    #[arg(long)]
    target_vmaf: Option<f64>,

    /// Ceiling on concurrent external subprocesses
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per-trial timeout in seconds
    #[arg(long)]
    trial_timeout: Option<u64>,

    /// Whole-job timeout in seconds
    #[arg(long)]
    job_timeout: Option<u64>,

    /// x265 preset for trials and the final encode
    #[arg(long)]
    preset: Option<String>,

    /// Skip the full-length VMAF verification after the final encode
    #[arg(long)]
    no_verify: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = utils::init_logging();

    let deps = DependencyStatus::check();
    if !deps.all_available() {
        bail!(
            "missing required tools: {}. Install ffmpeg with libx265 and libvmaf support.",
            deps.missing().join(", ")
        );
    }

    let config = load_config(&cli)?;
    config.validate()?;

    if !cli.input.is_file() {
        bail!("input file not found: {}", cli.input.display());
    }
    let output = cli.output.clone().unwrap_or_else(|| {
        let stem = cli.input.file_stem().unwrap_or_default().to_string_lossy();
        let parent = cli.input.parent().unwrap_or(std::path::Path::new("."));
        parent.join(format!(
            "{}{}.{}",
            stem, config.output.suffix, config.output.container
        ))
    });
    if output == cli.input {
        bail!("output path equals the input path");
    }

    let orchestrator = Orchestrator::new(config, Arc::new(FfmpegTools));
    let report = orchestrator
        .run(&cli.input, &output)
        .await
        .context("encode job failed")?;

    report.print_human();
    Ok(())
}

/// Load the config file and apply CLI overrides
fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path)?,
        None => AppConfig::load(),
    };

    if let Some(target) = cli.target_vmaf {
        config.quality.target_vmaf = target;
    }
    if let Some(concurrency) = cli.concurrency {
        config.performance.concurrency = concurrency;
    }
    if let Some(secs) = cli.trial_timeout {
        config.performance.trial_timeout_secs = secs;
    }
    if let Some(secs) = cli.job_timeout {
        config.performance.job_timeout_secs = Some(secs);
    }
    if let Some(preset) = &cli.preset {
        config.performance.x265_preset = preset.clone();
    }
    if cli.no_verify {
        config.quality.verify_final = false;
    }

    Ok(config)
}
