//! `pixelfill` CLI - Reconstruct missing regions of an image.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pixelfill::image::Size;
use pixelfill::model::{DevicePreference, DEFAULT_CHECKPOINT};
use pixelfill::{Config, ModelStatus, Pipeline};

/// Reconstruct missing or occluded regions of an image with a pretrained model.
#[derive(Parser, Debug)]
#[command(name = "pixelfill")]
#[command(version, about, long_about = None)]
struct Args {
    /// Input image path (JPEG, PNG, BMP or GIF).
    #[arg(value_name = "INPUT", required_unless_present = "status")]
    input: Option<PathBuf>,

    /// Directory to write the artifacts into.
    #[arg(short, long, default_value = ".", value_name = "DIR")]
    out_dir: PathBuf,

    /// ONNX checkpoint path.
    #[arg(long, default_value = DEFAULT_CHECKPOINT, value_name = "PATH")]
    checkpoint: PathBuf,

    /// Fixed input size the model was trained on.
    #[arg(long, default_value = "128x128", value_name = "WxH")]
    input_size: Size,

    /// Preview and comparison tile size.
    #[arg(long, default_value = "300x300", value_name = "WxH")]
    preview_size: Size,

    /// Artifact filename prefix.
    #[arg(long, default_value = "pixelrnn", value_name = "PREFIX")]
    prefix: String,

    /// Never use an accelerator.
    #[arg(long)]
    cpu: bool,

    /// Number of model sessions (concurrent forward passes).
    #[arg(long, default_value = "1", value_name = "INT")]
    sessions: usize,

    /// Print model availability and exit.
    #[arg(long)]
    status: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("pixelfill={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Err(err) = run(&args) {
        tracing::error!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn run(args: &Args) -> Result<()> {
    let config = Config {
        checkpoint_path: args.checkpoint.clone(),
        model_input_size: args.input_size,
        preview_size: args.preview_size,
        filename_prefix: args.prefix.clone(),
        device: if args.cpu {
            DevicePreference::Cpu
        } else {
            DevicePreference::Auto
        },
        sessions: args.sessions,
    };

    let pipeline = Pipeline::new(config).context("Failed to initialize pipeline")?;

    if args.status {
        print_status(pipeline.status());
        return Ok(());
    }

    if !pipeline.is_ready() {
        print_status(pipeline.status());
        anyhow::bail!("Model not available. Train and export the model first.");
    }

    let Some(input) = args.input.as_ref() else {
        anyhow::bail!("No input image given");
    };

    let bytes = fs::read(input)
        .with_context(|| format!("Failed to read input image: {}", input.display()))?;

    let completion = pipeline
        .process(&bytes)
        .with_context(|| format!("Failed to process image: {}", input.display()))?;

    fs::create_dir_all(&args.out_dir).with_context(|| {
        format!("Failed to create output directory: {}", args.out_dir.display())
    })?;

    for artifact in completion.artifacts() {
        let path = artifact
            .write_to_dir(&args.out_dir)
            .with_context(|| format!("Failed to write {}", artifact.filename))?;
        println!("{} ({}) -> {}", artifact.kind.name(), artifact.size, path.display());
    }

    println!(
        "Reconstructed {} image from {} model input in {:.2}s",
        completion.original_size,
        completion.model_input_size,
        completion.inference_time.as_secs_f64()
    );

    Ok(())
}

fn print_status(status: &ModelStatus) {
    match status {
        ModelStatus::Ready { device, epoch } => match epoch {
            Some(epoch) => println!("Model ready on {device} (epoch {epoch})"),
            None => println!("Model ready on {device}"),
        },
        ModelStatus::Missing { path } => {
            println!("Model not available: no checkpoint at {}", path.display());
        }
        ModelStatus::Failed { reason } => println!("Model not available: {reason}"),
    }
}
