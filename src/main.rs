//! framewatch: decode a video, run it through frame processors, re-encode it.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use color_eyre::{eyre::eyre, Result};
use framewatch::detect::ObjectAnnotator;
use framewatch::motion::MotionAnnotator;
use framewatch::pipeline::{ColorInvert, Passthrough};
use framewatch::{io, Config, Pipeline};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Copy frames unchanged.
    Passthrough,
    /// Invert RGB, keep alpha.
    Invert,
    /// Highlight changed pixels and report motion events.
    Motion,
    /// Outline detected objects and report scene changes.
    Objects,
}

#[derive(Debug, Parser)]
#[command(name = "framewatch", version, about = "Frame-by-frame video analysis")]
struct Cli {
    /// Video file to read.
    input: PathBuf,
    /// Where to write the processed mp4.
    output: PathBuf,
    #[arg(long, value_enum, default_value_t = Mode::Passthrough)]
    mode: Mode,
    /// Decoded frame width; overrides the configuration file.
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
    #[arg(long)]
    fps: Option<u32>,
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("framewatch=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!("framewatch launching...");

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(width) = cli.width {
        config.video.width = width;
    }
    if let Some(height) = cli.height {
        config.video.height = height;
    }
    if let Some(fps) = cli.fps {
        config.video.fps = fps;
    }
    let geometry = config.geometry()?;
    info!(
        input = %cli.input.display(),
        output = %cli.output.display(),
        mode = ?cli.mode,
        width = geometry.width,
        height = geometry.height,
        fps = geometry.fps,
        "Configuration loaded"
    );

    let (pipeline, printer) = build_pipeline(cli.mode, &config)?;

    let (decoder, frames) = io::spawn_decoder(&cli.input, &geometry)?;
    let (encoder, mut sink) = io::spawn_encoder(
        &cli.output,
        &geometry,
        &config.video.codec,
        &config.video.bitrate,
    )?;

    let outcome = tokio::select! {
        result = pipeline.run(frames, &mut sink) => result.map_err(Into::into),
        _ = tokio::signal::ctrl_c() => Err(eyre!("Interrupted")),
    };
    // Closing stdin lets the encoder finalise the file.
    drop(sink);
    // The run dropped every event sender; wait for the last events to print.
    if let Some(printer) = printer {
        if let Err(e) = printer.await {
            warn!(%e, "Event printer failed");
        }
    }

    match outcome {
        Ok(report) => {
            decoder.wait().await?;
            encoder.wait().await?;
            info!(
                frames = report.frames_written,
                bytes = report.bytes_written,
                discarded = report.bytes_discarded,
                "framewatch done"
            );
            Ok(())
        }
        Err(e) => {
            error!(%e, "Processing failed");
            if let Err(kill) = decoder.kill().await {
                warn!(%kill, "Could not stop decoder");
            }
            if let Err(exit) = encoder.wait().await {
                warn!(%exit, "Encoder did not finish cleanly");
            }
            Err(e)
        }
    }
}

/// The pipeline for `mode`, plus the task printing its events, if it has any.
fn build_pipeline(mode: Mode, config: &Config) -> Result<(Pipeline, Option<JoinHandle<()>>)> {
    let pipeline = Pipeline::new(config.geometry()?, config.pipeline.clone());
    let capacity = config.pipeline.channel_capacity.max(1);

    let built = match mode {
        Mode::Passthrough => (pipeline.with_processor(Passthrough), None),
        Mode::Invert => (pipeline.with_processor(ColorInvert), None),
        Mode::Motion => {
            let (tx, rx) = flume::bounded(capacity);
            let printer = tokio::spawn(print_events(rx));
            let motion = MotionAnnotator::new(config.motion.clone()).with_events(tx);
            (pipeline.with_processor(motion), Some(printer))
        }
        Mode::Objects => {
            let annotator = ObjectAnnotator::spawn(config)?;
            let (tx, rx) = flume::bounded(capacity);
            let printer = tokio::spawn(print_events(rx));
            (pipeline.with_processor(annotator.with_events(tx)), Some(printer))
        }
    };
    Ok(built)
}

/// Events go to stdout as JSON lines; logs stay on stderr.
async fn print_events<E: Serialize + Send + 'static>(events: flume::Receiver<E>) {
    while let Ok(event) = events.recv_async().await {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(%e, "Could not serialise event"),
        }
    }
}
