//! Typed errors for the frame pipeline.
//!
//! Library code returns [`Error`]; the binary wraps it in `color_eyre`.

use std::time::Duration;

/// All failures surfaced by framewatch stages.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // ── Configuration ────────────────────────────────────────────────
    #[error("Invalid frame geometry: {0}")]
    InvalidGeometry(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // ── I/O ──────────────────────────────────────────────────────────
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ── Frames ───────────────────────────────────────────────────────
    #[error("Frame size mismatch: expected {expected} bytes, got {actual}")]
    FrameSize { expected: usize, actual: usize },

    #[error("Frame order violated: sequence {current} arrived after {previous}")]
    OrderViolation { previous: u64, current: u64 },

    #[error("Processor `{stage}` failed: {message}")]
    Processor { stage: String, message: String },

    // ── Detector ─────────────────────────────────────────────────────
    #[error("Object detector exited with a request outstanding")]
    DetectorExited,

    #[error("Object detector did not respond within {0:?}")]
    DetectorTimeout(Duration),

    #[error("Detector response {actual} does not answer request {expected}")]
    Correlation { expected: u64, actual: u64 },

    #[error("Malformed detector response: {0}")]
    MalformedResponse(#[from] serde_json::Error),

    #[error("JPEG encoding failed: {0}")]
    Image(#[from] image::ImageError),

    // ── Pipeline ─────────────────────────────────────────────────────
    #[error("Pipeline task panicked: {0}")]
    TaskPanic(String),
}

pub type Result<T> = std::result::Result<T, Error>;
