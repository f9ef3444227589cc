pub mod capture;
pub mod detect;
pub mod error;
pub mod io;
pub mod motion;
pub mod pipeline;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use capture::{Frame, FrameGeometry};
pub use error::{Error, Result};
pub use pipeline::{FrameProcessor, Pipeline, PipelineReport};

/// Environment variable prefix for configuration overrides,
/// e.g. `FRAMEWATCH__VIDEO__FPS=30`.
pub const ENV_PREFIX: &str = "FRAMEWATCH";

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub video: VideoConfig,
    pub pipeline: PipelineConfig,
    pub motion: MotionConfig,
    pub detector: DetectorConfig,
    pub tracker: TrackerConfig,
}

impl Config {
    /// Layer defaults, an optional TOML file and `FRAMEWATCH__*` environment
    /// variables, in that order of precedence.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let config = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    pub fn geometry(&self) -> Result<FrameGeometry> {
        FrameGeometry::new(self.video.width, self.video.height, self.video.fps)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub codec: String,
    pub bitrate: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Depth of each bounded channel between stages.
    pub channel_capacity: usize,
    /// Upper bound on bytes pulled from the source per read.
    pub read_chunk_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Luminance delta for the exhaustive (event) diff.
    pub event_threshold: f64,
    /// Luminance delta for the sampled (overlay) diff.
    pub overlay_threshold: f64,
    /// Fraction of pixels visited by the sampled diff.
    pub sample_ratio: f64,
    pub detection_threshold: usize,
    pub alarm_threshold: usize,
    pub quiet_threshold: usize,
    /// Paint changed pixels onto outgoing frames.
    pub overlay: bool,
}

/// How detector output is split into responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// A response ends at the first chunk containing `]`.
    Bracket,
    /// One JSON array per line.
    Line,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub program: String,
    pub names: String,
    pub model_config: String,
    pub weights: String,
    /// Startup confidence threshold handed to the detector process.
    pub confidence: f32,
    pub jpeg_quality: u8,
    pub response_timeout_ms: u64,
    pub framing: Framing,
}

impl DetectorConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Detections at or below this confidence are ignored.
    pub confidence_threshold: f32,
    /// Maximum relative width change for two detections to be the same object.
    pub size_threshold: f32,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 24,
            codec: "libx264".into(),
            bitrate: "2M".into(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 4,
            read_chunk_size: 64 * 1024,
        }
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            event_threshold: 50.0,
            overlay_threshold: 70.0,
            sample_ratio: 0.25,
            detection_threshold: 100,
            alarm_threshold: 1000,
            quiet_threshold: 100,
            overlay: true,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            program: "object_detector/object_detector".into(),
            names: "object_detector/model.names".into(),
            model_config: "object_detector/model.cfg".into(),
            weights: "object_detector/yolov3.weights".into(),
            confidence: 0.6,
            jpeg_quality: 80,
            response_timeout_ms: 10_000,
            framing: Framing::Bracket,
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.8,
            size_threshold: 0.1,
        }
    }
}
