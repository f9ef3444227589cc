pub mod annotator;
pub mod diff;
pub mod hysteresis;

pub use annotator::MotionAnnotator;
pub use diff::{exhaustive_diff, luminance, sampled_diff, PixelDelta};
pub use hysteresis::{MotionEvaluator, MotionEvent, MotionPhase, MotionThresholds};
