use async_trait::async_trait;
use bytes::Bytes;
use flume::Sender;
use tracing::{debug, instrument, warn};

use crate::capture::Frame;
use crate::error::{Error, Result};
use crate::motion::diff::{exhaustive_diff, sampled_diff, PixelDelta};
use crate::motion::hysteresis::{MotionEvaluator, MotionEvent, MotionPhase, MotionThresholds};
use crate::pipeline::FrameProcessor;
use crate::MotionConfig;

/// Overlay colour for changed pixels.
pub const HIGHLIGHT: [u8; 4] = [255, 255, 0, 255];

/// Motion engine stage: feeds the hysteresis evaluator and paints an overlay.
///
/// Owns the only persistent motion state (the previous frame and the
/// evaluator), so one instance serves exactly one stream.
pub struct MotionAnnotator {
    config: MotionConfig,
    evaluator: MotionEvaluator,
    /// Pixels of the last frame as it arrived, before any overlay.
    previous: Option<Bytes>,
    events: Option<Sender<MotionEvent>>,
}

impl MotionAnnotator {
    pub fn new(config: MotionConfig) -> Self {
        Self {
            evaluator: MotionEvaluator::new(MotionThresholds::from(&config)),
            config,
            previous: None,
            events: None,
        }
    }

    /// Forward phase transitions to `events`.
    pub fn with_events(mut self, events: Sender<MotionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn phase(&self) -> MotionPhase {
        self.evaluator.phase()
    }

    async fn publish(&mut self, event: MotionEvent) {
        if let Some(events) = &self.events {
            if events.send_async(event).await.is_err() {
                warn!(?event, "Motion event receiver dropped");
                self.events = None;
            }
        }
    }
}

#[async_trait]
impl FrameProcessor for MotionAnnotator {
    fn name(&self) -> &str {
        "motion"
    }

    #[instrument(skip_all, fields(sequence = frame.sequence), level = "debug")]
    async fn process(&mut self, mut frame: Frame) -> Result<Option<Frame>> {
        // Bytes is immutable: holding this handle is unaffected by the overlay
        // below, which writes into a fresh buffer.
        let current = frame.data().clone();
        let Some(previous) = self.previous.replace(current.clone()) else {
            return Ok(Some(frame));
        };
        if previous.len() != current.len() {
            return Err(Error::FrameSize {
                expected: previous.len(),
                actual: current.len(),
            });
        }

        let changed = exhaustive_diff(&previous, &current, frame.width, self.config.event_threshold);
        debug!(
            sequence = frame.sequence,
            timestamp_ms = frame.timestamp_ms() as u64,
            diff = changed.len(),
            "Frame compared"
        );
        metrics::histogram!("motion_changed_pixels").record(changed.len() as f64);

        if let Some(event) = self.evaluator.observe(changed.len()) {
            self.publish(event).await;
        }

        if self.config.overlay {
            let overlay = sampled_diff(
                &previous,
                &current,
                frame.width,
                self.config.overlay_threshold,
                self.config.sample_ratio,
            );
            if !overlay.is_empty() {
                frame.modify(|pixels, width, _| paint(pixels, width, &overlay));
            }
        }

        Ok(Some(frame))
    }
}

fn paint(pixels: &mut [u8], width: u32, deltas: &[PixelDelta]) {
    for delta in deltas {
        let offset = (delta.y as usize * width as usize + delta.x as usize) * 4;
        if let Some(px) = pixels.get_mut(offset..offset + 4) {
            px.copy_from_slice(&HIGHLIGHT);
        }
    }
}
