//! Quiet/alarm state machine over per-frame changed-pixel counts.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::MotionConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionPhase {
    Quiet,
    Alarm,
}

/// Emitted on a phase change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MotionEvent {
    EnteredAlarm,
    EnteredQuiet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionThresholds {
    /// A frame counts as "motion" above this many changed pixels.
    pub detection: usize,
    /// Accumulated motion magnitude needed to raise the alarm.
    pub alarm: usize,
    /// Accumulated still frames needed to stand the alarm down.
    pub quiet: usize,
}

impl Default for MotionThresholds {
    fn default() -> Self {
        Self {
            detection: 100,
            alarm: 1000,
            quiet: 100,
        }
    }
}

impl From<&MotionConfig> for MotionThresholds {
    fn from(config: &MotionConfig) -> Self {
        Self {
            detection: config.detection_threshold,
            alarm: config.alarm_threshold,
            quiet: config.quiet_threshold,
        }
    }
}

/// Hysteresis evaluator, one per stream.
///
/// Towards alarm the accumulator sums changed-pixel counts of motion frames;
/// towards quiet it counts still frames, one per frame. Motion frames during
/// an alarm leave the accumulator alone, and still frames while quiet do not
/// decay it.
#[derive(Debug, Clone)]
pub struct MotionEvaluator {
    thresholds: MotionThresholds,
    phase: MotionPhase,
    accumulator: usize,
}

impl MotionEvaluator {
    pub fn new(thresholds: MotionThresholds) -> Self {
        Self {
            thresholds,
            phase: MotionPhase::Quiet,
            accumulator: 0,
        }
    }

    pub fn phase(&self) -> MotionPhase {
        self.phase
    }

    pub fn accumulator(&self) -> usize {
        self.accumulator
    }

    /// Feed one frame's exhaustive-diff count.
    pub fn observe(&mut self, changed: usize) -> Option<MotionEvent> {
        let moving = changed > self.thresholds.detection;
        if moving {
            debug!(changed, "Motion detected");
        } else {
            debug!(changed, "No motion detected");
        }

        match (self.phase, moving) {
            (MotionPhase::Quiet, true) => {
                self.accumulator = self.accumulator.saturating_add(changed);
                if self.accumulator > self.thresholds.alarm {
                    self.phase = MotionPhase::Alarm;
                    self.accumulator = 0;
                    info!("Entered alarm state");
                    return Some(MotionEvent::EnteredAlarm);
                }
            }
            (MotionPhase::Alarm, false) => {
                self.accumulator += 1;
                if self.accumulator > self.thresholds.quiet {
                    self.phase = MotionPhase::Quiet;
                    self.accumulator = 0;
                    info!("Entered quiet state");
                    return Some(MotionEvent::EnteredQuiet);
                }
            }
            (MotionPhase::Quiet, false) | (MotionPhase::Alarm, true) => {}
        }
        None
    }
}

impl Default for MotionEvaluator {
    fn default() -> Self {
        Self::new(MotionThresholds::default())
    }
}
