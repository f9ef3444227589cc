//! Scene tracking across frames.
//!
//! Identity is "same token, similar width". There is no numeric id and no
//! position test: two confident detections of one class whose widths are
//! within the size threshold are the same object wherever they are.

use serde::Serialize;
use tracing::info;

use crate::detect::object::DetectedObject;
use crate::TrackerConfig;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "object", rename_all = "lowercase")]
pub enum SceneEvent {
    Appeared(DetectedObject),
    Disappeared(DetectedObject),
}

/// Current set of tracked objects, most recent detection for each.
pub struct SceneTracker {
    config: TrackerConfig,
    scene: Vec<DetectedObject>,
}

impl SceneTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            scene: Vec::new(),
        }
    }

    pub fn scene(&self) -> &[DetectedObject] {
        &self.scene
    }

    fn same_object(&self, tracked: &DetectedObject, candidate: &DetectedObject) -> bool {
        if tracked.token != candidate.token {
            return false;
        }
        let reference = (tracked.width as f64).abs();
        let change = (tracked.width as i64 - candidate.width as i64).abs() as f64 / reference;
        change < self.config.size_threshold as f64
    }

    /// Fold one frame's detections into the scene.
    pub fn update(&mut self, detections: &[DetectedObject]) -> Vec<SceneEvent> {
        let mut events = Vec::new();
        // Entries present before this frame that have not been matched yet.
        let carried = self.scene.len();
        let mut unmatched = vec![true; carried];

        for detection in detections
            .iter()
            .filter(|d| d.confidence > self.config.confidence_threshold)
        {
            let mut found = false;
            for index in 0..self.scene.len() {
                if self.same_object(&self.scene[index], detection) {
                    self.scene[index] = detection.clone();
                    if index < carried {
                        unmatched[index] = false;
                    }
                    found = true;
                }
            }

            if !found {
                info!(token = %detection.token, "New object detected");
                self.scene.push(detection.clone());
                events.push(SceneEvent::Appeared(detection.clone()));
            }
        }

        // Remove from the back so earlier indices stay valid.
        for index in (0..carried).rev() {
            if unmatched[index] {
                let gone = self.scene.remove(index);
                info!(token = %gone.token, "Object disappeared");
                events.push(SceneEvent::Disappeared(gone));
            }
        }

        events
    }
}

impl Default for SceneTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(token: &str, confidence: f32, x: i32, width: i32) -> DetectedObject {
        DetectedObject {
            token: token.into(),
            confidence,
            x,
            y: 0,
            width,
            height: 50,
        }
    }

    fn appeared(events: &[SceneEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, SceneEvent::Appeared(_)))
            .count()
    }

    #[test]
    fn nine_percent_wider_updates_in_place() {
        let mut tracker = SceneTracker::default();
        tracker.update(&[detection("person", 0.9, 10, 100)]);

        let events = tracker.update(&[detection("person", 0.95, 400, 109)]);

        assert!(events.is_empty());
        assert_eq!(tracker.scene().len(), 1);
        assert_eq!(tracker.scene()[0].width, 109);
        assert_eq!(tracker.scene()[0].x, 400);
    }

    #[test]
    fn eleven_percent_wider_is_a_new_object_and_old_one_leaves() {
        let mut tracker = SceneTracker::default();
        let original = detection("person", 0.9, 10, 100);
        tracker.update(&[original.clone()]);

        let events = tracker.update(&[detection("person", 0.9, 10, 111)]);

        let replacement = detection("person", 0.9, 10, 111);
        assert_eq!(
            events,
            vec![
                SceneEvent::Appeared(replacement.clone()),
                SceneEvent::Disappeared(original),
            ]
        );
        assert_eq!(tracker.scene(), &[replacement]);
    }

    #[test]
    fn second_entry_then_original_disappears_next_frame() {
        let mut tracker = SceneTracker::default();
        let original = detection("dog", 0.9, 0, 100);
        tracker.update(&[original.clone()]);

        let wider = detection("dog", 0.9, 0, 111);
        let events = tracker.update(&[original.clone(), wider.clone()]);
        assert_eq!(events, vec![SceneEvent::Appeared(wider.clone())]);
        assert_eq!(tracker.scene().len(), 2);

        let events = tracker.update(&[wider.clone()]);
        assert_eq!(events, vec![SceneEvent::Disappeared(original)]);
        assert_eq!(tracker.scene(), &[wider]);
    }

    #[test]
    fn low_confidence_detections_are_ignored() {
        let mut tracker = SceneTracker::default();
        tracker.update(&[detection("cat", 0.9, 0, 40)]);

        let events = tracker.update(&[detection("cat", 0.8, 0, 40), detection("car", 0.5, 0, 40)]);

        // 0.8 is not above the threshold, so the tracked cat has no match
        assert_eq!(events, vec![SceneEvent::Disappeared(detection("cat", 0.9, 0, 40))]);
        assert!(tracker.scene().is_empty());
    }

    #[test]
    fn different_tokens_never_match() {
        let mut tracker = SceneTracker::default();
        tracker.update(&[detection("cat", 0.9, 0, 40)]);

        let events = tracker.update(&[detection("cat", 0.9, 0, 40), detection("dog", 0.9, 0, 40)]);

        assert_eq!(appeared(&events), 1);
        assert_eq!(tracker.scene().len(), 2);
    }

    #[test]
    fn position_is_not_compared() {
        let mut tracker = SceneTracker::default();
        tracker.update(&[detection("car", 0.99, 0, 200)]);

        let events = tracker.update(&[detection("car", 0.99, 5000, 200)]);

        assert!(events.is_empty());
        assert_eq!(tracker.scene()[0].x, 5000);
    }

    #[test]
    fn extreme_widths_do_not_overflow() {
        let mut tracker = SceneTracker::default();
        tracker.update(&[detection("bus", 0.9, 0, i32::MAX)]);

        let events = tracker.update(&[detection("bus", 0.9, 0, -1), detection("bus", 0.9, 0, i32::MIN)]);

        assert_eq!(appeared(&events), 2);
        assert_eq!(tracker.scene().len(), 2);
        assert!(tracker.scene().iter().all(|o| o.width < 0));
    }

    #[test]
    fn same_sized_duplicates_in_one_frame_collapse() {
        let mut tracker = SceneTracker::default();

        let events = tracker.update(&[detection("cup", 0.9, 0, 30), detection("cup", 0.9, 90, 30)]);

        assert_eq!(appeared(&events), 1);
        assert_eq!(tracker.scene().len(), 1);
        assert_eq!(tracker.scene()[0].x, 90);
    }
}
