use async_trait::async_trait;
use flume::Sender;
use tracing::{debug, info, instrument, warn};

use crate::capture::Frame;
use crate::detect::client::DetectorClient;
use crate::detect::jpeg::encode_jpeg;
use crate::detect::overlay::draw_outline;
use crate::detect::tracker::{SceneEvent, SceneTracker};
use crate::error::{Error, Result};
use crate::pipeline::FrameProcessor;
use crate::{Config, TrackerConfig};

/// Object detection stage: one detector round trip per frame, boxes drawn
/// onto the frame, detections folded into the scene tracker.
///
/// Frames pass through strictly one at a time; the next frame is not pulled
/// until the detector has answered for this one.
pub struct ObjectAnnotator {
    client: DetectorClient,
    tracker: SceneTracker,
    jpeg_quality: u8,
    events: Option<Sender<SceneEvent>>,
}

impl ObjectAnnotator {
    pub fn new(client: DetectorClient, tracker: TrackerConfig, jpeg_quality: u8) -> Self {
        Self {
            client,
            tracker: SceneTracker::new(tracker),
            jpeg_quality,
            events: None,
        }
    }

    /// Start the configured detector process and wrap it.
    pub fn spawn(config: &Config) -> Result<Self> {
        let client = DetectorClient::spawn(&config.detector)?;
        Ok(Self::new(
            client,
            config.tracker.clone(),
            config.detector.jpeg_quality,
        ))
    }

    /// Forward appear/disappear events to `events`.
    pub fn with_events(mut self, events: Sender<SceneEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn tracker(&self) -> &SceneTracker {
        &self.tracker
    }
}

#[async_trait]
impl FrameProcessor for ObjectAnnotator {
    fn name(&self) -> &str {
        "object-detection"
    }

    #[instrument(skip_all, fields(sequence = frame.sequence), level = "debug")]
    async fn process(&mut self, mut frame: Frame) -> Result<Option<Frame>> {
        debug!(sequence = frame.sequence, "Processing frame");

        let (data, width, height, quality) =
            (frame.data().clone(), frame.width, frame.height, self.jpeg_quality);
        let jpeg = tokio::task::spawn_blocking(move || encode_jpeg(&data, width, height, quality))
            .await
            .map_err(|e| Error::TaskPanic(e.to_string()))??;

        let detections = self.client.detect(&jpeg).await?;
        debug!(
            sequence = frame.sequence,
            detections = detections.len(),
            "Frame processed"
        );

        for event in self.tracker.update(&detections) {
            if let Some(events) = &self.events {
                if events.send_async(event).await.is_err() {
                    warn!("Scene event receiver dropped");
                    self.events = None;
                }
            }
        }

        if !detections.is_empty() {
            frame.modify(|pixels, width, height| {
                for detection in &detections {
                    draw_outline(pixels, width, height, detection);
                }
            });
        }
        Ok(Some(frame))
    }

    async fn shutdown(&mut self) -> Result<()> {
        info!(tracked = self.tracker.scene().len(), "Object detection stage done");
        self.client.shutdown().await
    }
}
