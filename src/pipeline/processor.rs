//! Per-frame processing stages

use async_trait::async_trait;

use crate::capture::Frame;
use crate::error::Result;

/// One frame in, at most one frame out.
///
/// Returning `Ok(None)` drops the frame (a filter). Returning an error aborts
/// the whole pipeline; the failed frame is never forwarded.
#[async_trait]
pub trait FrameProcessor: Send {
    fn name(&self) -> &str;

    async fn process(&mut self, frame: Frame) -> Result<Option<Frame>>;

    /// Called once when the stage stops receiving frames, after success or failure.
    async fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<P: FrameProcessor + ?Sized> FrameProcessor for Box<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn process(&mut self, frame: Frame) -> Result<Option<Frame>> {
        (**self).process(frame).await
    }

    async fn shutdown(&mut self) -> Result<()> {
        (**self).shutdown().await
    }
}

/// Identity stage.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

#[async_trait]
impl FrameProcessor for Passthrough {
    fn name(&self) -> &str {
        "passthrough"
    }

    async fn process(&mut self, frame: Frame) -> Result<Option<Frame>> {
        Ok(Some(frame))
    }
}

/// Inverts R, G and B; alpha is left as is.
#[derive(Debug, Default, Clone, Copy)]
pub struct ColorInvert;

#[async_trait]
impl FrameProcessor for ColorInvert {
    fn name(&self) -> &str {
        "color-invert"
    }

    async fn process(&mut self, mut frame: Frame) -> Result<Option<Frame>> {
        frame.modify(|pixels, _, _| {
            for px in pixels.chunks_exact_mut(4) {
                px[0] = 255 - px[0];
                px[1] = 255 - px[1];
                px[2] = 255 - px[2];
            }
        });
        Ok(Some(frame))
    }
}
