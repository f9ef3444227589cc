use std::time::Duration;

use bytes::Bytes;

use crate::error::{Error, Result};

/// Bytes per RGBA pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// Pre-negotiated stream geometry. Constant for the lifetime of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    frame_size: usize,
}

impl FrameGeometry {
    pub fn new(width: u32, height: u32, fps: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidGeometry(format!(
                "frame dimensions must be non-zero, got {width}x{height}"
            )));
        }
        if fps == 0 {
            return Err(Error::InvalidGeometry("frame rate must be non-zero".into()));
        }
        let frame_size = (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(BYTES_PER_PIXEL))
            .ok_or_else(|| {
                Error::InvalidGeometry(format!("frame size of {width}x{height} overflows"))
            })?;

        Ok(Self {
            width,
            height,
            fps,
            frame_size,
        })
    }

    /// `width * height * 4`
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn pixel_count(&self) -> usize {
        self.frame_size / BYTES_PER_PIXEL
    }

    /// Stream time of a frame: `sequence * 1000 / fps` milliseconds.
    pub fn timestamp_for(&self, sequence: u64) -> Duration {
        let nanos = sequence as u128 * 1_000_000_000 / self.fps as u128;
        Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
    }
}

/// One complete RGBA image.
///
/// `data` is immutable and cheap to clone; edits go through [`Frame::modify`],
/// which always writes into a fresh buffer, so a clone retained elsewhere
/// never observes the change.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    /// Derived from sequence and frame rate, not wall clock.
    pub timestamp: Duration,
    data: Bytes,
}

impl Frame {
    pub fn new(geometry: &FrameGeometry, sequence: u64, data: Bytes) -> Result<Self> {
        if data.len() != geometry.frame_size() {
            return Err(Error::FrameSize {
                expected: geometry.frame_size(),
                actual: data.len(),
            });
        }
        Ok(Self {
            sequence,
            width: geometry.width,
            height: geometry.height,
            timestamp: geometry.timestamp_for(sequence),
            data,
        })
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn into_data(self) -> Bytes {
        self.data
    }

    pub fn timestamp_ms(&self) -> u128 {
        self.timestamp.as_millis()
    }

    /// Copy-on-write edit of the pixel buffer.
    pub fn modify<F>(&mut self, edit: F)
    where
        F: FnOnce(&mut [u8], u32, u32),
    {
        let mut buffer = self.data.to_vec();
        edit(&mut buffer, self.width, self.height);
        self.data = Bytes::from(buffer);
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.sequence)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("timestamp", &self.timestamp)
            .field("len", &self.data.len())
            .finish()
    }
}
