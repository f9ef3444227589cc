//! Reconstructs fixed-size frames from arbitrarily chunked bytes.

use bytes::{Bytes, BytesMut};
use tracing::{trace, warn};

use crate::capture::frame::{Frame, FrameGeometry};
use crate::error::Result;

/// Splits an unstructured byte stream into complete [`Frame`]s.
///
/// Chunks may be any length: a chunk can finish the current frame, hold
/// several whole frames, or contribute a single byte. Partial frames are
/// kept internally and never handed out.
pub struct FrameSegmenter {
    geometry: FrameGeometry,
    pending: BytesMut,
    /// Bytes still required to complete the frame in `pending`.
    needed: usize,
    sequence: u64,
}

impl FrameSegmenter {
    pub fn new(geometry: FrameGeometry) -> Self {
        Self {
            geometry,
            pending: BytesMut::with_capacity(geometry.frame_size()),
            needed: geometry.frame_size(),
            sequence: 0,
        }
    }

    /// Frames emitted so far.
    pub fn frames_emitted(&self) -> u64 {
        self.sequence
    }

    /// Bytes held towards the next, still incomplete frame.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Feed one chunk, returning every frame it completes in arrival order.
    pub fn push(&mut self, mut chunk: Bytes) -> Result<Vec<Frame>> {
        let mut frames = Vec::new();

        // Re-test the boundary after every emission: one chunk may carry
        // the tail of this frame, whole frames and the head of another.
        while chunk.len() >= self.needed {
            let tail = chunk.split_to(self.needed);
            let data = if self.pending.is_empty() {
                tail
            } else {
                self.pending.extend_from_slice(&tail);
                self.pending.split().freeze()
            };
            frames.push(self.emit(data)?);
        }

        if !chunk.is_empty() {
            self.pending.extend_from_slice(&chunk);
            self.needed -= chunk.len();
        }

        Ok(frames)
    }

    /// End of input. Discards any incomplete trailing frame and returns how
    /// many bytes were dropped.
    pub fn finish(&mut self) -> usize {
        let discarded = self.pending.len();
        if discarded > 0 {
            warn!(
                bytes = discarded,
                frame_size = self.geometry.frame_size(),
                "Discarding incomplete trailing frame"
            );
            metrics::counter!("segmenter_discarded_bytes").increment(discarded as u64);
        }
        self.pending.clear();
        self.needed = self.geometry.frame_size();
        discarded
    }

    fn emit(&mut self, data: Bytes) -> Result<Frame> {
        let frame = Frame::new(&self.geometry, self.sequence, data)?;
        trace!(sequence = self.sequence, "Frame segmented");
        self.sequence += 1;
        self.needed = self.geometry.frame_size();
        metrics::counter!("frames_segmented").increment(1);
        Ok(frame)
    }
}
