//! Lazy frame sequence over an async byte source

use std::collections::VecDeque;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, instrument};

use crate::capture::frame::{Frame, FrameGeometry};
use crate::capture::segmenter::FrameSegmenter;
use crate::error::Result;

/// Pulls raw RGBA bytes from `R` only when the caller asks for a frame.
pub struct FrameReader<R> {
    source: R,
    segmenter: FrameSegmenter,
    ready: VecDeque<Frame>,
    chunk_size: usize,
    discarded: usize,
    eof: bool,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(source: R, geometry: FrameGeometry, chunk_size: usize) -> Self {
        Self {
            source,
            segmenter: FrameSegmenter::new(geometry),
            ready: VecDeque::new(),
            chunk_size: chunk_size.max(1),
            discarded: 0,
            eof: false,
        }
    }

    /// Next complete frame, or `None` once the source is exhausted.
    #[instrument(skip(self), level = "trace")]
    pub async fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Ok(Some(frame));
            }
            if self.eof {
                return Ok(None);
            }

            let mut chunk = BytesMut::with_capacity(self.chunk_size);
            let read = self.source.read_buf(&mut chunk).await?;
            if read == 0 {
                self.eof = true;
                self.discarded = self.segmenter.finish();
                debug!(
                    frames = self.segmenter.frames_emitted(),
                    "Source reached end of input"
                );
                continue;
            }
            self.ready.extend(self.segmenter.push(chunk.freeze())?);
        }
    }

    pub fn frames_emitted(&self) -> u64 {
        self.segmenter.frames_emitted()
    }

    /// Trailing bytes dropped at end of input.
    pub fn discarded(&self) -> usize {
        self.discarded
    }
}
