//! Frame → raw byte sink

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::capture::Frame;
use crate::error::{Error, Result};

/// Writes frame payloads to a byte sink in sequence order.
pub struct FrameSerializer<'a, W> {
    sink: &'a mut W,
    last_sequence: Option<u64>,
    frames_written: u64,
    bytes_written: u64,
}

impl<'a, W: AsyncWrite + Unpin> FrameSerializer<'a, W> {
    pub fn new(sink: &'a mut W) -> Self {
        Self {
            sink,
            last_sequence: None,
            frames_written: 0,
            bytes_written: 0,
        }
    }

    pub async fn write_frame(&mut self, frame: Frame) -> Result<()> {
        if let Some(previous) = self.last_sequence {
            if frame.sequence <= previous {
                return Err(Error::OrderViolation {
                    previous,
                    current: frame.sequence,
                });
            }
        }
        self.last_sequence = Some(frame.sequence);

        let sequence = frame.sequence;
        let data = frame.into_data();
        self.sink.write_all(&data).await?;

        self.frames_written += 1;
        self.bytes_written += data.len() as u64;
        metrics::counter!("frames_written").increment(1);
        metrics::counter!("bytes_written").increment(data.len() as u64);
        trace!(sequence, "Frame written");
        Ok(())
    }

    /// Flush and close the sink.
    pub async fn finish(&mut self) -> Result<()> {
        self.sink.flush().await?;
        self.sink.shutdown().await?;
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}
