//! Bounded frame pipeline: source → segmenter → processors → serializer → sink.
//!
//! Every stage but the sink runs as its own tokio task; stages are joined by
//! bounded `flume` channels. When a stage cannot keep up, `send_async` on the
//! stage before it suspends, and that stall propagates all the way back to
//! the byte source. The sink runs on the caller's task and drives throughput.
//!
//! # Shutdown
//!
//! 1. End of input: the source drops its sender, each processor drains,
//!    calls [`FrameProcessor::shutdown`] and drops its own sender, the sink
//!    flushes.
//! 2. Error: the failing stage returns `Err`, its channels close, neighbours
//!    wind down, and the first error is reported after aborting the rest.
//!    Bytes already written to the sink stay written.

pub mod processor;
pub mod serializer;

use std::time::Instant;

use flume::{Receiver, Sender};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument};

use crate::capture::{Frame, FrameGeometry, FrameReader};
use crate::error::{Error, Result};
use crate::PipelineConfig;

pub use processor::{ColorInvert, FrameProcessor, Passthrough};
pub use serializer::FrameSerializer;

/// Totals for one successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub frames_segmented: u64,
    pub frames_written: u64,
    pub bytes_written: u64,
    /// Trailing bytes that never formed a whole frame.
    pub bytes_discarded: usize,
}

enum StageReport {
    Source { frames: u64, discarded: usize },
    Processor,
}

pub struct Pipeline {
    geometry: FrameGeometry,
    config: PipelineConfig,
    processors: Vec<Box<dyn FrameProcessor>>,
}

impl Pipeline {
    pub fn new(geometry: FrameGeometry, config: PipelineConfig) -> Self {
        Self {
            geometry,
            config,
            processors: Vec::new(),
        }
    }

    /// Append a stage; frames visit processors in the order they were added.
    pub fn with_processor<P: FrameProcessor + 'static>(mut self, processor: P) -> Self {
        self.processors.push(Box::new(processor));
        self
    }

    pub fn push_processor(&mut self, processor: Box<dyn FrameProcessor>) {
        self.processors.push(processor);
    }

    pub fn geometry(&self) -> &FrameGeometry {
        &self.geometry
    }

    /// Run until `source` is drained and every frame has reached `sink`, or
    /// until any stage fails.
    #[instrument(skip_all, name = "frame_pipeline", fields(
        width = self.geometry.width,
        height = self.geometry.height,
        fps = self.geometry.fps,
    ))]
    pub async fn run<R, W>(self, source: R, sink: &mut W) -> Result<PipelineReport>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin,
    {
        let started = Instant::now();
        let capacity = self.config.channel_capacity.max(1);
        let stages: Vec<&str> = self.processors.iter().map(|p| p.name()).collect();
        info!(?stages, capacity, "Starting frame pipeline");

        let mut tasks = JoinSet::new();

        let (tx, mut rx) = flume::bounded::<Frame>(capacity);
        let reader = FrameReader::new(source, self.geometry, self.config.read_chunk_size);
        tasks.spawn(source_stage(reader, tx));

        for processor in self.processors {
            let (next_tx, next_rx) = flume::bounded::<Frame>(capacity);
            tasks.spawn(processor_stage(processor, rx, next_tx));
            rx = next_rx;
        }

        let mut report = PipelineReport::default();
        let mut first_error: Option<Error> = None;

        // The sink is the pull-model consumer: its pace drives backpressure.
        let mut serializer = FrameSerializer::new(sink);
        if let Err(e) = sink_stage(rx, &mut serializer).await {
            error!(%e, "Sink stage failed");
            tasks.abort_all();
            first_error = Some(e);
        }
        report.frames_written = serializer.frames_written();
        report.bytes_written = serializer.bytes_written();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(StageReport::Source { frames, discarded })) => {
                    report.frames_segmented = frames;
                    report.bytes_discarded = discarded;
                }
                Ok(Ok(StageReport::Processor)) => {}
                Ok(Err(e)) => {
                    error!(%e, "Pipeline stage failed");
                    tasks.abort_all();
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                Err(join_err) if join_err.is_cancelled() => {}
                Err(join_err) => {
                    error!(%join_err, "Pipeline task panicked");
                    tasks.abort_all();
                    if first_error.is_none() {
                        first_error = Some(Error::TaskPanic(join_err.to_string()));
                    }
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        info!(
            frames = report.frames_written,
            bytes = report.bytes_written,
            discarded = report.bytes_discarded,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Frame pipeline completed"
        );
        Ok(report)
    }
}

async fn source_stage<R>(mut reader: FrameReader<R>, tx: Sender<Frame>) -> Result<StageReport>
where
    R: AsyncRead + Unpin,
{
    while let Some(frame) = reader.next_frame().await? {
        if tx.send_async(frame).await.is_err() {
            debug!("Source: downstream closed");
            break;
        }
    }
    Ok(StageReport::Source {
        frames: reader.frames_emitted(),
        discarded: reader.discarded(),
    })
}

async fn processor_stage(
    mut processor: Box<dyn FrameProcessor>,
    rx: Receiver<Frame>,
    tx: Sender<Frame>,
) -> Result<StageReport> {
    let forwarded = forward_frames(processor.as_mut(), rx, tx).await;
    let closed = processor.shutdown().await;
    forwarded.and(closed).map(|_| StageReport::Processor)
}

async fn forward_frames(
    processor: &mut dyn FrameProcessor,
    rx: Receiver<Frame>,
    tx: Sender<Frame>,
) -> Result<()> {
    while let Ok(frame) = rx.recv_async().await {
        let sequence = frame.sequence;
        match processor.process(frame).await {
            Ok(Some(out)) => {
                if tx.send_async(out).await.is_err() {
                    debug!(stage = processor.name(), "Downstream closed");
                    return Ok(());
                }
            }
            Ok(None) => debug!(stage = processor.name(), sequence, "Frame filtered"),
            Err(e) => {
                error!(stage = processor.name(), sequence, %e, "Processor failed");
                return Err(e);
            }
        }
    }
    debug!(stage = processor.name(), "Upstream drained");
    Ok(())
}

async fn sink_stage<W>(rx: Receiver<Frame>, serializer: &mut FrameSerializer<'_, W>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Ok(frame) = rx.recv_async().await {
        serializer.write_frame(frame).await?;
    }
    serializer.finish().await
}
