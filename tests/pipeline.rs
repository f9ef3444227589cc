use std::io::Cursor;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use framewatch::pipeline::{ColorInvert, Passthrough};
use framewatch::{Error, Frame, FrameGeometry, FrameProcessor, Pipeline, PipelineConfig};
use tokio::io::AsyncRead;

/// Records every sequence it sees, in order.
struct Recorder {
    seen: flume::Sender<u64>,
}

#[async_trait]
impl FrameProcessor for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn process(&mut self, frame: Frame) -> framewatch::Result<Option<Frame>> {
        self.seen.send_async(frame.sequence).await.ok();
        Ok(Some(frame))
    }
}

struct FailAt(u64);

#[async_trait]
impl FrameProcessor for FailAt {
    fn name(&self) -> &str {
        "fail-at"
    }

    async fn process(&mut self, frame: Frame) -> framewatch::Result<Option<Frame>> {
        if frame.sequence == self.0 {
            return Err(Error::Processor {
                stage: self.name().into(),
                message: format!("refused frame {}", frame.sequence),
            });
        }
        Ok(Some(frame))
    }
}

/// Keeps even sequences only.
struct EvenOnly;

#[async_trait]
impl FrameProcessor for EvenOnly {
    fn name(&self) -> &str {
        "even-only"
    }

    async fn process(&mut self, frame: Frame) -> framewatch::Result<Option<Frame>> {
        Ok((frame.sequence % 2 == 0).then_some(frame))
    }
}

/// Hands out the wrapped bytes at most `chunk` at a time.
struct Trickle {
    data: Vec<u8>,
    pos: usize,
    chunk: usize,
}

impl AsyncRead for Trickle {
    fn poll_read(
        mut self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let this = &mut *self;
        let n = this.chunk.min(buf.remaining()).min(this.data.len() - this.pos);
        buf.put_slice(&this.data[this.pos..this.pos + n]);
        this.pos += n;
        std::task::Poll::Ready(Ok(()))
    }
}

/// Source that records how many bytes have been pulled from it.
struct CountingSource {
    data: Vec<u8>,
    pos: usize,
    chunk: usize,
    pulled: Arc<AtomicUsize>,
}

impl AsyncRead for CountingSource {
    fn poll_read(
        mut self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let this = &mut *self;
        let n = this.chunk.min(buf.remaining()).min(this.data.len() - this.pos);
        buf.put_slice(&this.data[this.pos..this.pos + n]);
        this.pos += n;
        this.pulled.fetch_add(n, Ordering::SeqCst);
        std::task::Poll::Ready(Ok(()))
    }
}

/// Sleeps per frame and tracks how far the source ran ahead of it.
struct SlowStage {
    delay: Duration,
    frame_size: usize,
    pulled: Arc<AtomicUsize>,
    processed: u64,
    max_ahead: Arc<AtomicU64>,
}

#[async_trait]
impl FrameProcessor for SlowStage {
    fn name(&self) -> &str {
        "slow"
    }

    async fn process(&mut self, frame: Frame) -> framewatch::Result<Option<Frame>> {
        let read = (self.pulled.load(Ordering::SeqCst) / self.frame_size) as u64;
        self.max_ahead
            .fetch_max(read.saturating_sub(self.processed), Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.processed += 1;
        Ok(Some(frame))
    }
}

fn tiny() -> FrameGeometry {
    // 2x2 RGBA: 16 bytes per frame
    FrameGeometry::new(2, 2, 10).unwrap()
}

fn frames(count: usize, size: usize) -> Vec<u8> {
    (0..count * size).map(|i| (i % 251) as u8).collect()
}

fn config(capacity: usize) -> PipelineConfig {
    PipelineConfig {
        channel_capacity: capacity,
        ..PipelineConfig::default()
    }
}

#[tokio::test]
async fn frames_arrive_in_order_through_many_stages() {
    for chunk in [1, 7, 1000] {
        let input = frames(20, 16);
        let (tx, rx) = flume::unbounded();
        let mut pipeline = Pipeline::new(tiny(), config(2));
        for _ in 0..3 {
            pipeline.push_processor(Box::new(Passthrough));
        }
        pipeline.push_processor(Box::new(Recorder { seen: tx }));

        let mut sink = Vec::new();
        let source = Trickle {
            data: input.clone(),
            pos: 0,
            chunk,
        };
        let report = pipeline.run(source, &mut sink).await.unwrap();

        assert_eq!(sink, input, "chunk size {chunk}");
        assert_eq!(report.frames_written, 20);
        assert_eq!(report.frames_segmented, 20);
        let seen: Vec<u64> = rx.drain().collect();
        assert_eq!(seen, (0..20).collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn identity_run_reproduces_input_and_discards_the_tail() {
    // Three 16-byte frames plus five stray bytes.
    let mut input = frames(3, 16);
    input.extend_from_slice(&[9; 5]);

    let mut sink = Vec::new();
    let report = Pipeline::new(tiny(), PipelineConfig::default())
        .run(Cursor::new(input.clone()), &mut sink)
        .await
        .unwrap();

    assert_eq!(sink, &input[..48]);
    assert_eq!(report.bytes_written, 48);
    assert_eq!(report.bytes_discarded, 5);
}

#[tokio::test]
async fn empty_input_produces_empty_output() {
    let mut sink = Vec::new();
    let report = Pipeline::new(tiny(), PipelineConfig::default())
        .with_processor(ColorInvert)
        .run(Cursor::new(Vec::new()), &mut sink)
        .await
        .unwrap();

    assert!(sink.is_empty());
    assert_eq!(report, Default::default());
}

#[tokio::test]
async fn processor_failure_aborts_the_run() {
    let input = frames(50, 16);
    let mut sink = Vec::new();

    let err = Pipeline::new(tiny(), config(1))
        .with_processor(Passthrough)
        .with_processor(FailAt(5))
        .run(Cursor::new(input.clone()), &mut sink)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Processor { .. }), "{err:?}");
    // Frames before the failure may have reached the sink, nothing after it.
    assert!(sink.len() <= 5 * 16);
    assert_eq!(sink, &input[..sink.len()]);
}

#[tokio::test]
async fn filtered_frames_leave_gaps_without_reordering() {
    let input = frames(6, 16);
    let mut sink = Vec::new();

    let report = Pipeline::new(tiny(), PipelineConfig::default())
        .with_processor(EvenOnly)
        .run(Cursor::new(input.clone()), &mut sink)
        .await
        .unwrap();

    assert_eq!(report.frames_written, 3);
    let expected: Vec<u8> = [0, 2, 4]
        .iter()
        .flat_map(|&n| input[n * 16..(n + 1) * 16].to_vec())
        .collect();
    assert_eq!(sink, expected);
}

#[tokio::test]
async fn inverting_twice_is_identity() {
    let input = frames(4, 16);
    let mut sink = Vec::new();

    Pipeline::new(tiny(), PipelineConfig::default())
        .with_processor(ColorInvert)
        .with_processor(ColorInvert)
        .run(Cursor::new(input.clone()), &mut sink)
        .await
        .unwrap();

    assert_eq!(sink, input);
}

fn counting_source(frames: usize) -> (CountingSource, Arc<AtomicUsize>) {
    let pulled = Arc::new(AtomicUsize::new(0));
    let source = CountingSource {
        data: self::frames(frames, 16),
        pos: 0,
        chunk: 16,
        pulled: pulled.clone(),
    };
    (source, pulled)
}

fn slow_stage(delay_ms: u64, pulled: &Arc<AtomicUsize>) -> (SlowStage, Arc<AtomicU64>) {
    let max_ahead = Arc::new(AtomicU64::new(0));
    let stage = SlowStage {
        delay: Duration::from_millis(delay_ms),
        frame_size: 16,
        pulled: pulled.clone(),
        processed: 0,
        max_ahead: max_ahead.clone(),
    };
    (stage, max_ahead)
}

fn single_frame_reads(capacity: usize) -> PipelineConfig {
    PipelineConfig {
        channel_capacity: capacity,
        read_chunk_size: 16,
    }
}

#[tokio::test]
async fn slow_stage_throttles_the_source() {
    let (source, pulled) = counting_source(60);
    let (slow, max_ahead) = slow_stage(2, &pulled);
    let pipeline = Pipeline::new(tiny(), single_frame_reads(2)).with_processor(slow);
    assert_eq!(pipeline.geometry().frame_size(), 16);

    let mut sink = Vec::new();
    let report = pipeline.run(source, &mut sink).await.unwrap();

    assert_eq!(report.frames_written, 60);
    // current frame + 2 queued + 1 held by the blocked source
    let ahead = max_ahead.load(Ordering::SeqCst);
    assert!(ahead <= 5, "source ran {ahead} frames ahead");
}

#[tokio::test]
async fn backpressure_propagates_through_every_stage() {
    let (source, pulled) = counting_source(60);
    let (first, _) = slow_stage(1, &pulled);
    let (last, max_ahead) = slow_stage(3, &pulled);

    let mut sink = Vec::new();
    let report = Pipeline::new(tiny(), single_frame_reads(2))
        .with_processor(first)
        .with_processor(Passthrough)
        .with_processor(last)
        .run(source, &mut sink)
        .await
        .unwrap();

    assert_eq!(report.frames_written, 60);
    // three channels of 2, one frame in each upstream stage, and one
    // held by the source
    let ahead = max_ahead.load(Ordering::SeqCst);
    assert!(ahead <= 11, "source ran {ahead} frames ahead of the last stage");
}
