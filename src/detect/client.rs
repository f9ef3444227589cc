//! Request/response correlation with an external detector process.
//!
//! One JPEG goes down the detector's stdin per request; one JSON array comes
//! back on stdout. A background task frames stdout into responses, tags each
//! with the id of the latest request written at the time it was framed, and
//! hands them over through a single-slot channel. `detect` takes `&mut self`,
//! so at most one request can ever be outstanding.
//!
//! Output that was already framed when a request goes out cannot answer it:
//! anything queued is dropped before writing, and anything tagged with an
//! older request id fails the request with [`Error::Correlation`].

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use flume::{Receiver, Sender};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::detect::framer::{framer_for, ResponseFramer};
use crate::detect::object::{parse_response, DetectedObject};
use crate::error::{Error, Result};
use crate::DetectorConfig;

/// How long `shutdown` waits for the detector to exit after closing stdin.
const EXIT_GRACE: Duration = Duration::from_secs(2);

struct Response {
    /// Latest request written when this response was framed; 0 before any.
    id: u64,
    objects: Vec<DetectedObject>,
}

pub struct DetectorClient {
    input: Option<Box<dyn AsyncWrite + Send + Unpin>>,
    responses: Receiver<Result<Response>>,
    reader: JoinHandle<()>,
    stderr: Option<JoinHandle<()>>,
    child: Option<Child>,
    requests: Arc<AtomicU64>,
    timeout: Duration,
}

impl DetectorClient {
    /// Start the detector with `names config weights confidence` arguments.
    pub fn spawn(config: &DetectorConfig) -> Result<Self> {
        info!(program = %config.program, "Starting object detector");

        let mut child = Command::new(&config.program)
            .arg(&config.names)
            .arg(&config.model_config)
            .arg(&config.weights)
            .arg(config.confidence.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| std::io::Error::other("detector stdin not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("detector stdout not captured"))?;
        let stderr = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!("Object detector stderr: {line}");
                }
            })
        });

        let mut client = Self::from_io(
            stdout,
            stdin,
            framer_for(config.framing),
            config.response_timeout(),
        );
        client.stderr = stderr;
        client.child = Some(child);
        info!("Object detector started");
        Ok(client)
    }

    /// Talk to a detector over an arbitrary byte channel.
    pub fn from_io<R, W>(
        output: R,
        input: W,
        framer: Box<dyn ResponseFramer>,
        timeout: Duration,
    ) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (tx, rx) = flume::bounded(1);
        let requests = Arc::new(AtomicU64::new(0));
        let reader = tokio::spawn(read_responses(output, framer, requests.clone(), tx));
        Self {
            input: Some(Box::new(input)),
            responses: rx,
            reader,
            stderr: None,
            child: None,
            requests,
            timeout,
        }
    }

    /// Send one encoded frame and wait for its detections.
    #[instrument(skip_all, fields(bytes = jpeg.len()), level = "debug")]
    pub async fn detect(&mut self, jpeg: &[u8]) -> Result<Vec<DetectedObject>> {
        let input = self.input.as_mut().ok_or(Error::DetectorExited)?;

        // Nothing is waiting for these.
        while let Ok(unsolicited) = self.responses.try_recv() {
            match unsolicited {
                Ok(response) => warn!(
                    after_request = response.id,
                    detections = response.objects.len(),
                    "Dropping unsolicited detector response"
                ),
                Err(e) => warn!(%e, "Dropping unsolicited detector output"),
            }
        }

        let id = self.requests.fetch_add(1, Ordering::SeqCst) + 1;
        let started = Instant::now();
        let responses = &self.responses;
        let exchange = async {
            input.write_all(jpeg).await.map_err(closed_pipe)?;
            input.flush().await.map_err(closed_pipe)?;
            match responses.recv_async().await {
                Ok(response) => response,
                Err(_) => Err(Error::DetectorExited),
            }
        };

        let response = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| Error::DetectorTimeout(self.timeout))??;
        if response.id != id {
            return Err(Error::Correlation {
                expected: id,
                actual: response.id,
            });
        }

        let elapsed = started.elapsed();
        metrics::histogram!("detector_round_trip_ms").record(elapsed.as_secs_f64() * 1000.0);
        debug!(
            request = id,
            detections = response.objects.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Detector responded"
        );
        Ok(response.objects)
    }

    /// Close the detector's stdin and reap the process.
    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(mut input) = self.input.take() {
            // Best effort: the detector may already be gone.
            if let Err(e) = input.shutdown().await {
                debug!(%e, "Detector stdin already closed");
            }
        }
        if let Some(mut child) = self.child.take() {
            info!("Stopping object detector");
            match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
                Ok(status) => {
                    let status = status?;
                    info!(%status, "Object detector exited");
                }
                Err(_) => {
                    warn!("Object detector ignored end of input, killing it");
                    child.kill().await?;
                }
            }
        }
        Ok(())
    }
}

impl Drop for DetectorClient {
    fn drop(&mut self) {
        self.reader.abort();
        if let Some(stderr) = &self.stderr {
            stderr.abort();
        }
    }
}

fn closed_pipe(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::BrokenPipe {
        Error::DetectorExited
    } else {
        Error::Io(e)
    }
}

async fn read_responses<R>(
    mut output: R,
    mut framer: Box<dyn ResponseFramer>,
    requests: Arc<AtomicU64>,
    tx: Sender<Result<Response>>,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; 8 * 1024];
    let mut framed = 0u64;
    loop {
        let n = match output.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                let _ = tx.send_async(Err(Error::Io(e))).await;
                return;
            }
        };
        // Framed now, so tagged now, however long the hand-off below blocks.
        let id = requests.load(Ordering::SeqCst);
        for body in framer.push(&buf[..n]) {
            let response = parse_response(&body)
                .map(|objects| Response { id, objects })
                .map_err(Error::from);
            framed += 1;
            if tx.send_async(response).await.is_err() {
                return;
            }
        }
    }
    if framer.pending() > 0 {
        warn!(bytes = framer.pending(), "Detector closed output mid-response");
    }
    debug!(responses = framed, "Detector output closed");
}
