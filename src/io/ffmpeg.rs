use std::ffi::OsString;
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::capture::FrameGeometry;
use crate::error::{Error, Result};

pub const FFMPEG: &str = "ffmpeg";

/// A running ffmpeg child with its stderr forwarded to the log.
pub struct FfmpegProcess {
    role: &'static str,
    child: Child,
    stderr: Option<JoinHandle<()>>,
}

impl FfmpegProcess {
    fn spawn(role: &'static str, args: Vec<OsString>) -> Result<Self> {
        info!(role, "Starting ffmpeg");
        let mut child = Command::new(FFMPEG)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(role, "ffmpeg stderr: {line}");
                }
            })
        });
        Ok(Self {
            role,
            child,
            stderr,
        })
    }

    /// Wait for exit; a non-zero status is an error.
    pub async fn wait(mut self) -> Result<ExitStatus> {
        let status = self.child.wait().await?;
        if let Some(stderr) = self.stderr.take() {
            // The pipe closes with the process.
            let _ = stderr.await;
        }
        info!(role = self.role, %status, "ffmpeg exited");
        if status.success() {
            Ok(status)
        } else {
            Err(Error::Io(std::io::Error::other(format!(
                "ffmpeg {} exited with {status}",
                self.role
            ))))
        }
    }

    /// Terminate the process without waiting for it to finish its output.
    pub async fn kill(mut self) -> Result<()> {
        self.child.kill().await?;
        Ok(())
    }
}

/// Arguments that decode `input` into raw RGBA frames on stdout.
pub fn decoder_args(input: &Path, geometry: &FrameGeometry) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-hide_banner".into(), "-i".into(), input.into()];
    args.extend(
        [
            "-f".to_string(),
            "rawvideo".into(),
            "-pix_fmt".into(),
            "rgba".into(),
            "-s".into(),
            format!("{}x{}", geometry.width, geometry.height),
            "-r".into(),
            geometry.fps.to_string(),
            "-".into(),
        ]
        .map(OsString::from),
    );
    args
}

/// Arguments that encode raw RGBA frames from stdin into fragmented mp4 at `output`.
pub fn encoder_args(
    output: &Path,
    geometry: &FrameGeometry,
    codec: &str,
    bitrate: &str,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-hide_banner".to_string(),
        "-y".into(),
        "-f".into(),
        "rawvideo".into(),
        "-vcodec".into(),
        "rawvideo".into(),
        "-s".into(),
        format!("{}x{}", geometry.width, geometry.height),
        "-pix_fmt".into(),
        "rgba".into(),
        "-framerate".into(),
        geometry.fps.to_string(),
        "-i".into(),
        "pipe:0".into(),
        "-c:v".into(),
        codec.into(),
        "-b:v".into(),
        bitrate.into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-movflags".into(),
        "frag_keyframe+empty_moov".into(),
        "-f".into(),
        "mp4".into(),
    ]
    .map(OsString::from)
    .into();
    args.push(output.into());
    args
}

/// Start an ffmpeg that decodes `input` to raw frames; read them from the
/// returned stdout.
pub fn spawn_decoder(input: &Path, geometry: &FrameGeometry) -> Result<(FfmpegProcess, ChildStdout)> {
    let mut process = FfmpegProcess::spawn("decoder", decoder_args(input, geometry))?;
    // Input comes from the file, not from us.
    drop(process.child.stdin.take());
    let stdout = process
        .child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("decoder stdout not captured"))?;
    Ok((process, stdout))
}

/// Start an ffmpeg that encodes raw frames written to the returned stdin.
pub fn spawn_encoder(
    output: &Path,
    geometry: &FrameGeometry,
    codec: &str,
    bitrate: &str,
) -> Result<(FfmpegProcess, ChildStdin)> {
    let mut process =
        FfmpegProcess::spawn("encoder", encoder_args(output, geometry, codec, bitrate))?;
    drop(process.child.stdout.take());
    let stdin = process
        .child
        .stdin
        .take()
        .ok_or_else(|| std::io::Error::other("encoder stdin not captured"))?;
    Ok((process, stdin))
}
