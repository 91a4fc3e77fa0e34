//! Video input - ffmpeg subprocess decoding to raw BGR frames
//!
//! ffmpeg decodes and scales the stream to a fixed size; a reader thread
//! pulls fixed-length frames off its stdout and keeps only the newest one in
//! a single-slot channel, so a slow consumer always sees a fresh frame.

use crate::domain::types::Frame;
use anyhow::{bail, Context};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::io::{ErrorKind, Read};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Why a frame could not be read
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ReadError {
    #[error("end of stream")]
    EndOfStream,
    #[error("no frame within {0:?}")]
    Timeout(Duration),
    #[error("frame read failed: {0}")]
    Io(String),
}

/// A source of decoded frames
pub trait VideoSource: Send {
    fn read(&mut self) -> Result<Frame, ReadError>;
}

/// Opens video sources by URL
pub trait VideoOpener {
    fn open(&self, url: &str) -> anyhow::Result<Box<dyn VideoSource>>;
}

/// Settings for the ffmpeg reader
#[derive(Debug, Clone)]
pub struct FfmpegSettings {
    pub binary: String,
    pub width: u32,
    pub height: u32,
    pub read_timeout: Duration,
}

/// Opens streams through an ffmpeg subprocess
pub struct FfmpegOpener {
    settings: FfmpegSettings,
}

impl FfmpegOpener {
    pub fn new(settings: FfmpegSettings) -> Self {
        Self { settings }
    }
}

impl VideoOpener for FfmpegOpener {
    fn open(&self, url: &str) -> anyhow::Result<Box<dyn VideoSource>> {
        Ok(Box::new(FfmpegVideo::open(url, &self.settings)?))
    }
}

/// Running ffmpeg decode of one stream
pub struct FfmpegVideo {
    child: Child,
    frames: Receiver<Result<Frame, ReadError>>,
    pending: Option<Frame>,
    read_timeout: Duration,
}

impl FfmpegVideo {
    /// Spawn ffmpeg and wait for the first frame, which proves the stream opened
    pub fn open(url: &str, settings: &FfmpegSettings) -> anyhow::Result<Self> {
        let (width, height) = (settings.width, settings.height);
        if width == 0 || height == 0 {
            bail!("frame size must be non-zero, got {width}x{height}");
        }

        let mut child = Command::new(&settings.binary)
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(url)
            .arg("-vf")
            .arg(format!("scale={width}:{height}"))
            .arg("-pix_fmt")
            .arg("bgr24")
            .arg("-f")
            .arg("rawvideo")
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to spawn {}", settings.binary))?;

        let stdout = child.stdout.take().context("ffmpeg stdout not captured")?;
        let (tx, rx) = bounded(1);
        let drain = rx.clone();
        let frame_len = width as usize * height as usize * 3;

        thread::Builder::new()
            .name("video-reader".to_string())
            .spawn(move || read_frames(stdout, frame_len, width, height, tx, drain))
            .context("Failed to spawn video reader thread")?;

        let mut video =
            Self { child, frames: rx, pending: None, read_timeout: settings.read_timeout };

        match video.read() {
            Ok(frame) => {
                video.pending = Some(frame);
                info!(url = %url, width = %width, height = %height, "video_opened");
                Ok(video)
            }
            Err(e) => bail!("Failed to open {url}: {e}"),
        }
    }
}

impl VideoSource for FfmpegVideo {
    fn read(&mut self) -> Result<Frame, ReadError> {
        if let Some(frame) = self.pending.take() {
            return Ok(frame);
        }
        match self.frames.recv_timeout(self.read_timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(ReadError::Timeout(self.read_timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(ReadError::EndOfStream),
        }
    }
}

impl Drop for FfmpegVideo {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Reader thread body: frames until EOF or error, newest-wins
fn read_frames(
    mut stdout: impl Read,
    frame_len: usize,
    width: u32,
    height: u32,
    tx: Sender<Result<Frame, ReadError>>,
    drain: Receiver<Result<Frame, ReadError>>,
) {
    loop {
        let mut data = vec![0u8; frame_len];
        let outcome = match stdout.read_exact(&mut data) {
            Ok(()) => Ok(Frame { width, height, data }),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(ReadError::EndOfStream),
            Err(e) => Err(ReadError::Io(e.to_string())),
        };
        let terminal = outcome.is_err();

        match tx.try_send(outcome) {
            Ok(()) => {}
            Err(TrySendError::Full(outcome)) => {
                // Replace the stale frame nobody consumed yet
                let _ = drain.try_recv();
                if tx.try_send(outcome).is_err() {
                    debug!("video_frame_dropped");
                }
            }
            Err(TrySendError::Disconnected(_)) => return,
        }

        if terminal {
            warn!("video_reader_stopped");
            return;
        }
    }
}
