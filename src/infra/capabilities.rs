//! One-shot capability detection
//!
//! Computed once at startup and handed to the source selector, which never
//! inspects the environment itself.

use crate::io::models::default_backend;
use std::process::{Command, Stdio};
use tracing::info;

/// What this process can do on this host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// A model backend is compiled in
    pub inference: bool,
    /// The ffmpeg binary can be executed
    pub video: bool,
}

impl Capabilities {
    pub fn detect(ffmpeg_binary: &str) -> Self {
        let caps = Self {
            inference: default_backend().is_some(),
            video: ffmpeg_available(ffmpeg_binary),
        };
        info!(inference = %caps.inference, video = %caps.video, "capabilities_detected");
        caps
    }

    /// Neither inference nor video; the pipeline runs synthetic only
    pub fn none() -> Self {
        Self { inference: false, video: false }
    }

    pub fn all() -> Self {
        Self { inference: true, video: true }
    }
}

fn ffmpeg_available(binary: &str) -> bool {
    Command::new(binary)
        .arg("-hide_banner")
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}
