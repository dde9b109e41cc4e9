//! Decoder module for hwvideo-bridge
//!
//! This module defines the seam to the platform's hardware decoder: the
//! [`DecoderBackend`] / [`DecoderSession`] traits, the opaque
//! [`PlatformFrame`] a decoder produces, the [`FrameSink`] its callbacks
//! write into, and the triple-buffered [`FrameSlotPipeline`] that hands
//! frames to the render thread.

mod frame_slots;
mod sink;
pub mod synthetic;

pub use frame_slots::{AcquiredFrame, FrameSlotPipeline, PipelineStats, SLOT_COUNT};
pub use sink::{FrameSink, SinkGate};
pub use synthetic::{SyntheticBackend, SyntheticFrame};

use crate::utils::error::{BridgeError, Result};
use serde::Serialize;
use std::ffi::c_void;
use std::fmt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::Arc;
use std::time::Duration;

/// One decoded video frame owned by the platform decoder
///
/// Implementations wrap an OS object such as an `AHardwareBuffer`-backed
/// image or a `CVPixelBuffer`. The bridge only ever borrows the native
/// buffer; releasing it is the decoder's business.
pub trait PlatformFrame: Send + Sync {
    /// Raw pointer to the GPU-importable buffer, if the frame still has one
    fn native_buffer(&self) -> Option<NonNull<c_void>>;

    /// False once the decoder has recycled or released the frame
    fn is_valid(&self) -> bool {
        true
    }

    /// Natural decode dimensions (width, height)
    fn dimensions(&self) -> (u32, u32);

    /// Presentation timestamp
    fn timestamp(&self) -> Duration {
        Duration::ZERO
    }
}

/// Shared reference to a platform frame as stored in the frame slots
pub type FrameRef = Arc<dyn PlatformFrame>;

/// Media source handed to the decoder untouched
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MediaSource {
    /// Remote URL (http, https, hls, ...)
    Remote(String),

    /// Local file path
    Local(PathBuf),
}

impl MediaSource {
    /// Create a remote source; empty URLs are rejected
    pub fn remote(url: &str) -> Result<Self> {
        if url.trim().is_empty() {
            return Err(BridgeError::source_error("Remote source URL is empty"));
        }
        Ok(MediaSource::Remote(url.to_string()))
    }

    /// Create a local source; empty paths are rejected
    pub fn local<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(BridgeError::source_error("Local source path is empty"));
        }
        Ok(MediaSource::Local(path.to_path_buf()))
    }

    /// URI passed to the platform decoder
    pub fn uri(&self) -> String {
        match self {
            MediaSource::Remote(url) => url.clone(),
            MediaSource::Local(path) => format!("file://{}", path.display()),
        }
    }

    /// Check if this is a remote source
    pub fn is_remote(&self) -> bool {
        matches!(self, MediaSource::Remote(_))
    }
}

impl fmt::Display for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}

/// Factory for decoder sessions, one per platform
pub trait DecoderBackend: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Create a session for `source`
    ///
    /// Synchronous failures (unreachable host, missing file, unsupported
    /// container) are reported here as `SourceError`. The returned session
    /// makes no callbacks until [`DecoderSession::start`].
    fn open(&self, source: &MediaSource) -> Result<Box<dyn DecoderSession>>;
}

/// One open decoder session
///
/// Control methods are called from the control thread only. Frames and
/// metadata flow back through the [`FrameSink`] from whatever thread the
/// platform uses for its callbacks.
pub trait DecoderSession: Send {
    /// Begin asynchronous preparation, reporting into `sink`
    fn start(&mut self, sink: FrameSink) -> Result<()>;

    /// Start or resume frame production
    fn play(&mut self) -> Result<()>;

    /// Stop frame production without closing the session
    fn pause(&mut self) -> Result<()>;

    /// Seek to a position
    fn seek(&mut self, position: Duration) -> Result<()>;

    /// Set playback rate multiplier (always > 0)
    fn set_playback_rate(&mut self, rate: f32) -> Result<()>;

    /// Set volume (0.0 to 1.0)
    fn set_volume(&mut self, volume: f32) -> Result<()>;

    /// Enable or disable looping
    fn set_looping(&mut self, looping: bool) -> Result<()>;

    /// Tear the session down
    ///
    /// Must not return before the platform has stopped invoking sink
    /// callbacks for this session.
    fn close(&mut self);
}
