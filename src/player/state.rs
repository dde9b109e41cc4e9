//! Playback state shared with decoder callbacks
//!
//! [`SharedPlayback`] is the part of a player that decoder callback threads
//! and the render thread touch. Sizes are packed into single atomics so a
//! reader never sees a width from one update and a height from another.
//! Only the error slot takes a lock, and only on the failure path.

use crate::decoder::FrameSlotPipeline;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

fn pack_size(width: u32, height: u32) -> u64 {
    ((width as u64) << 32) | height as u64
}

fn unpack_size(word: u64) -> (u32, u32) {
    ((word >> 32) as u32, word as u32)
}

/// Atomics and pipeline shared by a player and its decoder session
pub struct SharedPlayback {
    /// Frame handoff to the render thread
    pipeline: FrameSlotPipeline,

    /// Natural video size, packed width:height
    video_size: AtomicU64,

    /// Latched on every video size change
    size_changed: AtomicBool,

    /// Destination texture size, packed width:height
    texture_size: AtomicU64,

    /// Position in seconds, as f64 bits
    position: AtomicU64,

    /// Duration in seconds, as f64 bits (0 = unknown)
    duration: AtomicU64,

    /// Decoder has loaded metadata or produced a frame
    prepared: AtomicBool,

    /// Decoder reached end of media
    ended: AtomicBool,

    /// Asynchronous decoder failure not yet surfaced
    error: Mutex<Option<String>>,

    /// Instance has been released
    released: AtomicBool,
}

impl SharedPlayback {
    /// Create empty shared state
    pub fn new() -> Self {
        Self {
            pipeline: FrameSlotPipeline::new(),
            video_size: AtomicU64::new(0),
            size_changed: AtomicBool::new(false),
            texture_size: AtomicU64::new(0),
            position: AtomicU64::new(0f64.to_bits()),
            duration: AtomicU64::new(0f64.to_bits()),
            prepared: AtomicBool::new(false),
            ended: AtomicBool::new(false),
            error: Mutex::new(None),
            released: AtomicBool::new(false),
        }
    }

    /// Get the frame pipeline
    pub fn pipeline(&self) -> &FrameSlotPipeline {
        &self.pipeline
    }

    /// Record the natural video size
    ///
    /// Zero dimensions are ignored. A different size latches the
    /// size-changed flag.
    pub fn update_video_size(&self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }

        let packed = pack_size(width, height);
        let previous = self.video_size.swap(packed, Ordering::AcqRel);
        if previous != packed {
            self.size_changed.store(true, Ordering::Release);
            log::debug!("Video size changed to {}x{}", width, height);
        }
    }

    /// Natural video size, (0, 0) until known
    pub fn video_size(&self) -> (u32, u32) {
        unpack_size(self.video_size.load(Ordering::Acquire))
    }

    /// Check the latched size-changed flag
    pub fn has_size_changed(&self) -> bool {
        self.size_changed.load(Ordering::Acquire)
    }

    /// Clear the latched size-changed flag
    pub fn clear_size_changed(&self) {
        self.size_changed.store(false, Ordering::Release);
    }

    /// Set the destination texture size
    pub fn set_texture_size(&self, width: u32, height: u32) {
        self.texture_size
            .store(pack_size(width, height), Ordering::Release);
    }

    /// Destination texture size, (0, 0) until set
    pub fn texture_size(&self) -> (u32, u32) {
        unpack_size(self.texture_size.load(Ordering::Acquire))
    }

    /// Record the media duration; re-clamps a position stored before it was known
    pub fn set_duration(&self, seconds: f64) {
        let seconds = if seconds.is_finite() && seconds > 0.0 {
            seconds
        } else {
            0.0
        };
        self.duration.store(seconds.to_bits(), Ordering::Release);

        if seconds > 0.0 && self.position() > seconds {
            self.position.store(seconds.to_bits(), Ordering::Release);
        }
    }

    /// Media duration in seconds, 0 if unknown
    pub fn duration(&self) -> f64 {
        f64::from_bits(self.duration.load(Ordering::Acquire))
    }

    /// Record the playback position, clamped to `[0, duration]`
    ///
    /// Only the lower bound applies while the duration is unknown.
    pub fn set_position(&self, seconds: f64) {
        let mut seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        let duration = self.duration();
        if duration > 0.0 {
            seconds = seconds.min(duration);
        }
        self.position.store(seconds.to_bits(), Ordering::Release);
    }

    /// Playback position in seconds
    pub fn position(&self) -> f64 {
        f64::from_bits(self.position.load(Ordering::Acquire))
    }

    pub fn mark_prepared(&self) {
        self.prepared.store(true, Ordering::Release);
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared.load(Ordering::Acquire)
    }

    pub fn mark_ended(&self) {
        self.ended.store(true, Ordering::Release);
    }

    /// Consume the end-of-media notification
    pub fn take_ended(&self) -> bool {
        self.ended.swap(false, Ordering::AcqRel)
    }

    /// Record an asynchronous failure; the first one wins until taken
    pub fn record_error(&self, message: &str) {
        let mut error = self.error.lock();
        if error.is_none() {
            *error = Some(message.to_string());
        }
    }

    /// Consume the pending failure, if any
    pub fn take_error(&self) -> Option<String> {
        self.error.lock().take()
    }

    /// Forget everything tied to the previous session
    ///
    /// Must only run after that session's sink gate is shut and the session
    /// is closed. The video size is kept so a consumer that never cleared the
    /// size-changed flag still sees the last size.
    pub fn reset_for_new_session(&self) {
        self.pipeline.clear();
        self.position.store(0f64.to_bits(), Ordering::Release);
        self.duration.store(0f64.to_bits(), Ordering::Release);
        self.prepared.store(false, Ordering::Release);
        self.ended.store(false, Ordering::Release);
        self.error.lock().take();
    }

    pub fn mark_released(&self) {
        self.released.store(true, Ordering::Release);
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl Default for SharedPlayback {
    fn default() -> Self {
        Self::new()
    }
}
