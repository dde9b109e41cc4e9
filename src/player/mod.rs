//! Player module for hwvideo-bridge
//!
//! This module owns everything keyed by a [`PlayerId`]: the per-player state
//! machine ([`PlayerInstance`]), the atomics shared with decoder callbacks
//! ([`SharedPlayback`]) and the process-wide [`PlayerRegistry`].

mod instance;
mod registry;
mod state;

pub use instance::PlayerInstance;
pub use registry::{global, install_global, installed, PlayerRegistry};
pub use state::SharedPlayback;

use crate::decoder::PipelineStats;
use crate::utils::{format_duration, secs_to_duration};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a live player
///
/// Assigned by the registry from a counter starting at 1; never reused
/// within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(u32);

impl PlayerId {
    /// Wrap a raw id received across the binding boundary
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw id value
    pub const fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Playback state
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaybackState {
    /// No source, no session
    Idle = 0,

    /// Source accepted, decoder preparing
    SourceSet = 1,

    /// Decoder prepared, not yet playing
    Ready = 2,

    /// Currently playing
    Playing = 3,

    /// Playback paused
    Paused = 4,

    /// Session torn down, reusable with a new source
    Stopped = 5,

    /// Terminal; the instance is gone
    Released = 6,
}

impl PlaybackState {
    /// Raw value for the C ABI
    pub fn as_raw(self) -> i32 {
        self as i32
    }

    /// Check whether a decoder session exists in this state
    pub fn has_session(self) -> bool {
        matches!(
            self,
            PlaybackState::SourceSet
                | PlaybackState::Ready
                | PlaybackState::Playing
                | PlaybackState::Paused
        )
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackState::Idle => "idle",
            PlaybackState::SourceSet => "source-set",
            PlaybackState::Ready => "ready",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Stopped => "stopped",
            PlaybackState::Released => "released",
        };
        f.write_str(name)
    }
}

/// Snapshot of one player for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerInfo {
    pub id: PlayerId,
    pub state: PlaybackState,
    pub source: Option<String>,
    pub video_width: u32,
    pub video_height: u32,
    pub texture_width: u32,
    pub texture_height: u32,
    pub position: f64,
    pub duration: f64,
    pub volume: f32,
    pub looping: bool,
    pub playback_rate: f32,
    pub last_error: Option<String>,
    pub pipeline: PipelineStats,
}

impl PlayerInfo {
    /// Serialize the snapshot as JSON
    pub fn to_json(&self) -> String {
        // Every field is a plain value, so serialization cannot fail
        serde_json::to_string(self).unwrap_or_else(|e| {
            log::error!("Failed to serialize player info: {}", e);
            String::from("{}")
        })
    }
}

impl fmt::Display for PlayerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "player {} [{}] video {}x{} texture {}x{} at {}/{}",
            self.id,
            self.state,
            self.video_width,
            self.video_height,
            self.texture_width,
            self.texture_height,
            format_duration(secs_to_duration(self.position)),
            format_duration(secs_to_duration(self.duration))
        )
    }
}
