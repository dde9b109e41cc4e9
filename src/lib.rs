//! hwvideo-bridge: zero-copy handoff of hardware-decoded video frames
//!
//! A platform decoder writes frames into GPU-importable buffers; this crate
//! moves references to those frames from the decoder's callback thread to
//! the render thread and hands the renderer a raw [`BufferHandle`] to import
//! as a texture. No pixel data is ever copied.
//!
//! - [`decoder`]: the platform decoder seam and the triple-buffered frame handoff
//! - [`renderer`]: buffer handle resolution
//! - [`player`]: per-player state machine and the player registry
//! - [`ffi`]: C ABI over the process-wide registry
//! - [`utils`]: errors, configuration and helpers

pub mod decoder;
pub mod ffi;
pub mod player;
pub mod renderer;
pub mod utils;

pub use decoder::{DecoderBackend, DecoderSession, FrameSink, MediaSource, PlatformFrame};
pub use player::{PlaybackState, PlayerId, PlayerInfo, PlayerInstance, PlayerRegistry};
pub use renderer::BufferHandle;
pub use utils::error::{BridgeError, ErrorCode, Result};
