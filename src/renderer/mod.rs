//! Renderer-facing surface for hwvideo-bridge
//!
//! The render thread never sees platform frame objects, only the raw
//! [`BufferHandle`] it imports as a texture for the current render step.

mod handle;

pub use handle::{resolve, BufferHandle};
