//! Buffer handle resolution
//!
//! Converts an opaque platform frame into the raw integer the GPU layer
//! imports (an `AHardwareBuffer*` on Android, an `IOSurfaceRef` on Apple
//! platforms). Resolution borrows: no reference count is taken, so the handle
//! is only good while the frame stays published and unreleased, i.e. for the
//! render step it was acquired in.

use crate::decoder::PlatformFrame;
use crate::utils::error::{BridgeError, Result};
use serde::Serialize;
use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;

/// Raw GPU-importable buffer handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[repr(transparent)]
pub struct BufferHandle(u64);

impl BufferHandle {
    /// Sentinel returned when there is nothing to import
    pub const NULL: BufferHandle = BufferHandle(0);

    /// Wrap a raw handle value
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Wrap a native buffer pointer
    pub fn from_ptr(ptr: NonNull<c_void>) -> Self {
        Self(ptr.as_ptr() as usize as u64)
    }

    /// Raw value handed to the GPU import layer
    pub const fn as_raw(self) -> u64 {
        self.0
    }

    /// Check for the zero sentinel
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Resolve a platform frame to its importable buffer handle
///
/// Fails with [`BridgeError::InvalidFrameObject`] for a missing frame, a
/// frame the decoder has already invalidated, or one without a native
/// buffer.
pub fn resolve(frame: Option<&dyn PlatformFrame>) -> Result<BufferHandle> {
    let frame = frame
        .ok_or_else(|| BridgeError::InvalidFrameObject("frame object is null".to_string()))?;

    if !frame.is_valid() {
        return Err(BridgeError::InvalidFrameObject(
            "frame object was released by the decoder".to_string(),
        ));
    }

    frame
        .native_buffer()
        .map(BufferHandle::from_ptr)
        .ok_or_else(|| BridgeError::InvalidFrameObject("frame has no native buffer".to_string()))
}
