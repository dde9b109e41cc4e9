//! C ABI for binding layers
//!
//! Provides `#[no_mangle] extern "C"` entry points over the process-wide
//! [`PlayerRegistry`](crate::player::PlayerRegistry). Players are addressed
//! by their integer id, so a stale id is an `UnknownPlayer` error rather than
//! a dangling pointer.
//!
//! The host's Rust side installs the registry, with its platform decoder
//! backend, through [`install_global`](crate::player::install_global) before
//! any entry point is called. Until then fallible calls return
//! `NotInitialized` and queries return their empty value.
//!
//! Conventions:
//! - Fallible calls return an [`ErrorCode`] as `i32` (0 = success).
//! - Render-thread queries return plain values: `bool`, a `u64` buffer
//!   handle (0 = none) or `f64` seconds (0 when unknown).
//! - Every entry point catches panics; none unwinds into the caller.

use crate::player::{installed, PlaybackState, PlayerId, PlayerInstance};
use crate::renderer::BufferHandle;
use crate::utils::error::{BridgeError, ErrorCode, Result};
use std::ffi::{c_char, CStr, CString};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Run an entry point body, converting its result and any panic to an error code
fn ffi_boundary<F>(f: F) -> i32
where
    F: FnOnce() -> Result<()>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => ErrorCode::from(&result).as_raw(),
        Err(_panic) => {
            log::error!("FFI: caught panic at FFI boundary");
            ErrorCode::Internal.as_raw()
        }
    }
}

/// Run a non-Result entry point body, returning `default` on panic
fn ffi_boundary_or<T, F>(default: T, f: F) -> T
where
    F: FnOnce() -> T,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(_panic) => {
            log::error!("FFI: caught panic at FFI boundary");
            default
        }
    }
}

fn player(id: u32) -> Result<Arc<PlayerInstance>> {
    installed()?.player(PlayerId::from_raw(id))
}

/// Borrow a C string as UTF-8
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string that outlives `'a`.
unsafe fn c_str<'a>(ptr: *const c_char) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(BridgeError::invalid_argument("null string pointer"));
    }
    // SAFETY: non-null and NUL-terminated per the caller contract
    let s = unsafe { CStr::from_ptr(ptr) }.to_str()?;
    Ok(s)
}

// =========================================================================
// Lifecycle
// =========================================================================

/// Create a player in the idle state.
///
/// # Safety
/// `out_id` must be a valid, writable pointer to a `u32`.
#[no_mangle]
pub unsafe extern "C" fn hwvb_player_create(out_id: *mut u32) -> i32 {
    ffi_boundary(|| {
        if out_id.is_null() {
            return Err(BridgeError::invalid_argument("out_id is null"));
        }
        let id = installed()?.create()?;
        // SAFETY: checked non-null above; writability is the caller's contract
        unsafe {
            *out_id = id.as_raw();
        }
        Ok(())
    })
}

/// Release a player. Releasing an unknown id succeeds.
#[no_mangle]
pub extern "C" fn hwvb_player_release(id: u32) -> i32 {
    ffi_boundary(|| installed()?.release(PlayerId::from_raw(id)))
}

/// Set a remote URL as the player's source.
///
/// # Safety
/// `url` must be a valid NUL-terminated UTF-8 C string.
#[no_mangle]
pub unsafe extern "C" fn hwvb_player_set_source_remote(id: u32, url: *const c_char) -> i32 {
    ffi_boundary(|| {
        let player = player(id)?;
        // SAFETY: forwarded caller contract
        let url = unsafe { c_str(url) }?;
        player.set_source_remote(url)
    })
}

/// Set a local file as the player's source.
///
/// # Safety
/// `path` must be a valid NUL-terminated UTF-8 C string.
#[no_mangle]
pub unsafe extern "C" fn hwvb_player_set_source_local(id: u32, path: *const c_char) -> i32 {
    ffi_boundary(|| {
        let player = player(id)?;
        // SAFETY: forwarded caller contract
        let path = unsafe { c_str(path) }?;
        player.set_source_local(path)
    })
}

// =========================================================================
// Playback control
// =========================================================================

#[no_mangle]
pub extern "C" fn hwvb_player_play(id: u32) -> i32 {
    ffi_boundary(|| player(id)?.play())
}

#[no_mangle]
pub extern "C" fn hwvb_player_pause(id: u32) -> i32 {
    ffi_boundary(|| player(id)?.pause())
}

#[no_mangle]
pub extern "C" fn hwvb_player_stop(id: u32) -> i32 {
    ffi_boundary(|| player(id)?.stop())
}

/// Seek to a position in seconds.
#[no_mangle]
pub extern "C" fn hwvb_player_set_position(id: u32, seconds: f64) -> i32 {
    ffi_boundary(|| player(id)?.set_position(seconds))
}

/// Current position in seconds, 0 when unknown or on error.
#[no_mangle]
pub extern "C" fn hwvb_player_position(id: u32) -> f64 {
    ffi_boundary_or(0.0, || player(id).map(|p| p.position()).unwrap_or(0.0))
}

/// Media duration in seconds, 0 when unknown or on error.
#[no_mangle]
pub extern "C" fn hwvb_player_duration(id: u32) -> f64 {
    ffi_boundary_or(0.0, || player(id).map(|p| p.duration()).unwrap_or(0.0))
}

#[no_mangle]
pub extern "C" fn hwvb_player_set_playback_rate(id: u32, rate: f32) -> i32 {
    ffi_boundary(|| player(id)?.set_playback_rate(rate))
}

#[no_mangle]
pub extern "C" fn hwvb_player_set_volume(id: u32, volume: f32) -> i32 {
    ffi_boundary(|| player(id)?.set_volume(volume))
}

#[no_mangle]
pub extern "C" fn hwvb_player_set_looping(id: u32, looping: bool) -> i32 {
    ffi_boundary(|| player(id)?.set_looping(looping))
}

/// Player state as a [`PlaybackState`] discriminant; unknown ids report `Released`.
#[no_mangle]
pub extern "C" fn hwvb_player_state(id: u32) -> i32 {
    let released = PlaybackState::Released.as_raw();
    ffi_boundary_or(released, || {
        player(id).map(|p| p.state().as_raw()).unwrap_or(released)
    })
}

#[no_mangle]
pub extern "C" fn hwvb_player_is_playing(id: u32) -> bool {
    ffi_boundary_or(false, || player(id).map(|p| p.is_playing()).unwrap_or(false))
}

/// Pause every playing player (host app moved to the background).
#[no_mangle]
pub extern "C" fn hwvb_pause_all() -> i32 {
    ffi_boundary(|| installed()?.pause_all().map(|_| ()))
}

/// Resume the players paused by [`hwvb_pause_all`].
#[no_mangle]
pub extern "C" fn hwvb_resume_all() -> i32 {
    ffi_boundary(|| installed()?.resume_all().map(|_| ()))
}

// =========================================================================
// Render thread
// =========================================================================

/// Set the destination texture size.
#[no_mangle]
pub extern "C" fn hwvb_player_set_texture_size(id: u32, width: u32, height: u32) -> i32 {
    ffi_boundary(|| player(id)?.set_texture_size(width, height))
}

#[no_mangle]
pub extern "C" fn hwvb_player_has_new_frame(id: u32) -> bool {
    ffi_boundary_or(false, || {
        player(id).map(|p| p.has_new_frame()).unwrap_or(false)
    })
}

/// Acquire the latest frame's buffer handle, 0 when there is nothing new.
///
/// The handle may only be used during the current render step.
#[no_mangle]
pub extern "C" fn hwvb_player_acquire_frame_handle(id: u32) -> u64 {
    ffi_boundary_or(0, || {
        player(id)
            .map(|p| p.acquire_frame_handle())
            .unwrap_or(BufferHandle::NULL)
            .as_raw()
    })
}

/// Handle of the frame acquired last, 0 if none.
#[no_mangle]
pub extern "C" fn hwvb_player_in_use_handle(id: u32) -> u64 {
    ffi_boundary_or(0, || {
        player(id)
            .map(|p| p.in_use_handle())
            .unwrap_or(BufferHandle::NULL)
            .as_raw()
    })
}

#[no_mangle]
pub extern "C" fn hwvb_player_has_size_changed(id: u32) -> bool {
    ffi_boundary_or(false, || {
        player(id).map(|p| p.has_size_changed()).unwrap_or(false)
    })
}

#[no_mangle]
pub extern "C" fn hwvb_player_clear_size_changed_flag(id: u32) -> i32 {
    ffi_boundary(|| {
        player(id)?.clear_size_changed_flag();
        Ok(())
    })
}

#[no_mangle]
pub extern "C" fn hwvb_player_video_width(id: u32) -> u32 {
    ffi_boundary_or(0, || player(id).map(|p| p.video_width()).unwrap_or(0))
}

#[no_mangle]
pub extern "C" fn hwvb_player_video_height(id: u32) -> u32 {
    ffi_boundary_or(0, || player(id).map(|p| p.video_height()).unwrap_or(0))
}

#[no_mangle]
pub extern "C" fn hwvb_player_texture_width(id: u32) -> u32 {
    ffi_boundary_or(0, || player(id).map(|p| p.texture_width()).unwrap_or(0))
}

#[no_mangle]
pub extern "C" fn hwvb_player_texture_height(id: u32) -> u32 {
    ffi_boundary_or(0, || player(id).map(|p| p.texture_height()).unwrap_or(0))
}

// =========================================================================
// Diagnostics
// =========================================================================

/// Player snapshot as a JSON string, or null for an unknown id.
///
/// Free the result with [`hwvb_string_free`].
#[no_mangle]
pub extern "C" fn hwvb_player_info_json(id: u32) -> *mut c_char {
    ffi_boundary_or(std::ptr::null_mut(), || {
        let Ok(player) = player(id) else {
            return std::ptr::null_mut();
        };
        match CString::new(player.info().to_json()) {
            Ok(json) => json.into_raw(),
            Err(_) => std::ptr::null_mut(),
        }
    })
}

/// Free a string returned by this library.
///
/// # Safety
/// `s` must be null or a pointer returned by [`hwvb_player_info_json`]
/// that has not been freed yet.
#[no_mangle]
pub unsafe extern "C" fn hwvb_string_free(s: *mut c_char) {
    if s.is_null() {
        return;
    }
    // SAFETY: allocated by CString::into_raw per the caller contract
    drop(unsafe { CString::from_raw(s) });
}
