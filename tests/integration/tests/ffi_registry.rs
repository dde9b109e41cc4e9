//! C ABI behavior before and after the process-wide registry is installed
//!
//! Lives in its own test binary so no other test has installed a registry
//! first.

use hwvideo_bridge::decoder::SyntheticBackend;
use hwvideo_bridge::ffi;
use hwvideo_bridge::player::{global, install_global, installed, PlayerRegistry};
use hwvideo_bridge::{BridgeError, ErrorCode, PlaybackState};
use std::sync::Arc;

#[test]
fn test_entry_points_require_installed_registry() {
    assert!(global().is_none());
    assert!(matches!(installed(), Err(BridgeError::NotInitialized)));

    let mut id = 0u32;
    assert_eq!(
        unsafe { ffi::hwvb_player_create(&mut id) },
        ErrorCode::NotInitialized.as_raw()
    );
    assert_eq!(id, 0);
    assert_eq!(ffi::hwvb_pause_all(), ErrorCode::NotInitialized.as_raw());
    assert_eq!(ffi::hwvb_player_play(1), ErrorCode::NotInitialized.as_raw());
    assert_eq!(ffi::hwvb_player_state(1), PlaybackState::Released.as_raw());
    assert!(!ffi::hwvb_player_has_new_frame(1));
    assert_eq!(ffi::hwvb_player_acquire_frame_handle(1), 0);

    let registry = PlayerRegistry::new(Arc::new(SyntheticBackend::default()));
    let installed_registry = install_global(registry).expect("first install succeeds");
    assert!(installed_registry.is_empty());

    assert_eq!(unsafe { ffi::hwvb_player_create(&mut id) }, 0);
    assert_eq!(id, 1);
    assert!(installed_registry.contains(hwvideo_bridge::PlayerId::from_raw(id)));
    assert_eq!(ffi::hwvb_player_state(id), PlaybackState::Idle.as_raw());

    let again = PlayerRegistry::new(Arc::new(SyntheticBackend::default()));
    assert!(install_global(again).is_err());

    assert_eq!(ffi::hwvb_player_release(id), 0);
    assert!(installed_registry.is_empty());
}
