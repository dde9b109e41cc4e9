//! Integration tests for hwvideo-bridge players
//!
//! These tests verify the complete player functionality including:
//! - Source failures and recovery
//! - Frame handoff from decoder callbacks to the render thread
//! - Real-time playback on the synthetic decoder
//! - Teardown while frames are in flight
//! - The C ABI over the global registry

use anyhow::Result;
use hwvideo_bridge::decoder::{SyntheticBackend, SyntheticFrame};
use hwvideo_bridge::ffi;
use hwvideo_bridge::player::PlayerRegistry;
use hwvideo_bridge::utils::{Config, SyntheticConfig};
use hwvideo_bridge::{BridgeError, BufferHandle, ErrorCode, PlaybackState};
use hwvideo_bridge_integration_tests::mocks::MockBackend;
use hwvideo_bridge_integration_tests::perf_test::PerfMeasure;
use hwvideo_bridge_integration_tests::{
    install_synthetic_global, wait_for_state, ManualBackend, TestFixture,
};
use serial_test::serial;
use std::collections::HashSet;
use std::ffi::CString;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

fn synthetic_registry(fps: f32, duration_secs: f64) -> PlayerRegistry {
    let config = SyntheticConfig {
        fps,
        duration_secs,
        width: 640,
        height: 360,
        offline: false,
    };
    PlayerRegistry::new(Arc::new(SyntheticBackend::new(config)))
}

#[tokio::test]
async fn test_remote_source_network_failure() -> Result<()> {
    let mut backend = MockBackend::new();
    backend.expect_name().return_const("mock");
    backend
        .expect_open()
        .times(1)
        .returning(|_| Err(BridgeError::source_error("network error")));

    let registry = PlayerRegistry::new(Arc::new(backend));
    let id = registry.create()?;
    let player = registry.player(id)?;

    let result = player.set_source_remote("https://cdn.example/stream.m3u8");
    assert!(matches!(result, Err(BridgeError::SourceError(_))));
    assert_eq!(player.state(), PlaybackState::Idle);
    assert!(!player.has_new_frame());
    assert_eq!(player.acquire_frame_handle(), BufferHandle::NULL);
    assert!(player.last_error().is_some());

    Ok(())
}

#[tokio::test]
async fn test_local_source_interleaved_publish_and_poll() -> Result<()> {
    let fixture = TestFixture::new()?;
    let (backend, recorder) = ManualBackend::new();
    let registry = PlayerRegistry::new(backend);
    let id = registry.create()?;
    let player = registry.player(id)?;

    player.set_source_local(&fixture.media_files.clip)?;
    let sink = recorder.sink().expect("session started");

    // Keep every frame alive so buffer addresses stay distinct
    let frames: Vec<_> = (0..5)
        .map(|i| Arc::new(SyntheticFrame::new(1280, 720, Duration::from_millis(i * 33))))
        .collect();

    let mut handles = Vec::new();
    for (i, frame) in frames.iter().enumerate() {
        assert!(sink.publish_frame(frame.clone()));
        // Render thread polls after the 2nd and 4th publish
        if i == 1 || i == 3 {
            assert!(player.has_new_frame());
            handles.push(player.acquire_frame_handle());
        }
    }

    assert_eq!(handles.len(), 2);
    assert!(handles.iter().all(|handle| !handle.is_null()));
    let distinct: HashSet<_> = handles.iter().copied().collect();
    assert_eq!(distinct.len(), 2);

    // The 5th frame is still waiting
    assert!(player.has_new_frame());
    let stats = player.info().pipeline;
    assert_eq!(stats.published, 5);
    assert_eq!(stats.acquired, 2);
    assert_eq!(stats.superseded, 2);

    Ok(())
}

#[tokio::test]
async fn test_failed_switch_keeps_current_source() -> Result<()> {
    let fixture = TestFixture::new()?;
    let (backend, recorder) = ManualBackend::new();
    let registry = PlayerRegistry::new(backend);
    let player = registry.player(registry.create()?)?;

    player.set_source_local(&fixture.media_files.clip)?;
    let sink = recorder.sink().expect("session started");
    sink.publish_frame(Arc::new(SyntheticFrame::new(320, 240, Duration::ZERO)));
    player.play()?;
    assert!(player.is_playing());

    assert!(player
        .set_source_remote("https://cdn.example/unreachable.mp4")
        .is_err());
    assert!(player.is_playing());
    assert_eq!(recorder.closed(), 0);
    assert!(player.has_new_frame());

    // A working source replaces the old session
    player.set_source_local(&fixture.media_files.other_clip)?;
    assert_eq!(recorder.opened(), 2);
    assert_eq!(recorder.closed(), 1);
    assert!(sink.is_closed());
    assert_eq!(player.state(), PlaybackState::SourceSet);

    Ok(())
}

#[tokio::test]
async fn test_synthetic_playback_to_end() -> Result<()> {
    let fixture = TestFixture::new()?;
    let registry = synthetic_registry(60.0, 0.5);
    let player = registry.player(registry.create()?)?;

    player.set_source_local(&fixture.media_files.clip)?;
    player.play()?;
    assert!(wait_for_state(&player, PlaybackState::Playing, Duration::from_secs(2)).await);
    assert_eq!((player.video_width(), player.video_height()), (640, 360));
    assert!(player.has_size_changed());

    // Simulated 120 Hz render loop
    let mut acquire_perf = PerfMeasure::new("Frame acquire");
    let mut generations = HashSet::new();
    let mut ticker = tokio::time::interval(Duration::from_millis(8));
    for _ in 0..40 {
        ticker.tick().await;
        if player.has_new_frame() {
            acquire_perf.start();
            let frame = player.acquire_frame();
            acquire_perf.stop();
            if let Some(frame) = frame {
                assert!(!frame.handle.is_null());
                assert!(generations.insert(frame.generation), "frame seen twice");
            }
        }
    }
    acquire_perf.report();
    assert!(!generations.is_empty());

    assert!(wait_for_state(&player, PlaybackState::Paused, Duration::from_secs(3)).await);
    assert!((player.position() - player.duration()).abs() < 1e-9);
    assert!((player.duration() - 0.5).abs() < 1e-9);

    Ok(())
}

#[tokio::test]
async fn test_synthetic_seek_and_stop() -> Result<()> {
    let fixture = TestFixture::new()?;
    let registry = synthetic_registry(30.0, 10.0);
    let player = registry.player(registry.create()?)?;

    player.set_source_local(&fixture.media_files.clip)?;
    assert!(wait_for_state(&player, PlaybackState::Ready, Duration::from_secs(2)).await);
    assert_eq!(player.duration(), 10.0);

    player.set_position(25.0)?;
    assert_eq!(player.position(), 10.0);
    player.set_position(4.0)?;
    // Let the decoder thread work through both seeks
    sleep(Duration::from_millis(100)).await;
    assert_eq!(player.position(), 4.0);

    player.stop()?;
    assert_eq!(player.state(), PlaybackState::Stopped);
    assert_eq!(player.position(), 0.0);
    assert!(matches!(player.play(), Err(BridgeError::NoSource)));

    Ok(())
}

#[tokio::test]
async fn test_release_while_decoding() -> Result<()> {
    let fixture = TestFixture::new()?;
    let registry = synthetic_registry(240.0, 60.0);
    let id = registry.create()?;
    let player = registry.player(id)?;

    player.set_source_local(&fixture.media_files.clip)?;
    player.play()?;
    assert!(wait_for_state(&player, PlaybackState::Playing, Duration::from_secs(2)).await);
    sleep(Duration::from_millis(50)).await;

    registry.release(id)?;
    assert_eq!(player.state(), PlaybackState::Released);
    assert!(!player.has_new_frame());
    assert!(player.in_use_handle().is_null());

    // Nothing arrives after release returned
    let published = player.info().pipeline.published;
    sleep(Duration::from_millis(50)).await;
    assert_eq!(player.info().pipeline.published, published);
    assert!(matches!(
        registry.player(id),
        Err(BridgeError::UnknownPlayer(_))
    ));

    Ok(())
}

#[tokio::test]
async fn test_concurrent_producer_and_teardown() -> Result<()> {
    let fixture = TestFixture::new()?;
    let (backend, recorder) = ManualBackend::new();
    let registry = Arc::new(PlayerRegistry::new(backend));
    let id = registry.create()?;
    let player = registry.player(id)?;
    player.set_source_local(&fixture.media_files.clip)?;
    let sink = recorder.sink().expect("session started");

    let producer = std::thread::spawn(move || {
        let mut accepted = 0u64;
        for i in 0..100_000u64 {
            let frame = Arc::new(SyntheticFrame::new(64, 64, Duration::from_micros(i)));
            if !sink.publish_frame(frame) {
                break;
            }
            accepted += 1;
        }
        (accepted, sink)
    });

    let mut last_generation = 0;
    for _ in 0..1_000 {
        if let Some(frame) = player.acquire_frame() {
            assert!(frame.generation > last_generation);
            last_generation = frame.generation;
        }
    }
    registry.release(id)?;

    let (accepted, sink) = producer.join().expect("producer panicked");
    assert!(sink.is_closed());
    assert!(!sink.publish_frame(Arc::new(SyntheticFrame::new(64, 64, Duration::ZERO))));
    assert!(accepted > 0);
    assert!(!player.has_new_frame());

    Ok(())
}

#[tokio::test]
async fn test_offline_remote_source() -> Result<()> {
    let mut config = Config::default();
    config.synthetic.offline = true;
    let backend = Arc::new(SyntheticBackend::new(config.synthetic.clone()));
    let registry = PlayerRegistry::with_config(backend, &config);
    let player = registry.player(registry.create()?)?;

    assert!(matches!(
        player.set_source_remote("https://cdn.example/video.mp4"),
        Err(BridgeError::SourceError(_))
    ));
    assert_eq!(player.state(), PlaybackState::Idle);
    assert!(matches!(player.play(), Err(BridgeError::NoSource)));

    Ok(())
}

#[tokio::test]
#[serial]
async fn test_ffi_background_pause_and_resume() -> Result<()> {
    install_synthetic_global();
    let fixture = TestFixture::new()?;
    let path = CString::new(fixture.media_files.clip.to_string_lossy().as_bytes())?;

    let mut playing = 0u32;
    let mut idle = 0u32;
    assert_eq!(unsafe { ffi::hwvb_player_create(&mut playing) }, 0);
    assert_eq!(unsafe { ffi::hwvb_player_create(&mut idle) }, 0);
    assert!(idle > playing);

    assert_eq!(
        unsafe { ffi::hwvb_player_set_source_local(playing, path.as_ptr()) },
        0
    );
    assert_eq!(ffi::hwvb_player_play(playing), 0);

    let mut started = false;
    for _ in 0..200 {
        if ffi::hwvb_player_is_playing(playing) {
            started = true;
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert!(started, "player never started");

    assert_eq!(ffi::hwvb_pause_all(), 0);
    assert_eq!(
        ffi::hwvb_player_state(playing),
        PlaybackState::Paused.as_raw()
    );
    assert_eq!(ffi::hwvb_player_state(idle), PlaybackState::Idle.as_raw());

    assert_eq!(ffi::hwvb_resume_all(), 0);
    assert!(ffi::hwvb_player_is_playing(playing));

    assert_eq!(ffi::hwvb_player_release(playing), 0);
    assert_eq!(ffi::hwvb_player_release(idle), 0);
    assert_eq!(
        ffi::hwvb_player_play(playing),
        ErrorCode::UnknownPlayer.as_raw()
    );

    Ok(())
}

#[tokio::test]
#[serial]
async fn test_ffi_frame_handoff() -> Result<()> {
    install_synthetic_global();
    let fixture = TestFixture::new()?;
    let path = CString::new(fixture.media_files.clip.to_string_lossy().as_bytes())?;

    let mut id = 0u32;
    assert_eq!(unsafe { ffi::hwvb_player_create(&mut id) }, 0);
    assert_eq!(
        unsafe { ffi::hwvb_player_set_source_local(id, path.as_ptr()) },
        0
    );

    // The synthetic decoder publishes a poster frame once prepared
    let mut handle = 0u64;
    for _ in 0..200 {
        if ffi::hwvb_player_has_new_frame(id) {
            handle = ffi::hwvb_player_acquire_frame_handle(id);
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert_ne!(handle, 0);
    assert_eq!(ffi::hwvb_player_in_use_handle(id), handle);
    assert!(ffi::hwvb_player_has_size_changed(id));
    assert!(ffi::hwvb_player_video_width(id) > 0);
    assert_eq!(ffi::hwvb_player_clear_size_changed_flag(id), 0);
    assert!(!ffi::hwvb_player_has_size_changed(id));

    assert_eq!(ffi::hwvb_player_release(id), 0);
    assert_eq!(ffi::hwvb_player_acquire_frame_handle(id), 0);

    Ok(())
}
