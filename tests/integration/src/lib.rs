//! Integration test utilities for hwvideo-bridge
//!
//! This module provides common utilities for integration testing including:
//! - Placeholder media files
//! - A manual decoder backend whose frames tests publish by hand
//! - A mockall decoder backend
//! - Polling helpers
//! - Installing a synthetic process-wide registry for C ABI tests

use anyhow::Result;
use hwvideo_bridge::decoder::{
    DecoderBackend, DecoderSession, FrameSink, MediaSource, SyntheticBackend,
};
use hwvideo_bridge::player::{install_global, PlayerInstance, PlayerRegistry};
use hwvideo_bridge::{BridgeError, PlaybackState};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Test fixture for integration tests
pub struct TestFixture {
    pub temp_dir: TempDir,
    pub media_files: MediaFiles,
}

/// Placeholder media files; decoders under test only check that they exist
pub struct MediaFiles {
    pub clip: PathBuf,
    pub other_clip: PathBuf,
}

impl TestFixture {
    /// Create a new test fixture with generated media files
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let media_files = MediaFiles::generate(&temp_dir)?;

        Ok(Self {
            temp_dir,
            media_files,
        })
    }

    /// Get the path to the temporary directory
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }
}

impl MediaFiles {
    fn generate(dir: &TempDir) -> Result<Self> {
        let clip = dir.path().join("clip.mp4");
        std::fs::write(&clip, b"placeholder_h264_clip")?;

        let other_clip = dir.path().join("other_clip.mp4");
        std::fs::write(&other_clip, b"placeholder_hevc_clip")?;

        Ok(Self { clip, other_clip })
    }
}

/// What a [`ManualBackend`] saw, shared with the test
#[derive(Default)]
pub struct Recorder {
    sink: Mutex<Option<FrameSink>>,
    commands: Mutex<Vec<String>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl Recorder {
    /// Sink of the most recently started session
    pub fn sink(&self) -> Option<FrameSink> {
        self.sink.lock().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    fn record(&self, command: String) -> hwvideo_bridge::Result<()> {
        self.commands.lock().push(command);
        Ok(())
    }
}

/// Decoder backend that never produces anything by itself
///
/// Tests drive it through the [`FrameSink`] exposed by its [`Recorder`].
/// Remote sources fail like an unreachable host.
pub struct ManualBackend {
    recorder: Arc<Recorder>,
}

impl ManualBackend {
    pub fn new() -> (Arc<Self>, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let backend = Arc::new(Self {
            recorder: Arc::clone(&recorder),
        });
        (backend, recorder)
    }
}

impl DecoderBackend for ManualBackend {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn open(&self, source: &MediaSource) -> hwvideo_bridge::Result<Box<dyn DecoderSession>> {
        if source.is_remote() {
            return Err(BridgeError::source_error("network error"));
        }
        self.recorder.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ManualSession {
            recorder: Arc::clone(&self.recorder),
        }))
    }
}

struct ManualSession {
    recorder: Arc<Recorder>,
}

impl DecoderSession for ManualSession {
    fn start(&mut self, sink: FrameSink) -> hwvideo_bridge::Result<()> {
        *self.recorder.sink.lock() = Some(sink);
        Ok(())
    }

    fn play(&mut self) -> hwvideo_bridge::Result<()> {
        self.recorder.record("play".to_string())
    }

    fn pause(&mut self) -> hwvideo_bridge::Result<()> {
        self.recorder.record("pause".to_string())
    }

    fn seek(&mut self, position: Duration) -> hwvideo_bridge::Result<()> {
        self.recorder
            .record(format!("seek {:.3}", position.as_secs_f64()))
    }

    fn set_playback_rate(&mut self, rate: f32) -> hwvideo_bridge::Result<()> {
        self.recorder.record(format!("rate {}", rate))
    }

    fn set_volume(&mut self, volume: f32) -> hwvideo_bridge::Result<()> {
        self.recorder.record(format!("volume {}", volume))
    }

    fn set_looping(&mut self, looping: bool) -> hwvideo_bridge::Result<()> {
        self.recorder.record(format!("looping {}", looping))
    }

    fn close(&mut self) {
        self.recorder.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Mock implementations
pub mod mocks {
    use super::*;
    use mockall::mock;

    mock! {
        pub Backend {}

        impl DecoderBackend for Backend {
            fn name(&self) -> &'static str;
            fn open(&self, source: &MediaSource) -> hwvideo_bridge::Result<Box<dyn DecoderSession>>;
        }
    }
}

static INSTALL_SYNTHETIC: Once = Once::new();

/// Install a registry on the synthetic backend as the process-wide one
///
/// Safe to call from every test; only the first call installs.
pub fn install_synthetic_global() {
    INSTALL_SYNTHETIC.call_once(|| {
        let registry = PlayerRegistry::new(Arc::new(SyntheticBackend::default()));
        if let Err(e) = install_global(registry) {
            panic!("Failed to install synthetic registry: {}", e);
        }
    });
}

/// Poll `player` until it reaches `state` or `timeout` passes
pub async fn wait_for_state(
    player: &PlayerInstance,
    state: PlaybackState,
    timeout: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if player.state() == state {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    player.state() == state
}

/// Performance measurement utilities
pub mod perf_test {
    use std::time::{Duration, Instant};

    pub struct PerfMeasure {
        name: String,
        start: Instant,
        measurements: Vec<Duration>,
    }

    impl PerfMeasure {
        pub fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                start: Instant::now(),
                measurements: Vec::new(),
            }
        }

        pub fn start(&mut self) {
            self.start = Instant::now();
        }

        pub fn stop(&mut self) {
            self.measurements.push(self.start.elapsed());
        }

        pub fn max(&self) -> Option<Duration> {
            self.measurements.iter().max().copied()
        }

        pub fn report(&self) {
            println!("Performance Report: {}", self.name);
            println!("  Samples: {}", self.measurements.len());
            println!("  Max: {:?}", self.max().unwrap_or(Duration::ZERO));
        }
    }
}
