//! Synthetic test-pattern decoder
//!
//! A threaded stand-in for a platform hardware decoder. Each session runs a
//! decode thread that reports metadata, then produces heap-backed frames at
//! the configured rate while playing. Control commands arrive over a
//! crossbeam channel; closing the session joins the thread, so no callback
//! can outlive `close`.

use crate::decoder::{DecoderBackend, DecoderSession, FrameSink, MediaSource, PlatformFrame};
use crate::internal_error;
use crate::utils::config::SyntheticConfig;
use crate::utils::error::{BridgeError, IntoBridgeError, Result};
use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use log::{debug, info, warn};
use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Size of the stand-in buffer behind each synthetic frame
const FRAME_BUFFER_BYTES: usize = 256;

/// Frame backed by a small heap allocation in place of a GPU buffer
pub struct SyntheticFrame {
    buffer: Box<[u8]>,
    width: u32,
    height: u32,
    timestamp: Duration,
    valid: AtomicBool,
}

impl SyntheticFrame {
    /// Create a frame whose buffer is filled with a pattern derived from `timestamp`
    pub fn new(width: u32, height: u32, timestamp: Duration) -> Self {
        let fill = (timestamp.as_millis() % 251) as u8;
        Self {
            buffer: vec![fill; FRAME_BUFFER_BYTES].into_boxed_slice(),
            width,
            height,
            timestamp,
            valid: AtomicBool::new(true),
        }
    }

    /// Mark the frame as released by its decoder
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }
}

impl PlatformFrame for SyntheticFrame {
    fn native_buffer(&self) -> Option<NonNull<c_void>> {
        if !self.is_valid() {
            return None;
        }
        NonNull::new(self.buffer.as_ptr() as *mut c_void)
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn timestamp(&self) -> Duration {
        self.timestamp
    }
}

/// Backend creating synthetic decoder sessions
#[derive(Debug, Clone, Default)]
pub struct SyntheticBackend {
    config: SyntheticConfig,
}

impl SyntheticBackend {
    /// Create a backend with the given configuration
    pub fn new(config: SyntheticConfig) -> Self {
        Self { config }
    }

    /// Get the backend configuration
    pub fn config(&self) -> &SyntheticConfig {
        &self.config
    }
}

impl DecoderBackend for SyntheticBackend {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn open(&self, source: &MediaSource) -> Result<Box<dyn DecoderSession>> {
        match source {
            MediaSource::Remote(url) => {
                if self.config.offline {
                    return Err(BridgeError::source_error(format!(
                        "Network unreachable while opening {}",
                        url
                    )));
                }
                if !url.contains("://") {
                    return Err(BridgeError::source_error(format!(
                        "Not a URL: {}",
                        url
                    )));
                }
            }
            MediaSource::Local(path) => {
                let metadata = std::fs::metadata(path)
                    .source_err(&format!("Cannot open {}", path.display()))?;
                if !metadata.is_file() {
                    return Err(BridgeError::source_error(format!(
                        "Not a regular file: {}",
                        path.display()
                    )));
                }
            }
        }

        debug!("Opened synthetic session for {}", source);
        Ok(Box::new(SyntheticSession {
            source: source.clone(),
            config: self.config.clone(),
            commands: None,
            thread: None,
        }))
    }
}

/// Commands sent to the decode thread
#[derive(Debug, Clone, Copy)]
enum DecodeCommand {
    Play,
    Pause,
    Seek(Duration),
    SetRate(f32),
    SetLooping(bool),
    Shutdown,
}

/// Synthetic decoder session
pub struct SyntheticSession {
    source: MediaSource,
    config: SyntheticConfig,
    commands: Option<Sender<DecodeCommand>>,
    thread: Option<JoinHandle<()>>,
}

impl SyntheticSession {
    fn send(&self, command: DecodeCommand) -> Result<()> {
        match &self.commands {
            Some(tx) => tx
                .send(command)
                .map_err(|_| internal_error!("synthetic decode thread has exited")),
            None => Err(BridgeError::NoSource),
        }
    }
}

impl DecoderSession for SyntheticSession {
    fn start(&mut self, sink: FrameSink) -> Result<()> {
        if self.thread.is_some() {
            return Err(internal_error!("synthetic session already started"));
        }

        let (tx, rx) = unbounded();
        let worker = DecodeLoop::new(self.config.clone(), sink);
        let thread = thread::Builder::new()
            .name("synthetic-decoder".to_string())
            .spawn(move || worker.run(rx))
            .map_err(|e| internal_error!("failed to spawn decode thread: {}", e))?;

        info!("Synthetic decoder started for {}", self.source);
        self.commands = Some(tx);
        self.thread = Some(thread);
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        self.send(DecodeCommand::Play)
    }

    fn pause(&mut self) -> Result<()> {
        self.send(DecodeCommand::Pause)
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        self.send(DecodeCommand::Seek(position))
    }

    fn set_playback_rate(&mut self, rate: f32) -> Result<()> {
        self.send(DecodeCommand::SetRate(rate))
    }

    fn set_volume(&mut self, _volume: f32) -> Result<()> {
        // No audio track
        Ok(())
    }

    fn set_looping(&mut self, looping: bool) -> Result<()> {
        self.send(DecodeCommand::SetLooping(looping))
    }

    fn close(&mut self) {
        if let Some(tx) = self.commands.take() {
            let _ = tx.send(DecodeCommand::Shutdown);
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Synthetic decode thread for {} panicked", self.source);
            }
        }
    }
}

impl Drop for SyntheticSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// State owned by the decode thread
struct DecodeLoop {
    config: SyntheticConfig,
    sink: FrameSink,
    playing: bool,
    looping: bool,
    rate: f32,
    position: Duration,
    duration: Duration,
}

impl DecodeLoop {
    fn new(config: SyntheticConfig, sink: FrameSink) -> Self {
        let duration = crate::utils::secs_to_duration(config.duration_secs);
        Self {
            config,
            sink,
            playing: false,
            looping: false,
            rate: 1.0,
            position: Duration::ZERO,
            duration,
        }
    }

    /// Wall-clock time between frames; the rate only scales the media step
    fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.config.fps as f64)
    }

    fn run(mut self, commands: crossbeam_channel::Receiver<DecodeCommand>) {
        self.sink.report_duration(self.duration.as_secs_f64());
        self.sink
            .report_video_size(self.config.width, self.config.height);
        self.sink.report_prepared();
        // Poster frame, like a platform decoder rendering the first frame on prepare
        self.emit_frame();

        loop {
            let timeout = if self.playing {
                self.frame_interval()
            } else {
                Duration::from_millis(250)
            };

            match commands.recv_timeout(timeout) {
                Ok(DecodeCommand::Play) => self.playing = true,
                Ok(DecodeCommand::Pause) => self.playing = false,
                Ok(DecodeCommand::Seek(position)) => {
                    self.position = position.min(self.duration);
                    self.sink.report_position(self.position.as_secs_f64());
                    self.emit_frame();
                }
                Ok(DecodeCommand::SetRate(rate)) => self.rate = rate,
                Ok(DecodeCommand::SetLooping(looping)) => self.looping = looping,
                Ok(DecodeCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    if self.playing {
                        self.advance();
                    }
                }
            }

            if self.sink.is_closed() {
                break;
            }
        }

        debug!("Synthetic decode loop exited");
    }

    fn advance(&mut self) {
        self.position += self.frame_interval().mul_f32(self.rate);

        if self.duration > Duration::ZERO && self.position >= self.duration {
            if self.looping {
                self.position = Duration::ZERO;
            } else {
                self.position = self.duration;
                self.playing = false;
                self.sink.report_position(self.position.as_secs_f64());
                self.sink.report_ended();
                return;
            }
        }

        self.sink.report_position(self.position.as_secs_f64());
        self.emit_frame();
    }

    fn emit_frame(&self) {
        let frame = SyntheticFrame::new(self.config.width, self.config.height, self.position);
        self.sink.publish_frame(Arc::new(frame));
    }
}
