//! Per-player state machine
//!
//! A [`PlayerInstance`] owns at most one decoder session and the shared
//! playback state its callbacks write into. Control calls are serialized by
//! one mutex; render-thread calls (`has_new_frame`, `acquire_frame_handle`,
//! size queries) only touch atomics and the consumer side of the pipeline.
//!
//! Asynchronous decoder events (prepared, end of media, errors) are picked
//! up lazily: every control call and state/position query first folds them
//! into the state machine.

use crate::decoder::{
    AcquiredFrame, DecoderBackend, DecoderSession, FrameSink, MediaSource, SinkGate,
};
use crate::player::{PlaybackState, PlayerId, PlayerInfo, SharedPlayback};
use crate::renderer::BufferHandle;
use crate::utils::config::PlayerDefaults;
use crate::utils::error::{BridgeError, Result};
use crate::utils::secs_to_duration;
use log::{debug, info, warn};
use parking_lot::{Mutex, MutexGuard};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Open decoder session together with the gate its callbacks pass through
struct ActiveSession {
    session: Box<dyn DecoderSession>,
    gate: Arc<SinkGate>,
}

/// Control-thread state, guarded by the instance mutex
struct Control {
    state: PlaybackState,
    source: Option<MediaSource>,
    session: Option<ActiveSession>,

    /// `play` was called before the session became ready
    play_when_ready: bool,

    volume: f32,
    looping: bool,
    playback_rate: f32,
    last_error: Option<String>,
}

/// One video player
pub struct PlayerInstance {
    id: PlayerId,
    backend: Arc<dyn DecoderBackend>,
    shared: Arc<SharedPlayback>,
    control: Mutex<Control>,
    drain_warn: Duration,
}

impl PlayerInstance {
    pub(crate) fn new(
        id: PlayerId,
        backend: Arc<dyn DecoderBackend>,
        defaults: &PlayerDefaults,
        drain_warn: Duration,
    ) -> Self {
        let shared = Arc::new(SharedPlayback::new());
        if defaults.texture_width > 0 && defaults.texture_height > 0 {
            shared.set_texture_size(defaults.texture_width, defaults.texture_height);
        }

        Self {
            id,
            backend,
            shared,
            control: Mutex::new(Control {
                state: PlaybackState::Idle,
                source: None,
                session: None,
                play_when_ready: false,
                volume: defaults.volume.clamp(0.0, 1.0),
                looping: defaults.looping,
                playback_rate: defaults.playback_rate,
                last_error: None,
            }),
            drain_warn,
        }
    }

    /// Player id
    pub fn id(&self) -> PlayerId {
        self.id
    }

    /// Set a remote URL as the source
    pub fn set_source_remote(&self, url: &str) -> Result<()> {
        match MediaSource::remote(url) {
            Ok(source) => self.set_source(source),
            Err(e) => self.reject_source(e),
        }
    }

    /// Set a local file as the source
    pub fn set_source_local<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        match MediaSource::local(path) {
            Ok(source) => self.set_source(source),
            Err(e) => self.reject_source(e),
        }
    }

    /// Open `source` and replace the current session with it
    ///
    /// The new session is opened before the old one is touched, so a failed
    /// open leaves the player exactly as it was.
    pub fn set_source(&self, source: MediaSource) -> Result<()> {
        let mut control = self.lock_live()?;
        self.sync_with_decoder(&mut control);

        let mut session = match self.backend.open(&source) {
            Ok(session) => session,
            Err(e) => {
                warn!("Player {}: failed to open {}: {}", self.id, source, e);
                control.last_error = Some(e.to_string());
                return Err(e);
            }
        };

        if control.session.is_some() {
            debug!("Player {}: replacing session with {}", self.id, source);
        }
        self.teardown(&mut control);

        let gate = Arc::new(SinkGate::new());
        let sink = FrameSink::new(Arc::clone(&self.shared), Arc::clone(&gate));
        if let Err(e) = session.start(sink) {
            warn!("Player {}: failed to start decoder: {}", self.id, e);
            gate.shutdown(self.drain_warn);
            session.close();
            self.shared.reset_for_new_session();
            control.state = PlaybackState::Idle;
            control.source = None;
            control.last_error = Some(e.to_string());
            return Err(e);
        }

        Self::apply_settings(session.as_mut(), &control);

        info!(
            "Player {}: source set to {} ({} decoder)",
            self.id,
            source,
            self.backend.name()
        );
        control.session = Some(ActiveSession { session, gate });
        control.source = Some(source);
        control.state = PlaybackState::SourceSet;
        control.play_when_ready = false;
        control.last_error = None;
        Ok(())
    }

    /// Start or resume playback
    ///
    /// Before the session is ready, playback is armed and starts as soon as
    /// it is.
    pub fn play(&self) -> Result<()> {
        let mut control = self.lock_live()?;
        self.sync_with_decoder(&mut control);

        let state = control.state;
        match state {
            PlaybackState::Idle | PlaybackState::Stopped => Err(BridgeError::NoSource),
            PlaybackState::Playing => Ok(()),
            PlaybackState::SourceSet => {
                debug!("Player {}: play armed until ready", self.id);
                control.play_when_ready = true;
                Ok(())
            }
            PlaybackState::Ready | PlaybackState::Paused => self.start_playback(&mut control),
            PlaybackState::Released => Err(BridgeError::UnknownPlayer(self.id)),
        }
    }

    /// Pause playback; a no-op unless playing
    pub fn pause(&self) -> Result<()> {
        let mut control = self.lock_live()?;
        self.sync_with_decoder(&mut control);

        let state = control.state;
        match state {
            PlaybackState::Playing => {
                if let Some(active) = control.session.as_mut() {
                    active.session.pause()?;
                }
                self.transition(&mut control, PlaybackState::Paused);
            }
            PlaybackState::SourceSet => control.play_when_ready = false,
            _ => {}
        }
        Ok(())
    }

    /// Tear the session down, keeping the player reusable
    pub fn stop(&self) -> Result<()> {
        let mut control = self.lock_live()?;
        self.sync_with_decoder(&mut control);

        if control.state.has_session() {
            self.teardown(&mut control);
            control.source = None;
            control.play_when_ready = false;
            self.transition(&mut control, PlaybackState::Stopped);
        }
        Ok(())
    }

    /// Seek to `seconds`
    ///
    /// Negative values clamp to 0 and, once the duration is known, values
    /// past it clamp to the duration.
    pub fn set_position(&self, seconds: f64) -> Result<()> {
        let mut control = self.lock_live()?;
        if !seconds.is_finite() {
            return Err(BridgeError::invalid_argument(format!(
                "position must be finite, got {}",
                seconds
            )));
        }
        self.sync_with_decoder(&mut control);

        if !control.state.has_session() {
            return Err(BridgeError::NoSource);
        }

        self.shared.set_position(seconds);
        let target = self.shared.position();
        if let Some(active) = control.session.as_mut() {
            active.session.seek(secs_to_duration(target))?;
        }
        debug!("Player {}: seek to {:.3}s", self.id, target);
        Ok(())
    }

    /// Playback position in seconds, 0 if unknown
    pub fn position(&self) -> f64 {
        let mut control = self.control.lock();
        self.sync_with_decoder(&mut control);
        self.shared.position()
    }

    /// Media duration in seconds, 0 if unknown
    pub fn duration(&self) -> f64 {
        let mut control = self.control.lock();
        self.sync_with_decoder(&mut control);
        self.shared.duration()
    }

    /// Set the playback rate; must be finite and positive
    pub fn set_playback_rate(&self, rate: f32) -> Result<()> {
        let mut control = self.lock_live()?;
        if !rate.is_finite() || rate <= 0.0 {
            return Err(BridgeError::invalid_argument(format!(
                "playback rate must be positive, got {}",
                rate
            )));
        }

        if let Some(active) = control.session.as_mut() {
            active.session.set_playback_rate(rate)?;
        }
        control.playback_rate = rate;
        Ok(())
    }

    pub fn playback_rate(&self) -> f32 {
        self.control.lock().playback_rate
    }

    /// Set the volume, clamped to `[0, 1]`
    pub fn set_volume(&self, volume: f32) -> Result<()> {
        let mut control = self.lock_live()?;
        if !volume.is_finite() {
            return Err(BridgeError::invalid_argument("volume must be finite"));
        }

        let volume = volume.clamp(0.0, 1.0);
        if let Some(active) = control.session.as_mut() {
            active.session.set_volume(volume)?;
        }
        control.volume = volume;
        Ok(())
    }

    pub fn volume(&self) -> f32 {
        self.control.lock().volume
    }

    pub fn set_looping(&self, looping: bool) -> Result<()> {
        let mut control = self.lock_live()?;
        if let Some(active) = control.session.as_mut() {
            active.session.set_looping(looping)?;
        }
        control.looping = looping;
        Ok(())
    }

    pub fn is_looping(&self) -> bool {
        self.control.lock().looping
    }

    /// Set the destination texture size chosen by the consumer
    pub fn set_texture_size(&self, width: u32, height: u32) -> Result<()> {
        let _control = self.lock_live()?;
        if width == 0 || height == 0 {
            return Err(BridgeError::invalid_argument(format!(
                "texture size must be non-zero, got {}x{}",
                width, height
            )));
        }
        self.shared.set_texture_size(width, height);
        debug!("Player {}: texture size {}x{}", self.id, width, height);
        Ok(())
    }

    /// Check for a published frame not yet acquired (render thread)
    pub fn has_new_frame(&self) -> bool {
        !self.shared.is_released() && self.shared.pipeline().has_new_frame()
    }

    /// Acquire the latest frame (render thread)
    ///
    /// The returned handle is only valid for the current render step.
    pub fn acquire_frame(&self) -> Option<AcquiredFrame> {
        if self.shared.is_released() {
            return None;
        }
        self.shared.pipeline().acquire()
    }

    /// Acquire the latest frame's handle, or [`BufferHandle::NULL`] if nothing new
    pub fn acquire_frame_handle(&self) -> BufferHandle {
        self.acquire_frame()
            .map(|frame| frame.handle)
            .unwrap_or(BufferHandle::NULL)
    }

    /// Handle of the frame acquired last, for re-rendering without a new frame
    pub fn in_use_handle(&self) -> BufferHandle {
        if self.shared.is_released() {
            return BufferHandle::NULL;
        }
        self.shared.pipeline().in_use_handle()
    }

    pub fn has_size_changed(&self) -> bool {
        self.shared.has_size_changed()
    }

    pub fn clear_size_changed_flag(&self) {
        self.shared.clear_size_changed();
    }

    pub fn video_width(&self) -> u32 {
        self.shared.video_size().0
    }

    pub fn video_height(&self) -> u32 {
        self.shared.video_size().1
    }

    pub fn texture_width(&self) -> u32 {
        self.shared.texture_size().0
    }

    pub fn texture_height(&self) -> u32 {
        self.shared.texture_size().1
    }

    /// Current playback state
    pub fn state(&self) -> PlaybackState {
        let mut control = self.control.lock();
        self.sync_with_decoder(&mut control);
        control.state
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    /// Last source or decoder error message
    pub fn last_error(&self) -> Option<String> {
        let mut control = self.control.lock();
        self.sync_with_decoder(&mut control);
        control.last_error.clone()
    }

    /// Diagnostic snapshot
    pub fn info(&self) -> PlayerInfo {
        let mut control = self.control.lock();
        self.sync_with_decoder(&mut control);

        let (video_width, video_height) = self.shared.video_size();
        let (texture_width, texture_height) = self.shared.texture_size();
        PlayerInfo {
            id: self.id,
            state: control.state,
            source: control.source.as_ref().map(MediaSource::uri),
            video_width,
            video_height,
            texture_width,
            texture_height,
            position: self.shared.position(),
            duration: self.shared.duration(),
            volume: control.volume,
            looping: control.looping,
            playback_rate: control.playback_rate,
            last_error: control.last_error.clone(),
            pipeline: self.shared.pipeline().stats(),
        }
    }

    /// Drive the player to `Released`, freeing the session and every frame reference
    ///
    /// Idempotent.
    pub fn release(&self) {
        let mut control = self.control.lock();
        if control.state == PlaybackState::Released {
            return;
        }

        self.shared.mark_released();
        self.teardown(&mut control);
        control.source = None;
        control.play_when_ready = false;
        self.transition(&mut control, PlaybackState::Released);
    }

    fn lock_live(&self) -> Result<MutexGuard<'_, Control>> {
        let control = self.control.lock();
        if control.state == PlaybackState::Released {
            return Err(BridgeError::UnknownPlayer(self.id));
        }
        Ok(control)
    }

    fn reject_source(&self, error: BridgeError) -> Result<()> {
        let mut control = self.lock_live()?;
        warn!("Player {}: source rejected: {}", self.id, error);
        control.last_error = Some(error.to_string());
        Err(error)
    }

    fn transition(&self, control: &mut Control, next: PlaybackState) {
        if control.state != next {
            info!("Player {}: {} -> {}", self.id, control.state, next);
            control.state = next;
        }
    }

    /// Fold pending decoder events into the state machine
    fn sync_with_decoder(&self, control: &mut Control) {
        if !control.state.has_session() {
            return;
        }

        if let Some(message) = self.shared.take_error() {
            warn!("Player {}: decoder failed: {}", self.id, message);
            self.teardown(control);
            control.source = None;
            control.play_when_ready = false;
            control.last_error = Some(message);
            self.transition(control, PlaybackState::Idle);
            return;
        }

        if control.state == PlaybackState::SourceSet && self.shared.is_prepared() {
            self.transition(control, PlaybackState::Ready);
            if control.play_when_ready {
                control.play_when_ready = false;
                if let Err(e) = self.start_playback(control) {
                    warn!("Player {}: deferred play failed: {}", self.id, e);
                    control.last_error = Some(e.to_string());
                }
            }
        }

        if self.shared.take_ended()
            && control.state == PlaybackState::Playing
            && !control.looping
        {
            self.shared.set_position(self.shared.duration());
            self.transition(control, PlaybackState::Paused);
        }
    }

    fn start_playback(&self, control: &mut Control) -> Result<()> {
        let Some(active) = control.session.as_mut() else {
            return Err(BridgeError::NoSource);
        };

        // Replay from the start once the end was reached
        let duration = self.shared.duration();
        if duration > 0.0 && self.shared.position() >= duration {
            active.session.seek(Duration::ZERO)?;
            self.shared.set_position(0.0);
        }

        active.session.play()?;
        self.transition(control, PlaybackState::Playing);
        Ok(())
    }

    fn apply_settings(session: &mut dyn DecoderSession, control: &Control) {
        if let Err(e) = session.set_volume(control.volume) {
            warn!("Failed to apply volume: {}", e);
        }
        if let Err(e) = session.set_looping(control.looping) {
            warn!("Failed to apply looping: {}", e);
        }
        if control.playback_rate != 1.0 {
            if let Err(e) = session.set_playback_rate(control.playback_rate) {
                warn!("Failed to apply playback rate: {}", e);
            }
        }
    }

    /// Close the current session and drop every frame reference
    ///
    /// Order matters: shut the gate and drain callbacks already inside, then
    /// close the session (which blocks until the platform stops calling
    /// back), and only then clear the pipeline.
    fn teardown(&self, control: &mut Control) {
        if let Some(mut active) = control.session.take() {
            active.gate.shutdown(self.drain_warn);
            active.session.close();
            debug!("Player {}: session closed", self.id);
        }
        self.shared.reset_for_new_session();
    }
}

impl Drop for PlayerInstance {
    fn drop(&mut self) {
        self.release();
    }
}
