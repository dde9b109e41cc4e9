//! Decoder callback entry points
//!
//! A [`FrameSink`] is what a decoder session writes into from its callback
//! thread. Every call passes through the session's [`SinkGate`]; once the
//! gate is shut, calls become no-ops and teardown waits for the ones already
//! inside to finish.

use crate::decoder::FrameRef;
use crate::player::SharedPlayback;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Admission gate between one decoder session and the player it feeds
#[derive(Debug, Default)]
pub struct SinkGate {
    closed: AtomicBool,
    in_flight: AtomicUsize,

    /// Signalled when the last callback leaves a shut gate
    drain_lock: Mutex<()>,
    drained: Condvar,
}

/// Proof that a callback is inside the gate; leaves on drop
struct GatePass<'a> {
    gate: &'a SinkGate,
}

impl Drop for GatePass<'_> {
    fn drop(&mut self) {
        let remaining = self.gate.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining == 0 && self.gate.closed.load(Ordering::SeqCst) {
            let _guard = self.gate.drain_lock.lock();
            self.gate.drained.notify_all();
        }
    }
}

impl SinkGate {
    /// Create an open gate
    pub fn new() -> Self {
        Self::default()
    }

    fn enter(&self) -> Option<GatePass<'_>> {
        // SeqCst on both sides: either shutdown sees our increment, or we see
        // its `closed` store.
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let pass = GatePass { gate: self };
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        Some(pass)
    }

    /// Check whether the gate has been shut
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Shut the gate and wait until no callback is inside
    ///
    /// Logs a warning if draining takes longer than `warn_after`.
    pub fn shutdown(&self, warn_after: Duration) {
        self.closed.store(true, Ordering::SeqCst);

        let deadline = Instant::now() + warn_after;
        let mut warned = false;
        let mut guard = self.drain_lock.lock();
        while self.in_flight.load(Ordering::SeqCst) != 0 {
            if warned {
                self.drained.wait(&mut guard);
            } else if self.drained.wait_until(&mut guard, deadline).timed_out() {
                log::warn!(
                    "Still waiting for {} decoder callback(s) after {:?}",
                    self.in_flight.load(Ordering::SeqCst),
                    warn_after
                );
                warned = true;
            }
        }
    }
}

/// Callback handle given to a decoder session
///
/// Cheap to clone; every method returns `false` once the session has been
/// torn down.
#[derive(Clone)]
pub struct FrameSink {
    shared: Arc<SharedPlayback>,
    gate: Arc<SinkGate>,
}

impl FrameSink {
    pub(crate) fn new(shared: Arc<SharedPlayback>, gate: Arc<SinkGate>) -> Self {
        Self { shared, gate }
    }

    /// Publish a decoded frame
    ///
    /// Also updates the natural video size from the frame and counts as the
    /// session becoming ready.
    pub fn publish_frame(&self, frame: FrameRef) -> bool {
        let Some(_pass) = self.gate.enter() else {
            return false;
        };

        let (width, height) = frame.dimensions();
        self.shared.update_video_size(width, height);
        self.shared.pipeline().publish(frame);
        self.shared.mark_prepared();
        true
    }

    /// Report a change of the natural video size
    pub fn report_video_size(&self, width: u32, height: u32) -> bool {
        let Some(_pass) = self.gate.enter() else {
            return false;
        };
        self.shared.update_video_size(width, height);
        true
    }

    /// Report that metadata is loaded and the session can play
    pub fn report_prepared(&self) -> bool {
        let Some(_pass) = self.gate.enter() else {
            return false;
        };
        self.shared.mark_prepared();
        true
    }

    /// Report the media duration in seconds
    pub fn report_duration(&self, seconds: f64) -> bool {
        let Some(_pass) = self.gate.enter() else {
            return false;
        };
        self.shared.set_duration(seconds);
        true
    }

    /// Report the current playback position in seconds
    pub fn report_position(&self, seconds: f64) -> bool {
        let Some(_pass) = self.gate.enter() else {
            return false;
        };
        self.shared.set_position(seconds);
        true
    }

    /// Report that a non-looping session reached the end of the media
    pub fn report_ended(&self) -> bool {
        let Some(_pass) = self.gate.enter() else {
            return false;
        };
        self.shared.mark_ended();
        true
    }

    /// Report an asynchronous decoder failure (network loss, corrupt stream)
    pub fn report_error(&self, message: &str) -> bool {
        let Some(_pass) = self.gate.enter() else {
            return false;
        };
        log::error!("Decoder error: {}", message);
        self.shared.record_error(message);
        true
    }

    /// Check whether this sink's session has been torn down
    pub fn is_closed(&self) -> bool {
        self.gate.is_closed()
    }
}
