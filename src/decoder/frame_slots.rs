//! Triple-buffered frame handoff between decoder and renderer
//!
//! Three slots rotate through three roles:
//!
//! - **back**: owned by the producer (decoder callback), written next
//! - **ready**: the most recently published frame
//! - **in-use**: owned by the consumer (render thread), last acquired
//!
//! The role assignment, the published generation and a "fresh" bit are
//! packed into one `AtomicU64`. The producer swaps back↔ready after writing,
//! the consumer swaps ready↔in-use before reading, both with a CAS. Each role
//! is held by exactly one side at a time, so the per-slot mutexes never
//! contend between producer and consumer.

use crate::decoder::FrameRef;
use crate::renderer::{resolve, BufferHandle};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Number of frame slots
pub const SLOT_COUNT: usize = 3;

const INDEX_MASK: u64 = 0b11;
const BACK_SHIFT: u32 = 0;
const READY_SHIFT: u32 = 2;
const IN_USE_SHIFT: u32 = 4;
const FRESH_BIT: u64 = 1 << 6;
const GENERATION_SHIFT: u32 = 8;

/// Unpacked view of the shared state word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SlotState {
    back: usize,
    ready: usize,
    in_use: usize,
    /// Ready slot holds a frame the consumer has not acquired
    fresh: bool,
    /// Generation of the frame in the ready slot (0 = never published)
    generation: u64,
}

impl SlotState {
    const INITIAL: SlotState = SlotState {
        back: 0,
        ready: 1,
        in_use: 2,
        fresh: false,
        generation: 0,
    };

    fn pack(self) -> u64 {
        let mut word = ((self.back as u64) << BACK_SHIFT)
            | ((self.ready as u64) << READY_SHIFT)
            | ((self.in_use as u64) << IN_USE_SHIFT)
            | (self.generation << GENERATION_SHIFT);
        if self.fresh {
            word |= FRESH_BIT;
        }
        word
    }

    fn unpack(word: u64) -> Self {
        Self {
            back: ((word >> BACK_SHIFT) & INDEX_MASK) as usize,
            ready: ((word >> READY_SHIFT) & INDEX_MASK) as usize,
            in_use: ((word >> IN_USE_SHIFT) & INDEX_MASK) as usize,
            fresh: word & FRESH_BIT != 0,
            generation: word >> GENERATION_SHIFT,
        }
    }
}

/// One frame slot
#[derive(Default)]
struct Slot {
    /// Reference to the platform frame; the buffer itself stays decoder-owned
    frame: Option<FrameRef>,

    /// Generation the frame was published with
    generation: u64,

    /// Written by the producer and not yet acquired
    fresh: bool,
}

/// Frame returned by [`FrameSlotPipeline::acquire`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredFrame {
    /// Importable handle, [`BufferHandle::NULL`] if the frame was invalid
    pub handle: BufferHandle,

    /// Generation of the acquired frame
    pub generation: u64,

    /// Frame dimensions (0x0 if the frame was invalid)
    pub width: u32,
    pub height: u32,
}

/// Pipeline statistics for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Frames published by the decoder
    pub published: u64,

    /// Frames acquired by the renderer
    pub acquired: u64,

    /// Frames replaced before the renderer acquired them
    pub superseded: u64,

    /// Generation of the last acquired frame
    pub last_acquired_generation: u64,
}

/// Latest-wins frame handoff for one player
pub struct FrameSlotPipeline {
    slots: [Mutex<Slot>; SLOT_COUNT],
    state: AtomicU64,
    consumed_generation: AtomicU64,
    published: AtomicU64,
    acquired: AtomicU64,
    superseded: AtomicU64,
}

impl FrameSlotPipeline {
    /// Create an empty pipeline
    pub fn new() -> Self {
        Self {
            slots: Default::default(),
            state: AtomicU64::new(SlotState::INITIAL.pack()),
            consumed_generation: AtomicU64::new(0),
            published: AtomicU64::new(0),
            acquired: AtomicU64::new(0),
            superseded: AtomicU64::new(0),
        }
    }

    /// Publish a decoded frame (producer side)
    ///
    /// Writes into the back slot, then makes it the ready slot. A ready
    /// frame the consumer never acquired is superseded. Returns the new
    /// generation.
    pub fn publish(&self, frame: FrameRef) -> u64 {
        // Only the producer moves `back` or bumps the generation, so both are
        // stable until our CAS below.
        let current = SlotState::unpack(self.state.load(Ordering::Acquire));
        let generation = current.generation + 1;

        {
            let mut slot = self.slots[current.back].lock();
            slot.frame = Some(frame);
            slot.generation = generation;
            slot.fresh = true;
        }

        let mut word = self.state.load(Ordering::Acquire);
        loop {
            let state = SlotState::unpack(word);
            let next = SlotState {
                back: state.ready,
                ready: state.back,
                in_use: state.in_use,
                fresh: true,
                generation,
            };

            match self.state.compare_exchange_weak(
                word,
                next.pack(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.published.fetch_add(1, Ordering::Relaxed);
                    if state.fresh {
                        self.superseded.fetch_add(1, Ordering::Relaxed);
                        log::trace!("Frame generation {} superseded", state.generation);
                    }
                    return generation;
                }
                Err(actual) => word = actual,
            }
        }
    }

    /// Non-blocking check for an unconsumed published frame
    pub fn has_new_frame(&self) -> bool {
        SlotState::unpack(self.state.load(Ordering::Acquire)).fresh
    }

    /// Acquire the latest frame (consumer side)
    ///
    /// Promotes the ready slot to in-use, marks it consumed and resolves its
    /// buffer handle. Returns `None` when nothing new was published since
    /// the last acquire. The handle is only valid for the current render
    /// step.
    pub fn acquire(&self) -> Option<AcquiredFrame> {
        let mut word = self.state.load(Ordering::Acquire);
        let in_use = loop {
            let state = SlotState::unpack(word);
            if !state.fresh {
                return None;
            }

            let next = SlotState {
                back: state.back,
                ready: state.in_use,
                in_use: state.ready,
                fresh: false,
                generation: state.generation,
            };

            match self.state.compare_exchange_weak(
                word,
                next.pack(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break next.in_use,
                Err(actual) => word = actual,
            }
        };

        let mut slot = self.slots[in_use].lock();
        if slot.generation == 0 {
            // `clear` emptied the slot between our CAS and this lock
            return None;
        }
        slot.fresh = false;
        self.consumed_generation
            .store(slot.generation, Ordering::Release);
        self.acquired.fetch_add(1, Ordering::Relaxed);

        let (handle, (width, height)) = Self::resolve_slot(&slot);
        Some(AcquiredFrame {
            handle,
            generation: slot.generation,
            width,
            height,
        })
    }

    /// Re-resolve the frame acquired most recently, without advancing
    ///
    /// Returns [`BufferHandle::NULL`] if nothing was acquired yet or the
    /// decoder has invalidated that frame since.
    pub fn in_use_handle(&self) -> BufferHandle {
        let in_use = SlotState::unpack(self.state.load(Ordering::Acquire)).in_use;
        let slot = self.slots[in_use].lock();
        if slot.generation == 0 {
            return BufferHandle::NULL;
        }
        Self::resolve_slot(&slot).0
    }

    /// Drop every slot's frame reference
    ///
    /// Must only run once the producer is quiescent (session closed). A
    /// consumer may still be acquiring; it then sees `None`. The
    /// generation keeps counting so a stale consumer never mistakes a later
    /// frame for one it already saw.
    pub fn clear(&self) {
        for slot in &self.slots {
            let mut slot = slot.lock();
            slot.frame = None;
            slot.generation = 0;
            slot.fresh = false;
        }

        let generation = SlotState::unpack(self.state.load(Ordering::Acquire)).generation;
        let reset = SlotState {
            generation,
            ..SlotState::INITIAL
        };
        self.state.store(reset.pack(), Ordering::Release);
    }

    /// Number of slots currently holding a frame reference
    pub fn occupied_slots(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.lock().frame.is_some())
            .count()
    }

    /// Generation of the most recently published frame (0 if none)
    pub fn generation(&self) -> u64 {
        SlotState::unpack(self.state.load(Ordering::Acquire)).generation
    }

    /// Get pipeline statistics
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            published: self.published.load(Ordering::Relaxed),
            acquired: self.acquired.load(Ordering::Relaxed),
            superseded: self.superseded.load(Ordering::Relaxed),
            last_acquired_generation: self.consumed_generation.load(Ordering::Acquire),
        }
    }

    fn resolve_slot(slot: &Slot) -> (BufferHandle, (u32, u32)) {
        match resolve(slot.frame.as_deref()) {
            Ok(handle) => {
                let dimensions = slot
                    .frame
                    .as_ref()
                    .map(|frame| frame.dimensions())
                    .unwrap_or((0, 0));
                (handle, dimensions)
            }
            Err(e) => {
                log::warn!("Frame generation {} not importable: {}", slot.generation, e);
                (BufferHandle::NULL, (0, 0))
            }
        }
    }
}

impl Default for FrameSlotPipeline {
    fn default() -> Self {
        Self::new()
    }
}
