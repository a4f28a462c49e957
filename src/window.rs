//! Bounded in-flight frame window.
//!
//! [`FrameWindow`] owns a fixed number of slots. Each slot has its own lock
//! and a readiness state:
//!
//! ```text
//! Empty ──reserve──► Reserved ──publish──► Published ──drain──► Empty
//!                        │
//!                        └──drop without publish──► Abandoned ──drain──► Empty
//! ```
//!
//! Producers claim a slot with [`FrameWindow::reserve`] and receive a
//! [`SlotReservation`]. Only a reservation can store a frame, and the frame
//! stays owned by the reservation (and therefore by the producing thread)
//! until [`SlotReservation::publish`] hands it to the slot. The consumer
//! calls [`FrameWindow::drain`], which blocks until the slot is published or
//! abandoned. No operation ever holds two slot locks at once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::error::BalanceError;
use crate::frame::Frame;

/// Default number of slots in a window.
pub const DEFAULT_WINDOW_SIZE: usize = 500;

#[derive(Debug, Default)]
enum SlotState {
    #[default]
    Empty,
    Reserved,
    Published(Frame),
    Abandoned,
}

#[derive(Debug, Default)]
struct Slot {
    state: Mutex<SlotState>,
    changed: Condvar,
}

impl Slot {
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        // Every transition writes a complete state, so a poisoned lock still
        // guards a valid value.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, state: SlotState) {
        *self.lock() = state;
        self.changed.notify_all();
    }
}

/// A fixed-capacity array of independently locked frame slots.
#[derive(Debug)]
pub struct FrameWindow {
    slots: Box<[Slot]>,
    resident: AtomicUsize,
    peak: AtomicUsize,
}

impl FrameWindow {
    /// Create a window with `capacity` empty slots.
    ///
    /// # Errors
    ///
    /// Returns [`BalanceError::InvalidWindowSize`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, BalanceError> {
        if capacity == 0 {
            return Err(BalanceError::InvalidWindowSize);
        }
        let slots = (0..capacity).map(|_| Slot::default()).collect();
        Ok(Self {
            slots,
            resident: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Frame buffers currently held by reservations or published slots.
    pub fn resident(&self) -> usize {
        self.resident.load(Ordering::Acquire)
    }

    /// Highest value [`resident`](FrameWindow::resident) has reached.
    pub fn peak_resident(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }

    fn slot(&self, position: usize) -> Result<&Slot, BalanceError> {
        self.slots.get(position).ok_or(BalanceError::SlotOutOfRange {
            position,
            capacity: self.slots.len(),
        })
    }

    /// Claim slot `position` for writing.
    ///
    /// Blocks until the slot is empty, i.e. until any frame previously
    /// stored there has been drained.
    ///
    /// # Errors
    ///
    /// Returns [`BalanceError::SlotOutOfRange`] if `position` is not a slot
    /// of this window.
    pub fn reserve(&self, position: usize) -> Result<SlotReservation<'_>, BalanceError> {
        let slot = self.slot(position)?;
        let mut state = slot
            .changed
            .wait_while(slot.lock(), |state| !matches!(state, SlotState::Empty))
            .unwrap_or_else(PoisonError::into_inner);
        *state = SlotState::Reserved;

        Ok(SlotReservation {
            window: self,
            position,
            frame: None,
            released: false,
        })
    }

    /// Take the frame out of slot `position`.
    ///
    /// Blocks until the slot is published or abandoned, then returns it to
    /// the empty state. Returns `None` for an abandoned slot, which marks a
    /// frame that was never produced.
    ///
    /// # Errors
    ///
    /// Returns [`BalanceError::SlotOutOfRange`] if `position` is not a slot
    /// of this window.
    pub fn drain(&self, position: usize) -> Result<Option<Frame>, BalanceError> {
        let slot = self.slot(position)?;
        let mut state = slot
            .changed
            .wait_while(slot.lock(), |state| {
                !matches!(state, SlotState::Published(_) | SlotState::Abandoned)
            })
            .unwrap_or_else(PoisonError::into_inner);

        let frame = match std::mem::take(&mut *state) {
            SlotState::Published(frame) => Some(frame),
            _ => None,
        };
        drop(state);
        slot.changed.notify_all();

        if frame.is_some() {
            self.resident.fetch_sub(1, Ordering::AcqRel);
        }
        Ok(frame)
    }

    /// Return every slot to the empty state, dropping anything left behind.
    ///
    /// Takes `&mut self`, so no reservation can be outstanding.
    pub fn reset(&mut self) {
        let mut dropped = 0;
        for slot in self.slots.iter_mut() {
            let state = slot.state.get_mut().unwrap_or_else(PoisonError::into_inner);
            if let SlotState::Published(_) = std::mem::take(state) {
                dropped += 1;
            }
        }
        if dropped > 0 {
            log::debug!("Dropped {dropped} undrained frame(s) from the window");
        }
        *self.resident.get_mut() = 0;
    }

    fn frame_stored(&self) {
        let resident = self.resident.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak.fetch_max(resident, Ordering::AcqRel);
    }

    fn frame_discarded(&self) {
        self.resident.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Exclusive claim on one slot of a [`FrameWindow`].
///
/// Dropping a reservation without publishing it marks the slot abandoned,
/// which tells the drain that no frame will ever arrive there.
#[derive(Debug)]
pub struct SlotReservation<'w> {
    window: &'w FrameWindow,
    position: usize,
    frame: Option<Frame>,
    released: bool,
}

impl SlotReservation<'_> {
    /// Position of the reserved slot within its window.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Store a frame in the slot, replacing any frame stored earlier.
    pub fn fill(&mut self, frame: Frame) {
        if self.frame.replace(frame).is_none() {
            self.window.frame_stored();
        }
    }

    /// Mutable access to the stored frame, if any.
    pub fn frame_mut(&mut self) -> Option<&mut Frame> {
        self.frame.as_mut()
    }

    /// Mark the slot published and release it to the drain side.
    ///
    /// # Errors
    ///
    /// Returns [`BalanceError::SlotNotFilled`] if no frame was stored. The
    /// slot is then abandoned.
    pub fn publish(mut self) -> Result<(), BalanceError> {
        let frame = self
            .frame
            .take()
            .ok_or(BalanceError::SlotNotFilled(self.position))?;
        self.released = true;
        self.window.slots[self.position].set(SlotState::Published(frame));
        Ok(())
    }
}

impl Drop for SlotReservation<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if self.frame.take().is_some() {
            self.window.frame_discarded();
        }
        self.window.slots[self.position].set(SlotState::Abandoned);
    }
}
