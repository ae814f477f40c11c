//! Per-device state shared between a driver and its producers.
//!
//! A device owns a [`BufferRing`] and a [`TicClock`]. Node kinds write into
//! the ring's producer slot from the scheduler or worker threads; the driver
//! thread consumes the front slot and ticks the clock. Both sides go through
//! a [`SharedDeviceState`], a per-device recursive mutex, so a producer may
//! re-enter while it already holds the lock.
//!
//! The two traits here decouple the engine from concrete drivers:
//! [`OffsetListener`] is implemented by the scheduler and held weakly by
//! drivers, [`DriverControl`] is implemented by drivers and held by the
//! scheduler.

use std::cell::RefCell;
use std::sync::Arc;

use parking_lot::ReentrantMutex;

use crate::error::Result;
use crate::ring::{BufferRing, TicClock, TimingKey, TimingTables};

/// Ring and clock of one device.
#[derive(Debug, Clone)]
pub struct DeviceState {
    /// Rotating device buffers.
    pub ring: BufferRing,
    /// Musical position.
    pub clock: TicClock,
}

/// Shared, recursively lockable device state.
pub type SharedDeviceState = Arc<ReentrantMutex<RefCell<DeviceState>>>;

impl DeviceState {
    /// Builds a ring of `slots` buffers and a clock for `key`.
    pub fn new(slots: usize, pcm_channels: u16, key: TimingKey) -> Result<Self> {
        Ok(Self {
            ring: BufferRing::new(slots, pcm_channels, key.buffer_size)?,
            clock: TicClock::new(TimingTables::new(key)?),
        })
    }

    /// Wraps the state in a shared handle.
    pub fn into_shared(self) -> SharedDeviceState {
        Arc::new(ReentrantMutex::new(RefCell::new(self)))
    }

    /// Completes one device buffer.
    ///
    /// Clears the consumed front slot, advances the ring and ticks the
    /// clock. Returns `true` when the note offset advanced.
    pub fn complete_buffer(&mut self) -> bool {
        self.ring.clear_front();
        self.ring.advance();
        self.clock.tic()
    }

    /// Changes tempo or geometry; tables are recomputed only on change.
    ///
    /// A buffer size change reshapes the ring and silences it.
    pub fn retime(&mut self, key: TimingKey) -> Result<bool> {
        if key.buffer_size != self.ring.buffer_size() {
            key.validate()?;
            self.ring.reshape(self.ring.pcm_channels(), key.buffer_size)?;
        }
        self.clock.retime(key)
    }
}

/// Receives musical-time notifications from a driver.
pub trait OffsetListener: Send + Sync {
    /// The note offset advanced to `note_offset` (`absolute` never wraps).
    fn offset_changed(&self, note_offset: u64, absolute: u64);

    /// One device buffer completed.
    fn buffer_completed(&self) {}
}

/// Scheduler-side handle on a running driver.
pub trait DriverControl: Send + Sync {
    /// Driver name for diagnostics.
    fn name(&self) -> &str;

    /// Returns `true` while the driver thread is running.
    fn is_running(&self) -> bool;

    /// Asks the driver to stop. Returns without waiting.
    fn stop(&self);

    /// Ring and clock of the device.
    fn state(&self) -> SharedDeviceState;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> DeviceState {
        DeviceState::new(
            4,
            1,
            TimingKey {
                samplerate: 44100,
                buffer_size: 16,
                bpm: 120.0,
                delay_factor: 1.0,
            },
        )
        .unwrap()
    }

    #[test]
    fn complete_buffer_clears_and_rotates() {
        let mut s = state();
        s.ring.mix_into_next(0, &[1.0; 16], 1.0);
        s.complete_buffer();
        assert_eq!(s.ring.active(), 1);
        assert!(s.ring.front().iter().all(|&x| x == 1.0));
        s.complete_buffer();
        assert_eq!(s.ring.active(), 2);
        assert!(s.ring.slot(1).unwrap().iter().all(|&x| x == 0.0));
        assert_eq!(s.clock.buffers_completed(), 2);
    }

    #[test]
    fn retime_reshapes_ring_on_buffer_size_change() {
        let mut s = state();
        let key = TimingKey {
            buffer_size: 32,
            ..*s.clock.tables().key()
        };
        assert!(s.retime(key).unwrap());
        assert_eq!(s.ring.buffer_size(), 32);
        assert_eq!(s.ring.front().len(), 32);
        assert!(!s.retime(key).unwrap());
    }

    #[test]
    fn shared_state_is_reentrant() {
        let shared = state().into_shared();
        let outer = shared.lock();
        let inner = shared.lock();
        inner.borrow_mut().ring.mix_into_next(0, &[0.5], 1.0);
        assert_eq!(outer.borrow().ring.next()[0], 0.5);
    }
}
