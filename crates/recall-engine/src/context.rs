//! Explicit engine context.

use std::time::Duration;

use recall_core::{
    AudioGeometry, DEFAULT_BPM, DEFAULT_DELAY_FACTOR, DEFAULT_RING_SLOTS, DeviceState,
    RecallIdAllocator, Result, SharedRecallId, SoundScope, TimingKey,
};

/// Geometry, id allocation and scheduler settings of one rendering core.
///
/// There is no global state: every scheduler, driver and test builds from
/// its own context.
#[derive(Debug)]
pub struct AudioContext {
    geometry: AudioGeometry,
    allocator: RecallIdAllocator,
    ring_slots: usize,
    bpm: f64,
    delay_factor: f64,
    overclock: f64,
    time_accounting: bool,
    super_threaded: bool,
}

impl AudioContext {
    /// Context with default timing for `geometry`.
    pub fn new(geometry: AudioGeometry) -> Self {
        Self {
            geometry,
            allocator: RecallIdAllocator::new(),
            ring_slots: DEFAULT_RING_SLOTS,
            bpm: DEFAULT_BPM,
            delay_factor: DEFAULT_DELAY_FACTOR,
            overclock: 0.0,
            time_accounting: true,
            super_threaded: false,
        }
    }

    /// Sets the tempo.
    pub fn with_bpm(mut self, bpm: f64) -> Result<Self> {
        self.bpm = bpm;
        self.timing_key().validate()?;
        Ok(self)
    }

    /// Sets the delay factor.
    pub fn with_delay_factor(mut self, delay_factor: f64) -> Result<Self> {
        self.delay_factor = delay_factor;
        self.timing_key().validate()?;
        Ok(self)
    }

    /// Sets the ring slot count of devices built from this context.
    pub fn with_ring_slots(mut self, ring_slots: usize) -> Result<Self> {
        if ring_slots < 2 {
            return Err(recall_core::Error::InvalidRingSlots(ring_slots));
        }
        self.ring_slots = ring_slots;
        Ok(self)
    }

    /// Adds `overclock` Hz to the tick frequency.
    pub fn with_overclock(mut self, overclock: f64) -> Self {
        self.overclock = overclock.max(0.0);
        self
    }

    /// Enables or disables pacing the scheduler to the tick period.
    pub fn with_time_accounting(mut self, enabled: bool) -> Self {
        self.time_accounting = enabled;
        self
    }

    /// Default for new members: run on a worker thread.
    pub fn with_super_threaded(mut self, enabled: bool) -> Self {
        self.super_threaded = enabled;
        self
    }

    /// Audio geometry.
    pub fn geometry(&self) -> &AudioGeometry {
        &self.geometry
    }

    /// Ring slots per device.
    pub fn ring_slots(&self) -> usize {
        self.ring_slots
    }

    /// Initial tempo.
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Note length scaling.
    pub fn delay_factor(&self) -> f64 {
        self.delay_factor
    }

    /// Extra tick frequency in Hz.
    pub fn overclock(&self) -> f64 {
        self.overclock
    }

    /// Whether the scheduler sleeps out each tick period.
    pub fn time_accounting(&self) -> bool {
        self.time_accounting
    }

    /// Default threading of new members.
    pub fn super_threaded(&self) -> bool {
        self.super_threaded
    }

    /// Scheduler tick period.
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.geometry.tick_frequency(self.overclock))
    }

    /// Timing inputs for the context's geometry and tempo.
    pub fn timing_key(&self) -> TimingKey {
        TimingKey {
            samplerate: self.geometry.samplerate(),
            buffer_size: self.geometry.buffer_size(),
            bpm: self.bpm,
            delay_factor: self.delay_factor,
        }
    }

    /// Fresh ring and clock for a device of this context.
    pub fn device_state(&self) -> Result<DeviceState> {
        DeviceState::new(
            self.ring_slots,
            self.geometry.pcm_channels(),
            self.timing_key(),
        )
    }

    /// Allocates a run id in `scope`.
    pub fn allocate(&self, scope: SoundScope) -> SharedRecallId {
        self.allocator.allocate(scope)
    }

    /// Allocates a run id spawned from `parent`.
    pub fn allocate_child(&self, parent: &SharedRecallId, scope: SoundScope) -> SharedRecallId {
        self.allocator.allocate_child(parent, scope)
    }
}

impl Default for AudioContext {
    fn default() -> Self {
        Self::new(AudioGeometry::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_core::SampleFormat;

    #[test]
    fn tick_period_follows_geometry_and_overclock() {
        let geo = AudioGeometry::new(48000, 480, 2, SampleFormat::Float32).unwrap();
        let ctx = AudioContext::new(geo);
        assert!((ctx.tick_period().as_secs_f64() - 0.010).abs() < 1e-9);
        let ctx = ctx.with_overclock(100.0);
        assert!((ctx.tick_period().as_secs_f64() - 0.005).abs() < 1e-9);
    }

    #[test]
    fn builders_validate() {
        assert!(AudioContext::default().with_bpm(0.0).is_err());
        assert!(AudioContext::default().with_delay_factor(-1.0).is_err());
        assert!(AudioContext::default().with_ring_slots(1).is_err());
        let ctx = AudioContext::default().with_bpm(90.0).unwrap();
        assert_eq!(ctx.timing_key().bpm, 90.0);
        assert_eq!(ctx.device_state().unwrap().ring.slot_count(), DEFAULT_RING_SLOTS);
    }

    #[test]
    fn contexts_allocate_independently() {
        let a = AudioContext::default();
        let b = AudioContext::default();
        assert_eq!(a.allocate(SoundScope::Playback).id(), b.allocate(SoundScope::Wave).id());
    }
}
