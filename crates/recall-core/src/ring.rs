//! Device buffer rings and musical timing.
//!
//! A [`BufferRing`] rotates a fixed number of interleaved device buffers.
//! Exactly one slot, the *front*, is being consumed by the device; producers
//! always accumulate into the slot after it. After the device consumed the
//! front slot it is cleared and the ring advances.
//!
//! [`TimingTables`] hold the per-period delay and attack values that map
//! buffer completions onto musical time (16th notes scaled by a delay
//! factor). [`TicClock`] counts buffer completions against those tables and
//! reports when the note offset moves.
//!
//! # Timing formula
//!
//! ```text
//! delay      = 60 * (samplerate / buffer_size) / bpm * (1/16) * (1/delay_factor)
//! tactFrames = delay * buffer_size
//! attack[0]  = 0
//! attack[i]  = ((i * tactFrames + attack[i-1]) / (period / (delay * i))) mod buffer_size
//! delay[0]   = delay
//! delay[i]   = (tactFrames + attack[i]) / buffer_size
//! ```
//!
//! All arithmetic is `f64`, evaluated in the order written.

use crate::error::{Error, Result};
use crate::format::{validate_buffer_size, validate_samplerate};

/// Default slot count of a buffer ring.
pub const DEFAULT_RING_SLOTS: usize = 4;

/// Length of the delay and attack tables.
pub const DEFAULT_PERIOD: usize = 64;

/// Default tempo in beats per minute.
pub const DEFAULT_BPM: f64 = 120.0;

/// Default delay factor; `0.25` makes one note offset a 16th note.
pub const DEFAULT_DELAY_FACTOR: f64 = 0.25;

/// Fixed rotation of interleaved device buffers.
#[derive(Debug, Clone)]
pub struct BufferRing {
    slots: Vec<Vec<f32>>,
    active: usize,
    pcm_channels: u16,
    buffer_size: usize,
}

impl BufferRing {
    /// Creates a ring of `slots` silent buffers of `pcm_channels * buffer_size`
    /// samples each.
    pub fn new(slots: usize, pcm_channels: u16, buffer_size: usize) -> Result<Self> {
        if slots < 2 {
            return Err(Error::InvalidRingSlots(slots));
        }
        if pcm_channels == 0 {
            return Err(Error::InvalidChannels(pcm_channels));
        }
        validate_buffer_size(buffer_size)?;
        let len = pcm_channels as usize * buffer_size;
        Ok(Self {
            slots: vec![vec![0.0; len]; slots],
            active: 0,
            pcm_channels,
            buffer_size,
        })
    }

    /// Number of slots.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Interleaved channel count.
    pub fn pcm_channels(&self) -> u16 {
        self.pcm_channels
    }

    /// Frames per slot.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Index of the front slot.
    pub fn active(&self) -> usize {
        self.active
    }

    /// Index of the slot producers write to.
    pub fn next_index(&self) -> usize {
        (self.active + 1) % self.slots.len()
    }

    /// The slot currently consumed by the device.
    pub fn front(&self) -> &[f32] {
        &self.slots[self.active]
    }

    /// The producer slot.
    pub fn next(&self) -> &[f32] {
        &self.slots[self.next_index()]
    }

    /// The producer slot, mutably.
    pub fn next_mut(&mut self) -> &mut [f32] {
        let index = self.next_index();
        &mut self.slots[index]
    }

    /// Slot at `index`.
    pub fn slot(&self, index: usize) -> Option<&[f32]> {
        self.slots.get(index).map(Vec::as_slice)
    }

    /// Adds `samples` scaled by `gain` into one channel of the producer slot.
    ///
    /// Extra samples beyond the slot's frame count are ignored; out-of-range
    /// channels are ignored.
    pub fn mix_into_next(&mut self, channel: u16, samples: &[f32], gain: f32) {
        if channel >= self.pcm_channels {
            return;
        }
        let stride = self.pcm_channels as usize;
        let slot = self.next_mut();
        for (frame, sample) in samples.iter().enumerate().take(slot.len() / stride) {
            slot[frame * stride + channel as usize] += sample * gain;
        }
    }

    /// Zeroes the front slot.
    pub fn clear_front(&mut self) {
        let active = self.active;
        self.slots[active].fill(0.0);
    }

    /// Moves the front to the next slot.
    pub fn advance(&mut self) {
        self.active = self.next_index();
    }

    /// Reallocates every slot for a new geometry. All slots become silent.
    pub fn reshape(&mut self, pcm_channels: u16, buffer_size: usize) -> Result<()> {
        if pcm_channels == 0 {
            return Err(Error::InvalidChannels(pcm_channels));
        }
        validate_buffer_size(buffer_size)?;
        let len = pcm_channels as usize * buffer_size;
        for slot in &mut self.slots {
            slot.clear();
            slot.resize(len, 0.0);
        }
        self.pcm_channels = pcm_channels;
        self.buffer_size = buffer_size;
        self.active = 0;
        Ok(())
    }
}

/// Inputs the timing tables are derived from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingKey {
    /// Samplerate in Hz.
    pub samplerate: u32,
    /// Frames per buffer.
    pub buffer_size: usize,
    /// Tempo.
    pub bpm: f64,
    /// Note length scaling.
    pub delay_factor: f64,
}

impl TimingKey {
    /// Checks every field.
    pub fn validate(&self) -> Result<()> {
        validate_samplerate(self.samplerate)?;
        validate_buffer_size(self.buffer_size)?;
        if !self.bpm.is_finite() || self.bpm <= 0.0 {
            return Err(Error::InvalidBpm(self.bpm));
        }
        if !self.delay_factor.is_finite() || self.delay_factor <= 0.0 {
            return Err(Error::InvalidDelayFactor(self.delay_factor));
        }
        Ok(())
    }

    /// Buffers per note offset.
    pub fn delay(&self) -> f64 {
        60.0 * (f64::from(self.samplerate) / self.buffer_size as f64) / self.bpm
            * (1.0 / 16.0)
            * (1.0 / self.delay_factor)
    }

    /// Seconds per note offset, `delay * buffer_size / samplerate` reduced.
    pub fn seconds_per_offset(&self) -> f64 {
        60.0 / self.bpm / 16.0 / self.delay_factor
    }
}

/// Cached delay and attack tables.
#[derive(Debug, Clone, PartialEq)]
pub struct TimingTables {
    key: TimingKey,
    delay: Vec<f64>,
    attack: Vec<f64>,
    recomputed: u64,
}

impl TimingTables {
    /// Validates `key` and computes the tables.
    pub fn new(key: TimingKey) -> Result<Self> {
        key.validate()?;
        let (delay, attack) = compute(&key);
        Ok(Self {
            key,
            delay,
            attack,
            recomputed: 1,
        })
    }

    /// Recomputes the tables if `key` differs from the cached one.
    ///
    /// Returns `true` if the tables changed.
    pub fn update(&mut self, key: TimingKey) -> Result<bool> {
        key.validate()?;
        if key == self.key {
            return Ok(false);
        }
        let (delay, attack) = compute(&key);
        self.key = key;
        self.delay = delay;
        self.attack = attack;
        self.recomputed += 1;
        #[cfg(feature = "tracing")]
        tracing::debug!(
            samplerate = key.samplerate,
            buffer_size = key.buffer_size,
            bpm = key.bpm,
            delay_factor = key.delay_factor,
            "timing tables recomputed"
        );
        Ok(true)
    }

    /// The inputs of the cached tables.
    pub fn key(&self) -> &TimingKey {
        &self.key
    }

    /// Delay table, in buffers.
    pub fn delay(&self) -> &[f64] {
        &self.delay
    }

    /// Attack table, in frames.
    pub fn attack(&self) -> &[f64] {
        &self.attack
    }

    /// Number of times the tables were computed.
    pub fn recomputed(&self) -> u64 {
        self.recomputed
    }
}

fn compute(key: &TimingKey) -> (Vec<f64>, Vec<f64>) {
    let period = DEFAULT_PERIOD as f64;
    let buffer_size = key.buffer_size as f64;
    let delay = key.delay();
    let tact_frames = delay * buffer_size;

    let mut attack = vec![0.0; DEFAULT_PERIOD];
    let mut delays = vec![0.0; DEFAULT_PERIOD];
    delays[0] = delay;
    for i in 1..DEFAULT_PERIOD {
        let fi = i as f64;
        attack[i] = ((fi * tact_frames + attack[i - 1]) / (period / (delay * fi))) % buffer_size;
        delays[i] = (tact_frames + attack[i]) / buffer_size;
    }
    (delays, attack)
}

/// Musical position counter driven by buffer completions.
#[derive(Debug, Clone)]
pub struct TicClock {
    tables: TimingTables,
    tic_counter: usize,
    delay_counter: f64,
    note_offset: u64,
    note_offset_absolute: u64,
    loop_range: Option<(u64, u64)>,
    buffers_completed: u64,
}

impl TicClock {
    /// Creates a clock at offset zero.
    pub fn new(tables: TimingTables) -> Self {
        Self {
            tables,
            tic_counter: 0,
            delay_counter: 0.0,
            note_offset: 0,
            note_offset_absolute: 0,
            loop_range: None,
            buffers_completed: 0,
        }
    }

    /// Counts one completed buffer.
    ///
    /// Returns `true` when the note offset advanced.
    pub fn tic(&mut self) -> bool {
        self.buffers_completed += 1;
        self.tic_counter = (self.tic_counter + 1) % DEFAULT_PERIOD;
        self.delay_counter += 1.0;
        if self.delay_counter < self.tables.delay[self.tic_counter] {
            return false;
        }
        self.delay_counter = 0.0;
        self.note_offset = match self.loop_range {
            Some((left, right)) if self.note_offset + 1 >= right => left,
            _ => self.note_offset + 1,
        };
        self.note_offset_absolute += 1;
        true
    }

    /// Current note offset, wrapped by the loop range.
    pub fn note_offset(&self) -> u64 {
        self.note_offset
    }

    /// Note offsets elapsed since start, never wrapped.
    pub fn note_offset_absolute(&self) -> u64 {
        self.note_offset_absolute
    }

    /// Position within the table period.
    pub fn tic_counter(&self) -> usize {
        self.tic_counter
    }

    /// Buffers counted since start.
    pub fn buffers_completed(&self) -> u64 {
        self.buffers_completed
    }

    /// Moves the note offset. The absolute offset is untouched.
    pub fn seek(&mut self, note_offset: u64) {
        self.note_offset = note_offset;
        self.delay_counter = 0.0;
    }

    /// Sets or clears the loop range `[left, right)`.
    ///
    /// Empty ranges clear the loop.
    pub fn set_loop(&mut self, range: Option<(u64, u64)>) {
        self.loop_range = range.filter(|(l, r)| l < r);
    }

    /// Active loop range.
    pub fn loop_range(&self) -> Option<(u64, u64)> {
        self.loop_range
    }

    /// Timing tables in use.
    pub fn tables(&self) -> &TimingTables {
        &self.tables
    }

    /// Updates the timing inputs, recomputing the tables only on change.
    pub fn retime(&mut self, key: TimingKey) -> Result<bool> {
        self.tables.update(key)
    }

    /// Resets every counter to zero. Tables and loop range are kept.
    pub fn reset(&mut self) {
        self.tic_counter = 0;
        self.delay_counter = 0.0;
        self.note_offset = 0;
        self.note_offset_absolute = 0;
        self.buffers_completed = 0;
    }

    /// Time elapsed since start, from the absolute note offset.
    pub fn uptime(&self) -> std::time::Duration {
        let seconds = self.note_offset_absolute as f64 * self.tables.key.seconds_per_offset();
        std::time::Duration::from_secs_f64(seconds)
    }
}

/// Formats a duration as `MM:SS.mmm`.
pub fn format_uptime(uptime: std::time::Duration) -> String {
    let millis = uptime.as_millis();
    format!(
        "{:02}:{:02}.{:03}",
        millis / 60_000,
        (millis / 1000) % 60,
        millis % 1000
    )
}
