//! Pluggable device backend abstraction.
//!
//! A [`SoundDevice`] is the sink end of a driver: it receives one interleaved
//! buffer per cycle, already copied out of the device ring, and delivers it
//! somewhere (a sound card, a file, nowhere). Backends never see the ring or
//! the clock; the [`DeviceDriver`](crate::DeviceDriver) owns both.
//!
//! ```text
//!  scheduler / workers           driver thread
//!  ───────────────────           ─────────────────────────────
//!  mix into ring.next()  ──►  copy ring.front() ─► SoundDevice::write
//!                             complete_buffer(), notify listener
//! ```
//!
//! The trait is object-safe so the driver can hold a `Box<dyn SoundDevice>`
//! chosen at runtime from configuration.

use std::time::Duration;

use recall_core::AudioGeometry;

use crate::Result;

/// Sink for device buffers.
///
/// Lifecycle: [`open`](Self::open) once, [`write`](Self::write) per buffer,
/// [`close`](Self::close) once. `close` must be idempotent.
pub trait SoundDevice: Send {
    /// Human-readable backend name (e.g. "virtual", "wav", "cpal").
    fn name(&self) -> &str;

    /// Prepares the backend for buffers of `geometry`.
    fn open(&mut self, geometry: &AudioGeometry) -> Result<()>;

    /// Delivers one interleaved buffer of `buffer_size * pcm_channels` samples.
    fn write(&mut self, interleaved: &[f32]) -> Result<()>;

    /// Flushes and releases the backend.
    fn close(&mut self) -> Result<()>;

    /// Time the driver thread waits after each buffer.
    ///
    /// `None` means [`write`](Self::write) itself blocks until the hardware
    /// has room, which paces the driver. Backends without a hardware clock
    /// return the buffer period.
    fn pacing(&self, geometry: &AudioGeometry) -> Option<Duration> {
        Some(geometry.buffer_period())
    }
}
