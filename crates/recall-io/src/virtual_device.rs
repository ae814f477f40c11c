//! Null sink with optional capture.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use recall_core::AudioGeometry;

use crate::backend::SoundDevice;
use crate::{Error, Result};

/// Buffers written to a capturing [`VirtualDevice`], oldest first.
pub type Capture = Arc<Mutex<Vec<Vec<f32>>>>;

/// Device without hardware.
///
/// Discards every buffer unless a [`Capture`] is attached. When run by a
/// driver thread it sleeps one buffer period per write, or the fixed
/// interval set with [`with_pacing`](Self::with_pacing).
#[derive(Debug, Default)]
pub struct VirtualDevice {
    capture: Option<Capture>,
    pacing: Option<Duration>,
    fail_after: Option<u64>,
    written: u64,
    open: bool,
}

impl VirtualDevice {
    /// Creates a discarding device.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a device that records every buffer, plus the shared record.
    pub fn capturing() -> (Self, Capture) {
        let capture = Capture::default();
        let device = Self {
            capture: Some(Arc::clone(&capture)),
            ..Self::default()
        };
        (device, capture)
    }

    /// Replaces the buffer-period sleep with a fixed interval.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = Some(pacing);
        self
    }

    /// Fails every write after `buffers` successful ones.
    ///
    /// Used to exercise driver fault handling.
    pub fn fail_after(mut self, buffers: u64) -> Self {
        self.fail_after = Some(buffers);
        self
    }

    /// Buffers accepted so far.
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl SoundDevice for VirtualDevice {
    fn name(&self) -> &str {
        "virtual"
    }

    fn open(&mut self, _geometry: &AudioGeometry) -> Result<()> {
        self.open = true;
        Ok(())
    }

    fn write(&mut self, interleaved: &[f32]) -> Result<()> {
        if !self.open {
            return Err(Error::Stream("virtual device is not open".into()));
        }
        if self.fail_after.is_some_and(|limit| self.written >= limit) {
            return Err(Error::Stream(format!(
                "virtual device failed after {} buffers",
                self.written
            )));
        }
        if let Some(capture) = &self.capture {
            capture.lock().push(interleaved.to_vec());
        }
        self.written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }

    fn pacing(&self, geometry: &AudioGeometry) -> Option<Duration> {
        Some(self.pacing.unwrap_or_else(|| geometry.buffer_period()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_written_buffers() {
        let (mut device, capture) = VirtualDevice::capturing();
        device.open(&AudioGeometry::default()).unwrap();
        device.write(&[0.5, -0.5]).unwrap();
        device.write(&[0.25, 0.0]).unwrap();
        assert_eq!(device.written(), 2);
        assert_eq!(capture.lock().as_slice(), &[vec![0.5, -0.5], vec![0.25, 0.0]]);
    }

    #[test]
    fn write_requires_open() {
        let mut device = VirtualDevice::new();
        assert!(device.write(&[0.0]).is_err());
    }

    #[test]
    fn injected_failure_after_limit() {
        let mut device = VirtualDevice::new().fail_after(1);
        device.open(&AudioGeometry::default()).unwrap();
        assert!(device.write(&[0.0]).is_ok());
        let err = device.write(&[0.0]).unwrap_err();
        assert!(err.to_string().contains("after 1 buffers"));
    }

    #[test]
    fn pacing_defaults_to_buffer_period() {
        let geometry = AudioGeometry::default();
        assert_eq!(
            VirtualDevice::new().pacing(&geometry),
            Some(geometry.buffer_period())
        );
        let fixed = VirtualDevice::new().with_pacing(Duration::from_millis(1));
        assert_eq!(fixed.pacing(&geometry), Some(Duration::from_millis(1)));
    }
}
