//! Device drivers for the recall rendering core.
//!
//! This crate provides:
//!
//! - **Backends**: the [`SoundDevice`] trait with a null sink
//!   ([`VirtualDevice`]), WAV export ([`WavDevice`]) and live output through
//!   cpal ([`CpalDevice`])
//! - **Drivers**: [`DeviceDriver`] consumes the front slot of a device's
//!   buffer ring, hands it to a backend and ticks musical time
//! - **WAV helpers**: [`read_wav`] and [`read_wav_info`] for loading signals
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use recall_io::{DeviceDriver, WavDevice};
//!
//! let state = context.device_state()?.into_shared();
//! let driver = Arc::new(DeviceDriver::new(
//!     Box::new(WavDevice::new("out.wav")),
//!     *context.geometry(),
//!     state,
//! ));
//! driver.open()?;
//! loop {
//!     scheduler.tick();
//!     driver.step()?;
//! }
//! ```

mod backend;
mod cpal_device;
mod driver;
mod virtual_device;
mod wav;

pub use backend::SoundDevice;
pub use cpal_device::{CpalDevice, OutputDevice, default_output_device, list_output_devices};
pub use driver::{DeviceDriver, DriverPhase};
pub use virtual_device::{Capture, VirtualDevice};
pub use wav::{WavDevice, WavInfo, read_wav, read_wav_info, wav_spec};

use recall_core::ErrorKind;

/// Error types for device I/O.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// WAV file read/write error.
    #[error("WAV file error: {0}")]
    Wav(#[from] hound::Error),

    /// Audio stream setup or runtime error.
    #[error("Audio stream error: {0}")]
    Stream(String),

    /// No audio device available on the system.
    #[error("No audio device available")]
    NoDevice,

    /// The requested sample format is not supported by the backend.
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    /// The requested audio device was not found.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// The driver is not running.
    #[error("Driver {0} is stopped")]
    Stopped(String),

    /// Invalid geometry or timing handed to a driver.
    #[error(transparent)]
    Core(#[from] recall_core::Error),

    /// Standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns the class of this error.
    ///
    /// Everything raised by a backend is a device failure; wrapped core
    /// errors keep their own class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Core(e) => e.kind(),
            _ => ErrorKind::Device,
        }
    }
}

impl From<Error> for recall_core::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Core(inner) => inner,
            other => recall_core::Error::Device(other.to_string()),
        }
    }
}

/// Convenience result type for device I/O.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_errors_are_device_errors() {
        assert_eq!(Error::NoDevice.kind(), ErrorKind::Device);
        assert_eq!(Error::Stream("xrun".into()).kind(), ErrorKind::Device);
        assert_eq!(
            Error::Core(recall_core::Error::InvalidBufferSize(0)).kind(),
            ErrorKind::Configuration
        );
    }

    #[test]
    fn converts_into_core_device_error() {
        let core: recall_core::Error = Error::DeviceNotFound("usb".into()).into();
        assert_eq!(core.kind(), ErrorKind::Device);
        assert!(core.to_string().contains("usb"));
    }
}
