//! Live output through cpal.

use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded};
use parking_lot::Mutex;
use recall_core::AudioGeometry;

use crate::backend::SoundDevice;
use crate::{Error, Result};

/// Buffers queued between the driver and the cpal callback.
const QUEUE_DEPTH: usize = 2;

/// Extract device name via `description()` (cpal 0.17+).
fn device_name(device: &cpal::Device) -> std::result::Result<String, cpal::DeviceNameError> {
    device.description().map(|d| d.name().to_string())
}

/// Output device information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDevice {
    /// Human-readable device name.
    pub name: String,
    /// Default sample rate in Hz.
    pub default_sample_rate: u32,
    /// Default output channel count.
    pub default_channels: u16,
    /// Whether this is the host's default output.
    pub is_default: bool,
}

/// List the output devices of the default host.
pub fn list_output_devices() -> Result<Vec<OutputDevice>> {
    let host = cpal::default_host();
    let default_name = host
        .default_output_device()
        .and_then(|d| device_name(&d).ok());
    let outputs = host
        .output_devices()
        .map_err(|e| Error::Stream(e.to_string()))?;

    let mut devices = Vec::new();
    for device in outputs {
        let Ok(name) = device_name(&device) else {
            continue;
        };
        let (rate, channels) = device
            .default_output_config()
            .map(|c| (c.sample_rate(), c.channels()))
            .unwrap_or((48000, 2));
        devices.push(OutputDevice {
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
            default_sample_rate: rate,
            default_channels: channels,
        });
    }
    Ok(devices)
}

/// The default output device, if any.
pub fn default_output_device() -> Result<Option<OutputDevice>> {
    Ok(list_output_devices()?.into_iter().find(|d| d.is_default))
}

/// Find a cpal output device by name fragment, or return the default.
fn find_output_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device> {
    match name {
        Some(search) => {
            let search_lower = search.to_lowercase();
            let devices = host
                .output_devices()
                .map_err(|e| Error::Stream(e.to_string()))?;

            for device in devices {
                if let Ok(dev_name) = device_name(&device)
                    && dev_name.to_lowercase().contains(search_lower.as_str())
                {
                    return Ok(device);
                }
            }
            Err(Error::DeviceNotFound(format!(
                "no output device matching '{}'",
                search
            )))
        }
        None => host.default_output_device().ok_or(Error::NoDevice),
    }
}

/// Feeds a cpal output stream.
///
/// [`write`](SoundDevice::write) hands each buffer to the audio callback
/// over a bounded channel and blocks while the channel is full, so the
/// hardware paces the driver. The callback pads underruns with silence and
/// returns drained buffers for reuse.
pub struct CpalDevice {
    device_name: Option<String>,
    stream: Option<cpal::Stream>,
    queue: Option<Sender<Vec<f32>>>,
    spare: Option<Receiver<Vec<f32>>>,
    fault: Arc<Mutex<Option<String>>>,
}

impl CpalDevice {
    /// Uses the host's default output device.
    pub fn new() -> Self {
        Self {
            device_name: None,
            stream: None,
            queue: None,
            spare: None,
            fault: Arc::new(Mutex::new(None)),
        }
    }

    /// Uses the first output device whose name contains `name`.
    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self
    }
}

impl Default for CpalDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CpalDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpalDevice")
            .field("device_name", &self.device_name)
            .field("open", &self.stream.is_some())
            .finish_non_exhaustive()
    }
}

/// Audio-thread side of the queue.
struct Feeder {
    queue: Receiver<Vec<f32>>,
    spare: Sender<Vec<f32>>,
    current: Vec<f32>,
    pos: usize,
}

impl Feeder {
    fn fill(&mut self, data: &mut [f32]) {
        let mut written = 0;
        while written < data.len() {
            if self.pos >= self.current.len() {
                match self.queue.try_recv() {
                    Ok(next) => {
                        let used = std::mem::replace(&mut self.current, next);
                        // full spare queue: the buffer is dropped instead
                        let _ = self.spare.try_send(used);
                        self.pos = 0;
                    }
                    Err(TryRecvError::Empty | TryRecvError::Disconnected) => {
                        data[written..].fill(0.0);
                        return;
                    }
                }
            }
            let n = (self.current.len() - self.pos).min(data.len() - written);
            data[written..written + n].copy_from_slice(&self.current[self.pos..self.pos + n]);
            self.pos += n;
            written += n;
        }
    }
}

impl SoundDevice for CpalDevice {
    fn name(&self) -> &str {
        "cpal"
    }

    fn open(&mut self, geometry: &AudioGeometry) -> Result<()> {
        let host = cpal::default_host();
        let device = find_output_device(&host, self.device_name.as_deref())?;

        let stream_config = cpal::StreamConfig {
            channels: geometry.pcm_channels(),
            sample_rate: geometry.samplerate(),
            buffer_size: cpal::BufferSize::Fixed(geometry.buffer_size() as u32),
        };

        let (queue_tx, queue_rx) = bounded(QUEUE_DEPTH);
        let (spare_tx, spare_rx) = bounded(QUEUE_DEPTH + 1);
        let mut feeder = Feeder {
            queue: queue_rx,
            spare: spare_tx,
            current: Vec::new(),
            pos: 0,
        };
        let fault = Arc::clone(&self.fault);

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    feeder.fill(data);
                },
                move |err| {
                    *fault.lock() = Some(err.to_string());
                },
                None,
            )
            .map_err(|e| Error::Stream(e.to_string()))?;

        stream.play().map_err(|e| Error::Stream(e.to_string()))?;
        tracing::info!(
            host = host.id().name(),
            channels = geometry.pcm_channels(),
            sample_rate = geometry.samplerate(),
            buffer_size = geometry.buffer_size(),
            "output stream started"
        );

        self.stream = Some(stream);
        self.queue = Some(queue_tx);
        self.spare = Some(spare_rx);
        Ok(())
    }

    fn write(&mut self, interleaved: &[f32]) -> Result<()> {
        if let Some(message) = self.fault.lock().take() {
            return Err(Error::Stream(message));
        }
        let (Some(queue), Some(spare)) = (&self.queue, &self.spare) else {
            return Err(Error::Stream("cpal device is not open".into()));
        };
        let mut buffer = spare.try_recv().unwrap_or_default();
        buffer.clear();
        buffer.extend_from_slice(interleaved);
        queue
            .send(buffer)
            .map_err(|_| Error::Stream("output stream closed".into()))
    }

    fn close(&mut self) -> Result<()> {
        self.queue = None;
        self.spare = None;
        if let Some(stream) = self.stream.take() {
            stream.pause().map_err(|e| Error::Stream(e.to_string()))?;
            tracing::info!("output stream stopped");
        }
        Ok(())
    }

    fn pacing(&self, _geometry: &AudioGeometry) -> Option<Duration> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feeder() -> (Feeder, Sender<Vec<f32>>, Receiver<Vec<f32>>) {
        let (queue_tx, queue_rx) = bounded(4);
        let (spare_tx, spare_rx) = bounded(4);
        let feeder = Feeder {
            queue: queue_rx,
            spare: spare_tx,
            current: Vec::new(),
            pos: 0,
        };
        (feeder, queue_tx, spare_rx)
    }

    #[test]
    fn feeder_spans_callback_boundaries() {
        let (mut feeder, queue, spare) = feeder();
        queue.send(vec![1.0, 2.0, 3.0]).unwrap();
        queue.send(vec![4.0, 5.0, 6.0]).unwrap();

        let mut out = [0.0; 4];
        feeder.fill(&mut out);
        assert_eq!(out, [1.0, 2.0, 3.0, 4.0]);
        feeder.fill(&mut out);
        // underrun pads with silence
        assert_eq!(out, [5.0, 6.0, 0.0, 0.0]);
        // drained buffers come back for reuse
        assert_eq!(spare.try_iter().count(), 2);
    }

    #[test]
    fn write_before_open_fails() {
        let mut device = CpalDevice::new();
        assert!(device.write(&[0.0]).is_err());
        assert!(device.close().is_ok());
    }

    #[test]
    fn blocks_instead_of_sleeping() {
        assert_eq!(CpalDevice::new().pacing(&AudioGeometry::default()), None);
    }

    #[test]
    fn list_devices_does_not_panic() {
        // CI machines may have no audio hardware
        let _ = list_output_devices();
    }
}
