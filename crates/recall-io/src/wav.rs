//! WAV export backend and WAV reading.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use hound::{WavReader, WavWriter};
use recall_core::{AudioGeometry, SampleFormat};

use crate::backend::SoundDevice;
use crate::{Error, Result};

/// WAV file metadata extracted without loading sample data.
#[derive(Debug, Clone)]
pub struct WavInfo {
    /// Number of interleaved channels.
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Bit depth per sample.
    pub bits_per_sample: u16,
    /// `true` for IEEE float data.
    pub is_float: bool,
    /// Total number of sample frames (samples per channel).
    pub num_frames: u64,
    /// Duration in seconds.
    pub duration_secs: f64,
}

impl WavInfo {
    fn from_reader<R: std::io::Read>(reader: &WavReader<R>) -> Self {
        let spec = reader.spec();
        let num_frames = u64::from(reader.len()) / u64::from(spec.channels.max(1));
        Self {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            bits_per_sample: spec.bits_per_sample,
            is_float: spec.sample_format == hound::SampleFormat::Float,
            num_frames,
            duration_secs: num_frames as f64 / f64::from(spec.sample_rate),
        }
    }

    /// Closest semantic sample format.
    pub fn format(&self) -> Result<SampleFormat> {
        match (self.is_float, self.bits_per_sample) {
            (true, 32) => Ok(SampleFormat::Float32),
            (true, 64) => Ok(SampleFormat::Float64),
            (false, bits) => Ok(SampleFormat::from_bits(bits as u8)?),
            (true, bits) => Err(Error::UnsupportedFormat(format!("{bits}-bit float"))),
        }
    }
}

/// Read WAV metadata without loading sample data.
pub fn read_wav_info<P: AsRef<Path>>(path: P) -> Result<WavInfo> {
    let reader = WavReader::open(path)?;
    Ok(WavInfo::from_reader(&reader))
}

/// Read a WAV file as interleaved `f32` samples in `[-1, 1)`.
///
/// Channels are kept; callers pick or mix channels themselves.
pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<(Vec<f32>, WavInfo)> {
    let reader = WavReader::open(path)?;
    let info = WavInfo::from_reader(&reader);
    let samples = if info.is_float {
        reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?
    } else {
        let full_scale = f64::from(info.bits_per_sample - 1).exp2();
        reader
            .into_samples::<i32>()
            .map(|s| s.map(|v| (f64::from(v) / full_scale) as f32))
            .collect::<std::result::Result<Vec<_>, _>>()?
    };
    Ok((samples, info))
}

/// WAV header for device buffers of `geometry`.
///
/// WAV has no 64-bit integer encoding and hound writes no 64-bit float, so
/// `Signed64` and `Float64` are refused.
pub fn wav_spec(geometry: &AudioGeometry) -> Result<hound::WavSpec> {
    let format = geometry.format();
    let sample_format = match format {
        SampleFormat::Float32 => hound::SampleFormat::Float,
        SampleFormat::Signed8
        | SampleFormat::Signed16
        | SampleFormat::Signed24
        | SampleFormat::Signed32 => hound::SampleFormat::Int,
        SampleFormat::Signed64 | SampleFormat::Float64 => {
            return Err(Error::UnsupportedFormat(format!("{format} in WAV")));
        }
    };
    Ok(hound::WavSpec {
        channels: geometry.pcm_channels(),
        sample_rate: geometry.samplerate(),
        bits_per_sample: u16::from(format.bits()),
        sample_format,
    })
}

/// Writes every device buffer to a WAV file.
///
/// Samples are quantized to the geometry's format at the device edge:
/// integer formats round to the nearest step and clip.
pub struct WavDevice {
    path: PathBuf,
    writer: Option<WavWriter<BufWriter<File>>>,
    format: SampleFormat,
    frames: u64,
    pcm_channels: u16,
}

impl WavDevice {
    /// Creates a device writing to `path` once opened.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
            format: SampleFormat::default(),
            frames: 0,
            pcm_channels: 1,
        }
    }

    /// Output path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Frames written so far.
    pub fn frames_written(&self) -> u64 {
        self.frames
    }
}

impl std::fmt::Debug for WavDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WavDevice")
            .field("path", &self.path)
            .field("format", &self.format)
            .field("frames", &self.frames)
            .field("open", &self.writer.is_some())
            .finish()
    }
}

impl SoundDevice for WavDevice {
    fn name(&self) -> &str {
        "wav"
    }

    fn open(&mut self, geometry: &AudioGeometry) -> Result<()> {
        let spec = wav_spec(geometry)?;
        self.writer = Some(WavWriter::create(&self.path, spec)?);
        self.format = geometry.format();
        self.pcm_channels = geometry.pcm_channels();
        self.frames = 0;
        tracing::debug!(
            path = %self.path.display(),
            format = %self.format,
            channels = spec.channels,
            "wav device opened"
        );
        Ok(())
    }

    fn write(&mut self, interleaved: &[f32]) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| Error::Stream("wav device is not open".into()))?;
        if self.format.is_float() {
            for &sample in interleaved {
                writer.write_sample(sample)?;
            }
        } else {
            let scale = self.format.full_scale();
            for &sample in interleaved {
                let q = (f64::from(sample) * scale).round().clamp(-scale, scale - 1.0);
                writer.write_sample(q as i32)?;
            }
        }
        self.frames += (interleaved.len() / usize::from(self.pcm_channels)) as u64;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
            tracing::debug!(path = %self.path.display(), frames = self.frames, "wav device closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn geometry(format: SampleFormat) -> AudioGeometry {
        AudioGeometry::new(8000, 4, 2, format).unwrap()
    }

    #[test]
    fn writes_quantized_pcm() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let mut device = WavDevice::new(&path);
        device.open(&geometry(SampleFormat::Signed16)).unwrap();
        device
            .write(&[0.5, -0.5, 1.0, -1.0, 0.0, 0.25, 2.0, -2.0])
            .unwrap();
        assert_eq!(device.frames_written(), 4);
        device.close().unwrap();

        let (samples, info) = read_wav(&path).unwrap();
        assert_eq!(info.channels, 2);
        assert_eq!(info.sample_rate, 8000);
        assert_eq!(info.bits_per_sample, 16);
        assert_eq!(info.num_frames, 4);
        assert_eq!(info.format().unwrap(), SampleFormat::Signed16);
        // full scale clips to the largest positive step
        let top = 32767.0 / 32768.0;
        assert_eq!(samples, vec![0.5, -0.5, top, -1.0, 0.0, 0.25, top, -1.0]);
    }

    #[test]
    fn writes_float_verbatim() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("float.wav");
        let mut device = WavDevice::new(&path);
        device.open(&geometry(SampleFormat::Float32)).unwrap();
        device.write(&[0.123, -0.456]).unwrap();
        device.close().unwrap();
        device.close().unwrap();

        let (samples, info) = read_wav(&path).unwrap();
        assert!(info.is_float);
        assert_eq!(samples, vec![0.123, -0.456]);
    }

    #[test]
    fn refuses_64_bit_formats() {
        assert!(matches!(
            wav_spec(&geometry(SampleFormat::Signed64)),
            Err(Error::UnsupportedFormat(_))
        ));
        assert!(wav_spec(&geometry(SampleFormat::Float64)).is_err());
        assert_eq!(wav_spec(&geometry(SampleFormat::Signed24)).unwrap().bits_per_sample, 24);
    }

    #[test]
    fn write_before_open_fails() {
        let mut device = WavDevice::new("never.wav");
        assert!(device.write(&[0.0]).is_err());
    }

    #[test]
    fn info_reports_duration() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dur.wav");
        let mut device = WavDevice::new(&path);
        device.open(&geometry(SampleFormat::Signed8)).unwrap();
        device.write(&vec![0.0; 8000 * 2]).unwrap();
        device.close().unwrap();
        let info = read_wav_info(&path).unwrap();
        assert_eq!(info.num_frames, 8000);
        assert!((info.duration_secs - 1.0).abs() < 1e-9);
    }
}
