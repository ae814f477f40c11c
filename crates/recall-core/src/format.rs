//! Sample formats and validated audio geometry.
//!
//! Samples travel through the core as `f32` in the nominal range
//! `[-1.0, 1.0]`. [`SampleFormat`] names the semantic format a device
//! quantizes to at its edge; it also fixes the resolution used by
//! [`AudioSignal::scale_resolution`](crate::AudioSignal::scale_resolution).

use crate::error::{Error, Result};

/// Largest accepted buffer size in frames.
pub const MAX_BUFFER_SIZE: usize = 65536;

/// Largest accepted samplerate in Hz.
pub const MAX_SAMPLERATE: u32 = 384_000;

/// Default samplerate in Hz.
pub const DEFAULT_SAMPLERATE: u32 = 44100;

/// Default buffer size in frames.
pub const DEFAULT_BUFFER_SIZE: usize = 512;

/// Default interleaved PCM channel count.
pub const DEFAULT_PCM_CHANNELS: u16 = 2;

/// Semantic sample format of a device or signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SampleFormat {
    /// Signed 8-bit integer.
    Signed8,
    /// Signed 16-bit integer.
    #[default]
    Signed16,
    /// Signed 24-bit integer.
    Signed24,
    /// Signed 32-bit integer.
    Signed32,
    /// Signed 64-bit integer.
    Signed64,
    /// 32-bit float.
    Float32,
    /// 64-bit float.
    Float64,
}

impl SampleFormat {
    /// All formats, narrowest first.
    pub const ALL: [Self; 7] = [
        Self::Signed8,
        Self::Signed16,
        Self::Signed24,
        Self::Signed32,
        Self::Signed64,
        Self::Float32,
        Self::Float64,
    ];

    /// Resolution in bits.
    pub fn bits(self) -> u8 {
        match self {
            Self::Signed8 => 8,
            Self::Signed16 => 16,
            Self::Signed24 => 24,
            Self::Signed32 | Self::Float32 => 32,
            Self::Signed64 | Self::Float64 => 64,
        }
    }

    /// Returns `true` for floating point formats.
    pub fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    /// Integer format with the given resolution.
    pub fn from_bits(bits: u8) -> Result<Self> {
        match bits {
            8 => Ok(Self::Signed8),
            16 => Ok(Self::Signed16),
            24 => Ok(Self::Signed24),
            32 => Ok(Self::Signed32),
            64 => Ok(Self::Signed64),
            other => Err(Error::UnsupportedResolution(other)),
        }
    }

    /// Full-scale value of an integer format, `2^(bits - 1)`.
    ///
    /// Float formats return `1.0`.
    pub fn full_scale(self) -> f64 {
        if self.is_float() {
            1.0
        } else {
            f64::from(self.bits() - 1).exp2()
        }
    }

    /// Quantizes a nominal sample onto this format's grid.
    ///
    /// Integer formats round to the nearest step and clip to the
    /// representable range. `Float32` is the identity; `Float64` is the
    /// identity as well since samples are stored as `f32`.
    pub fn quantize(self, sample: f32) -> f32 {
        if self.is_float() {
            return sample;
        }
        let scale = self.full_scale();
        let q = (f64::from(sample) * scale)
            .round()
            .clamp(-scale, scale - 1.0);
        (q / scale) as f32
    }

    /// Lowercase name used in configuration files.
    pub fn name(self) -> &'static str {
        match self {
            Self::Signed8 => "s8",
            Self::Signed16 => "s16",
            Self::Signed24 => "s24",
            Self::Signed32 => "s32",
            Self::Signed64 => "s64",
            Self::Float32 => "f32",
            Self::Float64 => "f64",
        }
    }

    /// Parses a name produced by [`name`](Self::name).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }
}

impl core::fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Validated device and signal geometry.
///
/// Construction fails fast: an `AudioGeometry` value always holds a legal
/// samplerate, buffer size and channel count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioGeometry {
    samplerate: u32,
    buffer_size: usize,
    pcm_channels: u16,
    format: SampleFormat,
}

impl AudioGeometry {
    /// Validates and builds a geometry.
    pub fn new(
        samplerate: u32,
        buffer_size: usize,
        pcm_channels: u16,
        format: SampleFormat,
    ) -> Result<Self> {
        validate_samplerate(samplerate)?;
        validate_buffer_size(buffer_size)?;
        if pcm_channels == 0 {
            return Err(Error::InvalidChannels(pcm_channels));
        }
        Ok(Self {
            samplerate,
            buffer_size,
            pcm_channels,
            format,
        })
    }

    /// Samplerate in Hz.
    pub fn samplerate(&self) -> u32 {
        self.samplerate
    }

    /// Frames per buffer.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Interleaved channel count of device buffers.
    pub fn pcm_channels(&self) -> u16 {
        self.pcm_channels
    }

    /// Semantic sample format.
    pub fn format(&self) -> SampleFormat {
        self.format
    }

    /// Returns a copy with a different buffer size.
    pub fn with_buffer_size(self, buffer_size: usize) -> Result<Self> {
        Self::new(self.samplerate, buffer_size, self.pcm_channels, self.format)
    }

    /// Buffers completed per second.
    pub fn buffers_per_second(&self) -> f64 {
        f64::from(self.samplerate) / self.buffer_size as f64
    }

    /// Scheduler tick frequency in Hz: buffers per second plus `overclock`.
    pub fn tick_frequency(&self, overclock: f64) -> f64 {
        self.buffers_per_second() + overclock
    }

    /// Duration of one buffer period.
    pub fn buffer_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.buffer_size as f64 / f64::from(self.samplerate))
    }
}

impl Default for AudioGeometry {
    fn default() -> Self {
        Self {
            samplerate: DEFAULT_SAMPLERATE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            pcm_channels: DEFAULT_PCM_CHANNELS,
            format: SampleFormat::default(),
        }
    }
}

/// Checks a buffer size against `1..=MAX_BUFFER_SIZE`.
pub fn validate_buffer_size(buffer_size: usize) -> Result<()> {
    if buffer_size == 0 || buffer_size > MAX_BUFFER_SIZE {
        return Err(Error::InvalidBufferSize(buffer_size));
    }
    Ok(())
}

/// Checks a samplerate against `1..=MAX_SAMPLERATE`.
pub fn validate_samplerate(samplerate: u32) -> Result<()> {
    if samplerate == 0 || samplerate > MAX_SAMPLERATE {
        return Err(Error::InvalidSampleRate(samplerate));
    }
    Ok(())
}
