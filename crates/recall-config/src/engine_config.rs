//! Engine configuration file format.

use std::path::{Path, PathBuf};

use recall_core::format::{validate_buffer_size, validate_samplerate};
use recall_core::{
    AudioGeometry, DEFAULT_BPM, DEFAULT_BUFFER_SIZE, DEFAULT_DELAY_FACTOR, DEFAULT_PCM_CHANNELS,
    DEFAULT_RING_SLOTS, DEFAULT_SAMPLERATE, SampleFormat, TimingKey,
};
use recall_engine::AudioContext;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::validation::{ValidationError, non_negative, positive};

/// Backend a device driver writes to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Null sink paced by a timer.
    #[default]
    Virtual,
    /// WAV file export.
    Wav,
    /// Live output through the host audio API.
    Cpal,
}

impl DeviceKind {
    /// Lowercase name used in configuration files.
    pub fn name(self) -> &'static str {
        match self {
            Self::Virtual => "virtual",
            Self::Wav => "wav",
            Self::Cpal => "cpal",
        }
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Audio geometry, timing and device settings of one engine.
///
/// Missing fields take their defaults, so an empty file is a valid
/// configuration.
///
/// # TOML Format
///
/// ```toml
/// samplerate = 44100
/// buffer_size = 512
/// pcm_channels = 2
/// format = "s16"
/// ring_slots = 4
/// bpm = 120.0
/// delay_factor = 0.25
/// overclock = 0.0
/// time_accounting = true
/// super_threaded = false
/// device = "wav"
/// output = "render.wav"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Samplerate in Hz.
    pub samplerate: u32,
    /// Frames per device buffer.
    pub buffer_size: usize,
    /// Interleaved device channels.
    pub pcm_channels: u16,
    /// Sample format at the device edge.
    #[serde(with = "format_name")]
    pub format: SampleFormat,
    /// Buffers in each device ring.
    pub ring_slots: usize,
    /// Tempo in beats per minute.
    pub bpm: f64,
    /// Scales the note-offset rate.
    pub delay_factor: f64,
    /// Extra scheduler ticks per second beyond the buffer rate.
    pub overclock: f64,
    /// Pad every scheduler tick to the tick period.
    pub time_accounting: bool,
    /// Run each member on its own worker thread by default.
    pub super_threaded: bool,
    /// Backend of the output device.
    pub device: DeviceKind,
    /// Output device name fragment for the cpal backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    /// Output file for the WAV backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            samplerate: DEFAULT_SAMPLERATE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            pcm_channels: DEFAULT_PCM_CHANNELS,
            format: SampleFormat::default(),
            ring_slots: DEFAULT_RING_SLOTS,
            bpm: DEFAULT_BPM,
            delay_factor: DEFAULT_DELAY_FACTOR,
            overclock: 0.0,
            time_accounting: true,
            super_threaded: false,
            device: DeviceKind::default(),
            device_name: None,
            output: None,
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Self::from_toml(&content)
    }

    /// Loads `path`, or the defaults when no file exists there.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.is_file() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load a configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Convert the configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save the configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }

        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        Ok(())
    }

    /// Checks every field; reports the first unusable one.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_samplerate(self.samplerate)
            .map_err(|e| ValidationError::from_core("samplerate", &e))?;
        validate_buffer_size(self.buffer_size)
            .map_err(|e| ValidationError::from_core("buffer_size", &e))?;
        if self.pcm_channels == 0 {
            return Err(ValidationError::new("pcm_channels", "must be at least 1"));
        }
        if self.ring_slots < 2 {
            return Err(ValidationError::new("ring_slots", "must be at least 2"));
        }
        positive("bpm", self.bpm)?;
        positive("delay_factor", self.delay_factor)?;
        non_negative("overclock", self.overclock)?;
        if self.device == DeviceKind::Wav
            && matches!(self.format, SampleFormat::Signed64 | SampleFormat::Float64)
        {
            return Err(ValidationError::new(
                "format",
                format!("{} cannot be written to WAV", self.format),
            ));
        }
        Ok(())
    }

    /// Validated device geometry.
    pub fn to_geometry(&self) -> Result<AudioGeometry, ConfigError> {
        self.validate()?;
        AudioGeometry::new(self.samplerate, self.buffer_size, self.pcm_channels, self.format)
            .map_err(|e| ValidationError::from_core("geometry", &e).into())
    }

    /// Timing inputs of the device clock.
    pub fn timing_key(&self) -> TimingKey {
        TimingKey {
            samplerate: self.samplerate,
            buffer_size: self.buffer_size,
            bpm: self.bpm,
            delay_factor: self.delay_factor,
        }
    }

    /// Builds an engine context from the validated configuration.
    pub fn to_context(&self) -> Result<AudioContext, ConfigError> {
        let context = AudioContext::new(self.to_geometry()?)
            .with_bpm(self.bpm)?
            .with_delay_factor(self.delay_factor)?
            .with_ring_slots(self.ring_slots)?
            .with_overclock(self.overclock)
            .with_time_accounting(self.time_accounting)
            .with_super_threaded(self.super_threaded);
        Ok(context)
    }
}

/// Serializes [`SampleFormat`] by its configuration name.
mod format_name {
    use recall_core::SampleFormat;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(format: &SampleFormat, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(format.name())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SampleFormat, D::Error> {
        let name = String::deserialize(deserializer)?;
        SampleFormat::from_name(&name).ok_or_else(|| {
            D::Error::custom(format!(
                "unknown sample format '{name}' (expected one of s8, s16, s24, s32, s64, f32, f64)"
            ))
        })
    }
}
