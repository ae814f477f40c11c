//! Shared helpers: configuration loading, engine overrides and the demo run
//! tree played by `render` and `play`.

use std::f64::consts::TAU;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Args;
use recall_config::{EngineConfig, default_config_path};
use recall_core::{
    AudioGeometry, AudioSignal, Container, Decibel, Fill, NodeId, Port, RecallFlags, RecallTree,
    Recycling, SampleFormat, SharedDeviceState, SharedRecycling, StreamPlayer,
};
use recall_io::read_wav;

/// Loads `path`, or the user config when it exists, or the defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(EngineConfig::load_or_default(default_config_path())?),
    }
}

fn parse_format(s: &str) -> Result<SampleFormat, String> {
    SampleFormat::from_name(s).ok_or_else(|| {
        format!("unknown sample format '{s}' (expected s8, s16, s24, s32, s64, f32 or f64)")
    })
}

/// Command-line overrides of engine configuration fields.
#[derive(Args, Debug, Clone, Default)]
pub struct EngineOverrides {
    /// Samplerate in Hz
    #[arg(long)]
    pub samplerate: Option<u32>,

    /// Frames per device buffer
    #[arg(long)]
    pub buffer_size: Option<usize>,

    /// Interleaved output channels
    #[arg(long)]
    pub channels: Option<u16>,

    /// Sample format (s8, s16, s24, s32, f32)
    #[arg(long, value_parser = parse_format)]
    pub format: Option<SampleFormat>,

    /// Tempo in beats per minute
    #[arg(long)]
    pub bpm: Option<f64>,

    /// Note-offset rate scale
    #[arg(long)]
    pub delay_factor: Option<f64>,

    /// Run each member on its own worker thread
    #[arg(long)]
    pub super_threaded: bool,
}

impl EngineOverrides {
    /// Writes every given override into `config`.
    pub fn apply(&self, config: &mut EngineConfig) {
        if let Some(samplerate) = self.samplerate {
            config.samplerate = samplerate;
        }
        if let Some(buffer_size) = self.buffer_size {
            config.buffer_size = buffer_size;
        }
        if let Some(channels) = self.channels {
            config.pcm_channels = channels;
        }
        if let Some(format) = self.format {
            config.format = format;
        }
        if let Some(bpm) = self.bpm {
            config.bpm = bpm;
        }
        if let Some(delay_factor) = self.delay_factor {
            config.delay_factor = delay_factor;
        }
        if self.super_threaded {
            config.super_threaded = true;
        }
    }
}

/// What the demo run plays.
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// WAV file to play instead of a test tone
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Test tone frequency in Hz
    #[arg(long, default_value = "440")]
    pub frequency: f64,

    /// Length in seconds; an input file is looped to fill it
    #[arg(short, long)]
    pub seconds: Option<f64>,

    /// Playback gain in dB
    #[arg(long, default_value = "-6", allow_hyphen_values = true)]
    pub gain_db: f64,
}

/// Template tree of the demo run: a container finishing once every
/// per-channel player finished.
pub struct DemoRun {
    /// Tree holding the templates.
    pub tree: RecallTree,
    /// Template root to start.
    pub root: NodeId,
    /// One recycling per output channel.
    pub recyclings: Vec<SharedRecycling>,
    /// Frames the longest player will play.
    pub frames: usize,
}

impl DemoRun {
    /// Device buffers needed to play every frame.
    pub fn buffers(&self, geometry: &AudioGeometry) -> usize {
        self.frames.div_ceil(geometry.buffer_size())
    }
}

const DEFAULT_SECONDS: f64 = 2.0;

/// Builds the demo run for `geometry`, playing into `device`.
pub fn demo_run(
    source: &SourceArgs,
    geometry: &AudioGeometry,
    device: &SharedDeviceState,
) -> anyhow::Result<DemoRun> {
    let samplerate = f64::from(geometry.samplerate());
    let channels = usize::from(geometry.pcm_channels());
    if let Some(seconds) = source.seconds
        && !(seconds.is_finite() && seconds > 0.0)
    {
        bail!("--seconds must be a positive number, got {seconds}");
    }

    let (per_channel, fill) = match &source.input {
        Some(path) => {
            let (samples, info) =
                read_wav(path).with_context(|| format!("reading {}", path.display()))?;
            if info.sample_rate != geometry.samplerate() {
                tracing::warn!(
                    file_rate = info.sample_rate,
                    engine_rate = geometry.samplerate(),
                    "input samplerate differs from the engine; playing without resampling"
                );
            }
            let file_channels = usize::from(info.channels.max(1));
            let per_channel: Vec<Vec<f32>> = (0..channels)
                .map(|c| {
                    samples
                        .iter()
                        .skip(c % file_channels)
                        .step_by(file_channels)
                        .copied()
                        .collect()
                })
                .collect();
            let fill = match source.seconds {
                Some(seconds) => Fill::Frames((seconds * samplerate).round() as usize),
                None => Fill::Copy,
            };
            (per_channel, fill)
        }
        None => {
            let seconds = source.seconds.unwrap_or(DEFAULT_SECONDS);
            let frames = (seconds * samplerate).round() as usize;
            let step = TAU * source.frequency / samplerate;
            let tone: Vec<f32> = (0..frames).map(|n| (step * n as f64).sin() as f32).collect();
            (vec![tone; channels], Fill::Copy)
        }
    };
    if per_channel.iter().all(Vec::is_empty) {
        bail!("nothing to play: the source has no samples");
    }

    let gain = Port::with_conversion("gain", 1.0, Decibel::default()).into_shared();
    gain.safe_write(source.gain_db);

    let mut tree = RecallTree::new();
    let root = tree.add_template(Box::new(Container), RecallFlags::PROPAGATE_DONE);
    let mut recyclings = Vec::with_capacity(channels);
    let mut frames = 0;
    for (channel, samples) in per_channel.iter().enumerate() {
        frames = frames.max(match fill {
            Fill::Copy => samples.len(),
            Fill::Frames(n) => n,
        });
        let recycling =
            Recycling::new(channel as u16, AudioSignal::from_samples(geometry, samples))
                .into_shared();
        let player = tree.add_template(
            Box::new(StreamPlayer::new(
                Arc::clone(&recycling),
                Arc::clone(device),
                Arc::clone(&gain),
                fill,
            )),
            RecallFlags::NONE,
        );
        tree.add_child(root, player)?;
        recyclings.push(recycling);
    }

    Ok(DemoRun {
        tree,
        root,
        recyclings,
        frames,
    })
}
