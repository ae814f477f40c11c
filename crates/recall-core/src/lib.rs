//! Recall Core - recall tree, audio signal streams and buffer rings
//!
//! This crate holds the data model of the real-time rendering core: the
//! processing-node tree that drives staged per-tick computation, the audio
//! signal streams those nodes read and write, and the device buffer rings the
//! results land in. Scheduling lives in `recall-engine`, device drivers in
//! `recall-io`.
//!
//! # Core Abstractions
//!
//! ## Recall Tree
//!
//! - [`RecallTree`] - Arena of [`RecallNode`]s addressed by [`NodeId`]
//! - [`RecallKind`] - Per-stage behaviour of a node
//! - [`Stage`] - The fixed stage protocol (resolve, init, per-tick run)
//! - [`RecallFlags`] - Lifecycle and scope flags
//! - [`RecallId`] - Shared execution-context tag of one run in one [`SoundScope`]
//!
//! ## Signals
//!
//! - [`AudioSignal`] - Resizable stream of fixed-size sample buffers with a cursor
//! - [`Recycling`] - One template signal plus per-run instances
//! - [`AudioGeometry`] / [`SampleFormat`] - Validated samplerate, buffer size and format
//!
//! ## Devices
//!
//! - [`BufferRing`] - Fixed rotation of interleaved device buffers
//! - [`TimingTables`] / [`TicClock`] - Delay/attack tables and musical position
//! - [`DeviceState`] - Ring plus clock behind a per-device recursive mutex
//! - [`OffsetListener`] / [`DriverControl`] - Seams between drivers and the scheduler
//!
//! ## Parameters
//!
//! - [`Port`] - Serialized parameter cell with optional unit [`Conversion`]
//!
//! # Example
//!
//! ```rust
//! use recall_core::{
//!     AudioGeometry, AudioSignal, Recycling, RecallIdAllocator, SampleFormat, SoundScope,
//! };
//!
//! let geometry = AudioGeometry::new(44100, 4, 1, SampleFormat::Float32)?;
//! let mut recycling = Recycling::new(0, AudioSignal::from_samples(&geometry, &[0.1, 0.2, 0.3]));
//!
//! let ids = RecallIdAllocator::new();
//! let run = ids.allocate(SoundScope::Playback);
//! let signal = recycling.instantiate(&run, 10);
//! assert_eq!(signal.lock().frame_count(), 10);
//! # Ok::<(), recall_core::Error>(())
//! ```

pub mod device;
pub mod error;
pub mod format;
pub mod kinds;
pub mod node;
pub mod param;
pub mod recall_id;
pub mod recycling;
pub mod ring;
pub mod stream;

pub use device::{DeviceState, DriverControl, OffsetListener, SharedDeviceState};
pub use error::{Error, ErrorKind, Result};
pub use format::{
    AudioGeometry, DEFAULT_BUFFER_SIZE, DEFAULT_PCM_CHANNELS, DEFAULT_SAMPLERATE, MAX_BUFFER_SIZE,
    MAX_SAMPLERATE, SampleFormat,
};
pub use kinds::{BeatCounter, Container, Fill, Tap, SignalMixer, StreamPlayer};
pub use node::{
    NodeId, NodeState, RecallFlags, RecallKind, RecallNode, RecallTree, Stage, StageContext,
    TreeEvent,
};
pub use param::{Conversion, Decibel, Linear, Port, SharedPort};
pub use recall_id::{RecallId, RecallIdAllocator, SharedRecallId, SoundScope};
pub use recycling::{Recycling, SharedRecycling, SharedSignal};
pub use ring::{
    BufferRing, DEFAULT_BPM, DEFAULT_DELAY_FACTOR, DEFAULT_PERIOD, DEFAULT_RING_SLOTS, TicClock,
    TimingKey, TimingTables, format_uptime,
};
pub use stream::AudioSignal;
