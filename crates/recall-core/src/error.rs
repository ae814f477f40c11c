//! Error taxonomy for the rendering core.
//!
//! Every failure belongs to one of four classes, exposed through
//! [`Error::kind`]:
//!
//! - [`ErrorKind::Configuration`]: invalid audio geometry or timing parameters.
//!   Reported synchronously at setup; nothing starts.
//! - [`ErrorKind::Device`]: a backend failed to open, write or close.
//!   Recovered by stopping the affected driver.
//! - [`ErrorKind::Consistency`]: a structural request that would break a tree or
//!   stream invariant. Refused; state is left untouched.
//! - [`ErrorKind::Concurrency`]: a stage dispatched to a node that must not be
//!   staged. A programming error; asserted in debug builds.

use crate::node::NodeId;

/// Classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid buffer size, samplerate, format or timing parameter.
    Configuration,
    /// Device backend failure.
    Device,
    /// Tree or stream invariant violation.
    Consistency,
    /// Illegal stage dispatch.
    Concurrency,
}

/// Errors raised by the rendering core.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Buffer size outside `1..=MAX_BUFFER_SIZE`.
    #[error("invalid buffer size {0} (expected 1..={max})", max = crate::format::MAX_BUFFER_SIZE)]
    InvalidBufferSize(usize),

    /// Samplerate outside `1..=MAX_SAMPLERATE`.
    #[error("invalid samplerate {0} Hz (expected 1..={max})", max = crate::format::MAX_SAMPLERATE)]
    InvalidSampleRate(u32),

    /// PCM channel count of zero.
    #[error("invalid channel count {0}")]
    InvalidChannels(u16),

    /// Sample resolution that no [`SampleFormat`](crate::SampleFormat) covers.
    #[error("unsupported resolution {0} bit")]
    UnsupportedResolution(u8),

    /// Tempo must be finite and positive.
    #[error("invalid bpm {0}")]
    InvalidBpm(f64),

    /// Delay factor must be finite and positive.
    #[error("invalid delay factor {0}")]
    InvalidDelayFactor(f64),

    /// A buffer ring needs at least two slots.
    #[error("invalid ring slot count {0} (expected at least 2)")]
    InvalidRingSlots(usize),

    /// Checked resize would truncate the buffer under the cursor.
    #[error("resize to {requested} buffers would drop the cursor (needs {required})")]
    ResizeBelowCursor {
        /// Requested length.
        requested: usize,
        /// Buffers from head through the cursor.
        required: usize,
    },

    /// The node id does not refer to a live node.
    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    /// Duplication is only defined for template nodes.
    #[error("node {0} is not a template")]
    NotTemplate(NodeId),

    /// Attaching would make a node its own ancestor.
    #[error("cannot attach {child} below {parent}: cycle")]
    InvalidParent {
        /// Node being attached.
        child: NodeId,
        /// Requested parent.
        parent: NodeId,
    },

    /// Templates are configuration, never staged.
    #[error("node {0} is a template and cannot be staged")]
    StagedTemplate(NodeId),

    /// Staging requires a bound recall id.
    #[error("node {0} has no recall id")]
    Unbound(NodeId),

    /// A device backend failure, carried as text across crate boundaries.
    #[error("device error: {0}")]
    Device(String),
}

impl Error {
    /// Returns the class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidBufferSize(_)
            | Self::InvalidSampleRate(_)
            | Self::InvalidChannels(_)
            | Self::UnsupportedResolution(_)
            | Self::InvalidBpm(_)
            | Self::InvalidDelayFactor(_)
            | Self::InvalidRingSlots(_) => ErrorKind::Configuration,
            Self::ResizeBelowCursor { .. }
            | Self::NodeNotFound(_)
            | Self::NotTemplate(_)
            | Self::InvalidParent { .. } => ErrorKind::Consistency,
            Self::StagedTemplate(_) | Self::Unbound(_) => ErrorKind::Concurrency,
            Self::Device(_) => ErrorKind::Device,
        }
    }
}

/// Convenience result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;
