//! Scheduler errors.

use recall_core::ErrorKind;

use crate::member::MemberId;

/// Errors raised by the scheduler and its workers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A core operation failed.
    #[error(transparent)]
    Core(#[from] recall_core::Error),

    /// No active member has this id.
    #[error("member {0} not found")]
    MemberNotFound(MemberId),

    /// A scheduler or worker thread could not be started.
    #[error("failed to spawn thread '{name}': {source}")]
    Spawn {
        /// Thread name.
        name: String,
        /// OS error.
        #[source]
        source: std::io::Error,
    },

    /// The scheduler dropped its command queue.
    #[error("scheduler is gone")]
    Disconnected,
}

impl Error {
    /// Classification shared with [`recall_core::Error`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Core(e) => e.kind(),
            Self::MemberNotFound(_) => ErrorKind::Consistency,
            Self::Spawn { .. } | Self::Disconnected => ErrorKind::Concurrency,
        }
    }
}

/// Result alias for scheduler operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn core_errors_keep_their_kind() {
        let err = Error::from(recall_core::Error::InvalidBpm(0.0));
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.to_string(), "invalid bpm 0");
    }

    #[test]
    fn spawn_error_exposes_source() {
        let err = Error::Spawn {
            name: "recall-worker".into(),
            source: std::io::Error::other("no threads left"),
        };
        assert_eq!(err.kind(), ErrorKind::Concurrency);
        assert!(err.to_string().contains("recall-worker"));
        assert!(err.source().is_some());
    }
}
