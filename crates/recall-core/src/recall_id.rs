//! Execution-context identifiers.
//!
//! A [`RecallId`] tags one logical run within one [`SoundScope`]. It is
//! immutable once created and shared by every node of the run through an
//! `Arc`. Ids are handed out by a [`RecallIdAllocator`], which lives in the
//! owning context rather than in global state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::node::RecallFlags;

/// Independent execution contexts of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SoundScope {
    /// Live playback.
    Playback,
    /// Step sequencer.
    Sequencer,
    /// Notation editor.
    Notation,
    /// Wave (audio clip) playback.
    Wave,
    /// MIDI playback.
    Midi,
}

impl SoundScope {
    /// All scopes in dispatch order.
    pub const ALL: [Self; 5] = [
        Self::Playback,
        Self::Sequencer,
        Self::Notation,
        Self::Wave,
        Self::Midi,
    ];

    /// Scope flag carried by nodes bound to this scope.
    pub fn flag(self) -> RecallFlags {
        match self {
            Self::Playback => RecallFlags::PLAYBACK,
            Self::Sequencer => RecallFlags::SEQUENCER,
            Self::Notation => RecallFlags::NOTATION,
            Self::Wave => RecallFlags::WAVE,
            Self::Midi => RecallFlags::MIDI,
        }
    }

    /// Index in [`ALL`](Self::ALL).
    pub fn index(self) -> usize {
        self as usize
    }

    /// Lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Playback => "playback",
            Self::Sequencer => "sequencer",
            Self::Notation => "notation",
            Self::Wave => "wave",
            Self::Midi => "midi",
        }
    }
}

impl core::fmt::Display for SoundScope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Identifier of one logical run within one scope.
///
/// Equality and hashing use the numeric id only.
#[derive(Debug)]
pub struct RecallId {
    id: u64,
    scope: SoundScope,
    parent: Option<SharedRecallId>,
}

/// Shared handle to a [`RecallId`].
pub type SharedRecallId = Arc<RecallId>;

impl RecallId {
    /// Numeric id, unique within its allocator.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Scope this run belongs to.
    pub fn scope(&self) -> SoundScope {
        self.scope
    }

    /// Run this one was spawned from, if any.
    pub fn parent(&self) -> Option<&SharedRecallId> {
        self.parent.as_ref()
    }

    /// Returns `true` if `other` is this id or one of its ancestors.
    pub fn descends_from(&self, other: &RecallId) -> bool {
        let mut current = Some(self);
        while let Some(id) = current {
            if id.id == other.id {
                return true;
            }
            current = id.parent.as_deref();
        }
        false
    }
}

impl PartialEq for RecallId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RecallId {}

impl core::hash::Hash for RecallId {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl core::fmt::Display for RecallId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}#{}", self.scope, self.id)
    }
}

/// Sequential [`RecallId`] source.
#[derive(Debug, Default)]
pub struct RecallIdAllocator {
    next: AtomicU64,
}

impl RecallIdAllocator {
    /// Creates an allocator starting at id 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a new top-level run id.
    pub fn allocate(&self, scope: SoundScope) -> SharedRecallId {
        Arc::new(RecallId {
            id: self.next.fetch_add(1, Ordering::Relaxed),
            scope,
            parent: None,
        })
    }

    /// Allocates a run id spawned from `parent`.
    pub fn allocate_child(&self, parent: &SharedRecallId, scope: SoundScope) -> SharedRecallId {
        Arc::new(RecallId {
            id: self.next.fetch_add(1, Ordering::Relaxed),
            scope,
            parent: Some(Arc::clone(parent)),
        })
    }

    /// Number of ids handed out so far.
    pub fn allocated(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}
