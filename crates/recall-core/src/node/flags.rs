//! Lifecycle and scope flags carried by every recall node.

/// Bit set of recall node flags.
///
/// A small hand-rolled flag set: constants combine with
/// [`union`](Self::union) or `|`, and are tested with
/// [`contains`](Self::contains).
///
/// # Example
///
/// ```rust
/// use recall_core::RecallFlags;
///
/// let flags = RecallFlags::PLAYBACK | RecallFlags::PROPAGATE_DONE;
/// assert!(flags.contains(RecallFlags::PLAYBACK));
/// assert!(!flags.contains(RecallFlags::DONE));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RecallFlags(u32);

impl RecallFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// Configuration-time prototype; never staged, never bound to a recall id.
    pub const TEMPLATE: Self = Self(1 << 0);
    /// The RunInit stages have completed.
    pub const RUN_INITIALIZED: Self = Self(1 << 1);
    /// Finished; will be removed by the next sweep.
    pub const DONE: Self = Self(1 << 2);
    /// Requested done on the previous tick; one more tick of drain.
    pub const TERMINATING: Self = Self(1 << 3);
    /// Exempt from [`done`](crate::RecallTree::done) until cancelled.
    pub const PERSISTENT: Self = Self(1 << 4);
    /// Exempt from done while bound to playback.
    pub const PERSISTENT_PLAYBACK: Self = Self(1 << 5);
    /// Exempt from done while bound to the sequencer.
    pub const PERSISTENT_SEQUENCER: Self = Self(1 << 6);
    /// Exempt from done while bound to notation.
    pub const PERSISTENT_NOTATION: Self = Self(1 << 7);
    /// Between RunInitPost and the first RunPost.
    pub const INITIAL_RUN: Self = Self(1 << 8);
    /// Marked for the removal sweep.
    pub const REMOVE: Self = Self(1 << 9);
    /// Hidden from observers.
    pub const HIDE: Self = Self(1 << 10);
    /// Becomes done once its last child is removed.
    pub const PROPAGATE_DONE: Self = Self(1 << 11);
    /// Dependencies have been resolved.
    pub const RESOLVED: Self = Self(1 << 12);
    /// Participates in the playback scope.
    pub const PLAYBACK: Self = Self(1 << 16);
    /// Participates in the sequencer scope.
    pub const SEQUENCER: Self = Self(1 << 17);
    /// Participates in the notation scope.
    pub const NOTATION: Self = Self(1 << 18);
    /// Participates in the wave scope.
    pub const WAVE: Self = Self(1 << 19);
    /// Participates in the midi scope.
    pub const MIDI: Self = Self(1 << 20);

    /// All scope flags.
    pub const SCOPES: Self = Self(
        Self::PLAYBACK.0 | Self::SEQUENCER.0 | Self::NOTATION.0 | Self::WAVE.0 | Self::MIDI.0,
    );

    /// All persistence flags.
    pub const PERSISTENCE: Self = Self(
        Self::PERSISTENT.0
            | Self::PERSISTENT_PLAYBACK.0
            | Self::PERSISTENT_SEQUENCER.0
            | Self::PERSISTENT_NOTATION.0,
    );

    /// Flags a child takes over from its parent when attached.
    pub const INHERITED: Self =
        Self(Self::SCOPES.0 | Self::PROPAGATE_DONE.0 | Self::INITIAL_RUN.0);

    /// Per-run state that a duplicate never carries over.
    pub const RUNTIME: Self = Self(
        Self::TEMPLATE.0
            | Self::RUN_INITIALIZED.0
            | Self::DONE.0
            | Self::TERMINATING.0
            | Self::INITIAL_RUN.0
            | Self::REMOVE.0
            | Self::HIDE.0
            | Self::RESOLVED.0,
    );

    /// Returns `true` if every bit of `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if any bit of `other` is set.
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Union of both sets.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Bits of `self` that are also in `other`.
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Bits of `self` not in `other`.
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Sets the bits of `other`.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clears the bits of `other`.
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Returns `true` if no bit is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Raw bit pattern.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns `true` if a persistence flag shields the node from `done`.
    ///
    /// Plain [`PERSISTENT`](Self::PERSISTENT) always shields; the scoped
    /// variants only while the matching scope flag is set.
    pub const fn is_persistent(self) -> bool {
        self.contains(Self::PERSISTENT)
            || (self.contains(Self::PERSISTENT_PLAYBACK) && self.contains(Self::PLAYBACK))
            || (self.contains(Self::PERSISTENT_SEQUENCER) && self.contains(Self::SEQUENCER))
            || (self.contains(Self::PERSISTENT_NOTATION) && self.contains(Self::NOTATION))
    }
}

impl core::ops::BitOr for RecallFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl core::ops::BitOrAssign for RecallFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.insert(rhs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoped_persistence_needs_scope() {
        let flags = RecallFlags::PERSISTENT_PLAYBACK;
        assert!(!flags.is_persistent());
        assert!((flags | RecallFlags::PLAYBACK).is_persistent());
        assert!(!(flags | RecallFlags::SEQUENCER).is_persistent());
        assert!(RecallFlags::PERSISTENT.is_persistent());
    }

    #[test]
    fn inherited_mask_excludes_lifecycle_state() {
        assert!(RecallFlags::INHERITED.contains(RecallFlags::PLAYBACK));
        assert!(RecallFlags::INHERITED.contains(RecallFlags::INITIAL_RUN));
        assert!(!RecallFlags::INHERITED.intersects(RecallFlags::DONE | RecallFlags::TEMPLATE));
    }

    #[test]
    fn insert_and_remove() {
        let mut flags = RecallFlags::NONE;
        flags.insert(RecallFlags::DONE | RecallFlags::HIDE);
        assert!(flags.contains(RecallFlags::DONE));
        flags.remove(RecallFlags::DONE);
        assert_eq!(flags, RecallFlags::HIDE);
        assert_eq!(flags.difference(RecallFlags::HIDE), RecallFlags::NONE);
    }
}
