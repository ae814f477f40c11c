//! The recall tree: staged processing units.
//!
//! Recall nodes form a tree. Each node carries a [`RecallKind`] doing its
//! per-stage work, a [`RecallFlags`] lifecycle set, an optional shared
//! [`RecallId`](crate::RecallId) and a list of dependencies. The tree is an
//! arena: nodes are addressed by [`NodeId`], parents are plain ids, and a
//! node's child list is the only owner of its children.
//!
//! # Stage protocol
//!
//! ```text
//! ResolveDependencies (one-shot, non-recursive)
//!   -> RunInitPre -> RunInitInter -> RunInitPost
//!   -> [RunPre -> RunInter -> RunPost] per tick
//!   -> Done / Cancel -> Remove (sweep)
//! ```
//!
//! Every stage runs on the node itself first, then on each child in list
//! order. Removal never happens during dispatch; finished nodes are flagged
//! and physically removed by [`RecallTree::sweep`].
//!
//! # Example
//!
//! ```rust
//! use recall_core::{Container, RecallFlags, RecallIdAllocator, RecallTree, SoundScope};
//!
//! let ids = RecallIdAllocator::new();
//! let mut tree = RecallTree::new();
//! let template = tree.add_template(Box::new(Container), RecallFlags::PLAYBACK);
//! let child = tree.add_template(Box::new(Container), RecallFlags::NONE);
//! tree.add_child(template, child).unwrap();
//!
//! let run = ids.allocate(SoundScope::Playback);
//! let root = tree.instantiate(template, &run).unwrap();
//! tree.run_init(root).unwrap();
//! tree.run_cycle(root).unwrap();
//! tree.cancel(root).unwrap();
//! assert_eq!(tree.sweep(), 2);
//! ```

mod flags;
mod kind;
mod stage;
mod tree;

pub use flags::RecallFlags;
pub use kind::{RecallKind, StageContext};
pub use stage::{NodeState, Stage};
pub use tree::{RecallNode, RecallTree, TreeEvent};

/// Unique identifier for a node in a recall tree.
///
/// Node IDs are assigned sequentially and never reused within a tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Returns the raw numeric identifier.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }

    /// Returns a sentinel value used for uninitialized node references.
    #[inline]
    pub fn sentinel() -> Self {
        Self(u32::MAX)
    }
}

impl core::fmt::Display for NodeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}
