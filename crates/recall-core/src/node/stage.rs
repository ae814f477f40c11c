//! Stages and derived node states.

use super::RecallFlags;

/// One step of the per-run stage protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// One-shot dependency lookup; never recursive.
    ResolveDependencies,
    /// First initialization pass.
    RunInitPre,
    /// Second initialization pass.
    RunInitInter,
    /// Last initialization pass; marks the node initialized.
    RunInitPost,
    /// First per-tick pass.
    RunPre,
    /// Second per-tick pass.
    RunInter,
    /// Last per-tick pass; evaluates done requests.
    RunPost,
}

impl Stage {
    /// Initialization stages in order.
    pub const INIT: [Self; 3] = [Self::RunInitPre, Self::RunInitInter, Self::RunInitPost];

    /// Per-tick stages in order.
    pub const CYCLE: [Self; 3] = [Self::RunPre, Self::RunInter, Self::RunPost];

    /// Returns `true` for the RunInit stages.
    pub fn is_init(self) -> bool {
        matches!(self, Self::RunInitPre | Self::RunInitInter | Self::RunInitPost)
    }

    /// Returns `true` for the per-tick stages.
    pub fn is_cycle(self) -> bool {
        matches!(self, Self::RunPre | Self::RunInter | Self::RunPost)
    }

    /// Snake-case stage name.
    pub fn name(self) -> &'static str {
        match self {
            Self::ResolveDependencies => "resolve_dependencies",
            Self::RunInitPre => "run_init_pre",
            Self::RunInitInter => "run_init_inter",
            Self::RunInitPost => "run_init_post",
            Self::RunPre => "run_pre",
            Self::RunInter => "run_inter",
            Self::RunPost => "run_post",
        }
    }
}

impl core::fmt::Display for Stage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle state of a node, derived from its flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Configuration prototype.
    Template,
    /// Bound to a run, RunInit not yet complete.
    Initialized,
    /// Ticking.
    Running,
    /// Draining for one tick before done.
    Terminating,
    /// Finished; awaiting the sweep.
    Done,
    /// No longer in the tree.
    Removed,
}

impl NodeState {
    pub(crate) fn from_flags(flags: RecallFlags) -> Self {
        if flags.contains(RecallFlags::TEMPLATE) {
            Self::Template
        } else if flags.contains(RecallFlags::DONE) {
            Self::Done
        } else if flags.contains(RecallFlags::TERMINATING) {
            Self::Terminating
        } else if flags.contains(RecallFlags::RUN_INITIALIZED) {
            Self::Running
        } else {
            Self::Initialized
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_precedence() {
        assert_eq!(
            NodeState::from_flags(RecallFlags::TEMPLATE | RecallFlags::DONE),
            NodeState::Template
        );
        assert_eq!(
            NodeState::from_flags(RecallFlags::RUN_INITIALIZED | RecallFlags::DONE),
            NodeState::Done
        );
        assert_eq!(
            NodeState::from_flags(RecallFlags::RUN_INITIALIZED | RecallFlags::TERMINATING),
            NodeState::Terminating
        );
        assert_eq!(
            NodeState::from_flags(RecallFlags::RUN_INITIALIZED),
            NodeState::Running
        );
        assert_eq!(NodeState::from_flags(RecallFlags::NONE), NodeState::Initialized);
    }

    #[test]
    fn stage_groups() {
        assert!(Stage::INIT.iter().all(|s| s.is_init() && !s.is_cycle()));
        assert!(Stage::CYCLE.iter().all(|s| s.is_cycle() && !s.is_init()));
        assert!(!Stage::ResolveDependencies.is_init());
        assert_eq!(Stage::RunInter.to_string(), "run_inter");
    }
}
