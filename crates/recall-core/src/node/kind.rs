//! The per-node behaviour trait.

use super::{NodeId, RecallFlags, Stage};
use crate::recall_id::SharedRecallId;

/// What a kind sees while one of its stages runs.
pub struct StageContext<'a> {
    /// Node being staged.
    pub id: NodeId,
    /// Stage being run.
    pub stage: Stage,
    /// Run the node is bound to.
    pub recall_id: &'a SharedRecallId,
    /// Flags at the start of the stage.
    pub flags: RecallFlags,
    pub(crate) done_requested: &'a mut bool,
}

impl StageContext<'_> {
    /// Asks for the node to finish.
    ///
    /// Evaluated at the end of the node's RunPost: the first request puts the
    /// node into Terminating, a request on the following tick completes it.
    /// A tick without a request cancels the drain.
    pub fn request_done(&mut self) {
        *self.done_requested = true;
    }

    /// Returns `true` if done was requested during this tick.
    pub fn done_requested(&self) -> bool {
        *self.done_requested
    }

    /// Returns `true` while the node drains towards done.
    pub fn is_terminating(&self) -> bool {
        self.flags.contains(RecallFlags::TERMINATING)
    }
}

/// Stage work of one recall node.
///
/// All hooks default to no-ops. A kind holds its static configuration; a
/// template's kind is copied into each run instance through
/// [`duplicate`](Self::duplicate).
pub trait RecallKind: Send {
    /// Short label for diagnostics.
    fn name(&self) -> &'static str;

    /// Copies the static configuration for a new run instance.
    fn duplicate(&self) -> Box<dyn RecallKind>;

    /// Returns `true` for kinds bound to a single audio signal; those do not
    /// inherit persistence from their parent.
    fn is_signal(&self) -> bool {
        false
    }

    /// Called once all dependencies are satisfied, with their live ids.
    fn dependencies_resolved(&mut self, _dependencies: &[NodeId]) {}

    /// First initialization pass.
    fn run_init_pre(&mut self, _ctx: &mut StageContext<'_>) {}

    /// Second initialization pass.
    fn run_init_inter(&mut self, _ctx: &mut StageContext<'_>) {}

    /// Last initialization pass.
    fn run_init_post(&mut self, _ctx: &mut StageContext<'_>) {}

    /// First per-tick pass.
    fn run_pre(&mut self, _ctx: &mut StageContext<'_>) {}

    /// Second per-tick pass.
    fn run_inter(&mut self, _ctx: &mut StageContext<'_>) {}

    /// Last per-tick pass.
    fn run_post(&mut self, _ctx: &mut StageContext<'_>) {}

    /// The node is being cancelled.
    fn on_cancel(&mut self) {}

    /// The node transitioned to done.
    fn on_done(&mut self) {}

    /// Dispatches `ctx.stage` to the matching hook.
    fn run_stage(&mut self, ctx: &mut StageContext<'_>) {
        match ctx.stage {
            Stage::ResolveDependencies => {}
            Stage::RunInitPre => self.run_init_pre(ctx),
            Stage::RunInitInter => self.run_init_inter(ctx),
            Stage::RunInitPost => self.run_init_post(ctx),
            Stage::RunPre => self.run_pre(ctx),
            Stage::RunInter => self.run_inter(ctx),
            Stage::RunPost => self.run_post(ctx),
        }
    }
}

impl core::fmt::Debug for dyn RecallKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}
