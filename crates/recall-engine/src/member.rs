//! Scheduler members: channels and playback domains.
//!
//! A member owns one recall tree and the runs currently active in it. The
//! scheduler ticks members either inline or, for super-threaded members, on
//! the member's own [`Worker`](crate::Worker).

use std::sync::Arc;

use parking_lot::Mutex;
use recall_core::{
    DriverControl, NodeId, RecallTree, SharedRecallId, SharedRecycling, SoundScope, TreeEvent,
};

/// Identifier of a member, unique per scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberId(pub(crate) u32);

impl MemberId {
    /// Raw index.
    pub fn index(self) -> u32 {
        self.0
    }
}

impl core::fmt::Display for MemberId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "member#{}", self.0)
    }
}

/// Which membership list a member lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    /// A channel, e.g. one audio track.
    Channel,
    /// A playback domain spanning several channels.
    PlaybackDomain,
}

/// Tree and active runs of a member, shared with its worker.
#[derive(Debug)]
pub struct MemberBody {
    tree: RecallTree,
    runs: Vec<SharedRecallId>,
    recyclings: Vec<SharedRecycling>,
}

/// Shared handle to a [`MemberBody`].
pub type SharedBody = Arc<Mutex<MemberBody>>;

impl MemberBody {
    /// The member's recall tree.
    pub fn tree(&self) -> &RecallTree {
        &self.tree
    }

    /// Mutable access to the recall tree.
    pub fn tree_mut(&mut self) -> &mut RecallTree {
        &mut self.tree
    }

    /// Active runs, in start order.
    pub fn runs(&self) -> &[SharedRecallId] {
        &self.runs
    }

    /// Returns `true` if any run of `scope` is active.
    pub fn has_scope(&self, scope: SoundScope) -> bool {
        self.runs.iter().any(|r| r.scope() == scope)
    }

    /// Returns `true` while some run still has roots waiting for
    /// initialization.
    pub fn is_starting(&self) -> bool {
        self.runs.iter().any(|run| {
            self.tree.roots_for(run).into_iter().any(|root| {
                self.tree.flags(root).is_some_and(|f| {
                    !f.contains(recall_core::RecallFlags::RUN_INITIALIZED)
                        && !f.contains(recall_core::RecallFlags::DONE)
                })
            })
        })
    }

    /// Runs one tick of every active run of `scope`.
    pub fn tick(&mut self, scope: SoundScope) {
        for i in 0..self.runs.len() {
            let run = Arc::clone(&self.runs[i]);
            if run.scope() != scope {
                continue;
            }
            if let Err(e) = self.tree.tick_scope(&run) {
                tracing::warn!(run = %run, error = %e, "tick failed");
            }
        }
    }

    /// Instantiates `template` for `run` and activates the run.
    pub(crate) fn start(&mut self, template: NodeId, run: SharedRecallId) -> recall_core::Result<NodeId> {
        let root = self.tree.instantiate(template, &run)?;
        if !self.runs.contains(&run) {
            self.runs.push(run);
        }
        Ok(root)
    }

    /// Clears persistence on the roots of `run`; the run drains on its own.
    pub(crate) fn stop(&mut self, run: &SharedRecallId) -> recall_core::Result<()> {
        for root in self.tree.roots_for(run) {
            self.tree
                .unset_flags(root, recall_core::RecallFlags::PERSISTENCE)?;
        }
        Ok(())
    }

    /// Cancels the roots of `run`, or of every run if `None`.
    pub(crate) fn cancel(&mut self, run: Option<&SharedRecallId>) -> recall_core::Result<()> {
        let runs: Vec<SharedRecallId> = match run {
            Some(run) => vec![Arc::clone(run)],
            None => self.runs.clone(),
        };
        for run in &runs {
            for root in self.tree.roots_for(run) {
                self.tree.cancel(root)?;
            }
        }
        Ok(())
    }

    /// Sweeps the tree and ends runs without live roots.
    ///
    /// Signals bound to an ended run are released from every recycling.
    /// Returns the number of nodes freed and the runs that ended.
    pub(crate) fn sweep(&mut self) -> (usize, Vec<SharedRecallId>) {
        let freed = self.tree.sweep();
        let mut ended = Vec::new();
        let tree = &self.tree;
        self.runs.retain(|run| {
            let live = tree.has_live_roots(run);
            if !live {
                ended.push(Arc::clone(run));
            }
            live
        });
        for run in &ended {
            for recycling in &self.recyclings {
                recycling.lock().release(run);
            }
        }
        (freed, ended)
    }
}

/// One entry of a membership list.
///
/// Build with [`Member::channel`] or [`Member::playback_domain`], then hand
/// it to [`SchedulerHandle::add_member`](crate::SchedulerHandle::add_member).
pub struct Member {
    pub(crate) name: String,
    pub(crate) kind: MemberKind,
    pub(crate) body: SharedBody,
    pub(crate) driver: Option<Arc<dyn DriverControl>>,
    pub(crate) super_threaded: Option<bool>,
    pub(crate) started: bool,
}

impl Member {
    fn new(name: impl Into<String>, kind: MemberKind, tree: RecallTree) -> Self {
        Self {
            name: name.into(),
            kind,
            body: Arc::new(Mutex::new(MemberBody {
                tree,
                runs: Vec::new(),
                recyclings: Vec::new(),
            })),
            driver: None,
            super_threaded: None,
            started: false,
        }
    }

    /// A channel member around `tree`.
    pub fn channel(name: impl Into<String>, tree: RecallTree) -> Self {
        Self::new(name, MemberKind::Channel, tree)
    }

    /// A playback domain member around `tree`.
    pub fn playback_domain(name: impl Into<String>, tree: RecallTree) -> Self {
        Self::new(name, MemberKind::PlaybackDomain, tree)
    }

    /// Binds the member to a device; the member is cancelled once the
    /// driver stops.
    pub fn with_driver(mut self, driver: Arc<dyn DriverControl>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Registers a recycling whose signals are released when runs end.
    pub fn with_recycling(self, recycling: SharedRecycling) -> Self {
        self.body.lock().recyclings.push(recycling);
        self
    }

    /// Overrides the context's threading default.
    pub fn super_threaded(mut self, enabled: bool) -> Self {
        self.super_threaded = Some(enabled);
        self
    }

    /// Forwards tree events to `sender`.
    pub fn with_events(self, sender: crossbeam_channel::Sender<TreeEvent>) -> Self {
        self.body.lock().tree.set_event_sender(sender);
        self
    }

    /// Member name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Membership list.
    pub fn kind(&self) -> MemberKind {
        self.kind
    }

    /// Shared tree and runs.
    pub fn body(&self) -> &SharedBody {
        &self.body
    }
}

impl core::fmt::Debug for Member {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Member")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("driver", &self.driver.as_ref().map(|d| d.name().to_string()))
            .field("super_threaded", &self.super_threaded)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_core::{
        AudioGeometry, AudioSignal, Container, NodeState, RecallFlags, RecallIdAllocator,
        Recycling, SampleFormat,
    };

    #[test]
    fn start_tick_and_cancel_a_run() {
        let mut tree = RecallTree::new();
        let template = tree.add_template(Box::new(Container), RecallFlags::PERSISTENT);
        let member = Member::channel("ch", tree);
        let ids = RecallIdAllocator::new();
        let run = ids.allocate(SoundScope::Playback);

        let mut body = member.body().lock();
        let root = body.start(template, Arc::clone(&run)).unwrap();
        assert!(body.is_starting());
        assert!(body.has_scope(SoundScope::Playback));
        assert!(!body.has_scope(SoundScope::Wave));

        body.tick(SoundScope::Playback);
        assert!(!body.is_starting());
        assert_eq!(body.tree().state(root), NodeState::Running);

        body.cancel(None).unwrap();
        let (freed, ended) = body.sweep();
        assert_eq!(freed, 1);
        assert_eq!(ended.len(), 1);
        assert!(body.runs().is_empty());
    }

    #[test]
    fn ending_a_run_releases_its_signals() {
        let geo = AudioGeometry::new(44100, 4, 1, SampleFormat::Float32).unwrap();
        let recycling = Recycling::new(0, AudioSignal::from_samples(&geo, &[0.5; 8])).into_shared();
        let ids = RecallIdAllocator::new();
        let run = ids.allocate(SoundScope::Playback);
        recycling.lock().instantiate_copy(&run);

        let mut tree = RecallTree::new();
        let template = tree.add_template(Box::new(Container), RecallFlags::NONE);
        let member = Member::channel("ch", tree).with_recycling(Arc::clone(&recycling));
        let mut body = member.body().lock();
        let root = body.start(template, Arc::clone(&run)).unwrap();
        body.tick(SoundScope::Playback);
        assert!(body.tree_mut().done(root));

        body.sweep();
        assert!(recycling.lock().signal_for(&run).is_none());
    }

    #[test]
    fn stop_lets_a_persistent_run_finish() {
        let mut tree = RecallTree::new();
        let template = tree.add_template(Box::new(Container), RecallFlags::PERSISTENT);
        let member = Member::playback_domain("pd", tree);
        assert_eq!(member.kind(), MemberKind::PlaybackDomain);
        let ids = RecallIdAllocator::new();
        let run = ids.allocate(SoundScope::Notation);
        let mut body = member.body().lock();
        let root = body.start(template, Arc::clone(&run)).unwrap();
        body.tick(SoundScope::Notation);
        assert!(!body.tree_mut().done(root));

        body.stop(&run).unwrap();
        assert!(body.tree_mut().done(root));
    }
}
