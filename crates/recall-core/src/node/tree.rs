//! Arena storage and lifecycle operations of the recall tree.

use std::sync::Arc;

use crossbeam_channel::Sender;

use super::kind::{RecallKind, StageContext};
use super::stage::{NodeState, Stage};
use super::{NodeId, RecallFlags};
use crate::error::{Error, Result};
use crate::recall_id::{RecallId, SharedRecallId};

/// Structural and lifecycle notifications emitted by a [`RecallTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeEvent {
    /// A node was attached below a parent.
    Added(NodeId),
    /// A node is being cancelled.
    Cancelled(NodeId),
    /// A node entered its one-tick drain.
    Terminating(NodeId),
    /// A node transitioned to done. Emitted once per node.
    Done(NodeId),
    /// A node left the tree.
    Removed(NodeId),
}

/// One node of a recall tree.
#[derive(Debug)]
pub struct RecallNode {
    id: NodeId,
    flags: RecallFlags,
    /// Flags gained from ancestors rather than set on the node itself.
    inherited: RecallFlags,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    recall_id: Option<SharedRecallId>,
    dependencies: Vec<NodeId>,
    origin: Option<NodeId>,
    kind: Box<dyn RecallKind>,
    done_requested: bool,
}

impl RecallNode {
    /// Node id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Current flags.
    pub fn flags(&self) -> RecallFlags {
        self.flags
    }

    /// Parent node, if attached.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in dispatch order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Bound run.
    pub fn recall_id(&self) -> Option<&SharedRecallId> {
        self.recall_id.as_ref()
    }

    /// Nodes this one waits on.
    pub fn dependencies(&self) -> &[NodeId] {
        &self.dependencies
    }

    /// Template this node was duplicated from.
    pub fn origin(&self) -> Option<NodeId> {
        self.origin
    }

    /// The node's kind.
    pub fn kind(&self) -> &dyn RecallKind {
        self.kind.as_ref()
    }

    /// Lifecycle state derived from the flags.
    pub fn state(&self) -> NodeState {
        NodeState::from_flags(self.flags)
    }

    fn is_bound_to(&self, recall_id: &RecallId) -> bool {
        self.recall_id.as_deref().is_some_and(|id| id == recall_id)
    }
}

/// Arena of recall nodes.
///
/// # Usage
///
/// 1. Build templates with [`add_template()`](Self::add_template) and
///    [`add_child()`](Self::add_child)
/// 2. Instantiate a run with [`instantiate()`](Self::instantiate)
/// 3. Initialize with [`run_init()`](Self::run_init)
/// 4. Tick with [`run_cycle()`](Self::run_cycle) or
///    [`run_scope()`](Self::run_scope)
/// 5. Finish with [`cancel()`](Self::cancel) or a done request, then
///    [`sweep()`](Self::sweep)
#[derive(Debug, Default)]
pub struct RecallTree {
    nodes: Vec<Option<RecallNode>>,
    roots: Vec<NodeId>,
    next_slot: u32,
    live: usize,
    events: Option<Sender<TreeEvent>>,
}

impl RecallTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends lifecycle events to `sender` from now on.
    pub fn set_event_sender(&mut self, sender: Sender<TreeEvent>) {
        self.events = Some(sender);
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns `true` if the tree holds no node.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Returns `true` if `id` refers to a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Node by id.
    pub fn node(&self, id: NodeId) -> Option<&RecallNode> {
        self.nodes.get(id.0 as usize).and_then(Option::as_ref)
    }

    /// Flags of a node.
    pub fn flags(&self, id: NodeId) -> Option<RecallFlags> {
        self.node(id).map(|n| n.flags)
    }

    /// Lifecycle state; [`NodeState::Removed`] for ids no longer present.
    pub fn state(&self, id: NodeId) -> NodeState {
        self.node(id).map_or(NodeState::Removed, RecallNode::state)
    }

    /// Unparented nodes in insertion order.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Roots bound to `recall_id`.
    pub fn roots_for(&self, recall_id: &RecallId) -> Vec<NodeId> {
        self.roots
            .iter()
            .copied()
            .filter(|&id| self.node(id).is_some_and(|n| n.is_bound_to(recall_id)))
            .collect()
    }

    /// Returns `true` while any root bound to `recall_id` is not done.
    pub fn has_live_roots(&self, recall_id: &RecallId) -> bool {
        self.roots.iter().any(|&id| {
            self.node(id).is_some_and(|n| {
                n.is_bound_to(recall_id) && !n.flags.contains(RecallFlags::DONE)
            })
        })
    }

    /// Adds an unparented template node.
    pub fn add_template(&mut self, kind: Box<dyn RecallKind>, flags: RecallFlags) -> NodeId {
        let id = self.insert(kind, flags.union(RecallFlags::TEMPLATE), None, None);
        #[cfg(feature = "tracing")]
        tracing::debug!("recall_add: template {id}");
        id
    }

    /// Adds an unparented instance node bound to `recall_id`.
    pub fn add_node(
        &mut self,
        kind: Box<dyn RecallKind>,
        flags: RecallFlags,
        recall_id: &SharedRecallId,
    ) -> NodeId {
        let flags = flags
            .difference(RecallFlags::RUNTIME)
            .union(recall_id.scope().flag());
        let id = self.insert(kind, flags, Some(Arc::clone(recall_id)), None);
        #[cfg(feature = "tracing")]
        tracing::debug!("recall_add: node {id} bound to {recall_id}");
        id
    }

    /// Attaches `child` as the last child of `parent`.
    ///
    /// The child is detached from its previous parent first. It takes over
    /// the parent's scope flags, `PROPAGATE_DONE`, `INITIAL_RUN` and (unless
    /// it is a signal kind) its persistence flags, plus the parent's recall
    /// id. If the parent already ran its initialization and the child did
    /// not, the child is initialized immediately.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if !self.contains(parent) {
            return Err(Error::NodeNotFound(parent));
        }
        if !self.contains(child) {
            return Err(Error::NodeNotFound(child));
        }
        if parent == child || self.is_ancestor(child, parent) {
            #[cfg(feature = "tracing")]
            tracing::warn!("recall_add_child refused: {child} below {parent} would cycle");
            return Err(Error::InvalidParent { child, parent });
        }

        self.detach(child);

        let (parent_flags, parent_recall_id) = {
            let p = self.node_ref(parent)?;
            (p.flags, p.recall_id.clone())
        };
        let mut inherited = RecallFlags::INHERITED;
        {
            let c = self.node_mut(child)?;
            if !c.kind.is_signal() {
                inherited = inherited.union(RecallFlags::PERSISTENCE);
            }
            let gained = parent_flags.intersection(inherited).difference(c.flags);
            c.flags.insert(gained);
            c.inherited = gained;
            if parent_recall_id.is_some() {
                c.recall_id = parent_recall_id;
            }
            c.parent = Some(parent);
        }
        self.node_mut(parent)?.children.push(child);
        self.emit(TreeEvent::Added(child));
        #[cfg(feature = "tracing")]
        tracing::debug!("recall_add_child: {child} below {parent}");

        let child_flags = self.node_ref(child)?.flags;
        if parent_flags.contains(RecallFlags::RUN_INITIALIZED)
            && !child_flags.contains(RecallFlags::RUN_INITIALIZED)
            && !child_flags.contains(RecallFlags::TEMPLATE)
        {
            self.run_init(child)?;
        }
        Ok(())
    }

    /// Records that `id` waits on `dependency`.
    ///
    /// A template dependency is satisfied by its instance bound to the same
    /// run.
    pub fn add_dependency(&mut self, id: NodeId, dependency: NodeId) -> Result<()> {
        if !self.contains(dependency) {
            return Err(Error::NodeNotFound(dependency));
        }
        let node = self.node_mut(id)?;
        if !node.dependencies.contains(&dependency) {
            node.dependencies.push(dependency);
        }
        node.flags.remove(RecallFlags::RESOLVED);
        Ok(())
    }

    /// Sets flags on `id` and the inheritable part on all descendants.
    pub fn set_flags(&mut self, id: NodeId, flags: RecallFlags) -> Result<()> {
        self.node_mut(id)?.flags.insert(flags);
        let inherited = flags.intersection(RecallFlags::INHERITED.union(RecallFlags::PERSISTENCE));
        if !inherited.is_empty() {
            for descendant in self.descendants(id) {
                let node = self.node_mut(descendant)?;
                let mask = if node.kind.is_signal() {
                    inherited.difference(RecallFlags::PERSISTENCE)
                } else {
                    inherited
                };
                let gained = mask.difference(node.flags);
                node.flags.insert(gained);
                node.inherited.insert(gained);
            }
        }
        Ok(())
    }

    /// Clears flags on `id` and the inheritable part on all descendants.
    pub fn unset_flags(&mut self, id: NodeId, flags: RecallFlags) -> Result<()> {
        self.node_mut(id)?.flags.remove(flags);
        let inherited = flags.intersection(RecallFlags::INHERITED.union(RecallFlags::PERSISTENCE));
        if !inherited.is_empty() {
            for descendant in self.descendants(id) {
                let node = self.node_mut(descendant)?;
                node.flags.remove(inherited);
                node.inherited.remove(inherited);
            }
        }
        Ok(())
    }

    /// Tries to resolve the dependencies of `id`. Not recursive.
    ///
    /// Returns `false` without side effects while any dependency is not yet
    /// live and initialized; the caller retries on a later tick.
    pub fn resolve_dependencies(&mut self, id: NodeId) -> Result<bool> {
        let node = self.node_ref(id)?;
        if node.flags.contains(RecallFlags::RESOLVED) {
            return Ok(true);
        }
        let recall_id = node.recall_id.clone();
        let mut resolved = Vec::with_capacity(node.dependencies.len());
        for &dep in &node.dependencies {
            match self.resolve_one(dep, recall_id.as_deref()) {
                Some(live) => resolved.push(live),
                None => return Ok(false),
            }
        }
        let node = self.node_mut(id)?;
        node.kind.dependencies_resolved(&resolved);
        node.flags.insert(RecallFlags::RESOLVED);
        Ok(true)
    }

    /// Runs one stage on `id` and its subtree, self first.
    ///
    /// Done nodes and their subtrees are skipped. Init stages skip the hook
    /// of nodes that are already initialized. `ResolveDependencies` only
    /// touches `id`.
    ///
    /// Staging a template or an unbound node is a programming error: it
    /// asserts in debug builds and is refused otherwise.
    pub fn run_stage(&mut self, id: NodeId, stage: Stage) -> Result<()> {
        let node = self.node_ref(id)?;
        let template = node.flags.contains(RecallFlags::TEMPLATE);
        debug_assert!(!template, "staged template {id}");
        if template {
            #[cfg(feature = "tracing")]
            tracing::warn!("recall_stage refused: template {id} at {stage}");
            return Err(Error::StagedTemplate(id));
        }
        let unbound = node.recall_id.is_none();
        debug_assert!(!unbound, "staged unbound node {id}");
        if unbound {
            #[cfg(feature = "tracing")]
            tracing::warn!("recall_stage refused: unbound {id} at {stage}");
            return Err(Error::Unbound(id));
        }
        if stage == Stage::ResolveDependencies {
            self.resolve_dependencies(id)?;
            return Ok(());
        }
        self.dispatch(id, stage);
        Ok(())
    }

    /// Runs the three init stages on `id`.
    pub fn run_init(&mut self, id: NodeId) -> Result<()> {
        for stage in Stage::INIT {
            self.run_stage(id, stage)?;
        }
        Ok(())
    }

    /// Runs one tick (RunPre, RunInter, RunPost) on `id`.
    pub fn run_cycle(&mut self, id: NodeId) -> Result<()> {
        for stage in Stage::CYCLE {
            self.run_stage(id, stage)?;
        }
        Ok(())
    }

    /// Runs `stage` on every root bound to `recall_id`.
    pub fn run_scope(&mut self, recall_id: &RecallId, stage: Stage) -> Result<()> {
        for root in self.roots_for(recall_id) {
            self.run_stage(root, stage)?;
        }
        Ok(())
    }

    /// Runs one full tick on every root bound to `recall_id`.
    ///
    /// Roots that are bound but not yet initialized are resolved and
    /// initialized first; a root whose dependencies are not resolved yet is
    /// left for a later tick.
    pub fn tick_scope(&mut self, recall_id: &RecallId) -> Result<()> {
        let roots = self.roots_for(recall_id);
        for &root in &roots {
            let flags = self.node_ref(root)?.flags;
            if !flags.contains(RecallFlags::RUN_INITIALIZED) && !flags.contains(RecallFlags::DONE) {
                if !self.resolve_dependencies(root)? {
                    continue;
                }
                self.run_init(root)?;
            }
        }
        for stage in Stage::CYCLE {
            for &root in &roots {
                if self
                    .node(root)
                    .is_some_and(|n| n.flags.contains(RecallFlags::RUN_INITIALIZED))
                {
                    self.run_stage(root, stage)?;
                }
            }
        }
        Ok(())
    }

    /// Moves `id` to done.
    ///
    /// Idempotent. Ignored for templates, nodes in their initial run and
    /// persistent nodes. Returns `true` if the transition happened.
    pub fn done(&mut self, id: NodeId) -> bool {
        let Some(node) = self.nodes.get_mut(id.0 as usize).and_then(Option::as_mut) else {
            return false;
        };
        let flags = node.flags;
        if flags.contains(RecallFlags::DONE)
            || flags.contains(RecallFlags::TEMPLATE)
            || flags.contains(RecallFlags::INITIAL_RUN)
            || flags.is_persistent()
        {
            return false;
        }
        node.flags.remove(RecallFlags::TERMINATING);
        node.flags
            .insert(RecallFlags::DONE | RecallFlags::HIDE | RecallFlags::REMOVE);
        node.kind.on_done();
        self.emit(TreeEvent::Done(id));
        #[cfg(feature = "tracing")]
        tracing::debug!("recall_done: {id}");
        true
    }

    /// Cancels `id` and its subtree.
    ///
    /// Children are cancelled first. Each node is then forced to done:
    /// persistence and initial-run protection are cleared.
    pub fn cancel(&mut self, id: NodeId) -> Result<()> {
        let children = self.node_ref(id)?.children.clone();
        for child in children {
            self.cancel(child)?;
        }
        self.emit(TreeEvent::Cancelled(id));
        let node = self.node_mut(id)?;
        node.kind.on_cancel();
        node.flags
            .remove(RecallFlags::PERSISTENCE.union(RecallFlags::INITIAL_RUN));
        #[cfg(feature = "tracing")]
        tracing::debug!("recall_cancel: {id}");
        self.done(id);
        Ok(())
    }

    /// Clears persistence on `id` and moves it to done.
    pub fn stop_persistent(&mut self, id: NodeId) -> Result<bool> {
        self.node_mut(id)?.flags.remove(RecallFlags::PERSISTENCE);
        Ok(self.done(id))
    }

    /// Creates a run instance of the template `id` bound to `recall_id`.
    ///
    /// The copy is unparented; its flags are the template's minus the
    /// per-run state, plus the run's scope flag.
    pub fn duplicate(&mut self, id: NodeId, recall_id: &SharedRecallId) -> Result<NodeId> {
        let node = self.node_ref(id)?;
        if !node.flags.contains(RecallFlags::TEMPLATE) {
            #[cfg(feature = "tracing")]
            tracing::warn!("recall_duplicate refused: {id} is not a template");
            return Err(Error::NotTemplate(id));
        }
        let flags = node
            .flags
            .difference(node.inherited)
            .difference(RecallFlags::RUNTIME)
            .union(recall_id.scope().flag());
        let kind = node.kind.duplicate();
        let dependencies = node.dependencies.clone();
        let copy = self.insert(kind, flags, Some(Arc::clone(recall_id)), Some(id));
        self.node_mut(copy)?.dependencies = dependencies;
        #[cfg(feature = "tracing")]
        tracing::debug!("recall_duplicate: {id} -> {copy} for {recall_id}");
        Ok(copy)
    }

    /// Duplicates the template subtree rooted at `id`, preserving child order.
    pub fn instantiate(&mut self, id: NodeId, recall_id: &SharedRecallId) -> Result<NodeId> {
        let copy = self.duplicate(id, recall_id)?;
        let children = self.node_ref(id)?.children.clone();
        for child in children {
            let child_copy = self.instantiate(child, recall_id)?;
            self.add_child(copy, child_copy)?;
        }
        Ok(copy)
    }

    /// Removes every node flagged `REMOVE` below and including `id`,
    /// children before parents.
    ///
    /// Returns the number of nodes freed.
    pub fn child_check_remove(&mut self, id: NodeId) -> usize {
        let Some(node) = self.node(id) else {
            return 0;
        };
        let children = node.children.clone();
        let mut freed = 0;
        for child in children {
            freed += self.child_check_remove(child);
        }
        if self
            .node(id)
            .is_some_and(|n| n.flags.contains(RecallFlags::REMOVE))
        {
            freed += self.remove(id);
        }
        freed
    }

    /// Runs the removal sweep over every root.
    pub fn sweep(&mut self) -> usize {
        let roots = self.roots.clone();
        roots.into_iter().map(|r| self.child_check_remove(r)).sum()
    }

    /// Detaches `id`, frees its subtree and propagates done to a childless
    /// parent flagged `PROPAGATE_DONE`.
    pub(crate) fn remove(&mut self, id: NodeId) -> usize {
        let parent = self.node(id).and_then(|n| n.parent);
        self.detach(id);
        self.roots.retain(|&r| r != id);
        let freed = self.free_subtree(id);
        #[cfg(feature = "tracing")]
        tracing::debug!("recall_remove: {id} ({freed} nodes)");

        if let Some(parent) = parent
            && let Some(p) = self.node(parent)
            && p.flags.contains(RecallFlags::PROPAGATE_DONE)
            && p.children.is_empty()
        {
            self.done(parent);
        }
        freed
    }

    fn dispatch(&mut self, id: NodeId, stage: Stage) {
        let Some(node) = self.nodes.get_mut(id.0 as usize).and_then(Option::as_mut) else {
            return;
        };
        if node.flags.contains(RecallFlags::DONE) || node.flags.contains(RecallFlags::TEMPLATE) {
            return;
        }
        let Some(recall_id) = node.recall_id.clone() else {
            return;
        };

        let skip_hook = stage.is_init() && node.flags.contains(RecallFlags::RUN_INITIALIZED);
        if !skip_hook {
            if stage == Stage::RunPre {
                node.done_requested = false;
            }
            let mut done_requested = node.done_requested;
            let mut ctx = StageContext {
                id,
                stage,
                recall_id: &recall_id,
                flags: node.flags,
                done_requested: &mut done_requested,
            };
            node.kind.run_stage(&mut ctx);
            node.done_requested = done_requested;
            match stage {
                Stage::RunInitPost => {
                    node.flags
                        .insert(RecallFlags::RUN_INITIALIZED | RecallFlags::INITIAL_RUN);
                }
                Stage::RunPost => self.finish_run_post(id),
                _ => {}
            }
        }

        let mut i = 0;
        while let Some(child) = self.node(id).and_then(|n| n.children.get(i).copied()) {
            self.dispatch(child, stage);
            i += 1;
        }
    }

    fn finish_run_post(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(id.0 as usize).and_then(Option::as_mut) else {
            return;
        };
        node.flags.remove(RecallFlags::INITIAL_RUN);
        let requested = std::mem::take(&mut node.done_requested);
        let terminating = node.flags.contains(RecallFlags::TERMINATING);
        match (requested, terminating) {
            (true, true) => {
                self.done(id);
            }
            (true, false) => {
                node.flags.insert(RecallFlags::TERMINATING);
                self.emit(TreeEvent::Terminating(id));
            }
            (false, true) => node.flags.remove(RecallFlags::TERMINATING),
            (false, false) => {}
        }
    }

    fn resolve_one(&self, dep: NodeId, recall_id: Option<&RecallId>) -> Option<NodeId> {
        let node = self.node(dep)?;
        if node.flags.contains(RecallFlags::TEMPLATE) {
            let recall_id = recall_id?;
            return self.nodes.iter().flatten().find_map(|n| {
                (n.origin == Some(dep)
                    && n.is_bound_to(recall_id)
                    && n.flags.contains(RecallFlags::RUN_INITIALIZED))
                .then_some(n.id)
            });
        }
        node.flags
            .contains(RecallFlags::RUN_INITIALIZED)
            .then_some(dep)
    }

    fn insert(
        &mut self,
        kind: Box<dyn RecallKind>,
        flags: RecallFlags,
        recall_id: Option<SharedRecallId>,
        origin: Option<NodeId>,
    ) -> NodeId {
        let id = NodeId(self.next_slot);
        self.next_slot += 1;
        let idx = id.0 as usize;
        if idx >= self.nodes.len() {
            self.nodes.resize_with(idx + 1, || None);
        }
        self.nodes[idx] = Some(RecallNode {
            id,
            flags,
            inherited: RecallFlags::NONE,
            parent: None,
            children: Vec::new(),
            recall_id,
            dependencies: Vec::new(),
            origin,
            kind,
            done_requested: false,
        });
        self.roots.push(id);
        self.live += 1;
        id
    }

    /// Unlinks `id` from its parent (or the root list), clearing the flags
    /// it inherited when it had a parent. Flags set on the node itself stay.
    fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.node(id).and_then(|n| n.parent) else {
            self.roots.retain(|&r| r != id);
            return;
        };
        if let Some(Some(p)) = self.nodes.get_mut(parent.0 as usize) {
            p.children.retain(|&c| c != id);
        }
        if let Some(Some(c)) = self.nodes.get_mut(id.0 as usize) {
            c.parent = None;
            c.flags.remove(c.inherited);
            c.inherited = RecallFlags::NONE;
            if let Some(recall_id) = &c.recall_id {
                let scope = recall_id.scope().flag();
                c.flags.insert(scope);
            }
        }
    }

    fn free_subtree(&mut self, id: NodeId) -> usize {
        let Some(node) = self.nodes.get_mut(id.0 as usize).and_then(Option::take) else {
            return 0;
        };
        self.live -= 1;
        let mut freed = 1;
        for child in node.children {
            freed += self.free_subtree(child);
        }
        self.emit(TreeEvent::Removed(id));
        freed
    }

    fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self
            .node(id)
            .map(|n| n.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(next) = stack.pop() {
            out.push(next);
            if let Some(n) = self.node(next) {
                stack.extend(n.children.iter().rev().copied());
            }
        }
        out
    }

    fn is_ancestor(&self, ancestor: NodeId, of: NodeId) -> bool {
        let mut current = self.node(of).and_then(|n| n.parent);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.node(id).and_then(|n| n.parent);
        }
        false
    }

    fn node_ref(&self, id: NodeId) -> Result<&RecallNode> {
        self.node(id).ok_or(Error::NodeNotFound(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut RecallNode> {
        self.nodes
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(Error::NodeNotFound(id))
    }

    fn emit(&self, event: TreeEvent) {
        if let Some(tx) = &self.events {
            // a dropped observer only loses notifications
            let _ = tx.send(event);
        }
    }
}
