//! The scheduler main loop.
//!
//! One real-time thread ticks the active members at the context's tick
//! frequency. A tick:
//!
//! 1. drains the command queue (unless the critical region is held) and the
//!    start queue,
//! 2. cancels members whose device stopped,
//! 3. for every scope: runs the inline members, signals the workers of
//!    super-threaded members, then blocks until every signalled worker is
//!    done,
//! 4. sweeps every member tree, ends runs without live roots and retires
//!    members whose runs all ended,
//! 5. stops the registered drivers when the last member retired.
//!
//! Membership lists sit behind a recursive tree lock that is only held for
//! structural work, never while stages run.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, ReentrantMutex};
use recall_core::{
    DriverControl, NodeId, OffsetListener, SharedRecallId, SoundScope, TimingKey,
};

use crate::command::Command;
use crate::context::AudioContext;
use crate::error::{Error, Result};
use crate::member::{Member, MemberBody, MemberId, MemberKind, SharedBody};
use crate::rendezvous::Rendezvous;
use crate::status::{CriticalGuard, CriticalRegion, Status};
use crate::worker::Worker;

struct Slot {
    id: MemberId,
    member: Member,
    worker: Option<Worker>,
}

#[derive(Default)]
struct Memberships {
    channels: Vec<Slot>,
    domains: Vec<Slot>,
    drivers: Vec<Arc<dyn DriverControl>>,
}

impl Memberships {
    fn slots(&self) -> impl Iterator<Item = &Slot> {
        self.channels.iter().chain(self.domains.iter())
    }

    fn find(&self, id: MemberId) -> Option<&Slot> {
        self.slots().find(|s| s.id == id)
    }

    fn find_mut(&mut self, id: MemberId) -> Option<&mut Slot> {
        self.channels
            .iter_mut()
            .chain(self.domains.iter_mut())
            .find(|s| s.id == id)
    }

    fn take(&mut self, id: MemberId) -> Option<Slot> {
        if let Some(i) = self.channels.iter().position(|s| s.id == id) {
            return Some(self.channels.remove(i));
        }
        let i = self.domains.iter().position(|s| s.id == id)?;
        Some(self.domains.remove(i))
    }

    fn register_driver(&mut self, driver: Arc<dyn DriverControl>) {
        if !self.drivers.iter().any(|d| Arc::ptr_eq(d, &driver)) {
            self.drivers.push(driver);
        }
    }
}

/// Moves members whose runs all ended from `list` to `retired`.
fn retire_finished(list: &mut Vec<Slot>, retired: &mut Vec<Slot>) {
    let mut i = 0;
    while i < list.len() {
        let finished = list[i].member.started && list[i].member.body.lock().runs().is_empty();
        if finished {
            retired.push(list.remove(i));
        } else {
            i += 1;
        }
    }
}

type TreeLock = ReentrantMutex<RefCell<Memberships>>;

type Dispatch = (SharedBody, Option<Arc<Rendezvous<SoundScope>>>);

/// State shared by the scheduler, its handles and the drivers' listener.
struct Shared {
    context: AudioContext,
    status: Mutex<Status>,
    critical: CriticalRegion,
    timing: Mutex<TimingKey>,
    next_member: AtomicU32,
}

impl OffsetListener for Shared {
    // Each new offset adds its length at the tempo it played at.
    fn offset_changed(&self, note_offset: u64, absolute: u64) {
        let per_offset = self.timing.lock().seconds_per_offset();
        let mut status = self.status.lock();
        let elapsed = absolute.saturating_sub(status.note_offset_absolute);
        status.uptime += Duration::from_secs_f64(elapsed as f64 * per_offset);
        status.note_offset = note_offset;
        status.note_offset_absolute = absolute;
    }

    fn buffer_completed(&self) {
        self.status.lock().buffers_completed += 1;
    }
}

struct StartRequest {
    member: MemberId,
    template: NodeId,
    run: SharedRecallId,
}

/// What one [`Scheduler::tick`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Index of this tick.
    pub tick: u64,
    /// Commands applied.
    pub commands: usize,
    /// Commands were left queued because the critical region was held.
    pub deferred: bool,
    /// Member-scope dispatches that ran.
    pub dispatches: usize,
    /// Nodes freed by the sweep.
    pub freed: usize,
    /// Runs that ended.
    pub runs_ended: usize,
    /// Members retired.
    pub members_retired: usize,
    /// No member is active and no start is pending.
    pub quiescent: bool,
}

/// The main loop.
///
/// Drive it with [`tick()`](Self::tick) for deterministic offline use, or
/// move it onto its own thread with [`spawn()`](Self::spawn).
pub struct Scheduler {
    shared: Arc<Shared>,
    members: Arc<TreeLock>,
    sender: Sender<Command>,
    commands: Receiver<Command>,
    start_queue: VecDeque<StartRequest>,
    active: bool,
    tick_count: u64,
}

impl Scheduler {
    /// Creates an idle scheduler for `context`.
    pub fn new(context: AudioContext) -> Self {
        let (sender, commands) = crossbeam_channel::unbounded();
        let timing = context.timing_key();
        Self {
            shared: Arc::new(Shared {
                context,
                status: Mutex::new(Status::default()),
                critical: CriticalRegion::new(),
                timing: Mutex::new(timing),
                next_member: AtomicU32::new(0),
            }),
            members: Arc::new(ReentrantMutex::new(RefCell::new(Memberships::default()))),
            sender,
            commands,
            start_queue: VecDeque::new(),
            active: false,
            tick_count: 0,
        }
    }

    /// A cloneable handle for other threads.
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            shared: Arc::clone(&self.shared),
            members: Arc::clone(&self.members),
            commands: self.sender.clone(),
        }
    }

    /// The engine context.
    pub fn context(&self) -> &AudioContext {
        &self.shared.context
    }

    /// Current status.
    pub fn status(&self) -> Status {
        self.shared.status.lock().clone()
    }

    /// Ticks completed so far.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Runs one tick.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport {
            tick: self.tick_count,
            ..TickReport::default()
        };
        if self.shared.critical.is_held() {
            report.deferred = !self.commands.is_empty();
        } else {
            report.commands = self.drain_commands();
        }
        self.process_starts();
        self.cancel_stopped_devices();

        let snapshot = self.snapshot();
        for scope in SoundScope::ALL {
            report.dispatches += run_scope(scope, &snapshot);
        }
        drop(snapshot);

        let retired = self.finish_tick(&mut report);
        for slot in retired {
            tracing::info!(member = %slot.id, name = %slot.member.name, "member retired");
        }

        report.quiescent = self.check_quiescence();
        self.tick_count += 1;
        self.update_status(&report);
        report
    }

    /// Ticks until quiescent, at most `max_ticks` times.
    ///
    /// Returns the number of ticks run.
    pub fn run_until_quiescent(&mut self, max_ticks: u64) -> u64 {
        for n in 1..=max_ticks {
            if self.tick().quiescent {
                return n;
            }
        }
        max_ticks
    }

    /// Ticks until `stop` is set.
    ///
    /// With time accounting each tick is padded to the tick period;
    /// without it the loop free-runs while active and idles one period per
    /// quiescent tick.
    pub fn run(&mut self, stop: &AtomicBool) {
        let period = self.shared.context.tick_period();
        let accounting = self.shared.context.time_accounting();
        tracing::info!(
            period_us = period.as_micros() as u64,
            accounting,
            "scheduler started"
        );
        while !stop.load(Ordering::Acquire) {
            let started = Instant::now();
            let report = self.tick();
            if accounting {
                if let Some(rest) = period.checked_sub(started.elapsed()) {
                    std::thread::sleep(rest);
                }
            } else if report.quiescent {
                std::thread::sleep(period);
            }
        }
        tracing::info!(ticks = self.tick_count, "scheduler stopped");
    }

    /// Moves the scheduler onto its own thread.
    pub fn spawn(mut self) -> Result<SchedulerThread> {
        let handle = self.handle();
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let thread = std::thread::Builder::new()
            .name("recall-scheduler".into())
            .spawn(move || {
                self.run(&flag);
                self
            })
            .map_err(|source| Error::Spawn {
                name: "recall-scheduler".into(),
                source,
            })?;
        Ok(SchedulerThread {
            handle,
            stop,
            thread: Some(thread),
        })
    }

    fn drain_commands(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(command) = self.commands.try_recv() {
            let name = command.name();
            if let Err(e) = self.apply(command) {
                tracing::warn!(command = name, error = %e, "command refused");
            }
            applied += 1;
        }
        applied
    }

    fn apply(&mut self, command: Command) -> Result<()> {
        match command {
            Command::AddMember { id, member } => {
                self.add_member(id, member);
                Ok(())
            }
            Command::Start {
                member,
                template,
                run,
            } => {
                self.start_queue.push_back(StartRequest {
                    member,
                    template,
                    run,
                });
                Ok(())
            }
            Command::Stop { member, run } => self.with_body(member, |body| body.stop(&run)),
            Command::Cancel { member, run } => {
                self.with_body(member, |body| body.cancel(run.as_ref()))
            }
            Command::RemoveMember(id) => {
                let slot = {
                    let guard = self.members.lock();
                    let mut members = guard.borrow_mut();
                    members.take(id)
                };
                let slot = slot.ok_or(Error::MemberNotFound(id))?;
                slot.member.body.lock().cancel(None)?;
                tracing::info!(member = %id, name = %slot.member.name, "member removed");
                Ok(())
            }
            Command::SetBpm(bpm) => self.set_bpm(bpm),
            Command::RegisterDriver(driver) => {
                let guard = self.members.lock();
                guard.borrow_mut().register_driver(driver);
                Ok(())
            }
        }
    }

    fn add_member(&mut self, id: MemberId, member: Member) {
        let threaded = member
            .super_threaded
            .unwrap_or(self.shared.context.super_threaded());
        let worker = if threaded {
            let body = Arc::clone(&member.body);
            match Worker::spawn(format!("recall-{}", member.name), move |scope| {
                body.lock().tick(scope);
            }) {
                Ok(worker) => Some(worker),
                Err(e) => {
                    tracing::warn!(member = %id, error = %e, "no worker, ticking inline");
                    None
                }
            }
        } else {
            None
        };
        tracing::info!(
            member = %id,
            name = %member.name,
            threaded = worker.is_some(),
            "member added"
        );

        let guard = self.members.lock();
        let mut members = guard.borrow_mut();
        if let Some(driver) = &member.driver {
            members.register_driver(Arc::clone(driver));
        }
        let kind = member.kind;
        let slot = Slot { id, member, worker };
        match kind {
            MemberKind::Channel => members.channels.push(slot),
            MemberKind::PlaybackDomain => members.domains.push(slot),
        }
    }

    fn with_body(
        &self,
        id: MemberId,
        f: impl FnOnce(&mut MemberBody) -> recall_core::Result<()>,
    ) -> Result<()> {
        let guard = self.members.lock();
        let members = guard.borrow();
        let slot = members.find(id).ok_or(Error::MemberNotFound(id))?;
        let mut body = slot.member.body.lock();
        f(&mut body)?;
        Ok(())
    }

    fn set_bpm(&self, bpm: f64) -> Result<()> {
        {
            let mut timing = self.shared.timing.lock();
            let key = TimingKey { bpm, ..*timing };
            key.validate()?;
            *timing = key;
        }
        let guard = self.members.lock();
        let members = guard.borrow();
        for driver in &members.drivers {
            let state = driver.state();
            let device = state.lock();
            let current = *device.borrow().clock.tables().key();
            device.borrow_mut().retime(TimingKey { bpm, ..current })?;
        }
        tracing::info!(bpm, drivers = members.drivers.len(), "tempo changed");
        Ok(())
    }

    fn process_starts(&mut self) {
        if self.start_queue.is_empty() {
            return;
        }
        let guard = self.members.lock();
        let mut members = guard.borrow_mut();
        while let Some(request) = self.start_queue.pop_front() {
            let Some(slot) = members.find_mut(request.member) else {
                tracing::warn!(member = %request.member, "start for unknown member dropped");
                continue;
            };
            let result = slot
                .member
                .body
                .lock()
                .start(request.template, Arc::clone(&request.run));
            match result {
                Ok(root) => {
                    slot.member.started = true;
                    tracing::debug!(member = %slot.id, run = %request.run, %root, "run started");
                }
                Err(e) => {
                    tracing::warn!(member = %slot.id, run = %request.run, error = %e, "start refused");
                }
            }
        }
    }

    fn cancel_stopped_devices(&self) {
        let guard = self.members.lock();
        let members = guard.borrow();
        for slot in members.slots() {
            let Some(driver) = &slot.member.driver else {
                continue;
            };
            if driver.is_running() {
                continue;
            }
            let mut body = slot.member.body.lock();
            if body.runs().is_empty() {
                continue;
            }
            tracing::warn!(member = %slot.id, driver = driver.name(), "device stopped, cancelling member");
            if let Err(e) = body.cancel(None) {
                tracing::warn!(member = %slot.id, error = %e, "cancel failed");
            }
        }
    }

    fn snapshot(&self) -> Vec<Dispatch> {
        let guard = self.members.lock();
        let members = guard.borrow();
        members
            .slots()
            .map(|s| {
                (
                    Arc::clone(&s.member.body),
                    s.worker.as_ref().map(|w| Arc::clone(w.rendezvous())),
                )
            })
            .collect()
    }

    /// Sweeps every member and returns the retired ones.
    ///
    /// The retired slots are dropped by the caller, after the tree lock is
    /// released, since dropping a worker joins its thread.
    fn finish_tick(&mut self, report: &mut TickReport) -> Vec<Slot> {
        let guard = self.members.lock();
        let mut members = guard.borrow_mut();
        for slot in members.slots() {
            let (freed, ended) = slot.member.body.lock().sweep();
            report.freed += freed;
            report.runs_ended += ended.len();
            for run in &ended {
                tracing::debug!(member = %slot.id, run = %run, "run ended");
            }
        }
        let mut retired = Vec::new();
        retire_finished(&mut members.channels, &mut retired);
        retire_finished(&mut members.domains, &mut retired);
        report.members_retired = retired.len();
        retired
    }

    fn check_quiescence(&mut self) -> bool {
        let guard = self.members.lock();
        let members = guard.borrow();
        let quiescent = members.channels.is_empty()
            && members.domains.is_empty()
            && self.start_queue.is_empty();
        if quiescent && self.active {
            for driver in &members.drivers {
                driver.stop();
            }
            tracing::info!(
                ticks = self.tick_count,
                drivers = members.drivers.len(),
                "scheduler quiescent"
            );
        }
        self.active = !quiescent;
        quiescent
    }

    fn update_status(&self, report: &TickReport) {
        let (channels, domains, starting) = {
            let guard = self.members.lock();
            let members = guard.borrow();
            let starting = members.slots().any(|s| s.member.body.lock().is_starting());
            (members.channels.len(), members.domains.len(), starting)
        };
        let mut status = self.shared.status.lock();
        status.is_playing = !report.quiescent;
        status.is_starting = starting || !self.start_queue.is_empty();
        status.tick_count = self.tick_count;
        status.channels = channels;
        status.domains = domains;
    }
}

/// Runs `scope` across the snapshot: inline members, then workers, then
/// fan-in. Returns the number of members that ran.
fn run_scope(scope: SoundScope, snapshot: &[Dispatch]) -> usize {
    let mut dispatched = 0;
    for (body, _) in snapshot.iter().filter(|(_, rv)| rv.is_none()) {
        let mut body = body.lock();
        if body.has_scope(scope) {
            body.tick(scope);
            dispatched += 1;
        }
    }

    let mut signalled = Vec::new();
    for (body, rv) in snapshot {
        let Some(rv) = rv else {
            continue;
        };
        let active = body.lock().has_scope(scope);
        if active && rv.signal(scope) {
            signalled.push(rv);
        }
    }
    for rv in signalled {
        if rv.collect() {
            dispatched += 1;
        }
    }
    dispatched
}

/// Cloneable, thread-safe front end of a [`Scheduler`].
#[derive(Clone)]
pub struct SchedulerHandle {
    shared: Arc<Shared>,
    members: Arc<TreeLock>,
    commands: Sender<Command>,
}

impl SchedulerHandle {
    /// The engine context.
    pub fn context(&self) -> &AudioContext {
        &self.shared.context
    }

    /// Current status.
    pub fn status(&self) -> Status {
        self.shared.status.lock().clone()
    }

    /// Enters the critical region; queued commands wait until the guard
    /// drops.
    pub fn critical_region(&self) -> CriticalGuard<'_> {
        self.shared.critical.enter()
    }

    /// Listener to hand to device drivers.
    pub fn listener(&self) -> Weak<dyn OffsetListener> {
        let listener: Arc<dyn OffsetListener> = Arc::clone(&self.shared) as Arc<dyn OffsetListener>;
        Arc::downgrade(&listener)
    }

    /// Queues a raw command.
    pub fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| Error::Disconnected)
    }

    /// Queues `member` for addition and returns its id.
    pub fn add_member(&self, member: Member) -> Result<MemberId> {
        let id = MemberId(self.shared.next_member.fetch_add(1, Ordering::Relaxed));
        self.send(Command::AddMember { id, member })?;
        Ok(id)
    }

    /// Allocates a run in `scope` and queues `template` to start in it.
    pub fn start(
        &self,
        member: MemberId,
        template: NodeId,
        scope: SoundScope,
    ) -> Result<SharedRecallId> {
        let run = self.shared.context.allocate(scope);
        self.start_run(member, template, Arc::clone(&run))?;
        Ok(run)
    }

    /// Queues `template` to start in an existing run.
    pub fn start_run(&self, member: MemberId, template: NodeId, run: SharedRecallId) -> Result<()> {
        self.send(Command::Start {
            member,
            template,
            run,
        })
    }

    /// Queues a graceful stop of `run`.
    pub fn stop(&self, member: MemberId, run: &SharedRecallId) -> Result<()> {
        self.send(Command::Stop {
            member,
            run: Arc::clone(run),
        })
    }

    /// Queues cancellation of `run`, or of every run of `member`.
    pub fn cancel(&self, member: MemberId, run: Option<&SharedRecallId>) -> Result<()> {
        self.send(Command::Cancel {
            member,
            run: run.cloned(),
        })
    }

    /// Queues removal of `member`.
    pub fn remove_member(&self, member: MemberId) -> Result<()> {
        self.send(Command::RemoveMember(member))
    }

    /// Validates `bpm` and queues the tempo change.
    pub fn set_bpm(&self, bpm: f64) -> Result<()> {
        TimingKey {
            bpm,
            ..*self.shared.timing.lock()
        }
        .validate()?;
        self.send(Command::SetBpm(bpm))
    }

    /// Queues registration of a driver.
    pub fn register_driver(&self, driver: Arc<dyn DriverControl>) -> Result<()> {
        self.send(Command::RegisterDriver(driver))
    }

    /// Runs `f` on the body of an active member.
    ///
    /// Blocks while the member is being ticked.
    pub fn with_member<R>(&self, id: MemberId, f: impl FnOnce(&mut MemberBody) -> R) -> Result<R> {
        let guard = self.members.lock();
        let members = guard.borrow();
        let slot = members.find(id).ok_or(Error::MemberNotFound(id))?;
        let mut body = slot.member.body.lock();
        Ok(f(&mut body))
    }
}

/// A scheduler running on its own thread.
pub struct SchedulerThread {
    handle: SchedulerHandle,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<Scheduler>>,
}

impl SchedulerThread {
    /// Handle of the running scheduler.
    pub fn handle(&self) -> &SchedulerHandle {
        &self.handle
    }

    /// Stops the loop and returns the scheduler.
    pub fn stop(mut self) -> Result<Scheduler> {
        self.stop.store(true, Ordering::Release);
        let thread = self.thread.take().ok_or(Error::Disconnected)?;
        thread.join().map_err(|_| Error::Disconnected)
    }
}

impl Drop for SchedulerThread {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            tracing::error!("scheduler thread panicked");
        }
    }
}
