//! Wake/done handshake between the scheduler and one worker.
//!
//! A [`Rendezvous`] is one mutex and two condition variables. The scheduler
//! signals a payload, the worker picks it up, runs, and reports done; the
//! scheduler then collects. All state changes happen under the mutex.
//!
//! ```text
//! Idle --signal--> Waiting --wait--> Running --complete--> Done --collect--> Idle
//!   \______________________ stop (any state) ______________________/--> Stopped
//! ```

use parking_lot::{Condvar, Mutex};

/// Phase of a [`Rendezvous`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendezvousState {
    /// Nothing outstanding; the worker is parked or between jobs.
    Idle,
    /// Signalled; the worker has not picked the payload up yet.
    Waiting,
    /// The worker is running the payload.
    Running,
    /// The worker finished; the scheduler has not collected yet.
    Done,
    /// Terminal.
    Stopped,
}

#[derive(Debug)]
struct Slot<T> {
    state: RendezvousState,
    payload: Option<T>,
}

/// One-producer, one-consumer job handshake.
#[derive(Debug)]
pub struct Rendezvous<T> {
    slot: Mutex<Slot<T>>,
    wake: Condvar,
    done: Condvar,
}

impl<T> Default for Rendezvous<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Rendezvous<T> {
    /// Creates an idle rendezvous.
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                state: RendezvousState::Idle,
                payload: None,
            }),
            wake: Condvar::new(),
            done: Condvar::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> RendezvousState {
        self.slot.lock().state
    }

    /// Hands `payload` to the worker without blocking.
    ///
    /// Returns `false` (dropping the payload) unless the rendezvous is idle.
    pub fn signal(&self, payload: T) -> bool {
        let mut slot = self.slot.lock();
        if slot.state != RendezvousState::Idle {
            return false;
        }
        slot.state = RendezvousState::Waiting;
        slot.payload = Some(payload);
        self.wake.notify_one();
        true
    }

    /// Blocks until a payload is signalled; `None` once stopped.
    pub fn wait(&self) -> Option<T> {
        let mut slot = self.slot.lock();
        loop {
            match slot.state {
                RendezvousState::Waiting => {
                    slot.state = RendezvousState::Running;
                    return slot.payload.take();
                }
                RendezvousState::Stopped => return None,
                _ => self.wake.wait(&mut slot),
            }
        }
    }

    /// Reports the running payload as finished.
    pub fn complete(&self) {
        let mut slot = self.slot.lock();
        if slot.state == RendezvousState::Running {
            slot.state = RendezvousState::Done;
            self.done.notify_all();
        }
    }

    /// Blocks until the signalled payload is done, then returns to idle.
    ///
    /// Returns `false` if nothing was outstanding or the rendezvous stopped.
    pub fn collect(&self) -> bool {
        let mut slot = self.slot.lock();
        loop {
            match slot.state {
                RendezvousState::Done => {
                    slot.state = RendezvousState::Idle;
                    return true;
                }
                RendezvousState::Idle | RendezvousState::Stopped => return false,
                RendezvousState::Waiting | RendezvousState::Running => {
                    self.done.wait(&mut slot);
                }
            }
        }
    }

    /// Moves to the terminal state and wakes both sides.
    pub fn stop(&self) {
        let mut slot = self.slot.lock();
        slot.state = RendezvousState::Stopped;
        slot.payload = None;
        self.wake.notify_all();
        self.done.notify_all();
    }

    /// Returns `true` once stopped.
    pub fn is_stopped(&self) -> bool {
        self.state() == RendezvousState::Stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn full_cycle_returns_to_idle() {
        let rv = Rendezvous::new();
        assert!(rv.signal(7));
        assert_eq!(rv.state(), RendezvousState::Waiting);
        assert!(!rv.signal(8), "second signal is refused");
        assert_eq!(rv.wait(), Some(7));
        assert_eq!(rv.state(), RendezvousState::Running);
        rv.complete();
        assert!(rv.collect());
        assert_eq!(rv.state(), RendezvousState::Idle);
        assert!(!rv.collect(), "nothing outstanding");
    }

    #[test]
    fn collect_blocks_until_worker_completes() {
        let rv = Arc::new(Rendezvous::new());
        let worker = {
            let rv = Arc::clone(&rv);
            thread::spawn(move || {
                let mut seen = Vec::new();
                while let Some(n) = rv.wait() {
                    seen.push(n);
                    rv.complete();
                }
                seen
            })
        };
        for n in 0..50_u32 {
            assert!(rv.signal(n));
            assert!(rv.collect());
        }
        rv.stop();
        assert_eq!(worker.join().unwrap(), (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn stop_releases_a_blocked_collector() {
        let rv = Arc::new(Rendezvous::<()>::new());
        assert!(rv.signal(()));
        let collector = {
            let rv = Arc::clone(&rv);
            thread::spawn(move || rv.collect())
        };
        rv.stop();
        assert!(!collector.join().unwrap());
        assert!(rv.is_stopped());
        assert_eq!(rv.wait(), None);
    }
}
