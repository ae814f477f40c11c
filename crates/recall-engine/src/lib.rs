//! Recall Engine - scheduler and worker pool for the recall rendering core
//!
//! The [`Scheduler`] ticks the active members (channels and playback
//! domains) of one [`AudioContext`]. Members that are super-threaded run on
//! their own [`Worker`]; the scheduler fans out to them and waits for all of
//! them before the tick ends, so every member completes a tick before any
//! member starts the next one.
//!
//! Other threads talk to the scheduler through a [`SchedulerHandle`]:
//! structural requests become [`Command`]s applied at the next tick
//! boundary, observation goes through [`Status`].
//!
//! # Example
//!
//! ```rust
//! use recall_core::{Container, RecallFlags, RecallTree, SoundScope};
//! use recall_engine::{AudioContext, Member, Scheduler};
//!
//! let mut tree = RecallTree::new();
//! let template = tree.add_template(Box::new(Container), RecallFlags::NONE);
//!
//! let mut scheduler = Scheduler::new(AudioContext::default().with_time_accounting(false));
//! let handle = scheduler.handle();
//! let member = handle.add_member(Member::channel("track 1", tree))?;
//! let run = handle.start(member, template, SoundScope::Playback)?;
//!
//! // commands apply, the run initializes and ticks once
//! let report = scheduler.tick();
//! assert_eq!(report.dispatches, 1);
//!
//! handle.cancel(member, Some(&run))?;
//! assert!(scheduler.tick().quiescent);
//! # Ok::<(), recall_engine::Error>(())
//! ```

pub mod command;
pub mod context;
pub mod error;
pub mod member;
pub mod rendezvous;
pub mod scheduler;
pub mod status;
pub mod worker;

pub use command::Command;
pub use context::AudioContext;
pub use error::{Error, Result};
pub use member::{Member, MemberBody, MemberId, MemberKind, SharedBody};
pub use rendezvous::{Rendezvous, RendezvousState};
pub use scheduler::{Scheduler, SchedulerHandle, SchedulerThread, TickReport};
pub use status::{CriticalGuard, CriticalRegion, Status};
pub use worker::Worker;
