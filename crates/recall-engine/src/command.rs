//! Commands queued for the next tick boundary.

use std::sync::Arc;

use recall_core::{DriverControl, NodeId, SharedRecallId};

use crate::member::{Member, MemberId};

/// Structural request applied by the scheduler between ticks.
///
/// Commands are enqueued from any thread and drained in order at the start
/// of a tick, never while stages run.
pub enum Command {
    /// Adds a member to its membership list.
    AddMember {
        /// Id reserved by the handle.
        id: MemberId,
        /// The member.
        member: Member,
    },
    /// Instantiates `template` for `run` in `member`.
    Start {
        /// Target member.
        member: MemberId,
        /// Template root to instantiate.
        template: NodeId,
        /// Run the instance is bound to.
        run: SharedRecallId,
    },
    /// Clears persistence of a run's roots so it drains on its own.
    Stop {
        /// Target member.
        member: MemberId,
        /// Run to stop.
        run: SharedRecallId,
    },
    /// Cancels one run, or all runs when `run` is `None`.
    Cancel {
        /// Target member.
        member: MemberId,
        /// Run to cancel.
        run: Option<SharedRecallId>,
    },
    /// Cancels every run of a member and drops it.
    RemoveMember(MemberId),
    /// Changes the tempo of every registered device.
    SetBpm(f64),
    /// Registers a driver stopped on quiescence and retimed on tempo changes.
    RegisterDriver(Arc<dyn DriverControl>),
}

impl Command {
    /// Short name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddMember { .. } => "add-member",
            Self::Start { .. } => "start",
            Self::Stop { .. } => "stop",
            Self::Cancel { .. } => "cancel",
            Self::RemoveMember(_) => "remove-member",
            Self::SetBpm(_) => "set-bpm",
            Self::RegisterDriver(_) => "register-driver",
        }
    }
}

impl core::fmt::Debug for Command {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AddMember { id, member } => f
                .debug_struct("AddMember")
                .field("id", id)
                .field("member", member)
                .finish(),
            Self::Start {
                member,
                template,
                run,
            } => f
                .debug_struct("Start")
                .field("member", member)
                .field("template", template)
                .field("run", &run.to_string())
                .finish(),
            Self::Stop { member, run } => f
                .debug_struct("Stop")
                .field("member", member)
                .field("run", &run.to_string())
                .finish(),
            Self::Cancel { member, run } => f
                .debug_struct("Cancel")
                .field("member", member)
                .field("run", &run.as_ref().map(ToString::to_string))
                .finish(),
            Self::RemoveMember(id) => f.debug_tuple("RemoveMember").field(id).finish(),
            Self::SetBpm(bpm) => f.debug_tuple("SetBpm").field(bpm).finish(),
            Self::RegisterDriver(driver) => {
                f.debug_tuple("RegisterDriver").field(&driver.name()).finish()
            }
        }
    }
}
