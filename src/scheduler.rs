//! Clock-relative deferred actions.
//!
//! Every delayed operation in the engine (dispose after a fade, remove a layer
//! once it is silent, tear down the procedural score) is a [`Deferred`] value
//! queued against either the context clock or the transport. Each queued action
//! gets a [`ScheduleToken`] so its owner can cancel it, and slot-based actions
//! additionally carry the generation of the slot they were scheduled for, so a
//! restarted slot ignores a stale action even if cancellation was missed.

use crate::clock::{BeatTime, ClockTime};
use crate::engine::VoiceHandle;
use crate::graph::NodeId;
use crate::sfx::SfxId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeline {
    /// Seconds of rendered audio.
    Context,
    /// Beats of the shared transport.
    Transport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScheduleToken(u64);

#[derive(Debug, Clone, PartialEq)]
pub enum Deferred {
    DisposeNodes(Vec<NodeId>),
    DisposeVoice(VoiceHandle),
    DisposeEffect(SfxId),
    StopMusicSlot {
        slot: String,
        generation: u64,
        retain: bool,
    },
    RemoveLayer {
        id: String,
        generation: u64,
    },
    StopLayered {
        generation: u64,
    },
    ProceduralTeardown {
        generation: u64,
    },
}

#[derive(Debug)]
struct Entry {
    token: ScheduleToken,
    timeline: Timeline,
    at: f64,
    action: Deferred,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    next_token: u64,
    entries: Vec<Entry>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule_at(&mut self, at: ClockTime, action: Deferred) -> ScheduleToken {
        self.push(Timeline::Context, at.secs(), action)
    }

    pub fn schedule_at_beat(&mut self, at: BeatTime, action: Deferred) -> ScheduleToken {
        self.push(Timeline::Transport, at.beats(), action)
    }

    fn push(&mut self, timeline: Timeline, at: f64, action: Deferred) -> ScheduleToken {
        self.next_token += 1;
        let token = ScheduleToken(self.next_token);
        tracing::trace!(?token, ?timeline, at, ?action, "scheduled");
        self.entries.push(Entry {
            token,
            timeline,
            at,
            action,
        });
        token
    }

    /// Returns false if the action already fired or was cancelled.
    pub fn cancel(&mut self, token: ScheduleToken) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.token != token);
        before != self.entries.len()
    }

    pub fn is_pending(&self, token: ScheduleToken) -> bool {
        self.entries.iter().any(|e| e.token == token)
    }

    /// Remove and return every action due at `now`/`beat`, in scheduling order.
    pub fn take_due(&mut self, now: ClockTime, beat: BeatTime) -> Vec<Deferred> {
        let mut due = Vec::new();
        let mut i = 0;
        while i < self.entries.len() {
            let entry = &self.entries[i];
            let ready = match entry.timeline {
                Timeline::Context => entry.at <= now.secs(),
                Timeline::Transport => entry.at <= beat.beats(),
            };
            if ready {
                due.push(self.entries.remove(i));
            } else {
                i += 1;
            }
        }
        due.sort_by_key(|e| e.token);
        due.into_iter().map(|e| e.action).collect()
    }

    /// Drop everything still queued, returning the dropped actions.
    pub fn clear(&mut self) -> Vec<Deferred> {
        self.entries.drain(..).map(|e| e.action).collect()
    }

    pub fn pending(&self) -> usize {
        self.entries.len()
    }
}
