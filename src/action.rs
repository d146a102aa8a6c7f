//! Action descriptors and completion notifications
//!
//! An [`Action`] is the external description of what to present, when, and
//! with which looping policy. Each presenter reports the end of its action
//! exactly once through a [`CompletionSender`].

use crate::constants::MAX_VOLUME;
use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::presenter::PresenterId;

/// Identifier of an action, assigned by the sequencing system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionId(pub u32);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "action#{}", self.0)
    }
}

/// How many times a presentation plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopCount {
    /// Total number of plays; `Finite(1)` plays once without looping.
    Finite(u32),
    /// Replay until explicitly stopped.
    Infinite,
}

impl LoopCount {
    /// Build a finite count; zero is treated as a single play.
    pub fn finite(plays: u32) -> Self {
        LoopCount::Finite(plays.max(1))
    }

    /// True when the media is played more than once.
    pub fn is_looping(&self) -> bool {
        match self {
            LoopCount::Finite(n) => *n > 1,
            LoopCount::Infinite => true,
        }
    }

    /// Total plays, `None` when infinite.
    pub fn plays(&self) -> Option<u32> {
        match self {
            LoopCount::Finite(n) => Some((*n).max(1)),
            LoopCount::Infinite => None,
        }
    }
}

impl Default for LoopCount {
    fn default() -> Self {
        LoopCount::Finite(1)
    }
}

/// External descriptor of a presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Identifier reported back on completion.
    pub id: ActionId,
    /// Media name, also used as cache key for cached replays.
    pub name: String,
    /// Scheduled start, in manager clock milliseconds.
    pub start_ms: u64,
    /// Nominal duration; `None` when indefinite.
    pub duration_ms: Option<u64>,
    /// Looping policy.
    pub loop_count: LoopCount,
    /// Initial track volume (0-100).
    pub volume: u8,
}

impl Action {
    /// A single play starting immediately at full volume.
    pub fn once(id: u32, name: impl Into<String>) -> Self {
        Action {
            id: ActionId(id),
            name: name.into(),
            start_ms: 0,
            duration_ms: None,
            loop_count: LoopCount::Finite(1),
            volume: MAX_VOLUME,
        }
    }

    /// Builder: set the scheduled start time.
    #[must_use]
    pub fn starting_at(mut self, start_ms: u64) -> Self {
        self.start_ms = start_ms;
        self
    }

    /// Builder: set the looping policy.
    #[must_use]
    pub fn looped(mut self, loop_count: LoopCount) -> Self {
        self.loop_count = match loop_count {
            LoopCount::Finite(n) => LoopCount::finite(n),
            LoopCount::Infinite => LoopCount::Infinite,
        };
        self
    }

    /// Builder: set the initial track volume (clamped to 100).
    #[must_use]
    pub fn with_volume(mut self, volume: u8) -> Self {
        self.volume = volume.min(MAX_VOLUME);
        self
    }

    /// Builder: set the nominal duration.
    #[must_use]
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Loop flag of the action.
    pub fn is_looping(&self) -> bool {
        self.loop_count.is_looping()
    }
}

/// Why a presentation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The media played to its natural end.
    Completed,
    /// The action was stopped explicitly.
    Stopped,
    /// The presenter could not run (resource exhaustion, missing data).
    Failed(String),
}

/// Action-completion notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionEnd {
    /// Action that ended.
    pub action_id: ActionId,
    /// Presenter that ran it.
    pub presenter_id: PresenterId,
    /// How it ended.
    pub outcome: ActionOutcome,
}

/// Sending half of the action-completion channel.
#[derive(Debug, Clone)]
pub struct CompletionSender {
    tx: Sender<ActionEnd>,
}

impl CompletionSender {
    /// Report an action end. A disconnected receiver is not an error: nobody
    /// is listening any more.
    pub fn notify(&self, end: ActionEnd) {
        log::debug!(
            "{} ended on presenter {}: {:?}",
            end.action_id,
            end.presenter_id,
            end.outcome
        );
        if self.tx.send(end).is_err() {
            log::trace!("completion receiver dropped, notification discarded");
        }
    }
}

/// Create an unbounded action-completion channel.
pub fn completion_channel() -> (CompletionSender, Receiver<ActionEnd>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (CompletionSender { tx }, rx)
}
