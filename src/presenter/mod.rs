//! Presenter state machine
//!
//! Every presentation runs as a presenter advanced by one `tickle` per
//! scheduler pass. The tickle dispatches to exactly one handler based on the
//! current [`TickleState`]; a handler performs one stage of work and may move
//! the state machine forward.
//!
//! ```text
//! Idle -> Ready -> Starting -> Streaming -> Repeating -> Done
//!                                   \__________________/
//!                                        (no loop)
//! ```
//!
//! Concrete presenters share [`PresenterCore`] and implement the per-state
//! hooks of [`Tickle`]. The closed set of presenter kinds is resolved once at
//! creation through [`PresenterVariant`].

pub mod event;
pub mod loop_buffer;

use crate::action::{Action, ActionEnd, ActionOutcome, CompletionSender};
use crate::cache::SoundCache;
use crate::config::WaveStreamConfig;
use crate::constants::MAX_VOLUME;
use crate::hardware::AudioHardware;
use crate::manager::VolumePolicy;
use crate::spatial::{DistanceStatus, SoundTrack3D, WorldLookup};
use crate::wave::WavePresenter;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

#[cfg(feature = "music")]
use crate::music::MusicPresenter;
use event::EventPresenter;

/// Lifecycle state of a presenter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TickleState {
    /// Created, not started yet.
    #[default]
    Idle,
    /// Allocating resources.
    Ready,
    /// One-time setup, waiting for the scheduled start.
    Starting,
    /// Steady-state chunk consumption.
    Streaming,
    /// Replaying looped media.
    Repeating,
    /// Terminal.
    Done,
}

impl TickleState {
    fn rank(self) -> u8 {
        match self {
            TickleState::Idle => 0,
            TickleState::Ready => 1,
            TickleState::Starting => 2,
            TickleState::Streaming => 3,
            TickleState::Repeating => 4,
            TickleState::Done => 5,
        }
    }

    /// Check whether `self -> next` is a legal transition.
    ///
    /// Transitions only move forward; any live state may finish; a repeating
    /// presenter may restart through `Ready`.
    pub fn can_transition_to(self, next: TickleState) -> bool {
        match (self, next) {
            (TickleState::Done, _) => false,
            (_, TickleState::Done) => true,
            (TickleState::Repeating, TickleState::Ready) => true,
            (from, to) => to.rank() > from.rank(),
        }
    }

    /// True while the presenter is producing output.
    pub fn is_active(self) -> bool {
        matches!(self, TickleState::Streaming | TickleState::Repeating)
    }
}

/// Unique presenter identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PresenterId(pub u32);

static NEXT_PRESENTER_ID: AtomicU32 = AtomicU32::new(1);

impl PresenterId {
    /// Allocate a fresh process-wide identifier.
    pub fn next() -> Self {
        PresenterId(NEXT_PRESENTER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for PresenterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Closed set of presenter kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresenterKind {
    /// PCM streamed into a hardware ring buffer.
    Wave,
    /// Whole blocks queued to a hardware sequencer.
    Music,
    /// Timed event delivery.
    Event,
}

/// Process-scoped context handed to presenter constructors.
#[derive(Debug, Clone)]
pub struct PresenterContext {
    completion: CompletionSender,
}

impl PresenterContext {
    /// Build a context around a completion channel.
    pub fn new(completion: CompletionSender) -> Self {
        PresenterContext { completion }
    }

    /// Completion channel shared by all presenters.
    pub fn completion(&self) -> &CompletionSender {
        &self.completion
    }
}

/// Everything a presenter may touch during one tick.
pub struct TickContext<'a> {
    /// Manager clock, in milliseconds.
    pub now_ms: u64,
    /// The single hardware device.
    pub hardware: &'a mut dyn AudioHardware,
    /// Global volume policy.
    pub volume: VolumePolicy<'a>,
    /// Scene lookup used by 3D tracks.
    pub world: Option<&'a dyn WorldLookup>,
    /// Reusable-sound cache receiving completed wave payloads.
    pub cache: &'a mut SoundCache,
    /// Ring-buffer layout policy.
    pub wave: WaveStreamConfig,
    /// Whether the primary buffer was created 3D-capable.
    pub enable_3d: bool,
}

/// State and bookkeeping shared by every presenter kind.
#[derive(Debug)]
pub struct PresenterCore {
    id: PresenterId,
    action: Action,
    state: TickleState,
    volume: u8,
    enabled: bool,
    completion: CompletionSender,
    notified: bool,
}

impl PresenterCore {
    /// Create an idle core for `action`.
    pub fn new(ctx: &PresenterContext, action: Action) -> Self {
        let volume = action.volume.min(MAX_VOLUME);
        PresenterCore {
            id: PresenterId::next(),
            action,
            state: TickleState::Idle,
            volume,
            enabled: true,
            completion: ctx.completion.clone(),
            notified: false,
        }
    }

    /// Presenter identifier.
    pub fn id(&self) -> PresenterId {
        self.id
    }

    /// Owning action.
    pub fn action(&self) -> &Action {
        &self.action
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TickleState {
        self.state
    }

    /// Track volume (0-100).
    pub fn volume(&self) -> u8 {
        self.volume
    }

    /// Set the track volume, clamped to 100.
    pub fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(MAX_VOLUME);
    }

    /// Whether the presenter is audible.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or mute the presenter.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Move `Idle -> Ready`. Returns false if already started.
    pub fn start(&mut self) -> bool {
        if self.state != TickleState::Idle {
            return false;
        }
        self.transition(TickleState::Ready)
    }

    /// Apply a transition if legal.
    pub fn transition(&mut self, next: TickleState) -> bool {
        if self.state == next {
            return true;
        }
        if !self.state.can_transition_to(next) {
            log::warn!(
                "presenter {} rejected transition {:?} -> {:?}",
                self.id,
                self.state,
                next
            );
            return false;
        }
        log::debug!(
            "presenter {} ({}) {:?} -> {:?}",
            self.id,
            self.action.name,
            self.state,
            next
        );
        self.state = next;
        true
    }

    /// Enter `Done`, notifying the completion channel exactly once.
    ///
    /// An idle presenter never started its action, so it finishes silently.
    pub fn finish(&mut self, outcome: ActionOutcome) {
        if self.state == TickleState::Done {
            return;
        }
        let was_idle = self.state == TickleState::Idle;
        self.state = TickleState::Done;
        if was_idle || self.notified {
            return;
        }
        self.notified = true;
        if let ActionOutcome::Failed(reason) = &outcome {
            log::error!(
                "presenter {} ({}) failed: {}",
                self.id,
                self.action.name,
                reason
            );
        }
        self.completion.notify(ActionEnd {
            action_id: self.action.id,
            presenter_id: self.id,
            outcome,
        });
    }

    /// True once the completion notification went out.
    pub fn has_notified(&self) -> bool {
        self.notified
    }
}

/// Specialization hooks of the presenter state machine.
///
/// Implementors provide one handler per live state; [`Tickle::tickle`]
/// dispatches to exactly one of them per call.
pub trait Tickle {
    /// Shared presenter state.
    fn core(&self) -> &PresenterCore;

    /// Shared presenter state, mutably.
    fn core_mut(&mut self) -> &mut PresenterCore;

    /// Allocate resources.
    fn ready_tickle(&mut self, ctx: &mut TickContext<'_>);

    /// One-time setup; wait for the scheduled start.
    fn starting_tickle(&mut self, ctx: &mut TickContext<'_>);

    /// Steady-state consumption.
    fn streaming_tickle(&mut self, ctx: &mut TickContext<'_>);

    /// Replay of looped media.
    fn repeating_tickle(&mut self, ctx: &mut TickContext<'_>);

    /// Terminal state; nothing to do by default.
    fn done_tickle(&mut self, _ctx: &mut TickContext<'_>) {}

    /// Release hardware resources. Must be safe to call more than once.
    fn release(&mut self) {}

    /// Run one scheduler pass.
    fn tickle(&mut self, ctx: &mut TickContext<'_>) {
        match self.core().state() {
            TickleState::Idle => {}
            TickleState::Ready => self.ready_tickle(ctx),
            TickleState::Starting => self.starting_tickle(ctx),
            TickleState::Streaming => self.streaming_tickle(ctx),
            TickleState::Repeating => self.repeating_tickle(ctx),
            TickleState::Done => self.done_tickle(ctx),
        }
    }

    /// Current lifecycle state.
    fn state(&self) -> TickleState {
        self.core().state()
    }

    /// Begin the action (`Idle -> Ready`).
    fn start(&mut self) -> bool {
        self.core_mut().start()
    }

    /// End the action synchronously: release resources, then notify.
    fn end(&mut self, outcome: ActionOutcome) {
        self.release();
        self.core_mut().finish(outcome);
    }
}

/// Presenters that can carry a 3D sound track.
pub trait Positionable {
    /// The attached track, if any.
    fn sound_track(&self) -> Option<&SoundTrack3D>;

    /// Configure attenuation rolloff bounds.
    fn set_distance_range(&mut self, min: f32, max: f32) -> crate::Result<DistanceStatus>;

    /// Release the entity reference without touching playback.
    fn unbind_track(&mut self);
}

/// Presenter dispatch over the closed set of kinds.
pub enum PresenterVariant {
    /// Wave ring-buffer streamer.
    Wave(WavePresenter),
    /// Sequenced-music block streamer.
    #[cfg(feature = "music")]
    Music(MusicPresenter),
    /// Timed event presenter.
    Event(EventPresenter),
}

impl PresenterVariant {
    fn as_tickle(&self) -> &dyn Tickle {
        match self {
            PresenterVariant::Wave(p) => p,
            #[cfg(feature = "music")]
            PresenterVariant::Music(p) => p,
            PresenterVariant::Event(p) => p,
        }
    }

    fn as_tickle_mut(&mut self) -> &mut dyn Tickle {
        match self {
            PresenterVariant::Wave(p) => p,
            #[cfg(feature = "music")]
            PresenterVariant::Music(p) => p,
            PresenterVariant::Event(p) => p,
        }
    }

    /// Kind tag.
    pub fn kind(&self) -> PresenterKind {
        match self {
            PresenterVariant::Wave(_) => PresenterKind::Wave,
            #[cfg(feature = "music")]
            PresenterVariant::Music(_) => PresenterKind::Music,
            PresenterVariant::Event(_) => PresenterKind::Event,
        }
    }

    /// Presenter identifier.
    pub fn id(&self) -> PresenterId {
        self.as_tickle().core().id()
    }

    /// Shared core.
    pub fn core(&self) -> &PresenterCore {
        self.as_tickle().core()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TickleState {
        self.as_tickle().state()
    }

    /// Begin the action.
    pub fn start(&mut self) -> bool {
        self.as_tickle_mut().start()
    }

    /// Run one scheduler pass.
    pub fn tickle(&mut self, ctx: &mut TickContext<'_>) {
        self.as_tickle_mut().tickle(ctx);
    }

    /// End the action synchronously.
    pub fn end(&mut self, outcome: ActionOutcome) {
        self.as_tickle_mut().end(outcome);
    }

    /// Set the track volume and re-apply the composed level.
    pub fn set_volume(&mut self, volume: u8, policy: VolumePolicy<'_>) {
        self.as_tickle_mut().core_mut().set_volume(volume);
        self.apply_volume(policy);
    }

    /// Push the composed global × track volume to the output.
    pub fn apply_volume(&mut self, policy: VolumePolicy<'_>) {
        match self {
            PresenterVariant::Wave(p) => p.apply_volume(policy),
            #[cfg(feature = "music")]
            PresenterVariant::Music(p) => p.apply_volume(policy),
            PresenterVariant::Event(_) => {}
        }
    }

    /// Enable or mute the presenter.
    pub fn set_enabled(&mut self, enabled: bool, policy: VolumePolicy<'_>) {
        self.as_tickle_mut().core_mut().set_enabled(enabled);
        self.apply_volume(policy);
    }

    /// Wave presenter access.
    pub fn as_wave(&self) -> Option<&WavePresenter> {
        match self {
            PresenterVariant::Wave(p) => Some(p),
            _ => None,
        }
    }

    /// Wave presenter access, mutably.
    pub fn as_wave_mut(&mut self) -> Option<&mut WavePresenter> {
        match self {
            PresenterVariant::Wave(p) => Some(p),
            _ => None,
        }
    }

    /// Music presenter access.
    #[cfg(feature = "music")]
    pub fn as_music(&self) -> Option<&MusicPresenter> {
        match self {
            PresenterVariant::Music(p) => Some(p),
            _ => None,
        }
    }

    /// Music presenter access, mutably.
    #[cfg(feature = "music")]
    pub fn as_music_mut(&mut self) -> Option<&mut MusicPresenter> {
        match self {
            PresenterVariant::Music(p) => Some(p),
            _ => None,
        }
    }

    /// Event presenter access.
    pub fn as_event(&self) -> Option<&EventPresenter> {
        match self {
            PresenterVariant::Event(p) => Some(p),
            _ => None,
        }
    }
}

impl From<WavePresenter> for PresenterVariant {
    fn from(p: WavePresenter) -> Self {
        PresenterVariant::Wave(p)
    }
}

#[cfg(feature = "music")]
impl From<MusicPresenter> for PresenterVariant {
    fn from(p: MusicPresenter) -> Self {
        PresenterVariant::Music(p)
    }
}

impl From<EventPresenter> for PresenterVariant {
    fn from(p: EventPresenter) -> Self {
        PresenterVariant::Event(p)
    }
}

impl fmt::Debug for PresenterVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresenterVariant")
            .field("kind", &self.kind())
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::completion_channel;

    fn core() -> (PresenterCore, crossbeam_channel::Receiver<ActionEnd>) {
        let (tx, rx) = completion_channel();
        let ctx = PresenterContext::new(tx);
        (PresenterCore::new(&ctx, Action::once(1, "test")), rx)
    }

    #[test]
    fn test_forward_transitions_only() {
        use TickleState::*;
        assert!(Idle.can_transition_to(Ready));
        assert!(Ready.can_transition_to(Starting));
        assert!(Starting.can_transition_to(Streaming));
        assert!(Streaming.can_transition_to(Repeating));
        assert!(Streaming.can_transition_to(Done));

        assert!(!Streaming.can_transition_to(Starting));
        assert!(!Repeating.can_transition_to(Streaming));
        assert!(Repeating.can_transition_to(Ready), "Loop restart goes through Ready");
        assert!(!Done.can_transition_to(Ready), "Done is terminal");
    }

    #[test]
    fn test_rejected_transition_keeps_state() {
        let (mut core, _rx) = core();
        assert!(core.start());
        assert!(core.transition(TickleState::Streaming));
        assert!(!core.transition(TickleState::Starting));
        assert_eq!(core.state(), TickleState::Streaming);
    }

    #[test]
    fn test_start_only_from_idle() {
        let (mut core, _rx) = core();
        assert!(core.start());
        assert!(!core.start());
        assert_eq!(core.state(), TickleState::Ready);
    }

    #[test]
    fn test_finish_notifies_once() {
        let (mut core, rx) = core();
        core.start();
        core.finish(ActionOutcome::Completed);
        core.finish(ActionOutcome::Stopped);

        assert_eq!(core.state(), TickleState::Done);
        assert!(core.has_notified());
        assert_eq!(rx.try_iter().count(), 1, "Exactly one notification");
    }

    #[test]
    fn test_idle_finish_is_silent() {
        let (mut core, rx) = core();
        core.finish(ActionOutcome::Stopped);
        assert_eq!(core.state(), TickleState::Done);
        assert!(rx.try_recv().is_err(), "Idle presenters never notify");
    }

    #[test]
    fn test_volume_clamped() {
        let (mut core, _rx) = core();
        core.set_volume(250);
        assert_eq!(core.volume(), 100);
    }

    #[test]
    fn test_presenter_ids_unique() {
        let a = PresenterId::next();
        let b = PresenterId::next();
        assert_ne!(a, b);
    }
}
