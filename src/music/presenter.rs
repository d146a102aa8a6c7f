use super::{BlockDoneHandle, Sequencer};
use crate::action::{Action, ActionOutcome};
use crate::chunk::{ChunkFlags, ChunkSource};
use crate::manager::VolumePolicy;
use crate::presenter::{PresenterContext, PresenterCore, TickContext, Tickle, TickleState};

/// Streams one pre-formatted block to a hardware sequencer, replaying it per
/// the action's loop policy.
pub struct MusicPresenter {
    core: PresenterCore,
    source: Box<dyn ChunkSource>,
    sequencer: Box<dyn Sequencer>,
    block: Vec<u8>,
    block_complete: bool,
    signal: BlockDoneHandle,
    submitted: bool,
    suspended: bool,
    submissions: u64,
}

impl MusicPresenter {
    /// Create an idle presenter.
    pub fn new(
        ctx: &PresenterContext,
        action: Action,
        source: impl ChunkSource + 'static,
        sequencer: impl Sequencer + 'static,
    ) -> Self {
        let signal = BlockDoneHandle::new(action.loop_count);
        MusicPresenter {
            core: PresenterCore::new(ctx, action),
            source: Box::new(source),
            sequencer: Box::new(sequencer),
            block: Vec::new(),
            block_complete: false,
            signal,
            submitted: false,
            suspended: false,
            submissions: 0,
        }
    }

    /// Completion handle shared with the sequencer.
    pub fn done_handle(&self) -> &BlockDoneHandle {
        &self.signal
    }

    /// Times the block was queued.
    pub fn submissions(&self) -> u64 {
        self.submissions
    }

    /// True while the sequencer transport is suspended.
    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Pause the sequencer transport.
    pub fn suspend(&mut self) {
        if self.suspended {
            return;
        }
        self.suspended = true;
        if let Err(e) = self.sequencer.pause() {
            log::warn!("presenter {} suspend failed: {e}", self.core.id());
        }
    }

    /// Resume the sequencer transport.
    pub fn resume(&mut self) {
        if !self.suspended {
            return;
        }
        self.suspended = false;
        if let Err(e) = self.sequencer.resume() {
            log::warn!("presenter {} resume failed: {e}", self.core.id());
        }
    }

    /// Send the composed global × track volume to the sequencer.
    pub fn apply_volume(&mut self, policy: VolumePolicy<'_>) {
        let percent = if self.core.is_enabled() {
            policy.effective(self.core.volume())
        } else {
            0
        };
        if let Err(e) = self.sequencer.set_volume(percent) {
            log::warn!("presenter {} volume not applied: {e}", self.core.id());
        }
    }

    fn submit(&mut self) -> bool {
        match self.sequencer.submit(&self.block, self.signal.clone()) {
            Ok(()) => {
                self.submitted = true;
                self.submissions += 1;
                log::trace!(
                    "presenter {} queued block ({} bytes, submission {})",
                    self.core.id(),
                    self.block.len(),
                    self.submissions
                );
                true
            }
            Err(e) => {
                self.end(ActionOutcome::Failed(e.to_string()));
                false
            }
        }
    }

    fn react(&mut self) {
        let (resubmit, finished) = self.signal.take();
        if finished {
            self.end(ActionOutcome::Completed);
        } else if resubmit && self.submit() {
            self.core.transition(TickleState::Repeating);
        }
    }
}

impl Tickle for MusicPresenter {
    fn core(&self) -> &PresenterCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PresenterCore {
        &mut self.core
    }

    /// Assemble the block; split blocks arrive as several `SPLIT` chunks.
    fn ready_tickle(&mut self, ctx: &mut TickContext<'_>) {
        while !self.block_complete {
            match self.source.next_chunk() {
                Some(chunk) => {
                    let split = chunk.flags().contains(ChunkFlags::SPLIT);
                    self.block.extend_from_slice(chunk.payload());
                    self.block_complete = !split || chunk.is_end_of_stream();
                }
                None if self.source.has_reached_end() => {
                    if self.block.is_empty() {
                        self.end(ActionOutcome::Failed("no music block delivered".into()));
                        return;
                    }
                    self.block_complete = true;
                }
                None => return,
            }
        }
        self.apply_volume(ctx.volume);
        self.core.transition(TickleState::Starting);
    }

    fn starting_tickle(&mut self, ctx: &mut TickContext<'_>) {
        if ctx.now_ms < self.core.action().start_ms {
            return;
        }
        if self.submit() {
            self.core.transition(TickleState::Streaming);
        }
    }

    fn streaming_tickle(&mut self, _ctx: &mut TickContext<'_>) {
        self.react();
    }

    fn repeating_tickle(&mut self, _ctx: &mut TickContext<'_>) {
        self.react();
    }

    fn release(&mut self) {
        if !self.submitted {
            return;
        }
        self.submitted = false;
        if let Err(e) = self.sequencer.stop() {
            log::trace!("presenter {} stop on release: {e}", self.core.id());
        }
    }
}

impl Drop for MusicPresenter {
    fn drop(&mut self) {
        self.release();
    }
}
