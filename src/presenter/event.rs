//! Timed event presenter
//!
//! Delivers each chunk to a sink once the manager clock reaches the action
//! start plus the chunk timestamp. No hardware is involved.

use super::loop_buffer::{LoopCounter, LoopingChunkBuffer};
use super::{PresenterContext, PresenterCore, TickContext, Tickle, TickleState};
use crate::action::{Action, ActionId, ActionOutcome};
use crate::chunk::{Chunk, ChunkSource};
use crossbeam_channel::{Receiver, Sender};

/// Receiver of timed events.
pub trait EventSink: Send {
    /// Called once per chunk when it becomes due.
    fn on_event(&mut self, action: ActionId, chunk: &Chunk);
}

impl<F> EventSink for F
where
    F: FnMut(ActionId, &Chunk) + Send,
{
    fn on_event(&mut self, action: ActionId, chunk: &Chunk) {
        self(action, chunk);
    }
}

/// Sink forwarding events over a channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<(ActionId, Chunk)>,
}

impl ChannelSink {
    /// Create a sink and the receiver it feeds.
    pub fn new() -> (Self, Receiver<(ActionId, Chunk)>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (ChannelSink { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn on_event(&mut self, action: ActionId, chunk: &Chunk) {
        if self.tx.send((action, chunk.clone())).is_err() {
            log::trace!("event receiver dropped for {action}");
        }
    }
}

/// Presenter delivering chunks at their scheduled time.
pub struct EventPresenter {
    core: PresenterCore,
    source: Box<dyn ChunkSource>,
    sink: Box<dyn EventSink>,
    loop_buffer: LoopingChunkBuffer,
    loops: LoopCounter,
    pending: Option<Chunk>,
    cycle_base_ms: u64,
    last_timestamp: u64,
    delivered: u64,
}

impl EventPresenter {
    /// Create an idle presenter.
    pub fn new(
        ctx: &PresenterContext,
        action: Action,
        source: impl ChunkSource + 'static,
        sink: impl EventSink + 'static,
    ) -> Self {
        let looping = action.is_looping();
        let loops = LoopCounter::new(action.loop_count);
        EventPresenter {
            core: PresenterCore::new(ctx, action),
            source: Box::new(source),
            sink: Box::new(sink),
            loop_buffer: LoopingChunkBuffer::new(looping),
            loops,
            pending: None,
            cycle_base_ms: 0,
            last_timestamp: 0,
            delivered: 0,
        }
    }

    /// Events delivered so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    fn next_chunk(&mut self) -> Option<Chunk> {
        if self.core.state() == TickleState::Repeating {
            return self.loop_buffer.next().cloned();
        }
        let chunk = self.source.next_chunk()?;
        self.loop_buffer.append(&chunk, self.core.state());
        Some(chunk)
    }

    fn pass_exhausted(&self) -> bool {
        if self.core.state() == TickleState::Repeating {
            self.loop_buffer.is_exhausted()
        } else {
            self.source.has_reached_end()
        }
    }

    fn pump(&mut self, now_ms: u64) {
        loop {
            if self.pending.is_none() {
                self.pending = self.next_chunk();
            }
            let Some(chunk) = self.pending.take() else {
                if self.pass_exhausted() {
                    self.end_of_pass();
                }
                return;
            };
            if chunk.is_end_of_stream() && chunk.is_empty() {
                continue;
            }
            if now_ms < self.cycle_base_ms + chunk.timestamp_ms() {
                self.pending = Some(chunk);
                return;
            }
            self.last_timestamp = self.last_timestamp.max(chunk.timestamp_ms());
            self.sink.on_event(self.core.action().id, &chunk);
            self.delivered += 1;
        }
    }

    fn end_of_pass(&mut self) {
        if self.loops.next_cycle() && !self.loop_buffer.is_empty() {
            // The loop region restarts one nominal duration later, or right after the last event.
            let end = self
                .core
                .action()
                .duration_ms
                .unwrap_or(self.last_timestamp + 1);
            let span = end.saturating_sub(self.loop_buffer.loop_start_ms()).max(1);
            self.cycle_base_ms += span;
            self.loop_buffer.rewind();
            self.core.transition(TickleState::Repeating);
            return;
        }
        self.end(ActionOutcome::Completed);
    }
}

impl Tickle for EventPresenter {
    fn core(&self) -> &PresenterCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PresenterCore {
        &mut self.core
    }

    fn ready_tickle(&mut self, _ctx: &mut TickContext<'_>) {
        self.core.transition(TickleState::Starting);
    }

    fn starting_tickle(&mut self, ctx: &mut TickContext<'_>) {
        let start = self.core.action().start_ms;
        if ctx.now_ms >= start {
            self.cycle_base_ms = start;
            self.core.transition(TickleState::Streaming);
        }
    }

    fn streaming_tickle(&mut self, ctx: &mut TickContext<'_>) {
        self.pump(ctx.now_ms);
    }

    fn repeating_tickle(&mut self, ctx: &mut TickContext<'_>) {
        self.pump(ctx.now_ms);
    }
}
