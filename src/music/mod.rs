//! Sequenced-music block streamer
//!
//! Whole pre-formatted event blocks are queued to a hardware sequencer. The
//! sequencer reports the end of a block through a [`BlockDoneHandle`] from its
//! own thread; the handle only flips flags under a lock, and the presenter
//! acts on them during its next regular tick.

mod presenter;
mod simulated;

pub use presenter::MusicPresenter;
pub use simulated::SimulatedSequencer;

use crate::action::LoopCount;
use crate::Result;
use parking_lot::Mutex;
use std::sync::Arc;

/// Hardware sequencer transport.
pub trait Sequencer: Send {
    /// Queue a block; `done` must be notified once it finished playing.
    fn submit(&mut self, block: &[u8], done: BlockDoneHandle) -> Result<()>;

    /// Stop playback and drop queued blocks.
    fn stop(&mut self) -> Result<()>;

    /// Pause the transport.
    fn pause(&mut self) -> Result<()>;

    /// Resume the transport.
    fn resume(&mut self) -> Result<()>;

    /// Set the output level (0-100).
    fn set_volume(&mut self, percent: u8) -> Result<()>;
}

/// State shared between the tick thread and the driver callback.
#[derive(Debug, Default)]
struct BlockSignal {
    remaining: Option<u32>,
    needs_resubmit: bool,
    finished: bool,
    completions: u64,
}

/// Completion callback handle passed to the sequencer.
#[derive(Debug, Clone)]
pub struct BlockDoneHandle {
    signal: Arc<Mutex<BlockSignal>>,
}

impl BlockDoneHandle {
    pub(crate) fn new(loop_count: LoopCount) -> Self {
        BlockDoneHandle {
            signal: Arc::new(Mutex::new(BlockSignal {
                remaining: loop_count.plays().map(|plays| plays - 1),
                ..BlockSignal::default()
            })),
        }
    }

    /// Report that the submitted block finished playing.
    ///
    /// Safe to call from any thread. Only updates the loop counter and flags;
    /// nothing is resubmitted from here.
    pub fn notify_done(&self) {
        let mut signal = self.signal.lock();
        signal.completions += 1;
        match signal.remaining.as_mut() {
            None => signal.needs_resubmit = true,
            Some(0) => signal.finished = true,
            Some(n) => {
                *n -= 1;
                signal.needs_resubmit = true;
            }
        }
    }

    /// Consume pending flags as `(needs_resubmit, finished)`.
    pub(crate) fn take(&self) -> (bool, bool) {
        let mut signal = self.signal.lock();
        let flags = (signal.needs_resubmit, signal.finished);
        signal.needs_resubmit = false;
        flags
    }

    /// Blocks completed so far.
    pub fn completions(&self) -> u64 {
        self.signal.lock().completions
    }

    /// Replays left, `None` when infinite.
    pub fn remaining(&self) -> Option<u32> {
        self.signal.lock().remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finite_handle_counts_down() {
        let handle = BlockDoneHandle::new(LoopCount::Finite(2));
        assert_eq!(handle.remaining(), Some(1));

        handle.notify_done();
        assert_eq!(handle.take(), (true, false));
        assert_eq!(handle.take(), (false, false), "Flags are consumed");

        handle.notify_done();
        assert_eq!(handle.take(), (false, true));
        assert_eq!(handle.completions(), 2);
    }

    #[test]
    fn test_infinite_handle_never_finishes() {
        let handle = BlockDoneHandle::new(LoopCount::Infinite);
        for _ in 0..100 {
            handle.notify_done();
            assert_eq!(handle.take(), (true, false));
        }
        assert_eq!(handle.remaining(), None);
    }

    #[test]
    fn test_notify_from_other_thread() {
        let handle = BlockDoneHandle::new(LoopCount::Finite(1));
        let remote = handle.clone();
        std::thread::spawn(move || remote.notify_done())
            .join()
            .unwrap();
        assert_eq!(handle.take(), (false, true));
    }
}
