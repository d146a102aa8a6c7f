//! In-process sequencer for tests and the demo.

use super::{BlockDoneHandle, Sequencer};
use crate::constants::MAX_VOLUME;
use crate::Result;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug)]
struct SeqState {
    current: Option<BlockDoneHandle>,
    blocks: Vec<Vec<u8>>,
    paused: bool,
    stopped: bool,
    volume: u8,
}

/// Cloneable sequencer whose block completion is fired by hand.
#[derive(Debug, Clone)]
pub struct SimulatedSequencer {
    state: Arc<Mutex<SeqState>>,
}

impl Default for SimulatedSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedSequencer {
    /// Idle sequencer at full volume.
    pub fn new() -> Self {
        SimulatedSequencer {
            state: Arc::new(Mutex::new(SeqState {
                current: None,
                blocks: Vec::new(),
                paused: false,
                stopped: false,
                volume: MAX_VOLUME,
            })),
        }
    }

    /// Fire the completion callback of the block in flight, as the driver
    /// thread would. Returns false when nothing is queued.
    pub fn complete_current(&self) -> bool {
        let handle = self.state.lock().current.take();
        match handle {
            Some(handle) => {
                handle.notify_done();
                true
            }
            None => false,
        }
    }

    /// Blocks submitted so far.
    pub fn submissions(&self) -> usize {
        self.state.lock().blocks.len()
    }

    /// Most recently submitted block.
    pub fn last_block(&self) -> Option<Vec<u8>> {
        self.state.lock().blocks.last().cloned()
    }

    /// True while the transport is paused.
    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    /// True once stopped.
    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }

    /// Current output level.
    pub fn volume(&self) -> u8 {
        self.state.lock().volume
    }
}

impl Sequencer for SimulatedSequencer {
    fn submit(&mut self, block: &[u8], done: BlockDoneHandle) -> Result<()> {
        let mut state = self.state.lock();
        state.blocks.push(block.to_vec());
        state.current = Some(done);
        state.stopped = false;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.current = None;
        state.stopped = true;
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.state.lock().paused = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.state.lock().paused = false;
        Ok(())
    }

    fn set_volume(&mut self, percent: u8) -> Result<()> {
        self.state.lock().volume = percent.min(MAX_VOLUME);
        Ok(())
    }
}
