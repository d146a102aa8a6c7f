//! Looping chunk buffer
//!
//! Keeps copies of the chunks seen during the first pass of a looped action so
//! later passes replay them without going back to the stream source. Only
//! loop-enabled actions record anything, and only while streaming. A chunk
//! flagged [`LOOP_MARKER`](crate::ChunkFlags::LOOP_MARKER) starts the loopable
//! region: anything recorded before the first marker is an intro and is
//! dropped.

use super::TickleState;
use crate::action::LoopCount;
use crate::chunk::Chunk;

/// Ordered, replayable collection of previously seen chunks.
#[derive(Debug, Clone, Default)]
pub struct LoopingChunkBuffer {
    chunks: Vec<Chunk>,
    cursor: usize,
    enabled: bool,
    loop_start_ms: Option<u64>,
}

impl LoopingChunkBuffer {
    /// Create a buffer; a disabled buffer never records.
    pub fn new(enabled: bool) -> Self {
        LoopingChunkBuffer {
            chunks: Vec::new(),
            cursor: 0,
            enabled,
            loop_start_ms: None,
        }
    }

    /// Record a copy of `chunk` if looping is enabled and the owner is streaming.
    ///
    /// Returns true when the chunk was stored.
    pub fn append(&mut self, chunk: &Chunk, state: TickleState) -> bool {
        if !self.enabled || state != TickleState::Streaming {
            return false;
        }
        if chunk.is_loop_marker() && self.loop_start_ms.is_none() {
            self.chunks.clear();
            self.cursor = 0;
            self.loop_start_ms = Some(chunk.timestamp_ms());
        }
        self.chunks.push(chunk.clone());
        true
    }

    /// Return the chunk at the cursor and advance, or `None` once exhausted.
    ///
    /// The owner decides whether to [`rewind`](Self::rewind) or finish.
    pub fn next(&mut self) -> Option<&Chunk> {
        let chunk = self.chunks.get(self.cursor)?;
        self.cursor += 1;
        Some(chunk)
    }

    /// True when the cursor has passed the last chunk.
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.chunks.len()
    }

    /// Wrap the cursor to the first chunk.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Timestamp the replayed region starts at; 0 without a loop marker.
    pub fn loop_start_ms(&self) -> u64 {
        self.loop_start_ms.unwrap_or(0)
    }

    /// Number of stored chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// True when nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Whether recording is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Total stored payload bytes.
    pub fn payload_bytes(&self) -> usize {
        self.chunks.iter().map(Chunk::len).sum()
    }
}

/// Remaining-plays bookkeeping shared by looping presenters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopCounter {
    remaining: Option<u32>,
}

impl LoopCounter {
    /// Start counting for an action's loop policy; the first play is in progress.
    pub fn new(loop_count: LoopCount) -> Self {
        LoopCounter {
            remaining: loop_count.plays().map(|plays| plays - 1),
        }
    }

    /// Called at the end of a pass. Returns true if another pass should play.
    pub fn next_cycle(&mut self) -> bool {
        match self.remaining.as_mut() {
            None => true,
            Some(0) => false,
            Some(n) => {
                *n -= 1;
                true
            }
        }
    }

    /// Passes left after the current one, `None` when infinite.
    pub fn remaining(&self) -> Option<u32> {
        self.remaining
    }

    /// True for infinite looping.
    pub fn is_infinite(&self) -> bool {
        self.remaining.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkFlags;

    fn chunks(n: u8) -> Vec<Chunk> {
        (0..n).map(|i| Chunk::new(i as u64 * 10, vec![i; 4])).collect()
    }

    #[test]
    fn test_append_requires_streaming_and_loop() {
        let chunk = Chunk::new(0, vec![1]);

        let mut disabled = LoopingChunkBuffer::new(false);
        assert!(!disabled.append(&chunk, TickleState::Streaming));
        assert!(disabled.is_empty());

        let mut enabled = LoopingChunkBuffer::new(true);
        assert!(!enabled.append(&chunk, TickleState::Starting));
        assert!(!enabled.append(&chunk, TickleState::Repeating));
        assert!(enabled.append(&chunk, TickleState::Streaming));
        assert_eq!(enabled.len(), 1);
    }

    #[test]
    fn test_next_exhausts_then_rewinds() {
        let mut buffer = LoopingChunkBuffer::new(true);
        for chunk in chunks(3) {
            buffer.append(&chunk, TickleState::Streaming);
        }

        let first_pass: Vec<u64> = std::iter::from_fn(|| buffer.next().map(|c| c.timestamp_ms()))
            .collect();
        assert_eq!(first_pass, vec![0, 10, 20]);
        assert!(buffer.is_exhausted());
        assert!(buffer.next().is_none());

        buffer.rewind();
        assert_eq!(buffer.next().unwrap().timestamp_ms(), 0);
    }

    #[test]
    fn test_two_plays_replay_exactly_once() {
        // First pass comes from the source, the counter grants one replay.
        let mut buffer = LoopingChunkBuffer::new(true);
        let mut counter = LoopCounter::new(LoopCount::Finite(2));
        let mut observed = 0;

        for chunk in chunks(3) {
            buffer.append(&chunk, TickleState::Streaming);
            observed += 1;
        }
        while counter.next_cycle() {
            buffer.rewind();
            while buffer.next().is_some() {
                observed += 1;
            }
        }
        assert_eq!(observed, 6);
    }

    #[test]
    fn test_infinite_counter_never_ends() {
        let mut counter = LoopCounter::new(LoopCount::Infinite);
        assert!(counter.is_infinite());
        assert!((0..100).all(|_| counter.next_cycle()));
    }

    #[test]
    fn test_single_play_counter() {
        let mut counter = LoopCounter::new(LoopCount::Finite(1));
        assert_eq!(counter.remaining(), Some(0));
        assert!(!counter.next_cycle());
    }

    #[test]
    fn test_loop_marker_drops_intro() {
        let mut buffer = LoopingChunkBuffer::new(true);
        let stream = chunks(4);
        buffer.append(&stream[0], TickleState::Streaming);
        buffer.append(
            &stream[1].clone().with_flags(ChunkFlags::LOOP_MARKER),
            TickleState::Streaming,
        );
        buffer.append(&stream[2], TickleState::Streaming);
        // Only the first marker counts.
        buffer.append(
            &stream[3].clone().with_flags(ChunkFlags::LOOP_MARKER),
            TickleState::Streaming,
        );

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.loop_start_ms(), 10);
        assert_eq!(buffer.next().unwrap().timestamp_ms(), 10, "Intro is not replayed");
    }

    #[test]
    fn test_unmarked_stream_loops_from_start() {
        let mut buffer = LoopingChunkBuffer::new(true);
        for chunk in chunks(2) {
            buffer.append(&chunk, TickleState::Streaming);
        }
        assert_eq!(buffer.loop_start_ms(), 0);
        assert_eq!(buffer.next().unwrap().timestamp_ms(), 0);
    }

    #[test]
    fn test_payload_bytes() {
        let mut buffer = LoopingChunkBuffer::new(true);
        for chunk in chunks(3) {
            buffer.append(&chunk, TickleState::Streaming);
        }
        assert_eq!(buffer.payload_bytes(), 12);
    }
}
