//! Chunks and chunk sources
//!
//! A [`Chunk`] is an immutable, time-stamped unit of encoded media delivered by
//! a stream source. Presenters pull chunks through the [`ChunkSource`] trait and
//! never block: an empty source simply yields `None` until the next tick.

use bitflags::bitflags;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

bitflags! {
    /// Per-chunk flags set by the stream source.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ChunkFlags: u16 {
        /// Last chunk of the stream.
        const END_OF_STREAM = 0x0002;
        /// Payload continues in the next chunk (one logical block split in several chunks).
        const SPLIT = 0x0010;
        /// Chunk marks the start of the loopable region.
        const LOOP_MARKER = 0x0020;
    }
}

/// A time-stamped unit of media payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    timestamp_ms: u64,
    flags: ChunkFlags,
    payload: Vec<u8>,
}

impl Chunk {
    /// Create a chunk at `timestamp_ms` (offset from the action start).
    pub fn new(timestamp_ms: u64, payload: Vec<u8>) -> Self {
        Chunk {
            timestamp_ms,
            flags: ChunkFlags::empty(),
            payload,
        }
    }

    /// Builder: attach flags.
    #[must_use]
    pub fn with_flags(mut self, flags: ChunkFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Create an empty end-of-stream marker.
    pub fn end_of_stream(timestamp_ms: u64) -> Self {
        Chunk::new(timestamp_ms, Vec::new()).with_flags(ChunkFlags::END_OF_STREAM)
    }

    /// Logical timestamp relative to the action start.
    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    /// Chunk flags.
    pub fn flags(&self) -> ChunkFlags {
        self.flags
    }

    /// Encoded payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// True when the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// True when this chunk terminates the stream.
    pub fn is_end_of_stream(&self) -> bool {
        self.flags.contains(ChunkFlags::END_OF_STREAM)
    }

    /// True when the loopable region starts at this chunk.
    pub fn is_loop_marker(&self) -> bool {
        self.flags.contains(ChunkFlags::LOOP_MARKER)
    }

    /// Consume the chunk and return its payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

/// Inbound contract of the external stream controller.
///
/// Implementations must never block: `next_chunk` returns `None` when no data
/// is available yet, and the presenter retries on its next tick.
pub trait ChunkSource: Send {
    /// Take the next available chunk, if any.
    fn next_chunk(&mut self) -> Option<Chunk>;

    /// True once the source has delivered its last chunk.
    fn has_reached_end(&self) -> bool;
}

impl<S: ChunkSource + ?Sized> ChunkSource for Box<S> {
    fn next_chunk(&mut self) -> Option<Chunk> {
        (**self).next_chunk()
    }

    fn has_reached_end(&self) -> bool {
        (**self).has_reached_end()
    }
}

/// A fully known list of chunks, delivered one per request.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    chunks: VecDeque<Chunk>,
}

impl MemorySource {
    /// Create a source from pre-built chunks.
    pub fn new(chunks: Vec<Chunk>) -> Self {
        MemorySource {
            chunks: chunks.into(),
        }
    }

    /// Split a contiguous payload into chunks of `chunk_size` bytes.
    ///
    /// Timestamps advance by `chunk_ms` per chunk.
    pub fn from_bytes(data: &[u8], chunk_size: usize, chunk_ms: u64) -> Self {
        let chunk_size = chunk_size.max(1);
        let chunks = data
            .chunks(chunk_size)
            .enumerate()
            .map(|(i, part)| Chunk::new(i as u64 * chunk_ms, part.to_vec()))
            .collect();
        MemorySource { chunks }
    }

    /// Chunks not yet delivered.
    pub fn remaining(&self) -> usize {
        self.chunks.len()
    }
}

impl ChunkSource for MemorySource {
    fn next_chunk(&mut self) -> Option<Chunk> {
        self.chunks.pop_front()
    }

    fn has_reached_end(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[derive(Debug, Default)]
struct QueueState {
    chunks: VecDeque<Chunk>,
    finished: bool,
}

/// A source fed asynchronously through a [`QueueFeeder`].
///
/// This is the in-process stand-in for a stream controller: the feeder may live
/// on another thread and push chunks while the presenter keeps ticking.
#[derive(Debug, Clone)]
pub struct QueueSource {
    state: Arc<Mutex<QueueState>>,
}

/// Producer half of a [`QueueSource`].
#[derive(Debug, Clone)]
pub struct QueueFeeder {
    state: Arc<Mutex<QueueState>>,
}

impl QueueSource {
    /// Create a source and its feeder.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (QueueSource, QueueFeeder) {
        let state = Arc::new(Mutex::new(QueueState::default()));
        (
            QueueSource {
                state: Arc::clone(&state),
            },
            QueueFeeder { state },
        )
    }

    /// Number of chunks waiting to be consumed.
    pub fn pending(&self) -> usize {
        self.state.lock().chunks.len()
    }
}

impl ChunkSource for QueueSource {
    fn next_chunk(&mut self) -> Option<Chunk> {
        let mut state = self.state.lock();
        let chunk = state.chunks.pop_front()?;
        if chunk.is_end_of_stream() {
            state.finished = true;
        }
        Some(chunk)
    }

    fn has_reached_end(&self) -> bool {
        let state = self.state.lock();
        state.finished && state.chunks.is_empty()
    }
}

impl QueueFeeder {
    /// Queue a chunk. Chunks pushed after [`QueueFeeder::finish`] are ignored.
    pub fn push(&self, chunk: Chunk) {
        let mut state = self.state.lock();
        if state.finished {
            log::warn!(
                "dropping chunk at {}ms pushed after end of stream",
                chunk.timestamp_ms()
            );
            return;
        }
        if chunk.is_end_of_stream() {
            state.finished = true;
        }
        state.chunks.push_back(chunk);
    }

    /// Queue a plain payload chunk.
    pub fn push_bytes(&self, timestamp_ms: u64, payload: Vec<u8>) {
        self.push(Chunk::new(timestamp_ms, payload));
    }

    /// Signal end of stream.
    pub fn finish(&self) {
        self.state.lock().finished = true;
    }

    /// True once the stream has been finished.
    pub fn is_finished(&self) -> bool {
        self.state.lock().finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_source_from_bytes() {
        let mut source = MemorySource::from_bytes(&[1, 2, 3, 4, 5], 2, 10);
        assert_eq!(source.remaining(), 3);

        let first = source.next_chunk().unwrap();
        assert_eq!(first.payload(), &[1, 2]);
        assert_eq!(first.timestamp_ms(), 0);

        let second = source.next_chunk().unwrap();
        assert_eq!(second.timestamp_ms(), 10);

        let last = source.next_chunk().unwrap();
        assert_eq!(last.payload(), &[5]);
        assert!(source.has_reached_end());
        assert!(source.next_chunk().is_none());
    }

    #[test]
    fn test_queue_source_not_ended_until_finished() {
        let (mut source, feeder) = QueueSource::new();
        assert!(source.next_chunk().is_none());
        assert!(!source.has_reached_end(), "An empty open queue is only starved");

        feeder.push_bytes(0, vec![9; 4]);
        feeder.finish();
        assert!(!source.has_reached_end(), "Pending chunks keep the stream alive");

        assert_eq!(source.next_chunk().unwrap().len(), 4);
        assert!(source.has_reached_end());
    }

    #[test]
    fn test_queue_source_end_of_stream_flag() {
        let (mut source, feeder) = QueueSource::new();
        feeder.push(Chunk::new(0, vec![1]));
        feeder.push(Chunk::end_of_stream(5));
        assert!(feeder.is_finished());

        feeder.push_bytes(10, vec![2]);
        assert_eq!(source.pending(), 2, "Chunks after end of stream are dropped");

        source.next_chunk();
        let eos = source.next_chunk().unwrap();
        assert!(eos.is_end_of_stream());
        assert!(source.has_reached_end());
    }

    #[test]
    fn test_queue_feeder_across_threads() {
        let (mut source, feeder) = QueueSource::new();
        let handle = std::thread::spawn(move || {
            for i in 0..8u8 {
                feeder.push_bytes(i as u64, vec![i]);
            }
            feeder.finish();
        });
        handle.join().unwrap();

        let mut seen = Vec::new();
        while let Some(chunk) = source.next_chunk() {
            seen.push(chunk.payload()[0]);
        }
        assert_eq!(seen, (0..8).collect::<Vec<u8>>());
        assert!(source.has_reached_end());
    }
}
