//! Hardware playback ring
//!
//! A fixed-capacity byte ring with a hardware-advanced read cursor. The writer
//! addresses it by absolute offset; the cursor only moves when the backend
//! consumes bytes (simulated clock or an output stream pulling samples).
//!
//! Memory consumption is fixed at `capacity` bytes regardless of stream length.

use super::{BufferCaps, BufferDesc, SoundBuffer};
use crate::constants::{
    DEFAULT_MAX_DISTANCE, DEFAULT_MIN_DISTANCE, MAX_ATTENUATION, MAX_BUFFER_FREQUENCY,
    MIN_ATTENUATION, MIN_BUFFER_FREQUENCY,
};
use crate::spatial::Vec3;
use crate::wave::WaveFormat;
use crate::{Result, TickleError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Ring shared between a buffer handle and the backend reading it.
pub type SharedRing = Arc<Mutex<HardwareRing>>;

/// Byte ring plus the per-voice parameters the hardware applies while reading.
#[derive(Debug)]
pub struct HardwareRing {
    format: WaveFormat,
    data: Vec<u8>,
    play_cursor: usize,
    playing: bool,
    looping: bool,
    released: bool,
    attenuation: i32,
    frequency: u32,
    position: Vec3,
    min_distance: f32,
    max_distance: f32,
    capture: Option<Vec<u8>>,
}

impl HardwareRing {
    /// Create a ring prefilled with the format's silence value.
    pub fn new(format: WaveFormat, capacity: usize) -> Self {
        HardwareRing {
            format,
            data: vec![format.silence_byte(); capacity],
            play_cursor: 0,
            playing: false,
            looping: false,
            released: false,
            attenuation: MAX_ATTENUATION,
            frequency: format.sample_rate,
            position: Vec3::ZERO,
            min_distance: DEFAULT_MIN_DISTANCE,
            max_distance: DEFAULT_MAX_DISTANCE,
            capture: None,
        }
    }

    /// Record every byte the cursor passes over.
    pub fn enable_capture(&mut self) {
        self.capture.get_or_insert_with(Vec::new);
    }

    /// Bytes played so far, if capture is enabled.
    pub fn captured(&self) -> Option<&[u8]> {
        self.capture.as_deref()
    }

    /// Sample format.
    pub fn format(&self) -> WaveFormat {
        self.format
    }

    /// Capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Hardware read position.
    pub fn play_cursor(&self) -> usize {
        self.play_cursor
    }

    /// Whether the ring is being read.
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Whether the owning buffer handle was dropped.
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Current attenuation in hundredths of a decibel.
    pub fn attenuation(&self) -> i32 {
        self.attenuation
    }

    /// Linear gain equivalent of the attenuation.
    pub fn gain(&self) -> f32 {
        if self.attenuation <= MIN_ATTENUATION {
            return 0.0;
        }
        10f32.powf(self.attenuation as f32 / 2000.0)
    }

    /// Playback frequency in Hz.
    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    /// 3D source position.
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// 3D rolloff bounds.
    pub fn distance_range(&self) -> (f32, f32) {
        (self.min_distance, self.max_distance)
    }

    /// Copy of `len` bytes starting at `offset` (wrapping).
    pub fn region(&self, offset: usize, len: usize) -> Vec<u8> {
        let cap = self.data.len();
        (0..len).map(|i| self.data[(offset + i) % cap]).collect()
    }

    fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        let cap = self.data.len();
        if bytes.len() > cap {
            return Err(TickleError::ConfigError(format!(
                "write of {} bytes exceeds ring capacity {cap}",
                bytes.len()
            )));
        }
        let start = offset % cap;
        let first = bytes.len().min(cap - start);
        self.data[start..start + first].copy_from_slice(&bytes[..first]);
        self.data[..bytes.len() - first].copy_from_slice(&bytes[first..]);
        Ok(())
    }

    /// Consume up to `bytes` from the cursor, appending them to `out`.
    ///
    /// Returns the number of bytes consumed. A non-looping ring stops at its end.
    pub fn consume_into(&mut self, bytes: usize, out: &mut Vec<u8>) -> usize {
        if !self.playing || self.data.is_empty() {
            return 0;
        }
        let cap = self.data.len();
        let mut left = bytes;
        let mut consumed = 0;
        while left > 0 && self.playing {
            let run = left.min(cap - self.play_cursor);
            let span = &self.data[self.play_cursor..self.play_cursor + run];
            out.extend_from_slice(span);
            if let Some(capture) = self.capture.as_mut() {
                capture.extend_from_slice(span);
            }
            self.play_cursor += run;
            consumed += run;
            left -= run;
            if self.play_cursor == cap {
                self.play_cursor = 0;
                if !self.looping {
                    self.playing = false;
                }
            }
        }
        consumed
    }

    /// Advance the cursor by `bytes`, discarding the data read.
    pub fn advance(&mut self, bytes: usize) -> usize {
        let mut sink = Vec::with_capacity(bytes.min(self.data.len()));
        let mut consumed = 0;
        let mut left = bytes;
        // Bounded scratch so large advances never allocate more than one ring.
        while left > 0 {
            sink.clear();
            let step = left.min(self.data.len().max(1));
            let n = self.consume_into(step, &mut sink);
            if n == 0 {
                break;
            }
            consumed += n;
            left -= n;
        }
        consumed
    }
}

/// [`SoundBuffer`] handle over a shared ring, holding one voice of the pool.
pub struct RingVoice {
    ring: SharedRing,
    caps: BufferCaps,
    voices: Arc<AtomicUsize>,
}

impl RingVoice {
    /// Wrap a ring; the voice is returned to `voices` on drop.
    pub fn new(desc: &BufferDesc, voices: Arc<AtomicUsize>) -> (Self, SharedRing) {
        let ring = Arc::new(Mutex::new(HardwareRing::new(desc.format, desc.capacity)));
        (
            RingVoice {
                ring: Arc::clone(&ring),
                caps: desc.caps,
                voices,
            },
            ring,
        )
    }

    fn require(&self, cap: BufferCaps, what: &str) -> Result<()> {
        if self.caps.contains(cap) {
            Ok(())
        } else {
            Err(TickleError::ConfigError(format!(
                "buffer was created without {what} control"
            )))
        }
    }
}

impl SoundBuffer for RingVoice {
    fn capacity(&self) -> usize {
        self.ring.lock().capacity()
    }

    fn caps(&self) -> BufferCaps {
        self.caps
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        self.ring.lock().write(offset, data)
    }

    fn play_cursor(&self) -> usize {
        self.ring.lock().play_cursor
    }

    fn play(&mut self, looping: bool) -> Result<()> {
        let mut ring = self.ring.lock();
        ring.looping = looping;
        ring.playing = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.ring.lock().playing = false;
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.ring.lock().playing
    }

    fn set_volume(&mut self, attenuation: i32) -> Result<()> {
        self.require(BufferCaps::CTRL_VOLUME, "volume")?;
        self.ring.lock().attenuation = attenuation.clamp(MIN_ATTENUATION, MAX_ATTENUATION);
        Ok(())
    }

    fn volume(&self) -> i32 {
        self.ring.lock().attenuation
    }

    fn set_frequency(&mut self, hz: u32) -> Result<()> {
        self.require(BufferCaps::CTRL_FREQUENCY, "frequency")?;
        self.ring.lock().frequency = hz.clamp(MIN_BUFFER_FREQUENCY, MAX_BUFFER_FREQUENCY);
        Ok(())
    }

    fn frequency(&self) -> u32 {
        self.ring.lock().frequency
    }

    fn set_position(&mut self, position: Vec3) -> Result<()> {
        self.require(BufferCaps::CTRL_3D, "3D")?;
        self.ring.lock().position = position;
        Ok(())
    }

    fn set_distance_range(&mut self, min: f32, max: f32) -> Result<()> {
        self.require(BufferCaps::CTRL_3D, "3D")?;
        let mut ring = self.ring.lock();
        ring.min_distance = min;
        ring.max_distance = max;
        Ok(())
    }
}

impl Drop for RingVoice {
    fn drop(&mut self) {
        let mut ring = self.ring.lock();
        ring.playing = false;
        ring.released = true;
        drop(ring);
        self.voices.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format() -> WaveFormat {
        WaveFormat::pcm(1_000, 8, 1)
    }

    fn voice(capacity: usize, caps: BufferCaps) -> (RingVoice, SharedRing, Arc<AtomicUsize>) {
        let voices = Arc::new(AtomicUsize::new(1));
        let desc = BufferDesc {
            format: format(),
            capacity,
            caps,
        };
        let (voice, ring) = RingVoice::new(&desc, Arc::clone(&voices));
        (voice, ring, voices)
    }

    #[test]
    fn test_ring_prefilled_with_silence() {
        let ring = HardwareRing::new(format(), 8);
        assert!(ring.region(0, 8).iter().all(|&b| b == 0x80));
    }

    #[test]
    fn test_write_wraps() {
        let (mut voice, ring, _) = voice(8, BufferCaps::empty());
        voice.write(6, &[1, 2, 3, 4]).unwrap();
        assert_eq!(ring.lock().region(6, 4), vec![1, 2, 3, 4]);
        assert_eq!(ring.lock().region(0, 2), vec![3, 4]);
    }

    #[test]
    fn test_oversized_write_rejected() {
        let (mut voice, _, _) = voice(4, BufferCaps::empty());
        assert!(voice.write(0, &[0; 5]).is_err());
    }

    #[test]
    fn test_cursor_only_moves_while_playing() {
        let (mut voice, ring, _) = voice(8, BufferCaps::empty());
        assert_eq!(ring.lock().advance(4), 0);

        voice.play(true).unwrap();
        assert_eq!(ring.lock().advance(4), 4);
        assert_eq!(voice.play_cursor(), 4);

        voice.stop().unwrap();
        assert_eq!(ring.lock().advance(4), 0);
        assert_eq!(voice.play_cursor(), 4, "Stop keeps the cursor");
    }

    #[test]
    fn test_looping_wraps_and_one_shot_stops() {
        let (mut voice, ring, _) = voice(8, BufferCaps::empty());
        voice.play(true).unwrap();
        assert_eq!(ring.lock().advance(12), 12);
        assert_eq!(voice.play_cursor(), 4);

        voice.play(false).unwrap();
        assert_eq!(ring.lock().advance(12), 4);
        assert!(!voice.is_playing());
    }

    #[test]
    fn test_capture_records_played_bytes() {
        let (mut voice, ring, _) = voice(4, BufferCaps::empty());
        ring.lock().enable_capture();
        voice.write(0, &[1, 2, 3, 4]).unwrap();
        voice.play(true).unwrap();
        ring.lock().advance(6);
        assert_eq!(ring.lock().captured().unwrap(), &[1, 2, 3, 4, 1, 2]);
    }

    #[test]
    fn test_controls_require_caps() {
        let (mut plain, _, _) = voice(4, BufferCaps::CTRL_VOLUME);
        assert!(plain.set_volume(-500).is_ok());
        assert!(plain.set_position(Vec3::ZERO).is_err());
        assert!(plain.set_frequency(22_050).is_err());
    }

    #[test]
    fn test_drop_returns_voice() {
        let (voice, ring, voices) = voice(4, BufferCaps::empty());
        drop(voice);
        assert_eq!(voices.load(Ordering::Acquire), 0);
        assert!(ring.lock().is_released());
    }

    #[test]
    fn test_gain_from_attenuation() {
        let mut ring = HardwareRing::new(format(), 4);
        assert_eq!(ring.gain(), 1.0);
        ring.attenuation = MIN_ATTENUATION;
        assert_eq!(ring.gain(), 0.0);
        ring.attenuation = -2000;
        assert!((ring.gain() - 0.1).abs() < 1e-4);
    }
}
