//! Real audio output using rodio
//!
//! [`RodioHardware`] implements [`AudioHardware`] on top of the system output
//! device. Every secondary buffer is a
//! [`HardwareRing`](crate::hardware::HardwareRing) wrapped in a rodio
//! `Source`; the output callback pulls bytes out of the ring, which is what
//! advances the play cursor the wave presenters synchronize on.
//!
//! The rodio `OutputStream` is not `Send`, so a holder thread owns it and
//! hands back the (sendable) stream handle.

use crate::config::{CooperativeLevel, PrimaryFormat};
use crate::constants::DEFAULT_MAX_VOICES;
use crate::hardware::{
    AudioHardware, BufferCaps, BufferDesc, DeviceCaps, ListenerPose, OutputMode, RingVoice,
    SharedRing, SoundBuffer,
};
use crate::{Result, TickleError};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Frames pulled from a ring per lock.
const BATCH_FRAMES: usize = 512;

/// Rolloff gain for a source `distance` away from the listener.
///
/// Full volume inside `min`, inverse-distance falloff up to `max`, constant beyond.
pub(crate) fn rolloff(distance: f32, min: f32, max: f32) -> f32 {
    if !distance.is_finite() || distance <= min || min <= 0.0 {
        return 1.0;
    }
    min / distance.min(max)
}

/// Convert one frame-aligned byte run to f32 samples.
fn decode(format_bits: u16, bytes: &[u8], gain: f32, out: &mut Vec<f32>) {
    match format_bits {
        8 => out.extend(
            bytes
                .iter()
                .map(|&b| (f32::from(b) - 128.0) / 128.0 * gain),
        ),
        _ => out.extend(
            bytes
                .chunks_exact(2)
                .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0 * gain),
        ),
    }
}

/// Audio source that drains a hardware ring.
struct RingSource {
    ring: SharedRing,
    listener: Arc<Mutex<ListenerPose>>,
    positional: bool,
    channels: u16,
    sample_rate: u32,
    batch: Vec<f32>,
    batch_pos: usize,
    scratch: Vec<u8>,
}

impl RingSource {
    fn new(ring: SharedRing, listener: Arc<Mutex<ListenerPose>>, positional: bool) -> Self {
        let (channels, sample_rate) = {
            let ring = ring.lock();
            (ring.format().channels, ring.frequency())
        };
        let samples = BATCH_FRAMES * usize::from(channels);
        RingSource {
            ring,
            listener,
            positional,
            channels,
            sample_rate,
            // Start with one batch of silence so the first frame length is known.
            batch: vec![0.0; samples],
            batch_pos: 0,
            scratch: Vec::new(),
        }
    }

    fn batch_samples(&self) -> usize {
        BATCH_FRAMES * usize::from(self.channels)
    }

    /// Refill the batch; returns false once the buffer handle was released.
    fn refill(&mut self) -> bool {
        let listener = self.listener.lock().position;
        let mut ring = self.ring.lock();
        if ring.is_released() {
            return false;
        }
        let format = ring.format();
        let mut gain = ring.gain();
        if self.positional {
            let (min, max) = ring.distance_range();
            gain *= rolloff(ring.position().distance(listener), min, max);
        }
        self.sample_rate = ring.frequency();
        self.scratch.clear();
        ring.consume_into(BATCH_FRAMES * format.block_align(), &mut self.scratch);
        drop(ring);

        self.batch.clear();
        decode(format.bits_per_sample, &self.scratch, gain, &mut self.batch);
        // Stopped or short reads are padded with silence to keep the stream alive.
        let samples = self.batch_samples();
        self.batch.resize(samples, 0.0);
        self.batch_pos = 0;
        true
    }
}

impl Source for RingSource {
    fn current_frame_len(&self) -> Option<usize> {
        match self.batch.len() - self.batch_pos {
            0 => Some(self.batch_samples()),
            left => Some(left),
        }
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        if self.batch_pos >= self.batch.len() {
            // Next frame starts at the rate the ring is set to now.
            return self.ring.lock().frequency();
        }
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

impl Iterator for RingSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.batch_pos >= self.batch.len() && !self.refill() {
            return None;
        }
        let sample = self.batch[self.batch_pos];
        self.batch_pos += 1;
        Some(sample)
    }
}

struct StreamHolder {
    shutdown: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl StreamHolder {
    fn open() -> Result<(Self, OutputStreamHandle)> {
        let (shutdown, signal) = crossbeam_channel::bounded::<()>(1);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let handle = thread::Builder::new()
            .name("tickle-output".into())
            .spawn(move || match OutputStream::try_default() {
                Ok((stream, handle)) => {
                    let _ = ready_tx.send(Ok(handle));
                    // Keep the stream alive until the device is dropped.
                    let _ = signal.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                }
            })?;

        let stream_handle = ready_rx
            .recv()
            .map_err(|_| TickleError::AudioDeviceError("output thread exited".into()))?
            .map_err(|e| {
                TickleError::AudioDeviceError(format!("Failed to create audio stream: {e}"))
            })?;
        Ok((
            StreamHolder {
                shutdown,
                handle: Some(handle),
            },
            stream_handle,
        ))
    }
}

impl Drop for StreamHolder {
    fn drop(&mut self) {
        let _ = self.shutdown.try_send(());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("output thread panicked");
            }
        }
    }
}

/// System audio device backed by rodio.
pub struct RodioHardware {
    holder: Option<StreamHolder>,
    stream: Option<OutputStreamHandle>,
    listener: Arc<Mutex<ListenerPose>>,
    voices: Arc<AtomicUsize>,
    max_voices: usize,
    sinks: Vec<(SharedRing, Sink)>,
}

impl Default for RodioHardware {
    fn default() -> Self {
        Self::new()
    }
}

impl RodioHardware {
    /// Unopened device; the output stream is created by `initialize`.
    pub fn new() -> Self {
        RodioHardware {
            holder: None,
            stream: None,
            listener: Arc::new(Mutex::new(ListenerPose::default())),
            voices: Arc::new(AtomicUsize::new(0)),
            max_voices: DEFAULT_MAX_VOICES,
            sinks: Vec::new(),
        }
    }

    /// Limit the voice pool.
    pub fn with_max_voices(mut self, max_voices: usize) -> Self {
        self.max_voices = max_voices;
        self
    }

    /// Buffers currently allocated.
    pub fn active_voices(&self) -> usize {
        self.voices.load(Ordering::Acquire)
    }

    fn prune(&mut self) {
        self.sinks.retain(|(ring, sink)| {
            if ring.lock().is_released() {
                sink.stop();
                false
            } else {
                true
            }
        });
    }
}

impl AudioHardware for RodioHardware {
    fn initialize(&mut self, level: CooperativeLevel) -> Result<DeviceCaps> {
        if self.stream.is_none() {
            let (holder, stream) = StreamHolder::open()?;
            self.holder = Some(holder);
            self.stream = Some(stream);
        }
        log::info!("rodio output opened ({level:?})");
        Ok(DeviceCaps {
            supports_3d: true,
            max_voices: self.max_voices,
        })
    }

    fn create_primary(&mut self, format: &PrimaryFormat, mode: OutputMode) -> Result<()> {
        // rodio mixes at the device rate; the primary format is advisory only.
        log::debug!(
            "primary {} Hz/{} bit/{} ch, {:?}",
            format.sample_rate,
            format.bits_per_sample,
            format.channels,
            mode
        );
        Ok(())
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<Box<dyn SoundBuffer>> {
        self.prune();
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| TickleError::AudioDeviceError("device not initialized".into()))?;
        if self.voices.load(Ordering::Acquire) >= self.max_voices {
            return Err(TickleError::ResourceExhausted(format!(
                "all {} voices in use",
                self.max_voices
            )));
        }
        if desc.capacity == 0 {
            return Err(TickleError::ConfigError("zero-capacity buffer".into()));
        }
        let sink = Sink::try_new(stream)
            .map_err(|e| TickleError::ResourceExhausted(format!("Failed to create sink: {e}")))?;

        self.voices.fetch_add(1, Ordering::AcqRel);
        let (voice, ring) = RingVoice::new(desc, Arc::clone(&self.voices));
        let positional = desc.caps.contains(BufferCaps::CTRL_3D);
        sink.append(RingSource::new(
            Arc::clone(&ring),
            Arc::clone(&self.listener),
            positional,
        ));
        self.sinks.push((ring, sink));
        Ok(Box::new(voice))
    }

    fn apply_listener(&mut self, pose: &ListenerPose) -> Result<()> {
        *self.listener.lock() = *pose;
        Ok(())
    }
}

impl Drop for RodioHardware {
    fn drop(&mut self) {
        for (_, sink) in self.sinks.drain(..) {
            sink.stop();
        }
        self.stream = None;
        self.holder = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::Vec3;
    use crate::wave::WaveFormat;
    use approx::assert_relative_eq;

    fn source(bits: u16, positional: bool) -> (RingSource, RingVoice) {
        let desc = BufferDesc {
            format: WaveFormat::pcm(8_000, bits, 1),
            capacity: 4_096,
            caps: BufferCaps::CTRL_VOLUME | BufferCaps::CTRL_3D,
        };
        let (voice, ring) = RingVoice::new(&desc, Arc::new(AtomicUsize::new(1)));
        let listener = Arc::new(Mutex::new(ListenerPose::default()));
        (RingSource::new(ring, listener, positional), voice)
    }

    #[test]
    fn test_rolloff() {
        assert_relative_eq!(rolloff(0.5, 1.0, 100.0), 1.0);
        assert_relative_eq!(rolloff(4.0, 1.0, 100.0), 0.25);
        assert_relative_eq!(rolloff(1_000.0, 1.0, 100.0), 0.01);
    }

    #[test]
    fn test_decode_8_and_16_bit() {
        let mut out = Vec::new();
        decode(8, &[0x80, 0xC0], 1.0, &mut out);
        assert_relative_eq!(out[0], 0.0);
        assert_relative_eq!(out[1], 0.5);

        out.clear();
        decode(16, &(-16_384i16).to_le_bytes(), 0.5, &mut out);
        assert_relative_eq!(out[0], -0.25);
    }

    #[test]
    fn test_stopped_ring_yields_silence() {
        let (mut source, _voice) = source(8, false);
        assert_eq!(source.channels(), 1);
        assert_eq!(source.sample_rate(), 8_000);
        assert!(source.current_frame_len().is_some());
        for _ in 0..BATCH_FRAMES * 2 {
            assert_eq!(source.next(), Some(0.0));
        }
    }

    #[test]
    fn test_playing_ring_advances_cursor() {
        let (mut source, mut voice) = source(8, false);
        voice.write(0, &[0xFF; 4_096]).unwrap();
        voice.set_volume(0).unwrap();
        voice.play(true).unwrap();

        // Drain the initial silence batch, then one real batch.
        for _ in 0..BATCH_FRAMES {
            source.next();
        }
        let sample = source.next().unwrap();
        assert!(sample > 0.9);
        assert_eq!(voice.play_cursor(), BATCH_FRAMES);
    }

    #[test]
    fn test_distance_attenuates_positional_source() {
        let (mut source, mut voice) = source(8, true);
        voice.write(0, &[0xFF; 4_096]).unwrap();
        voice.set_volume(0).unwrap();
        voice.set_position(Vec3::new(0.0, 0.0, 4.0)).unwrap();
        voice.play(true).unwrap();
        for _ in 0..BATCH_FRAMES {
            source.next();
        }
        let sample = source.next().unwrap();
        assert_relative_eq!(sample, 127.0 / 128.0 * 0.25, epsilon = 1e-4);
    }

    #[test]
    fn test_released_ring_ends_source() {
        let (mut source, voice) = source(8, false);
        drop(voice);
        for _ in 0..BATCH_FRAMES {
            source.next();
        }
        assert_eq!(source.next(), None);
    }

    #[test]
    fn test_device_buffer_allocation() {
        let mut hardware = RodioHardware::new().with_max_voices(1);
        if let Err(err) = hardware.initialize(CooperativeLevel::Priority) {
            eprintln!("Skipping rodio hardware test (audio backend unavailable): {err}");
            return;
        }
        let desc = BufferDesc {
            format: WaveFormat::pcm(22_050, 16, 2),
            capacity: 8_820,
            caps: BufferCaps::CTRL_VOLUME,
        };
        let buffer = hardware.create_buffer(&desc).unwrap();
        assert_eq!(hardware.active_voices(), 1);
        assert!(matches!(
            hardware.create_buffer(&desc),
            Err(TickleError::ResourceExhausted(_))
        ));
        drop(buffer);
        assert_eq!(hardware.active_voices(), 0);
    }
}
