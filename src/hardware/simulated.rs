//! Deterministic simulated audio hardware
//!
//! The play cursor of every buffer only moves when [`SimulatedHardware::advance`]
//! is called, so tests control exactly how much the "hardware" has played
//! between ticks. Handles are cheap clones sharing one device state.

use super::{
    AudioHardware, BufferCaps, BufferDesc, DeviceCaps, ListenerPose, OutputMode, RingVoice,
    SharedRing, SoundBuffer,
};
use crate::config::{CooperativeLevel, PrimaryFormat};
use crate::constants::{DEFAULT_MAX_VOICES, RETAINED_RELEASED_BUFFERS};
use crate::spatial::Vec3;
use crate::{Result, TickleError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct SimState {
    max_voices: usize,
    supports_3d: bool,
    capture: bool,
    fail_init: bool,
    fail_allocations: usize,
    level: Option<CooperativeLevel>,
    primary: Option<(PrimaryFormat, OutputMode)>,
    listener: ListenerPose,
    listener_updates: usize,
    rings: Vec<SharedRing>,
}

/// Cloneable handle to one simulated device.
#[derive(Debug, Clone)]
pub struct SimulatedHardware {
    state: Arc<Mutex<SimState>>,
    voices: Arc<AtomicUsize>,
}

impl Default for SimulatedHardware {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedHardware {
    /// A 3D-capable device with the default voice pool.
    pub fn new() -> Self {
        SimulatedHardware {
            state: Arc::new(Mutex::new(SimState {
                max_voices: DEFAULT_MAX_VOICES,
                supports_3d: true,
                capture: false,
                fail_init: false,
                fail_allocations: 0,
                level: None,
                primary: None,
                listener: ListenerPose::default(),
                listener_updates: 0,
                rings: Vec::new(),
            })),
            voices: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Record every byte that passes a play cursor.
    #[must_use]
    pub fn with_capture(self) -> Self {
        self.state.lock().capture = true;
        self
    }

    /// Limit the voice pool.
    #[must_use]
    pub fn with_max_voices(self, max_voices: usize) -> Self {
        self.state.lock().max_voices = max_voices;
        self
    }

    /// Report no hardware 3D support.
    #[must_use]
    pub fn without_3d(self) -> Self {
        self.state.lock().supports_3d = false;
        self
    }

    /// Make the next `count` buffer allocations fail.
    pub fn fail_next_allocations(&self, count: usize) {
        self.state.lock().fail_allocations = count;
    }

    /// Make device initialization fail.
    pub fn fail_initialization(&self) {
        self.state.lock().fail_init = true;
    }

    /// Advance the play cursor of every playing buffer by `bytes`.
    pub fn advance(&self, bytes: usize) {
        let state = self.state.lock();
        for ring in &state.rings {
            let mut ring = ring.lock();
            if !ring.is_released() {
                ring.advance(bytes);
            }
        }
    }

    /// Inspect the `index`-th buffer allocated (in allocation order).
    pub fn probe(&self, index: usize) -> Option<BufferProbe> {
        self.state
            .lock()
            .rings
            .get(index)
            .map(|ring| BufferProbe {
                ring: Arc::clone(ring),
            })
    }

    /// Buffers currently tracked (live plus recently released).
    pub fn buffer_count(&self) -> usize {
        self.state.lock().rings.len()
    }

    /// Voices currently held by live buffers.
    pub fn active_voices(&self) -> usize {
        self.voices.load(Ordering::Acquire)
    }

    /// Last listener pose pushed by the manager.
    pub fn listener(&self) -> ListenerPose {
        self.state.lock().listener
    }

    /// Number of listener updates received.
    pub fn listener_updates(&self) -> usize {
        self.state.lock().listener_updates
    }

    /// Output mode of the primary buffer, once created.
    pub fn output_mode(&self) -> Option<OutputMode> {
        self.state.lock().primary.map(|(_, mode)| mode)
    }

    /// Cooperative level granted at initialization.
    pub fn cooperative_level(&self) -> Option<CooperativeLevel> {
        self.state.lock().level
    }
}

impl AudioHardware for SimulatedHardware {
    fn initialize(&mut self, level: CooperativeLevel) -> Result<DeviceCaps> {
        let mut state = self.state.lock();
        if state.fail_init {
            return Err(TickleError::AudioDeviceError(
                "simulated device refused to open".into(),
            ));
        }
        state.level = Some(level);
        Ok(DeviceCaps {
            supports_3d: state.supports_3d,
            max_voices: state.max_voices,
        })
    }

    fn create_primary(&mut self, format: &PrimaryFormat, mode: OutputMode) -> Result<()> {
        let mut state = self.state.lock();
        if mode.is_3d() && !state.supports_3d {
            return Err(TickleError::AudioDeviceError(
                "3D primary buffer requested on a stereo-only device".into(),
            ));
        }
        state.primary = Some((*format, mode));
        Ok(())
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<Box<dyn SoundBuffer>> {
        let mut state = self.state.lock();
        if state.fail_allocations > 0 {
            state.fail_allocations -= 1;
            return Err(TickleError::ResourceExhausted(
                "simulated allocation failure".into(),
            ));
        }
        if self.voices.load(Ordering::Acquire) >= state.max_voices {
            return Err(TickleError::ResourceExhausted(format!(
                "all {} voices in use",
                state.max_voices
            )));
        }
        if desc.capacity == 0 {
            return Err(TickleError::ConfigError("zero-capacity buffer".into()));
        }

        let mut desc = *desc;
        if !state.supports_3d {
            desc.caps.remove(BufferCaps::CTRL_3D);
        }
        self.voices.fetch_add(1, Ordering::AcqRel);
        let (voice, ring) = RingVoice::new(&desc, Arc::clone(&self.voices));
        if state.capture {
            ring.lock().enable_capture();
        }

        // Keep released rings inspectable, but only a bounded number of them.
        let released = state.rings.iter().filter(|r| r.lock().is_released()).count();
        if released > RETAINED_RELEASED_BUFFERS {
            let mut excess = released - RETAINED_RELEASED_BUFFERS;
            state.rings.retain(|r| {
                if excess > 0 && r.lock().is_released() {
                    excess -= 1;
                    false
                } else {
                    true
                }
            });
        }
        state.rings.push(ring);
        log::trace!(
            "simulated buffer {} allocated ({} bytes, caps {:?})",
            state.rings.len() - 1,
            desc.capacity,
            desc.caps
        );
        Ok(Box::new(voice))
    }

    fn apply_listener(&mut self, pose: &ListenerPose) -> Result<()> {
        let mut state = self.state.lock();
        state.listener = *pose;
        state.listener_updates += 1;
        Ok(())
    }
}

/// Read-only view of a simulated buffer.
#[derive(Debug, Clone)]
pub struct BufferProbe {
    ring: SharedRing,
}

impl BufferProbe {
    /// Bytes that passed the play cursor (empty unless capture is enabled).
    pub fn captured(&self) -> Vec<u8> {
        self.ring
            .lock()
            .captured()
            .map(<[u8]>::to_vec)
            .unwrap_or_default()
    }

    /// Copy of a ring region (wrapping).
    pub fn region(&self, offset: usize, len: usize) -> Vec<u8> {
        self.ring.lock().region(offset, len)
    }

    /// Hardware read position.
    pub fn play_cursor(&self) -> usize {
        self.ring.lock().play_cursor()
    }

    /// Current attenuation.
    pub fn attenuation(&self) -> i32 {
        self.ring.lock().attenuation()
    }

    /// Current playback frequency.
    pub fn frequency(&self) -> u32 {
        self.ring.lock().frequency()
    }

    /// Current 3D position.
    pub fn position(&self) -> Vec3 {
        self.ring.lock().position()
    }

    /// Current 3D rolloff bounds.
    pub fn distance_range(&self) -> (f32, f32) {
        self.ring.lock().distance_range()
    }

    /// Whether the hardware is reading the buffer.
    pub fn is_playing(&self) -> bool {
        self.ring.lock().is_playing()
    }

    /// Whether the owning handle was dropped.
    pub fn is_released(&self) -> bool {
        self.ring.lock().is_released()
    }

    /// Ring capacity.
    pub fn capacity(&self) -> usize {
        self.ring.lock().capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wave::WaveFormat;

    fn desc(caps: BufferCaps) -> BufferDesc {
        BufferDesc {
            format: WaveFormat::pcm(1_000, 8, 1),
            capacity: 8,
            caps,
        }
    }

    #[test]
    fn test_voice_pool_exhaustion() {
        let mut hw = SimulatedHardware::new().with_max_voices(1);
        let first = hw.create_buffer(&desc(BufferCaps::empty())).unwrap();
        let second = hw.create_buffer(&desc(BufferCaps::empty()));
        assert!(matches!(second, Err(TickleError::ResourceExhausted(_))));

        drop(first);
        assert_eq!(hw.active_voices(), 0);
        assert!(hw.create_buffer(&desc(BufferCaps::empty())).is_ok());
    }

    #[test]
    fn test_forced_allocation_failures() {
        let mut hw = SimulatedHardware::new();
        hw.fail_next_allocations(1);
        assert!(hw.create_buffer(&desc(BufferCaps::empty())).is_err());
        assert!(hw.create_buffer(&desc(BufferCaps::empty())).is_ok());
    }

    #[test]
    fn test_initialization_failure() {
        let mut hw = SimulatedHardware::new();
        hw.fail_initialization();
        assert!(matches!(
            hw.initialize(CooperativeLevel::Normal),
            Err(TickleError::AudioDeviceError(_))
        ));
    }

    #[test]
    fn test_advance_moves_only_playing_buffers() {
        let mut hw = SimulatedHardware::new();
        let mut playing = hw.create_buffer(&desc(BufferCaps::empty())).unwrap();
        let _idle = hw.create_buffer(&desc(BufferCaps::empty())).unwrap();
        playing.play(true).unwrap();

        hw.advance(3);
        assert_eq!(hw.probe(0).unwrap().play_cursor(), 3);
        assert_eq!(hw.probe(1).unwrap().play_cursor(), 0);
    }

    #[test]
    fn test_stereo_device_strips_3d_caps() {
        let mut hw = SimulatedHardware::new().without_3d();
        let buffer = hw.create_buffer(&desc(BufferCaps::CTRL_3D)).unwrap();
        assert!(!buffer.is_3d());
        assert!(hw
            .create_primary(&PrimaryFormat::default(), OutputMode::Positional3D)
            .is_err());
    }

    #[test]
    fn test_capture_through_probe() {
        let mut hw = SimulatedHardware::new().with_capture();
        let mut buffer = hw.create_buffer(&desc(BufferCaps::empty())).unwrap();
        buffer.write(0, &[9; 8]).unwrap();
        buffer.play(true).unwrap();
        hw.advance(4);
        assert_eq!(hw.probe(0).unwrap().captured(), vec![9; 4]);
    }

    #[test]
    fn test_listener_recorded() {
        let mut hw = SimulatedHardware::new();
        let mut pose = ListenerPose::default();
        pose.position = Vec3::new(0.0, 1.0, 0.0);
        hw.apply_listener(&pose).unwrap();
        assert_eq!(hw.listener().position, Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(hw.listener_updates(), 1);
    }
}
