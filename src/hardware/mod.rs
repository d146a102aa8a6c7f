//! Device, buffer and listener abstraction
//!
//! The boundary between presentation logic and whatever actually produces
//! sound. A backend owns one device; presenters get secondary buffers whose
//! play cursor is advanced by the hardware, never by the writer.
//!
//! Two backends ship with the crate:
//! - [`simulated::SimulatedHardware`]: deterministic, cursor advanced by hand
//! - `streaming::RodioHardware` (feature `streaming`): real output via rodio

pub mod ring;
pub mod simulated;

use crate::config::{CooperativeLevel, PrimaryFormat};
use crate::spatial::Vec3;
use crate::wave::WaveFormat;
use crate::Result;
use bitflags::bitflags;

pub use ring::{HardwareRing, RingVoice, SharedRing};

bitflags! {
    /// Controls requested on a secondary buffer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BufferCaps: u32 {
        /// Volume (attenuation) control.
        const CTRL_VOLUME = 0x0001;
        /// Playback frequency control.
        const CTRL_FREQUENCY = 0x0002;
        /// 3D position and distance control.
        const CTRL_3D = 0x0004;
    }
}

/// Description of a secondary buffer to allocate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferDesc {
    /// Sample format written into the buffer.
    pub format: WaveFormat,
    /// Ring capacity in bytes.
    pub capacity: usize,
    /// Requested controls.
    pub caps: BufferCaps,
}

/// Capabilities reported by a device at initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCaps {
    /// Hardware 3D positioning is available.
    pub supports_3d: bool,
    /// Size of the mixing voice pool.
    pub max_voices: usize,
}

/// Output configuration of the primary mixing buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Plain stereo mixing.
    Stereo,
    /// 3D-capable mixing.
    Positional3D,
}

impl OutputMode {
    /// True for 3D-capable output.
    pub fn is_3d(self) -> bool {
        self == OutputMode::Positional3D
    }
}

/// Pose of the single global listener.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListenerPose {
    /// World position.
    pub position: Vec3,
    /// Facing direction.
    pub forward: Vec3,
    /// Up vector.
    pub up: Vec3,
    /// Velocity in world units per second.
    pub velocity: Vec3,
}

impl Default for ListenerPose {
    fn default() -> Self {
        ListenerPose {
            position: Vec3::ZERO,
            forward: Vec3::Z,
            up: Vec3::Y,
            velocity: Vec3::ZERO,
        }
    }
}

impl ListenerPose {
    /// Merge a partial update; `None` leaves the axis untouched.
    pub fn merge(
        &mut self,
        position: Option<Vec3>,
        forward: Option<Vec3>,
        up: Option<Vec3>,
        velocity: Option<Vec3>,
    ) {
        if let Some(position) = position {
            self.position = position;
        }
        if let Some(forward) = forward {
            self.forward = forward;
        }
        if let Some(up) = up {
            self.up = up;
        }
        if let Some(velocity) = velocity {
            self.velocity = velocity;
        }
    }
}

/// A secondary playback buffer: a fixed byte ring read by the hardware.
pub trait SoundBuffer: Send {
    /// Ring capacity in bytes.
    fn capacity(&self) -> usize;

    /// Controls granted at creation.
    fn caps(&self) -> BufferCaps;

    /// True when 3D controls are available.
    fn is_3d(&self) -> bool {
        self.caps().contains(BufferCaps::CTRL_3D)
    }

    /// Copy `data` into the ring at `offset`, wrapping at the end.
    fn write(&mut self, offset: usize, data: &[u8]) -> Result<()>;

    /// Hardware read position in bytes.
    fn play_cursor(&self) -> usize;

    /// Start (or resume) playback from the current cursor.
    fn play(&mut self, looping: bool) -> Result<()>;

    /// Stop playback, keeping the cursor.
    fn stop(&mut self) -> Result<()>;

    /// Whether the hardware is reading.
    fn is_playing(&self) -> bool;

    /// Set attenuation in hundredths of a decibel (`-10000..=0`).
    fn set_volume(&mut self, attenuation: i32) -> Result<()>;

    /// Current attenuation.
    fn volume(&self) -> i32;

    /// Set the playback frequency in Hz.
    fn set_frequency(&mut self, hz: u32) -> Result<()>;

    /// Current playback frequency in Hz.
    fn frequency(&self) -> u32;

    /// Set the 3D source position.
    fn set_position(&mut self, position: Vec3) -> Result<()>;

    /// Set the 3D rolloff bounds.
    fn set_distance_range(&mut self, min: f32, max: f32) -> Result<()>;
}

/// The single audio device owned by the manager.
pub trait AudioHardware: Send {
    /// Open the device at the given cooperative level.
    fn initialize(&mut self, level: CooperativeLevel) -> Result<DeviceCaps>;

    /// Create the primary mixing buffer.
    fn create_primary(&mut self, format: &PrimaryFormat, mode: OutputMode) -> Result<()>;

    /// Allocate a secondary buffer; fails with `ResourceExhausted` when the voice pool is empty.
    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<Box<dyn SoundBuffer>>;

    /// Push the full listener pose to the device.
    fn apply_listener(&mut self, pose: &ListenerPose) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_partial_merge() {
        let mut pose = ListenerPose::default();
        pose.merge(Some(Vec3::new(1.0, 2.0, 3.0)), None, None, None);
        assert_eq!(pose.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(pose.forward, Vec3::Z, "Unspecified axes stay untouched");
        assert_eq!(pose.up, Vec3::Y);

        pose.merge(None, Some(-Vec3::Z), None, Some(Vec3::new(0.0, 0.0, 4.0)));
        assert_eq!(pose.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(pose.forward, -Vec3::Z);
        assert_eq!(pose.velocity, Vec3::new(0.0, 0.0, 4.0));
    }

    #[test]
    fn test_buffer_caps() {
        let caps = BufferCaps::CTRL_VOLUME | BufferCaps::CTRL_3D;
        assert!(caps.contains(BufferCaps::CTRL_3D));
        assert!(!caps.contains(BufferCaps::CTRL_FREQUENCY));
    }
}
