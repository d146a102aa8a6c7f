//! 3D sound track
//!
//! Follows a named world entity and pushes its position (and optionally a
//! speed-derived pitch) into a buffer's 3D parameters once per tick. A track
//! whose entity cannot be resolved, or whose buffer has no 3D control, plays
//! non-positionally at the manager-composed volume. The speed pitch only needs
//! a resolved entity.

use super::world::{EntityHandle, EntityTraits, WorldLookup};
use crate::constants::{
    speed_frequency_multiplier, DEFAULT_MAX_DISTANCE, DEFAULT_MIN_DISTANCE, HEAD_LOCATOR,
};
use crate::hardware::SoundBuffer;
use crate::{Result, TickleError};

/// Outcome of a distance-range request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceStatus {
    /// Range pushed to the hardware.
    Applied,
    /// The track is not positional; nothing was changed.
    Not3D,
}

/// Binding between a sound buffer and a tracked world entity.
#[derive(Debug, Clone)]
pub struct SoundTrack3D {
    entity_name: String,
    entity: Option<EntityHandle>,
    mode_3d: bool,
    traits: EntityTraits,
    base_frequency: u32,
    multiplier: f32,
    min_distance: f32,
    max_distance: f32,
}

impl SoundTrack3D {
    /// An unbound track for `entity_name`.
    pub fn new(entity_name: impl Into<String>) -> Self {
        SoundTrack3D {
            entity_name: entity_name.into(),
            entity: None,
            mode_3d: false,
            traits: EntityTraits::default(),
            base_frequency: 0,
            multiplier: 1.0,
            min_distance: DEFAULT_MIN_DISTANCE,
            max_distance: DEFAULT_MAX_DISTANCE,
        }
    }

    /// Resolve the entity and enable 3D mode when possible.
    ///
    /// Returns false (and stays non-positional) when the world is absent, the
    /// name does not resolve or the buffer lacks 3D control. A resolved entity
    /// on a buffer without 3D control still drives the speed pitch.
    pub fn bind(&mut self, world: Option<&dyn WorldLookup>, buffer: &mut dyn SoundBuffer) -> bool {
        self.base_frequency = buffer.frequency();
        self.multiplier = 1.0;

        let entity = world.and_then(|world| world.resolve_by_name(&self.entity_name));
        let (Some(world), Some(entity)) = (world, entity) else {
            log::warn!(
                "entity '{}' not found, playing without 3D positioning",
                self.entity_name
            );
            self.entity = None;
            self.mode_3d = false;
            return false;
        };
        self.entity = Some(entity);
        self.traits = world.traits(entity);

        if !buffer.is_3d() {
            log::debug!(
                "buffer has no 3D control, '{}' plays non-positionally",
                self.entity_name
            );
            self.mode_3d = false;
            return false;
        }
        self.mode_3d = true;
        if let Err(e) = buffer.set_distance_range(self.min_distance, self.max_distance) {
            log::warn!("distance range for '{}' not applied: {e}", self.entity_name);
        }
        true
    }

    /// Recompute and push the per-tick parameters.
    ///
    /// `fallback_attenuation` is the manager-composed level used when the
    /// track is not positional.
    pub fn update(
        &mut self,
        world: Option<&dyn WorldLookup>,
        buffer: &mut dyn SoundBuffer,
        fallback_attenuation: i32,
    ) {
        let (Some(world), Some(entity)) = (world, self.entity) else {
            self.degrade(buffer, fallback_attenuation);
            return;
        };
        let Some(transform) = world.world_transform(entity) else {
            log::warn!("entity '{}' disappeared, dropping 3D mode", self.entity_name);
            self.degrade(buffer, fallback_attenuation);
            return;
        };

        if self.mode_3d {
            let position = if self.traits.facing {
                world
                    .locator(entity, HEAD_LOCATOR)
                    .unwrap_or(transform.position)
            } else {
                transform.position
            };
            if position.is_finite() {
                if let Err(e) = buffer.set_position(position) {
                    log::trace!("position for '{}' not applied: {e}", self.entity_name);
                }
            }
        } else if let Err(e) = buffer.set_volume(fallback_attenuation) {
            log::trace!("fallback volume not applied: {e}");
        }

        if self.traits.speed_pitch && self.base_frequency > 0 {
            self.multiplier = speed_frequency_multiplier(world.speed(entity));
            let hz = (self.base_frequency as f32 * self.multiplier).round() as u32;
            if let Err(e) = buffer.set_frequency(hz) {
                log::trace!("pitch for '{}' not applied: {e}", self.entity_name);
            }
        }
    }

    fn degrade(&mut self, buffer: &mut dyn SoundBuffer, fallback_attenuation: i32) {
        self.entity = None;
        self.mode_3d = false;
        if let Err(e) = buffer.set_volume(fallback_attenuation) {
            log::trace!("fallback volume not applied: {e}");
        }
    }

    /// Configure rolloff bounds.
    ///
    /// Requires `0 < min <= max`. A non-positional track keeps its settings
    /// untouched and reports [`DistanceStatus::Not3D`].
    pub fn set_distance_range(
        &mut self,
        min: f32,
        max: f32,
        buffer: Option<&mut dyn SoundBuffer>,
    ) -> Result<DistanceStatus> {
        if !(min > 0.0 && min <= max && max.is_finite()) {
            return Err(TickleError::ConfigError(format!(
                "invalid distance range {min}..{max}"
            )));
        }
        let Some(buffer) = buffer.filter(|_| self.mode_3d) else {
            return Ok(DistanceStatus::Not3D);
        };
        buffer.set_distance_range(min, max)?;
        self.min_distance = min;
        self.max_distance = max;
        Ok(DistanceStatus::Applied)
    }

    /// Release the entity reference; playback is unaffected.
    pub fn unbind(&mut self) {
        self.entity = None;
        self.mode_3d = false;
    }

    /// Unbind and restore default geometry and pitch.
    pub fn reset(&mut self) {
        self.unbind();
        self.traits = EntityTraits::default();
        self.multiplier = 1.0;
        self.min_distance = DEFAULT_MIN_DISTANCE;
        self.max_distance = DEFAULT_MAX_DISTANCE;
    }

    /// Tracked entity name.
    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    /// Resolved entity, if bound.
    pub fn entity(&self) -> Option<EntityHandle> {
        self.entity
    }

    /// True while positional.
    pub fn is_3d(&self) -> bool {
        self.mode_3d
    }

    /// Frequency captured at bind time.
    pub fn base_frequency(&self) -> u32 {
        self.base_frequency
    }

    /// Current speed-derived frequency multiplier.
    pub fn multiplier(&self) -> f32 {
        self.multiplier
    }

    /// Current rolloff bounds.
    pub fn distance_range(&self) -> (f32, f32) {
        (self.min_distance, self.max_distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{AudioHardware, BufferCaps, BufferDesc};
    use crate::spatial::{EntityTable, Vec3, WorldTransform};
    use crate::wave::WaveFormat;
    use crate::SimulatedHardware;
    use approx::assert_relative_eq;

    fn buffer(hw: &mut SimulatedHardware, caps: BufferCaps) -> Box<dyn SoundBuffer> {
        hw.create_buffer(&BufferDesc {
            format: WaveFormat::pcm(22_050, 16, 1),
            capacity: 64,
            caps: caps | BufferCaps::CTRL_VOLUME | BufferCaps::CTRL_FREQUENCY,
        })
        .unwrap()
    }

    #[test]
    fn test_bind_and_follow_position() {
        let mut hw = SimulatedHardware::new();
        let mut buf = buffer(&mut hw, BufferCaps::CTRL_3D);
        let world = EntityTable::new();
        let car = world.insert("car", WorldTransform::at(Vec3::new(1.0, 0.0, 0.0)));

        let mut track = SoundTrack3D::new("car");
        assert!(track.bind(Some(&world), buf.as_mut()));
        assert!(track.is_3d());

        world.set_position(car, Vec3::new(5.0, 0.0, 2.0));
        track.update(Some(&world), buf.as_mut(), -600);
        assert_eq!(hw.probe(0).unwrap().position(), Vec3::new(5.0, 0.0, 2.0));
    }

    #[test]
    fn test_unresolved_entity_falls_back() {
        let mut hw = SimulatedHardware::new();
        let mut buf = buffer(&mut hw, BufferCaps::CTRL_3D);
        let world = EntityTable::new();

        let mut track = SoundTrack3D::new("ghost");
        assert!(!track.bind(Some(&world), buf.as_mut()));
        track.update(Some(&world), buf.as_mut(), -602);
        assert_eq!(hw.probe(0).unwrap().attenuation(), -602);
        assert_eq!(hw.probe(0).unwrap().position(), Vec3::ZERO);
    }

    #[test]
    fn test_facing_entity_uses_head() {
        let mut hw = SimulatedHardware::new();
        let mut buf = buffer(&mut hw, BufferCaps::CTRL_3D);
        let world = EntityTable::new();
        let pepper = world.insert("pepper", WorldTransform::at(Vec3::ZERO));
        world.set_traits(
            pepper,
            EntityTraits {
                facing: true,
                speed_pitch: false,
            },
        );
        world.set_locator(pepper, HEAD_LOCATOR, Vec3::new(0.0, 1.7, 0.0));

        let mut track = SoundTrack3D::new("pepper");
        track.bind(Some(&world), buf.as_mut());
        track.update(Some(&world), buf.as_mut(), 0);
        assert_eq!(hw.probe(0).unwrap().position(), Vec3::new(0.0, 1.7, 0.0));
    }

    #[test]
    fn test_speed_pitch() {
        let mut hw = SimulatedHardware::new();
        let mut buf = buffer(&mut hw, BufferCaps::CTRL_3D);
        let world = EntityTable::new();
        let car = world.insert("car", WorldTransform::at(Vec3::ZERO));
        world.set_traits(
            car,
            EntityTraits {
                facing: false,
                speed_pitch: true,
            },
        );
        world.set_speed(car, 10.0);

        let mut track = SoundTrack3D::new("car");
        track.bind(Some(&world), buf.as_mut());
        track.update(Some(&world), buf.as_mut(), 0);
        assert_relative_eq!(track.multiplier(), 1.5);
        assert_eq!(hw.probe(0).unwrap().frequency(), 33_075);
        assert_eq!(track.base_frequency(), 22_050, "Base frequency is cached");
    }

    #[test]
    fn test_speed_pitch_on_plain_buffer() {
        let mut hw = SimulatedHardware::new();
        let mut buf = buffer(&mut hw, BufferCaps::empty());
        let world = EntityTable::new();
        let car = world.insert("car", WorldTransform::at(Vec3::new(4.0, 0.0, 0.0)));
        world.set_traits(
            car,
            EntityTraits {
                facing: false,
                speed_pitch: true,
            },
        );
        world.set_speed(car, -4.0);

        let mut track = SoundTrack3D::new("car");
        assert!(!track.bind(Some(&world), buf.as_mut()));
        assert_eq!(track.entity(), Some(car));
        track.update(Some(&world), buf.as_mut(), -300);

        let probe = hw.probe(0).unwrap();
        assert_relative_eq!(track.multiplier(), 0.8);
        assert_eq!(probe.frequency(), 17_640);
        assert_eq!(probe.attenuation(), -300, "Plain buffer keeps the fallback level");
        assert_eq!(probe.position(), Vec3::ZERO);
    }

    #[test]
    fn test_distance_range() {
        let mut hw = SimulatedHardware::new();
        let mut buf = buffer(&mut hw, BufferCaps::CTRL_3D);
        let world = EntityTable::new();
        world.insert("car", WorldTransform::at(Vec3::ZERO));

        let mut track = SoundTrack3D::new("car");
        assert_eq!(
            track.set_distance_range(2.0, 50.0, Some(buf.as_mut())).unwrap(),
            DistanceStatus::Not3D,
            "Unbound track is not positional"
        );
        track.bind(Some(&world), buf.as_mut());
        assert_eq!(
            track.set_distance_range(2.0, 50.0, Some(buf.as_mut())).unwrap(),
            DistanceStatus::Applied
        );
        assert_eq!(hw.probe(0).unwrap().distance_range(), (2.0, 50.0));
        assert!(track.set_distance_range(5.0, 1.0, Some(buf.as_mut())).is_err());
        assert!(track.set_distance_range(0.0, 1.0, None).is_err());
    }

    #[test]
    fn test_unbind_keeps_playback() {
        let mut hw = SimulatedHardware::new();
        let mut buf = buffer(&mut hw, BufferCaps::CTRL_3D);
        let world = EntityTable::new();
        world.insert("car", WorldTransform::at(Vec3::ZERO));

        let mut track = SoundTrack3D::new("car");
        track.bind(Some(&world), buf.as_mut());
        buf.play(true).unwrap();
        track.unbind();
        assert!(!track.is_3d());
        assert!(track.entity().is_none());
        assert!(buf.is_playing());

        track.reset();
        assert_eq!(track.distance_range(), (1.0, 100.0));
    }
}
