//! Shared constants
//!
//! Hardware attenuation bounds, default geometry and timing values used across
//! presenters and the manager.

/// Attenuation of a fully muted buffer, in hundredths of a decibel.
pub const MIN_ATTENUATION: i32 = -10_000;

/// Attenuation of a buffer at full volume.
pub const MAX_ATTENUATION: i32 = 0;

/// Highest percentage volume accepted anywhere in the crate.
pub const MAX_VOLUME: u8 = 100;

/// Default minimum distance of a 3D sound (full volume inside this radius).
pub const DEFAULT_MIN_DISTANCE: f32 = 1.0;

/// Default maximum distance of a 3D sound (no further attenuation beyond it).
pub const DEFAULT_MAX_DISTANCE: f32 = 100.0;

/// Locator looked up on entities with facing semantics.
pub const HEAD_LOCATOR: &str = "head";

/// Frequency multiplier gained per world unit per second of entity speed.
pub const SPEED_PITCH_FACTOR: f32 = 0.05;

/// Lower bound of the speed-derived frequency multiplier.
pub const MIN_FREQUENCY_MULTIPLIER: f32 = 0.5;

/// Upper bound of the speed-derived frequency multiplier.
pub const MAX_FREQUENCY_MULTIPLIER: f32 = 2.0;

/// Lowest frequency a hardware buffer accepts, in Hz.
pub const MIN_BUFFER_FREQUENCY: u32 = 100;

/// Highest frequency a hardware buffer accepts, in Hz.
pub const MAX_BUFFER_FREQUENCY: u32 = 200_000;

/// Default number of simultaneously allocated hardware voices.
pub const DEFAULT_MAX_VOICES: usize = 32;

/// Released simulated buffers kept around for inspection.
pub const RETAINED_RELEASED_BUFFERS: usize = 32;

/// Compute the speed-derived frequency multiplier for an entity.
///
/// Stationary entities play at their base frequency; faster entities are
/// pitched up linearly until the upper bound.
#[inline]
pub fn speed_frequency_multiplier(speed: f32) -> f32 {
    if !speed.is_finite() {
        return 1.0;
    }
    (1.0 + speed * SPEED_PITCH_FACTOR).clamp(MIN_FREQUENCY_MULTIPLIER, MAX_FREQUENCY_MULTIPLIER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_speed_multiplier_at_rest() {
        assert_relative_eq!(speed_frequency_multiplier(0.0), 1.0);
    }

    #[test]
    fn test_speed_multiplier_clamped() {
        assert_relative_eq!(speed_frequency_multiplier(1_000.0), MAX_FREQUENCY_MULTIPLIER);
        assert_relative_eq!(speed_frequency_multiplier(-1_000.0), MIN_FREQUENCY_MULTIPLIER);
        assert_relative_eq!(speed_frequency_multiplier(f32::NAN), 1.0);
    }

    #[test]
    fn test_speed_multiplier_linear_region() {
        assert_relative_eq!(speed_frequency_multiplier(10.0), 1.5);
    }
}
