//! Manager configuration
//!
//! Everything fixed at manager creation: device access level, whether the
//! primary buffer is 3D-capable, ring-buffer layout and how ticks are driven.
//! Loadable from JSON; every field has a default.

use crate::constants::MAX_VOLUME;
use crate::{Result, TickleError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default primary buffer sample rate (22.05 kHz)
pub const DEFAULT_PRIMARY_RATE: u32 = 22_050;

/// Default timer-thread tick interval in milliseconds
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 10;

/// Device access level requested at initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CooperativeLevel {
    /// Share the device; primary format cannot be changed.
    Normal,
    /// Share the device, but allow setting the primary format.
    #[default]
    Priority,
    /// Exclusive device access.
    Exclusive,
}

/// How the manager's tick loop is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TickMode {
    /// The caller's frame scheduler calls `tick`.
    #[default]
    External,
    /// A dedicated timer thread ticks every `interval_ms`.
    TimerThread {
        /// Tick period in milliseconds.
        interval_ms: u64,
    },
}

/// Ring-buffer layout for wave presenters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveStreamConfig {
    /// Slots per ring (2 = double buffering).
    pub slots: usize,
    /// Duration of one slot in milliseconds.
    pub slot_ms: u32,
}

impl WaveStreamConfig {
    /// Total buffered duration in milliseconds.
    pub fn latency_ms(&self) -> u64 {
        self.slots as u64 * u64::from(self.slot_ms)
    }
}

impl Default for WaveStreamConfig {
    fn default() -> Self {
        WaveStreamConfig {
            slots: 3,
            slot_ms: 100,
        }
    }
}

/// Format of the primary mixing buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrimaryFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Bits per sample.
    pub bits_per_sample: u16,
    /// Channel count.
    pub channels: u16,
}

impl Default for PrimaryFormat {
    fn default() -> Self {
        PrimaryFormat {
            sample_rate: DEFAULT_PRIMARY_RATE,
            bits_per_sample: 16,
            channels: 2,
        }
    }
}

/// Configuration of a [`SoundManager`](crate::SoundManager).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Create a 3D-capable primary buffer when the device supports it.
    pub enable_3d: bool,
    /// Device access level.
    pub cooperative_level: CooperativeLevel,
    /// Initial global volume (0-100).
    pub initial_volume: u8,
    /// Tick driver.
    pub tick_mode: TickMode,
    /// Wave ring layout.
    pub wave: WaveStreamConfig,
    /// Primary mixing buffer format.
    pub primary: PrimaryFormat,
}

impl ManagerConfig {
    /// Small rings for interactive use.
    /// Two 40 ms slots ≈ 80 ms of buffered audio.
    pub fn low_latency() -> Self {
        ManagerConfig {
            wave: WaveStreamConfig {
                slots: 2,
                slot_ms: 40,
            },
            ..Self::default()
        }
    }

    /// Larger rings that tolerate irregular frame times.
    /// Four 125 ms slots ≈ 500 ms of buffered audio.
    pub fn stable() -> Self {
        ManagerConfig {
            wave: WaveStreamConfig {
                slots: 4,
                slot_ms: 125,
            },
            ..Self::default()
        }
    }

    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ManagerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Reject values the manager cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.wave.slots < 2 {
            return Err(TickleError::ConfigError(format!(
                "wave ring needs at least 2 slots, got {}",
                self.wave.slots
            )));
        }
        if self.wave.slot_ms == 0 {
            return Err(TickleError::ConfigError("slot duration must be non-zero".into()));
        }
        if self.initial_volume > MAX_VOLUME {
            return Err(TickleError::ConfigError(format!(
                "initial volume {} exceeds {MAX_VOLUME}",
                self.initial_volume
            )));
        }
        if let TickMode::TimerThread { interval_ms: 0 } = self.tick_mode {
            return Err(TickleError::ConfigError("timer interval must be non-zero".into()));
        }
        if self.primary.sample_rate == 0 || self.primary.channels == 0 {
            return Err(TickleError::ConfigError("primary format is empty".into()));
        }
        Ok(())
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig {
            enable_3d: true,
            cooperative_level: CooperativeLevel::default(),
            initial_volume: MAX_VOLUME,
            tick_mode: TickMode::External,
            wave: WaveStreamConfig::default(),
            primary: PrimaryFormat::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        assert!(ManagerConfig::default().validate().is_ok());
        assert!(ManagerConfig::low_latency().validate().is_ok());
        assert!(ManagerConfig::stable().validate().is_ok());
        assert_eq!(ManagerConfig::low_latency().wave.latency_ms(), 80);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ManagerConfig::from_json_str(
            r#"{ "enable_3d": false, "tick_mode": { "TimerThread": { "interval_ms": 5 } } }"#,
        )
        .unwrap();
        assert!(!config.enable_3d);
        assert_eq!(config.tick_mode, TickMode::TimerThread { interval_ms: 5 });
        assert_eq!(config.wave, WaveStreamConfig::default());
        assert_eq!(config.initial_volume, 100);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = ManagerConfig::default();
        config.wave.slots = 1;
        assert!(matches!(config.validate(), Err(TickleError::ConfigError(_))));

        let mut config = ManagerConfig::default();
        config.initial_volume = 101;
        assert!(config.validate().is_err());

        let mut config = ManagerConfig::default();
        config.tick_mode = TickMode::TimerThread { interval_ms: 0 };
        assert!(config.validate().is_err());

        assert!(matches!(
            ManagerConfig::from_json_str(r#"{ "wave": { "slot_ms": 0 } }"#),
            Err(TickleError::ConfigError(_))
        ));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            ManagerConfig::from_json_str("{ not json"),
            Err(TickleError::Json(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            ManagerConfig::load("/nonexistent/tickle.json"),
            Err(TickleError::Io(_))
        ));
    }
}
