//! Percentage volume to hardware attenuation
//!
//! Hardware volume is expressed as attenuation in hundredths of a decibel.
//! The curve is a 101-entry lookup table indexed by percent; the default is
//! logarithmic so that equal percentage steps sound like equal loudness steps.

use crate::constants::{MAX_ATTENUATION, MAX_VOLUME, MIN_ATTENUATION};
use crate::{Result, TickleError};

const TABLE_LEN: usize = MAX_VOLUME as usize + 1;

/// Monotonic percent → attenuation lookup table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttenuationCurve {
    table: [i32; TABLE_LEN],
}

impl Default for AttenuationCurve {
    fn default() -> Self {
        let mut table = [MIN_ATTENUATION; TABLE_LEN];
        for (percent, entry) in table.iter_mut().enumerate().skip(1) {
            let db = 2000.0 * (percent as f64 / 100.0).log10();
            *entry = (db.round() as i32).clamp(MIN_ATTENUATION, MAX_ATTENUATION);
        }
        AttenuationCurve { table }
    }
}

impl AttenuationCurve {
    /// Build a curve from an explicit table.
    ///
    /// The table needs 101 entries within the hardware range that never
    /// decrease as the percentage grows.
    pub fn from_table(entries: &[i32]) -> Result<Self> {
        if entries.len() != TABLE_LEN {
            return Err(TickleError::ConfigError(format!(
                "attenuation table needs {TABLE_LEN} entries, got {}",
                entries.len()
            )));
        }
        if entries
            .iter()
            .any(|&e| !(MIN_ATTENUATION..=MAX_ATTENUATION).contains(&e))
        {
            return Err(TickleError::ConfigError(
                "attenuation table entry out of hardware range".into(),
            ));
        }
        if entries.windows(2).any(|w| w[1] < w[0]) {
            return Err(TickleError::ConfigError(
                "attenuation table is not monotonic".into(),
            ));
        }
        let mut table = [0; TABLE_LEN];
        table.copy_from_slice(entries);
        Ok(AttenuationCurve { table })
    }

    /// Attenuation for a percentage (values above 100 clamp).
    #[inline]
    pub fn lookup(&self, percent: u8) -> i32 {
        self.table[usize::from(percent.min(MAX_VOLUME))]
    }
}

/// Global volume and the curve it is mapped through.
///
/// Global and per-track volumes compose multiplicatively.
#[derive(Debug, Clone, Copy)]
pub struct VolumePolicy<'a> {
    /// Manager volume (0-100).
    pub master: u8,
    /// Curve owned by the manager.
    pub curve: &'a AttenuationCurve,
}

impl<'a> VolumePolicy<'a> {
    /// Bundle a master volume with a curve.
    pub fn new(master: u8, curve: &'a AttenuationCurve) -> Self {
        VolumePolicy {
            master: master.min(MAX_VOLUME),
            curve,
        }
    }

    /// Composed percentage for a track volume.
    pub fn effective(&self, track: u8) -> u8 {
        let composed = u32::from(self.master.min(MAX_VOLUME)) * u32::from(track.min(MAX_VOLUME));
        (composed / u32::from(MAX_VOLUME)) as u8
    }

    /// Hardware attenuation for a track volume.
    pub fn attenuation(&self, track: u8) -> i32 {
        self.curve.lookup(self.effective(track))
    }
}
