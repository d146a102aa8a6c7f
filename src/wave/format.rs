//! Wave format descriptor

use crate::{Result, TickleError};
use serde::{Deserialize, Serialize};

/// PCM format of one wave presentation; fixed for the presenter's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Bits per sample: 8 (unsigned) or 16 (signed little-endian).
    pub bits_per_sample: u16,
    /// Channel count.
    pub channels: u16,
    /// Declared payload size in bytes; 0 when unknown.
    pub data_size: u32,
}

impl WaveFormat {
    /// Linear PCM with an unknown payload size.
    pub const fn pcm(sample_rate: u32, bits_per_sample: u16, channels: u16) -> Self {
        WaveFormat {
            sample_rate,
            bits_per_sample,
            channels,
            data_size: 0,
        }
    }

    /// Builder: declare the total payload size.
    #[must_use]
    pub const fn with_data_size(mut self, data_size: u32) -> Self {
        self.data_size = data_size;
        self
    }

    /// Bytes per sample frame (all channels).
    pub fn block_align(&self) -> usize {
        usize::from(self.channels) * usize::from(self.bits_per_sample / 8)
    }

    /// Bytes per second of playback.
    pub fn avg_bytes_per_sec(&self) -> usize {
        self.sample_rate as usize * self.block_align()
    }

    /// Whole frames covering `ms` milliseconds, in bytes (at least one frame).
    pub fn bytes_for_ms(&self, ms: u32) -> usize {
        let frames = (self.sample_rate as u64 * u64::from(ms) / 1000).max(1);
        frames as usize * self.block_align()
    }

    /// Playback time of `bytes` in milliseconds.
    pub fn duration_ms(&self, bytes: usize) -> u64 {
        let rate = self.avg_bytes_per_sec();
        if rate == 0 {
            return 0;
        }
        bytes as u64 * 1000 / rate as u64
    }

    /// Byte value of a zero-amplitude sample.
    ///
    /// 8-bit PCM is unsigned and centered on 0x80; 16-bit PCM is signed, so
    /// silence is all zero bytes.
    pub fn silence_byte(&self) -> u8 {
        match self.bits_per_sample {
            8 => 0x80,
            _ => 0x00,
        }
    }

    /// Reject formats the streamer cannot play.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.bits_per_sample, 8 | 16) {
            return Err(TickleError::InvalidFormat(format!(
                "unsupported bit depth {}",
                self.bits_per_sample
            )));
        }
        if self.channels == 0 || self.channels > 2 {
            return Err(TickleError::InvalidFormat(format!(
                "unsupported channel count {}",
                self.channels
            )));
        }
        if self.sample_rate == 0 {
            return Err(TickleError::InvalidFormat("zero sample rate".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_matches_encoding() {
        assert_eq!(WaveFormat::pcm(11_025, 8, 1).silence_byte(), 0x80);
        assert_eq!(WaveFormat::pcm(22_050, 16, 2).silence_byte(), 0x00);
    }

    #[test]
    fn test_sizes() {
        let format = WaveFormat::pcm(22_050, 16, 2);
        assert_eq!(format.block_align(), 4);
        assert_eq!(format.avg_bytes_per_sec(), 88_200);
        assert_eq!(format.bytes_for_ms(100), 8_820);
        assert_eq!(format.duration_ms(88_200), 1_000);
    }

    #[test]
    fn test_bytes_for_ms_at_least_one_frame() {
        let format = WaveFormat::pcm(100, 16, 1);
        assert_eq!(format.bytes_for_ms(1), 2);
    }

    #[test]
    fn test_validate() {
        assert!(WaveFormat::pcm(22_050, 16, 2).validate().is_ok());
        assert!(matches!(
            WaveFormat::pcm(22_050, 24, 2).validate(),
            Err(TickleError::InvalidFormat(_))
        ));
        assert!(WaveFormat::pcm(22_050, 8, 0).validate().is_err());
        assert!(WaveFormat::pcm(0, 8, 1).validate().is_err());
    }
}
