//! WAV export of captured hardware output
//!
//! Writes the bytes that passed a simulated play cursor (see
//! [`BufferProbe::captured`](crate::BufferProbe::captured)) to a WAV file so a
//! run can be listened to afterwards.

use crate::wave::WaveFormat;
use crate::{Result, TickleError};
use std::path::Path;

/// Write raw PCM in `format` to a WAV file.
///
/// # Examples
///
/// ```no_run
/// use tickle_audio::export::write_capture_wav;
/// use tickle_audio::WaveFormat;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let format = WaveFormat::pcm(22_050, 16, 1);
/// write_capture_wav("capture.wav", format, &[0u8; 4410])?;
/// # Ok(())
/// # }
/// ```
pub fn write_capture_wav<P: AsRef<Path>>(path: P, format: WaveFormat, bytes: &[u8]) -> Result<()> {
    format.validate()?;
    let spec = hound::WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: format.bits_per_sample,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path.as_ref(), spec)
        .map_err(|e| TickleError::Other(format!("Failed to create WAV file: {e}")))?;

    let frames = bytes.len() / format.block_align();
    let usable = &bytes[..frames * format.block_align()];
    match format.bits_per_sample {
        8 => {
            for &byte in usable {
                // hound takes 8-bit samples signed and stores them offset by 128
                let sample = (i16::from(byte) - 128) as i8;
                writer
                    .write_sample(sample)
                    .map_err(|e| TickleError::Other(format!("Failed to write sample: {e}")))?;
            }
        }
        _ => {
            for pair in usable.chunks_exact(2) {
                let sample = i16::from_le_bytes([pair[0], pair[1]]);
                writer
                    .write_sample(sample)
                    .map_err(|e| TickleError::Other(format!("Failed to write sample: {e}")))?;
            }
        }
    }
    writer
        .finalize()
        .map_err(|e| TickleError::Other(format!("Failed to finalize WAV file: {e}")))?;
    log::info!(
        "wrote {} frames to {}",
        frames,
        path.as_ref().display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_16_bit_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.wav");
        let samples: [i16; 3] = [0, 1000, -1000];
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();

        write_capture_wav(&path, WaveFormat::pcm(8_000, 16, 1), &bytes).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 8_000);
        let read: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(read, samples);
    }

    #[test]
    fn test_8_bit_silence_is_centered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("silence.wav");
        write_capture_wav(&path, WaveFormat::pcm(8_000, 8, 1), &[0x80, 0x80, 0xFF]).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let read: Vec<i8> = reader.samples::<i8>().map(|s| s.unwrap()).collect();
        assert_eq!(read, vec![0, 0, 127]);
    }

    #[test]
    fn test_invalid_format_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.wav");
        assert!(write_capture_wav(&path, WaveFormat::pcm(8_000, 24, 1), &[]).is_err());
    }
}
