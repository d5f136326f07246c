//! Decoded PCM buffers
//!
//! An [`AudioBuffer`] is immutable once decoded and is shared between the
//! control side and the audio thread as `Arc<AudioBuffer>`.

use std::io::Cursor;

use crate::error::DecodeError;

/// Decoded, interleaved f32 PCM ready for playback.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Wrap already-decoded interleaved samples.
    ///
    /// # Errors
    /// Returns `DecodeError` when the layout is inconsistent (zero channels,
    /// zero rate, a partial trailing frame, or no frames at all).
    pub fn from_interleaved(
        samples: Vec<f32>,
        channels: u16,
        sample_rate: u32,
    ) -> Result<Self, DecodeError> {
        if channels == 0 {
            return Err(DecodeError::new("channel count is zero"));
        }
        if sample_rate == 0 {
            return Err(DecodeError::new("sample rate is zero"));
        }
        if samples.len() % channels as usize != 0 {
            return Err(DecodeError::new(format!(
                "{} samples do not divide into {} channels",
                samples.len(),
                channels
            )));
        }
        if samples.is_empty() {
            return Err(DecodeError::new("contains no audio frames"));
        }

        Ok(Self {
            samples,
            channels,
            sample_rate,
        })
    }

    /// Decode an in-memory RIFF/WAV file.
    ///
    /// Integer PCM of any bit depth is normalised to [-1.0, 1.0); float WAV
    /// is passed through.
    pub fn decode_wav(bytes: &[u8]) -> Result<Self, DecodeError> {
        let reader = hound::WavReader::new(Cursor::new(bytes))?;
        let spec = reader.spec();

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()?,
            hound::SampleFormat::Int => {
                let max_val = 2.0_f32.powi(spec.bits_per_sample as i32 - 1);
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|x| x as f32 / max_val))
                    .collect::<Result<Vec<_>, _>>()?
            }
        };

        Self::from_interleaved(samples, spec.channels, spec.sample_rate)
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Duration in seconds at the buffer's native rate.
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Sample at `frame` for output channel `channel`.
    ///
    /// Output channels beyond the buffer's own wrap around, so a mono
    /// buffer feeds every output channel.
    #[inline]
    pub fn sample(&self, frame: usize, channel: usize) -> f32 {
        let channels = self.channels as usize;
        self.samples[frame * channels + channel % channels]
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::{sine_wav_bytes, wav_bytes_i16};

    #[test]
    fn test_decode_int16_wav() {
        let bytes = wav_bytes_i16(&[0, 16384, -16384, 32767], 1, 44_100);
        let buffer = AudioBuffer::decode_wav(&bytes).unwrap();

        assert_eq!(buffer.channels(), 1);
        assert_eq!(buffer.sample_rate(), 44_100);
        assert_eq!(buffer.frames(), 4);
        assert_eq!(buffer.sample(1, 0), 0.5);
        assert_eq!(buffer.sample(2, 0), -0.5);
    }

    #[test]
    fn test_decode_stereo_duration() {
        let bytes = sine_wav_bytes(48_000, 2, 48_000);
        let buffer = AudioBuffer::decode_wav(&bytes).unwrap();

        assert_eq!(buffer.channels(), 2);
        assert_eq!(buffer.frames(), 48_000);
        assert!((buffer.duration() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = AudioBuffer::decode_wav(b"definitely not a wav file").unwrap_err();
        assert!(!err.reason.is_empty());
    }

    #[test]
    fn test_decode_rejects_empty_data_chunk() {
        let bytes = wav_bytes_i16(&[], 1, 8_000);
        assert!(AudioBuffer::decode_wav(&bytes).is_err());
    }

    #[test]
    fn test_mono_sample_feeds_every_channel() {
        let buffer = AudioBuffer::from_interleaved(vec![0.25, 0.75], 1, 48_000).unwrap();
        assert_eq!(buffer.sample(1, 0), 0.75);
        assert_eq!(buffer.sample(1, 1), 0.75);
    }

    #[test]
    fn test_from_interleaved_rejects_partial_frame() {
        assert!(AudioBuffer::from_interleaved(vec![0.0; 3], 2, 48_000).is_err());
    }
}
