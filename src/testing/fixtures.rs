//! In-memory WAV fixtures.
//!
//! Assets are synthesized with `hound` so tests never depend on files in the
//! repository.

use std::f32::consts::PI;
use std::io::Cursor;

use crate::audio::AssetSource;

/// Encode 16-bit integer PCM as a complete WAV file.
pub fn wav_bytes_i16(samples: &[i16], channels: u16, sample_rate: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut bytes = Vec::new();
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec)
            .expect("in-memory WAV writer");
        for &sample in samples {
            writer.write_sample(sample).expect("in-memory WAV write");
        }
        writer.finalize().expect("in-memory WAV finalize");
    }
    bytes
}

/// A 440 Hz sine of `frames` frames, copied to every channel.
pub fn sine_wav_bytes(frames: usize, channels: u16, sample_rate: u32) -> Vec<u8> {
    let mut samples = Vec::with_capacity(frames * channels as usize);
    for frame in 0..frames {
        let phase = 2.0 * PI * 440.0 * frame as f32 / sample_rate as f32;
        let value = (phase.sin() * 0.5 * i16::MAX as f32) as i16;
        for _ in 0..channels {
            samples.push(value);
        }
    }
    wav_bytes_i16(&samples, channels, sample_rate)
}

/// Constant-amplitude mono clip, handy for checking where a voice starts.
pub fn dc_wav_bytes(frames: usize, level: i16, sample_rate: u32) -> Vec<u8> {
    wav_bytes_i16(&vec![level; frames], 1, sample_rate)
}

/// Sine asset sources for each id, ready for `BufferCache::preload`.
pub fn sine_sources(ids: &[&str], frames: usize, sample_rate: u32) -> Vec<(String, AssetSource)> {
    ids.iter()
        .map(|id| {
            (
                id.to_string(),
                AssetSource::Bytes(sine_wav_bytes(frames, 1, sample_rate)),
            )
        })
        .collect()
}
